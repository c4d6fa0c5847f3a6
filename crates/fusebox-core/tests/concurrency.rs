// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

#![cfg(unix)]

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use fusebox_core::{FileInfo, FuseboxFs, LocalFs};
use tempfile::TempDir;

const WRITERS: usize = 4;
const WRITES_PER_THREAD: usize = 500;
const RENAMES: usize = 200;

#[test]
fn test_positional_writes_survive_concurrent_renames() {
    let dir = TempDir::new().unwrap();
    let fs = Arc::new(LocalFs::new(dir.path()));

    let mut fi = FileInfo::with_flags(libc::O_RDWR);
    fs.create("/a", 0o644, &mut fi).unwrap();
    let errors = Arc::new(AtomicUsize::new(0));

    let writers: Vec<_> = (0..WRITERS)
        .map(|t| {
            let fs = Arc::clone(&fs);
            let errors = Arc::clone(&errors);
            thread::spawn(move || {
                for i in 0..WRITES_PER_THREAD {
                    let offset = (t * WRITES_PER_THREAD + i) as u64;
                    // The handle outlives any name the file currently has.
                    match fs.write("/a", &[b'a' + t as u8], offset, &fi) {
                        Ok(1) => {}
                        _ => {
                            errors.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            })
        })
        .collect();

    let renamer = {
        let fs = Arc::clone(&fs);
        let errors = Arc::clone(&errors);
        thread::spawn(move || {
            for i in 0..RENAMES {
                let (from, to) = if i % 2 == 0 { ("/a", "/b") } else { ("/b", "/a") };
                if fs.rename(from, to, 0).is_err() {
                    errors.fetch_add(1, Ordering::SeqCst);
                }
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    renamer.join().unwrap();
    assert_eq!(errors.load(Ordering::SeqCst), 0);

    fs.release("/a", &fi).unwrap();
    let content = fs::read(dir.path().join("a")).unwrap();
    assert_eq!(content.len(), WRITERS * WRITES_PER_THREAD);
    for (t, chunk) in content.chunks(WRITES_PER_THREAD).enumerate() {
        assert!(chunk.iter().all(|&b| b == b'a' + t as u8), "writer {t}");
    }
}

#[test]
fn test_handle_ids_are_unique_under_contention() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("f"), b"x").unwrap();
    let fs = Arc::new(LocalFs::new(dir.path()));

    let openers: Vec<_> = (0..8)
        .map(|_| {
            let fs = Arc::clone(&fs);
            thread::spawn(move || {
                (0..50)
                    .map(|_| -> u64 {
                        let mut fi = FileInfo::with_flags(libc::O_RDONLY);
                        fs.open("/f", &mut fi).unwrap();
                        fi.fh
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all: Vec<u64> = openers
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    let total = all.len();
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), total);
    assert_eq!(fs.open_handles(), total);
    fs.destroy();
    assert_eq!(fs.open_handles(), 0);
}
