// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Translation of [`FsError`] into the negative errno values the kernel protocol expects.
//!
//! Order of matching:
//! 1. wrapping failures are unwrapped to their root cause;
//! 2. typed causes use a fixed table;
//! 3. causes carrying only text are matched on lower-cased phrases, first match wins;
//! 4. anything else is `EIO`.
//!
//! [`FsError::IllegalState`] is a programmer error and is never translated.

use std::io;

use libc::{
    c_int, E2BIG, EACCES, EBADF, EEXIST, EINVAL, EIO, EISDIR, ENAMETOOLONG, ENOENT, ENOLCK,
    ENOSYS, ENOTDIR, ENOTEMPTY, ENOTSUP, ERANGE, EROFS,
};

use crate::error::FsError;

#[cfg(target_os = "linux")]
pub const ENOATTR: c_int = libc::ENODATA;
#[cfg(not(target_os = "linux"))]
pub const ENOATTR: c_int = libc::ENOATTR;

#[cfg(target_os = "linux")]
const ENODATA: c_int = libc::ENODATA;
#[cfg(not(target_os = "linux"))]
const ENODATA: c_int = libc::ENOATTR;

/// Returns `-errno` for `err`.
///
/// # Panics
///
/// Panics on [`FsError::IllegalState`].
pub fn to_errno(err: &FsError) -> c_int {
    -errno_of(err)
}

/// Positive errno for `err`, as `fuser` replies expect.
pub fn errno_of(err: &FsError) -> c_int {
    match err {
        FsError::Context { source, .. } => errno_of(source),
        FsError::IllegalState(msg) => panic!("illegal state: {msg}"),
        FsError::Io(e) => io_errno(e),
        FsError::Message(msg) => errno_from_text(msg),
        other => structural_errno(other),
    }
}

fn structural_errno(err: &FsError) -> c_int {
    match err {
        FsError::AccessDenied => EACCES,
        FsError::AlreadyExists => EEXIST,
        FsError::InvalidArgument | FsError::InvalidPath(_) => EINVAL,
        FsError::IsADirectory => EISDIR,
        FsError::NotADirectory => ENOTDIR,
        FsError::NotFound => ENOENT,
        FsError::NotEmpty => ENOTEMPTY,
        FsError::ReadOnly => EROFS,
        FsError::Unsupported(_) => ENOTSUP,
        FsError::BadFileDescriptor => EBADF,
        FsError::NameTooLong => ENAMETOOLONG,
        FsError::ArgumentListTooLong => E2BIG,
        FsError::ResultTooLarge => ERANGE,
        FsError::NoLock => ENOLCK,
        FsError::NoAttribute => ENOATTR,
        FsError::NotImplemented => ENOSYS,
        FsError::Context { .. }
        | FsError::IllegalState(_)
        | FsError::Io(_)
        | FsError::Message(_) => EIO,
    }
}

fn io_errno(e: &io::Error) -> c_int {
    if let Some(inner) = e.get_ref().and_then(|inner| inner.downcast_ref::<FsError>()) {
        return errno_of(inner);
    }
    match e.kind() {
        io::ErrorKind::PermissionDenied => EACCES,
        io::ErrorKind::AlreadyExists => EEXIST,
        io::ErrorKind::InvalidInput => EINVAL,
        io::ErrorKind::NotFound => ENOENT,
        io::ErrorKind::Unsupported => ENOTSUP,
        _ => errno_from_text(&e.to_string()),
    }
}

/// Ordered phrase table for causes that only carry a message.
pub fn errno_from_text(message: &str) -> c_int {
    let msg = message.to_lowercase();
    let has = |needle: &str| msg.contains(needle);

    if has("argument list too long") {
        E2BIG
    } else if has("not permitted") || has("permission") {
        EACCES
    } else if has("file descriptor") {
        EBADF
    } else if has("file exists") {
        EEXIST
    } else if has("invalid argument") {
        EINVAL
    } else if has("is a directory") {
        EISDIR
    } else if has("file name") && has("too long") {
        ENAMETOOLONG
    } else if has("attribute not found") {
        ENOATTR
    } else if has("no data") || has("no message available") {
        ENODATA
    } else if has("no such file") {
        ENOENT
    } else if has("no locks") {
        ENOLCK
    } else if has("not implemented") {
        ENOSYS
    } else if has("not a directory") {
        ENOTDIR
    } else if has("not empty") {
        ENOTEMPTY
    } else if has("not supported") {
        ENOTSUP
    } else if has("result too large") {
        ERANGE
    } else if has("read-only file system") {
        EROFS
    } else {
        EIO
    }
}
