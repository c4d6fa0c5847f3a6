// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for fusebox layers and stores

use std::io;

use crate::ops::Operation;

/// Failure raised by a store or a transform.
///
/// Every variant except [`FsError::IllegalState`] has a POSIX errno; see
/// [`crate::errno::to_errno`].
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("access denied")]
    AccessDenied,
    #[error("file exists")]
    AlreadyExists,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("is a directory")]
    IsADirectory,
    #[error("not a directory")]
    NotADirectory,
    #[error("no such file or directory")]
    NotFound,
    #[error("directory not empty")]
    NotEmpty,
    #[error("read-only file system")]
    ReadOnly,
    #[error("operation not supported: {0}")]
    Unsupported(Operation),
    #[error("bad file descriptor")]
    BadFileDescriptor,
    #[error("file name too long")]
    NameTooLong,
    #[error("argument list too long")]
    ArgumentListTooLong,
    #[error("result too large")]
    ResultTooLarge,
    #[error("no locks available")]
    NoLock,
    #[error("attribute not found")]
    NoAttribute,
    #[error("not implemented")]
    NotImplemented,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// Failure known only by its message.
    #[error("{0}")]
    Message(String),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<FsError>,
    },
    /// Programmer error. Never translated to an errno.
    #[error("illegal state: {0}")]
    IllegalState(String),
}

impl FsError {
    pub fn message(msg: impl Into<String>) -> Self {
        FsError::Message(msg.into())
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        FsError::IllegalState(msg.into())
    }

    /// Wraps an io error with a message, keeping the kind.
    pub fn io(kind: io::ErrorKind, msg: impl Into<String>) -> Self {
        FsError::Io(io::Error::new(kind, msg.into()))
    }

    /// Wrapping failures are unwrapped before translation.
    pub fn context(self, context: impl Into<String>) -> Self {
        FsError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            FsError::NotFound => true,
            FsError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            FsError::Context { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, FsError::Unsupported(_))
    }
}

pub type FsResult<T> = Result<T, FsError>;

/// Extension for attaching context to fallible store calls.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> FsResult<T>;
}

impl<T, E: Into<FsError>> ResultExt<T> for Result<T, E> {
    fn context(self, context: impl Into<String>) -> FsResult<T> {
        self.map_err(|e| e.into().context(context))
    }
}

impl From<nix::errno::Errno> for FsError {
    fn from(errno: nix::errno::Errno) -> Self {
        FsError::Io(io::Error::from_raw_os_error(errno as i32))
    }
}
