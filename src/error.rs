//! Error taxonomy for the primitive surface.
//!
//! The reference implementation sets a process-wide `errno`-style integer
//! and returns a negative status. This crate replaces that idiom (see the
//! Design Notes in `spec.md` §9) with a typed [`Error`] so callers cannot
//! forget to check it.

use std::io;

use thiserror::Error;

/// The stable error taxonomy from `spec.md` §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Permission check failed.
    Perm,
    /// A path component is missing.
    NoEnt,
    /// Descriptor index out of range or unbound.
    BadFd,
    /// Memory inode table exhausted.
    NoMem,
    /// Create/link target already exists.
    Exist,
    /// A non-final path component is not a directory, or a `DIRECTORY`-required
    /// target is a regular file.
    NotDir,
    /// Too many open descriptors in the session.
    NFile,
    /// Too many open descriptors system-wide (the memory inode table is full).
    MFile,
    /// Free-block chain exhausted.
    NoSpc,
    /// Path component exceeds [`crate::config::NAME_MAX_LENGTH`].
    NameTooLong,
    /// Unlink of a non-empty directory.
    NotEmpty,
    /// Free-inode chain exhausted.
    NoIno,
    /// Block device read/write did not return the expected byte count.
    Io,
    /// Unlink of a still-open inode.
    Busy,
    /// Image file cannot be opened or created.
    Img,
    /// A feature was exercised that this implementation does not support.
    Unsupported,
}

impl ErrorKind {
    /// Returns the stable integer code from `spec.md` §7, for callers (e.g. a
    /// future shell or FTP front-end) that want the historical numbering.
    pub fn as_errno(self) -> i32 {
        match self {
            Self::Perm => 1,
            Self::NoEnt => 2,
            Self::BadFd => 3,
            Self::NoMem => 4,
            Self::Exist => 5,
            Self::NotDir => 6,
            Self::NFile => 9,
            Self::MFile => 9,
            Self::NoSpc => 11,
            Self::NameTooLong => 13,
            Self::NotEmpty => 14,
            Self::NoIno => 15,
            Self::Io => 16,
            Self::Busy => 17,
            Self::Img => 19,
            Self::Unsupported => -1,
        }
    }

    /// A short human-readable message, mirroring the reference's parallel
    /// error-code-to-string array.
    pub fn message(self) -> &'static str {
        match self {
            Self::Perm => "permission denied",
            Self::NoEnt => "no such file or directory",
            Self::BadFd => "bad file descriptor",
            Self::NoMem => "memory inode table exhausted",
            Self::Exist => "file already exists",
            Self::NotDir => "not a directory",
            Self::NFile => "too many open files in session",
            Self::MFile => "too many open files system-wide",
            Self::NoSpc => "no space left on device",
            Self::NameTooLong => "file name too long",
            Self::NotEmpty => "directory not empty",
            Self::NoIno => "no free inodes",
            Self::Io => "device I/O error",
            Self::Busy => "device or resource busy",
            Self::Img => "cannot open or create image file",
            Self::Unsupported => "operation not supported",
        }
    }
}

/// The error type returned by every fallible operation in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A classified filesystem failure.
    #[error("{}", .0.message())]
    Fs(ErrorKind),
    /// An I/O failure from the underlying host file, preserved with context.
    #[error("device I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns the [`ErrorKind`] this error corresponds to, unwrapping the
    /// `Io` variant to [`ErrorKind::Io`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Fs(kind) => *kind,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::Fs(kind)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
