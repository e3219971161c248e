//! Error taxonomy for buffered file operations.
//!
//! Every variant carries (or implies) an errno so the C boundary can report
//! it without guessing. Nothing here is retried; the caller decides.

use std::path::PathBuf;

use thiserror::Error;

/// Stage of the prepend rewrite that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrependStage {
    /// Reading ownership and permission bits of the original file.
    Stat,
    /// Creating the temporary sibling file.
    CreateTemp,
    /// Writing the pending bytes into the temporary file.
    WritePending,
    /// Copying the original content after the pending bytes.
    CopyOriginal,
    /// fsync of the temporary file.
    Sync,
    /// Atomic replacement of the original path.
    Rename,
}

impl PrependStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stat => "stat",
            Self::CreateTemp => "create-temp",
            Self::WritePending => "write-pending",
            Self::CopyOriginal => "copy-original",
            Self::Sync => "sync",
            Self::Rename => "rename",
        }
    }
}

impl std::fmt::Display for PrependStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification used by the ABI layer and by structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Open,
    Read,
    Write,
    BufferOverflow,
    Close,
}

/// Failures surfaced by [`crate::BufferedFile`] operations.
#[derive(Debug, Error)]
pub enum BufferedFileError {
    #[error("open {path:?} failed (errno {errno})")]
    Open { path: PathBuf, errno: i32 },

    #[error("append and prepend requested together")]
    ConflictingModes,

    #[error("path {0:?} contains an interior NUL byte")]
    InvalidPath(PathBuf),

    #[error("unsupported open flags {0:#x}")]
    InvalidFlags(i32),

    #[error("read failed (errno {errno})")]
    Read { errno: i32 },

    #[error("write failed after {committed} of {pending} pending bytes (errno {errno})")]
    Write {
        errno: i32,
        committed: usize,
        pending: usize,
    },

    #[error("prepend rewrite failed at {stage} (errno {errno})")]
    Prepend { stage: PrependStage, errno: i32 },

    #[error("write of {requested} bytes exceeds buffer capacity {capacity}")]
    BufferOverflow { requested: usize, capacity: usize },

    #[error("close failed (errno {errno})")]
    Close { errno: i32 },
}

impl BufferedFileError {
    /// errno equivalent for the C boundary.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::Open { errno, .. }
            | Self::Read { errno }
            | Self::Write { errno, .. }
            | Self::Prepend { errno, .. }
            | Self::Close { errno } => *errno,
            Self::ConflictingModes | Self::InvalidPath(_) | Self::InvalidFlags(_) => libc::EINVAL,
            Self::BufferOverflow { .. } => libc::EFBIG,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Open { .. }
            | Self::ConflictingModes
            | Self::InvalidPath(_)
            | Self::InvalidFlags(_) => ErrorKind::Open,
            Self::Read { .. } => ErrorKind::Read,
            Self::Write { .. } | Self::Prepend { .. } => ErrorKind::Write,
            Self::BufferOverflow { .. } => ErrorKind::BufferOverflow,
            Self::Close { .. } => ErrorKind::Close,
        }
    }
}

pub type Result<T, E = BufferedFileError> = std::result::Result<T, E>;
