//! Open-mode resolution.
//!
//! Callers describe what they want either through the [`OpenOptions`]
//! builder or through raw C `O_*` bits (the ABI path). Either way the request
//! collapses into exactly one [`OpenMode`], and [`OpenOptions::to_oflags`]
//! produces the bits the kernel actually sees. [`O_PREAPPEND`] never reaches
//! the kernel.

use crate::config::Durability;
use crate::error::{BufferedFileError, Result};

/// Non-standard "insert at front" flag accepted by [`OpenOptions::from_oflags`].
///
/// Bit 30 is unused by every Linux `O_*` flag.
pub const O_PREAPPEND: i32 = 0x4000_0000;

/// Flags understood by the resolver. Anything else is passed through as-is.
const HANDLED_FLAGS: i32 = libc::O_ACCMODE
    | libc::O_CREAT
    | libc::O_TRUNC
    | libc::O_EXCL
    | libc::O_APPEND
    | libc::O_CLOEXEC
    | O_PREAPPEND;

/// Default permission bits for created files (before umask).
pub const DEFAULT_PERMISSIONS: u32 = 0o666;

/// How a handle commits its buffered writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Reads only; writes are rejected with `EBADF`.
    ReadOnly,
    /// Writes only, at the descriptor position.
    WriteOnly,
    /// Reads and writes; writes land at the caller's logical position.
    ReadWrite,
    /// Reads and writes; every flush lands at end-of-file.
    Append,
    /// Writes only; every flush lands at end-of-file.
    AppendOnly,
    /// The first flush is spliced in front of the existing content; later
    /// flushes on the same handle append.
    Prepend,
}

impl OpenMode {
    #[must_use]
    pub const fn is_insertion(self) -> bool {
        matches!(self, Self::Prepend)
    }

    #[must_use]
    pub const fn is_append(self) -> bool {
        matches!(self, Self::Append | Self::AppendOnly)
    }

    #[must_use]
    pub const fn writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }

    #[must_use]
    pub const fn readable(self) -> bool {
        !matches!(self, Self::WriteOnly | Self::AppendOnly)
    }

    /// Access and placement bits for the kernel.
    ///
    /// Prepend needs read access to copy the original content, so it is
    /// opened read-write even when the caller asked for write-only.
    const fn kernel_bits(self) -> i32 {
        match self {
            Self::ReadOnly => libc::O_RDONLY,
            Self::WriteOnly => libc::O_WRONLY,
            Self::ReadWrite | Self::Prepend => libc::O_RDWR,
            Self::Append => libc::O_RDWR | libc::O_APPEND,
            Self::AppendOnly => libc::O_WRONLY | libc::O_APPEND,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::WriteOnly => "write-only",
            Self::ReadWrite => "read-write",
            Self::Append => "append",
            Self::AppendOnly => "append-only",
            Self::Prepend => "prepend",
        }
    }
}

/// Everything needed to open a [`crate::BufferedFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    pub mode: OpenMode,
    pub create: bool,
    pub truncate: bool,
    pub exclusive: bool,
    /// Permission bits used only when the file is created.
    pub permissions: u32,
    /// Extra kernel flags passed through untouched (e.g. `O_NOFOLLOW`).
    pub custom_flags: i32,
    /// Buffer capacity override; `None` uses [`crate::config::buffer_config`].
    pub capacity: Option<usize>,
    /// Prepend durability override; `None` uses the configured default.
    pub durability: Option<Durability>,
}

impl OpenOptions {
    #[must_use]
    pub const fn new(mode: OpenMode) -> Self {
        Self {
            mode,
            create: false,
            truncate: false,
            exclusive: false,
            permissions: DEFAULT_PERMISSIONS,
            custom_flags: 0,
            capacity: None,
            durability: None,
        }
    }

    #[must_use]
    pub const fn create(mut self, yes: bool) -> Self {
        self.create = yes;
        self
    }

    #[must_use]
    pub const fn truncate(mut self, yes: bool) -> Self {
        self.truncate = yes;
        self
    }

    #[must_use]
    pub const fn exclusive(mut self, yes: bool) -> Self {
        self.exclusive = yes;
        self
    }

    #[must_use]
    pub const fn permissions(mut self, perm: u32) -> Self {
        self.permissions = perm;
        self
    }

    #[must_use]
    pub const fn custom_flags(mut self, flags: i32) -> Self {
        self.custom_flags = flags;
        self
    }

    #[must_use]
    pub const fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    #[must_use]
    pub const fn durability(mut self, durability: Durability) -> Self {
        self.durability = Some(durability);
        self
    }

    /// Resolve raw C open flags (possibly carrying [`O_PREAPPEND`]).
    ///
    /// Append and prepend together are rejected with
    /// [`BufferedFileError::ConflictingModes`]. Append or prepend on a
    /// read-only access mode, or an invalid access mode, is rejected with
    /// [`BufferedFileError::InvalidFlags`].
    pub fn from_oflags(flags: i32, permissions: u32) -> Result<Self> {
        let append = flags & libc::O_APPEND != 0;
        let prepend = flags & O_PREAPPEND != 0;
        if append && prepend {
            return Err(BufferedFileError::ConflictingModes);
        }

        let access = match flags & libc::O_ACCMODE {
            libc::O_RDONLY => OpenMode::ReadOnly,
            libc::O_WRONLY => OpenMode::WriteOnly,
            libc::O_RDWR => OpenMode::ReadWrite,
            _ => return Err(BufferedFileError::InvalidFlags(flags)),
        };

        let mode = match (access, append, prepend) {
            (OpenMode::ReadOnly, true, _) | (OpenMode::ReadOnly, _, true) => {
                return Err(BufferedFileError::InvalidFlags(flags));
            }
            (OpenMode::WriteOnly, true, _) => OpenMode::AppendOnly,
            (_, true, _) => OpenMode::Append,
            (_, _, true) => OpenMode::Prepend,
            (access, false, false) => access,
        };

        Ok(Self {
            mode,
            create: flags & libc::O_CREAT != 0,
            truncate: flags & libc::O_TRUNC != 0,
            exclusive: flags & libc::O_EXCL != 0,
            permissions: permissions & 0o7777,
            custom_flags: flags & !HANDLED_FLAGS,
            capacity: None,
            durability: None,
        })
    }

    /// Kernel flags for `open(2)`. Always includes `O_CLOEXEC`; never
    /// includes [`O_PREAPPEND`].
    #[must_use]
    pub fn to_oflags(&self) -> i32 {
        let mut oflags = self.mode.kernel_bits() | libc::O_CLOEXEC;
        if self.create {
            oflags |= libc::O_CREAT;
        }
        if self.truncate {
            oflags |= libc::O_TRUNC;
        }
        if self.exclusive {
            oflags |= libc::O_EXCL;
        }
        oflags | (self.custom_flags & !O_PREAPPEND)
    }
}
