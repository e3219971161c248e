//! Typed descriptor primitives.
//!
//! Thin wrappers over the kernel calls the buffered layer is built on:
//! open, read, write, positional read, seek, close, plus the handful of
//! calls the prepend rewrite needs (fstat, fchown, fchmod, fsync, rename,
//! unlink).
//!
//! Every wrapper returns `Result<_, i32>` where the error is the raw errno.
//! `EINTR` is restarted transparently; nothing else is retried.
//!
//! # Safety
//!
//! This is the only module of the crate allowed to use `unsafe`. Each call
//! passes either a borrowed slice (pointer and length derived from the same
//! slice) or a NUL-terminated `CStr`, so the kernel never sees a dangling or
//! mis-sized buffer.

use std::ffi::CStr;

/// `whence` for [`sys_lseek`].
pub const SEEK_SET: i32 = libc::SEEK_SET;
pub const SEEK_CUR: i32 = libc::SEEK_CUR;
pub const SEEK_END: i32 = libc::SEEK_END;

#[inline]
fn last_errno() -> i32 {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::EIO)
}

/// Run `op` until it stops failing with `EINTR`.
#[inline]
fn restart<T, F>(mut op: F) -> Result<T, i32>
where
    F: FnMut() -> Result<T, i32>,
{
    loop {
        match op() {
            Err(libc::EINTR) => continue,
            other => return other,
        }
    }
}

/// `open(2)`. `mode` is only consulted by the kernel when `O_CREAT` is set.
pub fn sys_open(path: &CStr, oflags: i32, mode: u32) -> Result<i32, i32> {
    restart(|| {
        // SAFETY: `path` is a valid NUL-terminated string for the call's duration.
        let fd = unsafe { libc::open(path.as_ptr(), oflags, mode as libc::c_uint) };
        if fd < 0 { Err(last_errno()) } else { Ok(fd) }
    })
}

/// `read(2)` into `buf`. Returns the byte count; 0 means end-of-file.
pub fn sys_read(fd: i32, buf: &mut [u8]) -> Result<usize, i32> {
    restart(|| {
        // SAFETY: pointer and length come from the same live mutable slice.
        let rc = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if rc < 0 { Err(last_errno()) } else { Ok(rc as usize) }
    })
}

/// `pread(2)` into `buf` at absolute `offset`; does not move the file position.
pub fn sys_pread(fd: i32, buf: &mut [u8], offset: u64) -> Result<usize, i32> {
    let offset = libc::off_t::try_from(offset).map_err(|_| libc::EOVERFLOW)?;
    restart(|| {
        // SAFETY: pointer and length come from the same live mutable slice.
        let rc = unsafe { libc::pread(fd, buf.as_mut_ptr().cast(), buf.len(), offset) };
        if rc < 0 { Err(last_errno()) } else { Ok(rc as usize) }
    })
}

/// `write(2)` of `buf`. May write fewer bytes than requested.
pub fn sys_write(fd: i32, buf: &[u8]) -> Result<usize, i32> {
    restart(|| {
        // SAFETY: pointer and length come from the same live slice.
        let rc = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
        if rc < 0 { Err(last_errno()) } else { Ok(rc as usize) }
    })
}

/// Outcome of a failed [`sys_write_all`]: how much reached the kernel first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialWrite {
    pub written: usize,
    pub errno: i32,
}

/// Write all of `buf`, looping over short writes.
///
/// A zero-length write from the kernel on a non-empty buffer is reported as
/// `EIO` so the loop cannot spin.
pub fn sys_write_all(fd: i32, buf: &[u8]) -> Result<(), PartialWrite> {
    let mut written = 0usize;
    while written < buf.len() {
        match sys_write(fd, &buf[written..]) {
            Ok(0) => {
                return Err(PartialWrite {
                    written,
                    errno: libc::EIO,
                });
            }
            Ok(n) => written += n,
            Err(errno) => return Err(PartialWrite { written, errno }),
        }
    }
    Ok(())
}

/// `lseek(2)`. Returns the resulting absolute offset.
pub fn sys_lseek(fd: i32, offset: i64, whence: i32) -> Result<u64, i32> {
    // SAFETY: plain integer arguments.
    let rc = unsafe { libc::lseek(fd, offset as libc::off_t, whence) };
    if rc < 0 {
        Err(last_errno())
    } else {
        Ok(rc as u64)
    }
}

/// `close(2)`. Not restarted on `EINTR`: on Linux the descriptor is already
/// released when close reports `EINTR`, and closing again could hit a reused fd.
pub fn sys_close(fd: i32) -> Result<(), i32> {
    // SAFETY: plain integer argument.
    let rc = unsafe { libc::close(fd) };
    if rc < 0 { Err(last_errno()) } else { Ok(()) }
}

/// Ownership and permission bits of an open file, as reported by `fstat(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttrs {
    /// `st_mode & 0o7777`.
    pub perm: u32,
    pub uid: u32,
    pub gid: u32,
}

/// `fstat(2)` reduced to the attributes a rewrite has to carry over.
pub fn sys_fstat_attrs(fd: i32) -> Result<FileAttrs, i32> {
    let mut st = std::mem::MaybeUninit::<libc::stat>::uninit();
    // SAFETY: `st` is a properly sized out-parameter for fstat.
    let rc = unsafe { libc::fstat(fd, st.as_mut_ptr()) };
    if rc < 0 {
        return Err(last_errno());
    }
    // SAFETY: fstat returned success, so it fully initialized `st`.
    let st = unsafe { st.assume_init() };
    Ok(FileAttrs {
        perm: (st.st_mode as u32) & 0o7777,
        uid: st.st_uid,
        gid: st.st_gid,
    })
}

/// `fchown(2)`.
pub fn sys_fchown(fd: i32, uid: u32, gid: u32) -> Result<(), i32> {
    restart(|| {
        // SAFETY: plain integer arguments.
        let rc = unsafe { libc::fchown(fd, uid as libc::uid_t, gid as libc::gid_t) };
        if rc < 0 { Err(last_errno()) } else { Ok(()) }
    })
}

/// `fchmod(2)`.
pub fn sys_fchmod(fd: i32, perm: u32) -> Result<(), i32> {
    restart(|| {
        // SAFETY: plain integer arguments.
        let rc = unsafe { libc::fchmod(fd, perm as libc::mode_t) };
        if rc < 0 { Err(last_errno()) } else { Ok(()) }
    })
}

/// `fsync(2)`.
pub fn sys_fsync(fd: i32) -> Result<(), i32> {
    restart(|| {
        // SAFETY: plain integer argument.
        let rc = unsafe { libc::fsync(fd) };
        if rc < 0 { Err(last_errno()) } else { Ok(()) }
    })
}

/// `rename(2)`: atomically replace `to` with `from` (same filesystem).
pub fn sys_rename(from: &CStr, to: &CStr) -> Result<(), i32> {
    // SAFETY: both strings are valid and NUL-terminated for the call's duration.
    let rc = unsafe { libc::rename(from.as_ptr(), to.as_ptr()) };
    if rc < 0 { Err(last_errno()) } else { Ok(()) }
}

/// `unlink(2)`.
pub fn sys_unlink(path: &CStr) -> Result<(), i32> {
    // SAFETY: `path` is valid and NUL-terminated for the call's duration.
    let rc = unsafe { libc::unlink(path.as_ptr()) };
    if rc < 0 { Err(last_errno()) } else { Ok(()) }
}
