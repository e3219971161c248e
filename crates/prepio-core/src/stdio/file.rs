//! Buffered file handle.
//!
//! `BufferedFile` owns one descriptor, one write buffer and one read buffer.
//! Writes accumulate until the buffer would overflow or the caller flushes;
//! reads are served from the read buffer and refilled one kernel read at a
//! time. The handle's [`OpenMode`] decides what a flush means:
//!
//! - plain (`WriteOnly`/`ReadWrite`): write at the caller's logical position;
//! - `Append`/`AppendOnly`: the kernel places the bytes at end-of-file;
//! - `Prepend`: the first non-empty flush splices the bytes in front of the
//!   existing content (see [`super::prepend`]); later flushes append. Reads
//!   continue across the rewrite at the same place in the original content.
//!
//! A handle is driven by one caller at a time. Two handles on the same path
//! do not see each other's buffers and can lose updates; coordinating them
//! is the caller's job.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use super::buffer::{ReadBuffer, WriteBuffer};
use super::mode::{OpenMode, OpenOptions};
use super::prepend;
use crate::config::{Durability, buffer_config};
use crate::error::{BufferedFileError, Result};
use crate::metrics::{IoMetrics, global_metrics};
use crate::sys;

#[derive(Debug)]
pub struct BufferedFile {
    /// Underlying descriptor (-1 once released).
    fd: i32,
    path: PathBuf,
    c_path: CString,
    mode: OpenMode,
    durability: Durability,
    write_buf: WriteBuffer,
    read_buf: ReadBuffer,
    /// Set for prepend handles until the first non-empty flush lands.
    prepend_pending: bool,
}

impl BufferedFile {
    /// Open `path` as described by `options`.
    pub fn open(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let result = Self::open_inner(path, options);
        let metrics = global_metrics();
        match &result {
            Ok(_) => IoMetrics::inc(&metrics.opens),
            Err(_) => IoMetrics::inc(&metrics.open_failures),
        }
        result
    }

    /// Open with raw C flags, which may include [`super::mode::O_PREAPPEND`].
    ///
    /// `permissions` only matters when `O_CREAT` is present.
    pub fn open_with_flags(path: impl AsRef<Path>, flags: i32, permissions: u32) -> Result<Self> {
        let options = match OpenOptions::from_oflags(flags, permissions) {
            Ok(o) => o,
            Err(e) => {
                IoMetrics::inc(&global_metrics().open_failures);
                return Err(e);
            }
        };
        Self::open(path, &options)
    }

    fn open_inner(path: &Path, options: &OpenOptions) -> Result<Self> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| BufferedFileError::InvalidPath(path.to_path_buf()))?;
        let fd = sys::sys_open(&c_path, options.to_oflags(), options.permissions).map_err(
            |errno| BufferedFileError::Open {
                path: path.to_path_buf(),
                errno,
            },
        )?;

        // The prepend rewrite renames over the path; resolve symlinks so the
        // link itself is not replaced by a regular file.
        let (path, c_path) = if options.mode.is_insertion() {
            match std::fs::canonicalize(path) {
                Ok(real) => match CString::new(real.as_os_str().as_bytes()) {
                    Ok(c_real) => (real, c_real),
                    Err(_) => (path.to_path_buf(), c_path),
                },
                Err(_) => (path.to_path_buf(), c_path),
            }
        } else {
            (path.to_path_buf(), c_path)
        };

        let defaults = buffer_config();
        let capacity = options.capacity.unwrap_or(defaults.capacity).max(1);
        Ok(Self {
            fd,
            path,
            c_path,
            mode: options.mode,
            durability: options.durability.unwrap_or(defaults.durability),
            write_buf: WriteBuffer::with_capacity(capacity),
            read_buf: ReadBuffer::with_capacity(capacity),
            prepend_pending: options.mode.is_insertion(),
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// True for handles opened with the prepend capability.
    pub fn is_insertion_mode(&self) -> bool {
        self.mode.is_insertion()
    }

    pub fn is_append_mode(&self) -> bool {
        self.mode.is_append()
    }

    /// True while the prepend of this handle has not been performed yet.
    pub fn prepend_pending(&self) -> bool {
        self.prepend_pending
    }

    pub fn capacity(&self) -> usize {
        self.write_buf.capacity()
    }

    /// Bytes accepted by `write` and not yet committed.
    pub fn pending_write_len(&self) -> usize {
        self.write_buf.len()
    }

    /// Bytes fetched from the file and not yet delivered by `read`.
    pub fn buffered_read_len(&self) -> usize {
        self.read_buf.readable()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Underlying descriptor. It changes after a prepend rewrite.
    pub fn fd(&self) -> i32 {
        self.fd
    }

    // -----------------------------------------------------------------------
    // Write side
    // -----------------------------------------------------------------------

    /// Buffer `data`. Returns `data.len()` once every byte is accepted.
    ///
    /// Flushes first when the bytes do not fit behind the pending ones. A
    /// write longer than the capacity is rejected without touching any state.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let metrics = global_metrics();
        if !self.mode.writable() {
            return Err(BufferedFileError::Write {
                errno: libc::EBADF,
                committed: 0,
                pending: data.len(),
            });
        }
        let capacity = self.write_buf.capacity();
        if data.len() > capacity {
            IoMetrics::inc(&metrics.overflow_rejections);
            return Err(BufferedFileError::BufferOverflow {
                requested: data.len(),
                capacity,
            });
        }
        if self.write_buf.try_push(data).is_err() {
            self.flush()?;
            // Empty buffer and data.len() <= capacity: cannot fail.
            if self.write_buf.try_push(data).is_err() {
                return Err(BufferedFileError::BufferOverflow {
                    requested: data.len(),
                    capacity,
                });
            }
        }
        IoMetrics::inc(&metrics.writes);
        IoMetrics::add(&metrics.bytes_accepted, data.len());
        Ok(data.len())
    }

    /// Commit pending bytes according to the open mode.
    ///
    /// With nothing pending this performs no I/O at all.
    pub fn flush(&mut self) -> Result<()> {
        let metrics = global_metrics();
        if self.write_buf.is_empty() {
            IoMetrics::inc(&metrics.empty_flushes);
            return Ok(());
        }
        let result = if self.prepend_pending {
            self.flush_prepend()
        } else {
            self.flush_in_place()
        };
        match &result {
            Ok(()) => IoMetrics::inc(&metrics.flushes),
            Err(_) => IoMetrics::inc(&metrics.write_errors),
        }
        result
    }

    fn flush_in_place(&mut self) -> Result<()> {
        let pending = self.write_buf.len();
        let resume_at = match self.mode {
            OpenMode::ReadWrite => {
                self.rewind_unread()?;
                None
            }
            // O_APPEND drags the position to end-of-file; reads resume where they were.
            OpenMode::Append => sys::sys_lseek(self.fd, 0, sys::SEEK_CUR).ok(),
            // The rewritten descriptor has no O_APPEND; move to the end by hand.
            OpenMode::Prepend => Some(self.seek_to_end(pending)?),
            _ => None,
        };

        if let Err(partial) = sys::sys_write_all(self.fd, self.write_buf.pending()) {
            self.write_buf.consume(partial.written);
            return Err(BufferedFileError::Write {
                errno: partial.errno,
                committed: partial.written,
                pending,
            });
        }
        self.write_buf.clear();

        if let Some(pos) = resume_at {
            sys::sys_lseek(self.fd, pos as i64, sys::SEEK_SET).map_err(|errno| {
                BufferedFileError::Write {
                    errno,
                    committed: pending,
                    pending,
                }
            })?;
        }
        Ok(())
    }

    /// Position the descriptor at end-of-file, returning where it was.
    fn seek_to_end(&self, pending: usize) -> Result<u64> {
        let seek_err = |errno| BufferedFileError::Write {
            errno,
            committed: 0,
            pending,
        };
        let pos = sys::sys_lseek(self.fd, 0, sys::SEEK_CUR).map_err(seek_err)?;
        sys::sys_lseek(self.fd, 0, sys::SEEK_END).map_err(seek_err)?;
        Ok(pos)
    }

    /// Give read-ahead bytes back to the file so a write lands right after
    /// what the caller has actually consumed.
    fn rewind_unread(&mut self) -> Result<()> {
        let unread = self.read_buf.readable();
        if unread == 0 {
            return Ok(());
        }
        sys::sys_lseek(self.fd, -(unread as i64), sys::SEEK_CUR).map_err(|errno| {
            BufferedFileError::Write {
                errno,
                committed: 0,
                pending: self.write_buf.len(),
            }
        })?;
        self.read_buf.reset();
        Ok(())
    }

    fn flush_prepend(&mut self) -> Result<()> {
        let pending = self.write_buf.len();
        // Unread read-ahead sits just before this position in the original.
        let read_pos = sys::sys_lseek(self.fd, 0, sys::SEEK_CUR).map_err(|errno| {
            BufferedFileError::Write {
                errno,
                committed: 0,
                pending,
            }
        })?;
        let mut scratch = vec![0u8; self.write_buf.capacity()];
        let spliced = prepend::splice_front(
            self.fd,
            &self.path,
            &self.c_path,
            self.write_buf.pending(),
            &mut scratch,
            self.durability,
        )?;

        // The old descriptor was only read through; the new file is already
        // in place, so a close failure here cannot affect its content.
        let _ = sys::sys_close(self.fd);
        self.fd = spliced.fd;
        self.prepend_pending = false;
        self.write_buf.clear();

        let metrics = global_metrics();
        IoMetrics::inc(&metrics.prepend_rewrites);
        IoMetrics::add(&metrics.prepend_bytes_copied, spliced.copied as usize);

        // The original content moved back by `pending` bytes, read-ahead included.
        let resume = read_pos + pending as u64;
        if let Err(errno) = sys::sys_lseek(self.fd, resume as i64, sys::SEEK_SET) {
            self.read_buf.reset();
            return Err(BufferedFileError::Write {
                errno,
                committed: pending,
                pending,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    /// Fill `dst` from the read buffer, refilling from the file as needed.
    ///
    /// Returns fewer than `dst.len()` bytes only at end-of-file. A refill
    /// failure is returned as an error when nothing was delivered yet;
    /// otherwise the delivered count is returned and the failure shows up
    /// on the next call.
    pub fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
        let metrics = global_metrics();
        IoMetrics::inc(&metrics.reads);
        let mut delivered = 0usize;
        while delivered < dst.len() {
            if self.read_buf.readable() == 0 {
                IoMetrics::inc(&metrics.refills);
                match sys::sys_read(self.fd, self.read_buf.refill_slot()) {
                    Ok(0) => {
                        self.read_buf.set_filled(0);
                        break;
                    }
                    Ok(n) => self.read_buf.set_filled(n),
                    Err(errno) => {
                        self.read_buf.reset();
                        IoMetrics::inc(&metrics.read_errors);
                        if delivered == 0 {
                            return Err(BufferedFileError::Read { errno });
                        }
                        break;
                    }
                }
            }
            delivered += self.read_buf.take_into(&mut dst[delivered..]);
        }
        IoMetrics::add(&metrics.bytes_delivered, delivered);
        Ok(delivered)
    }

    // -----------------------------------------------------------------------
    // Close
    // -----------------------------------------------------------------------

    /// Flush, then release the descriptor whatever the flush outcome.
    ///
    /// A flush failure takes precedence over a close failure.
    pub fn close(mut self) -> Result<()> {
        IoMetrics::inc(&global_metrics().closes);
        let flushed = self.flush();
        let released = self.release();
        flushed?;
        released
    }

    fn release(&mut self) -> Result<()> {
        if self.fd < 0 {
            return Ok(());
        }
        let fd = std::mem::replace(&mut self.fd, -1);
        self.write_buf.clear();
        self.read_buf.reset();
        sys::sys_close(fd).map_err(|errno| BufferedFileError::Close { errno })
    }
}

impl Drop for BufferedFile {
    fn drop(&mut self) {
        if self.fd >= 0 {
            IoMetrics::inc(&global_metrics().drop_closes);
            let _ = self.flush();
            let _ = self.release();
        }
    }
}
