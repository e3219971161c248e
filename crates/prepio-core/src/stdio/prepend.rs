//! Insert-at-front rewrite.
//!
//! No kernel primitive shifts existing bytes, so a prepend is a full rewrite:
//!
//! ```text
//! target:  [original ..........]
//! temp:    [pending][original ..........]   (sibling of target, same fs)
//! rename(temp, target)                      (atomic replace)
//! ```
//!
//! The new file takes over the original's permission bits and, when the
//! process is allowed to, its owner and group.
//!
//! The original content is streamed through a caller-supplied scratch slice
//! with positional reads, so memory use is bounded by the buffer capacity,
//! not by the file size. Until the rename succeeds the target is untouched;
//! any failure before that point removes the temporary file.

use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::Durability;
use crate::error::{BufferedFileError, PrependStage, Result};
use crate::sys;

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Attempts at finding an unused temporary name before giving up.
const MAX_TEMP_ATTEMPTS: u32 = 16;

/// Result of a completed rewrite.
#[derive(Debug)]
pub(crate) struct Spliced {
    /// Descriptor of the new file, positioned at end-of-file.
    pub fd: i32,
    /// Bytes of original content copied behind the pending block.
    pub copied: u64,
}

/// Temporary sibling that is closed and unlinked unless committed.
struct TempFile {
    fd: i32,
    path: CString,
    armed: bool,
}

impl TempFile {
    fn create(target: &Path) -> Result<Self> {
        let dir = target.parent().filter(|d| !d.as_os_str().is_empty());
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        let mut last_errno = libc::EEXIST;
        for _ in 0..MAX_TEMP_ATTEMPTS {
            let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
            let leaf = format!(".{name}.prepio.{}.{seq}", std::process::id());
            let candidate: PathBuf = match dir {
                Some(d) => d.join(leaf),
                None => PathBuf::from(leaf),
            };
            let path = CString::new(candidate.as_os_str().as_bytes())
                .map_err(|_| BufferedFileError::InvalidPath(candidate.clone()))?;
            let oflags = libc::O_RDWR | libc::O_CREAT | libc::O_EXCL | libc::O_CLOEXEC;
            match sys::sys_open(&path, oflags, 0o600) {
                Ok(fd) => {
                    return Ok(Self {
                        fd,
                        path,
                        armed: true,
                    });
                }
                Err(libc::EEXIST) => last_errno = libc::EEXIST,
                Err(errno) => {
                    return Err(BufferedFileError::Prepend {
                        stage: PrependStage::CreateTemp,
                        errno,
                    });
                }
            }
        }
        Err(BufferedFileError::Prepend {
            stage: PrependStage::CreateTemp,
            errno: last_errno,
        })
    }

    /// Hand the descriptor over; the file is no longer removed on drop.
    fn commit(mut self) -> i32 {
        self.armed = false;
        self.fd
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = sys::sys_close(self.fd);
            let _ = sys::sys_unlink(&self.path);
        }
    }
}

fn stage_err(stage: PrependStage) -> impl Fn(i32) -> BufferedFileError {
    move |errno| BufferedFileError::Prepend { stage, errno }
}

/// Replace `target` with `pending ++ <current content of fd>`.
///
/// `fd` must be readable and refer to `target`. On success the caller must
/// adopt [`Spliced::fd`] and release `fd`; on failure nothing changed.
pub(crate) fn splice_front(
    fd: i32,
    target: &Path,
    target_c: &CStr,
    pending: &[u8],
    scratch: &mut [u8],
    durability: Durability,
) -> Result<Spliced> {
    let attrs = sys::sys_fstat_attrs(fd).map_err(stage_err(PrependStage::Stat))?;
    let temp = TempFile::create(target)?;
    // Best effort: only a privileged process may give a file away. Done
    // before fchmod, since a successful chown can clear set-id bits.
    let _ = sys::sys_fchown(temp.fd, attrs.uid, attrs.gid);
    sys::sys_fchmod(temp.fd, attrs.perm).map_err(stage_err(PrependStage::CreateTemp))?;

    sys::sys_write_all(temp.fd, pending)
        .map_err(|p| stage_err(PrependStage::WritePending)(p.errno))?;

    let mut offset = 0u64;
    loop {
        let n = sys::sys_pread(fd, scratch, offset)
            .map_err(stage_err(PrependStage::CopyOriginal))?;
        if n == 0 {
            break;
        }
        sys::sys_write_all(temp.fd, &scratch[..n])
            .map_err(|p| stage_err(PrependStage::CopyOriginal)(p.errno))?;
        offset += n as u64;
    }

    if durability.syncs() {
        sys::sys_fsync(temp.fd).map_err(stage_err(PrependStage::Sync))?;
    }
    sys::sys_rename(&temp.path, target_c).map_err(stage_err(PrependStage::Rename))?;

    Ok(Spliced {
        fd: temp.commit(),
        copied: offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "prepio-splice-{tag}-{}-{nanos}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn c(path: &Path) -> CString {
        CString::new(path.as_os_str().as_bytes()).unwrap()
    }

    #[test]
    fn splice_places_pending_before_original() {
        let dir = scratch_dir("basic");
        let target = dir.join("data.txt");
        std::fs::write(&target, b"Test1").unwrap();

        let fd = sys::sys_open(&c(&target), libc::O_RDWR, 0).unwrap();
        let mut scratch = [0u8; 2];
        let out = splice_front(
            fd,
            &target,
            &c(&target),
            b"Test2",
            &mut scratch,
            Durability::None,
        )
        .unwrap();
        assert_eq!(out.copied, 5);
        sys::sys_close(fd).unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"Test2Test1");
        // New descriptor sits at end-of-file.
        assert_eq!(sys::sys_lseek(out.fd, 0, sys::SEEK_CUR).unwrap(), 10);
        sys::sys_close(out.fd).unwrap();

        // No temporary files are left behind.
        let leftovers: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_copy_leaves_target_untouched() {
        let dir = scratch_dir("fail");
        let target = dir.join("data.txt");
        std::fs::write(&target, b"original").unwrap();

        let mut scratch = [0u8; 8];
        let err = splice_front(
            -1,
            &target,
            &c(&target),
            b"new",
            &mut scratch,
            Durability::Fsync,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BufferedFileError::Prepend {
                stage: PrependStage::Stat,
                errno: libc::EBADF
            }
        ));
        assert_eq!(std::fs::read(&target).unwrap(), b"original");
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn write_only_source_fails_during_copy_and_cleans_up() {
        let dir = scratch_dir("wronly");
        let target = dir.join("data.txt");
        std::fs::write(&target, b"original").unwrap();

        let fd = sys::sys_open(&c(&target), libc::O_WRONLY, 0).unwrap();
        let mut scratch = [0u8; 8];
        let err = splice_front(
            fd,
            &target,
            &c(&target),
            b"new",
            &mut scratch,
            Durability::None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BufferedFileError::Prepend {
                stage: PrependStage::CopyOriginal,
                errno: libc::EBADF
            }
        ));
        sys::sys_close(fd).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"original");
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn permissions_carry_over() {
        use std::os::unix::fs::PermissionsExt;

        let dir = scratch_dir("perm");
        let target = dir.join("data.txt");
        std::fs::write(&target, b"x").unwrap();
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o640)).unwrap();

        let fd = sys::sys_open(&c(&target), libc::O_RDWR, 0).unwrap();
        let mut scratch = [0u8; 4];
        let out = splice_front(fd, &target, &c(&target), b"y", &mut scratch, Durability::None)
            .unwrap();
        sys::sys_close(fd).unwrap();
        sys::sys_close(out.fd).unwrap();

        let mode = std::fs::metadata(&target).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o640);
        assert_eq!(std::fs::read(&target).unwrap(), b"yx");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn owner_and_group_carry_over() {
        use std::os::unix::fs::MetadataExt;

        let dir = scratch_dir("owner");
        let target = dir.join("data.txt");
        std::fs::write(&target, b"x").unwrap();
        // Only a privileged run can hand the file to another user; otherwise
        // the original owner is the current user and must stay so.
        let _ = std::os::unix::fs::chown(&target, Some(65534), Some(65534));
        let before = std::fs::metadata(&target).unwrap();

        let fd = sys::sys_open(&c(&target), libc::O_RDWR, 0).unwrap();
        let mut scratch = [0u8; 4];
        let out = splice_front(fd, &target, &c(&target), b"y", &mut scratch, Durability::None)
            .unwrap();
        sys::sys_close(fd).unwrap();
        sys::sys_close(out.fd).unwrap();

        let after = std::fs::metadata(&target).unwrap();
        assert_ne!(after.ino(), before.ino());
        assert_eq!((after.uid(), after.gid()), (before.uid(), before.gid()));
        assert_eq!(std::fs::read(&target).unwrap(), b"yx");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
