//! ABI layer for buffered files.
//!
//! Architecture: a global handle registry maps opaque `buffered_file_t*`
//! addresses to `BufferedFile` instances from prepio-core. Handles are
//! small integers dressed up as pointers; they are never dereferenced, so a
//! stale or forged handle is reported as `EBADF` instead of crashing.

use std::collections::HashMap;
use std::ffi::{CStr, OsStr, c_char, c_int, c_void};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::OnceLock;

use parking_lot::Mutex;
use prepio_core::{BufferedFile, BufferedFileError};

/// Open flag requesting insert-at-front writes. Not understood by the kernel.
pub const O_PREAPPEND: c_int = prepio_core::O_PREAPPEND;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[inline]
fn set_abi_errno(val: c_int) {
    // SAFETY: __errno_location returns the calling thread's errno slot.
    unsafe { *libc::__errno_location() = val };
}

fn fail(err: &BufferedFileError) -> c_int {
    set_abi_errno(err.errno());
    -1
}

// ---------------------------------------------------------------------------
// Handle registry
// ---------------------------------------------------------------------------

/// First handle value; keeps handles clear of null and small sentinel values.
const FIRST_HANDLE: usize = 0x1000_0010;

struct HandleRegistry {
    files: HashMap<usize, BufferedFile>,
    next_id: usize,
}

impl HandleRegistry {
    fn new() -> Self {
        Self {
            files: HashMap::new(),
            next_id: FIRST_HANDLE,
        }
    }

    fn insert(&mut self, file: BufferedFile) -> usize {
        let id = self.next_id;
        self.next_id = id.wrapping_add(1).max(FIRST_HANDLE);
        self.files.insert(id, file);
        id
    }
}

fn registry() -> &'static Mutex<HandleRegistry> {
    static REG: OnceLock<Mutex<HandleRegistry>> = OnceLock::new();
    REG.get_or_init(|| Mutex::new(HandleRegistry::new()))
}

/// Run `op` on the handle's file, or fail with `EBADF` for unknown handles.
fn with_file<T>(bf: *mut c_void, op: impl FnOnce(&mut BufferedFile) -> T) -> Option<T> {
    let id = bf as usize;
    let mut reg = registry().lock();
    match reg.files.get_mut(&id) {
        Some(file) => Some(op(file)),
        None => {
            set_abi_errno(libc::EBADF);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Open `pathname` with C `flags` (optionally carrying [`O_PREAPPEND`]).
///
/// Returns a handle, or null with `errno` set.
///
/// # Safety
///
/// `pathname` must be null or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn buffered_open(
    pathname: *const c_char,
    flags: c_int,
    mode: libc::mode_t,
) -> *mut c_void {
    if pathname.is_null() {
        set_abi_errno(libc::EFAULT);
        return std::ptr::null_mut();
    }
    // SAFETY: caller guarantees a valid NUL-terminated string.
    let bytes = unsafe { CStr::from_ptr(pathname) }.to_bytes();
    let path = Path::new(OsStr::from_bytes(bytes));

    match BufferedFile::open_with_flags(path, flags, mode as u32) {
        Ok(file) => registry().lock().insert(file) as *mut c_void,
        Err(err) => {
            fail(&err);
            std::ptr::null_mut()
        }
    }
}

/// Buffer `count` bytes from `buf`. Returns `count`, or `-1` with `errno`.
///
/// # Safety
///
/// `buf` must be valid for `count` bytes of reads.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn buffered_write(
    bf: *mut c_void,
    buf: *const c_void,
    count: usize,
) -> isize {
    if count > 0 && buf.is_null() {
        set_abi_errno(libc::EFAULT);
        return -1;
    }
    let src: &[u8] = if count == 0 {
        &[]
    } else {
        // SAFETY: non-null and caller guarantees `count` readable bytes.
        unsafe { std::slice::from_raw_parts(buf.cast::<u8>(), count) }
    };
    match with_file(bf, |file| file.write(src)) {
        Some(Ok(n)) => n as isize,
        Some(Err(err)) => fail(&err) as isize,
        None => -1,
    }
}

/// Read up to `count` bytes into `buf`. Returns the count delivered (0 at
/// end-of-file), or `-1` with `errno`.
///
/// # Safety
///
/// `buf` must be valid for `count` bytes of writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn buffered_read(bf: *mut c_void, buf: *mut c_void, count: usize) -> isize {
    if count > 0 && buf.is_null() {
        set_abi_errno(libc::EFAULT);
        return -1;
    }
    let dst: &mut [u8] = if count == 0 {
        &mut []
    } else {
        // SAFETY: non-null and caller guarantees `count` writable bytes.
        unsafe { std::slice::from_raw_parts_mut(buf.cast::<u8>(), count) }
    };
    match with_file(bf, |file| file.read(dst)) {
        Some(Ok(n)) => n as isize,
        Some(Err(err)) => fail(&err) as isize,
        None => -1,
    }
}

/// Commit pending bytes. Returns `0`, or `-1` with `errno`.
#[unsafe(no_mangle)]
pub extern "C" fn buffered_flush(bf: *mut c_void) -> c_int {
    match with_file(bf, |file| file.flush()) {
        Some(Ok(())) => 0,
        Some(Err(err)) => fail(&err),
        None => -1,
    }
}

/// Flush and release the handle. The handle is invalid afterwards even
/// when `-1` is returned.
#[unsafe(no_mangle)]
pub extern "C" fn buffered_close(bf: *mut c_void) -> c_int {
    let id = bf as usize;
    // Take the file out before closing so the lock is not held across I/O.
    let Some(file) = registry().lock().files.remove(&id) else {
        set_abi_errno(libc::EBADF);
        return -1;
    };
    match file.close() {
        Ok(()) => 0,
        Err(err) => fail(&err),
    }
}
