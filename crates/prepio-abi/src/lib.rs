//! # prepio-abi
//!
//! C boundary for `prepio-core` buffered files.
//!
//! ```text
//! C caller -> buffered_* entry (this crate) -> handle registry -> BufferedFile
//! ```
//!
//! Every entry point follows the C convention: failures return `-1` (or a
//! null handle from `buffered_open`) and leave the reason in `errno`.

pub mod buffered_abi;

pub use buffered_abi::{
    O_PREAPPEND, buffered_close, buffered_flush, buffered_open, buffered_read, buffered_write,
};
