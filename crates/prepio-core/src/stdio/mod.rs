//! Buffered file streams.
//!
//! The handle type lives in [`file`]; [`buffer`] holds the bounded byte
//! stores, [`mode`] resolves open requests and [`prepend`] implements the
//! insert-at-front rewrite.

pub mod buffer;
pub mod file;
pub mod mode;
mod prepend;

pub use buffer::{ReadBuffer, WriteBuffer};
pub use file::BufferedFile;
pub use mode::{DEFAULT_PERMISSIONS, O_PREAPPEND, OpenMode, OpenOptions};
