//! # prepio-core
//!
//! Buffered file I/O over raw descriptors, with one non-standard capability:
//! a prepend open mode whose buffered writes are inserted in front of the
//! file's existing content instead of overwriting or appending.
//!
//! ```no_run
//! use prepio_core::{BufferedFile, OpenMode, OpenOptions};
//!
//! let mut bf = BufferedFile::open("log.txt", &OpenOptions::new(OpenMode::Prepend))?;
//! bf.write(b"newest entry\n")?;
//! bf.close()?;
//! # Ok::<(), prepio_core::BufferedFileError>(())
//! ```
//!
//! Only the [`sys`] module uses `unsafe`.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod stdio;
#[allow(unsafe_code)]
pub mod sys;

pub use config::{BufferConfig, Durability, buffer_config};
pub use error::{BufferedFileError, ErrorKind, PrependStage, Result};
pub use metrics::{IoMetrics, MetricsSnapshot, global_metrics};
pub use stdio::{BufferedFile, O_PREAPPEND, OpenMode, OpenOptions};
