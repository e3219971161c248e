//! Buffer configuration.
//!
//! Defaults are read once from the environment and cached:
//! - `PREPIO_BUFSIZ`: capacity in bytes of each per-handle buffer
//!   (default [`DEFAULT_CAPACITY`], clamped to `1..=MAX_CAPACITY`).
//! - `PREPIO_DURABILITY`: `fsync` (default) or `none`. Controls whether the
//!   prepend rewrite syncs its temporary file before the atomic rename.
//!
//! Individual handles can override both through [`crate::OpenOptions`].

use std::sync::OnceLock;

/// Default buffer capacity (POSIX BUFSIZ).
pub const DEFAULT_CAPACITY: usize = 8192;

/// Upper bound accepted from the environment.
pub const MAX_CAPACITY: usize = 16 * 1024 * 1024;

/// Whether the prepend rewrite is made durable before it becomes visible.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Durability {
    /// fsync the rewritten file before renaming it into place.
    #[default]
    Fsync,
    /// Rename without syncing. Atomic against concurrent readers, not against power loss.
    None,
}

impl Durability {
    /// Parse from string (case-insensitive). Unknown values fall back to the default.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "fsync" | "sync" | "durable" | "default" => Self::Fsync,
            "none" | "off" | "fast" | "nosync" => Self::None,
            _ => Self::Fsync,
        }
    }

    #[must_use]
    pub const fn syncs(self) -> bool {
        matches!(self, Self::Fsync)
    }
}

/// Parse a capacity value. Returns `None` for garbage; clamps numbers into range.
#[must_use]
pub fn parse_capacity(s: &str) -> Option<usize> {
    let n: usize = s.trim().parse().ok()?;
    Some(n.clamp(1, MAX_CAPACITY))
}

/// Process-wide buffering defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    pub capacity: usize,
    pub durability: Durability,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            durability: Durability::default(),
        }
    }
}

impl BufferConfig {
    /// Build from explicit variable values (as read from the environment).
    #[must_use]
    pub fn from_vars(bufsiz: Option<&str>, durability: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            capacity: bufsiz
                .and_then(parse_capacity)
                .unwrap_or(defaults.capacity),
            durability: durability
                .map(Durability::from_str_loose)
                .unwrap_or(defaults.durability),
        }
    }
}

static GLOBAL_CONFIG: OnceLock<BufferConfig> = OnceLock::new();

/// Get the configured defaults (reads env vars on first call, caches thereafter).
#[must_use]
pub fn buffer_config() -> BufferConfig {
    *GLOBAL_CONFIG.get_or_init(|| {
        let bufsiz = std::env::var("PREPIO_BUFSIZ").ok();
        let durability = std::env::var("PREPIO_DURABILITY").ok();
        BufferConfig::from_vars(bufsiz.as_deref(), durability.as_deref())
    })
}
