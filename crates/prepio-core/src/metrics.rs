//! Atomic counters for buffered I/O observability.
//!
//! All counters use relaxed ordering; they are diagnostic only.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide operation counters.
pub struct IoMetrics {
    /// Successful opens.
    pub opens: AtomicU64,
    /// Opens rejected by flag resolution or the kernel.
    pub open_failures: AtomicU64,
    /// `read` calls.
    pub reads: AtomicU64,
    /// Underlying reads issued to refill the read buffer.
    pub refills: AtomicU64,
    /// Bytes handed to callers by `read`.
    pub bytes_delivered: AtomicU64,
    /// `write` calls that accepted their bytes.
    pub writes: AtomicU64,
    /// Bytes accepted into write buffers.
    pub bytes_accepted: AtomicU64,
    /// Writes rejected for exceeding buffer capacity.
    pub overflow_rejections: AtomicU64,
    /// Flushes that committed bytes.
    pub flushes: AtomicU64,
    /// Flushes with nothing pending.
    pub empty_flushes: AtomicU64,
    /// Completed prepend rewrites.
    pub prepend_rewrites: AtomicU64,
    /// Original-content bytes copied by prepend rewrites.
    pub prepend_bytes_copied: AtomicU64,
    /// Failed flushes (plain, append or prepend).
    pub write_errors: AtomicU64,
    /// Failed refills.
    pub read_errors: AtomicU64,
    /// Explicit closes.
    pub closes: AtomicU64,
    /// Handles released by `Drop` without an explicit close.
    pub drop_closes: AtomicU64,
}

impl IoMetrics {
    /// Create a new zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            opens: AtomicU64::new(0),
            open_failures: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            refills: AtomicU64::new(0),
            bytes_delivered: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            bytes_accepted: AtomicU64::new(0),
            overflow_rejections: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            empty_flushes: AtomicU64::new(0),
            prepend_rewrites: AtomicU64::new(0),
            prepend_bytes_copied: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            closes: AtomicU64::new(0),
            drop_closes: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` to a counter.
    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Snapshot all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            opens: Self::get(&self.opens),
            open_failures: Self::get(&self.open_failures),
            reads: Self::get(&self.reads),
            refills: Self::get(&self.refills),
            bytes_delivered: Self::get(&self.bytes_delivered),
            writes: Self::get(&self.writes),
            bytes_accepted: Self::get(&self.bytes_accepted),
            overflow_rejections: Self::get(&self.overflow_rejections),
            flushes: Self::get(&self.flushes),
            empty_flushes: Self::get(&self.empty_flushes),
            prepend_rewrites: Self::get(&self.prepend_rewrites),
            prepend_bytes_copied: Self::get(&self.prepend_bytes_copied),
            write_errors: Self::get(&self.write_errors),
            read_errors: Self::get(&self.read_errors),
            closes: Self::get(&self.closes),
            drop_closes: Self::get(&self.drop_closes),
        }
    }
}

impl Default for IoMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub opens: u64,
    pub open_failures: u64,
    pub reads: u64,
    pub refills: u64,
    pub bytes_delivered: u64,
    pub writes: u64,
    pub bytes_accepted: u64,
    pub overflow_rejections: u64,
    pub flushes: u64,
    pub empty_flushes: u64,
    pub prepend_rewrites: u64,
    pub prepend_bytes_copied: u64,
    pub write_errors: u64,
    pub read_errors: u64,
    pub closes: u64,
    pub drop_closes: u64,
}

impl MetricsSnapshot {
    /// Name/value pairs, in declaration order, for report emitters.
    #[must_use]
    pub fn fields(&self) -> [(&'static str, u64); 16] {
        [
            ("opens", self.opens),
            ("open_failures", self.open_failures),
            ("reads", self.reads),
            ("refills", self.refills),
            ("bytes_delivered", self.bytes_delivered),
            ("writes", self.writes),
            ("bytes_accepted", self.bytes_accepted),
            ("overflow_rejections", self.overflow_rejections),
            ("flushes", self.flushes),
            ("empty_flushes", self.empty_flushes),
            ("prepend_rewrites", self.prepend_rewrites),
            ("prepend_bytes_copied", self.prepend_bytes_copied),
            ("write_errors", self.write_errors),
            ("read_errors", self.read_errors),
            ("closes", self.closes),
            ("drop_closes", self.drop_closes),
        ]
    }
}

/// Global metrics instance.
static GLOBAL_METRICS: IoMetrics = IoMetrics::new();

/// Access the process-wide counters.
#[must_use]
pub fn global_metrics() -> &'static IoMetrics {
    &GLOBAL_METRICS
}
