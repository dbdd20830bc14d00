//! Timing and transfer accounting for host/device copies.
//!
//! ## Example
//!
//! ```rust
//! use hyperseti_tracing::performance::{record_transfer, PerformanceSpan, TransferDirection};
//!
//! let span = PerformanceSpan::new("dedoppler", Some(100));
//! // ... run the kernel ...
//! drop(span); // logged only if it took at least 100μs
//!
//! record_transfer(4096, TransferDirection::HostToDevice, 250);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

static ENABLED: AtomicBool = AtomicBool::new(true);

/// Globally switch performance events on or off.
///
/// Called by [`crate::build_subscriber`] from
/// [`crate::TracingConfig::enable_performance_tracing`].
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

/// Whether performance events are currently recorded.
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Direction of a copy between memory spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    HostToDevice,
    DeviceToHost,
}

impl TransferDirection {
    /// Short tag used in log fields (`H2D` / `D2H`).
    pub fn as_str(self) -> &'static str {
        match self {
            TransferDirection::HostToDevice => "H2D",
            TransferDirection::DeviceToHost => "D2H",
        }
    }
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RAII guard that measures how long a scope took and logs it on drop.
///
/// Nothing is logged when the elapsed time is below `threshold_us` or when
/// performance tracing is disabled.
pub struct PerformanceSpan {
    threshold_us: Option<u64>,
    start_time: Instant,
    span: tracing::Span,
}

impl PerformanceSpan {
    /// Start timing `span_name`. `threshold_us = None` always logs.
    pub fn new(span_name: impl fmt::Display, threshold_us: Option<u64>) -> Self {
        Self {
            threshold_us,
            start_time: Instant::now(),
            span: tracing::debug_span!("perf", name = %span_name),
        }
    }

    /// Microseconds since the span was created.
    pub fn elapsed_us(&self) -> u64 {
        self.start_time.elapsed().as_micros() as u64
    }
}

impl Drop for PerformanceSpan {
    fn drop(&mut self) {
        if !is_enabled() {
            return;
        }
        let elapsed_us = self.elapsed_us();
        if self.threshold_us.is_none_or(|t| elapsed_us >= t) {
            let _entered = self.span.enter();
            tracing::debug!(
                duration_us = elapsed_us,
                duration_ms = elapsed_us as f64 / 1000.0,
                "performance_span_complete"
            );
        }
    }
}

/// Bandwidth in MiB/s for `bytes` moved in `duration_us`.
pub fn bandwidth_mbps(bytes: usize, duration_us: u64) -> f64 {
    if duration_us > 0 {
        (bytes as f64 / duration_us as f64) * 1_000_000.0 / (1024.0 * 1024.0)
    } else {
        0.0
    }
}

/// Record a host/device copy with size, direction and bandwidth.
pub fn record_transfer(bytes: usize, direction: TransferDirection, duration_us: u64) {
    if !is_enabled() {
        return;
    }
    tracing::debug!(
        event = "transfer",
        bytes = bytes,
        kb = bytes as f64 / 1024.0,
        direction = direction.as_str(),
        duration_us = duration_us,
        bandwidth_mbps = bandwidth_mbps(bytes, duration_us),
        "data_transfer"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn span_measures_elapsed_time() {
        let span = PerformanceSpan::new("dedoppler", None);
        thread::sleep(Duration::from_millis(10));
        assert!(span.elapsed_us() >= 10_000, "elapsed should be at least 10ms");
    }

    #[test]
    fn span_keeps_threshold() {
        let span = PerformanceSpan::new("hitsearch", Some(1000));
        assert_eq!(span.threshold_us, Some(1000));
    }

    #[test]
    fn bandwidth_of_one_mib_per_ms() {
        let bw = bandwidth_mbps(1024 * 1024, 1000);
        assert!((bw - 1000.0).abs() < 0.01);
        assert_eq!(bandwidth_mbps(4096, 0), 0.0);
    }

    #[test]
    fn direction_tags() {
        assert_eq!(TransferDirection::HostToDevice.to_string(), "H2D");
        assert_eq!(TransferDirection::DeviceToHost.as_str(), "D2H");
    }

    #[test]
    fn record_transfer_does_not_panic() {
        record_transfer(4096, TransferDirection::HostToDevice, 250);
    }
}
