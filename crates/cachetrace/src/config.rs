//! Trace configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, MonotonicClock};

/// Default interval between in-flight counter scans while stopping.
pub const DEFAULT_DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Per-cache trace configuration.
#[derive(Clone)]
pub struct TraceConfig {
    /// Number of I/O queues of the cache (at least 1).
    pub io_queues: u32,
    /// Sleep between in-flight scans in `stop`.
    pub drain_poll_interval: Duration,
    /// Timestamp source.
    pub clock: Arc<dyn Clock>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            io_queues: 1,
            drain_poll_interval: DEFAULT_DRAIN_POLL_INTERVAL,
            clock: Arc::new(MonotonicClock::new()),
        }
    }
}

impl TraceConfig {
    pub fn new(io_queues: u32) -> Self {
        Self::default().with_io_queues(io_queues)
    }

    #[must_use]
    pub fn with_io_queues(mut self, io_queues: u32) -> Self {
        self.io_queues = io_queues;
        self
    }

    #[must_use]
    pub fn with_drain_poll_interval(mut self, interval: Duration) -> Self {
        self.drain_poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl fmt::Debug for TraceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceConfig")
            .field("io_queues", &self.io_queues)
            .field("drain_poll_interval", &self.drain_poll_interval)
            .finish_non_exhaustive()
    }
}
