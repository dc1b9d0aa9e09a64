//! Trace management: starting and stopping a session on a cache.

use std::sync::Arc;
use std::time::Duration;

use cachetrace_event::{CacheId, Record, SeqId};
use cachetrace_state::{ManagementGuard, Publish, TraceCallback, TraceContext, TraceControl};
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::TraceConfig;
use crate::metrics::TraceMetrics;
use crate::topology::{CacheTopology, emit_snapshot};
use crate::{Error, Result};

/// Tracing subsystem of one cache instance.
///
/// Created with the cache and dropped with it. I/O queues share it by
/// reference; `start_trace`/`stop_trace` serialize on its management lock.
pub struct CacheTrace {
    control: TraceControl,
    clock: Arc<dyn Clock>,
    drain_poll_interval: Duration,
    metrics: TraceMetrics,
}

impl CacheTrace {
    pub fn new(cache_id: CacheId, config: TraceConfig) -> Result<Self> {
        if config.io_queues == 0 {
            return Err(Error::InvalidArgument("cache needs at least one I/O queue"));
        }
        Ok(Self {
            control: TraceControl::new(cache_id, config.io_queues),
            clock: config.clock,
            drain_poll_interval: config.drain_poll_interval,
            metrics: TraceMetrics::new(cache_id),
        })
    }

    pub const fn cache_id(&self) -> CacheId {
        self.control.cache_id()
    }

    pub const fn io_queues(&self) -> u32 {
        self.control.io_queues()
    }

    pub const fn control(&self) -> &TraceControl {
        &self.control
    }

    /// Whether a sink is installed.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.control.is_active()
    }

    /// Publishes currently in flight on all queues.
    pub fn in_flight(&self) -> u64 {
        self.control.in_flight()
    }

    #[inline]
    pub fn next_id(&self) -> SeqId {
        self.control.next_id()
    }

    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.clock.now_ns()
    }

    /// Encode `record` and push it to the sink through `queue`.
    #[inline]
    pub fn publish<R: Record>(&self, queue: u32, record: &R) -> Publish {
        if !self.control.is_active() {
            return Publish::Inactive;
        }
        let outcome = self.control.publish(queue, &record.encode());
        self.metrics.record_publish(R::TYPE, outcome);
        outcome
    }

    /// Publish while the sink installed under `mgmt` is still starting.
    pub(crate) fn publish_locked<R: Record>(
        &self,
        mgmt: &ManagementGuard<'_>,
        queue: u32,
        record: &R,
    ) -> Publish {
        let outcome = mgmt.publish(queue, &record.encode());
        self.metrics.record_publish(R::TYPE, outcome);
        outcome
    }

    /// Start a trace session.
    ///
    /// Installs the sink, then emits the topology snapshot once per I/O
    /// queue. Other publishes skip the sink until every snapshot is out, so
    /// each queue's first record is its cache descriptor. If the snapshot
    /// fails or the callback panics, the sink is removed again.
    pub fn start_trace(
        &self,
        cache: &dyn CacheTopology,
        context: TraceContext,
        callback: Option<TraceCallback>,
    ) -> Result<()> {
        let Some(callback) = callback else {
            return Err(Error::InvalidArgument("trace callback is required"));
        };
        let cache_id = self.cache_id();
        debug_assert_eq!(cache.id(), cache_id, "topology of another cache");

        let mgmt = self.control.lock();
        if let Err(e) = mgmt.install(context, callback) {
            error!(cache = cache_id, "tracing already started");
            return Err(Error::from_state(e, cache_id));
        }

        let rollback = Rollback {
            trace: self,
            mgmt: &mgmt,
            armed: true,
        };
        for queue in 0..self.io_queues() {
            if let Err(e) = emit_snapshot(self, &mgmt, cache, queue) {
                warn!(cache = cache_id, queue, error = %e, "topology snapshot failed");
                return Err(e);
            }
        }
        rollback.disarm();
        mgmt.open();

        self.metrics.record_start();
        info!(cache = cache_id, io_queues = self.io_queues(), "tracing started");
        Ok(())
    }

    /// Stop the trace session.
    ///
    /// Blocks until every publish that saw the sink has returned. Afterwards
    /// the context passed to `start_trace` is no longer referenced.
    pub fn stop_trace(&self) -> Result<()> {
        let cache_id = self.cache_id();
        let mgmt = self.control.lock();
        match mgmt.stop(self.drain_poll_interval) {
            Ok(drain) => {
                self.metrics.record_stop(drain);
                info!(cache = cache_id, polls = drain.polls, "tracing stopped");
                Ok(())
            }
            Err(e) => {
                error!(cache = cache_id, "tracing not started");
                Err(Error::from_state(e, cache_id))
            }
        }
    }
}

/// Removes a half-started sink when `start_trace` leaves early, by error or
/// by unwinding out of the callback.
struct Rollback<'t, 'g> {
    trace: &'t CacheTrace,
    mgmt: &'g ManagementGuard<'t>,
    armed: bool,
}

impl Rollback<'_, '_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Rollback<'_, '_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let cache = self.trace.cache_id();
        warn!(cache, panicking = std::thread::panicking(), "rolling back trace start");
        // Installed under the same lock, so this cannot be NotActive.
        if let Ok(drain) = self.mgmt.stop(self.trace.drain_poll_interval) {
            self.trace.metrics.record_rollback(drain.elapsed);
        }
    }
}

impl std::fmt::Debug for CacheTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheTrace")
            .field("control", &self.control)
            .field("drain_poll_interval", &self.drain_poll_interval)
            .finish_non_exhaustive()
    }
}
