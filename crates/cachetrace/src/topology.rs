//! Cache/core topology as seen by the tracer, and the snapshot emitted when
//! a trace session starts.

use cachetrace_event::{CacheDescEvent, CacheId, CacheLineSize, CacheMode, CoreDescEvent, CoreId};
use cachetrace_state::ManagementGuard;
use tracing::debug;

use crate::Result;
use crate::trace::CacheTrace;

/// A core (backing device) attached to the cache.
pub trait CoreTopology {
    fn id(&self) -> CoreId;

    /// Size of the backing device in bytes.
    fn size(&self) -> u64;
}

/// The cache instance being traced.
pub trait CacheTopology {
    fn id(&self) -> CacheId;

    fn line_size(&self) -> CacheLineSize;

    fn mode(&self) -> CacheMode;

    /// Caching device size in bytes, `None` while the device is detached.
    fn attached_size(&self) -> Option<u64>;

    fn core_count(&self) -> u32;

    /// Visit every valid, opened core in ascending id order.
    ///
    /// Stops at and returns the first visitor error.
    fn visit_cores(&self, visitor: &mut dyn FnMut(&dyn CoreTopology) -> Result<()>) -> Result<()>;
}

/// Emit the cache descriptor and one core descriptor per core on `queue`,
/// through the sink `mgmt` is starting.
pub(crate) fn emit_snapshot(
    trace: &CacheTrace,
    mgmt: &ManagementGuard<'_>,
    cache: &dyn CacheTopology,
    queue: u32,
) -> Result<()> {
    let desc = CacheDescEvent::new(
        trace.next_id(),
        trace.now_ns(),
        cache.id(),
        cache.line_size(),
        cache.mode(),
        cache.attached_size().unwrap_or(0),
        cache.core_count(),
        trace.io_queues(),
    );
    trace.publish_locked(mgmt, queue, &desc);

    let mut cores = 0u32;
    cache.visit_cores(&mut |core| {
        let ev = CoreDescEvent::new(trace.next_id(), trace.now_ns(), core.id(), core.size());
        trace.publish_locked(mgmt, queue, &ev);
        cores += 1;
        Ok(())
    })?;

    debug!(cache = cache.id(), queue, cores, "topology snapshot emitted");
    Ok(())
}
