//! Trace sink registration.
//!
//! A sink is a callback plus an opaque context owned by the observer. The
//! control state borrows a clone of the context between `start` and the end
//! of `stop`; it never hands it anywhere except to the callback.

use std::any::Any;
use std::sync::Arc;

use cachetrace_event::CacheId;

/// Observer-owned context passed back to every callback invocation.
pub type TraceContext = Arc<dyn Any + Send + Sync>;

/// Sink callback.
///
/// Arguments: cache id, context, I/O queue index, one complete record.
/// Invoked concurrently from every I/O queue; must not block for long, since
/// a slow callback delays `stop`.
pub type TraceCallback = fn(CacheId, &(dyn Any + Send + Sync), u32, &[u8]);

/// Installed sink. Lives on the heap while active; publishers reach it
/// through a raw pointer guarded by the in-flight counters.
pub(crate) struct Registration {
    pub(crate) callback: TraceCallback,
    pub(crate) context: TraceContext,
}

impl Registration {
    pub(crate) fn into_raw(callback: TraceCallback, context: TraceContext) -> *mut Self {
        Box::into_raw(Box::new(Self { callback, context }))
    }

    /// Reclaim a registration created by [`Registration::into_raw`].
    ///
    /// # Safety
    /// `ptr` must come from `into_raw`, must not be reclaimed twice, and no
    /// publisher may still be using it.
    pub(crate) unsafe fn from_raw(ptr: *mut Self) -> Box<Self> {
        unsafe { Box::from_raw(ptr) }
    }

    #[inline]
    pub(crate) fn invoke(&self, cache: CacheId, queue: u32, event: &[u8]) {
        (self.callback)(cache, self.context.as_ref(), queue, event);
    }
}
