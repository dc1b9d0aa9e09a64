//! Per-queue in-flight accounting for the publisher.

use std::sync::atomic::{AtomicU64, Ordering};

/// In-flight publish counter of one I/O queue.
///
/// Written by publishers running on that queue, read by `stop`. Padded to
/// its own cache line so queues don't false-share.
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct QueueTraceRef {
    in_flight: AtomicU64,
}

impl QueueTraceRef {
    pub const fn new() -> Self {
        Self {
            in_flight: AtomicU64::new(0),
        }
    }

    /// Mark a publish in flight until the returned guard drops.
    #[inline]
    pub(crate) fn enter(&self) -> InFlightGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard { queue: self }
    }

    #[inline]
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Releases the in-flight mark on every exit path, unwinding included.
pub(crate) struct InFlightGuard<'a> {
    queue: &'a QueueTraceRef,
}

impl Drop for InFlightGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.queue.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::align_of;

    #[test]
    fn test_cache_line_aligned() {
        assert_eq!(align_of::<QueueTraceRef>(), 64);
    }

    #[test]
    fn test_guard_releases() {
        let q = QueueTraceRef::new();
        {
            let _a = q.enter();
            let _b = q.enter();
            assert_eq!(q.in_flight(), 2);
        }
        assert_eq!(q.in_flight(), 0);
    }

    #[test]
    fn test_guard_releases_on_panic() {
        let q = QueueTraceRef::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g = q.enter();
            panic!("sink failed");
        }));
        assert!(result.is_err());
        assert_eq!(q.in_flight(), 0);
    }
}
