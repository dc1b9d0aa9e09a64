//! Per-cache event sequence ids.

use std::sync::atomic::{AtomicU64, Ordering};

use cachetrace_event::SeqId;

/// Monotonic sequence id allocator.
///
/// Ids start at 1 and are never reused. Wraparound at 2^64 is not handled.
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    last: AtomicU64,
}

impl SequenceAllocator {
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Allocate the next id.
    #[inline]
    pub fn next_id(&self) -> SeqId {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Last id handed out (0 if none).
    pub fn last_id(&self) -> SeqId {
        self.last.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_starts_at_one() {
        let seq = SequenceAllocator::new();
        assert_eq!(seq.last_id(), 0);
        assert_eq!(seq.next_id(), 1);
        assert_eq!(seq.next_id(), 2);
        assert_eq!(seq.last_id(), 2);
    }

    #[test]
    fn test_unique_under_contention() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 10_000;

        let seq = SequenceAllocator::new();
        let per_thread: Vec<Vec<SeqId>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| s.spawn(|| (0..PER_THREAD).map(|_| seq.next_id()).collect()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut all = HashSet::new();
        for ids in &per_thread {
            // Each thread observes its own ids in increasing order.
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            for id in ids {
                assert!(all.insert(*id), "duplicate id {id}");
            }
        }
        assert_eq!(all.len(), THREADS * PER_THREAD);
        assert_eq!(seq.last_id(), (THREADS * PER_THREAD) as u64);
    }
}
