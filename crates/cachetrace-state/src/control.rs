//! Trace control state, hot-path publisher and drain protocol.
//!
//! # Protocol
//!
//! Publishers never take a lock. A publish:
//! 1. returns after a single load when no sink is installed;
//! 2. increments its queue's in-flight counter;
//! 3. re-checks that no stop or start is pending and the sink is still
//!    installed;
//! 4. invokes the callback;
//! 5. decrements the counter (guard drop, also on unwind).
//!
//! `stop` sets the pending flag, then sleeps in bounded steps until a full
//! scan finds every queue counter at zero. Any publisher that incremented
//! after the flag was set observes it in step 3 and backs off, so once the
//! scan passes nobody can reach the registration and it is freed.
//!
//! Steps 2/3 and the flag store/counter scan on the stop side form a Dekker
//! pair, so all of them use `SeqCst`.
//!
//! A freshly installed sink starts out in the starting state: ordinary
//! publishes skip it until [`ManagementGuard::open`], so the only records
//! that reach it before then are the ones pushed through
//! [`ManagementGuard::publish`] while the lock is held.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::time::{Duration, Instant};

use cachetrace_event::{CacheId, SeqId};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::error::StateError;
use crate::queue::QueueTraceRef;
use crate::seq::SequenceAllocator;
use crate::sink::{Registration, TraceCallback, TraceContext};

/// Result of a single publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    /// No sink installed; nothing was touched.
    Inactive,
    /// A sink was seen but a pending stop or start won the double-check.
    Skipped,
    /// The callback ran.
    Delivered,
    /// Queue index out of range; dropped.
    InvalidQueue,
}

/// What a drain had to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    /// Number of counter scans that found a publish in flight.
    pub polls: u32,
    pub elapsed: Duration,
}

/// Per-cache trace control state.
///
/// Owned by the cache instance and shared by reference with every I/O queue.
pub struct TraceControl {
    cache_id: CacheId,
    sink: AtomicPtr<Registration>,
    stop_pending: AtomicBool,
    starting: AtomicBool,
    queues: Box<[QueueTraceRef]>,
    io_queues: u32,
    seq: SequenceAllocator,
    mgmt: Mutex<()>,
}

impl TraceControl {
    /// Create inactive trace state for a cache with `io_queues` queues.
    pub fn new(cache_id: CacheId, io_queues: u32) -> Self {
        Self {
            cache_id,
            sink: AtomicPtr::new(ptr::null_mut()),
            stop_pending: AtomicBool::new(false),
            starting: AtomicBool::new(false),
            queues: (0..io_queues).map(|_| QueueTraceRef::new()).collect(),
            io_queues,
            seq: SequenceAllocator::new(),
            mgmt: Mutex::new(()),
        }
    }

    pub const fn cache_id(&self) -> CacheId {
        self.cache_id
    }

    /// Number of I/O queues.
    pub const fn io_queues(&self) -> u32 {
        self.io_queues
    }

    /// Allocate the next event sequence id.
    #[inline]
    pub fn next_id(&self) -> SeqId {
        self.seq.next_id()
    }

    pub const fn sequence(&self) -> &SequenceAllocator {
        &self.seq
    }

    /// Whether a sink is installed (starting, active or draining).
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.sink.load(Ordering::Relaxed).is_null()
    }

    /// Total publishes currently in flight across all queues.
    pub fn in_flight(&self) -> u64 {
        self.queues.iter().map(QueueTraceRef::in_flight).sum()
    }

    /// Take the management lock. Installing and removing the sink is only
    /// possible through the returned guard.
    pub fn lock(&self) -> ManagementGuard<'_> {
        ManagementGuard {
            control: self,
            _lock: self.mgmt.lock(),
        }
    }

    /// Push one record to the sink, if any.
    ///
    /// Never blocks and never takes the management lock.
    #[inline]
    pub fn publish(&self, queue: u32, event: &[u8]) -> Publish {
        self.deliver(queue, event, false)
    }

    #[inline]
    fn deliver(&self, queue: u32, event: &[u8], during_start: bool) -> Publish {
        if self.sink.load(Ordering::Relaxed).is_null() {
            return Publish::Inactive;
        }
        let Some(queue_ref) = self.queues.get(queue as usize) else {
            return Publish::InvalidQueue;
        };

        let _in_flight = queue_ref.enter();

        if self.stop_pending.load(Ordering::SeqCst) {
            return Publish::Skipped;
        }
        if !during_start && self.starting.load(Ordering::SeqCst) {
            return Publish::Skipped;
        }
        let reg = self.sink.load(Ordering::SeqCst);
        if reg.is_null() {
            return Publish::Skipped;
        }

        // SAFETY: we are counted in flight and saw no pending stop after
        // being counted, so `stop` cannot free `reg` before our guard drops.
        let reg = unsafe { &*reg };
        reg.invoke(self.cache_id, queue, event);
        Publish::Delivered
    }

    fn any_in_flight(&self) -> bool {
        self.queues.iter().any(|q| q.in_flight() != 0)
    }
}

impl Drop for TraceControl {
    fn drop(&mut self) {
        let reg = *self.sink.get_mut();
        if !reg.is_null() {
            // SAFETY: `&mut self` excludes every publisher.
            drop(unsafe { Registration::from_raw(reg) });
        }
    }
}

impl std::fmt::Debug for TraceControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceControl")
            .field("cache_id", &self.cache_id)
            .field("active", &self.is_active())
            .field("starting", &self.starting.load(Ordering::Relaxed))
            .field("io_queues", &self.io_queues)
            .field("last_sid", &self.seq.last_id())
            .finish_non_exhaustive()
    }
}

/// Held management lock of a [`TraceControl`].
pub struct ManagementGuard<'a> {
    control: &'a TraceControl,
    _lock: MutexGuard<'a, ()>,
}

impl ManagementGuard<'_> {
    pub const fn control(&self) -> &TraceControl {
        self.control
    }

    /// Install a sink in the starting state.
    ///
    /// Until [`Self::open`] only [`Self::publish`] reaches it; every other
    /// publish returns [`Publish::Skipped`].
    pub fn install(&self, context: TraceContext, callback: TraceCallback) -> Result<(), StateError> {
        let control = self.control;
        if control.is_active() {
            return Err(StateError::AlreadyActive);
        }
        let reg = Registration::into_raw(callback, context);
        // Raised before the sink is visible: whoever sees the pointer sees the flag.
        control.starting.store(true, Ordering::SeqCst);
        control.sink.store(reg, Ordering::SeqCst);
        Ok(())
    }

    /// Publish to a sink that is still starting.
    pub fn publish(&self, queue: u32, event: &[u8]) -> Publish {
        self.control.deliver(queue, event, true)
    }

    /// Let every queue publish to the installed sink.
    pub fn open(&self) {
        self.control.starting.store(false, Ordering::SeqCst);
    }

    /// Whether a sink is installed but not yet opened.
    pub fn is_starting(&self) -> bool {
        self.control.starting.load(Ordering::SeqCst)
    }

    /// Remove the sink, waiting for every in-flight publish to finish.
    ///
    /// When this returns the callback will not run again and the context
    /// clone held by the control state has been dropped.
    pub fn stop(&self, poll_interval: Duration) -> Result<DrainStats, StateError> {
        let control = self.control;
        if !control.is_active() {
            return Err(StateError::NotActive);
        }

        control.stop_pending.store(true, Ordering::SeqCst);

        let started = Instant::now();
        let mut polls = 0u32;
        while control.any_in_flight() {
            polls = polls.saturating_add(1);
            trace!(
                cache = control.cache_id,
                polls,
                in_flight = control.in_flight(),
                "waiting for in-flight trace pushes"
            );
            std::thread::sleep(poll_interval);
        }
        let elapsed = started.elapsed();

        let reg = control.sink.swap(ptr::null_mut(), Ordering::SeqCst);
        control.starting.store(false, Ordering::SeqCst);
        control.stop_pending.store(false, Ordering::SeqCst);

        // SAFETY: installed by `install`, swapped out exactly once under the
        // management lock, and the drain above left no publisher able to
        // reach it.
        drop(unsafe { Registration::from_raw(reg) });

        debug!(
            cache = control.cache_id,
            polls,
            elapsed = ?elapsed,
            "trace sink drained"
        );
        Ok(DrainStats { polls, elapsed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU64;

    const POLL: Duration = Duration::from_millis(1);

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(CacheId, u32, Vec<u8>)>>,
    }

    fn record(cache: CacheId, ctx: &(dyn Any + Send + Sync), queue: u32, event: &[u8]) {
        let rec = ctx.downcast_ref::<Recorder>().unwrap();
        rec.events.lock().push((cache, queue, event.to_vec()));
    }

    fn activate(control: &TraceControl, context: TraceContext, callback: TraceCallback) {
        let mgmt = control.lock();
        mgmt.install(context, callback).unwrap();
        mgmt.open();
    }

    #[test]
    fn test_inactive_publish_is_noop() {
        let control = TraceControl::new(1, 2);
        assert!(!control.is_active());
        assert_eq!(control.publish(0, b"x"), Publish::Inactive);
        assert_eq!(control.in_flight(), 0);
    }

    #[test]
    fn test_publish_delivers() {
        let control = TraceControl::new(7, 2);
        let rec = Arc::new(Recorder::default());
        activate(&control, rec.clone(), record);

        assert_eq!(control.publish(1, b"abc"), Publish::Delivered);
        assert_eq!(control.publish(2, b"abc"), Publish::InvalidQueue);
        assert_eq!(*rec.events.lock(), vec![(7, 1, b"abc".to_vec())]);
        assert_eq!(control.in_flight(), 0);
    }

    #[test]
    fn test_double_install_rejected() {
        let control = TraceControl::new(0, 1);
        let mgmt = control.lock();
        mgmt.install(Arc::new(Recorder::default()), record).unwrap();
        assert_eq!(
            mgmt.install(Arc::new(Recorder::default()), record),
            Err(StateError::AlreadyActive)
        );
    }

    #[test]
    fn test_starting_sink_only_takes_locked_publishes() {
        let control = TraceControl::new(4, 2);
        let rec = Arc::new(Recorder::default());
        let mgmt = control.lock();
        mgmt.install(rec.clone(), record).unwrap();
        assert!(mgmt.is_starting());
        assert!(control.is_active());

        assert_eq!(control.publish(1, b"early"), Publish::Skipped);
        assert_eq!(mgmt.publish(1, b"header"), Publish::Delivered);
        assert_eq!(mgmt.publish(2, b"header"), Publish::InvalidQueue);
        mgmt.open();
        assert!(!mgmt.is_starting());
        assert_eq!(control.publish(1, b"body"), Publish::Delivered);

        let seen: Vec<_> = rec.events.lock().iter().map(|e| e.2.clone()).collect();
        assert_eq!(seen, vec![b"header".to_vec(), b"body".to_vec()]);
        assert_eq!(control.in_flight(), 0);
    }

    #[test]
    fn test_stop_clears_starting() {
        let control = TraceControl::new(0, 1);
        let rec = Arc::new(Recorder::default());
        {
            let mgmt = control.lock();
            mgmt.install(rec.clone(), record).unwrap();
            mgmt.stop(POLL).unwrap();
            assert!(!mgmt.is_starting());
        }
        activate(&control, rec.clone(), record);
        assert_eq!(control.publish(0, b"x"), Publish::Delivered);
    }

    #[test]
    fn test_stop_without_sink() {
        let control = TraceControl::new(0, 1);
        let started = Instant::now();
        assert_eq!(
            control.lock().stop(Duration::from_secs(5)),
            Err(StateError::NotActive)
        );
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_pending_stop_skips_callback() {
        let control = TraceControl::new(0, 1);
        let rec = Arc::new(Recorder::default());
        activate(&control, rec.clone(), record);

        control.stop_pending.store(true, Ordering::SeqCst);
        assert_eq!(control.publish(0, b"late"), Publish::Skipped);
        control.stop_pending.store(false, Ordering::SeqCst);

        assert!(rec.events.lock().is_empty());
        assert_eq!(control.in_flight(), 0);
    }

    #[test]
    fn test_stop_releases_context() {
        let control = TraceControl::new(0, 1);
        let rec = Arc::new(Recorder::default());
        let mgmt = control.lock();
        mgmt.install(rec.clone(), record).unwrap();
        mgmt.open();
        assert_eq!(Arc::strong_count(&rec), 2);

        let stats = mgmt.stop(POLL).unwrap();
        assert_eq!(stats.polls, 0);
        assert!(!control.is_active());
        assert_eq!(Arc::strong_count(&rec), 1);
        assert_eq!(control.publish(0, b"after"), Publish::Inactive);
    }

    #[test]
    fn test_drop_releases_context() {
        let rec = Arc::new(Recorder::default());
        {
            let control = TraceControl::new(0, 1);
            activate(&control, rec.clone(), record);
        }
        assert_eq!(Arc::strong_count(&rec), 1);
    }

    struct Gate {
        entered: AtomicBool,
        release: AtomicBool,
    }

    fn gated(_: CacheId, ctx: &(dyn Any + Send + Sync), _: u32, _: &[u8]) {
        let gate = ctx.downcast_ref::<Gate>().unwrap();
        gate.entered.store(true, Ordering::SeqCst);
        while !gate.release.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
    }

    #[test]
    fn test_stop_waits_for_in_flight_callback() {
        let control = TraceControl::new(0, 2);
        let gate = Arc::new(Gate {
            entered: AtomicBool::new(false),
            release: AtomicBool::new(false),
        });
        activate(&control, gate.clone(), gated);
        let stopped = AtomicBool::new(false);

        std::thread::scope(|s| {
            let publisher = s.spawn(|| control.publish(1, b"slow"));
            while !gate.entered.load(Ordering::SeqCst) {
                std::thread::yield_now();
            }

            let stopper = s.spawn(|| {
                let stats = control.lock().stop(POLL).unwrap();
                stopped.store(true, Ordering::SeqCst);
                stats
            });

            std::thread::sleep(Duration::from_millis(50));
            assert!(!stopped.load(Ordering::SeqCst), "stop returned while in flight");
            assert_eq!(control.in_flight(), 1);

            gate.release.store(true, Ordering::SeqCst);
            assert_eq!(publisher.join().unwrap(), Publish::Delivered);
            let stats = stopper.join().unwrap();
            assert!(stats.polls > 0);
        });

        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(control.in_flight(), 0);
        assert!(!control.is_active());
    }

    fn panicking(_: CacheId, _: &(dyn Any + Send + Sync), _: u32, _: &[u8]) {
        panic!("observer failure");
    }

    #[test]
    fn test_panicking_callback_does_not_block_stop() {
        let control = TraceControl::new(0, 1);
        activate(&control, Arc::new(()), panicking);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            control.publish(0, b"boom");
        }));
        assert!(result.is_err());
        assert_eq!(control.in_flight(), 0);
        control.lock().stop(POLL).unwrap();
    }

    struct Watched {
        closed: AtomicBool,
        calls: AtomicU64,
        violations: AtomicU64,
    }

    fn watched(_: CacheId, ctx: &(dyn Any + Send + Sync), _: u32, _: &[u8]) {
        let w = ctx.downcast_ref::<Watched>().unwrap();
        if w.closed.load(Ordering::SeqCst) {
            w.violations.fetch_add(1, Ordering::SeqCst);
        }
        w.calls.fetch_add(1, Ordering::Relaxed);
        std::hint::spin_loop();
    }

    #[test]
    fn test_no_callback_after_stop_under_load() {
        const QUEUES: u32 = 4;

        for _ in 0..20 {
            let control = TraceControl::new(0, QUEUES);
            let ctx = Arc::new(Watched {
                closed: AtomicBool::new(false),
                calls: AtomicU64::new(0),
                violations: AtomicU64::new(0),
            });
            activate(&control, ctx.clone(), watched);
            let done = AtomicBool::new(false);

            std::thread::scope(|s| {
                for q in 0..QUEUES {
                    let control = &control;
                    let done = &done;
                    s.spawn(move || {
                        while !done.load(Ordering::Relaxed) {
                            control.publish(q, b"payload");
                        }
                    });
                }

                while ctx.calls.load(Ordering::Relaxed) < 100 {
                    std::thread::yield_now();
                }
                control.lock().stop(POLL).unwrap();
                ctx.closed.store(true, Ordering::SeqCst);

                assert!(!control.is_active());
                assert_eq!(Arc::strong_count(&ctx), 1);

                std::thread::sleep(Duration::from_millis(2));
                done.store(true, Ordering::Relaxed);
            });

            assert_eq!(ctx.violations.load(Ordering::SeqCst), 0);
            assert_eq!(control.in_flight(), 0);
        }
    }
}
