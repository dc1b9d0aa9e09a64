#![allow(dead_code)]

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use cachetrace::sim::{SimCache, SimConfig};
use cachetrace::{CacheId, CoreId, ManualClock, ParsedEvent, TraceConfig};
use parking_lot::Mutex;

/// Fast drain polling keeps stop-heavy tests quick.
pub const TEST_POLL: Duration = Duration::from_millis(1);

/// Sink context that keeps every record with the queue it arrived on.
#[derive(Default)]
pub struct Collector {
    records: Mutex<Vec<(u32, Vec<u8>)>>,
}

impl Collector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(_cache: CacheId, context: &(dyn Any + Send + Sync), queue: u32, event: &[u8]) {
        let collector = context
            .downcast_ref::<Self>()
            .expect("context is a Collector");
        collector.records.lock().push((queue, event.to_vec()));
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// All records in delivery order, decoded.
    pub fn events(&self) -> Vec<(u32, ParsedEvent)> {
        self.records
            .lock()
            .iter()
            .map(|(q, bytes)| (*q, parse_one(bytes)))
            .collect()
    }

    pub fn on_queue(&self, queue: u32) -> Vec<ParsedEvent> {
        self.events()
            .into_iter()
            .filter(|(q, _)| *q == queue)
            .map(|(_, e)| e)
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

/// Decode a buffer that must hold exactly one record.
pub fn parse_one(bytes: &[u8]) -> ParsedEvent {
    let (event, len) = cachetrace::parse_event(bytes).expect("well-formed record");
    assert_eq!(len, bytes.len(), "sink received more than one record");
    event
}

pub struct Harness {
    pub cache: SimCache,
    pub clock: Arc<ManualClock>,
}

/// Cache with the given cores and queues, driven by a manual clock.
pub fn harness(cores: &[(CoreId, u64)], io_queues: u32) -> Harness {
    let clock = Arc::new(ManualClock::new(1_000));
    let config = SimConfig {
        cores: cores.to_vec(),
        ..SimConfig::default()
    };
    let trace_config = TraceConfig::new(io_queues)
        .with_drain_poll_interval(TEST_POLL)
        .with_clock(clock.clone());
    let cache = SimCache::new(config, trace_config).expect("valid cache config");
    Harness { cache, clock }
}
