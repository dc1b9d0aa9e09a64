//! Offline analysis of a decoded trace.

use std::fmt::Write as _;

use cachetrace_event::{CacheDescEvent, EventStream, EventType, Operation, ParsedEvent, SeqId};
use rustc_hash::FxHashMap;

use crate::Result;

/// One line of human-readable text per record.
pub fn format_event(event: &ParsedEvent) -> String {
    let mut out = format!("{:>8} {:>14} ", event.sid(), event.timestamp());
    // Writing to a String cannot fail.
    let _ = match event {
        ParsedEvent::CacheDesc(e) => write!(
            out,
            "cache-desc id={} line={} mode={} size={} cores={} queues={} version={}",
            e.id,
            e.cache_line_size.bytes(),
            e.cache_mode,
            e.cache_size,
            e.cores_no,
            e.io_queues_no,
            e.version
        ),
        ParsedEvent::CoreDesc(e) => write!(out, "core-desc  id={} size={}", e.id, e.core_size),
        ParsedEvent::Io(e) => write!(
            out,
            "io         {} lba={} len={} class={} core={}",
            e.operation, e.lba, e.len, e.io_class, e.core_id
        ),
        ParsedEvent::IoFile(e) => write!(
            out,
            "io-file    {} lba={} len={} class={} core={} file={} offset={}",
            e.io.operation,
            e.io.lba,
            e.io.len,
            e.io.io_class,
            e.io.core_id,
            e.file_id,
            e.file_offset
        ),
        ParsedEvent::IoCompletion(e) => write!(
            out,
            "io-cmpl    rsid={} {}",
            e.rsid,
            if e.is_hit { "hit" } else { "miss" }
        ),
        ParsedEvent::Unknown { raw_type, size, .. } => {
            write!(out, "unknown    type={raw_type} size={size}")
        }
    };
    out
}

/// Aggregate view of a trace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceSummary {
    pub records: u64,
    pub bytes: usize,
    /// Records per known type, indexed by [`EventType`] value.
    pub by_type: [u64; 5],
    pub unknown: u64,
    /// Cache descriptors seen, one per queue per session.
    pub sessions: Vec<CacheDescEvent>,
    pub reads: u64,
    pub writes: u64,
    pub flushes: u64,
    pub discards: u64,
    /// Completions whose reference sid matched an I/O event.
    pub matched: u64,
    pub hits: u64,
    /// Completions referencing an I/O event not in the trace.
    pub unmatched_completions: u64,
    /// I/O events without a completion.
    pub pending_ios: u64,
    pub first_sid: Option<SeqId>,
    pub last_sid: Option<SeqId>,
    /// Largest timestamp minus smallest timestamp.
    pub span_ns: u64,
}

impl TraceSummary {
    /// Decode `data` and summarize it. Fails on the first malformed record.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut summary = Self::default();
        let mut ios: FxHashMap<SeqId, Operation> = FxHashMap::default();
        let mut completions: Vec<(SeqId, bool)> = Vec::new();
        let mut ts_min = u64::MAX;
        let mut ts_max = 0u64;

        let mut stream = EventStream::new(data);
        for event in stream.by_ref() {
            let event = event?;
            summary.records += 1;
            let sid = event.sid();
            summary.first_sid = Some(summary.first_sid.map_or(sid, |s| s.min(sid)));
            summary.last_sid = Some(summary.last_sid.map_or(sid, |s| s.max(sid)));
            ts_min = ts_min.min(event.timestamp());
            ts_max = ts_max.max(event.timestamp());

            match event.event_type() {
                Some(ty) => summary.by_type[ty as usize] += 1,
                None => summary.unknown += 1,
            }
            match event {
                ParsedEvent::CacheDesc(e) => summary.sessions.push(e),
                ParsedEvent::Io(e) => {
                    ios.insert(sid, e.operation);
                }
                ParsedEvent::IoFile(e) => {
                    ios.insert(sid, e.io.operation);
                }
                ParsedEvent::IoCompletion(e) => completions.push((e.rsid, e.is_hit)),
                ParsedEvent::CoreDesc(_) | ParsedEvent::Unknown { .. } => {}
            }
        }
        summary.bytes = stream.offset();
        if summary.records > 0 {
            summary.span_ns = ts_max - ts_min;
        }

        for op in ios.values() {
            match op {
                Operation::Read => summary.reads += 1,
                Operation::Write => summary.writes += 1,
                Operation::Flush => summary.flushes += 1,
                Operation::Discard => summary.discards += 1,
            }
        }
        // Completions may land before their I/O event when queues interleave,
        // so correlate only once the whole trace is read.
        for (rsid, hit) in completions {
            if ios.remove(&rsid).is_some() {
                summary.matched += 1;
                summary.hits += u64::from(hit);
            } else {
                summary.unmatched_completions += 1;
            }
        }
        summary.pending_ios = ios.len() as u64;
        Ok(summary)
    }

    pub const fn count(&self, ty: EventType) -> u64 {
        self.by_type[ty as usize]
    }

    /// Hits over matched completions, `None` without completions.
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> Option<f64> {
        (self.matched > 0).then(|| self.hits as f64 / self.matched as f64)
    }
}
