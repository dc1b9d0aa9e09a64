//! Recording a workload to a trace file and reading it back.

mod common;

use std::sync::Arc;

use cachetrace::sim::{Workload, run_workload};
use cachetrace::{EventStream, EventType, FileSink, ParsedEvent, TraceSummary, read_trace_file};
use common::harness;

fn record(compress: bool) -> (tempfile::TempDir, std::path::PathBuf, u64) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(if compress { "trace.zst" } else { "trace.bin" });

    let h = harness(&[(0, 1 << 30), (1, 1 << 30), (2, 1 << 30)], 2);
    let sink = Arc::new(FileSink::create(&path, compress).unwrap());
    h.cache
        .start_trace(sink.clone(), Some(FileSink::push))
        .unwrap();

    let workload = Workload {
        ios_per_queue: 500,
        hit_ratio: 0.5,
        file_ratio: 0.1,
        seed: 99,
        ..Workload::default()
    };
    let stats = run_workload(&h.cache, &workload, &|_: u64| {}).unwrap();
    h.cache.stop_trace().unwrap();

    let file = sink.finish().unwrap();
    assert_eq!(file.errors, 0);
    assert_eq!(file.records, stats.delivered + 2 * 4);
    (dir, path, stats.completed)
}

#[test]
fn test_summary_of_recorded_trace() {
    let (_dir, path, completed) = record(false);
    let data = read_trace_file(&path).unwrap();
    let summary = TraceSummary::from_bytes(&data).unwrap();

    assert_eq!(summary.sessions.len(), 2);
    assert!(summary.sessions.iter().all(|d| d.cores_no == 3 && d.io_queues_no == 2));
    assert_eq!(summary.count(EventType::CoreDesc), 2 * 3);
    assert_eq!(
        summary.count(EventType::Io) + summary.count(EventType::IoFile),
        completed
    );
    assert!(summary.count(EventType::IoFile) > 0);
    assert_eq!(summary.count(EventType::IoCompletion), completed);
    assert_eq!(summary.matched, completed);
    assert_eq!(summary.unmatched_completions, 0);
    assert_eq!(summary.pending_ios, 0);
    assert_eq!(summary.bytes, data.len());
    let ratio = summary.hit_ratio().unwrap();
    assert!(ratio > 0.3 && ratio < 0.7, "hit ratio {ratio}");
}

#[test]
fn test_compressed_trace_reads_back() {
    let (_dir, path, completed) = record(true);
    let data = read_trace_file(&path).unwrap();
    assert_ne!(std::fs::read(&path).unwrap().len(), data.len());

    let mut sids = Vec::new();
    for event in EventStream::new(&data) {
        sids.push(event.unwrap().sid());
    }
    assert_eq!(sids.len() as u64, 2 * 4 + 2 * completed);
    sids.sort_unstable();
    sids.dedup();
    // Unique across queues.
    assert_eq!(sids.len() as u64, 2 * 4 + 2 * completed);
}

#[test]
fn test_per_queue_records_start_with_snapshot() {
    let (_dir, path, _) = record(false);
    let data = read_trace_file(&path).unwrap();
    let first = EventStream::new(&data).next().unwrap().unwrap();
    assert!(matches!(first, ParsedEvent::CacheDesc(_)));
}
