//! Record command.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cachetrace::sim::{SimCache, SimConfig, Workload, run_workload};
use cachetrace::{FileSink, TraceConfig};
use tracing::error;

use crate::cli::{CacheArgs, EXIT_FAILURE, EXIT_SUCCESS, WorkloadArgs};
use crate::terminal::{self, Progress};

/// Handle the `record` command.
pub fn cmd_record(
    output: &Path,
    compress: bool,
    cache_args: &CacheArgs,
    workload_args: &WorkloadArgs,
    drain_poll_ms: u64,
    silent: bool,
) -> i32 {
    let io_queues = cache_args.io_queues();
    let config = SimConfig {
        id: cache_args.cache_id,
        line_size: cache_args.line_size.into(),
        mode: cache_args.mode.into(),
        attached_size: (!cache_args.detached).then_some(cache_args.cache_size),
        cores: (0..cache_args.cores)
            .map(|id| (id, cache_args.core_size))
            .collect(),
    };
    let trace_config = TraceConfig::new(io_queues)
        .with_drain_poll_interval(Duration::from_millis(drain_poll_ms));

    let cache = match SimCache::new(config, trace_config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to build cache");
            return EXIT_FAILURE;
        }
    };

    let sink = match FileSink::create(output, compress) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, path = %output.display(), "failed to create trace file");
            return EXIT_FAILURE;
        }
    };

    if let Err(e) = cache.start_trace(sink.clone(), Some(FileSink::push)) {
        error!(error = %e, "failed to start tracing");
        return EXIT_FAILURE;
    }

    let workload = Workload {
        ios_per_queue: workload_args.ios,
        io_bytes: workload_args.io_size,
        hit_ratio: workload_args.hit_ratio,
        file_ratio: workload_args.file_ratio,
        seed: workload_args.seed,
    };
    let total = workload.ios_per_queue * u64::from(io_queues);
    let progress = (!silent).then(|| Progress::new(total, "I/O"));
    let start = Instant::now();

    let result = run_workload(&cache, &workload, &|n: u64| {
        if let Some(p) = &progress {
            p.inc(n);
        }
    });
    let elapsed = start.elapsed();
    if let Some(p) = &progress {
        p.finish();
    }

    // Stop even if the workload failed so the file is complete up to that point.
    let stopped = cache.stop_trace();
    let file_stats = sink.finish();

    let stats = match result {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "workload failed");
            return EXIT_FAILURE;
        }
    };
    if let Err(e) = stopped {
        error!(error = %e, "failed to stop tracing");
        return EXIT_FAILURE;
    }
    let file_stats = match file_stats {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, path = %output.display(), "failed to finish trace file");
            return EXIT_FAILURE;
        }
    };

    if !silent {
        terminal::success(&format!(
            "{} I/Os on {} queues in {:.2?} ({} reads, {} writes, {} flushes, {} discards, {} fast path)",
            stats.submitted(),
            io_queues,
            elapsed,
            stats.reads,
            stats.writes,
            stats.flushes,
            stats.discards,
            stats.fast_path,
        ));
        terminal::info(&format!(
            "{} records, {} bytes written",
            file_stats.records, file_stats.bytes
        ));
        if file_stats.errors > 0 {
            terminal::warning(&format!("{} records lost to write errors", file_stats.errors));
        }
        terminal::path_output(output);
    }
    EXIT_SUCCESS
}
