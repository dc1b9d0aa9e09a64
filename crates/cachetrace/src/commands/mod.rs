//! Command implementations.
//!
//! Each submodule handles one CLI command.

mod dump;
mod record;

use cachetrace::EventType;
use cachetrace::metrics::CacheReport;

use crate::cli::{Cli, Commands};
use crate::terminal::{Alignment, Table};

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Record { .. } => handle_record(cli),
        Commands::Dump {
            input,
            format,
            limit,
        } => dump::cmd_dump(input, *format, *limit),
    }
}

fn handle_record(cli: &Cli) -> i32 {
    let Commands::Record {
        output,
        compress,
        cache,
        workload,
        drain_poll_ms,
    } = &cli.command
    else {
        unreachable!("record command variant mismatch");
    };

    record::cmd_record(output, *compress, cache, workload, *drain_poll_ms, cli.silent)
}

/// Print the `--metrics` summary: one row per traced cache.
pub fn print_metrics(reports: &[CacheReport]) {
    if reports.is_empty() {
        println!("No metrics collected.");
        return;
    }
    let ms = |secs: Option<f64>| secs.map_or_else(|| "-".to_string(), |s| format!("{:.3}", s * 1e3));

    println!();
    println!("## Trace metrics");
    println!();
    let mut table = Table::new(vec![
        "Cache", "Sessions", "I/O", "Completions", "Headers", "Skipped", "Drain polls",
        "Drain p50 ms", "Drain p99 ms", "Drain max ms",
    ])
    .with_alignments(
        std::iter::once(Alignment::Left)
            .chain(std::iter::repeat_n(Alignment::Right, 9))
            .collect(),
    );
    for r in reports {
        let io = r.delivered[EventType::Io as usize] + r.delivered[EventType::IoFile as usize];
        let headers =
            r.delivered[EventType::CacheDesc as usize] + r.delivered[EventType::CoreDesc as usize];
        table.add_row(vec![
            r.cache.clone(),
            r.sessions_started.to_string(),
            io.to_string(),
            r.delivered[EventType::IoCompletion as usize].to_string(),
            headers.to_string(),
            r.skipped.to_string(),
            r.drain_polls.to_string(),
            ms(r.drain_percentile(0.5)),
            ms(r.drain_percentile(0.99)),
            ms(r.drain_percentile(1.0)),
        ]);
    }
    table.print();
}
