//! Dump command.

use std::io::{self, BufWriter, Write};
use std::path::Path;

use cachetrace::{EventStream, EventType, TraceSummary, format_event, read_trace_file};
use tracing::error;

use crate::cli::{DumpFormat, EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal::{self, Alignment, Table};

/// Handle the `dump` command.
pub fn cmd_dump(input: &Path, format: DumpFormat, limit: Option<usize>) -> i32 {
    let data = match read_trace_file(input) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, path = %input.display(), "failed to read trace file");
            return EXIT_FAILURE;
        }
    };

    match format {
        DumpFormat::Text => dump_text(&data, limit),
        DumpFormat::Summary => dump_summary(&data),
    }
}

fn dump_text(data: &[u8], limit: Option<usize>) -> i32 {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut stream = EventStream::new(data);
    for event in stream.by_ref().take(limit.unwrap_or(usize::MAX)) {
        match event {
            Ok(ev) => {
                if writeln!(out, "{}", format_event(&ev)).is_err() {
                    // Closed pipe.
                    return EXIT_SUCCESS;
                }
            }
            Err(e) => {
                let _ = out.flush();
                error!(error = %e, "trace decode failed");
                return EXIT_FAILURE;
            }
        }
    }
    let _ = out.flush();
    EXIT_SUCCESS
}

fn dump_summary(data: &[u8]) -> i32 {
    let summary = match TraceSummary::from_bytes(data) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "trace decode failed");
            return EXIT_FAILURE;
        }
    };

    let mut table = Table::new(vec!["Record", "Count"])
        .with_alignments(vec![Alignment::Left, Alignment::Right]);
    for ty in [
        EventType::CacheDesc,
        EventType::CoreDesc,
        EventType::Io,
        EventType::IoFile,
        EventType::IoCompletion,
    ] {
        table.add_row(vec![ty.to_string(), summary.count(ty).to_string()]);
    }
    if summary.unknown > 0 {
        table.add_row(vec!["unknown".to_string(), summary.unknown.to_string()]);
    }
    table.print();
    println!();

    let mut ops = Table::new(vec!["Operation", "Count"])
        .with_alignments(vec![Alignment::Left, Alignment::Right]);
    for (name, count) in [
        ("read", summary.reads),
        ("write", summary.writes),
        ("flush", summary.flushes),
        ("discard", summary.discards),
    ] {
        ops.add_row(vec![name.to_string(), count.to_string()]);
    }
    ops.print();
    println!();

    for desc in &summary.sessions {
        println!(
            "cache {}: line {} mode {} size {} cores {} queues {}",
            desc.id,
            desc.cache_line_size.bytes(),
            desc.cache_mode,
            desc.cache_size,
            desc.cores_no,
            desc.io_queues_no
        );
    }
    println!("records: {} ({} bytes)", summary.records, summary.bytes);
    if let (Some(first), Some(last)) = (summary.first_sid, summary.last_sid) {
        println!("sids: {first}..={last}");
    }
    println!("span: {} ns", summary.span_ns);
    println!("completions matched: {}", summary.matched);
    match summary.hit_ratio() {
        Some(ratio) => println!("hit ratio: {:.2}%", ratio * 100.0),
        None => println!("hit ratio: n/a"),
    }

    if summary.unmatched_completions > 0 {
        terminal::warning(&format!(
            "{} completions reference I/Os missing from the trace",
            summary.unmatched_completions
        ));
    }
    if summary.pending_ios > 0 {
        terminal::warning(&format!("{} I/Os never completed", summary.pending_ios));
    }
    EXIT_SUCCESS
}
