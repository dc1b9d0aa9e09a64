//! cachetrace CLI - cache event tracer

mod cli;
mod commands;
mod terminal;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    // Must be installed before any cache resolves its metric handles.
    let metrics_handle = if cli.metrics {
        let recorder = cachetrace::metrics::CliRecorder::new();
        recorder.install()
    } else {
        None
    };

    cachetrace::metrics::init();

    let default_level = if cli.verbose {
        "cachetrace=debug"
    } else if cli.silent {
        "cachetrace=warn"
    } else {
        "cachetrace=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(default_level.parse().unwrap()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = commands::run_command(&cli);

    if let Some(handle) = metrics_handle {
        commands::print_metrics(&handle.report());
    }

    std::process::exit(exit_code);
}
