//! CLI definitions and argument types.

use std::path::PathBuf;

use cachetrace::{CacheLineSize, CacheMode};
use clap::{Parser, Subcommand, ValueEnum};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "cachetrace")]
#[command(about = "Cache event tracer - records and inspects I/O traces of a simulated cache")]
#[command(version)]
pub struct Cli {
    /// Show metrics summary after execution
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Enable verbose output (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a simulated workload with tracing enabled and write the trace
    Record {
        /// Output trace file
        #[arg(short, long, default_value = "trace.bin")]
        output: PathBuf,

        /// Compress the trace with zstd
        #[arg(long)]
        compress: bool,

        #[command(flatten)]
        cache: CacheArgs,

        #[command(flatten)]
        workload: WorkloadArgs,

        /// Sleep between in-flight scans while stopping, in milliseconds
        #[arg(long, default_value = "20")]
        drain_poll_ms: u64,
    },
    /// Decode a trace file
    Dump {
        /// Input trace file (plain or zstd)
        #[arg(value_name = "TRACE")]
        input: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: DumpFormat,

        /// Print at most this many records (text format)
        #[arg(long)]
        limit: Option<usize>,
    },
}

/// Shape of the simulated cache.
#[derive(clap::Args, Clone, Debug)]
pub struct CacheArgs {
    /// Cache instance id
    #[arg(long, default_value = "1")]
    pub cache_id: u16,

    /// Number of cores (ids 0..N)
    #[arg(long, default_value = "2")]
    pub cores: u16,

    /// Size of each core in bytes
    #[arg(long, default_value = "1099511627776")]
    pub core_size: u64,

    /// Number of I/O queues (0 = one per CPU)
    #[arg(short = 'q', long, default_value = "0")]
    pub queues: u32,

    /// Cache line size
    #[arg(long, value_enum, default_value = "4k")]
    pub line_size: LineSizeArg,

    /// Cache mode
    #[arg(long, value_enum, default_value = "wt")]
    pub mode: CacheModeArg,

    /// Caching device size in bytes
    #[arg(long, default_value = "17179869184")]
    pub cache_size: u64,

    /// Trace a cache whose caching device is detached
    #[arg(long)]
    pub detached: bool,
}

impl CacheArgs {
    /// Queue count with `0` resolved to the CPU count.
    pub fn io_queues(&self) -> u32 {
        if self.queues == 0 {
            u32::try_from(num_cpus::get()).unwrap_or(1)
        } else {
            self.queues
        }
    }
}

/// Workload knobs.
#[derive(clap::Args, Clone, Debug)]
pub struct WorkloadArgs {
    /// I/Os issued on each queue
    #[arg(short = 'n', long, default_value = "10000")]
    pub ios: u64,

    /// Read/write request size in bytes
    #[arg(long, default_value = "4096")]
    pub io_size: u32,

    /// Fraction of requests served from cache
    #[arg(long, default_value = "0.7")]
    pub hit_ratio: f64,

    /// Fraction of requests addressed through a file
    #[arg(long, default_value = "0.0")]
    pub file_ratio: f64,

    /// Workload seed
    #[arg(long, default_value = "24301")]
    pub seed: u64,
}

/// Cache line size.
#[derive(Clone, Copy, Debug, ValueEnum, Default)]
pub enum LineSizeArg {
    #[default]
    #[value(name = "4k")]
    Size4K,
    #[value(name = "8k")]
    Size8K,
    #[value(name = "16k")]
    Size16K,
    #[value(name = "32k")]
    Size32K,
    #[value(name = "64k")]
    Size64K,
}

impl From<LineSizeArg> for CacheLineSize {
    fn from(arg: LineSizeArg) -> Self {
        match arg {
            LineSizeArg::Size4K => Self::Size4K,
            LineSizeArg::Size8K => Self::Size8K,
            LineSizeArg::Size16K => Self::Size16K,
            LineSizeArg::Size32K => Self::Size32K,
            LineSizeArg::Size64K => Self::Size64K,
        }
    }
}

/// Cache mode.
#[derive(Clone, Copy, Debug, ValueEnum, Default)]
pub enum CacheModeArg {
    /// Write-through (default)
    #[default]
    Wt,
    /// Write-back
    Wb,
    /// Write-around
    Wa,
    /// Pass-through
    Pt,
    /// Write-invalidate
    Wi,
}

impl From<CacheModeArg> for CacheMode {
    fn from(arg: CacheModeArg) -> Self {
        match arg {
            CacheModeArg::Wt => Self::WriteThrough,
            CacheModeArg::Wb => Self::WriteBack,
            CacheModeArg::Wa => Self::WriteAround,
            CacheModeArg::Pt => Self::PassThrough,
            CacheModeArg::Wi => Self::WriteInvalidate,
        }
    }
}

/// Output format for the dump command.
#[derive(Clone, Copy, Debug, ValueEnum, Default)]
pub enum DumpFormat {
    /// One line per record (default)
    #[default]
    Text,
    /// Counts, I/O correlation and hit ratio
    Summary,
}
