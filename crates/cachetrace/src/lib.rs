//! cachetrace - event tracing for a block-level cache engine
//!
//! Captures cache/core topology, per-I/O operations and I/O completions from
//! the engine's I/O path and hands each record to an observer-supplied sink.
//! The sink can be detached at any time; once [`CacheTrace::stop_trace`]
//! returns, no callback runs and the observer's context is released.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cachetrace::sim::{SimCache, SimConfig, SimRequest};
//! use cachetrace::{FileSink, TraceConfig};
//!
//! let cache = SimCache::new(SimConfig::default(), TraceConfig::new(2))?;
//! let sink = Arc::new(FileSink::create("trace.bin", false)?);
//! cache.start_trace(sink.clone(), Some(FileSink::push))?;
//!
//! let io = cache.new_io(SimRequest::read(0, 1, 100, 4096));
//! cache.submit(&io)?;
//! cache.complete(io);
//!
//! cache.stop_trace()?;
//! sink.finish()?;
//! ```

pub use cachetrace_event::{
    CacheId, CacheLineSize, CacheMode, CoreId, EVENT_VERSION, EventStream, EventType, Operation,
    ParsedEvent, Record, SeqId, parse_event,
};
pub use cachetrace_state::{Publish, TraceCallback, TraceContext};

mod clock;
mod config;
mod error;
mod file;
mod io;
pub mod metrics;
pub mod sim;
mod summary;
mod topology;
mod trace;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{DEFAULT_DRAIN_POLL_INTERVAL, TraceConfig};
pub use error::{Error, Result};
pub use file::{FileSink, FileSinkStats, read_trace_file};
pub use io::{FileExtent, IoRequest, TraceIo};
pub use summary::{TraceSummary, format_event};
pub use topology::{CacheTopology, CoreTopology};
pub use trace::CacheTrace;
