//! Per-cache trace control state.
//!
//! This crate holds the part of the tracing subsystem that runs on the I/O
//! hot path: the sequence id allocator, the installed sink, the per-queue
//! in-flight counters and the drain protocol that lets `stop` detach a sink
//! without racing concurrent publishers.
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use cachetrace_state::TraceControl;
//!
//! let control = TraceControl::new(0, 4);
//! let mgmt = control.lock();
//! mgmt.install(Arc::new(()), |_, _, _, _| {})?;
//! mgmt.publish(0, &header);
//! mgmt.open();
//! drop(mgmt);
//! control.publish(2, &record);
//! control.lock().stop(Duration::from_millis(20))?;
//! ```

mod control;
mod error;
mod queue;
mod seq;
mod sink;

pub use control::{DrainStats, ManagementGuard, Publish, TraceControl};
pub use error::StateError;
pub use queue::QueueTraceRef;
pub use seq::SequenceAllocator;
pub use sink::{TraceCallback, TraceContext};
