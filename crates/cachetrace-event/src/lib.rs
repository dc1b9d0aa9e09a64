//! Trace records emitted by the cache tracing subsystem.
//!
//! A trace is a stream of variable-length, self-describing binary records.
//! Each record starts with a common header (sequence id, timestamp, type,
//! size) followed by type-specific fields. Producers encode records with
//! [`Record::encode`] into a stack buffer; consumers walk a byte stream with
//! [`EventStream`].
//!
//! ```ignore
//! use cachetrace_event::{EventStream, IoCompletionEvent, Record};
//!
//! let rec = IoCompletionEvent::new(2, 1_000, 1, true).encode();
//! for event in EventStream::new(&rec) {
//!     println!("{:?}", event?);
//! }
//! ```

mod parse;
mod record;
mod types;

pub use parse::{DecodeError, EventStream, ParsedEvent, parse_event};
pub use record::{
    CacheDescEvent, CoreDescEvent, EncodedEvent, EventHeader, HEADER_SIZE, IoCompletionEvent,
    IoEvent, IoFields, IoFileEvent, MAX_RECORD_SIZE, Record, RecordWriter,
};
pub use types::{
    CacheId, CacheLineSize, CacheMode, CoreId, EVENT_VERSION, EventType, Operation, SECTOR_SHIFT,
    SeqId,
};
