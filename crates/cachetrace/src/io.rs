//! Per-I/O event emission.
//!
//! An I/O gets its sequence id and timestamp once, at admission
//! ([`CacheTrace::init_io`]). The I/O event emitted later reuses them, so
//! consumers see admission order and timing even when emission is delayed.
//! Completions get a fresh id and reference the admission id.

use cachetrace_event::{
    CoreId, IoCompletionEvent, IoEvent, IoFields, IoFileEvent, Operation, SECTOR_SHIFT, SeqId,
};
use cachetrace_state::Publish;

use crate::trace::CacheTrace;

/// Tracing metadata stored on an in-flight I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceIo {
    /// Sequence id allocated at admission.
    pub sid: SeqId,
    /// Admission timestamp (ns).
    pub timestamp: u64,
}

/// Location of an I/O within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileExtent {
    pub file_id: u64,
    pub offset: u64,
}

/// The request fields the tracer reads.
pub trait IoRequest {
    /// Address as submitted.
    fn address(&self) -> u64;

    /// Length in bytes.
    fn bytes(&self) -> u32;

    /// Discard length in sectors (discard requests only).
    fn discard_sectors(&self) -> u64 {
        0
    }

    fn io_class(&self) -> u32;

    fn core_id(&self) -> CoreId;

    /// I/O queue the request is processed on.
    fn queue(&self) -> u32;

    /// Whether the request was served from cache. Read at completion.
    fn is_hit(&self) -> bool;

    fn file_extent(&self) -> Option<FileExtent> {
        None
    }
}

/// I/O event length in bytes. Discards carry a sector count.
fn event_len<R: IoRequest + ?Sized>(req: &R, op: Operation) -> u32 {
    match op {
        Operation::Discard => {
            let bytes = req.discard_sectors().saturating_mul(1 << SECTOR_SHIFT);
            u32::try_from(bytes).unwrap_or(u32::MAX)
        }
        Operation::Read | Operation::Write | Operation::Flush => req.bytes(),
    }
}

fn io_fields<R: IoRequest + ?Sized>(req: &R, op: Operation) -> IoFields {
    IoFields {
        lba: req.address(),
        len: event_len(req, op),
        io_class: req.io_class(),
        core_id: req.core_id(),
        operation: op,
    }
}

impl CacheTrace {
    /// Capture the admission sequence id and timestamp of a new I/O.
    #[inline]
    pub fn init_io(&self) -> TraceIo {
        TraceIo {
            timestamp: self.now_ns(),
            sid: self.next_id(),
        }
    }

    /// Build the I/O event without publishing it.
    ///
    /// Used where the event must be captured before the request is handed
    /// off and may complete concurrently.
    pub fn prep_io_event<R: IoRequest + ?Sized>(
        &self,
        io: TraceIo,
        req: &R,
        op: Operation,
    ) -> IoEvent {
        IoEvent::new(io.sid, io.timestamp, io_fields(req, op))
    }

    /// Emit the I/O event of an admitted request.
    pub fn emit_io<R: IoRequest + ?Sized>(&self, io: TraceIo, req: &R, op: Operation) -> Publish {
        if !self.is_active() {
            return Publish::Inactive;
        }
        let ev = self.prep_io_event(io, req, op);
        self.publish(req.queue(), &ev)
    }

    /// Emit a file-domain I/O event. Takes the place of the plain I/O event
    /// for requests that carry a file extent.
    pub fn emit_io_file<R: IoRequest + ?Sized>(
        &self,
        io: TraceIo,
        req: &R,
        op: Operation,
        extent: FileExtent,
    ) -> Publish {
        if !self.is_active() {
            return Publish::Inactive;
        }
        let ev = IoFileEvent::new(
            io.sid,
            io.timestamp,
            io_fields(req, op),
            extent.file_id,
            extent.offset,
        );
        self.publish(req.queue(), &ev)
    }

    /// Emit the completion event of an I/O.
    ///
    /// Allocates no sequence id when tracing is off.
    pub fn emit_io_completion<R: IoRequest + ?Sized>(&self, io: TraceIo, req: &R) -> Publish {
        if !self.is_active() {
            return Publish::Inactive;
        }
        let ev = IoCompletionEvent::new(self.next_id(), self.now_ns(), io.sid, req.is_hit());
        self.publish(req.queue(), &ev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Req {
        op_bytes: u32,
        sectors: u64,
    }

    impl IoRequest for Req {
        fn address(&self) -> u64 {
            0
        }
        fn bytes(&self) -> u32 {
            self.op_bytes
        }
        fn discard_sectors(&self) -> u64 {
            self.sectors
        }
        fn io_class(&self) -> u32 {
            0
        }
        fn core_id(&self) -> CoreId {
            0
        }
        fn queue(&self) -> u32 {
            0
        }
        fn is_hit(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_discard_length_in_bytes() {
        let req = Req {
            op_bytes: 4096,
            sectors: 16,
        };
        assert_eq!(event_len(&req, Operation::Discard), 16 * 512);
        assert_eq!(event_len(&req, Operation::Write), 4096);
    }

    #[test]
    fn test_discard_length_saturates() {
        let req = Req {
            op_bytes: 0,
            sectors: u64::MAX,
        };
        assert_eq!(event_len(&req, Operation::Discard), u32::MAX);
    }
}
