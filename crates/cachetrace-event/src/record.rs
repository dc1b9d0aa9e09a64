//! Trace record structures and their wire encoding.
//!
//! Every record starts with a 24-byte [`EventHeader`] followed by the
//! type-specific fields in declaration order. All integers are little-endian
//! and fields are packed (no padding).
//!
//! ```text
//! offset 0:  sid        (u64)
//! offset 8:  timestamp  (u64, ns)
//! offset 16: type       (u32)
//! offset 20: size       (u32, whole record)
//! offset 24: payload
//! ```

use std::ops::Deref;

use crate::types::{
    CacheId, CacheLineSize, CacheMode, CoreId, EVENT_VERSION, EventType, Operation, SeqId,
};

/// Header size in bytes.
pub const HEADER_SIZE: usize = 24;

/// Largest record produced by this crate.
pub const MAX_RECORD_SIZE: usize = IoFileEvent::SIZE;

/// Common record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    /// Event sequence id.
    pub sid: SeqId,
    /// Monotonic timestamp in nanoseconds.
    pub timestamp: u64,
    /// Record type.
    pub event_type: EventType,
    /// Size of the whole record, header included.
    pub size: u32,
}

impl EventHeader {
    /// Header for a record of type `R`.
    pub const fn for_record<R: Record>(sid: SeqId, timestamp: u64) -> Self {
        Self {
            sid,
            timestamp,
            event_type: R::TYPE,
            size: R::SIZE as u32,
        }
    }
}

/// A fixed-layout trace record.
pub trait Record {
    /// Type tag written to the header.
    const TYPE: EventType;
    /// Encoded size, header included.
    const SIZE: usize;

    fn header(&self) -> &EventHeader;

    /// Write the fields following the header.
    fn write_payload(&self, w: &mut RecordWriter<'_>);

    /// Encode into a stack buffer. Never allocates.
    fn encode(&self) -> EncodedEvent {
        let mut buf = [0u8; MAX_RECORD_SIZE];
        let mut w = RecordWriter::new(&mut buf[..Self::SIZE]);
        let hdr = self.header();
        w.put_u64(hdr.sid);
        w.put_u64(hdr.timestamp);
        w.put_u32(Self::TYPE as u32);
        w.put_u32(Self::SIZE as u32);
        self.write_payload(&mut w);
        debug_assert_eq!(w.pos, Self::SIZE, "{} payload size mismatch", Self::TYPE);
        EncodedEvent {
            buf,
            len: Self::SIZE,
        }
    }
}

/// An encoded record: one contiguous, self-describing buffer.
#[derive(Clone, Copy)]
pub struct EncodedEvent {
    buf: [u8; MAX_RECORD_SIZE],
    len: usize,
}

impl EncodedEvent {
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Deref for EncodedEvent {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl std::fmt::Debug for EncodedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedEvent")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// Sequential little-endian writer over a record buffer.
pub struct RecordWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> RecordWriter<'a> {
    const fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    pub fn put_u8(&mut self, v: u8) {
        self.put(&[v]);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.put(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.put(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.put(&v.to_le_bytes());
    }
}

/// Cache description. First record of every trace session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheDescEvent {
    pub hdr: EventHeader,
    pub id: CacheId,
    pub cache_line_size: CacheLineSize,
    pub cache_mode: CacheMode,
    /// Cache size in bytes, 0 when the caching device is detached.
    pub cache_size: u64,
    pub cores_no: u32,
    pub io_queues_no: u32,
    pub version: u32,
}

impl CacheDescEvent {
    pub const fn new(
        sid: SeqId,
        timestamp: u64,
        id: CacheId,
        cache_line_size: CacheLineSize,
        cache_mode: CacheMode,
        cache_size: u64,
        cores_no: u32,
        io_queues_no: u32,
    ) -> Self {
        Self {
            hdr: EventHeader::for_record::<Self>(sid, timestamp),
            id,
            cache_line_size,
            cache_mode,
            cache_size,
            cores_no,
            io_queues_no,
            version: EVENT_VERSION,
        }
    }
}

impl Record for CacheDescEvent {
    const TYPE: EventType = EventType::CacheDesc;
    const SIZE: usize = HEADER_SIZE + 2 + 4 + 4 + 8 + 4 + 4 + 4;

    fn header(&self) -> &EventHeader {
        &self.hdr
    }

    fn write_payload(&self, w: &mut RecordWriter<'_>) {
        w.put_u16(self.id);
        w.put_u32(self.cache_line_size.bytes());
        w.put_u32(self.cache_mode as u32);
        w.put_u64(self.cache_size);
        w.put_u32(self.cores_no);
        w.put_u32(self.io_queues_no);
        w.put_u32(self.version);
    }
}

/// Core description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreDescEvent {
    pub hdr: EventHeader,
    pub id: CoreId,
    /// Core size in bytes.
    pub core_size: u64,
}

impl CoreDescEvent {
    pub const fn new(sid: SeqId, timestamp: u64, id: CoreId, core_size: u64) -> Self {
        Self {
            hdr: EventHeader::for_record::<Self>(sid, timestamp),
            id,
            core_size,
        }
    }
}

impl Record for CoreDescEvent {
    const TYPE: EventType = EventType::CoreDesc;
    const SIZE: usize = HEADER_SIZE + 2 + 8;

    fn header(&self) -> &EventHeader {
        &self.hdr
    }

    fn write_payload(&self, w: &mut RecordWriter<'_>) {
        w.put_u16(self.id);
        w.put_u64(self.core_size);
    }
}

/// I/O admitted to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoEvent {
    pub hdr: EventHeader,
    /// Address of the I/O as submitted.
    pub lba: u64,
    /// Size of the I/O in bytes.
    pub len: u32,
    pub io_class: u32,
    pub core_id: CoreId,
    pub operation: Operation,
}

/// Fields shared by [`IoEvent`] and [`IoFileEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoFields {
    pub lba: u64,
    pub len: u32,
    pub io_class: u32,
    pub core_id: CoreId,
    pub operation: Operation,
}

impl IoFields {
    const SIZE: usize = 8 + 4 + 4 + 2 + 1;

    fn write(&self, w: &mut RecordWriter<'_>) {
        w.put_u64(self.lba);
        w.put_u32(self.len);
        w.put_u32(self.io_class);
        w.put_u16(self.core_id);
        w.put_u8(self.operation as u8);
    }
}

impl IoEvent {
    pub const fn new(sid: SeqId, timestamp: u64, io: IoFields) -> Self {
        Self {
            hdr: EventHeader::for_record::<Self>(sid, timestamp),
            lba: io.lba,
            len: io.len,
            io_class: io.io_class,
            core_id: io.core_id,
            operation: io.operation,
        }
    }

    pub const fn fields(&self) -> IoFields {
        IoFields {
            lba: self.lba,
            len: self.len,
            io_class: self.io_class,
            core_id: self.core_id,
            operation: self.operation,
        }
    }
}

impl Record for IoEvent {
    const TYPE: EventType = EventType::Io;
    const SIZE: usize = HEADER_SIZE + IoFields::SIZE;

    fn header(&self) -> &EventHeader {
        &self.hdr
    }

    fn write_payload(&self, w: &mut RecordWriter<'_>) {
        self.fields().write(w);
    }
}

/// I/O completion, linked to its [`IoEvent`] through `rsid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoCompletionEvent {
    pub hdr: EventHeader,
    /// Sequence id of the completed I/O's event.
    pub rsid: SeqId,
    pub is_hit: bool,
}

impl IoCompletionEvent {
    pub const fn new(sid: SeqId, timestamp: u64, rsid: SeqId, is_hit: bool) -> Self {
        Self {
            hdr: EventHeader::for_record::<Self>(sid, timestamp),
            rsid,
            is_hit,
        }
    }
}

impl Record for IoCompletionEvent {
    const TYPE: EventType = EventType::IoCompletion;
    const SIZE: usize = HEADER_SIZE + 8 + 1;

    fn header(&self) -> &EventHeader {
        &self.hdr
    }

    fn write_payload(&self, w: &mut RecordWriter<'_>) {
        w.put_u64(self.rsid);
        w.put_u8(u8::from(self.is_hit));
    }
}

/// I/O addressed through a file: the I/O fields plus the file extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoFileEvent {
    pub hdr: EventHeader,
    pub io: IoFields,
    pub file_id: u64,
    /// Byte offset of the I/O within the file.
    pub file_offset: u64,
}

impl IoFileEvent {
    pub const fn new(
        sid: SeqId,
        timestamp: u64,
        io: IoFields,
        file_id: u64,
        file_offset: u64,
    ) -> Self {
        Self {
            hdr: EventHeader::for_record::<Self>(sid, timestamp),
            io,
            file_id,
            file_offset,
        }
    }
}

impl Record for IoFileEvent {
    const TYPE: EventType = EventType::IoFile;
    const SIZE: usize = HEADER_SIZE + IoFields::SIZE + 8 + 8;

    fn header(&self) -> &EventHeader {
        &self.hdr
    }

    fn write_payload(&self, w: &mut RecordWriter<'_>) {
        self.io.write(w);
        w.put_u64(self.file_id);
        w.put_u64(self.file_offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u32(b: &[u8], off: usize) -> u32 {
        u32::from_le_bytes(b[off..off + 4].try_into().unwrap())
    }

    fn read_u64(b: &[u8], off: usize) -> u64 {
        u64::from_le_bytes(b[off..off + 8].try_into().unwrap())
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(CacheDescEvent::SIZE, 54);
        assert_eq!(CoreDescEvent::SIZE, 34);
        assert_eq!(IoEvent::SIZE, 43);
        assert_eq!(IoCompletionEvent::SIZE, 33);
        assert_eq!(IoFileEvent::SIZE, 59);
        assert_eq!(MAX_RECORD_SIZE, 59);
    }

    #[test]
    fn test_header_layout() {
        let ev = IoCompletionEvent::new(7, 1234, 5, true);
        let bytes = ev.encode();
        assert_eq!(bytes.len(), IoCompletionEvent::SIZE);
        assert_eq!(read_u64(&bytes, 0), 7);
        assert_eq!(read_u64(&bytes, 8), 1234);
        assert_eq!(read_u32(&bytes, 16), EventType::IoCompletion as u32);
        assert_eq!(read_u32(&bytes, 20), 33);
        assert_eq!(read_u64(&bytes, 24), 5);
        assert_eq!(bytes[32], 1);
    }

    #[test]
    fn test_io_event_layout() {
        let ev = IoEvent::new(
            3,
            99,
            IoFields {
                lba: 100,
                len: 4096,
                io_class: 2,
                core_id: 1,
                operation: Operation::Write,
            },
        );
        let bytes = ev.encode();
        assert_eq!(read_u64(&bytes, 24), 100);
        assert_eq!(read_u32(&bytes, 32), 4096);
        assert_eq!(read_u32(&bytes, 36), 2);
        assert_eq!(u16::from_le_bytes([bytes[40], bytes[41]]), 1);
        assert_eq!(bytes[42], b'W');
    }

    #[test]
    fn test_cache_desc_carries_version() {
        let ev = CacheDescEvent::new(
            1,
            0,
            4,
            CacheLineSize::Size8K,
            CacheMode::WriteBack,
            0,
            2,
            2,
        );
        assert_eq!(ev.version, EVENT_VERSION);
        let bytes = ev.encode();
        assert_eq!(read_u32(&bytes, 26), 8192);
        assert_eq!(read_u32(&bytes, 30), CacheMode::WriteBack as u32);
        assert_eq!(read_u32(&bytes, 50), EVENT_VERSION);
    }
}
