//! Decoding of trace records from a flat byte stream.
//!
//! Records are located purely through the header's `size` field. Bytes past
//! the layout this crate knows are skipped, and unknown record types are
//! surfaced as [`ParsedEvent::Unknown`] so newer producers stay readable.

use thiserror::Error;

use crate::record::{
    CacheDescEvent, CoreDescEvent, EventHeader, HEADER_SIZE, IoCompletionEvent, IoEvent,
    IoFields, IoFileEvent, Record,
};
use crate::types::{CacheLineSize, CacheMode, EventType, Operation, SeqId};

/// Errors that can occur while decoding records.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record at offset {offset} too short for header: {available} bytes")]
    Truncated { offset: usize, available: usize },

    #[error("record at offset {offset} declares {declared} bytes, only {available} available")]
    PayloadTruncated {
        offset: usize,
        declared: usize,
        available: usize,
    },

    #[error("reading {event_name}: declared size {declared} below minimum {min}")]
    SizeTooSmall {
        event_name: &'static str,
        declared: usize,
        min: usize,
    },

    #[error("reading {event_name}: invalid operation byte {raw:#04x}")]
    InvalidOperation { event_name: &'static str, raw: u8 },

    #[error("invalid cache mode {raw}")]
    InvalidCacheMode { raw: u32 },

    #[error("invalid cache line size {raw}")]
    InvalidLineSize { raw: u32 },
}

/// A decoded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedEvent {
    CacheDesc(CacheDescEvent),
    CoreDesc(CoreDescEvent),
    Io(IoEvent),
    IoCompletion(IoCompletionEvent),
    IoFile(IoFileEvent),
    /// Record type this crate does not know; skipped using its size.
    Unknown {
        sid: SeqId,
        timestamp: u64,
        raw_type: u32,
        size: u32,
    },
}

impl ParsedEvent {
    pub const fn sid(&self) -> SeqId {
        match self {
            Self::CacheDesc(e) => e.hdr.sid,
            Self::CoreDesc(e) => e.hdr.sid,
            Self::Io(e) => e.hdr.sid,
            Self::IoCompletion(e) => e.hdr.sid,
            Self::IoFile(e) => e.hdr.sid,
            Self::Unknown { sid, .. } => *sid,
        }
    }

    pub const fn timestamp(&self) -> u64 {
        match self {
            Self::CacheDesc(e) => e.hdr.timestamp,
            Self::CoreDesc(e) => e.hdr.timestamp,
            Self::Io(e) => e.hdr.timestamp,
            Self::IoCompletion(e) => e.hdr.timestamp,
            Self::IoFile(e) => e.hdr.timestamp,
            Self::Unknown { timestamp, .. } => *timestamp,
        }
    }

    /// Known record type, `None` for [`ParsedEvent::Unknown`].
    pub const fn event_type(&self) -> Option<EventType> {
        match self {
            Self::CacheDesc(_) => Some(EventType::CacheDesc),
            Self::CoreDesc(_) => Some(EventType::CoreDesc),
            Self::Io(_) => Some(EventType::Io),
            Self::IoCompletion(_) => Some(EventType::IoCompletion),
            Self::IoFile(_) => Some(EventType::IoFile),
            Self::Unknown { .. } => None,
        }
    }
}

/// Decode the record at the start of `data`.
///
/// Returns the record and the number of bytes it occupies (its declared size).
pub fn parse_event(data: &[u8]) -> Result<(ParsedEvent, usize), DecodeError> {
    parse_at(data, 0)
}

fn parse_at(data: &[u8], offset: usize) -> Result<(ParsedEvent, usize), DecodeError> {
    let rest = &data[offset..];
    if rest.len() < HEADER_SIZE {
        return Err(DecodeError::Truncated {
            offset,
            available: rest.len(),
        });
    }

    let sid = read_u64_le(rest, 0);
    let timestamp = read_u64_le(rest, 8);
    let raw_type = read_u32_le(rest, 16);
    let size = read_u32_le(rest, 20);
    let declared = size as usize;

    if declared < HEADER_SIZE {
        return Err(DecodeError::SizeTooSmall {
            event_name: "header",
            declared,
            min: HEADER_SIZE,
        });
    }
    if declared > rest.len() {
        return Err(DecodeError::PayloadTruncated {
            offset,
            declared,
            available: rest.len(),
        });
    }

    let record = &rest[..declared];
    let Some(event_type) = EventType::from_u32(raw_type) else {
        return Ok((
            ParsedEvent::Unknown {
                sid,
                timestamp,
                raw_type,
                size,
            },
            declared,
        ));
    };

    let hdr = EventHeader {
        sid,
        timestamp,
        event_type,
        size,
    };

    let parsed = match event_type {
        EventType::CacheDesc => ParsedEvent::CacheDesc(parse_cache_desc(hdr, record)?),
        EventType::CoreDesc => ParsedEvent::CoreDesc(parse_core_desc(hdr, record)?),
        EventType::Io => ParsedEvent::Io(parse_io(hdr, record)?),
        EventType::IoCompletion => ParsedEvent::IoCompletion(parse_io_cmpl(hdr, record)?),
        EventType::IoFile => ParsedEvent::IoFile(parse_io_file(hdr, record)?),
    };

    Ok((parsed, declared))
}

const fn require<R: Record>(record: &[u8]) -> Result<(), DecodeError> {
    if record.len() < R::SIZE {
        return Err(DecodeError::SizeTooSmall {
            event_name: R::TYPE.as_str(),
            declared: record.len(),
            min: R::SIZE,
        });
    }
    Ok(())
}

fn parse_cache_desc(hdr: EventHeader, r: &[u8]) -> Result<CacheDescEvent, DecodeError> {
    require::<CacheDescEvent>(r)?;
    let raw_line = read_u32_le(r, 26);
    let raw_mode = read_u32_le(r, 30);
    Ok(CacheDescEvent {
        hdr,
        id: read_u16_le(r, 24),
        cache_line_size: CacheLineSize::from_u32(raw_line)
            .ok_or(DecodeError::InvalidLineSize { raw: raw_line })?,
        cache_mode: CacheMode::from_u32(raw_mode)
            .ok_or(DecodeError::InvalidCacheMode { raw: raw_mode })?,
        cache_size: read_u64_le(r, 34),
        cores_no: read_u32_le(r, 42),
        io_queues_no: read_u32_le(r, 46),
        version: read_u32_le(r, 50),
    })
}

fn parse_core_desc(hdr: EventHeader, r: &[u8]) -> Result<CoreDescEvent, DecodeError> {
    require::<CoreDescEvent>(r)?;
    Ok(CoreDescEvent {
        hdr,
        id: read_u16_le(r, 24),
        core_size: read_u64_le(r, 26),
    })
}

fn parse_io_fields(r: &[u8], event_name: &'static str) -> Result<IoFields, DecodeError> {
    let raw_op = r[42];
    Ok(IoFields {
        lba: read_u64_le(r, 24),
        len: read_u32_le(r, 32),
        io_class: read_u32_le(r, 36),
        core_id: read_u16_le(r, 40),
        operation: Operation::from_u8(raw_op).ok_or(DecodeError::InvalidOperation {
            event_name,
            raw: raw_op,
        })?,
    })
}

fn parse_io(hdr: EventHeader, r: &[u8]) -> Result<IoEvent, DecodeError> {
    require::<IoEvent>(r)?;
    let io = parse_io_fields(r, EventType::Io.as_str())?;
    Ok(IoEvent {
        hdr,
        lba: io.lba,
        len: io.len,
        io_class: io.io_class,
        core_id: io.core_id,
        operation: io.operation,
    })
}

fn parse_io_cmpl(hdr: EventHeader, r: &[u8]) -> Result<IoCompletionEvent, DecodeError> {
    require::<IoCompletionEvent>(r)?;
    Ok(IoCompletionEvent {
        hdr,
        rsid: read_u64_le(r, 24),
        is_hit: r[32] != 0,
    })
}

fn parse_io_file(hdr: EventHeader, r: &[u8]) -> Result<IoFileEvent, DecodeError> {
    require::<IoFileEvent>(r)?;
    Ok(IoFileEvent {
        hdr,
        io: parse_io_fields(r, EventType::IoFile.as_str())?,
        file_id: read_u64_le(r, 43),
        file_offset: read_u64_le(r, 51),
    })
}

/// Iterator over the records of a flat byte buffer.
///
/// Stops after the first error: once a header can't be trusted, neither can
/// the position of the next record.
pub struct EventStream<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> EventStream<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            failed: false,
        }
    }

    /// Byte offset of the next record.
    pub const fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for EventStream<'_> {
    type Item = Result<ParsedEvent, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }
        match parse_at(self.data, self.offset) {
            Ok((event, len)) => {
                self.offset += len;
                Some(Ok(event))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

// Callers check lengths before reading.

#[inline]
fn read_u16_le(data: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([data[off], data[off + 1]])
}

#[inline]
fn read_u32_le(data: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&data[off..off + 4]);
    u32::from_le_bytes(b)
}

#[inline]
fn read_u64_le(data: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&data[off..off + 8]);
    u64::from_le_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_fields() -> IoFields {
        IoFields {
            lba: 2048,
            len: 512,
            io_class: 1,
            core_id: 3,
            operation: Operation::Discard,
        }
    }

    #[test]
    fn test_parse_mixed_stream() {
        let mut buf = Vec::new();
        buf.extend_from_slice(
            &CacheDescEvent::new(
                1,
                10,
                0,
                CacheLineSize::Size4K,
                CacheMode::WriteThrough,
                1 << 30,
                1,
                1,
            )
            .encode(),
        );
        buf.extend_from_slice(&CoreDescEvent::new(2, 11, 0, 1 << 32).encode());
        buf.extend_from_slice(&IoEvent::new(3, 12, io_fields()).encode());
        buf.extend_from_slice(&IoCompletionEvent::new(4, 13, 3, false).encode());
        buf.extend_from_slice(&IoFileEvent::new(5, 14, io_fields(), 77, 8192).encode());

        let events: Vec<_> = EventStream::new(&buf).collect::<Result<_, _>>().unwrap();
        assert_eq!(events.len(), 5);
        let sids: Vec<_> = events.iter().map(ParsedEvent::sid).collect();
        assert_eq!(sids, vec![1, 2, 3, 4, 5]);

        match events[0] {
            ParsedEvent::CacheDesc(e) => {
                assert_eq!(e.cache_size, 1 << 30);
                assert_eq!(e.version, crate::EVENT_VERSION);
            }
            ref other => panic!("expected cache desc, got {other:?}"),
        }
        match events[3] {
            ParsedEvent::IoCompletion(e) => {
                assert_eq!(e.rsid, 3);
                assert!(!e.is_hit);
            }
            ref other => panic!("expected completion, got {other:?}"),
        }
        match events[4] {
            ParsedEvent::IoFile(e) => {
                assert_eq!(e.io, io_fields());
                assert_eq!(e.file_id, 77);
                assert_eq!(e.file_offset, 8192);
            }
            ref other => panic!("expected io file, got {other:?}"),
        }
    }

    #[test]
    fn test_skips_trailing_bytes() {
        // A newer producer appended 6 bytes to the core descriptor.
        let mut rec = CoreDescEvent::new(9, 0, 1, 4096).encode().to_vec();
        rec.extend_from_slice(&[0xAA; 6]);
        let size = u32::try_from(rec.len()).unwrap();
        rec[20..24].copy_from_slice(&size.to_le_bytes());
        rec.extend_from_slice(&IoCompletionEvent::new(10, 0, 9, true).encode());

        let events: Vec<_> = EventStream::new(&rec).collect::<Result<_, _>>().unwrap();
        assert_eq!(events.len(), 2);
        match events[0] {
            ParsedEvent::CoreDesc(e) => {
                assert_eq!(e.core_size, 4096);
                assert_eq!(e.hdr.size as usize, CoreDescEvent::SIZE + 6);
            }
            ref other => panic!("expected core desc, got {other:?}"),
        }
        assert_eq!(events[1].sid(), 10);
    }

    #[test]
    fn test_unknown_type_is_skipped() {
        let mut rec = vec![0u8; HEADER_SIZE + 4];
        rec[0..8].copy_from_slice(&5u64.to_le_bytes());
        rec[16..20].copy_from_slice(&42u32.to_le_bytes());
        rec[20..24].copy_from_slice(&28u32.to_le_bytes());
        rec.extend_from_slice(&IoCompletionEvent::new(6, 0, 1, true).encode());

        let mut stream = EventStream::new(&rec);
        let first = stream.next().unwrap().unwrap();
        assert!(matches!(
            first,
            ParsedEvent::Unknown {
                raw_type: 42,
                size: 28,
                ..
            }
        ));
        assert_eq!(first.event_type(), None);
        assert_eq!(stream.next().unwrap().unwrap().sid(), 6);
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_truncated_header() {
        let err = parse_event(&[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                offset: 0,
                available: 10
            }
        );
    }

    #[test]
    fn test_truncated_payload_stops_stream() {
        let rec = IoEvent::new(1, 0, io_fields()).encode();
        let cut = &rec[..rec.len() - 1];
        let mut stream = EventStream::new(cut);
        assert!(matches!(
            stream.next(),
            Some(Err(DecodeError::PayloadTruncated { .. }))
        ));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_zero_size_rejected() {
        let mut rec = IoCompletionEvent::new(1, 0, 0, false).encode().to_vec();
        rec[20..24].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            parse_event(&rec),
            Err(DecodeError::SizeTooSmall {
                event_name: "header",
                ..
            })
        ));
    }

    #[test]
    fn test_short_known_record_rejected() {
        let mut rec = IoEvent::new(1, 0, io_fields()).encode().to_vec();
        rec.truncate(30);
        rec[20..24].copy_from_slice(&30u32.to_le_bytes());
        assert!(matches!(
            parse_event(&rec),
            Err(DecodeError::SizeTooSmall {
                event_name: "io",
                min: 43,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_operation() {
        let mut rec = IoEvent::new(1, 0, io_fields()).encode().to_vec();
        rec[42] = b'?';
        assert!(matches!(
            parse_event(&rec),
            Err(DecodeError::InvalidOperation { raw: b'?', .. })
        ));
    }
}
