//! Scalar types shared by all trace records.

use std::fmt;

/// Trace format version carried in every cache descriptor record.
pub const EVENT_VERSION: u32 = 1;

/// Sector shift used to convert discard sector counts to bytes.
pub const SECTOR_SHIFT: u32 = 9;

/// Cache instance identifier.
pub type CacheId = u16;

/// Core (backing device) identifier.
pub type CoreId = u16;

/// Event sequence identifier.
pub type SeqId = u64;

/// Record type tag stored in the header.
///
/// Values are part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EventType {
    /// Cache description; pushed first to announce version and topology.
    CacheDesc = 0,
    /// Core description.
    CoreDesc = 1,
    /// I/O admitted.
    Io = 2,
    /// I/O completed.
    IoCompletion = 3,
    /// I/O in file domain.
    IoFile = 4,
}

impl EventType {
    /// Returns the canonical metric/log label name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CacheDesc => "cache_desc",
            Self::CoreDesc => "core_desc",
            Self::Io => "io",
            Self::IoCompletion => "io_cmpl",
            Self::IoFile => "io_file",
        }
    }

    /// Convert from a raw wire value.
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::CacheDesc),
            1 => Some(Self::CoreDesc),
            2 => Some(Self::Io),
            3 => Some(Self::IoCompletion),
            4 => Some(Self::IoFile),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// I/O operation kind. Encoded as an ASCII byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operation {
    Read = b'R',
    Write = b'W',
    Flush = b'F',
    Discard = b'D',
}

impl Operation {
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            b'R' => Some(Self::Read),
            b'W' => Some(Self::Write),
            b'F' => Some(Self::Flush),
            b'D' => Some(Self::Discard),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Flush => "flush",
            Self::Discard => "discard",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum CacheMode {
    /// Write-through.
    #[default]
    WriteThrough = 0,
    /// Write-back.
    WriteBack = 1,
    /// Write-around.
    WriteAround = 2,
    /// Pass-through.
    PassThrough = 3,
    /// Write-invalidate.
    WriteInvalidate = 4,
}

impl CacheMode {
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::WriteThrough),
            1 => Some(Self::WriteBack),
            2 => Some(Self::WriteAround),
            3 => Some(Self::PassThrough),
            4 => Some(Self::WriteInvalidate),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WriteThrough => "wt",
            Self::WriteBack => "wb",
            Self::WriteAround => "wa",
            Self::PassThrough => "pt",
            Self::WriteInvalidate => "wi",
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache line size. The discriminant is the size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum CacheLineSize {
    #[default]
    Size4K = 4 * 1024,
    Size8K = 8 * 1024,
    Size16K = 16 * 1024,
    Size32K = 32 * 1024,
    Size64K = 64 * 1024,
}

impl CacheLineSize {
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            0x1000 => Some(Self::Size4K),
            0x2000 => Some(Self::Size8K),
            0x4000 => Some(Self::Size16K),
            0x8000 => Some(Self::Size32K),
            0x10000 => Some(Self::Size64K),
            _ => None,
        }
    }

    /// Size in bytes.
    pub const fn bytes(self) -> u32 {
        self as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_values() {
        for raw in 0..5 {
            let ty = EventType::from_u32(raw).unwrap();
            assert_eq!(ty as u32, raw);
        }
        assert_eq!(EventType::from_u32(5), None);
    }

    #[test]
    fn test_operation_is_ascii() {
        assert_eq!(Operation::Read as u8, b'R');
        assert_eq!(Operation::Discard as u8, b'D');
        assert_eq!(Operation::from_u8(b'F'), Some(Operation::Flush));
        assert_eq!(Operation::from_u8(b'x'), None);
    }

    #[test]
    fn test_line_size_bytes() {
        assert_eq!(CacheLineSize::Size4K.bytes(), 4096);
        assert_eq!(CacheLineSize::from_u32(65536), Some(CacheLineSize::Size64K));
        assert_eq!(CacheLineSize::from_u32(1000), None);
    }
}
