//! Trace files: a sink that appends records to disk, and the reader for
//! `dump`.
//!
//! A trace file is the raw record stream, optionally wrapped in a single zstd
//! frame. There is no file header; readers detect compression from the zstd
//! frame magic.

use std::any::Any;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use cachetrace_event::CacheId;
use parking_lot::Mutex;
use tracing::debug;

use crate::Result;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const ZSTD_LEVEL: i32 = 3;

enum TraceWriter {
    Plain(BufWriter<File>),
    Zstd(zstd::stream::write::Encoder<'static, BufWriter<File>>),
}

impl TraceWriter {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Plain(w) => w.write_all(buf),
            Self::Zstd(w) => w.write_all(buf),
        }
    }

    fn finish(self) -> std::io::Result<()> {
        let mut inner = match self {
            Self::Plain(w) => w,
            Self::Zstd(w) => w.finish()?,
        };
        inner.flush()
    }
}

/// Totals reported by [`FileSink::finish`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileSinkStats {
    pub records: u64,
    pub bytes: u64,
    /// Records lost to write errors.
    pub errors: u64,
}

/// Sink context that appends every record to a trace file.
///
/// Install with [`FileSink::push`] as the callback and an `Arc<FileSink>` as
/// the context. Writes from all queues serialize on one mutex.
pub struct FileSink {
    path: PathBuf,
    writer: Mutex<Option<TraceWriter>>,
    records: AtomicU64,
    bytes: AtomicU64,
    errors: AtomicU64,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>, compress: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = BufWriter::new(File::create(&path)?);
        let writer = if compress {
            TraceWriter::Zstd(zstd::stream::write::Encoder::new(writer, ZSTD_LEVEL)?)
        } else {
            TraceWriter::Plain(writer)
        };
        Ok(Self {
            path,
            writer: Mutex::new(Some(writer)),
            records: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Trace callback. `context` must be a `FileSink`.
    pub fn push(_cache: CacheId, context: &(dyn Any + Send + Sync), _queue: u32, event: &[u8]) {
        if let Some(sink) = context.downcast_ref::<Self>() {
            sink.append(event);
        }
    }

    fn append(&self, event: &[u8]) {
        let mut guard = self.writer.lock();
        let Some(writer) = guard.as_mut() else {
            self.errors.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if writer.write_all(event).is_ok() {
            self.records.fetch_add(1, Ordering::Relaxed);
            self.bytes.fetch_add(event.len() as u64, Ordering::Relaxed);
        } else {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> FileSinkStats {
        FileSinkStats {
            records: self.records.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Flush and close the file. Records pushed afterwards count as errors.
    pub fn finish(&self) -> Result<FileSinkStats> {
        if let Some(writer) = self.writer.lock().take() {
            writer.finish()?;
        }
        let stats = self.stats();
        debug!(path = %self.path.display(), records = stats.records, bytes = stats.bytes, "trace file closed");
        Ok(stats)
    }
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink")
            .field("path", &self.path)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Load a trace file into memory, decompressing it if needed.
pub fn read_trace_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    File::open(path)?.read_to_end(&mut data)?;
    if data.starts_with(&ZSTD_MAGIC) {
        data = zstd::stream::decode_all(data.as_slice())?;
    }
    Ok(data)
}
