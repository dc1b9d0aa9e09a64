//! In-memory cache model used to drive the tracer.
//!
//! `SimCache` stands in for the engine: it owns a [`CacheTrace`], exposes its
//! topology and walks requests through the same submission paths the engine
//! traces (regular, fast path, flush, discard, completion).

mod workload;

pub use workload::{Workload, WorkloadStats, run_workload};

use std::collections::BTreeMap;

use cachetrace_event::{CacheId, CacheLineSize, CacheMode, CoreId, Operation};
use cachetrace_state::{Publish, TraceCallback, TraceContext};

use crate::config::TraceConfig;
use crate::io::{FileExtent, IoRequest, TraceIo};
use crate::topology::{CacheTopology, CoreTopology};
use crate::trace::CacheTrace;
use crate::{Error, Result};

/// Simulated core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimCore {
    pub id: CoreId,
    pub size: u64,
    /// Closed cores are valid but excluded from the topology snapshot.
    pub opened: bool,
}

impl CoreTopology for SimCore {
    fn id(&self) -> CoreId {
        self.id
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Cache shape for [`SimCache::new`].
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub id: CacheId,
    pub line_size: CacheLineSize,
    pub mode: CacheMode,
    /// Caching device size, `None` for a detached cache.
    pub attached_size: Option<u64>,
    /// `(id, size)` of each core.
    pub cores: Vec<(CoreId, u64)>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            id: 1,
            line_size: CacheLineSize::Size4K,
            mode: CacheMode::WriteThrough,
            attached_size: Some(1 << 30),
            cores: vec![(0, 1 << 32)],
        }
    }
}

/// Request direction for regular submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    pub const fn operation(self) -> Operation {
        match self {
            Self::Read => Operation::Read,
            Self::Write => Operation::Write,
        }
    }
}

/// Simulated I/O request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimRequest {
    pub dir: Direction,
    pub address: u64,
    pub bytes: u32,
    pub discard_sectors: u64,
    pub io_class: u32,
    pub core_id: CoreId,
    pub queue: u32,
    /// Engine verdict reported at completion.
    pub hit: bool,
    pub file: Option<FileExtent>,
}

impl SimRequest {
    pub const fn read(core_id: CoreId, queue: u32, address: u64, bytes: u32) -> Self {
        Self {
            dir: Direction::Read,
            address,
            bytes,
            discard_sectors: 0,
            io_class: 0,
            core_id,
            queue,
            hit: false,
            file: None,
        }
    }

    pub const fn write(core_id: CoreId, queue: u32, address: u64, bytes: u32) -> Self {
        Self {
            dir: Direction::Write,
            ..Self::read(core_id, queue, address, bytes)
        }
    }

    pub const fn discard(core_id: CoreId, queue: u32, address: u64, sectors: u64) -> Self {
        Self {
            dir: Direction::Write,
            discard_sectors: sectors,
            ..Self::read(core_id, queue, address, 0)
        }
    }

    #[must_use]
    pub const fn with_hit(mut self, hit: bool) -> Self {
        self.hit = hit;
        self
    }

    #[must_use]
    pub const fn with_io_class(mut self, io_class: u32) -> Self {
        self.io_class = io_class;
        self
    }

    #[must_use]
    pub const fn with_file(mut self, file_id: u64, offset: u64) -> Self {
        self.file = Some(FileExtent { file_id, offset });
        self
    }
}

impl IoRequest for SimRequest {
    fn address(&self) -> u64 {
        self.address
    }

    fn bytes(&self) -> u32 {
        self.bytes
    }

    fn discard_sectors(&self) -> u64 {
        self.discard_sectors
    }

    fn io_class(&self) -> u32 {
        self.io_class
    }

    fn core_id(&self) -> CoreId {
        self.core_id
    }

    fn queue(&self) -> u32 {
        self.queue
    }

    fn is_hit(&self) -> bool {
        self.hit
    }

    fn file_extent(&self) -> Option<FileExtent> {
        self.file
    }
}

/// An admitted I/O: the request plus its tracing metadata.
#[derive(Debug, Clone, Copy)]
pub struct SimIo {
    pub req: SimRequest,
    pub trace: TraceIo,
}

/// Simulated cache instance.
#[derive(Debug)]
pub struct SimCache {
    id: CacheId,
    line_size: CacheLineSize,
    mode: CacheMode,
    attached_size: Option<u64>,
    cores: BTreeMap<CoreId, SimCore>,
    trace: CacheTrace,
}

impl SimCache {
    pub fn new(config: SimConfig, trace_config: TraceConfig) -> Result<Self> {
        let mut cores = BTreeMap::new();
        for (id, size) in config.cores {
            let core = SimCore {
                id,
                size,
                opened: true,
            };
            if cores.insert(id, core).is_some() {
                return Err(Error::InvalidArgument("duplicate core id"));
            }
        }
        Ok(Self {
            id: config.id,
            line_size: config.line_size,
            mode: config.mode,
            attached_size: config.attached_size,
            cores,
            trace: CacheTrace::new(config.id, trace_config)?,
        })
    }

    pub const fn trace(&self) -> &CacheTrace {
        &self.trace
    }

    pub fn set_core_opened(&mut self, id: CoreId, opened: bool) -> Result<()> {
        let core = self
            .cores
            .get_mut(&id)
            .ok_or(Error::InvalidArgument("unknown core"))?;
        core.opened = opened;
        Ok(())
    }

    /// Detach (`None`) or attach the caching device.
    pub fn set_attached_size(&mut self, size: Option<u64>) {
        self.attached_size = size;
    }

    pub fn start_trace(&self, context: TraceContext, callback: Option<TraceCallback>) -> Result<()> {
        self.trace.start_trace(self, context, callback)
    }

    pub fn stop_trace(&self) -> Result<()> {
        self.trace.stop_trace()
    }

    /// Admit a new I/O. Its trace sequence id is allocated here.
    pub fn new_io(&self, req: SimRequest) -> SimIo {
        SimIo {
            req,
            trace: self.trace.init_io(),
        }
    }

    fn validate(&self, req: &SimRequest) -> Result<()> {
        let io_queues = self.trace.io_queues();
        if req.queue >= io_queues {
            return Err(Error::InvalidQueue {
                queue: req.queue,
                io_queues,
            });
        }
        if !self.cores.contains_key(&req.core_id) {
            return Err(Error::InvalidArgument("unknown core"));
        }
        Ok(())
    }

    fn emit(&self, io: &SimIo, op: Operation) -> Publish {
        match io.req.file {
            Some(extent) => self.trace.emit_io_file(io.trace, &io.req, op, extent),
            None => self.trace.emit_io(io.trace, &io.req, op),
        }
    }

    /// Regular read/write submission.
    pub fn submit(&self, io: &SimIo) -> Result<Publish> {
        self.validate(&io.req)?;
        Ok(self.emit(io, io.req.dir.operation()))
    }

    /// Fast-path submission. The event is captured before dispatch and only
    /// published when the fast path takes the request.
    pub fn submit_fast(&self, io: &SimIo, accepted: bool) -> Result<Option<Publish>> {
        self.validate(&io.req)?;
        let prepared = self
            .trace
            .is_active()
            .then(|| self.trace.prep_io_event(io.trace, &io.req, io.req.dir.operation()));
        if !accepted {
            return Ok(None);
        }
        Ok(Some(prepared.map_or(Publish::Inactive, |ev| {
            self.trace.publish(io.req.queue, &ev)
        })))
    }

    pub fn submit_flush(&self, io: &SimIo) -> Result<Publish> {
        self.validate(&io.req)?;
        Ok(self.emit(io, Operation::Flush))
    }

    pub fn submit_discard(&self, io: &SimIo) -> Result<Publish> {
        self.validate(&io.req)?;
        Ok(self.emit(io, Operation::Discard))
    }

    /// Complete an I/O; emits its completion event.
    pub fn complete(&self, io: SimIo) -> Publish {
        self.trace.emit_io_completion(io.trace, &io.req)
    }
}

impl CacheTopology for SimCache {
    fn id(&self) -> CacheId {
        self.id
    }

    fn line_size(&self) -> CacheLineSize {
        self.line_size
    }

    fn mode(&self) -> CacheMode {
        self.mode
    }

    fn attached_size(&self) -> Option<u64> {
        self.attached_size
    }

    fn core_count(&self) -> u32 {
        u32::try_from(self.cores.len()).unwrap_or(u32::MAX)
    }

    fn visit_cores(&self, visitor: &mut dyn FnMut(&dyn CoreTopology) -> Result<()>) -> Result<()> {
        for core in self.cores.values().filter(|c| c.opened) {
            visitor(core)?;
        }
        Ok(())
    }
}
