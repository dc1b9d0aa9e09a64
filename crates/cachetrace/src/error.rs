use cachetrace_state::StateError;
use thiserror::Error;

/// Tracing subsystem errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("tracing already started for cache {0}")]
    AlreadyActive(u16),
    #[error("tracing not started for cache {0}")]
    NotActive(u16),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("topology snapshot failed: {0}")]
    Topology(String),
    #[error("I/O queue {queue} out of range ({io_queues} queues)")]
    InvalidQueue { queue: u32, io_queues: u32 },
    #[error("trace decode error: {0}")]
    Decode(#[from] cachetrace_event::DecodeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) const fn from_state(err: StateError, cache: u16) -> Self {
        match err {
            StateError::AlreadyActive => Self::AlreadyActive(cache),
            StateError::NotActive => Self::NotActive(cache),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
