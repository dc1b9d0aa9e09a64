use thiserror::Error;

/// Trace control errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("tracing already started")]
    AlreadyActive,
    #[error("tracing not started")]
    NotActive,
}
