//! Crate-level error taxonomy.
//!
//! Worker-local and phase-local faults never surface here — they are logged
//! and absorbed at their origin. This enum carries only what can reject a
//! `startTest` call or a marker, or wrap an I/O failure at a boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadBenchError {
    #[error("config error: {0}")]
    Config(String),

    #[error("a test is already active")]
    AlreadyActive,

    #[error("no test is currently active")]
    NotActive,

    #[error("marker rejected: {0}")]
    MarkerRejected(String),

    #[error("power source error: {0}")]
    PowerSource(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, LoadBenchError>;
