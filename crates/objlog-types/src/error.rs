use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid type descriptor {descriptor:?}: {reason}")]
    InvalidDescriptor { descriptor: String, reason: String },

    #[error("invalid generation file name: {0}")]
    InvalidStamp(String),

    /// A generation stamp lies further ahead of the wall clock than the
    /// clock is willing to wait.
    #[error("generation {stamp} is {ahead_ms}ms ahead of the wall clock")]
    StampAhead { stamp: u64, ahead_ms: u64 },
}
