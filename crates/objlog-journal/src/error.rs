use std::io;

use objlog_codec::CodecError;
use objlog_types::{GenerationStamp, TypeError};

/// Errors produced by the file lifecycle manager.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// I/O error while listing, reading, writing, or moving files.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A generation file carries an unusable stamp.
    #[error("bad generation stamp: {0}")]
    Stamp(#[from] TypeError),

    /// The configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The newest journal is not newer than the newest snapshot.
    #[error("WrongBinlogTime: journal {journal} is not after snapshot {snapshot}")]
    WrongBinlogTime {
        snapshot: GenerationStamp,
        journal: GenerationStamp,
    },

    /// The store directory does not exist.
    #[error("store directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("store is already open")]
    AlreadyOpen,

    #[error("store is not open")]
    NotOpen,

    /// A background flush failed; the journal accepts no further records.
    #[error("journal {journal} failed to flush: {reason}")]
    FlushFailed { journal: String, reason: String },

    /// The journal writer was closed; no further records are accepted.
    #[error("journal {0} is closed")]
    Closed(String),
}

/// Result alias for lifecycle operations.
pub type JournalResult<T> = Result<T, JournalError>;
