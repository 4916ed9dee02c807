use std::io;

use objlog_types::{ObjectId, TypeIndex};

use crate::audit::Section;

/// Errors produced while encoding or decoding records.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// I/O error while reading or writing a record stream.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A line is not valid JSON or does not have the record shape.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A record lacks a field its command requires.
    #[error("record {command:?} is missing field {field:?}")]
    MissingField {
        command: String,
        field: &'static str,
    },

    /// A record field holds a value of the wrong shape.
    #[error("record {command:?} has invalid field {field:?}: {reason}")]
    InvalidField {
        command: String,
        field: &'static str,
        reason: String,
    },

    /// The `c` tag is neither a built-in command nor `<ns>:<op>`.
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    /// A structural audit failed.
    #[error("audit failed: {0}")]
    Audit(#[from] AuditError),

    /// Wraps another error with the 1-based line it occurred on.
    #[error("line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<CodecError>,
    },
}

impl CodecError {
    /// Attach a line number.
    pub fn at_line(self, line: usize) -> Self {
        Self::AtLine {
            line,
            source: Box::new(self),
        }
    }
}

/// Structural inconsistencies found by [`crate::Audit`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuditError {
    #[error("type index {found} registered out of order, expected {expected}")]
    TypeIndexOutOfOrder { expected: TypeIndex, found: TypeIndex },

    #[error("type {0:?} registered twice")]
    DuplicateType(String),

    #[error("object id {found} created out of order, expected {expected}")]
    ObjectIdOutOfOrder { expected: ObjectId, found: ObjectId },

    #[error("reference to unregistered type index {0}")]
    UnknownType(TypeIndex),

    #[error("reference to object {0} before its creation")]
    UnknownObject(ObjectId),

    #[error("object {object} has type {actual}, record claims {claimed}")]
    TypeMismatch {
        object: ObjectId,
        actual: TypeIndex,
        claimed: TypeIndex,
    },

    #[error("command {command:?} is not allowed in a {section}")]
    MisplacedCommand { command: String, section: Section },
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
