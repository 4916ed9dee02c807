use objlog_codec::CodecError;
use objlog_journal::JournalError;
use objlog_types::{ObjectId, TypeError, TypeIndex};

/// Errors from the persisted object model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// File lifecycle failure (I/O, ordering of generation files).
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// A record could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Type(#[from] TypeError),

    /// A replayed type index differs from the one the registry assigned.
    #[error("type index mismatch: expected {expected}, found {found}")]
    TypeIndexMismatch { expected: TypeIndex, found: TypeIndex },

    /// A replayed object id differs from the one the registry assigned.
    #[error("object id mismatch: expected {expected}, found {found}")]
    ObjectIdMismatch { expected: ObjectId, found: ObjectId },

    /// A record refers to an object that was never created.
    #[error("reference to object {0} which does not exist")]
    DanglingReference(ObjectId),

    /// No constructor is registered for a descriptor, or a type index was
    /// never registered.
    #[error("unknown type {0}")]
    UnknownType(String),

    /// An object received a custom command it does not understand.
    #[error("object {object} does not understand custom command {tag:?}")]
    UnknownCustomOp { tag: String, object: ObjectId },

    /// The loaded root object is not of the store's root type.
    #[error("root object has type {found}, expected {expected}")]
    RootTypeMismatch { expected: String, found: String },

    /// A reference resolved to an object of another type.
    #[error("object {object} is not a {expected}")]
    WrongObjectType { object: ObjectId, expected: String },

    /// A stored value does not decode into the field or element type.
    #[error("invalid value for {target}: {reason}")]
    InvalidValue { target: String, reason: String },

    /// Two Rust types claim the same descriptor.
    #[error("descriptor {descriptor} is taken by {registered}, cannot register {offered}")]
    DescriptorConflict {
        descriptor: String,
        registered: String,
        offered: String,
    },

    /// An element or key type is neither a scalar nor a registered object type.
    #[error("unsupported element type {0}")]
    UnsupportedElement(String),

    #[error("duplicate key {0}")]
    DuplicateKey(String),

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// An object offers neither value fields nor a custom model, or received
    /// a model of the other kind.
    #[error("{0} does not support this model")]
    UnsupportedModel(String),

    #[error("type {type_name} has no field {field:?}")]
    UnknownField { type_name: String, field: String },

    /// The object belongs to an earlier session of its store: it was left
    /// out of a snapshot, or the store was reopened since.
    #[error("object {0} belongs to an earlier session of its store")]
    StaleObject(ObjectId),

    /// A reference to an object of another store.
    #[error("object {0} belongs to another store")]
    ForeignObject(ObjectId),

    #[error("store is not open")]
    StoreNotOpen,

    /// Wraps another error with the 1-based record line it occurred on.
    #[error("line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<ModelError>,
    },
}

impl ModelError {
    pub fn at_line(self, line: usize) -> Self {
        Self::AtLine {
            line,
            source: Box::new(self),
        }
    }

    pub(crate) fn invalid_value(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidValue {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// The error with any line context removed.
    pub fn root_cause(&self) -> &ModelError {
        match self {
            Self::AtLine { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;
