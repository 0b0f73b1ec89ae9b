use crate::value::ValueKind;
use crate::CandidId;
use thiserror::Error;

/// How a varint failed to decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarintError {
    /// The input ended before a byte without the continuation bit was read.
    Unterminated,
    /// The encoding is longer than the configured ceiling.
    TooLong { max_bytes: usize },
    /// The value does not fit into the fixed-width integer it is read into.
    Overflow,
}

/// A type reference that could not be resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeReference {
    /// A type table index (or negative opcode) that names no known type.
    Index(i64),
    /// A compound type that was never registered in the table.
    Unregistered(String),
    /// A `Reference(id)` that no registered compound type binds.
    Recursive(CandidId),
}

impl std::fmt::Display for TypeReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeReference::Index(index) => write!(f, "type index {}", index),
            TypeReference::Unregistered(ty) => write!(f, "unregistered type {}", ty),
            TypeReference::Recursive(id) => write!(f, "recursive reference '{}'", id),
        }
    }
}

/// Errors produced while building, encoding or decoding Candid values.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CandidError {
    #[error("malformed LEB128 integer: {0:?}")]
    MalformedVarint(VarintError),

    #[error("payload does not start with the magic number DIDL, found 0x{}", hex::encode(.found))]
    InvalidMagicNumber { found: Vec<u8> },

    #[error("unknown type reference: {0}")]
    UnknownTypeReference(TypeReference),

    #[error("recursive id '{id}' is bound by {count} distinct compound types")]
    DuplicateOrAmbiguousRecursiveId { id: CandidId, count: usize },

    #[error(
        "vector element {index} does not match the earlier elements: \
         found {found:?} where {expected:?} was expected"
    )]
    HeterogeneousVector {
        index: usize,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("unknown record or variant tag {tag}")]
    UnknownRecordOrVariantTag { tag: String },

    #[error("record is missing the required field {tag}")]
    MissingRecordField { tag: String },

    #[error("decoding {what} is not supported")]
    UnimplementedDecodePath { what: String },

    #[error("unexpected end of input: needed {needed} more bytes, {remaining} remaining")]
    UnexpectedEndOfInput { needed: usize, remaining: usize },

    #[error("malformed type table: {reason}")]
    MalformedTypeTable { reason: String },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("text is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },

    #[error("{count} trailing bytes after the last argument")]
    TrailingBytes { count: usize },

    #[error("{limit} exceeds the configured maximum of {max} (got {value})")]
    LimitExceeded {
        limit: &'static str,
        value: u64,
        max: u64,
    },
}

impl From<VarintError> for CandidError {
    fn from(err: VarintError) -> Self {
        CandidError::MalformedVarint(err)
    }
}

pub type CandidResult<T> = Result<T, CandidError>;
