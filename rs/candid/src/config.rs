use serde::{Deserialize, Serialize};

/// Limits applied while decoding Candid payloads.
///
/// A value of this type is constructed by the caller and passed by reference
/// into the decoder; there is no process-wide codec configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CandidConfig {
    /// Maximum number of bytes in the LEB128 encoding of a `nat` or `int`.
    /// 1024 bytes carry 7168 payload bits; longer encodings are rejected as
    /// malformed rather than truncated.
    pub max_varint_bytes: usize,

    /// Maximum number of entries in the type table of a payload.
    pub max_type_table_len: usize,

    /// Maximum number of arguments in a payload.
    pub max_args: usize,

    /// Maximum nesting depth while decoding a single value.
    pub max_decode_depth: usize,

    /// Maximum number of type nodes created when rebuilding the argument
    /// types from the wire type table.
    pub max_type_expansion: usize,

    /// Maximum nesting depth of a rebuilt argument type. A table entry that
    /// refers to the next one nests one level deeper.
    pub max_type_depth: usize,

    /// Maximum number of values (including nested ones) in a payload. This
    /// bounds vectors of zero-sized elements such as `vec null`.
    pub max_value_count: usize,
}

impl Default for CandidConfig {
    fn default() -> Self {
        Self {
            max_varint_bytes: 1024,
            max_type_table_len: 10_000,
            max_args: 1_000,
            max_decode_depth: 512,
            max_type_expansion: 65_536,
            max_type_depth: 512,
            max_value_count: 4_000_000,
        }
    }
}
