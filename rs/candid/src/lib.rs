#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]

//! Candid binary codec.
//!
//! Values are encoded together with their types into a self-describing
//! `DIDL` payload: a deduplicated table of compound types, one type
//! reference per argument, then the argument values. Recursive types are
//! expressed through [`CandidType::Reference`] nodes bound by a compound
//! type's recursive id and serialized as table indices.
mod config;
mod decoder;
mod encoder;
mod error;
mod parser;
mod tag;
mod type_table;
mod types;
mod value;
pub mod varint;

pub use config::CandidConfig;
pub use decoder::{decode_args, ArgDecoder};
pub use encoder::{encode_args, encode_args_with_table, ArgEncoder, MAGIC_NUMBER};
pub use error::{CandidError, CandidResult, TypeReference, VarintError};
pub use ic_principal::Principal;
pub use parser::{CandidServiceFile, ParseError};
pub use tag::{idl_hash, CandidId, Tag};
pub use type_table::CompoundTypeTable;
pub use types::{
    CandidType, CompoundKind, CompoundType, FuncArg, FuncMode, FuncType, PrimitiveType,
    ServiceType,
};
pub use value::{CandidRecord, CandidValue, CandidVariant, CandidVector, FuncRef, ValueKind};
