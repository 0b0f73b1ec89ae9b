#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]

//! Request ids: representation-independent hashes of request contents.
mod error;
mod hashable;
mod identity;
mod request_id;
mod requests;

pub use error::RequestIdError;
pub use hashable::{HashFunction, Hashable, HashableObject, Sha256};
pub use ic_principal::Principal;
pub use identity::{sign_request, AnonymousIdentity, Identity, Signature, SignedRequestId};
pub use request_id::{RequestId, IC_REQUEST_DOMAIN_SEPARATOR, REQUEST_ID_LENGTH};
pub use requests::{CallRequest, PathSegment, QueryRequest, ReadStateRequest};
