//! Contents of the requests a client sends, and their request ids.

use crate::error::RequestIdError;
use crate::hashable::{Hashable, HashableObject};
use crate::request_id::RequestId;
use ic_principal::Principal;

const REQUEST_TYPE: &str = "request_type";
const CANISTER_ID: &str = "canister_id";
const METHOD_NAME: &str = "method_name";
const ARG: &str = "arg";
const SENDER: &str = "sender";
const INGRESS_EXPIRY: &str = "ingress_expiry";
const NONCE: &str = "nonce";
const PATHS: &str = "paths";

/// An update call to a canister method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRequest {
    pub canister_id: Principal,
    pub method_name: String,
    pub arg: Vec<u8>,
    pub sender: Principal,
    /// Nanoseconds since the Unix epoch after which the request is dropped.
    pub ingress_expiry: u64,
    /// Makes otherwise identical calls distinct.
    pub nonce: Option<Vec<u8>>,
}

impl CallRequest {
    pub fn to_hashable(&self) -> HashableObject {
        let mut content = method_call("call", &self.canister_id, &self.method_name, &self.arg);
        content
            .insert(SENDER, self.sender)
            .insert(INGRESS_EXPIRY, self.ingress_expiry)
            .insert_optional(NONCE, self.nonce.clone());
        content
    }

    pub fn request_id(&self) -> RequestId {
        RequestId::of(&self.to_hashable())
    }
}

/// A query call to a canister method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryRequest {
    pub canister_id: Principal,
    pub method_name: String,
    pub arg: Vec<u8>,
    pub sender: Principal,
    pub ingress_expiry: u64,
    pub nonce: Option<Vec<u8>>,
}

impl QueryRequest {
    pub fn to_hashable(&self) -> HashableObject {
        let mut content = method_call("query", &self.canister_id, &self.method_name, &self.arg);
        content
            .insert(SENDER, self.sender)
            .insert(INGRESS_EXPIRY, self.ingress_expiry)
            .insert_optional(NONCE, self.nonce.clone());
        content
    }

    pub fn request_id(&self) -> RequestId {
        RequestId::of(&self.to_hashable())
    }
}

fn method_call(
    request_type: &str,
    canister_id: &Principal,
    method_name: &str,
    arg: &[u8],
) -> HashableObject {
    HashableObject::new()
        .with(REQUEST_TYPE, request_type)
        .with(CANISTER_ID, *canister_id)
        .with(METHOD_NAME, method_name)
        .with(ARG, arg)
}

/// A label in a read_state path. Never empty.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathSegment(Vec<u8>);

impl PathSegment {
    pub fn new<B: Into<Vec<u8>>>(bytes: B) -> Result<Self, RequestIdError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(RequestIdError::EmptyPathSegment);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for PathSegment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<RequestId> for PathSegment {
    fn from(request_id: RequestId) -> Self {
        Self(request_id.as_bytes().to_vec())
    }
}

impl From<PathSegment> for Hashable {
    fn from(segment: PathSegment) -> Self {
        Hashable::Bytes(segment.0)
    }
}

/// A request for parts of the certified state tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadStateRequest {
    pub paths: Vec<Vec<PathSegment>>,
    pub sender: Principal,
    pub ingress_expiry: u64,
}

impl ReadStateRequest {
    /// The path of the status of an earlier call.
    pub fn request_status_path(request_id: RequestId) -> Vec<PathSegment> {
        vec![
            PathSegment(b"request_status".to_vec()),
            PathSegment::from(request_id),
        ]
    }

    pub fn to_hashable(&self) -> HashableObject {
        let paths = Hashable::array(
            self.paths
                .iter()
                .map(|path| Hashable::array(path.iter().cloned())),
        );
        HashableObject::new()
            .with(REQUEST_TYPE, "read_state")
            .with(PATHS, paths)
            .with(SENDER, self.sender)
            .with(INGRESS_EXPIRY, self.ingress_expiry)
    }

    pub fn request_id(&self) -> RequestId {
        RequestId::of(&self.to_hashable())
    }
}
