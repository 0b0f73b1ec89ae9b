//! The boundary to whatever holds the sender's keys.

use crate::error::RequestIdError;
use crate::request_id::RequestId;
use ic_principal::Principal;

/// Public key and signature produced by an [`Identity`]. Both are absent
/// for the anonymous sender.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Signature {
    pub public_key: Option<Vec<u8>>,
    pub signature: Option<Vec<u8>>,
}

pub trait Identity {
    /// The principal requests are sent as.
    fn sender(&self) -> Principal;

    /// DER-encoded public key, if the identity has one.
    fn public_key(&self) -> Option<Vec<u8>>;

    /// Signs `message`, which is always the signable bytes of a request id.
    fn sign(&self, message: &[u8]) -> Result<Signature, String>;
}

/// Sends requests as the anonymous principal, without a signature.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnonymousIdentity;

impl Identity for AnonymousIdentity {
    fn sender(&self) -> Principal {
        Principal::anonymous()
    }

    fn public_key(&self) -> Option<Vec<u8>> {
        None
    }

    fn sign(&self, _message: &[u8]) -> Result<Signature, String> {
        Ok(Signature::default())
    }
}

/// A request id together with the sender's authentication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedRequestId {
    pub request_id: RequestId,
    pub sender: Principal,
    pub sender_pubkey: Option<Vec<u8>>,
    pub sender_sig: Option<Vec<u8>>,
}

/// Has `identity` sign the domain-separated `request_id`.
pub fn sign_request<I: Identity + ?Sized>(
    identity: &I,
    request_id: RequestId,
) -> Result<SignedRequestId, RequestIdError> {
    let Signature {
        public_key,
        signature,
    } = identity
        .sign(&request_id.signable_bytes())
        .map_err(RequestIdError::Signing)?;
    Ok(SignedRequestId {
        request_id,
        sender: identity.sender(),
        sender_pubkey: public_key.or_else(|| identity.public_key()),
        sender_sig: signature,
    })
}
