use ic_principal::Principal;
use thiserror::Error;

/// Why a certificate was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum VerificationFailure {
    #[error("failed to decode certificate: {0}")]
    Malformed(String),
    #[error("malformed public key: {0}")]
    MalformedKey(String),
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
    #[error("signature does not match the certified root digest {root_digest}")]
    SignatureMismatch { root_digest: String },
    #[error("expected at most {max_depth} delegation(s) but found more")]
    DelegationTooDeep { max_depth: usize },
    #[error("cannot find the public key of subnet {subnet_id} in the delegation")]
    SubnetKeyMissing { subnet_id: Principal },
    #[error("cannot find the canister ranges of subnet {subnet_id} in the delegation")]
    CanisterRangesMissing { subnet_id: Principal },
    #[error("failed to unpack canister ranges: {0}")]
    MalformedCanisterRanges(String),
    #[error("canister {canister_id} is not in the canister ranges of subnet {subnet_id}")]
    CanisterOutOfRange {
        canister_id: Principal,
        subnet_id: Principal,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CertificateError {
    #[error("unsupported hash tree node type {0}")]
    UnsupportedHashTreeNodeType(i128),
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),
    #[error("certificate verification failed: {reason}")]
    CertificateVerificationFailed { reason: VerificationFailure },
}

impl From<VerificationFailure> for CertificateError {
    fn from(reason: VerificationFailure) -> Self {
        CertificateError::CertificateVerificationFailed { reason }
    }
}
