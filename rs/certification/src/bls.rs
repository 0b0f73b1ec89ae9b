//! BLS12-381 signatures over state root digests.
//!
//! Certificates are signed with the min-signature-size scheme: signatures
//! are points in G1, public keys points in G2.

use crate::error::VerificationFailure;
use crate::hash_tree::Digest;
use ic_bls12_381::hash_to_curve::{ExpandMsgXmd, HashToCurve};
use ic_bls12_381::{pairing, G1Affine, G1Projective, G2Affine};
use std::fmt;

pub const PUBLIC_KEY_SIZE: usize = 96;
pub const SIGNATURE_SIZE: usize = 48;

/// The DER encoding of a public key is this prefix followed by the
/// compressed G2 point.
pub const DER_PREFIX: [u8; 37] = [
    0x30, 0x81, 0x82, 0x30, 0x1d, 0x06, 0x0d, 0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0xdc, 0x7c, 0x05,
    0x03, 0x01, 0x02, 0x01, 0x06, 0x0c, 0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0xdc, 0x7c, 0x05, 0x03,
    0x02, 0x01, 0x03, 0x61, 0x00,
];

const DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";
const STATE_ROOT_DOMAIN: &[u8] = b"\x0Dic-state-root";

/// A BLS12-381 public key that certifies state roots.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    bytes: [u8; PUBLIC_KEY_SIZE],
    point: G2Affine,
}

impl PublicKey {
    /// Parses a compressed G2 point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VerificationFailure> {
        let bytes: [u8; PUBLIC_KEY_SIZE] = bytes.try_into().map_err(|_| {
            VerificationFailure::MalformedKey(format!(
                "expected {} bytes, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            ))
        })?;
        let point = Option::from(G2Affine::from_compressed(&bytes)).ok_or_else(|| {
            VerificationFailure::MalformedKey("not a point in G2".to_string())
        })?;
        Ok(Self { bytes, point })
    }

    /// Parses a DER-encoded key as found in `/subnet/<id>/public_key`.
    pub fn from_der(der: &[u8]) -> Result<Self, VerificationFailure> {
        if der.len() != DER_PREFIX.len() + PUBLIC_KEY_SIZE {
            return Err(VerificationFailure::MalformedKey(format!(
                "expected {} DER bytes, got {}",
                DER_PREFIX.len() + PUBLIC_KEY_SIZE,
                der.len()
            )));
        }
        let (prefix, key) = der.split_at(DER_PREFIX.len());
        if prefix != DER_PREFIX {
            return Err(VerificationFailure::MalformedKey(
                "unexpected DER prefix".to_string(),
            ));
        }
        Self::from_bytes(key)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.bytes
    }

    pub fn to_der(&self) -> Vec<u8> {
        let mut der = DER_PREFIX.to_vec();
        der.extend_from_slice(&self.bytes);
        der
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.bytes))
    }
}

/// The message a state root signature is computed over.
pub fn state_root_message(root_digest: &Digest) -> Vec<u8> {
    let mut message = STATE_ROOT_DOMAIN.to_vec();
    message.extend_from_slice(root_digest.as_bytes());
    message
}

/// Hashes `message` to a point in G1.
pub fn hash_to_g1(message: &[u8]) -> G1Affine {
    let point = <G1Projective as HashToCurve<ExpandMsgXmd<sha2::Sha256>>>::hash_to_curve(
        message, DST,
    );
    G1Affine::from(point)
}

/// Checks that `signature` signs the state root `root_digest` under `key`.
pub fn verify_state_root(
    root_digest: &Digest,
    signature: &[u8],
    key: &PublicKey,
) -> Result<(), VerificationFailure> {
    let signature: [u8; SIGNATURE_SIZE] = signature.try_into().map_err(|_| {
        VerificationFailure::MalformedSignature(format!(
            "expected {} bytes, got {}",
            SIGNATURE_SIZE,
            signature.len()
        ))
    })?;
    let signature: G1Affine = Option::from(G1Affine::from_compressed(&signature))
        .ok_or_else(|| VerificationFailure::MalformedSignature("not a point in G1".to_string()))?;

    let message = hash_to_g1(&state_root_message(root_digest));
    // e(signature, g2) == e(H(m), pk)
    if pairing(&signature, &G2Affine::generator()) == pairing(&message, &key.point) {
        Ok(())
    } else {
        Err(VerificationFailure::SignatureMismatch {
            root_digest: root_digest.to_string(),
        })
    }
}
