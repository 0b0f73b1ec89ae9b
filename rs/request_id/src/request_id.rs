use crate::error::RequestIdError;
use crate::hashable::{Hashable, HashableObject, Sha256};
use serde::{de::Deserializer, ser::Serializer, Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The length of a [`RequestId`].
pub const REQUEST_ID_LENGTH: usize = 32;

/// Prepended to a request id to form the message an identity signs.
pub const IC_REQUEST_DOMAIN_SEPARATOR: &[u8; 11] = b"\x0Aic-request";

/// The representation-independent SHA-256 digest of a request's content.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct RequestId([u8; REQUEST_ID_LENGTH]);

impl RequestId {
    pub fn new(bytes: [u8; REQUEST_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Computes the request id of a request's field map.
    pub fn of(content: &HashableObject) -> Self {
        let digest = content.compute_hash(&Sha256);
        let mut bytes = [0u8; REQUEST_ID_LENGTH];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; REQUEST_ID_LENGTH] {
        &self.0
    }

    /// The bytes a sender signs to authenticate the request:
    /// the `ic-request` domain separator followed by the id.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(IC_REQUEST_DOMAIN_SEPARATOR.len() + REQUEST_ID_LENGTH);
        bytes.extend_from_slice(IC_REQUEST_DOMAIN_SEPARATOR);
        bytes.extend_from_slice(&self.0);
        bytes
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for RequestId {
    type Err = RequestIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(hex_digits).map_err(|err| RequestIdError::InvalidHex(err.to_string()))?;
        Self::try_from(bytes.as_slice())
    }
}

impl TryFrom<&[u8]> for RequestId {
    type Error = RequestIdError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; REQUEST_ID_LENGTH] =
            bytes
                .try_into()
                .map_err(|_| RequestIdError::InvalidLength {
                    given_length: bytes.len(),
                    expected_length: REQUEST_ID_LENGTH,
                })?;
        Ok(RequestId(array))
    }
}

impl AsRef<[u8]> for RequestId {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl From<[u8; REQUEST_ID_LENGTH]> for RequestId {
    fn from(bytes: [u8; REQUEST_ID_LENGTH]) -> Self {
        RequestId(bytes)
    }
}

impl From<RequestId> for Hashable {
    fn from(request_id: RequestId) -> Self {
        Hashable::Bytes(request_id.0.to_vec())
    }
}

// serde_bytes cannot be used with derive(Deserialize) for [u8; 32], so
// Serialize/Deserialize are implemented by hand.
impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'a> Deserialize<'a> for RequestId {
    fn deserialize<D: Deserializer<'a>>(deserializer: D) -> Result<Self, D::Error> {
        struct RequestIdVisitor;

        impl<'de> serde::de::Visitor<'de> for RequestIdVisitor {
            type Value = RequestId;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    formatter,
                    "a request id: a blob with {} bytes",
                    REQUEST_ID_LENGTH
                )
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                RequestId::try_from(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_bytes(RequestIdVisitor)
    }
}
