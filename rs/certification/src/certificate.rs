//! Certificates as returned by the network, and their CBOR encoding.

use crate::config::VerifierConfig;
use crate::error::CertificateError;
use crate::hash_tree::{HashTree, LookupResult};
use ic_principal::Principal;
use serde_cbor::Value;
use std::collections::BTreeMap;

/// The self-describing CBOR tag certificates are usually wrapped in.
pub const SELF_DESCRIBING_TAG: u64 = 55799;

// Delegations nest certificates inside byte strings, so the CBOR decoder's
// own recursion limit does not bound them.
const MAX_DELEGATION_NESTING: usize = 8;

const TREE: &str = "tree";
const SIGNATURE: &str = "signature";
const DELEGATION: &str = "delegation";
const SUBNET_ID: &str = "subnet_id";
const CERTIFICATE: &str = "certificate";

/// A hash tree signed by a subnet, possibly on behalf of the root subnet.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Certificate {
    pub tree: HashTree,
    pub signature: Vec<u8>,
    pub delegation: Option<Delegation>,
}

/// Authorizes the key of `subnet_id` to sign certificates. The nested
/// certificate reveals that key under `/subnet/<subnet_id>/public_key`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Delegation {
    pub subnet_id: Principal,
    pub certificate: Box<Certificate>,
}

impl Certificate {
    /// Decodes a certificate, with or without the self-describing tag.
    pub fn from_cbor(bytes: &[u8], max_tree_depth: usize) -> Result<Self, CertificateError> {
        decode_nested(bytes, max_tree_depth, MAX_DELEGATION_NESTING)
    }

    /// Encodes the certificate with the self-describing tag.
    pub fn to_cbor(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut serializer = serde_cbor::Serializer::new(serde_cbor::ser::IoWrite::new(&mut buf));
        serializer
            .self_describe()
            .expect("writing to a Vec never fails");
        serde::Serialize::serialize(&self.to_cbor_value(), &mut serializer)
            .expect("writing to a Vec never fails");
        buf
    }

    fn to_cbor_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert(Value::Text(TREE.to_string()), self.tree.to_cbor_value());
        map.insert(
            Value::Text(SIGNATURE.to_string()),
            Value::Bytes(self.signature.clone()),
        );
        if let Some(delegation) = &self.delegation {
            let mut inner = BTreeMap::new();
            inner.insert(
                Value::Text(SUBNET_ID.to_string()),
                Value::Bytes(delegation.subnet_id.as_slice().to_vec()),
            );
            inner.insert(
                Value::Text(CERTIFICATE.to_string()),
                Value::Bytes(delegation.certificate.to_cbor()),
            );
            map.insert(Value::Text(DELEGATION.to_string()), Value::Map(inner));
        }
        Value::Map(map)
    }

    /// Looks up `path` in the certified tree.
    pub fn lookup<L: AsRef<[u8]>>(&self, path: &[L]) -> LookupResult<'_> {
        self.tree.lookup_path(path)
    }

    /// The time at which the state was certified, in nanoseconds since the
    /// Unix epoch.
    pub fn time(&self) -> Result<u64, CertificateError> {
        match self.tree.lookup_path(&["time"]) {
            LookupResult::Found(mut leb) => {
                let time = leb128::read::unsigned(&mut leb).map_err(|err| {
                    malformed(format!("failed to decode time as LEB128: {}", err))
                })?;
                if !leb.is_empty() {
                    return Err(malformed("trailing bytes after LEB128 time"));
                }
                Ok(time)
            }
            other => Err(malformed(format!("time is not certified: {:?}", other))),
        }
    }
}

/// Decodes a certificate with the default tree depth limit.
pub fn decode_certificate(bytes: &[u8]) -> Result<Certificate, CertificateError> {
    Certificate::from_cbor(bytes, VerifierConfig::default().max_tree_depth)
}

fn malformed(reason: impl Into<String>) -> CertificateError {
    CertificateError::MalformedCertificate(reason.into())
}

fn decode_nested(
    bytes: &[u8],
    max_tree_depth: usize,
    remaining_nesting: usize,
) -> Result<Certificate, CertificateError> {
    let value: Value = serde_cbor::from_slice(bytes)
        .map_err(|err| malformed(format!("failed to decode certificate: {}", err)))?;
    let map = match strip_self_describing_tag(value) {
        Value::Map(map) => map,
        other => return Err(malformed(format!("expected a map, got {:?}", other))),
    };

    let tree = HashTree::from_cbor_value(required(&map, TREE)?, max_tree_depth)?;
    let signature = bytes_field(&map, SIGNATURE)?.to_vec();
    let delegation = match map.get(&Value::Text(DELEGATION.to_string())) {
        None | Some(Value::Null) => None,
        Some(Value::Map(delegation)) => {
            let remaining_nesting = remaining_nesting
                .checked_sub(1)
                .ok_or_else(|| malformed("delegations are nested too deeply"))?;
            let subnet_id = Principal::try_from_slice(bytes_field(delegation, SUBNET_ID)?)
                .map_err(|err| {
                    malformed(format!("failed to parse delegation subnet id: {}", err))
                })?;
            let certificate = decode_nested(
                bytes_field(delegation, CERTIFICATE)?,
                max_tree_depth,
                remaining_nesting,
            )?;
            Some(Delegation {
                subnet_id,
                certificate: Box::new(certificate),
            })
        }
        Some(other) => {
            return Err(malformed(format!(
                "expected delegation as a map, got {:?}",
                other
            )))
        }
    };

    Ok(Certificate {
        tree,
        signature,
        delegation,
    })
}

fn strip_self_describing_tag(value: Value) -> Value {
    match value {
        Value::Tag(SELF_DESCRIBING_TAG, inner) => *inner,
        other => other,
    }
}

fn required<'a>(map: &'a BTreeMap<Value, Value>, key: &str) -> Result<&'a Value, CertificateError> {
    map.get(&Value::Text(key.to_string()))
        .ok_or_else(|| malformed(format!("missing field `{}`", key)))
}

fn bytes_field<'a>(
    map: &'a BTreeMap<Value, Value>,
    key: &str,
) -> Result<&'a [u8], CertificateError> {
    match required(map, key)? {
        Value::Bytes(bytes) => Ok(bytes),
        other => Err(malformed(format!(
            "expected `{}` as a byte string, got {:?}",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn certificate(time: u64) -> Certificate {
        let mut leb = Vec::new();
        leb128::write::unsigned(&mut leb, time).expect("writing to a Vec never fails");
        Certificate {
            tree: HashTree::fork(
                HashTree::labeled("canister", HashTree::pruned([3; 32])),
                HashTree::labeled("time", HashTree::leaf(leb)),
            ),
            signature: vec![1; 48],
            delegation: None,
        }
    }

    #[test]
    fn should_round_trip_through_cbor() {
        let inner = certificate(1);
        let outer = Certificate {
            delegation: Some(Delegation {
                subnet_id: Principal::from_slice(&[1; 29]),
                certificate: Box::new(inner),
            }),
            ..certificate(2)
        };
        let bytes = outer.to_cbor();

        assert_eq!(&bytes[..3], &[0xd9, 0xd9, 0xf7]);
        assert_eq!(Certificate::from_cbor(&bytes, 128), Ok(outer));
    }

    #[test]
    fn should_decode_without_self_describing_tag() {
        let cert = certificate(5);
        let bytes = cert.to_cbor();
        assert_eq!(Certificate::from_cbor(&bytes[3..], 128), Ok(cert));
    }

    #[test]
    fn should_read_time() {
        assert_eq!(certificate(1_643_206_874_888_337_280).time(), Ok(1_643_206_874_888_337_280));
    }

    #[test]
    fn should_fail_without_time() {
        let cert = Certificate {
            tree: HashTree::Empty,
            ..certificate(0)
        };
        assert_matches!(cert.time(), Err(CertificateError::MalformedCertificate(_)));
    }

    #[test]
    fn should_reject_missing_fields() {
        let mut map = BTreeMap::new();
        map.insert(Value::Text(TREE.to_string()), HashTree::Empty.to_cbor_value());
        let bytes = serde_cbor::to_vec(&Value::Map(map)).expect("encodes");
        assert_matches!(
            Certificate::from_cbor(&bytes, 128),
            Err(CertificateError::MalformedCertificate(reason)) if reason.contains("signature")
        );
    }

    #[test]
    fn should_propagate_unsupported_node_types() {
        let mut map = BTreeMap::new();
        map.insert(
            Value::Text(TREE.to_string()),
            Value::Array(vec![Value::Integer(7)]),
        );
        map.insert(Value::Text(SIGNATURE.to_string()), Value::Bytes(vec![]));
        let bytes = serde_cbor::to_vec(&Value::Map(map)).expect("encodes");
        assert_matches!(
            Certificate::from_cbor(&bytes, 128),
            Err(CertificateError::UnsupportedHashTreeNodeType(7))
        );
    }

    #[test]
    fn should_reject_garbage() {
        assert_matches!(
            Certificate::from_cbor(&[0xff, 0x00, 0x13], 128),
            Err(CertificateError::MalformedCertificate(_))
        );
    }

    #[test]
    fn should_bound_delegation_nesting() {
        let mut cert = certificate(0);
        for _ in 0..=MAX_DELEGATION_NESTING {
            cert = Certificate {
                delegation: Some(Delegation {
                    subnet_id: Principal::from_slice(&[1]),
                    certificate: Box::new(cert),
                }),
                ..certificate(0)
            };
        }
        assert_matches!(
            Certificate::from_cbor(&cert.to_cbor(), 128),
            Err(CertificateError::MalformedCertificate(reason)) if reason.contains("nested")
        );
    }
}
