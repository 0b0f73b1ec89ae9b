//! Checks that a certificate chains up to a trusted root key.

use crate::bls::{verify_state_root, PublicKey};
use crate::certificate::{Certificate, Delegation};
use crate::config::VerifierConfig;
use crate::error::{CertificateError, VerificationFailure};
use crate::hash_tree::LookupResult;
use ic_principal::Principal;
use serde_cbor::Value;
use slog::{debug, o, warn, Logger};

/// Verifies certificates against a root key obtained out of band.
pub struct CertificateVerifier {
    config: VerifierConfig,
    log: Logger,
}

impl CertificateVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            config,
            log: Logger::root(slog::Discard, o!()),
        }
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Checks the signature on `certificate`.
    ///
    /// Without a delegation the signature must verify under `root_key`.
    /// With one, the delegation's certificate must itself verify under
    /// `root_key` and reveal the key that signed `certificate`. If
    /// `effective_canister_id` is given and range checks are enabled, the
    /// delegation must also cover that canister.
    pub fn verify(
        &self,
        certificate: &Certificate,
        root_key: &PublicKey,
        effective_canister_id: Option<Principal>,
    ) -> Result<(), CertificateError> {
        let log = self.log.new(o!("operation" => "verify"));
        debug!(log, "start"; "has_delegation" => certificate.delegation.is_some());
        let result = self
            .verify_impl(certificate, root_key, effective_canister_id.as_ref(), 0)
            .map_err(CertificateError::from);
        debug!(log, "end"; "is_ok" => result.is_ok());
        if let Err(err) = &result {
            warn!(log, "certificate rejected: {}", err);
        }
        result
    }

    /// Decodes `bytes` and verifies the resulting certificate. Any decoding
    /// failure is reported as a failed verification.
    pub fn verify_certificate_bytes(
        &self,
        bytes: &[u8],
        root_key: &PublicKey,
        effective_canister_id: Option<Principal>,
    ) -> Result<Certificate, CertificateError> {
        let certificate =
            Certificate::from_cbor(bytes, self.config.max_tree_depth).map_err(|err| {
                warn!(
                    self.log,
                    "certificate rejected: {}", err;
                    "operation" => "verify_certificate_bytes"
                );
                match err {
                    CertificateError::CertificateVerificationFailed { reason } => reason,
                    other => VerificationFailure::Malformed(other.to_string()),
                }
            })?;
        self.verify(&certificate, root_key, effective_canister_id)?;
        Ok(certificate)
    }

    fn verify_impl(
        &self,
        certificate: &Certificate,
        root_key: &PublicKey,
        effective_canister_id: Option<&Principal>,
        depth: usize,
    ) -> Result<(), VerificationFailure> {
        let delegated_key;
        let key = match &certificate.delegation {
            None => root_key,
            Some(delegation) => {
                if depth >= self.config.max_delegation_depth {
                    return Err(VerificationFailure::DelegationTooDeep {
                        max_depth: self.config.max_delegation_depth,
                    });
                }
                delegated_key =
                    self.verify_delegation(delegation, root_key, effective_canister_id, depth)?;
                &delegated_key
            }
        };
        verify_state_root(&certificate.tree.digest(), &certificate.signature, key)
    }

    fn verify_delegation(
        &self,
        delegation: &Delegation,
        root_key: &PublicKey,
        effective_canister_id: Option<&Principal>,
        depth: usize,
    ) -> Result<PublicKey, VerificationFailure> {
        let subnet_id = delegation.subnet_id;
        let certificate = &delegation.certificate;
        self.verify_impl(certificate, root_key, effective_canister_id, depth + 1)?;

        if let (Some(canister_id), true) =
            (effective_canister_id, self.config.check_canister_ranges)
        {
            let ranges = match certificate.lookup(&subnet_path(&subnet_id, "canister_ranges")) {
                LookupResult::Found(ranges) => parse_canister_ranges(ranges)?,
                _ => return Err(VerificationFailure::CanisterRangesMissing { subnet_id }),
            };
            let id = canister_id.as_slice();
            if !ranges
                .iter()
                .any(|(low, high)| low.as_slice() <= id && id <= high.as_slice())
            {
                return Err(VerificationFailure::CanisterOutOfRange {
                    canister_id: *canister_id,
                    subnet_id,
                });
            }
        }

        match certificate.lookup(&subnet_path(&subnet_id, "public_key")) {
            LookupResult::Found(der) => PublicKey::from_der(der),
            _ => Err(VerificationFailure::SubnetKeyMissing { subnet_id }),
        }
    }
}

/// Verifies `bytes` with the default configuration.
pub fn verify_certificate_bytes(
    bytes: &[u8],
    root_key: &PublicKey,
    effective_canister_id: Option<Principal>,
) -> Result<Certificate, CertificateError> {
    CertificateVerifier::new(VerifierConfig::default()).verify_certificate_bytes(
        bytes,
        root_key,
        effective_canister_id,
    )
}

fn subnet_path(subnet_id: &Principal, leaf: &str) -> [Vec<u8>; 3] {
    [
        b"subnet".to_vec(),
        subnet_id.as_slice().to_vec(),
        leaf.as_bytes().to_vec(),
    ]
}

/// Parses the CBOR list of inclusive `(low, high)` canister id pairs.
fn parse_canister_ranges(bytes: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, VerificationFailure> {
    let malformed = |reason: String| VerificationFailure::MalformedCanisterRanges(reason);
    let value: Value = serde_cbor::from_slice(bytes).map_err(|err| malformed(err.to_string()))?;
    let value = match value {
        Value::Tag(_, inner) => *inner,
        other => other,
    };
    let pairs = match value {
        Value::Array(pairs) => pairs,
        other => return Err(malformed(format!("expected a list, got {:?}", other))),
    };
    pairs
        .into_iter()
        .map(|pair| match pair {
            Value::Array(bounds) => match <[Value; 2]>::try_from(bounds) {
                Ok([Value::Bytes(low), Value::Bytes(high)]) => Ok((low, high)),
                Ok(other) => Err(malformed(format!("expected two ids, got {:?}", other))),
                Err(bounds) => Err(malformed(format!(
                    "expected a pair, got {} elements",
                    bounds.len()
                ))),
            },
            other => Err(malformed(format!("expected a pair, got {:?}", other))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn ranges_cbor(ranges: Vec<Value>) -> Vec<u8> {
        serde_cbor::to_vec(&Value::Array(ranges)).expect("encodes")
    }

    #[test]
    fn should_parse_canister_ranges() {
        let bytes = ranges_cbor(vec![
            Value::Array(vec![Value::Bytes(vec![0, 1]), Value::Bytes(vec![0, 9])]),
            Value::Array(vec![Value::Bytes(vec![5]), Value::Bytes(vec![5])]),
        ]);
        assert_eq!(
            parse_canister_ranges(&bytes),
            Ok(vec![(vec![0, 1], vec![0, 9]), (vec![5], vec![5])])
        );
    }

    #[test]
    fn should_parse_tagged_canister_ranges() {
        // 55799([[h'01', h'02']])
        let bytes = hex::decode("d9d9f78182410141 02".replace(' ', "")).expect("valid hex");
        assert_eq!(parse_canister_ranges(&bytes), Ok(vec![(vec![1], vec![2])]));
    }

    #[test]
    fn should_reject_malformed_canister_ranges() {
        let triple = ranges_cbor(vec![Value::Array(vec![
            Value::Bytes(vec![0]),
            Value::Bytes(vec![1]),
            Value::Bytes(vec![2]),
        ])]);
        assert_matches!(
            parse_canister_ranges(&triple),
            Err(VerificationFailure::MalformedCanisterRanges(_))
        );
        let text = ranges_cbor(vec![Value::Array(vec![
            Value::Text("a".to_string()),
            Value::Bytes(vec![1]),
        ])]);
        assert_matches!(
            parse_canister_ranges(&text),
            Err(VerificationFailure::MalformedCanisterRanges(_))
        );
    }

    #[test]
    fn should_build_subnet_paths() {
        let subnet_id = Principal::from_slice(&[1, 2]);
        assert_eq!(
            subnet_path(&subnet_id, "public_key"),
            [b"subnet".to_vec(), vec![1, 2], b"public_key".to_vec()]
        );
    }
}
