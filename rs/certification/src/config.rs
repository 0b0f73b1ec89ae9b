use serde::{Deserialize, Serialize};

/// Limits and checks applied by [`crate::CertificateVerifier`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Number of delegations a certificate may chain through. The network
    /// only ever issues a single level.
    pub max_delegation_depth: usize,
    /// Nesting limit for hash trees while decoding.
    pub max_tree_depth: usize,
    /// Whether a delegation must list the effective canister id in its
    /// canister ranges.
    pub check_canister_ranges: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_delegation_depth: 1,
            max_tree_depth: 128,
            check_canister_ranges: true,
        }
    }
}
