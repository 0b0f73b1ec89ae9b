#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]

//! Verification of certified responses.
//!
//! A [`Certificate`] is a [`HashTree`] whose root digest is signed by a
//! subnet. The subnet's key is either the caller's trusted root key or is
//! itself vouched for by a root-signed [`Delegation`].
pub mod bls;
mod certificate;
mod config;
mod error;
mod hash_tree;
mod verifier;

pub use bls::PublicKey;
pub use certificate::{decode_certificate, Certificate, Delegation, SELF_DESCRIBING_TAG};
pub use config::VerifierConfig;
pub use error::{CertificateError, VerificationFailure};
pub use hash_tree::{Digest, HashTree, Label, LookupResult};
pub use ic_principal::Principal;
pub use verifier::{verify_certificate_bytes, CertificateVerifier};
