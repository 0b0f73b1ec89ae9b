//! Builders for signed certificates, for use in tests.

use ic_bls12_381::{G1Affine, G2Affine, Scalar};
use ic_client_certification::bls::{hash_to_g1, state_root_message};
use ic_client_certification::{Certificate, Delegation, Digest, HashTree, Label, PublicKey};
use ic_principal::Principal;
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde_cbor::Value;
use std::collections::{BTreeMap, VecDeque};

/// A BLS secret key together with its public key.
#[derive(Clone)]
pub struct SigningKey {
    secret: Scalar,
    public: PublicKey,
}

impl SigningKey {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut wide = [0u8; 64];
        rng.fill_bytes(&mut wide);
        let secret = Scalar::from_bytes_wide(&wide);
        let point = G2Affine::from(G2Affine::generator() * secret);
        let public = PublicKey::from_bytes(&point.to_compressed()).expect("valid G2 point");
        Self { secret, public }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self::random(&mut ChaCha20Rng::seed_from_u64(seed))
    }

    pub fn public_key(&self) -> PublicKey {
        self.public.clone()
    }

    pub fn sign_state_root(&self, root_digest: &Digest) -> Vec<u8> {
        let message = hash_to_g1(&state_root_message(root_digest));
        G1Affine::from(message * self.secret).to_compressed().to_vec()
    }
}

/// A fully revealed tree of labeled values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabeledTree {
    Leaf(Vec<u8>),
    SubTree(BTreeMap<Label, LabeledTree>),
}

impl LabeledTree {
    pub fn subtree<L: Into<Label>>(children: impl IntoIterator<Item = (L, LabeledTree)>) -> Self {
        LabeledTree::SubTree(
            children
                .into_iter()
                .map(|(label, child)| (label.into(), child))
                .collect(),
        )
    }
}

/// Converts a labeled tree into a hash tree without pruning anything. The
/// children of each subtree are combined pairwise into balanced forks.
pub fn hash_full_tree(tree: &LabeledTree) -> HashTree {
    match tree {
        LabeledTree::Leaf(contents) => HashTree::leaf(contents.clone()),
        LabeledTree::SubTree(children) => {
            let mut hash_trees: VecDeque<HashTree> = children
                .iter()
                .map(|(label, child)| HashTree::labeled(label.clone(), hash_full_tree(child)))
                .collect();
            if hash_trees.is_empty() {
                return HashTree::Empty;
            }
            let mut combined_trees = VecDeque::with_capacity((hash_trees.len() + 1) / 2);
            while hash_trees.len() != 1 {
                while let Some(left) = hash_trees.pop_front() {
                    match hash_trees.pop_front() {
                        Some(right) => combined_trees.push_back(HashTree::fork(left, right)),
                        None => combined_trees.push_back(left),
                    }
                }
                std::mem::swap(&mut hash_trees, &mut combined_trees);
            }
            hash_trees
                .pop_front()
                .expect("Missing element from hash_trees")
        }
    }
}

/// Encodes `time` the way the `/time` leaf stores it.
pub fn encode_time(time: u64) -> Vec<u8> {
    let mut leb = Vec::new();
    leb128::write::unsigned(&mut leb, time).expect("writing to a Vec never fails");
    leb
}

/// Encodes canister ranges the way `/subnet/<id>/canister_ranges` stores
/// them.
pub fn encode_canister_ranges(ranges: &[(Principal, Principal)]) -> Vec<u8> {
    let pairs = ranges
        .iter()
        .map(|(low, high)| {
            Value::Array(vec![
                Value::Bytes(low.as_slice().to_vec()),
                Value::Bytes(high.as_slice().to_vec()),
            ])
        })
        .collect();
    serde_cbor::to_vec(&Value::Array(pairs)).expect("failed to encode canister ranges")
}

/// What the certified tree contains.
#[derive(Clone, Debug)]
pub enum CertificateData {
    /// `/canister/<canister_id>/certified_data` and `/time`.
    CanisterData {
        canister_id: Principal,
        certified_data: Vec<u8>,
    },
    /// `/subnet/<subnet_id>/{canister_ranges,public_key}` and `/time`. The
    /// public key is that of the certificate being delegated to.
    SubnetData {
        subnet_id: Principal,
        canister_id_ranges: Vec<(Principal, Principal)>,
    },
    /// Used as is.
    CustomTree(HashTree),
}

pub struct CertificateBuilder {
    data: CertificateData,
    time: u64,
    seed: u64,
    signing_key: Option<SigningKey>,
    published_key: Option<PublicKey>,
    delegation: Option<Box<CertificateBuilder>>,
}

impl CertificateBuilder {
    pub fn new(data: CertificateData) -> Self {
        Self {
            data,
            time: 1_643_206_874_888_337_280,
            seed: 42,
            signing_key: None,
            published_key: None,
            delegation: None,
        }
    }

    pub fn with_time(mut self, time: u64) -> Self {
        self.time = time;
        self
    }

    /// Seeds the generation of keys that were not set explicitly.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Signs this certificate with `key` instead of a generated one.
    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Has the delegation vouch for `key` instead of the key that actually
    /// signs this certificate.
    pub fn with_published_key(mut self, key: PublicKey) -> Self {
        self.published_key = Some(key);
        self
    }

    /// Delegates from the root to this certificate's signer. `delegation`
    /// must carry [`CertificateData::SubnetData`].
    pub fn with_delegation(mut self, delegation: CertificateBuilder) -> Self {
        self.delegation = Some(Box::new(delegation));
        self
    }

    /// Returns the certificate, the root key it verifies under, and its
    /// CBOR encoding.
    pub fn build(self) -> (Certificate, PublicKey, Vec<u8>) {
        let mut rng = ChaCha20Rng::seed_from_u64(self.seed);
        let (certificate, root_key) = self.build_with_rng(&mut rng, None);
        let cbor = certificate.to_cbor();
        (certificate, root_key, cbor)
    }

    fn build_with_rng(
        self,
        rng: &mut ChaCha20Rng,
        delegated_key: Option<PublicKey>,
    ) -> (Certificate, PublicKey) {
        let key = match self.signing_key {
            Some(key) => key,
            None => SigningKey::random(rng),
        };
        let (delegation, root_key) = match self.delegation {
            None => (None, key.public_key()),
            Some(builder) => {
                let subnet_id = match &builder.data {
                    CertificateData::SubnetData { subnet_id, .. } => *subnet_id,
                    other => panic!("a delegation must certify subnet data, got {:?}", other),
                };
                let published = self.published_key.unwrap_or_else(|| key.public_key());
                let (certificate, root_key) = builder.build_with_rng(rng, Some(published));
                let delegation = Delegation {
                    subnet_id,
                    certificate: Box::new(certificate),
                };
                (Some(delegation), root_key)
            }
        };

        let time = LabeledTree::Leaf(encode_time(self.time));
        let tree = match self.data {
            CertificateData::CanisterData {
                canister_id,
                certified_data,
            } => hash_full_tree(&LabeledTree::subtree([
                (
                    Label::from("canister"),
                    LabeledTree::subtree([(
                        Label::from(canister_id.as_slice()),
                        LabeledTree::subtree([(
                            "certified_data",
                            LabeledTree::Leaf(certified_data),
                        )]),
                    )]),
                ),
                (Label::from("time"), time),
            ])),
            CertificateData::SubnetData {
                subnet_id,
                canister_id_ranges,
            } => {
                let public_key = delegated_key.unwrap_or_else(|| key.public_key());
                hash_full_tree(&LabeledTree::subtree([
                    (
                        Label::from("subnet"),
                        LabeledTree::subtree([(
                            Label::from(subnet_id.as_slice()),
                            LabeledTree::subtree([
                                (
                                    "canister_ranges",
                                    LabeledTree::Leaf(encode_canister_ranges(&canister_id_ranges)),
                                ),
                                ("public_key", LabeledTree::Leaf(public_key.to_der())),
                            ]),
                        )]),
                    ),
                    (Label::from("time"), time),
                ]))
            }
            CertificateData::CustomTree(tree) => tree,
        };

        let signature = key.sign_state_root(&tree.digest());
        (
            Certificate {
                tree,
                signature,
                delegation,
            },
            root_key,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_balance_forks() {
        let tree = LabeledTree::subtree([
            ("a", LabeledTree::Leaf(vec![1])),
            ("b", LabeledTree::Leaf(vec![2])),
            ("c", LabeledTree::Leaf(vec![3])),
        ]);
        assert_eq!(
            hash_full_tree(&tree),
            HashTree::fork(
                HashTree::fork(
                    HashTree::labeled("a", HashTree::leaf(vec![1])),
                    HashTree::labeled("b", HashTree::leaf(vec![2])),
                ),
                HashTree::labeled("c", HashTree::leaf(vec![3])),
            )
        );
        assert_eq!(
            hash_full_tree(&LabeledTree::SubTree(BTreeMap::new())),
            HashTree::Empty
        );
    }

    #[test]
    fn should_generate_distinct_keys_for_delegations() {
        let (certificate, root_key, _) = CertificateBuilder::new(CertificateData::CanisterData {
            canister_id: Principal::from_slice(&[1]),
            certified_data: vec![],
        })
        .with_delegation(CertificateBuilder::new(CertificateData::SubnetData {
            subnet_id: Principal::from_slice(&[2]),
            canister_id_ranges: vec![],
        }))
        .build();

        let delegation = certificate.delegation.expect("has a delegation");
        let published = delegation
            .certificate
            .lookup(&[b"subnet".as_slice(), &[2], b"public_key"]);
        match published {
            ic_client_certification::LookupResult::Found(der) => {
                assert_ne!(der, root_key.to_der().as_slice())
            }
            other => panic!("expected the subnet key, got {:?}", other),
        }
    }
}
