//! Partially revealed Merkle trees over the certified state.
//!
//! A [`HashTree`] is what the network returns alongside a certificate: the
//! labeled subtrees the client asked for, with everything else replaced by
//! `Pruned` digests. Its root digest is recomputed bottom-up with
//! domain-separated SHA-256 and compared against the certificate signature.

use crate::error::CertificateError;
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use serde_cbor::Value;
use sha2::{Digest as _, Sha256};
use std::cmp::Ordering;
use std::fmt;


const DOMAIN_HASHTREE_LEAF: &str = "ic-hashtree-leaf";
const DOMAIN_HASHTREE_EMPTY_SUBTREE: &str = "ic-hashtree-empty";
const DOMAIN_HASHTREE_NODE: &str = "ic-hashtree-labeled";
const DOMAIN_HASHTREE_FORK: &str = "ic-hashtree-fork";

const EMPTY_TAG: u8 = 0;
const FORK_TAG: u8 = 1;
const LABELED_TAG: u8 = 2;
const LEAF_TAG: u8 = 3;
const PRUNED_TAG: u8 = 4;

/// SHA-256 that absorbs a length-prefixed domain separator first.
struct Hasher(Sha256);

impl Hasher {
    fn for_domain(domain: &str) -> Self {
        let mut state = Sha256::new();
        state.update([domain.len() as u8]);
        state.update(domain.as_bytes());
        Hasher(state)
    }

    fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finalize(self) -> Digest {
        Digest(self.0.finalize().into())
    }
}

// Helpers for creation of domain-separated hashers.
fn new_leaf_hasher() -> Hasher {
    Hasher::for_domain(DOMAIN_HASHTREE_LEAF)
}

fn new_fork_hasher() -> Hasher {
    Hasher::for_domain(DOMAIN_HASHTREE_FORK)
}

fn new_node_hasher() -> Hasher {
    Hasher::for_domain(DOMAIN_HASHTREE_NODE)
}

pub(crate) fn empty_subtree_hash() -> Digest {
    Hasher::for_domain(DOMAIN_HASHTREE_EMPTY_SUBTREE).finalize()
}

pub(crate) fn compute_leaf_digest(contents: &[u8]) -> Digest {
    let mut hasher = new_leaf_hasher();
    hasher.update(contents);
    hasher.finalize()
}

pub(crate) fn compute_node_digest(label: &Label, subtree_digest: &Digest) -> Digest {
    let mut hasher = new_node_hasher();
    hasher.update(label.as_bytes());
    hasher.update(&subtree_digest.0);
    hasher.finalize()
}

pub(crate) fn compute_fork_digest(left_digest: &Digest, right_digest: &Digest) -> Digest {
    let mut hasher = new_fork_hasher();
    hasher.update(&left_digest.0);
    hasher.update(&right_digest.0);
    hasher.finalize()
}

/// A SHA-256 digest.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Digest(bytes)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A label of an edge in the tree. Labels compare bytewise.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Label(Vec<u8>);

impl Label {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Label {
    fn from(bytes: Vec<u8>) -> Label {
        Label(bytes)
    }
}

impl From<&[u8]> for Label {
    fn from(bytes: &[u8]) -> Label {
        Label(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Label {
    fn from(bytes: &[u8; N]) -> Label {
        Label(bytes.to_vec())
    }
}

impl From<&str> for Label {
    fn from(text: &str) -> Label {
        Label(text.as_bytes().to_vec())
    }
}

impl From<String> for Label {
    fn from(text: String) -> Label {
        Label(text.into_bytes())
    }
}

impl AsRef<[u8]> for Label {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// Printable labels are shown as text, everything else (ids, hashes) as hex.
impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let printable = !self.0.is_empty()
            && self
                .0
                .iter()
                .all(|b| b.is_ascii_graphic() || *b == b' ');
        match std::str::from_utf8(&self.0) {
            Ok(text) if printable => write!(f, "{}", text),
            _ => write!(f, "0x{}", hex::encode(&self.0)),
        }
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A hash tree with some subtrees revealed and others pruned.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum HashTree {
    /// No content.
    Empty,
    /// Two subtrees, left and right.
    Fork(Box<(HashTree, HashTree)>),
    /// A labeled edge to a subtree.
    Labeled(Label, Box<HashTree>),
    /// Raw data.
    Leaf(Vec<u8>),
    /// A subtree that was removed, represented by its digest.
    Pruned(Digest),
}

/// The outcome of looking up a path in a [`HashTree`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LookupResult<'a> {
    /// The path leads to this leaf.
    Found(&'a [u8]),
    /// The tree proves that nothing exists at the path.
    Absent,
    /// The path may exist but was pruned away.
    Unknown,
    /// The path leads to a fork or labeled node, not a value.
    Error,
}

enum LabelSearch<'a> {
    Found(&'a HashTree),
    Absent,
    Unknown,
}

impl HashTree {
    pub fn fork(left: HashTree, right: HashTree) -> HashTree {
        HashTree::Fork(Box::new((left, right)))
    }

    pub fn labeled<L: Into<Label>>(label: L, subtree: HashTree) -> HashTree {
        HashTree::Labeled(label.into(), Box::new(subtree))
    }

    pub fn leaf<B: Into<Vec<u8>>>(contents: B) -> HashTree {
        HashTree::Leaf(contents.into())
    }

    pub fn pruned<D: Into<Digest>>(digest: D) -> HashTree {
        HashTree::Pruned(digest.into())
    }

    /// Recomputes the root digest. Pruned subtrees contribute their digest
    /// as is.
    pub fn digest(&self) -> Digest {
        match self {
            HashTree::Empty => empty_subtree_hash(),
            HashTree::Fork(lr) => compute_fork_digest(&lr.0.digest(), &lr.1.digest()),
            HashTree::Labeled(label, subtree) => compute_node_digest(label, &subtree.digest()),
            HashTree::Leaf(contents) => compute_leaf_digest(contents),
            HashTree::Pruned(digest) => *digest,
        }
    }

    /// Looks up `path`, a sequence of labels, from the root.
    ///
    /// Forks are transparent: the labeled children of nested forks are
    /// searched as one sorted list. A label is `Absent` only when the tree
    /// proves it, i.e. its neighbors in that list are revealed labels that
    /// sort around it.
    pub fn lookup_path<L: AsRef<[u8]>>(&self, path: &[L]) -> LookupResult<'_> {
        let mut tree = self;
        for label in path {
            match tree.find_label(label.as_ref()) {
                LabelSearch::Found(subtree) => tree = subtree,
                LabelSearch::Absent => return LookupResult::Absent,
                LabelSearch::Unknown => return LookupResult::Unknown,
            }
        }
        match tree {
            HashTree::Empty => LookupResult::Absent,
            HashTree::Leaf(contents) => LookupResult::Found(contents),
            HashTree::Pruned(_) => LookupResult::Unknown,
            HashTree::Fork(_) | HashTree::Labeled(_, _) => LookupResult::Error,
        }
    }

    fn find_label(&self, label: &[u8]) -> LabelSearch<'_> {
        // True while everything between the previous revealed label and the
        // current position is known to be smaller than `label`.
        let mut gap_is_proven = true;
        for node in self.flatten_forks() {
            match node {
                HashTree::Labeled(l, subtree) => match label.cmp(l.as_bytes()) {
                    Ordering::Equal => return LabelSearch::Found(subtree),
                    Ordering::Less if gap_is_proven => return LabelSearch::Absent,
                    Ordering::Less => return LabelSearch::Unknown,
                    Ordering::Greater => gap_is_proven = true,
                },
                _ => gap_is_proven = false,
            }
        }
        if gap_is_proven {
            LabelSearch::Absent
        } else {
            LabelSearch::Unknown
        }
    }

    /// The non-fork nodes below nested forks, left to right, without
    /// `Empty` nodes.
    fn flatten_forks(&self) -> Vec<&HashTree> {
        let mut nodes = Vec::new();
        let mut stack = vec![self];
        while let Some(tree) = stack.pop() {
            match tree {
                HashTree::Fork(lr) => {
                    stack.push(&lr.1);
                    stack.push(&lr.0);
                }
                HashTree::Empty => (),
                other => nodes.push(other),
            }
        }
        nodes
    }

    /// Decodes a tree from its CBOR value, rejecting trees nested deeper
    /// than `max_depth`.
    pub fn from_cbor_value(value: &Value, max_depth: usize) -> Result<HashTree, CertificateError> {
        decode_node(value, max_depth)
    }

    pub fn to_cbor_value(&self) -> Value {
        match self {
            HashTree::Empty => Value::Array(vec![Value::Integer(EMPTY_TAG.into())]),
            HashTree::Fork(lr) => Value::Array(vec![
                Value::Integer(FORK_TAG.into()),
                lr.0.to_cbor_value(),
                lr.1.to_cbor_value(),
            ]),
            HashTree::Labeled(label, subtree) => Value::Array(vec![
                Value::Integer(LABELED_TAG.into()),
                Value::Bytes(label.as_bytes().to_vec()),
                subtree.to_cbor_value(),
            ]),
            HashTree::Leaf(contents) => {
                Value::Array(vec![Value::Integer(LEAF_TAG.into()), Value::Bytes(contents.clone())])
            }
            HashTree::Pruned(digest) => {
                Value::Array(vec![Value::Integer(PRUNED_TAG.into()), Value::Bytes(digest.to_vec())])
            }
        }
    }
}

fn malformed(reason: impl Into<String>) -> CertificateError {
    CertificateError::MalformedCertificate(reason.into())
}

fn decode_node(value: &Value, remaining_depth: usize) -> Result<HashTree, CertificateError> {
    let remaining_depth = remaining_depth
        .checked_sub(1)
        .ok_or_else(|| malformed("hash tree is nested too deeply"))?;
    let items = match value {
        Value::Array(items) => items,
        other => return Err(malformed(format!("expected a hash tree node, got {:?}", other))),
    };
    let tag = match items.first() {
        Some(Value::Integer(tag)) => u8::try_from(*tag)
            .ok()
            .filter(|tag| *tag <= PRUNED_TAG)
            .ok_or(CertificateError::UnsupportedHashTreeNodeType(*tag))?,
        Some(other) => {
            return Err(malformed(format!(
                "expected a hash tree node type, got {:?}",
                other
            )))
        }
        None => return Err(malformed("empty hash tree node")),
    };
    let expected_len = match tag {
        EMPTY_TAG => 1,
        LEAF_TAG | PRUNED_TAG => 2,
        _ => 3,
    };
    if items.len() != expected_len {
        return Err(malformed(format!(
            "invalid length {} for hash tree node type {}, expected {}",
            items.len(),
            tag,
            expected_len
        )));
    }
    match tag {
        EMPTY_TAG => Ok(HashTree::Empty),
        FORK_TAG => Ok(HashTree::fork(
            decode_node(&items[1], remaining_depth)?,
            decode_node(&items[2], remaining_depth)?,
        )),
        LABELED_TAG => Ok(HashTree::labeled(
            bytes(&items[1], "label")?.to_vec(),
            decode_node(&items[2], remaining_depth)?,
        )),
        LEAF_TAG => Ok(HashTree::leaf(bytes(&items[1], "leaf")?.to_vec())),
        _ => {
            let digest: [u8; 32] = bytes(&items[1], "pruned digest")?
                .try_into()
                .map_err(|_| malformed("pruned digest must be 32 bytes long"))?;
            Ok(HashTree::pruned(digest))
        }
    }
}

fn bytes<'a>(value: &'a Value, what: &str) -> Result<&'a [u8], CertificateError> {
    match value {
        Value::Bytes(bytes) => Ok(bytes),
        other => Err(malformed(format!(
            "expected {} as a byte string, got {:?}",
            what, other
        ))),
    }
}

impl Serialize for HashTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            HashTree::Empty => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(&EMPTY_TAG)?;
                seq.end()
            }
            HashTree::Fork(lr) => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(&FORK_TAG)?;
                seq.serialize_element(&lr.0)?;
                seq.serialize_element(&lr.1)?;
                seq.end()
            }
            HashTree::Labeled(label, subtree) => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(&LABELED_TAG)?;
                seq.serialize_element(serde_bytes::Bytes::new(label.as_bytes()))?;
                seq.serialize_element(subtree)?;
                seq.end()
            }
            HashTree::Leaf(contents) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&LEAF_TAG)?;
                seq.serialize_element(serde_bytes::Bytes::new(contents))?;
                seq.end()
            }
            HashTree::Pruned(digest) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&PRUNED_TAG)?;
                seq.serialize_element(serde_bytes::Bytes::new(digest.as_bytes()))?;
                seq.end()
            }
        }
    }
}
