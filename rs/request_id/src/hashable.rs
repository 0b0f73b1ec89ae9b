//! Representation-independent hashing.
//!
//! A request is hashed as a map from field names to structured values. The
//! digest of a map does not depend on the order in which its fields were
//! inserted, while the digest of an array does depend on element order.

use indexmap::IndexMap;
use sha2::Digest;
use std::cmp::Ordering;

#[cfg(test)]
mod tests;

/// A hash function used to compute representation-independent digests.
pub trait HashFunction {
    fn digest(&self, bytes: &[u8]) -> Vec<u8>;
}

/// SHA-256, the hash function the network uses for request ids.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256;

impl HashFunction for Sha256 {
    fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        sha2::Sha256::digest(bytes).to_vec()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Hashable {
    /// Hashed as its UTF-8 bytes.
    String(String),
    Bytes(Vec<u8>),
    /// Hashed as its unsigned LEB128 encoding.
    U64(u64),
    /// Hashed as the concatenation of the element digests, in order.
    Array(Vec<Hashable>),
    Object(HashableObject),
}

impl Hashable {
    pub fn array<T: Into<Hashable>, I: IntoIterator<Item = T>>(elements: I) -> Self {
        Hashable::Array(elements.into_iter().map(Into::into).collect())
    }

    pub fn compute_hash<H: HashFunction + ?Sized>(&self, hash_function: &H) -> Vec<u8> {
        match self {
            Hashable::String(string) => hash_function.digest(string.as_bytes()),
            Hashable::Bytes(bytes) => hash_function.digest(bytes),
            Hashable::U64(integer) => hash_function.digest(&encode_u64(*integer)),
            Hashable::Array(elements) => {
                let concatenated: Vec<u8> = elements
                    .iter()
                    .flat_map(|element| element.compute_hash(hash_function))
                    .collect();
                hash_function.digest(&concatenated)
            }
            Hashable::Object(object) => object.compute_hash(hash_function),
        }
    }
}

fn encode_u64(value: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(10);
    leb128::write::unsigned(&mut buf, value).expect("writing to a Vec cannot fail");
    buf
}

/// A map from field names to values. Fields set to `None` are left out of
/// the digest, as if they were never inserted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HashableObject {
    properties: IndexMap<String, Option<Hashable>>,
}

impl HashableObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K: Into<String>, V: Into<Hashable>>(&mut self, key: K, value: V) -> &mut Self {
        self.properties.insert(key.into(), Some(value.into()));
        self
    }

    pub fn insert_optional<K: Into<String>, V: Into<Hashable>>(
        &mut self,
        key: K,
        value: Option<V>,
    ) -> &mut Self {
        self.properties.insert(key.into(), value.map(Into::into));
        self
    }

    pub fn with<K: Into<String>, V: Into<Hashable>>(mut self, key: K, value: V) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Hashable> {
        self.properties.get(key).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.properties.values().filter(|value| value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hashes every (key, value) pair, sorts the pairs by key digest and
    /// hashes the concatenation of `H(key) || H(value)` over all pairs.
    pub fn compute_hash<H: HashFunction + ?Sized>(&self, hash_function: &H) -> Vec<u8> {
        let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = self
            .properties
            .iter()
            .filter_map(|(key, value)| {
                let value = value.as_ref()?;
                Some((
                    hash_function.digest(key.as_bytes()),
                    value.compute_hash(hash_function),
                ))
            })
            .collect();
        pairs.sort_by(|(left, _), (right, _)| compare_digests(left, right));

        let mut concatenated = Vec::with_capacity(pairs.len() * 64);
        for (key_digest, value_digest) in pairs {
            concatenated.extend_from_slice(&key_digest);
            concatenated.extend_from_slice(&value_digest);
        }
        hash_function.digest(&concatenated)
    }
}

// Shorter digests first, then bytewise.
fn compare_digests(left: &[u8], right: &[u8]) -> Ordering {
    left.len()
        .cmp(&right.len())
        .then_with(|| left.cmp(right))
}

impl From<&str> for Hashable {
    fn from(value: &str) -> Self {
        Hashable::String(value.to_string())
    }
}

impl From<String> for Hashable {
    fn from(value: String) -> Self {
        Hashable::String(value)
    }
}

impl From<Vec<u8>> for Hashable {
    fn from(value: Vec<u8>) -> Self {
        Hashable::Bytes(value)
    }
}

impl From<&[u8]> for Hashable {
    fn from(value: &[u8]) -> Self {
        Hashable::Bytes(value.to_vec())
    }
}

impl From<u64> for Hashable {
    fn from(value: u64) -> Self {
        Hashable::U64(value)
    }
}

impl From<ic_principal::Principal> for Hashable {
    fn from(value: ic_principal::Principal) -> Self {
        Hashable::Bytes(value.as_slice().to_vec())
    }
}

impl From<HashableObject> for Hashable {
    fn from(value: HashableObject) -> Self {
        Hashable::Object(value)
    }
}
