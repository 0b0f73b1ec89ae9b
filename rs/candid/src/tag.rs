use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Computes the 32-bit id of a field or option name.
///
/// `idl_hash("a") == 97`, `idl_hash("name") == 1224700491`.
pub fn idl_hash(name: &str) -> u32 {
    name.bytes()
        .fold(0u32, |h, byte| h.wrapping_mul(223).wrapping_add(byte as u32))
}

/// Identifies a record field or a variant option.
///
/// Two tags are the same tag iff their ids are equal, no matter whether they
/// were created from a name or from a number. The name, if any, is only kept
/// for display and for re-attaching names to decoded values.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Tag {
    id: u32,
    name: Option<String>,
}

impl Tag {
    pub fn from_name<S: Into<String>>(name: S) -> Self {
        let name = name.into();
        Self {
            id: idl_hash(&name),
            name: Some(name),
        }
    }

    pub fn from_id(id: u32) -> Self {
        Self { id, name: None }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Tag {}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "{}", self.id),
        }
    }
}

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        Tag::from_name(name)
    }
}

impl From<u32> for Tag {
    fn from(id: u32) -> Self {
        Tag::from_id(id)
    }
}

/// An identifier: a method name, a declared type name or a recursive id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct CandidId(String);

impl CandidId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CandidId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CandidId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
