//! Candid values.

use crate::error::{CandidError, CandidResult};
use crate::tag::Tag;
use ic_principal::Principal;
use num_bigint::{BigInt, BigUint};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};


/// The runtime kind of a value, without any nested structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Nat,
    Nat8,
    Nat16,
    Nat32,
    Nat64,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Text,
    Reserved,
    Principal,
    Vector,
    Option,
    Record,
    Variant,
    Func,
    Service,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CandidValue {
    Null,
    Bool(bool),
    Nat(BigUint),
    Nat8(u8),
    Nat16(u16),
    Nat32(u32),
    Nat64(u64),
    Int(BigInt),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Reserved,
    Principal(Principal),
    Vector(CandidVector),
    Option(Option<Box<CandidValue>>),
    Record(CandidRecord),
    Variant(CandidVariant),
    Func(FuncRef),
    Service(Principal),
}

impl CandidValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            CandidValue::Null => ValueKind::Null,
            CandidValue::Bool(_) => ValueKind::Bool,
            CandidValue::Nat(_) => ValueKind::Nat,
            CandidValue::Nat8(_) => ValueKind::Nat8,
            CandidValue::Nat16(_) => ValueKind::Nat16,
            CandidValue::Nat32(_) => ValueKind::Nat32,
            CandidValue::Nat64(_) => ValueKind::Nat64,
            CandidValue::Int(_) => ValueKind::Int,
            CandidValue::Int8(_) => ValueKind::Int8,
            CandidValue::Int16(_) => ValueKind::Int16,
            CandidValue::Int32(_) => ValueKind::Int32,
            CandidValue::Int64(_) => ValueKind::Int64,
            CandidValue::Float32(_) => ValueKind::Float32,
            CandidValue::Float64(_) => ValueKind::Float64,
            CandidValue::Text(_) => ValueKind::Text,
            CandidValue::Reserved => ValueKind::Reserved,
            CandidValue::Principal(_) => ValueKind::Principal,
            CandidValue::Vector(_) => ValueKind::Vector,
            CandidValue::Option(_) => ValueKind::Option,
            CandidValue::Record(_) => ValueKind::Record,
            CandidValue::Variant(_) => ValueKind::Variant,
            CandidValue::Func(_) => ValueKind::Func,
            CandidValue::Service(_) => ValueKind::Service,
        }
    }

    pub fn text<S: Into<String>>(text: S) -> Self {
        CandidValue::Text(text.into())
    }

    pub fn some(value: CandidValue) -> Self {
        CandidValue::Option(Some(Box::new(value)))
    }

    pub fn none() -> Self {
        CandidValue::Option(None)
    }

    pub fn blob(bytes: &[u8]) -> Self {
        CandidValue::Vector(CandidVector(
            bytes.iter().copied().map(CandidValue::Nat8).collect(),
        ))
    }

    pub fn record<T: Into<Tag>, I: IntoIterator<Item = (T, CandidValue)>>(fields: I) -> Self {
        CandidValue::Record(CandidRecord::new(fields))
    }

    pub fn variant<T: Into<Tag>>(tag: T, value: CandidValue) -> Self {
        CandidValue::Variant(CandidVariant {
            tag: tag.into(),
            value: Box::new(value),
        })
    }

    /// Builds a vector, failing if the elements are not all of one kind.
    pub fn vector(values: Vec<CandidValue>) -> CandidResult<Self> {
        CandidVector::new(values).map(CandidValue::Vector)
    }
}

impl Eq for CandidValue {}

// Floats are hashed by their bit pattern; `NaN` values therefore hash
// consistently but still compare unequal.
impl Hash for CandidValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CandidValue::Null | CandidValue::Reserved => {}
            CandidValue::Bool(b) => b.hash(state),
            CandidValue::Nat(n) => n.hash(state),
            CandidValue::Nat8(n) => n.hash(state),
            CandidValue::Nat16(n) => n.hash(state),
            CandidValue::Nat32(n) => n.hash(state),
            CandidValue::Nat64(n) => n.hash(state),
            CandidValue::Int(i) => i.hash(state),
            CandidValue::Int8(i) => i.hash(state),
            CandidValue::Int16(i) => i.hash(state),
            CandidValue::Int32(i) => i.hash(state),
            CandidValue::Int64(i) => i.hash(state),
            CandidValue::Float32(f) => f.to_bits().hash(state),
            CandidValue::Float64(f) => f.to_bits().hash(state),
            CandidValue::Text(t) => t.hash(state),
            CandidValue::Principal(p) | CandidValue::Service(p) => p.as_slice().hash(state),
            CandidValue::Vector(v) => v.hash(state),
            CandidValue::Option(o) => o.hash(state),
            CandidValue::Record(r) => r.hash(state),
            CandidValue::Variant(v) => v.hash(state),
            CandidValue::Func(f) => f.hash(state),
        }
    }
}

/// A vector whose elements all share one shape: the same [`ValueKind`] all
/// the way down, with records carrying the same field tags. Absent options
/// and empty vectors fit any content, and variants may pick different tags.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CandidVector(Vec<CandidValue>);

impl CandidVector {
    pub fn new(values: Vec<CandidValue>) -> CandidResult<Self> {
        let mut merged: Option<Shape> = None;
        for (index, value) in values.iter().enumerate() {
            let shape = Shape::of(value).and_then(|shape| match merged.take() {
                None => Ok(shape),
                Some(previous) => previous.unify(shape),
            });
            match shape {
                Ok(shape) => merged = Some(shape),
                Err((expected, found)) => {
                    return Err(CandidError::HeterogeneousVector {
                        index,
                        expected,
                        found,
                    })
                }
            }
        }
        Ok(Self(values))
    }

    pub fn values(&self) -> &[CandidValue] {
        &self.0
    }

    pub fn into_values(self) -> Vec<CandidValue> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // Decoded elements share their declared type, so no kind check is needed.
    pub(crate) fn from_decoded(values: Vec<CandidValue>) -> Self {
        Self(values)
    }
}

/// The structure of a value with the payload left out. `None` stands for
/// content not yet seen, as in an absent option or an empty vector.
enum Shape {
    Leaf(ValueKind),
    Option(Option<Box<Shape>>),
    Vector(Option<Box<Shape>>),
    Record(BTreeMap<Tag, Shape>),
    Variant(BTreeMap<Tag, Shape>),
}

type ShapeMismatch = (ValueKind, ValueKind);

impl Shape {
    fn of(value: &CandidValue) -> Result<Self, ShapeMismatch> {
        Ok(match value {
            CandidValue::Option(inner) => Shape::Option(match inner {
                Some(inner) => Some(Box::new(Shape::of(inner)?)),
                None => None,
            }),
            CandidValue::Vector(vector) => {
                let mut merged: Option<Shape> = None;
                for element in vector.values() {
                    let shape = Shape::of(element)?;
                    merged = Some(match merged.take() {
                        None => shape,
                        Some(previous) => previous.unify(shape)?,
                    });
                }
                Shape::Vector(merged.map(Box::new))
            }
            CandidValue::Record(record) => Shape::Record(
                record
                    .fields()
                    .iter()
                    .map(|(tag, value)| Ok((tag.clone(), Shape::of(value)?)))
                    .collect::<Result<_, ShapeMismatch>>()?,
            ),
            CandidValue::Variant(variant) => Shape::Variant(BTreeMap::from([(
                variant.tag.clone(),
                Shape::of(&variant.value)?,
            )])),
            other => Shape::Leaf(other.kind()),
        })
    }

    fn kind(&self) -> ValueKind {
        match self {
            Shape::Leaf(kind) => *kind,
            Shape::Option(_) => ValueKind::Option,
            Shape::Vector(_) => ValueKind::Vector,
            Shape::Record(_) => ValueKind::Record,
            Shape::Variant(_) => ValueKind::Variant,
        }
    }

    /// Merges two shapes, or returns the first pair of kinds that differ.
    fn unify(self, other: Shape) -> Result<Shape, ShapeMismatch> {
        match (self, other) {
            (Shape::Leaf(a), Shape::Leaf(b)) if a == b => Ok(Shape::Leaf(a)),
            (Shape::Option(a), Shape::Option(b)) => Ok(Shape::Option(unify_content(a, b)?)),
            (Shape::Vector(a), Shape::Vector(b)) => Ok(Shape::Vector(unify_content(a, b)?)),
            (Shape::Record(a), Shape::Record(b)) => {
                if !a.keys().eq(b.keys()) {
                    return Err((ValueKind::Record, ValueKind::Record));
                }
                let fields = a
                    .into_iter()
                    .zip(b.into_values())
                    .map(|((tag, a), b)| Ok((tag, a.unify(b)?)))
                    .collect::<Result<_, ShapeMismatch>>()?;
                Ok(Shape::Record(fields))
            }
            (Shape::Variant(mut a), Shape::Variant(b)) => {
                for (tag, shape) in b {
                    let shape = match a.remove(&tag) {
                        Some(previous) => previous.unify(shape)?,
                        None => shape,
                    };
                    a.insert(tag, shape);
                }
                Ok(Shape::Variant(a))
            }
            (a, b) => Err((a.kind(), b.kind())),
        }
    }
}

fn unify_content(
    a: Option<Box<Shape>>,
    b: Option<Box<Shape>>,
) -> Result<Option<Box<Shape>>, ShapeMismatch> {
    Ok(match (a, b) {
        (Some(a), Some(b)) => Some(Box::new(a.unify(*b)?)),
        (a, b) => a.or(b),
    })
}

/// Record fields keyed by tag. Equality, hashing and encoding follow tag id
/// order, so insertion order never matters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CandidRecord {
    fields: BTreeMap<Tag, CandidValue>,
}

impl CandidRecord {
    pub fn new<T: Into<Tag>, I: IntoIterator<Item = (T, CandidValue)>>(fields: I) -> Self {
        Self {
            fields: fields
                .into_iter()
                .map(|(tag, value)| (tag.into(), value))
                .collect(),
        }
    }

    /// Inserts a field, returning the previous value with the same tag id.
    pub fn insert<T: Into<Tag>>(&mut self, tag: T, value: CandidValue) -> Option<CandidValue> {
        self.fields.insert(tag.into(), value)
    }

    pub fn get<T: Into<Tag>>(&self, tag: T) -> Option<&CandidValue> {
        self.fields.get(&tag.into())
    }

    pub fn fields(&self) -> &BTreeMap<Tag, CandidValue> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<Tag, CandidValue> {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CandidVariant {
    pub tag: Tag,
    pub value: Box<CandidValue>,
}

/// A public method of a service.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FuncRef {
    pub service: Principal,
    pub method: String,
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for CandidValue {
                fn from(value: $ty) -> Self {
                    CandidValue::$variant(value.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    BigUint => Nat,
    u8 => Nat8,
    u16 => Nat16,
    u32 => Nat32,
    u64 => Nat64,
    BigInt => Int,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    String => Text,
    &str => Text,
    Principal => Principal,
    CandidRecord => Record,
    CandidVariant => Variant,
    CandidVector => Vector,
    FuncRef => Func,
}
