//! The Candid type model.
//!
//! Types form a tree. Recursion is expressed by marking a compound type with
//! a recursive id and referring back to it with [`CandidType::Reference`];
//! references are resolved through a [`crate::CompoundTypeTable`], never
//! through shared pointers.

use crate::tag::{CandidId, Tag};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Primitive types, i.e. those that are never stored in a type table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrimitiveType {
    Null,
    Bool,
    Nat,
    Int,
    Nat8,
    Nat16,
    Nat32,
    Nat64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Text,
    Reserved,
    Empty,
    Principal,
}

const PRIMITIVES: [PrimitiveType; 18] = [
    PrimitiveType::Null,
    PrimitiveType::Bool,
    PrimitiveType::Nat,
    PrimitiveType::Int,
    PrimitiveType::Nat8,
    PrimitiveType::Nat16,
    PrimitiveType::Nat32,
    PrimitiveType::Nat64,
    PrimitiveType::Int8,
    PrimitiveType::Int16,
    PrimitiveType::Int32,
    PrimitiveType::Int64,
    PrimitiveType::Float32,
    PrimitiveType::Float64,
    PrimitiveType::Text,
    PrimitiveType::Reserved,
    PrimitiveType::Empty,
    PrimitiveType::Principal,
];

impl PrimitiveType {
    /// The (negative) opcode used to reference this type on the wire.
    pub fn opcode(self) -> i64 {
        match self {
            PrimitiveType::Null => -1,
            PrimitiveType::Bool => -2,
            PrimitiveType::Nat => -3,
            PrimitiveType::Int => -4,
            PrimitiveType::Nat8 => -5,
            PrimitiveType::Nat16 => -6,
            PrimitiveType::Nat32 => -7,
            PrimitiveType::Nat64 => -8,
            PrimitiveType::Int8 => -9,
            PrimitiveType::Int16 => -10,
            PrimitiveType::Int32 => -11,
            PrimitiveType::Int64 => -12,
            PrimitiveType::Float32 => -13,
            PrimitiveType::Float64 => -14,
            PrimitiveType::Text => -15,
            PrimitiveType::Reserved => -16,
            PrimitiveType::Empty => -17,
            PrimitiveType::Principal => -24,
        }
    }

    pub fn from_opcode(opcode: i64) -> Option<Self> {
        PRIMITIVES.iter().copied().find(|p| p.opcode() == opcode)
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Null => "null",
            PrimitiveType::Bool => "bool",
            PrimitiveType::Nat => "nat",
            PrimitiveType::Int => "int",
            PrimitiveType::Nat8 => "nat8",
            PrimitiveType::Nat16 => "nat16",
            PrimitiveType::Nat32 => "nat32",
            PrimitiveType::Nat64 => "nat64",
            PrimitiveType::Int8 => "int8",
            PrimitiveType::Int16 => "int16",
            PrimitiveType::Int32 => "int32",
            PrimitiveType::Int64 => "int64",
            PrimitiveType::Float32 => "float32",
            PrimitiveType::Float64 => "float64",
            PrimitiveType::Text => "text",
            PrimitiveType::Reserved => "reserved",
            PrimitiveType::Empty => "empty",
            PrimitiveType::Principal => "principal",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        PRIMITIVES.iter().copied().find(|p| p.name() == name)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) const OPCODE_OPT: i64 = -18;
pub(crate) const OPCODE_VEC: i64 = -19;
pub(crate) const OPCODE_RECORD: i64 = -20;
pub(crate) const OPCODE_VARIANT: i64 = -21;
pub(crate) const OPCODE_FUNC: i64 = -22;
pub(crate) const OPCODE_SERVICE: i64 = -23;

/// Annotations on a function type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FuncMode {
    Query,
    Oneway,
    CompositeQuery,
}

impl FuncMode {
    pub fn code(self) -> u8 {
        match self {
            FuncMode::Query => 1,
            FuncMode::Oneway => 2,
            FuncMode::CompositeQuery => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(FuncMode::Query),
            2 => Some(FuncMode::Oneway),
            3 => Some(FuncMode::CompositeQuery),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FuncMode::Query => "query",
            FuncMode::Oneway => "oneway",
            FuncMode::CompositeQuery => "composite_query",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [FuncMode::Query, FuncMode::Oneway, FuncMode::CompositeQuery]
            .into_iter()
            .find(|mode| mode.name() == name)
    }
}

/// An argument or result of a function type. The name is documentation only
/// and is not part of the wire encoding.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FuncArg {
    pub name: Option<CandidId>,
    pub ty: CandidType,
}

impl FuncArg {
    pub fn unnamed(ty: CandidType) -> Self {
        Self { name: None, ty }
    }

    pub fn named<I: Into<CandidId>>(name: I, ty: CandidType) -> Self {
        Self {
            name: Some(name.into()),
            ty,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FuncType {
    pub modes: BTreeSet<FuncMode>,
    pub args: Vec<FuncArg>,
    pub rets: Vec<FuncArg>,
}

impl FuncType {
    pub fn new(args: Vec<CandidType>, rets: Vec<CandidType>) -> Self {
        Self {
            modes: BTreeSet::new(),
            args: args.into_iter().map(FuncArg::unnamed).collect(),
            rets: rets.into_iter().map(FuncArg::unnamed).collect(),
        }
    }

    pub fn with_mode(mut self, mode: FuncMode) -> Self {
        self.modes.insert(mode);
        self
    }
}

/// Methods of a service, ordered by name as on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ServiceType {
    pub methods: BTreeMap<CandidId, FuncType>,
}

impl ServiceType {
    pub fn new<I: IntoIterator<Item = (CandidId, FuncType)>>(methods: I) -> Self {
        Self {
            methods: methods.into_iter().collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CompoundKind {
    Vector(Box<CandidType>),
    Option(Box<CandidType>),
    Record(BTreeMap<Tag, CandidType>),
    Variant(BTreeMap<Tag, CandidType>),
    Func(FuncType),
    Service(ServiceType),
}

impl CompoundKind {
    pub fn opcode(&self) -> i64 {
        match self {
            CompoundKind::Vector(_) => OPCODE_VEC,
            CompoundKind::Option(_) => OPCODE_OPT,
            CompoundKind::Record(_) => OPCODE_RECORD,
            CompoundKind::Variant(_) => OPCODE_VARIANT,
            CompoundKind::Func(_) => OPCODE_FUNC,
            CompoundKind::Service(_) => OPCODE_SERVICE,
        }
    }

    /// The types directly nested in this one. Service methods are yielded
    /// by their argument and result types.
    pub fn inner_types(&self) -> Vec<&CandidType> {
        fn func_types(func: &FuncType) -> impl Iterator<Item = &CandidType> {
            func.args.iter().chain(func.rets.iter()).map(|arg| &arg.ty)
        }
        match self {
            CompoundKind::Vector(inner) | CompoundKind::Option(inner) => vec![inner.as_ref()],
            CompoundKind::Record(fields) | CompoundKind::Variant(fields) => {
                fields.values().collect()
            }
            CompoundKind::Func(func) => func_types(func).collect(),
            CompoundKind::Service(service) => service
                .methods
                .values()
                .flat_map(|func| func_types(func))
                .collect(),
        }
    }
}

/// A type that is stored in the type table and referenced by index.
///
/// Equality is structural and includes the recursive id, so two otherwise
/// identical types that bind different ids are different table entries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompoundType {
    pub kind: CompoundKind,
    pub recursive_id: Option<CandidId>,
}

impl CompoundType {
    pub fn new(kind: CompoundKind) -> Self {
        Self {
            kind,
            recursive_id: None,
        }
    }

    pub fn with_recursive_id<I: Into<CandidId>>(mut self, id: I) -> Self {
        self.recursive_id = Some(id.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CandidType {
    Primitive(PrimitiveType),
    Compound(CompoundType),
    /// Refers to the enclosing compound type whose recursive id is `id`.
    Reference(CandidId),
}

impl CandidType {
    pub fn vector(inner: CandidType) -> Self {
        CompoundKind::Vector(Box::new(inner)).into()
    }

    pub fn opt(inner: CandidType) -> Self {
        CompoundKind::Option(Box::new(inner)).into()
    }

    pub fn record<T: Into<Tag>, I: IntoIterator<Item = (T, CandidType)>>(fields: I) -> Self {
        CompoundKind::Record(
            fields
                .into_iter()
                .map(|(tag, ty)| (tag.into(), ty))
                .collect(),
        )
        .into()
    }

    pub fn variant<T: Into<Tag>, I: IntoIterator<Item = (T, CandidType)>>(options: I) -> Self {
        CompoundKind::Variant(
            options
                .into_iter()
                .map(|(tag, ty)| (tag.into(), ty))
                .collect(),
        )
        .into()
    }

    /// A record whose fields are tagged `0..n` in order.
    pub fn tuple<I: IntoIterator<Item = CandidType>>(elements: I) -> Self {
        Self::record(
            elements
                .into_iter()
                .enumerate()
                .map(|(index, ty)| (Tag::from_id(index as u32), ty)),
        )
    }

    /// `vec nat8`.
    pub fn blob() -> Self {
        Self::vector(CandidType::Primitive(PrimitiveType::Nat8))
    }

    pub fn func(func: FuncType) -> Self {
        CompoundKind::Func(func).into()
    }

    pub fn service(service: ServiceType) -> Self {
        CompoundKind::Service(service).into()
    }

    pub fn reference<I: Into<CandidId>>(id: I) -> Self {
        CandidType::Reference(id.into())
    }

    /// Marks this type as the binding site of `id`. Has no effect on
    /// primitives and references, which cannot be recursion targets.
    pub fn with_recursive_id<I: Into<CandidId>>(self, id: I) -> Self {
        match self {
            CandidType::Compound(compound) => CandidType::Compound(compound.with_recursive_id(id)),
            other => other,
        }
    }
}

impl From<PrimitiveType> for CandidType {
    fn from(primitive: PrimitiveType) -> Self {
        CandidType::Primitive(primitive)
    }
}

impl From<CompoundKind> for CandidType {
    fn from(kind: CompoundKind) -> Self {
        CandidType::Compound(CompoundType::new(kind))
    }
}

fn write_fields(
    f: &mut fmt::Formatter<'_>,
    keyword: &str,
    fields: &BTreeMap<Tag, CandidType>,
) -> fmt::Result {
    write!(f, "{} {{", keyword)?;
    for (tag, ty) in fields {
        write!(f, " {} : {};", tag, ty)?;
    }
    f.write_str(" }")
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[FuncArg]) -> fmt::Result {
    f.write_str("(")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        if let Some(name) = &arg.name {
            write!(f, "{} : ", name)?;
        }
        write!(f, "{}", arg.ty)?;
    }
    f.write_str(")")
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_args(f, &self.args)?;
        f.write_str(" -> ")?;
        write_args(f, &self.rets)?;
        for mode in &self.modes {
            write!(f, " {}", mode.name())?;
        }
        Ok(())
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (name, func) in &self.methods {
            write!(f, " {} : {};", name, func)?;
        }
        f.write_str(" }")
    }
}

impl fmt::Display for CompoundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(id) = &self.recursive_id {
            write!(f, "μ{}.", id)?;
        }
        match &self.kind {
            CompoundKind::Vector(inner) => write!(f, "vec {}", inner),
            CompoundKind::Option(inner) => write!(f, "opt {}", inner),
            CompoundKind::Record(fields) => write_fields(f, "record", fields),
            CompoundKind::Variant(options) => write_fields(f, "variant", options),
            CompoundKind::Func(func) => write!(f, "func {}", func),
            CompoundKind::Service(service) => write!(f, "service {}", service),
        }
    }
}

impl fmt::Display for CandidType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidType::Primitive(primitive) => write!(f, "{}", primitive),
            CandidType::Compound(compound) => write!(f, "{}", compound),
            CandidType::Reference(id) => write!(f, "{}", id),
        }
    }
}
