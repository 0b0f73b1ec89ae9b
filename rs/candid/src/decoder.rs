//! Deserialization of `DIDL` payloads.
//!
//! Decoding runs in three steps. The type table is read into a flat list of
//! wire entries that refer to each other by index. Argument types are then
//! rebuilt from those entries: every cycle in the table becomes a compound
//! type with a generated recursive id `rec_<index>` and references to it.
//! Finally the values are read, driven directly by the wire entries.

use crate::config::CandidConfig;
use crate::encoder::MAGIC_NUMBER;
use crate::error::{CandidError, CandidResult, TypeReference};
use crate::tag::{CandidId, Tag};
use crate::type_table::CompoundTypeTable;
use crate::types::{
    CandidType, CompoundKind, CompoundType, FuncArg, FuncMode, FuncType, PrimitiveType,
    ServiceType, OPCODE_FUNC, OPCODE_OPT, OPCODE_RECORD, OPCODE_SERVICE, OPCODE_VARIANT,
    OPCODE_VEC,
};
use crate::value::{CandidRecord, CandidValue, CandidVariant, CandidVector, FuncRef};
use crate::varint::{read_i64, read_len, read_signed, read_u64, read_unsigned};
use ic_principal::Principal;
use num_bigint::BigInt;
use slog::{debug, o, Logger};
use std::collections::{BTreeMap, BTreeSet, HashMap};


/// Decodes `bytes` with the default configuration.
pub fn decode_args(bytes: &[u8]) -> CandidResult<Vec<(CandidValue, CandidType)>> {
    ArgDecoder::new(&CandidConfig::default()).decode(bytes)
}

pub struct ArgDecoder<'a> {
    config: &'a CandidConfig,
    log: Logger,
}

impl<'a> ArgDecoder<'a> {
    pub fn new(config: &'a CandidConfig) -> Self {
        Self {
            config,
            log: Logger::root(slog::Discard, o!()),
        }
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    /// Decodes every argument in `bytes` together with its type, as
    /// described by the payload's own type table.
    pub fn decode(&self, bytes: &[u8]) -> CandidResult<Vec<(CandidValue, CandidType)>> {
        let log = self.log.new(o!("operation" => "decode"));
        debug!(log, "start"; "len" => bytes.len());
        let result = self.decode_impl(bytes);
        debug!(log, "end"; "is_ok" => result.is_ok());
        if let Err(err) = &result {
            debug!(log, "payload rejected: {}", err);
        }
        result
    }

    /// Decodes `bytes` and checks the values against `expected`.
    ///
    /// Record fields and variant options absent from the expected types are
    /// rejected, field names from `expected` are attached to the decoded
    /// tags, and absent `opt`, `null` and `reserved` fields or trailing
    /// arguments are filled in. Extra trailing arguments are ignored.
    pub fn decode_with_types(
        &self,
        bytes: &[u8],
        expected: &[CandidType],
    ) -> CandidResult<Vec<CandidValue>> {
        let log = self.log.new(o!("operation" => "decode_with_types"));
        debug!(log, "start"; "len" => bytes.len(), "expected_args" => expected.len());
        let result = self.decode_impl(bytes).and_then(|decoded| {
            let checker = TypeChecker {
                table: CompoundTypeTable::from_types(expected),
            };
            let mut values = decoded.into_iter().map(|(value, _)| value);
            expected
                .iter()
                .map(|ty| match values.next() {
                    Some(value) => checker.check(value, ty),
                    None => checker.absent(ty, "argument"),
                })
                .collect()
        });
        debug!(log, "end"; "is_ok" => result.is_ok());
        if let Err(err) = &result {
            debug!(log, "payload rejected: {}", err);
        }
        result
    }

    fn decode_impl(&self, bytes: &[u8]) -> CandidResult<Vec<(CandidValue, CandidType)>> {
        if bytes.len() < MAGIC_NUMBER.len() || &bytes[..MAGIC_NUMBER.len()] != MAGIC_NUMBER {
            return Err(CandidError::InvalidMagicNumber {
                found: bytes[..bytes.len().min(MAGIC_NUMBER.len())].to_vec(),
            });
        }
        let mut input = &bytes[MAGIC_NUMBER.len()..];

        let table = WireTable::read(&mut input, self.config)?;

        let arg_count = read_len(&mut input)?;
        check_limit("argument count", arg_count, self.config.max_args)?;
        let mut refs = Vec::with_capacity(arg_count);
        for _ in 0..arg_count {
            let type_ref = read_i64(&mut input)?;
            table.check_ref(type_ref)?;
            refs.push(type_ref);
        }

        let mut builder = TypeBuilder::new(
            &table,
            self.config.max_type_expansion,
            self.config.max_type_depth,
        );
        let types = refs
            .iter()
            .map(|type_ref| builder.build(*type_ref).map(|(ty, _)| ty))
            .collect::<CandidResult<Vec<_>>>()?;

        let mut reader = ValueReader {
            table: &table,
            config: self.config,
            input,
            values_left: self.config.max_value_count,
        };
        let values = refs
            .iter()
            .map(|type_ref| reader.read(*type_ref, 0))
            .collect::<CandidResult<Vec<_>>>()?;
        if !reader.input.is_empty() {
            return Err(CandidError::TrailingBytes {
                count: reader.input.len(),
            });
        }
        Ok(values.into_iter().zip(types).collect())
    }
}

fn check_limit(limit: &'static str, value: usize, max: usize) -> CandidResult<()> {
    if value > max {
        return Err(CandidError::LimitExceeded {
            limit,
            value: value as u64,
            max: max as u64,
        });
    }
    Ok(())
}

fn malformed<S: Into<String>>(reason: S) -> CandidError {
    CandidError::MalformedTypeTable {
        reason: reason.into(),
    }
}

fn take<'b>(input: &mut &'b [u8], needed: usize) -> CandidResult<&'b [u8]> {
    if input.len() < needed {
        return Err(CandidError::UnexpectedEndOfInput {
            needed,
            remaining: input.len(),
        });
    }
    let (head, rest) = input.split_at(needed);
    *input = rest;
    Ok(head)
}

fn take_array<const N: usize>(input: &mut &[u8]) -> CandidResult<[u8; N]> {
    let mut array = [0u8; N];
    array.copy_from_slice(take(input, N)?);
    Ok(array)
}

fn read_byte(input: &mut &[u8]) -> CandidResult<u8> {
    Ok(take(input, 1)?[0])
}

fn read_text(input: &mut &[u8]) -> CandidResult<String> {
    let len = read_len(input)?;
    let bytes = take(input, len)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| CandidError::InvalidUtf8)
}

/// A type table entry as it appears on the wire.
#[derive(Debug)]
enum WireEntry {
    Vector(i64),
    Option(i64),
    Record(Vec<(u32, i64)>),
    Variant(Vec<(u32, i64)>),
    Func {
        args: Vec<i64>,
        rets: Vec<i64>,
        modes: BTreeSet<FuncMode>,
    },
    Service(Vec<(String, i64)>),
}

impl WireEntry {
    fn refs(&self) -> Vec<i64> {
        match self {
            WireEntry::Vector(inner) | WireEntry::Option(inner) => vec![*inner],
            WireEntry::Record(fields) | WireEntry::Variant(fields) => {
                fields.iter().map(|(_, type_ref)| *type_ref).collect()
            }
            WireEntry::Func { args, rets, .. } => args.iter().chain(rets.iter()).copied().collect(),
            WireEntry::Service(methods) => methods.iter().map(|(_, type_ref)| *type_ref).collect(),
        }
    }
}

struct WireTable {
    entries: Vec<WireEntry>,
}

impl WireTable {
    fn read(input: &mut &[u8], config: &CandidConfig) -> CandidResult<Self> {
        let len = read_len(input)?;
        check_limit("type table length", len, config.max_type_table_len)?;
        let mut entries = Vec::with_capacity(len);
        for _ in 0..len {
            entries.push(Self::read_entry(input)?);
        }
        let table = Self { entries };
        for entry in &table.entries {
            for type_ref in entry.refs() {
                table.check_ref(type_ref)?;
            }
            if let WireEntry::Service(methods) = entry {
                for (name, type_ref) in methods {
                    if !matches!(table.entry(*type_ref), Some(WireEntry::Func { .. })) {
                        return Err(malformed(format!(
                            "service method '{}' does not refer to a function type",
                            name
                        )));
                    }
                }
            }
        }
        Ok(table)
    }

    fn read_entry(input: &mut &[u8]) -> CandidResult<WireEntry> {
        let opcode = read_i64(input)?;
        match opcode {
            OPCODE_VEC => Ok(WireEntry::Vector(read_i64(input)?)),
            OPCODE_OPT => Ok(WireEntry::Option(read_i64(input)?)),
            OPCODE_RECORD => Ok(WireEntry::Record(Self::read_fields(input)?)),
            OPCODE_VARIANT => Ok(WireEntry::Variant(Self::read_fields(input)?)),
            OPCODE_FUNC => {
                let args = Self::read_refs(input)?;
                let rets = Self::read_refs(input)?;
                let mode_count = read_len(input)?;
                let mut modes = BTreeSet::new();
                for _ in 0..mode_count {
                    let code = read_byte(input)?;
                    let mode = FuncMode::from_code(code)
                        .ok_or_else(|| malformed(format!("unknown function mode {}", code)))?;
                    modes.insert(mode);
                }
                Ok(WireEntry::Func { args, rets, modes })
            }
            OPCODE_SERVICE => {
                let count = read_len(input)?;
                let mut methods: Vec<(String, i64)> = Vec::new();
                for _ in 0..count {
                    let name = read_text(input)?;
                    if let Some((previous, _)) = methods.last() {
                        if *previous >= name {
                            return Err(malformed(format!(
                                "service methods out of order: '{}' after '{}'",
                                name, previous
                            )));
                        }
                    }
                    methods.push((name, read_i64(input)?));
                }
                Ok(WireEntry::Service(methods))
            }
            opcode => match PrimitiveType::from_opcode(opcode) {
                Some(primitive) => Err(malformed(format!(
                    "primitive type {} stored in the type table",
                    primitive
                ))),
                None if opcode >= 0 => Err(malformed(format!(
                    "type table entry starts with index {} instead of an opcode",
                    opcode
                ))),
                None => Err(CandidError::UnimplementedDecodePath {
                    what: format!("type opcode {}", opcode),
                }),
            },
        }
    }

    fn read_fields(input: &mut &[u8]) -> CandidResult<Vec<(u32, i64)>> {
        let count = read_len(input)?;
        let mut fields: Vec<(u32, i64)> = Vec::new();
        for _ in 0..count {
            let id = u32::try_from(read_u64(input)?)
                .map_err(|_| malformed("field id does not fit into 32 bits"))?;
            if let Some((previous, _)) = fields.last() {
                if *previous >= id {
                    return Err(malformed(format!(
                        "field ids not strictly increasing: {} after {}",
                        id, previous
                    )));
                }
            }
            fields.push((id, read_i64(input)?));
        }
        Ok(fields)
    }

    fn read_refs(input: &mut &[u8]) -> CandidResult<Vec<i64>> {
        let count = read_len(input)?;
        let mut refs = Vec::new();
        for _ in 0..count {
            refs.push(read_i64(input)?);
        }
        Ok(refs)
    }

    fn entry(&self, type_ref: i64) -> Option<&WireEntry> {
        usize::try_from(type_ref)
            .ok()
            .and_then(|index| self.entries.get(index))
    }

    /// Accepts primitive opcodes and indices into this table.
    fn check_ref(&self, type_ref: i64) -> CandidResult<()> {
        let known = if type_ref < 0 {
            PrimitiveType::from_opcode(type_ref).is_some()
        } else {
            self.entry(type_ref).is_some()
        };
        if known {
            Ok(())
        } else {
            Err(CandidError::UnknownTypeReference(TypeReference::Index(
                type_ref,
            )))
        }
    }
}

enum Wire<'t> {
    Primitive(PrimitiveType),
    Entry(&'t WireEntry),
}

impl WireTable {
    fn lookup(&self, type_ref: i64) -> CandidResult<Wire<'_>> {
        let wire = if type_ref < 0 {
            PrimitiveType::from_opcode(type_ref).map(Wire::Primitive)
        } else {
            self.entry(type_ref).map(Wire::Entry)
        };
        wire.ok_or(CandidError::UnknownTypeReference(TypeReference::Index(
            type_ref,
        )))
    }
}

struct Frame {
    index: usize,
    recursive_id: Option<CandidId>,
}

/// Rebuilds [`CandidType`] trees from the wire table.
///
/// An entry reached again while it is still being expanded becomes a
/// reference to the expansion on the stack. Expansions that refer to no
/// entry outside themselves are cached and shared, so an argument list like
/// `(List, List)` yields the same type twice.
struct TypeBuilder<'t> {
    table: &'t WireTable,
    stack: Vec<Frame>,
    closed: HashMap<usize, CandidType>,
    bindings: HashMap<usize, usize>,
    nodes_left: usize,
    max_nodes: usize,
    max_depth: usize,
}

const NO_OUTER_REFERENCE: usize = usize::MAX;

impl<'t> TypeBuilder<'t> {
    fn new(table: &'t WireTable, max_nodes: usize, max_depth: usize) -> Self {
        Self {
            table,
            stack: Vec::new(),
            closed: HashMap::new(),
            bindings: HashMap::new(),
            nodes_left: max_nodes,
            max_nodes,
            max_depth,
        }
    }

    fn fresh_id(&mut self, index: usize) -> CandidId {
        let count = self.bindings.entry(index).or_insert(0);
        let id = match *count {
            0 => format!("rec_{}", index),
            n => format!("rec_{}_{}", index, n),
        };
        *count += 1;
        CandidId::from(id)
    }

    /// Returns the type behind `type_ref` and the lowest stack position it
    /// refers to outside itself.
    fn build(&mut self, type_ref: i64) -> CandidResult<(CandidType, usize)> {
        let table = self.table;
        let entry = match table.lookup(type_ref)? {
            Wire::Primitive(primitive) => {
                return Ok((CandidType::Primitive(primitive), NO_OUTER_REFERENCE))
            }
            Wire::Entry(entry) => entry,
        };
        let index = type_ref as usize;

        if let Some(position) = self.stack.iter().rposition(|frame| frame.index == index) {
            let id = match &self.stack[position].recursive_id {
                Some(id) => id.clone(),
                None => {
                    let id = self.fresh_id(index);
                    self.stack[position].recursive_id = Some(id.clone());
                    id
                }
            };
            return Ok((CandidType::Reference(id), position));
        }
        if let Some(ty) = self.closed.get(&index) {
            return Ok((ty.clone(), NO_OUTER_REFERENCE));
        }

        if self.nodes_left == 0 {
            return Err(CandidError::LimitExceeded {
                limit: "type expansion",
                value: self.max_nodes as u64 + 1,
                max: self.max_nodes as u64,
            });
        }
        self.nodes_left -= 1;
        check_limit("type depth", self.stack.len() + 1, self.max_depth)?;

        let position = self.stack.len();
        self.stack.push(Frame {
            index,
            recursive_id: None,
        });
        let mut lowest = NO_OUTER_REFERENCE;
        let kind = self.build_kind(entry, &mut lowest);
        let frame = self.stack.pop();
        let kind = kind?;

        let ty = CandidType::Compound(CompoundType {
            kind,
            recursive_id: frame.and_then(|frame| frame.recursive_id),
        });
        let outer = if lowest < position {
            lowest
        } else {
            NO_OUTER_REFERENCE
        };
        if outer == NO_OUTER_REFERENCE {
            self.closed.insert(index, ty.clone());
        }
        Ok((ty, outer))
    }

    fn build_child(&mut self, type_ref: i64, lowest: &mut usize) -> CandidResult<CandidType> {
        let (ty, outer) = self.build(type_ref)?;
        *lowest = (*lowest).min(outer);
        Ok(ty)
    }

    fn build_fields(
        &mut self,
        fields: &[(u32, i64)],
        lowest: &mut usize,
    ) -> CandidResult<BTreeMap<Tag, CandidType>> {
        let mut built = BTreeMap::new();
        for (id, type_ref) in fields {
            built.insert(Tag::from_id(*id), self.build_child(*type_ref, lowest)?);
        }
        Ok(built)
    }

    fn build_args(&mut self, refs: &[i64], lowest: &mut usize) -> CandidResult<Vec<FuncArg>> {
        let mut args = Vec::with_capacity(refs.len());
        for type_ref in refs {
            args.push(FuncArg::unnamed(self.build_child(*type_ref, lowest)?));
        }
        Ok(args)
    }

    fn build_kind(&mut self, entry: &WireEntry, lowest: &mut usize) -> CandidResult<CompoundKind> {
        Ok(match entry {
            WireEntry::Vector(inner) => {
                CompoundKind::Vector(Box::new(self.build_child(*inner, lowest)?))
            }
            WireEntry::Option(inner) => {
                CompoundKind::Option(Box::new(self.build_child(*inner, lowest)?))
            }
            WireEntry::Record(fields) => CompoundKind::Record(self.build_fields(fields, lowest)?),
            WireEntry::Variant(options) => {
                CompoundKind::Variant(self.build_fields(options, lowest)?)
            }
            WireEntry::Func { args, rets, modes } => CompoundKind::Func(FuncType {
                modes: modes.clone(),
                args: self.build_args(args, lowest)?,
                rets: self.build_args(rets, lowest)?,
            }),
            WireEntry::Service(methods) => {
                let mut service = ServiceType::default();
                for (name, type_ref) in methods {
                    match self.build_child(*type_ref, lowest)? {
                        CandidType::Compound(CompoundType {
                            kind: CompoundKind::Func(func),
                            recursive_id: None,
                        }) => {
                            service.methods.insert(CandidId::from(name.as_str()), func);
                        }
                        _ => {
                            return Err(CandidError::UnimplementedDecodePath {
                                what: format!("recursive type of service method '{}'", name),
                            })
                        }
                    }
                }
                CompoundKind::Service(service)
            }
        })
    }
}

struct ValueReader<'t, 'b> {
    table: &'t WireTable,
    config: &'t CandidConfig,
    input: &'b [u8],
    values_left: usize,
}

impl ValueReader<'_, '_> {
    fn read(&mut self, type_ref: i64, depth: usize) -> CandidResult<CandidValue> {
        check_limit("decode depth", depth, self.config.max_decode_depth)?;
        if self.values_left == 0 {
            return Err(CandidError::LimitExceeded {
                limit: "value count",
                value: self.config.max_value_count as u64 + 1,
                max: self.config.max_value_count as u64,
            });
        }
        self.values_left -= 1;

        match self.table.lookup(type_ref)? {
            Wire::Primitive(primitive) => self.read_primitive(primitive),
            Wire::Entry(entry) => self.read_compound(entry, depth),
        }
    }

    fn read_primitive(&mut self, primitive: PrimitiveType) -> CandidResult<CandidValue> {
        let input = &mut self.input;
        Ok(match primitive {
            PrimitiveType::Null => CandidValue::Null,
            PrimitiveType::Reserved => CandidValue::Reserved,
            PrimitiveType::Bool => match read_byte(input)? {
                0 => CandidValue::Bool(false),
                1 => CandidValue::Bool(true),
                other => {
                    return Err(CandidError::InvalidValue {
                        reason: format!("bool encoded as {}", other),
                    })
                }
            },
            PrimitiveType::Nat => {
                CandidValue::Nat(read_unsigned(input, self.config.max_varint_bytes)?)
            }
            PrimitiveType::Int => {
                CandidValue::Int(read_signed(input, self.config.max_varint_bytes)?)
            }
            PrimitiveType::Nat8 => CandidValue::Nat8(read_byte(input)?),
            PrimitiveType::Nat16 => CandidValue::Nat16(u16::from_le_bytes(take_array(input)?)),
            PrimitiveType::Nat32 => CandidValue::Nat32(u32::from_le_bytes(take_array(input)?)),
            PrimitiveType::Nat64 => CandidValue::Nat64(u64::from_le_bytes(take_array(input)?)),
            PrimitiveType::Int8 => CandidValue::Int8(i8::from_le_bytes(take_array(input)?)),
            PrimitiveType::Int16 => CandidValue::Int16(i16::from_le_bytes(take_array(input)?)),
            PrimitiveType::Int32 => CandidValue::Int32(i32::from_le_bytes(take_array(input)?)),
            PrimitiveType::Int64 => CandidValue::Int64(i64::from_le_bytes(take_array(input)?)),
            PrimitiveType::Float32 => {
                CandidValue::Float32(f32::from_le_bytes(take_array(input)?))
            }
            PrimitiveType::Float64 => {
                CandidValue::Float64(f64::from_le_bytes(take_array(input)?))
            }
            PrimitiveType::Text => CandidValue::Text(read_text(input)?),
            PrimitiveType::Principal => {
                CandidValue::Principal(read_principal(input, "principal")?)
            }
            PrimitiveType::Empty => {
                return Err(CandidError::InvalidValue {
                    reason: "no value has type empty".to_string(),
                })
            }
        })
    }

    fn read_compound(&mut self, entry: &WireEntry, depth: usize) -> CandidResult<CandidValue> {
        Ok(match entry {
            WireEntry::Vector(inner) => {
                let len = read_len(&mut self.input)?;
                let mut values = Vec::new();
                for _ in 0..len {
                    values.push(self.read(*inner, depth + 1)?);
                }
                CandidValue::Vector(CandidVector::from_decoded(values))
            }
            WireEntry::Option(inner) => match read_byte(&mut self.input)? {
                0 => CandidValue::Option(None),
                1 => CandidValue::some(self.read(*inner, depth + 1)?),
                other => {
                    return Err(CandidError::InvalidValue {
                        reason: format!("option presence flag {}", other),
                    })
                }
            },
            WireEntry::Record(fields) => {
                let mut record = CandidRecord::default();
                for (id, type_ref) in fields {
                    let value = self.read(*type_ref, depth + 1)?;
                    record.insert(Tag::from_id(*id), value);
                }
                CandidValue::Record(record)
            }
            WireEntry::Variant(options) => {
                let index = read_u64(&mut self.input)?;
                let (id, type_ref) = usize::try_from(index)
                    .ok()
                    .and_then(|index| options.get(index))
                    .ok_or_else(|| CandidError::UnknownRecordOrVariantTag {
                        tag: format!("option index {}", index),
                    })?;
                CandidValue::Variant(CandidVariant {
                    tag: Tag::from_id(*id),
                    value: Box::new(self.read(*type_ref, depth + 1)?),
                })
            }
            WireEntry::Func { .. } => match read_byte(&mut self.input)? {
                1 => {
                    let service = read_principal(&mut self.input, "service")?;
                    let method = read_text(&mut self.input)?;
                    CandidValue::Func(FuncRef { service, method })
                }
                0 => {
                    return Err(CandidError::UnimplementedDecodePath {
                        what: "opaque function reference".to_string(),
                    })
                }
                other => {
                    return Err(CandidError::InvalidValue {
                        reason: format!("function reference flag {}", other),
                    })
                }
            },
            WireEntry::Service(_) => {
                CandidValue::Service(read_principal(&mut self.input, "service")?)
            }
        })
    }
}

fn read_principal(input: &mut &[u8], what: &str) -> CandidResult<Principal> {
    match read_byte(input)? {
        1 => {
            let len = read_len(input)?;
            let bytes = take(input, len)?;
            Principal::try_from_slice(bytes).map_err(|err| CandidError::InvalidValue {
                reason: format!("{} id: {}", what, err),
            })
        }
        0 => Err(CandidError::UnimplementedDecodePath {
            what: format!("opaque {} reference", what),
        }),
        other => Err(CandidError::InvalidValue {
            reason: format!("{} reference flag {}", what, other),
        }),
    }
}

/// Checks decoded values against caller-declared types.
struct TypeChecker {
    table: CompoundTypeTable,
}

impl TypeChecker {
    fn kind<'c>(&'c self, ty: &'c CandidType) -> CandidResult<&'c CompoundKind> {
        self.table.resolve_compound(ty)?.ok_or_else(|| {
            CandidError::UnknownTypeReference(TypeReference::Unregistered(ty.to_string()))
        })
    }

    /// The value an absent field or argument of type `ty` takes.
    fn absent(&self, ty: &CandidType, what: &str) -> CandidResult<CandidValue> {
        match ty {
            CandidType::Primitive(PrimitiveType::Null) => Ok(CandidValue::Null),
            CandidType::Primitive(PrimitiveType::Reserved) => Ok(CandidValue::Reserved),
            CandidType::Primitive(_) => Err(CandidError::MissingRecordField {
                tag: what.to_string(),
            }),
            _ => match self.kind(ty)? {
                CompoundKind::Option(_) => Ok(CandidValue::Option(None)),
                _ => Err(CandidError::MissingRecordField {
                    tag: what.to_string(),
                }),
            },
        }
    }

    fn check(&self, value: CandidValue, ty: &CandidType) -> CandidResult<CandidValue> {
        if let CandidType::Primitive(primitive) = ty {
            return check_primitive(value, *primitive);
        }
        let mismatch = |value: &CandidValue| CandidError::TypeMismatch {
            expected: ty.to_string(),
            found: format!("{:?}", value.kind()),
        };
        match (self.kind(ty)?, value) {
            (CompoundKind::Vector(inner), CandidValue::Vector(vector)) => {
                let values = vector
                    .into_values()
                    .into_iter()
                    .map(|value| self.check(value, inner))
                    .collect::<CandidResult<Vec<_>>>()?;
                Ok(CandidValue::Vector(CandidVector::from_decoded(values)))
            }
            (CompoundKind::Option(inner), CandidValue::Option(option)) => match option {
                None => Ok(CandidValue::Option(None)),
                Some(value) => Ok(CandidValue::some(self.check(*value, inner)?)),
            },
            (CompoundKind::Option(_), CandidValue::Null | CandidValue::Reserved) => {
                Ok(CandidValue::Option(None))
            }
            (CompoundKind::Record(fields), CandidValue::Record(record)) => {
                let mut decoded = record.into_fields();
                if let Some(tag) = decoded.keys().find(|tag| !fields.contains_key(*tag)) {
                    return Err(CandidError::UnknownRecordOrVariantTag {
                        tag: tag.to_string(),
                    });
                }
                let mut checked = CandidRecord::default();
                for (tag, field_ty) in fields {
                    let value = match decoded.remove(tag) {
                        Some(value) => self.check(value, field_ty)?,
                        None => self.absent(field_ty, &tag.to_string())?,
                    };
                    checked.insert(tag.clone(), value);
                }
                Ok(CandidValue::Record(checked))
            }
            (CompoundKind::Variant(options), CandidValue::Variant(variant)) => {
                let (tag, option_ty) = options.get_key_value(&variant.tag).ok_or_else(|| {
                    CandidError::UnknownRecordOrVariantTag {
                        tag: variant.tag.to_string(),
                    }
                })?;
                Ok(CandidValue::Variant(CandidVariant {
                    tag: tag.clone(),
                    value: Box::new(self.check(*variant.value, option_ty)?),
                }))
            }
            (CompoundKind::Func(_), value @ CandidValue::Func(_))
            | (CompoundKind::Service(_), value @ CandidValue::Service(_)) => Ok(value),
            (_, value) => Err(mismatch(&value)),
        }
    }
}

fn check_primitive(value: CandidValue, primitive: PrimitiveType) -> CandidResult<CandidValue> {
    Ok(match (primitive, value) {
        (PrimitiveType::Reserved, _) => CandidValue::Reserved,
        // nat is a subtype of int.
        (PrimitiveType::Int, CandidValue::Nat(n)) => CandidValue::Int(BigInt::from(n)),
        (primitive, value) if matches_primitive(primitive, &value) => value,
        (primitive, value) => {
            return Err(CandidError::TypeMismatch {
                expected: primitive.to_string(),
                found: format!("{:?}", value.kind()),
            })
        }
    })
}

fn matches_primitive(primitive: PrimitiveType, value: &CandidValue) -> bool {
    matches!(
        (primitive, value),
        (PrimitiveType::Null, CandidValue::Null)
            | (PrimitiveType::Bool, CandidValue::Bool(_))
            | (PrimitiveType::Nat, CandidValue::Nat(_))
            | (PrimitiveType::Int, CandidValue::Int(_))
            | (PrimitiveType::Nat8, CandidValue::Nat8(_))
            | (PrimitiveType::Nat16, CandidValue::Nat16(_))
            | (PrimitiveType::Nat32, CandidValue::Nat32(_))
            | (PrimitiveType::Nat64, CandidValue::Nat64(_))
            | (PrimitiveType::Int8, CandidValue::Int8(_))
            | (PrimitiveType::Int16, CandidValue::Int16(_))
            | (PrimitiveType::Int32, CandidValue::Int32(_))
            | (PrimitiveType::Int64, CandidValue::Int64(_))
            | (PrimitiveType::Float32, CandidValue::Float32(_))
            | (PrimitiveType::Float64, CandidValue::Float64(_))
            | (PrimitiveType::Text, CandidValue::Text(_))
            | (PrimitiveType::Principal, CandidValue::Principal(_))
    )
}
