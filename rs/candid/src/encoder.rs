//! Serialization of typed values into a `DIDL` payload.

use crate::error::{CandidError, CandidResult, TypeReference};
use crate::type_table::CompoundTypeTable;
use crate::types::{CandidType, CompoundKind, PrimitiveType};
use crate::value::CandidValue;
use crate::varint::{write_signed, write_u64, write_unsigned};
use ic_principal::Principal;

#[cfg(test)]
mod tests;

/// The four bytes every payload starts with.
pub const MAGIC_NUMBER: &[u8; 4] = b"DIDL";

/// Encodes `args` into a payload, building the type table from their types.
pub fn encode_args(args: &[(CandidValue, CandidType)]) -> CandidResult<Vec<u8>> {
    let table = CompoundTypeTable::from_types(args.iter().map(|(_, ty)| ty));
    encode_args_with_table(&table, args)
}

/// Encodes `args` against an existing type table, which must already hold
/// every compound type used by `args`.
pub fn encode_args_with_table(
    table: &CompoundTypeTable,
    args: &[(CandidValue, CandidType)],
) -> CandidResult<Vec<u8>> {
    let mut out = MAGIC_NUMBER.to_vec();
    out.extend(table.encode()?);
    write_u64(&mut out, args.len() as u64);
    for (_, ty) in args {
        table.write_type_ref(&mut out, ty)?;
    }
    let encoder = ValueEncoder { table };
    for (value, ty) in args {
        encoder.encode(&mut out, value, ty)?;
    }
    Ok(out)
}

/// Collects arguments one at a time and encodes them together.
#[derive(Clone, Debug, Default)]
pub struct ArgEncoder {
    args: Vec<(CandidValue, CandidType)>,
}

impl ArgEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: CandidValue, ty: CandidType) -> Self {
        self.args.push((value, ty));
        self
    }

    pub fn encode(&self) -> CandidResult<Vec<u8>> {
        encode_args(&self.args)
    }
}

struct ValueEncoder<'a> {
    table: &'a CompoundTypeTable,
}

impl ValueEncoder<'_> {
    fn encode(&self, out: &mut Vec<u8>, value: &CandidValue, ty: &CandidType) -> CandidResult<()> {
        match ty {
            CandidType::Primitive(primitive) => encode_primitive(out, value, *primitive),
            _ => {
                let kind = self.compound_kind(ty)?;
                self.encode_compound(out, value, kind, ty)
            }
        }
    }

    fn compound_kind<'b>(&'b self, ty: &'b CandidType) -> CandidResult<&'b CompoundKind> {
        self.table.resolve_compound(ty)?.ok_or_else(|| {
            CandidError::UnknownTypeReference(TypeReference::Unregistered(ty.to_string()))
        })
    }

    fn encode_compound(
        &self,
        out: &mut Vec<u8>,
        value: &CandidValue,
        kind: &CompoundKind,
        ty: &CandidType,
    ) -> CandidResult<()> {
        match (kind, value) {
            (CompoundKind::Vector(inner), CandidValue::Vector(vector)) => {
                write_u64(out, vector.len() as u64);
                for element in vector.values() {
                    self.encode(out, element, inner)?;
                }
            }
            (CompoundKind::Option(inner), CandidValue::Option(option)) => match option {
                None => out.push(0),
                Some(value) => {
                    out.push(1);
                    self.encode(out, value, inner)?;
                }
            },
            (CompoundKind::Record(fields), CandidValue::Record(record)) => {
                if let Some(tag) = record.fields().keys().find(|tag| !fields.contains_key(*tag)) {
                    return Err(CandidError::UnknownRecordOrVariantTag {
                        tag: tag.to_string(),
                    });
                }
                // Fields go out in tag id order, whatever order they were added in.
                for (tag, field_ty) in fields {
                    match record.fields().get(tag) {
                        Some(field) => self.encode(out, field, field_ty)?,
                        None => self.encode_absent_field(out, &tag.to_string(), field_ty)?,
                    }
                }
            }
            (CompoundKind::Variant(options), CandidValue::Variant(variant)) => {
                let (index, option_ty) = options
                    .iter()
                    .enumerate()
                    .find(|(_, (tag, _))| **tag == variant.tag)
                    .map(|(index, (_, option_ty))| (index, option_ty))
                    .ok_or_else(|| CandidError::UnknownRecordOrVariantTag {
                        tag: variant.tag.to_string(),
                    })?;
                write_u64(out, index as u64);
                self.encode(out, &variant.value, option_ty)?;
            }
            (CompoundKind::Func(_), CandidValue::Func(func)) => {
                out.push(1);
                write_principal(out, &func.service);
                write_text(out, &func.method);
            }
            (CompoundKind::Service(_), CandidValue::Service(principal)) => {
                write_principal(out, principal);
            }
            _ => return Err(mismatch(ty, value)),
        }
        Ok(())
    }

    /// A field missing from a record value is only acceptable if its type
    /// has a value that takes no information: `null`, `reserved` or `opt`.
    fn encode_absent_field(
        &self,
        out: &mut Vec<u8>,
        tag: &str,
        field_ty: &CandidType,
    ) -> CandidResult<()> {
        match field_ty {
            CandidType::Primitive(PrimitiveType::Null | PrimitiveType::Reserved) => Ok(()),
            CandidType::Primitive(_) => Err(CandidError::MissingRecordField {
                tag: tag.to_string(),
            }),
            _ => match self.compound_kind(field_ty)? {
                CompoundKind::Option(_) => {
                    out.push(0);
                    Ok(())
                }
                _ => Err(CandidError::MissingRecordField {
                    tag: tag.to_string(),
                }),
            },
        }
    }
}

fn encode_primitive(
    out: &mut Vec<u8>,
    value: &CandidValue,
    primitive: PrimitiveType,
) -> CandidResult<()> {
    match (primitive, value) {
        (PrimitiveType::Null, CandidValue::Null) => {}
        // Any value can be passed where `reserved` is expected; it carries
        // no bytes.
        (PrimitiveType::Reserved, _) => {}
        (PrimitiveType::Bool, CandidValue::Bool(b)) => out.push(u8::from(*b)),
        (PrimitiveType::Nat, CandidValue::Nat(n)) => write_unsigned(out, n),
        (PrimitiveType::Int, CandidValue::Int(i)) => write_signed(out, i),
        (PrimitiveType::Nat8, CandidValue::Nat8(n)) => out.push(*n),
        (PrimitiveType::Nat16, CandidValue::Nat16(n)) => out.extend_from_slice(&n.to_le_bytes()),
        (PrimitiveType::Nat32, CandidValue::Nat32(n)) => out.extend_from_slice(&n.to_le_bytes()),
        (PrimitiveType::Nat64, CandidValue::Nat64(n)) => out.extend_from_slice(&n.to_le_bytes()),
        (PrimitiveType::Int8, CandidValue::Int8(i)) => out.extend_from_slice(&i.to_le_bytes()),
        (PrimitiveType::Int16, CandidValue::Int16(i)) => out.extend_from_slice(&i.to_le_bytes()),
        (PrimitiveType::Int32, CandidValue::Int32(i)) => out.extend_from_slice(&i.to_le_bytes()),
        (PrimitiveType::Int64, CandidValue::Int64(i)) => out.extend_from_slice(&i.to_le_bytes()),
        (PrimitiveType::Float32, CandidValue::Float32(f)) => {
            out.extend_from_slice(&f.to_le_bytes())
        }
        (PrimitiveType::Float64, CandidValue::Float64(f)) => {
            out.extend_from_slice(&f.to_le_bytes())
        }
        (PrimitiveType::Text, CandidValue::Text(text)) => write_text(out, text),
        (PrimitiveType::Principal, CandidValue::Principal(principal)) => {
            write_principal(out, principal)
        }
        _ => return Err(mismatch(&CandidType::Primitive(primitive), value)),
    }
    Ok(())
}

fn write_text(out: &mut Vec<u8>, text: &str) {
    write_u64(out, text.len() as u64);
    out.extend_from_slice(text.as_bytes());
}

// A transparent reference: flag byte 1, then the length-prefixed id bytes.
fn write_principal(out: &mut Vec<u8>, principal: &Principal) {
    let bytes = principal.as_slice();
    out.push(1);
    write_u64(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn mismatch(ty: &CandidType, value: &CandidValue) -> CandidError {
    CandidError::TypeMismatch {
        expected: ty.to_string(),
        found: format!("{:?}", value.kind()),
    }
}
