use crate::error::{CandidError, CandidResult, TypeReference};
use crate::tag::CandidId;
use crate::types::{CandidType, CompoundKind, CompoundType, FuncType};
use crate::varint::{write_i64, write_u64};
use std::collections::HashMap;

#[cfg(test)]
mod tests;

/// Deduplicated, index-addressed registry of the compound types used by a
/// payload.
///
/// Compound types are registered in post-order: every nested compound type
/// gets its index before the type containing it. Structurally equal types
/// share one index. Once encoding starts the table is only read.
#[derive(Clone, Debug, Default)]
pub struct CompoundTypeTable {
    indices: HashMap<CompoundType, u32>,
    types: Vec<CompoundType>,
}

impl CompoundTypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table holding every compound type reachable from `types`.
    pub fn from_types<'a, I: IntoIterator<Item = &'a CandidType>>(types: I) -> Self {
        let mut table = Self::new();
        for ty in types {
            table.register(ty);
        }
        table
    }

    /// Registers `ty` and its nested compound types. Returns the table index
    /// of `ty` if it is a compound type.
    pub fn register(&mut self, ty: &CandidType) -> Option<u32> {
        match ty {
            CandidType::Compound(compound) => Some(self.get_or_add(compound)),
            CandidType::Primitive(_) | CandidType::Reference(_) => None,
        }
    }

    /// Returns the index of `compound`, registering it (after its nested
    /// compound types) if it is not in the table yet.
    pub fn get_or_add(&mut self, compound: &CompoundType) -> u32 {
        if let CompoundKind::Service(service) = &compound.kind {
            // Methods are referenced by the index of their func type.
            for func in service.methods.values() {
                self.get_or_add(&func_compound(func));
            }
        } else {
            for inner in compound.kind.inner_types() {
                self.register(inner);
            }
        }
        if let Some(index) = self.indices.get(compound) {
            return *index;
        }
        let index = self.types.len() as u32;
        self.indices.insert(compound.clone(), index);
        self.types.push(compound.clone());
        index
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn index_of(&self, compound: &CompoundType) -> Option<u32> {
        self.indices.get(compound).copied()
    }

    pub fn get(&self, index: u32) -> Option<&CompoundType> {
        self.types.get(index as usize)
    }

    /// Returns the index of the single compound type bound to `id`.
    ///
    /// Fails with [`CandidError::UnknownTypeReference`] if no type binds `id`
    /// and with [`CandidError::DuplicateOrAmbiguousRecursiveId`] if more than
    /// one does; the latter means the type graph itself was built wrong.
    pub fn get_recursive_reference_index(&self, id: &CandidId) -> CandidResult<u32> {
        let mut matches = self
            .types
            .iter()
            .enumerate()
            .filter(|(_, ty)| ty.recursive_id.as_ref() == Some(id))
            .map(|(index, _)| index as u32);
        match (matches.next(), matches.count()) {
            (None, _) => Err(CandidError::UnknownTypeReference(
                TypeReference::Recursive(id.clone()),
            )),
            (Some(index), 0) => Ok(index),
            (Some(_), others) => Err(CandidError::DuplicateOrAmbiguousRecursiveId {
                id: id.clone(),
                count: others + 1,
            }),
        }
    }

    /// The compound kind behind `ty`, if it is (or refers to) a compound type.
    pub fn resolve_compound<'a>(
        &'a self,
        ty: &'a CandidType,
    ) -> CandidResult<Option<&'a CompoundKind>> {
        match ty {
            CandidType::Primitive(_) => Ok(None),
            CandidType::Compound(compound) => Ok(Some(&compound.kind)),
            CandidType::Reference(id) => {
                let index = self.get_recursive_reference_index(id)?;
                Ok(self.get(index).map(|compound| &compound.kind))
            }
        }
    }

    /// The wire reference of `ty`: its opcode for primitives, its table
    /// index otherwise.
    pub fn type_ref(&self, ty: &CandidType) -> CandidResult<i64> {
        match ty {
            CandidType::Primitive(primitive) => Ok(primitive.opcode()),
            CandidType::Compound(compound) => self
                .index_of(compound)
                .map(i64::from)
                .ok_or_else(|| {
                    CandidError::UnknownTypeReference(TypeReference::Unregistered(
                        compound.to_string(),
                    ))
                }),
            CandidType::Reference(id) => self.get_recursive_reference_index(id).map(i64::from),
        }
    }

    pub(crate) fn write_type_ref(&self, out: &mut Vec<u8>, ty: &CandidType) -> CandidResult<()> {
        write_i64(out, self.type_ref(ty)?);
        Ok(())
    }

    /// Serializes the table: the number of entries followed by each entry's
    /// opcode and payload, in index order.
    pub fn encode(&self) -> CandidResult<Vec<u8>> {
        let mut out = Vec::new();
        write_u64(&mut out, self.types.len() as u64);
        for compound in &self.types {
            write_i64(&mut out, compound.kind.opcode());
            self.encode_entry(&mut out, &compound.kind)?;
        }
        Ok(out)
    }

    fn encode_entry(&self, out: &mut Vec<u8>, kind: &CompoundKind) -> CandidResult<()> {
        match kind {
            CompoundKind::Vector(inner) | CompoundKind::Option(inner) => {
                self.write_type_ref(out, inner)?;
            }
            CompoundKind::Record(fields) | CompoundKind::Variant(fields) => {
                write_u64(out, fields.len() as u64);
                for (tag, ty) in fields {
                    write_u64(out, u64::from(tag.id()));
                    self.write_type_ref(out, ty)?;
                }
            }
            CompoundKind::Func(func) => {
                write_u64(out, func.args.len() as u64);
                for arg in &func.args {
                    self.write_type_ref(out, &arg.ty)?;
                }
                write_u64(out, func.rets.len() as u64);
                for ret in &func.rets {
                    self.write_type_ref(out, &ret.ty)?;
                }
                write_u64(out, func.modes.len() as u64);
                out.extend(func.modes.iter().map(|mode| mode.code()));
            }
            CompoundKind::Service(service) => {
                write_u64(out, service.methods.len() as u64);
                for (name, func) in &service.methods {
                    write_u64(out, name.as_str().len() as u64);
                    out.extend_from_slice(name.as_str().as_bytes());
                    let func = func_compound(func);
                    let index = self.index_of(&func).ok_or_else(|| {
                        CandidError::UnknownTypeReference(TypeReference::Unregistered(
                            func.to_string(),
                        ))
                    })?;
                    write_i64(out, i64::from(index));
                }
            }
        }
        Ok(())
    }
}

fn func_compound(func: &FuncType) -> CompoundType {
    CompoundType::new(CompoundKind::Func(func.clone()))
}
