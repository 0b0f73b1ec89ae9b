use super::*;
use crate::types::{FuncMode, PrimitiveType, ServiceType};
use assert_matches::assert_matches;
use hex_literal::hex;
use proptest::prelude::*;

fn nat() -> CandidType {
    PrimitiveType::Nat.into()
}

fn text() -> CandidType {
    PrimitiveType::Text.into()
}

fn compound(ty: CandidType) -> CompoundType {
    match ty {
        CandidType::Compound(compound) => compound,
        other => panic!("{} is not a compound type", other),
    }
}

fn list_type() -> CandidType {
    CandidType::opt(CandidType::record([
        ("head", nat()),
        ("tail", CandidType::reference("list")),
    ]))
    .with_recursive_id("list")
}

#[test]
fn should_return_same_index_for_structurally_equal_types() {
    let mut table = CompoundTypeTable::new();
    let first = table.get_or_add(&compound(CandidType::vector(nat())));
    let second = table.get_or_add(&compound(CandidType::vector(nat())));
    assert_eq!(first, second);
    assert_eq!(table.len(), 1);
}

#[test]
fn should_register_inner_types_before_outer_type() {
    let mut table = CompoundTypeTable::new();
    let outer = table.get_or_add(&compound(CandidType::opt(CandidType::vector(text()))));
    assert_eq!(outer, 1);
    assert_eq!(table.index_of(&compound(CandidType::vector(text()))), Some(0));
}

#[test]
fn should_encode_recursive_list() {
    let table = CompoundTypeTable::from_types([&list_type()]);
    assert_eq!(table.len(), 2);
    assert_eq!(
        table.get_recursive_reference_index(&CandidId::from("list")),
        Ok(1)
    );
    // record { head: nat (id 1158359328); tail: 1 (id 1291237008) }, opt 0
    assert_eq!(
        table.encode().expect("encodes"),
        hex!("02 6c 02 a0 d2 ac a8 04 7d 90 ed da e7 04 01 6e 00").to_vec()
    );
}

#[test]
fn should_fail_on_dangling_recursive_reference() {
    let table =
        CompoundTypeTable::from_types([&CandidType::vector(CandidType::reference("nowhere"))]);
    assert_matches!(
        table.encode(),
        Err(CandidError::UnknownTypeReference(TypeReference::Recursive(id))) if id.as_str() == "nowhere"
    );
}

#[test]
fn should_fail_on_ambiguous_recursive_id() {
    let a = CandidType::vector(CandidType::reference("x")).with_recursive_id("x");
    let b = CandidType::opt(CandidType::reference("x")).with_recursive_id("x");
    let table = CompoundTypeTable::from_types([&a, &b]);
    assert_matches!(
        table.get_recursive_reference_index(&CandidId::from("x")),
        Err(CandidError::DuplicateOrAmbiguousRecursiveId { count: 2, .. })
    );
}

#[test]
fn should_fail_on_unregistered_compound_type() {
    let table = CompoundTypeTable::new();
    assert_matches!(
        table.type_ref(&CandidType::vector(nat())),
        Err(CandidError::UnknownTypeReference(TypeReference::Unregistered(_)))
    );
    assert_eq!(table.type_ref(&text()), Ok(-15));
}

#[test]
fn should_encode_func_and_service_entries() {
    let method = FuncType::new(vec![text()], vec![]).with_mode(FuncMode::Query);
    let service = CandidType::service(ServiceType::new([(CandidId::from("greet"), method)]));
    let table = CompoundTypeTable::from_types([&service]);
    assert_eq!(
        table.encode().expect("encodes"),
        // func (text) -> () query; service { greet : 0 }
        hex!("02 6a 01 71 00 01 01 69 01 05 67 72 65 65 74 00").to_vec()
    );
}

proptest! {
    #[test]
    fn prop_distinct_types_get_sequential_indices(depth in 1usize..12) {
        let mut table = CompoundTypeTable::new();
        let mut ty = nat();
        for expected in 0..depth {
            ty = CandidType::vector(ty);
            prop_assert_eq!(table.register(&ty), Some(expected as u32));
        }
        prop_assert_eq!(table.len(), depth);
    }
}
