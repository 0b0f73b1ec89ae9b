use super::*;
use crate::value::{CandidRecord, FuncRef};
use crate::FuncType;
use assert_matches::assert_matches;
use hex_literal::hex;
use num_bigint::{BigInt, BigUint};

fn nat() -> CandidType {
    PrimitiveType::Nat.into()
}

fn text() -> CandidType {
    PrimitiveType::Text.into()
}

fn nat8() -> CandidType {
    PrimitiveType::Nat8.into()
}

#[test]
fn should_encode_empty_argument_list() {
    assert_eq!(encode_args(&[]).expect("encodes"), hex!("4449444c 00 00").to_vec());
}

#[test]
fn should_encode_primitive_arguments() {
    let bytes = ArgEncoder::new()
        .arg(CandidValue::Nat(BigUint::from(42u8)), nat())
        .arg(CandidValue::text("hello"), text())
        .arg(CandidValue::Int(BigInt::from(-1)), PrimitiveType::Int.into())
        .arg(CandidValue::Bool(true), PrimitiveType::Bool.into())
        .encode()
        .expect("encodes");
    assert_eq!(
        bytes,
        hex!("4449444c 00 04 7d 71 7c 7e 2a 05 68656c6c6f 7f 01").to_vec()
    );
}

#[test]
fn should_encode_fixed_width_numbers_little_endian() {
    let bytes = encode_args(&[
        (CandidValue::Nat16(0x0102), PrimitiveType::Nat16.into()),
        (CandidValue::Int32(-2), PrimitiveType::Int32.into()),
        (CandidValue::Float64(1.0), PrimitiveType::Float64.into()),
    ])
    .expect("encodes");
    assert_eq!(
        bytes,
        hex!("4449444c 00 03 7a 75 72 0201 feffffff 000000000000f03f").to_vec()
    );
}

#[test]
fn should_encode_records_in_tag_order_regardless_of_construction_order() {
    let ty = CandidType::record([("b", text()), ("a", nat8())]);
    let ab = CandidValue::record([("a", CandidValue::Nat8(1)), ("b", CandidValue::text("x"))]);
    let mut ba = CandidRecord::default();
    ba.insert("b", CandidValue::text("x"));
    ba.insert("a", CandidValue::Nat8(1));

    let first = encode_args(&[(ab, ty.clone())]).expect("encodes");
    let second = encode_args(&[(CandidValue::Record(ba), ty)]).expect("encodes");
    assert_eq!(first, second);
    assert_eq!(
        first,
        hex!("4449444c 01 6c 02 61 7b 62 71 01 00 01 01 78").to_vec()
    );
}

#[test]
fn should_encode_variant_index_in_declared_option_order() {
    let ty = CandidType::variant([("err", text()), ("ok", nat())]);
    let bytes = encode_args(&[(CandidValue::variant("err", CandidValue::text("no")), ty)])
        .expect("encodes");
    // ok (24860) sorts before err (5048165), so err has index 1.
    assert_eq!(
        bytes,
        hex!("4449444c 01 6b 02 9cc201 7d e58eb402 71 01 00 01 02 6e6f").to_vec()
    );
}

#[test]
fn should_encode_recursive_list() {
    let list = CandidType::opt(CandidType::record([
        ("head", nat()),
        ("tail", CandidType::reference("list")),
    ]))
    .with_recursive_id("list");
    let cell = |head: u8, tail: CandidValue| {
        CandidValue::some(CandidValue::record([
            ("head", CandidValue::Nat(BigUint::from(head))),
            ("tail", tail),
        ]))
    };
    let value = cell(1, cell(2, CandidValue::none()));
    assert_eq!(
        encode_args(&[(value, list)]).expect("encodes"),
        hex!("4449444c 02 6c 02 a0d2aca804 7d 90eddae704 01 6e 00 01 01 01 01 01 02 00").to_vec()
    );
}

#[test]
fn should_fill_absent_optional_fields() {
    let ty = CandidType::record([
        ("a", CandidType::opt(nat())),
        ("b", nat8()),
        ("c", PrimitiveType::Null.into()),
    ]);
    let sparse = CandidValue::record([("b", CandidValue::Nat8(7))]);
    let full = CandidValue::record([
        ("a", CandidValue::none()),
        ("b", CandidValue::Nat8(7)),
        ("c", CandidValue::Null),
    ]);
    assert_eq!(
        encode_args(&[(sparse, ty.clone())]).expect("encodes"),
        encode_args(&[(full, ty)]).expect("encodes")
    );
}

#[test]
fn should_fail_on_missing_required_field() {
    let ty = CandidType::record([("a", nat8()), ("b", nat8())]);
    let value = CandidValue::record([("a", CandidValue::Nat8(1))]);
    assert_matches!(
        encode_args(&[(value, ty)]),
        Err(CandidError::MissingRecordField { tag }) if tag == "b"
    );
}

#[test]
fn should_fail_on_tags_absent_from_type() {
    let record_ty = CandidType::record([("a", nat8())]);
    let record = CandidValue::record([("a", CandidValue::Nat8(1)), ("z", CandidValue::Null)]);
    assert_matches!(
        encode_args(&[(record, record_ty)]),
        Err(CandidError::UnknownRecordOrVariantTag { tag }) if tag == "z"
    );

    let variant_ty = CandidType::variant([("ok", nat())]);
    let variant = CandidValue::variant("err", CandidValue::text("boom"));
    assert_matches!(
        encode_args(&[(variant, variant_ty)]),
        Err(CandidError::UnknownRecordOrVariantTag { tag }) if tag == "err"
    );
}

#[test]
fn should_fail_on_value_not_matching_type() {
    assert_matches!(
        encode_args(&[(CandidValue::Nat8(1), text())]),
        Err(CandidError::TypeMismatch { expected, .. }) if expected == "text"
    );
    assert_matches!(
        encode_args(&[(CandidValue::text("x"), CandidType::vector(text()))]),
        Err(CandidError::TypeMismatch { .. })
    );
}

#[test]
fn should_encode_principal_func_and_service_references() {
    let principal = Principal::from_slice(&[1, 2, 3]);
    let bytes = encode_args(&[(CandidValue::Principal(principal), PrimitiveType::Principal.into())])
        .expect("encodes");
    assert_eq!(bytes, hex!("4449444c 00 01 68 01 03 010203").to_vec());

    let func = CandidValue::Func(FuncRef {
        service: principal,
        method: "m".to_string(),
    });
    let bytes = encode_args(&[(func, CandidType::func(FuncType::new(vec![], vec![])))])
        .expect("encodes");
    assert_eq!(
        bytes,
        hex!("4449444c 01 6a 00 00 00 01 00 01 01 03 010203 01 6d").to_vec()
    );

    let service_ty = CandidType::service(Default::default());
    let bytes = encode_args(&[(CandidValue::Service(principal), service_ty)]).expect("encodes");
    assert_eq!(bytes, hex!("4449444c 01 69 00 01 00 01 03 010203").to_vec());
}

#[test]
fn should_accept_any_value_for_reserved() {
    let bytes = encode_args(&[(CandidValue::text("ignored"), PrimitiveType::Reserved.into())])
        .expect("encodes");
    assert_eq!(bytes, hex!("4449444c 00 01 70").to_vec());
}
