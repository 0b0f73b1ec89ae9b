use super::*;
use hex_literal::hex;
use proptest::prelude::*;

fn sha256(value: &Hashable) -> Vec<u8> {
    value.compute_hash(&Sha256)
}

#[test]
fn should_hash_strings_as_utf8() {
    assert_eq!(
        sha256(&"request_type".into()),
        hex!("769e6f87bdda39c859642b74ce9763cdd37cb1cd672733e8c54efaa33ab78af9")
    );
    assert_eq!(
        sha256(&"call".into()),
        hex!("7edb360f06acaef2cc80dba16cf563f199d347db4443da04da0c8173e3f9e4ed")
    );
    assert_eq!(
        sha256(&"hello".into()),
        hex!("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
    );
}

#[test]
fn should_hash_bytes_directly() {
    // D I D L \0 \253 *
    assert_eq!(
        sha256(&Hashable::Bytes(vec![68, 73, 68, 76, 0, 253, 42])),
        hex!("6c0b2ae49718f6995c02ac5700c9c789d7b7862a0d53e6d40a73f1fcd2f70189")
    );
}

#[test]
fn should_hash_integers_as_leb128() {
    // LEB128: 0x00
    assert_eq!(
        sha256(&Hashable::U64(0)),
        hex!("6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d")
    );
    // LEB128: 0xd2 0x09
    assert_eq!(
        sha256(&Hashable::U64(1234)),
        hex!("8b37fd3ebbe6396a89ed8563dd0cc55927ac90138950460c77cffeb55cf63810")
    );
    // LEB128: 0xff (x9) 0x01
    assert_eq!(
        sha256(&Hashable::U64(u64::MAX)),
        hex!("51672ea45f3539654bf9193f4ff763d90022eee7df5f5b76353d6f11a9eaccec")
    );
}

#[test]
fn should_hash_arrays_as_concatenated_element_digests() {
    // hash(hash("a"))
    assert_eq!(
        sha256(&Hashable::array(["a"])),
        hex!("bf5d3affb73efd2ec6c36ad3112dd933efed63c4e1cbffcfa88e2759c144f2d8")
    );
    // hash(hash("a") . hash("b"))
    assert_eq!(
        sha256(&Hashable::array(["a", "b"])),
        hex!("e5a01fee14e0ed5c48714f22180f25ad8365b53f9779f79dc4a3d7e93963f94a")
    );
    // Bytes and strings with the same content hash the same.
    assert_eq!(
        sha256(&Hashable::Array(vec![Hashable::Bytes(vec![97]), "b".into()])),
        hex!("e5a01fee14e0ed5c48714f22180f25ad8365b53f9779f79dc4a3d7e93963f94a")
    );
    // hash(hash(hash("a") . hash("b")))
    assert_eq!(
        sha256(&Hashable::array([Hashable::array(["a", "b"])])),
        hex!("029fd80ca2dd66e7c527428fc148e812a9d99a5e41483f28892ef9013eee4a19")
    );
    // hash(hash(hash("a") . hash("b")) . hash("a"))
    assert_eq!(
        sha256(&Hashable::Array(vec![
            Hashable::array(["a", "b"]),
            Hashable::Bytes(vec![97]),
        ])),
        hex!("aec3805593d9ec6df50da070597f73507050ce098b5518d0456876701ada7bb7")
    );
}

#[test]
fn should_hash_object_as_sorted_key_value_digests() {
    let object = HashableObject::new().with("request_type", "call");
    // hash(hash("request_type") . hash("call"))
    assert_eq!(
        sha256(&object.into()),
        hex!("0b383f53922b5e4c296d57d44323378a1d19e5ead8351b7c0a421cf3dd914462")
    );
    // An empty map hashes the empty string.
    assert_eq!(
        sha256(&HashableObject::new().into()),
        hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
    );
}

#[test]
fn should_skip_absent_fields() {
    let mut with_absent = HashableObject::new();
    with_absent
        .insert("request_type", "call")
        .insert_optional("nonce", None::<Vec<u8>>);
    let without = HashableObject::new().with("request_type", "call");
    assert_eq!(with_absent.compute_hash(&Sha256), without.compute_hash(&Sha256));
    assert_eq!(with_absent.len(), 1);
    assert_eq!(with_absent.get("nonce"), None);
}

#[test]
fn should_order_digests_shorter_first() {
    assert_eq!(compare_digests(&[9], &[0, 0]), Ordering::Less);
    assert_eq!(compare_digests(&[0, 1], &[0, 0]), Ordering::Greater);
    assert_eq!(compare_digests(&[3, 3], &[3, 3]), Ordering::Equal);
}

/// Truncates SHA-256 to a digest length that depends on the input, to
/// exercise the ordering of keys with digests of different lengths.
struct VariableLength;

impl HashFunction for VariableLength {
    fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        let full = sha2::Sha256::digest(bytes);
        full[..1 + bytes.len() % 32].to_vec()
    }
}

#[test]
fn should_accept_any_hash_function() {
    let forward = HashableObject::new().with("a", "x").with("bbbb", "y").with("cc", 1u64);
    let backward = HashableObject::new().with("cc", 1u64).with("bbbb", "y").with("a", "x");
    assert_eq!(
        forward.compute_hash(&VariableLength),
        backward.compute_hash(&VariableLength)
    );
}

fn fields() -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
    prop::collection::btree_map("[a-z_]{1,12}", prop::collection::vec(any::<u8>(), 0..16), 1..8)
        .prop_map(|map| map.into_iter().collect())
}

proptest! {
    #[test]
    fn object_digest_is_independent_of_insertion_order(fields in fields(), rotation in 0usize..8) {
        let mut rotated = fields.clone();
        let len = rotated.len();
        rotated.rotate_left(rotation % len);
        rotated.reverse();

        let build = |fields: &[(String, Vec<u8>)]| {
            fields.iter().fold(HashableObject::new(), |object, (key, value)| {
                object.with(key.as_str(), value.clone())
            })
        };
        prop_assert_eq!(
            build(&fields).compute_hash(&Sha256),
            build(&rotated).compute_hash(&Sha256)
        );
    }

    #[test]
    fn changing_a_field_value_changes_the_digest(fields in fields(), index in 0usize..8) {
        let index = index % fields.len();
        let build = |fields: &[(String, Vec<u8>)]| {
            fields.iter().fold(HashableObject::new(), |object, (key, value)| {
                object.with(key.as_str(), value.clone())
            })
        };
        let mut changed = fields.clone();
        changed[index].1.push(0xff);
        prop_assert_ne!(
            build(&fields).compute_hash(&Sha256),
            build(&changed).compute_hash(&Sha256)
        );
    }

    #[test]
    fn array_digest_depends_on_element_order(
        elements in prop::collection::btree_set("[a-z]{1,8}", 2..6)
    ) {
        let forward: Vec<String> = elements.into_iter().collect();
        let mut backward = forward.clone();
        backward.reverse();
        prop_assert_ne!(
            sha256(&Hashable::array(forward)),
            sha256(&Hashable::array(backward))
        );
    }
}
