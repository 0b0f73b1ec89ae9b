use assert_matches::assert_matches;
use ic_client_certification::{
    verify_certificate_bytes, Certificate, CertificateError, CertificateVerifier, HashTree,
    LookupResult, Principal, PublicKey, VerificationFailure, VerifierConfig,
};
use ic_client_certification_test_utils::{
    CertificateBuilder,
    CertificateData::{CanisterData, CustomTree, SubnetData},
    SigningKey,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use slog::{o, Drain, Level, Logger, Never, OwnedKVList, Record};
use std::sync::{Arc, Mutex};

const REAL_CERTIFICATE: &str = "D9D9F7A3647472656583018301830183024863616E6973746572830183018301830183024A000000000010000001018301830183024E6365727469666965645F6461746182035820619D02453B55BA8EA01DA1D26DF7083644EBE84A97AFC8D4ECE7F82453548EAA82045820D598630C2C94E80F8EDD451F3B7E942ACE5680B60FB5897A96A466D2F8FCF6F882045820FD96014A4A0368DBD8BD4BD05806C0F8C6BDFBDFBE6F6182B9E4963F18ADD55B8204582072379FD63D4B0A8E7D0C9F87316613DC1ADED56B7311F83213FF213F8B802F1C820458208079C8D69F2C1813E63B2488CD1C7D0BAA73ECE24AEAAD48348D7A1F9B8E868F82045820F7251F6708258AA9E995EE4A923E615908D40E9D4C57DFA84640B77B76D016D0820458205D38A89DDE470A2252C2F4060C42AD6EBCBE5C689CA68241C2858D1149B13386820458200BDF772535F123B48C553D3AE0B6B464277B8E2DDF887CDFE5F54B595352BD658204582055A1F078E350F151DDDE43AEDFBAC8647AC4B392F7141917824EFB1A956B79DB8301820458205C9ABFBA1DFE4D188D30474AF0A1BB796D8EFA15353973A0EEC3427675789C1783024474696D6582034980EFCBB1A5FEF5E616697369676E61747572655830A754B5AE47F254B23420F17E71265CDAF64D34BA002BA88578FDF3CD9B2436FE5A3B7A2245E6DCF4A574169EB72DD4DF6A64656C65676174696F6EA2697375626E65745F6964581DCF9D54E35F653FD0FD4FF05E9C020923B719429C9A3139BEAAF4871B026B6365727469666963617465590199D9D9F7A26474726565830182045820E82F4E336F033E15D337975AF1617E1030F4C6F9F53FCF89A48E861F75C5C98483018302467375626E6574830182045820FB286DDA6CB7FE72AF261F5C896D51CBF82F233679907A1CB7E7299B44F5E23D8302581DCF9D54E35F653FD0FD4FF05E9C020923B719429C9A3139BEAAF4871B02830183024F63616E69737465725F72616E6765738203581BD9D9F781824A000000000010000001014A00000000001FFFFF010183024A7075626C69635F6B657982035885308182301D060D2B0601040182DC7C0503010201060C2B0601040182DC7C0503020103610088EB824FC43459023B08806C56AC224EDEA54AF7A656D96F6E909906B7442AC65A60D2C0B831425B0376674430E48F1D09658CD3F86BDD8607199401422C8B641C43F58740F52B497136E70B62522AEF12A6DB95ECBA58123D44D9B2E852B40883024474696D6582034987A5E7EB83F2E3E416697369676E6174757265583091EC641476446FFA0AB613BE624664BFEC32F7AC20B7E943EA7DACE1B7247101CA5B3CD6DFF38E6276BD6A7AF6C0587F";
const REAL_ROOT_KEY: &str = "308182301D060D2B0601040182DC7C0503010201060C2B0601040182DC7C05030201036100923A67B791270CD8F5320212AE224377CF407D3A8A2F44F11FED5915A97EE67AD0E90BC382A44A3F14C363AD2006640417B4BBB3A304B97088EC6B4FC87A25558494FC239B47E129260232F79973945253F5036FD520DDABD1E2DE57ABFB40CB";

fn canister_id(n: u8) -> Principal {
    Principal::from_slice(&[0, 0, 0, 0, 0, 0, 0, n, 1, 1])
}

fn subnet_id(n: u8) -> Principal {
    Principal::from_slice(&[n; 29])
}

fn random_certified_data() -> Vec<u8> {
    let mut rng = ChaCha20Rng::seed_from_u64(7);
    (0..32).map(|_| rng.gen()).collect()
}

fn canister_data(canister_id: Principal) -> ic_client_certification_test_utils::CertificateData {
    CanisterData {
        canister_id,
        certified_data: random_certified_data(),
    }
}

fn subnet_data(
    ranges: Vec<(Principal, Principal)>,
) -> ic_client_certification_test_utils::CertificateData {
    SubnetData {
        subnet_id: subnet_id(1),
        canister_id_ranges: ranges,
    }
}

fn verifier() -> CertificateVerifier {
    CertificateVerifier::new(VerifierConfig::default())
}

fn assert_rejected(result: Result<Certificate, CertificateError>) -> VerificationFailure {
    match result {
        Err(CertificateError::CertificateVerificationFailed { reason }) => reason,
        other => panic!("expected a failed verification, got {:?}", other),
    }
}

#[test]
fn should_validate_subnet_delegation_test_vector() {
    // Issued on a testnet for a canister on an application subnet.
    let bytes = hex::decode(REAL_CERTIFICATE).unwrap();
    let root_key = PublicKey::from_der(&hex::decode(REAL_ROOT_KEY).unwrap()).unwrap();
    let canister = Principal::from_text("5v3p4-iyaaa-aaaaa-qaaaa-cai").unwrap();

    let certificate = verify_certificate_bytes(&bytes, &root_key, Some(canister))
        .expect("expect valid signature");

    assert_eq!(certificate.time(), Ok(1_643_206_874_888_337_280));
    let certified_data: [u8; 32] = [
        97, 157, 2, 69, 59, 85, 186, 142, 160, 29, 161, 210, 109, 247, 8, 54, 68, 235, 232, 74,
        151, 175, 200, 212, 236, 231, 248, 36, 83, 84, 142, 170,
    ];
    assert_eq!(
        certificate.lookup(&[
            b"canister".as_slice(),
            canister.as_slice(),
            b"certified_data"
        ]),
        LookupResult::Found(&certified_data)
    );
}

#[test]
fn should_reject_test_vector_for_canister_outside_delegation() {
    let bytes = hex::decode(REAL_CERTIFICATE).unwrap();
    let root_key = PublicKey::from_der(&hex::decode(REAL_ROOT_KEY).unwrap()).unwrap();

    let reason = assert_rejected(verify_certificate_bytes(
        &bytes,
        &root_key,
        Some(Principal::from_text("ryjl3-tyaaa-aaaaa-aaaba-cai").unwrap()),
    ));
    assert_matches!(reason, VerificationFailure::CanisterOutOfRange { .. });
}

#[test]
fn should_validate_certificate_without_delegation() {
    let (_cert, pk, cbor) = CertificateBuilder::new(canister_data(canister_id(1))).build();

    verifier()
        .verify_certificate_bytes(&cbor, &pk, Some(canister_id(1)))
        .expect("expect valid signature");
}

#[test]
fn should_return_correct_time() {
    let (_cert, pk, cbor) = CertificateBuilder::new(canister_data(canister_id(1)))
        .with_time(1)
        .build();

    let certificate = verifier()
        .verify_certificate_bytes(&cbor, &pk, None)
        .expect("expect valid signature");
    assert_eq!(certificate.time(), Ok(1));
}

#[test]
fn should_reject_certificate_signed_by_other_key() {
    let (_cert, _pk, cbor) = CertificateBuilder::new(canister_data(canister_id(1))).build();
    let other = SigningKey::from_seed(99).public_key();

    let reason = assert_rejected(verifier().verify_certificate_bytes(&cbor, &other, None));
    assert_matches!(reason, VerificationFailure::SignatureMismatch { .. });
}

#[test]
fn should_reject_any_flipped_signature_byte() {
    let (cert, pk, _cbor) = CertificateBuilder::new(canister_data(canister_id(1))).build();

    for i in 0..cert.signature.len() {
        let mut garbled = cert.clone();
        garbled.signature[i] ^= 0x01;
        assert_matches!(
            verifier().verify(&garbled, &pk, None),
            Err(CertificateError::CertificateVerificationFailed { .. }),
            "flipping signature byte {} was not detected",
            i
        );
    }
}

#[test]
fn should_reject_flipped_leaf_byte() {
    let (cert, pk, _cbor) = CertificateBuilder::new(canister_data(canister_id(1)))
        .with_time(12345)
        .build();
    let mut garbled = cert.clone();
    garbled.tree = match garbled.tree {
        HashTree::Fork(lr) => {
            let (left, right) = *lr;
            let right = match right {
                HashTree::Labeled(label, subtree) => match *subtree {
                    HashTree::Leaf(mut time) => {
                        time[0] ^= 0x01;
                        HashTree::labeled(label, HashTree::Leaf(time))
                    }
                    other => panic!("expected the time leaf, got {:?}", other),
                },
                other => panic!("expected /time, got {:?}", other),
            };
            HashTree::fork(left, right)
        }
        other => panic!("expected a fork at the root, got {:?}", other),
    };
    assert_ne!(garbled.tree.digest(), cert.tree.digest());

    let reason = assert_rejected(
        verifier()
            .verify(&garbled, &pk, None)
            .map(|()| garbled.clone()),
    );
    assert_matches!(reason, VerificationFailure::SignatureMismatch { .. });
}

#[test]
fn should_validate_certificate_with_delegation() {
    let (_cert, pk, cbor) = CertificateBuilder::new(canister_data(canister_id(1)))
        .with_delegation(CertificateBuilder::new(subnet_data(vec![(
            canister_id(0),
            canister_id(10),
        )])))
        .build();

    verifier()
        .verify_certificate_bytes(&cbor, &pk, Some(canister_id(1)))
        .expect("expect valid signature");
}

#[test]
fn should_validate_canister_ids_at_range_bounds() {
    for cid in [canister_id(0), canister_id(10)] {
        let (_cert, pk, cbor) = CertificateBuilder::new(canister_data(cid))
            .with_delegation(CertificateBuilder::new(subnet_data(vec![(
                canister_id(0),
                canister_id(10),
            )])))
            .build();

        verifier()
            .verify_certificate_bytes(&cbor, &pk, Some(cid))
            .expect("expect valid signature");
    }
}

#[test]
fn should_validate_certificate_with_multiple_canister_id_ranges() {
    let cid = canister_id(9);
    let (_cert, pk, cbor) = CertificateBuilder::new(canister_data(cid))
        .with_delegation(CertificateBuilder::new(subnet_data(vec![
            (canister_id(0), canister_id(3)),
            (canister_id(5), canister_id(7)),
            (canister_id(9), canister_id(9)),
        ])))
        .build();

    verifier()
        .verify_certificate_bytes(&cbor, &pk, Some(cid))
        .expect("expect valid signature");
}

#[test]
fn should_reject_canister_outside_delegated_ranges() {
    let cid = canister_id(4);
    let (_cert, pk, cbor) = CertificateBuilder::new(canister_data(cid))
        .with_delegation(CertificateBuilder::new(subnet_data(vec![
            (canister_id(0), canister_id(3)),
            (canister_id(5), canister_id(7)),
        ])))
        .build();

    let reason = assert_rejected(verifier().verify_certificate_bytes(&cbor, &pk, Some(cid)));
    assert_eq!(
        reason,
        VerificationFailure::CanisterOutOfRange {
            canister_id: cid,
            subnet_id: subnet_id(1),
        }
    );

    // Without range checks the delegation itself is still valid.
    let unchecked = CertificateVerifier::new(VerifierConfig {
        check_canister_ranges: false,
        ..VerifierConfig::default()
    });
    unchecked
        .verify_certificate_bytes(&cbor, &pk, Some(cid))
        .expect("expect valid signature");
}

#[test]
fn should_reject_delegation_vouching_for_other_key() {
    let (_cert, pk, cbor) = CertificateBuilder::new(canister_data(canister_id(1)))
        .with_published_key(SigningKey::from_seed(99).public_key())
        .with_delegation(CertificateBuilder::new(subnet_data(vec![(
            canister_id(0),
            canister_id(10),
        )])))
        .build();

    let reason = assert_rejected(verifier().verify_certificate_bytes(&cbor, &pk, None));
    assert_matches!(reason, VerificationFailure::SignatureMismatch { .. });
}

#[test]
fn should_reject_delegation_for_other_subnet() {
    let (mut cert, pk, _cbor) = CertificateBuilder::new(canister_data(canister_id(1)))
        .with_delegation(CertificateBuilder::new(subnet_data(vec![(
            canister_id(0),
            canister_id(10),
        )])))
        .build();
    if let Some(delegation) = cert.delegation.as_mut() {
        delegation.subnet_id = subnet_id(2);
    }

    let reason = assert_rejected(verifier().verify_certificate_bytes(&cert.to_cbor(), &pk, None));
    assert_eq!(
        reason,
        VerificationFailure::SubnetKeyMissing {
            subnet_id: subnet_id(2)
        }
    );
    let reason = assert_rejected(verifier().verify_certificate_bytes(
        &cert.to_cbor(),
        &pk,
        Some(canister_id(1)),
    ));
    assert_eq!(
        reason,
        VerificationFailure::CanisterRangesMissing {
            subnet_id: subnet_id(2)
        }
    );
}

#[test]
fn should_reject_delegation_not_signed_by_root() {
    let (_cert, pk, cbor) = CertificateBuilder::new(canister_data(canister_id(1)))
        .with_delegation(CertificateBuilder::new(subnet_data(vec![(
            canister_id(0),
            canister_id(10),
        )])))
        .build();
    let impostor = SigningKey::from_seed(99).public_key();
    assert_ne!(impostor, pk);

    let reason = assert_rejected(verifier().verify_certificate_bytes(&cbor, &impostor, None));
    assert_matches!(reason, VerificationFailure::SignatureMismatch { .. });
}

#[test]
fn should_reject_delegation_without_subnet_key() {
    let root = SigningKey::from_seed(1);
    let subnet = SigningKey::from_seed(2);
    let (delegation_cert, _, _) = CertificateBuilder::new(CustomTree(HashTree::labeled(
        "time",
        HashTree::leaf(vec![1]),
    )))
    .with_signing_key(root.clone())
    .build();
    let (mut cert, _, _) = CertificateBuilder::new(canister_data(canister_id(1)))
        .with_signing_key(subnet)
        .build();
    // The delegation is not covered by the outer signature.
    cert.delegation = Some(ic_client_certification::Delegation {
        subnet_id: subnet_id(1),
        certificate: Box::new(delegation_cert),
    });

    let reason = assert_rejected(
        verifier()
            .verify(&cert, &root.public_key(), None)
            .map(|()| cert.clone()),
    );
    assert_eq!(
        reason,
        VerificationFailure::SubnetKeyMissing {
            subnet_id: subnet_id(1)
        }
    );
}

fn two_level_delegation() -> (PublicKey, Vec<u8>) {
    let (_cert, pk, cbor) = CertificateBuilder::new(canister_data(canister_id(1)))
        .with_delegation(
            CertificateBuilder::new(subnet_data(vec![(canister_id(0), canister_id(10))]))
                .with_delegation(CertificateBuilder::new(SubnetData {
                    subnet_id: subnet_id(1),
                    canister_id_ranges: vec![(canister_id(0), canister_id(10))],
                })),
        )
        .build();
    (pk, cbor)
}

#[test]
fn should_reject_nested_delegations_by_default() {
    let (pk, cbor) = two_level_delegation();

    let reason =
        assert_rejected(verifier().verify_certificate_bytes(&cbor, &pk, Some(canister_id(1))));
    assert_eq!(reason, VerificationFailure::DelegationTooDeep { max_depth: 1 });
}

#[test]
fn should_follow_nested_delegations_when_allowed() {
    let (pk, cbor) = two_level_delegation();
    let verifier = CertificateVerifier::new(VerifierConfig {
        max_delegation_depth: 2,
        ..VerifierConfig::default()
    });

    verifier
        .verify_certificate_bytes(&cbor, &pk, Some(canister_id(1)))
        .expect("expect valid signature");
}

#[test]
fn should_report_undecodable_certificates_as_failed_verification() {
    let (_cert, pk, _cbor) = CertificateBuilder::new(canister_data(canister_id(1))).build();

    let reason = assert_rejected(verifier().verify_certificate_bytes(&[0xd9, 0xd9], &pk, None));
    assert_matches!(reason, VerificationFailure::Malformed(_));

    // {"tree": [9], "signature": h''}
    let unknown_node = hex::decode("a264747265658109697369676e617475726540").unwrap();
    let reason = assert_rejected(verifier().verify_certificate_bytes(&unknown_node, &pk, None));
    assert_matches!(
        reason,
        VerificationFailure::Malformed(message) if message.contains("unsupported hash tree node type 9")
    );
}

#[test]
fn should_read_verifier_config_from_json() {
    let config: VerifierConfig =
        serde_json::from_str(r#"{"max_delegation_depth": 3}"#).expect("valid config");
    assert_eq!(
        config,
        VerifierConfig {
            max_delegation_depth: 3,
            ..VerifierConfig::default()
        }
    );
}

#[derive(Clone, Default)]
struct RecordingDrain(Arc<Mutex<Vec<(Level, String)>>>);

impl Drain for RecordingDrain {
    type Ok = ();
    type Err = Never;

    fn log(&self, record: &Record, _values: &OwnedKVList) -> Result<(), Never> {
        if let Ok(mut records) = self.0.lock() {
            records.push((record.level(), record.msg().to_string()));
        }
        Ok(())
    }
}

#[test]
fn should_log_rejections_as_warnings() {
    let drain = RecordingDrain::default();
    let verifier = verifier().with_logger(Logger::root(drain.clone(), o!()));
    let (_cert, _pk, cbor) = CertificateBuilder::new(canister_data(canister_id(1))).build();

    let _ = verifier.verify_certificate_bytes(&cbor, &SigningKey::from_seed(99).public_key(), None);

    let records = drain.0.lock().unwrap();
    assert!(records
        .iter()
        .any(|(level, msg)| *level == Level::Warning && msg.starts_with("certificate rejected")));
    assert!(records.iter().any(|(level, msg)| *level == Level::Debug && msg == "start"));
}
