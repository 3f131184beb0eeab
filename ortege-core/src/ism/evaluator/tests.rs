use ethers_signers::{LocalWallet, Signer};
use itertools::Itertools;
use maplit::btreemap;

use crate::{EcdsaSignatureVerifier, H160};

use super::*;

fn wallet(seed: u8) -> LocalWallet {
    LocalWallet::from_bytes(&[seed; 32]).unwrap()
}

fn wallets(seeds: impl IntoIterator<Item = u8>) -> Vec<LocalWallet> {
    seeds.into_iter().map(wallet).collect()
}

fn addresses(wallets: &[LocalWallet]) -> Vec<H160> {
    wallets.iter().map(|w| w.address()).collect()
}

fn checkpoint() -> Checkpoint {
    Checkpoint {
        merkle_tree_hook_address: H256::repeat_byte(0xab),
        mailbox_domain: 1,
        root: H256::repeat_byte(0xcd),
        index: 99,
    }
}

fn message_id() -> H256 {
    H256::repeat_byte(0xef)
}

fn merkle_root_signatures(signers: &[LocalWallet]) -> Vec<Bytes> {
    let digest = checkpoint().eth_signed_message_hash();
    signers
        .iter()
        .map(|w| Bytes::from(w.sign_hash(digest).to_vec()))
        .collect()
}

fn message_id_signatures(signers: &[LocalWallet]) -> Vec<Bytes> {
    let digest = CheckpointWithMessageId {
        checkpoint: checkpoint(),
        message_id: message_id(),
    }
    .eth_signed_message_hash();
    signers
        .iter()
        .map(|w| Bytes::from(w.sign_hash(digest).to_vec()))
        .collect()
}

fn evidence(signatures: Vec<Bytes>) -> IsmEvidence {
    IsmEvidence {
        checkpoint: checkpoint(),
        message_id: Some(message_id()),
        signatures,
    }
}

fn merkle_root_multisig(validators: &[LocalWallet], threshold: u8) -> IsmConfig {
    IsmConfig::MerkleRootMultisig(MultisigIsmConfig {
        validators: addresses(validators),
        threshold,
    })
}

fn message_id_multisig(validators: &[LocalWallet], threshold: u8) -> IsmConfig {
    IsmConfig::MessageIdMultisig(MultisigIsmConfig {
        validators: addresses(validators),
        threshold,
    })
}

fn evaluator() -> IsmEvaluator<EcdsaSignatureVerifier> {
    IsmEvaluator::new(EcdsaSignatureVerifier)
}

fn origin() -> ChainName {
    "ethereum".into()
}

#[test]
fn multisig_accepts_at_threshold_and_rejects_below() {
    let validators = wallets(1..=5);
    let ism = merkle_root_multisig(&validators, 3);

    let enough = evidence(merkle_root_signatures(&validators[..3]));
    assert!(evaluator().evaluate(&ism, &origin(), &enough).unwrap());

    let short = evidence(merkle_root_signatures(&validators[..2]));
    assert!(!evaluator().evaluate(&ism, &origin(), &short).unwrap());
}

#[test]
fn repeated_signatures_from_one_validator_count_once() {
    let validators = wallets(1..=3);
    let ism = merkle_root_multisig(&validators, 2);

    let repeated = [validators[0].clone(), validators[0].clone()];
    let evidence = evidence(merkle_root_signatures(&repeated));
    assert!(!evaluator().evaluate(&ism, &origin(), &evidence).unwrap());
}

#[test]
fn signatures_from_outsiders_are_ignored() {
    let validators = wallets(1..=3);
    let outsiders = wallets(10..=12);
    let ism = merkle_root_multisig(&validators, 1);

    let evidence = evidence(merkle_root_signatures(&outsiders));
    assert!(!evaluator().evaluate(&ism, &origin(), &evidence).unwrap());
}

#[test]
fn multisig_variants_sign_different_digests() {
    let validators = wallets(1..=2);

    let merkle_signed = evidence(merkle_root_signatures(&validators));
    assert!(!evaluator()
        .evaluate(&message_id_multisig(&validators, 1), &origin(), &merkle_signed)
        .unwrap());

    let id_signed = evidence(message_id_signatures(&validators));
    assert!(evaluator()
        .evaluate(&message_id_multisig(&validators, 2), &origin(), &id_signed)
        .unwrap());
    assert!(!evaluator()
        .evaluate(&merkle_root_multisig(&validators, 1), &origin(), &id_signed)
        .unwrap());
}

#[test]
fn message_id_multisig_without_message_id_is_malformed() {
    let validators = wallets(1..=2);
    let mut evidence = evidence(message_id_signatures(&validators));
    evidence.message_id = None;

    let result = evaluator().evaluate(&message_id_multisig(&validators, 1), &origin(), &evidence);
    assert!(matches!(result, Err(IsmError::MalformedEvidence(_))));
}

#[test]
fn short_signature_is_malformed() {
    let validators = wallets(1..=2);
    let evidence = evidence(vec![Bytes::from(vec![0u8; 64])]);

    let result = evaluator().evaluate(&merkle_root_multisig(&validators, 1), &origin(), &evidence);
    assert!(matches!(result, Err(IsmError::MalformedEvidence(_))));
}

#[test]
fn aggregation_of_both_multisigs_with_threshold_one() {
    let validators = wallets(1..=3);
    let ism = IsmConfig::Aggregation(AggregationIsmConfig {
        modules: vec![
            merkle_root_multisig(&validators, 2),
            message_id_multisig(&validators, 2),
        ],
        threshold: 1,
    });

    // only the message id module is satisfied
    let id_signed = evidence(message_id_signatures(&validators[..2]));
    assert!(evaluator().evaluate(&ism, &origin(), &id_signed).unwrap());

    let nobody = evidence(message_id_signatures(&validators[..1]));
    assert!(!evaluator().evaluate(&ism, &origin(), &nobody).unwrap());
}

#[test]
fn aggregation_outcome_does_not_depend_on_child_order() {
    let validators = wallets(1..=3);
    let children = vec![
        merkle_root_multisig(&validators, 1),
        merkle_root_multisig(&validators, 3),
        message_id_multisig(&validators, 1),
        merkle_root_multisig(&validators[..1], 1),
    ];
    // merkle signatures from the first two validators: children 0 and 3 accept
    let evidence = evidence(merkle_root_signatures(&validators[..2]));

    for threshold in 1..=4u8 {
        let expected = threshold <= 2;
        for order in children.iter().cloned().permutations(children.len()) {
            let ism = IsmConfig::Aggregation(AggregationIsmConfig {
                modules: order,
                threshold,
            });
            assert_eq!(
                evaluator().evaluate(&ism, &origin(), &evidence).unwrap(),
                expected,
                "threshold {threshold}"
            );
        }
    }
}

#[test]
fn routing_without_route_is_an_error_not_a_rejection() {
    let validators = wallets(1..=2);
    let ism = IsmConfig::Routing(RoutingIsmConfig {
        owner: H160::repeat_byte(0x77),
        domains: btreemap! { "polygon".into() => merkle_root_multisig(&validators, 1) },
    });
    let evidence = evidence(merkle_root_signatures(&validators));

    match evaluator().evaluate(&ism, &origin(), &evidence) {
        Err(IsmError::NoRoute { origin }) => assert_eq!(origin.as_str(), "ethereum"),
        other => panic!("expected no route, got {other:?}"),
    }
    assert!(evaluator()
        .evaluate(&ism, &"polygon".into(), &evidence)
        .unwrap());
}

#[test]
fn unrouted_origin_inside_aggregation_is_an_error_in_any_order() {
    let validators = wallets(1..=2);
    let unrouted = IsmConfig::Routing(RoutingIsmConfig {
        owner: H160::repeat_byte(0x77),
        domains: Default::default(),
    });
    let evidence = evidence(merkle_root_signatures(&validators));

    for threshold in 1..=2u8 {
        for order in [
            vec![unrouted.clone(), merkle_root_multisig(&validators, 1)],
            vec![merkle_root_multisig(&validators, 1), unrouted.clone()],
        ] {
            let ism = IsmConfig::Aggregation(AggregationIsmConfig {
                modules: order,
                threshold,
            });
            assert!(matches!(
                evaluator().evaluate(&ism, &origin(), &evidence),
                Err(IsmError::NoRoute { .. })
            ));
        }
    }
}

#[test]
fn routes_for_other_origins_are_not_checked() {
    let validators = wallets(1..=2);
    let evidence = evidence(merkle_root_signatures(&validators));
    // the polygon branch routes nowhere, but an ethereum message never reaches it
    let ism = IsmConfig::Routing(RoutingIsmConfig {
        owner: H160::repeat_byte(0x77),
        domains: btreemap! {
            "ethereum".into() => merkle_root_multisig(&validators, 1),
            "polygon".into() => IsmConfig::Routing(RoutingIsmConfig {
                owner: H160::repeat_byte(0x78),
                domains: Default::default(),
            }),
        },
    });
    assert!(evaluator().evaluate(&ism, &origin(), &evidence).unwrap());
}

#[test]
fn aggregated_children_with_malformed_evidence_count_as_rejections() {
    let validators = wallets(1..=2);
    // no message id, so the message id multisig has no verdict
    let evidence = IsmEvidence {
        message_id: None,
        ..evidence(merkle_root_signatures(&validators))
    };

    for order in [
        vec![message_id_multisig(&validators, 1), merkle_root_multisig(&validators, 1)],
        vec![merkle_root_multisig(&validators, 1), message_id_multisig(&validators, 1)],
    ] {
        let ism = IsmConfig::Aggregation(AggregationIsmConfig {
            modules: order.clone(),
            threshold: 1,
        });
        assert!(evaluator().evaluate(&ism, &origin(), &evidence).unwrap());
        let ism = IsmConfig::Aggregation(AggregationIsmConfig {
            modules: order,
            threshold: 2,
        });
        assert!(!evaluator().evaluate(&ism, &origin(), &evidence).unwrap());
    }
}

#[test]
fn zero_threshold_anywhere_in_the_tree_has_no_verdict() {
    let validators = wallets(1..=2);
    let evidence = evidence(merkle_root_signatures(&validators));
    // the first child alone would satisfy the aggregation
    let ism = IsmConfig::Aggregation(AggregationIsmConfig {
        modules: vec![
            merkle_root_multisig(&validators, 1),
            merkle_root_multisig(&validators, 0),
        ],
        threshold: 1,
    });
    assert!(matches!(
        evaluator().evaluate(&ism, &origin(), &evidence),
        Err(IsmError::ZeroThreshold { depth: 2 })
    ));
}

#[test]
fn zero_threshold_has_no_verdict() {
    let validators = wallets(1..=2);
    let evidence = evidence(merkle_root_signatures(&validators));
    assert!(matches!(
        evaluator().evaluate(&merkle_root_multisig(&validators, 0), &origin(), &evidence),
        Err(IsmError::ZeroThreshold { depth: 1 })
    ));
}

#[test]
fn trees_deeper_than_max_depth_are_refused() {
    let validators = wallets(1..=1);
    let mut ism = merkle_root_multisig(&validators, 1);
    for _ in 0..ISM_MAX_DEPTH {
        ism = IsmConfig::Aggregation(AggregationIsmConfig {
            modules: vec![ism],
            threshold: 1,
        });
    }
    let evidence = evidence(merkle_root_signatures(&validators));
    assert!(matches!(
        evaluator().evaluate(&ism, &origin(), &evidence),
        Err(IsmError::MaxDepthExceeded(_))
    ));
}
