//! Properties of chains built through the public API.

use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use scribe_chain::signer::{self, ArmoredKeyPair};
use scribe_chain::{Block, Chain, ChainError, Payload, SignatureError, GENESIS_BLOCK_HASH};
use serde_json::json;

const PASSPHRASE: &str = "integration passphrase";

static KEYS: Lazy<ArmoredKeyPair> =
    Lazy::new(|| signer::generate_keypair(PASSPHRASE).expect("generate keypair"));

fn payload(n: usize) -> Payload {
    let mut payload = Payload::new();
    payload.insert("table".to_string(), json!("orders"));
    payload.insert("row".to_string(), json!(n));
    payload
}

static SIGNER: Lazy<Chain> = Lazy::new(|| {
    let mut chain = Chain::init(KEYS.public_key.clone(), vec![]);
    chain.set_auth(KEYS.private_key.clone(), PASSPHRASE);
    chain
});

fn build_chain(len: usize) -> Chain {
    let mut chain = SIGNER.working_set(false);
    chain.generate_genesis().expect("genesis");
    for n in 1..len {
        chain
            .append_block(Block::new("orders-service", payload(n), &["write"]))
            .expect("append");
    }
    chain
}

#[test]
fn test_genesis_hash_is_independent_of_keys() {
    let other = signer::generate_keypair("another passphrase").unwrap();
    let mut chain = Chain::init(other.public_key.clone(), vec![]);
    chain.set_auth(other.private_key.clone(), "another passphrase");

    let genesis = chain.generate_genesis().unwrap();
    assert_eq!(genesis.hash, GENESIS_BLOCK_HASH);
    assert_eq!(genesis.hash, build_chain(1).blocks()[0].hash);
}

#[test]
fn test_every_block_links_to_its_predecessor() {
    let chain = build_chain(6);

    for (idx, pair) in chain.blocks().windows(2).enumerate() {
        let (prev, next) = (&pair[0], &pair[1]);
        assert_eq!(next.seq_id, idx as u64 + 1);
        assert_eq!(next.last_block_id, prev.id);
        assert_eq!(next.last_block_hash, prev.hash);
        assert_eq!(next.compute_hash(), next.hash);
    }
}

#[test]
fn test_signature_covers_id_and_hash() {
    let chain = build_chain(2);
    let block = &chain.blocks()[1];
    let verifier = signer::load_public_key(&KEYS.public_key).unwrap();

    let message = format!("{}.{}", block.id, block.hash);
    assert!(signer::verify(&verifier, message.as_bytes(), &block.signature, Utc::now()).is_ok());
    assert!(matches!(
        signer::verify(&verifier, b"something else", &block.signature, Utc::now()),
        Err(SignatureError::Invalid)
    ));
}

#[test]
fn test_signature_is_not_valid_before_it_was_made() {
    let chain = build_chain(2);
    let block = &chain.blocks()[1];
    let verifier = signer::load_public_key(&KEYS.public_key).unwrap();

    let before = block.signed_at.unwrap() - Duration::hours(1);
    assert!(matches!(
        signer::verify(
            &verifier,
            block.signable_representation().as_bytes(),
            &block.signature,
            before
        ),
        Err(SignatureError::NotYetValid { .. })
    ));
}

#[test]
fn test_any_contiguous_window_validates() {
    let chain = build_chain(6);

    for start in 0..chain.len() {
        for end in start + 1..=chain.len() {
            let mut window = chain.working_set(start == 0);
            window.load_segment(chain.blocks()[start..end].to_vec());
            assert!(
                window.validate().is_ok(),
                "window {start}..{end} should validate"
            );
        }
    }
}

#[test]
fn test_window_with_a_hole_is_rejected() {
    let chain = build_chain(5);
    let mut blocks = chain.blocks()[1..].to_vec();
    blocks.remove(1);

    let mut window = chain.working_set(false);
    window.load_segment(blocks);
    assert!(matches!(
        window.validate(),
        Err(ChainError::BrokenLink { seq_id: 3, .. })
    ));
}

#[test]
fn test_verify_only_chain_cannot_extend() {
    let source = build_chain(2);
    let mut reader = Chain::init(KEYS.public_key.clone(), source.blocks().to_vec());

    assert!(reader.validate().is_ok());
    assert!(matches!(
        reader.append_block(Block::new("orders-service", payload(9), &[] as &[&str])),
        Err(ChainError::NotInitialized(_))
    ));
}

#[test]
fn test_tags_are_outside_the_hash() {
    let chain = build_chain(3);
    let mut blocks = chain.blocks().to_vec();
    blocks[1].tags = "relabelled".to_string();

    let relabelled = Chain::init(KEYS.public_key.clone(), blocks);
    assert!(relabelled.validate().is_ok());
}
