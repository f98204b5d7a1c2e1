//! Invariant tests for key resolution
//!
//! These tests verify invariants that must always hold:
//! - An identity is assigned exactly one key
//! - Retrieval reconstructs the key behind the resolved address
//! - Secret material never reaches Debug or error output

use futures::future::join_all;
use k256::Scalar;
use key_resolver_core::{
    FixedClock, KeyResolver, PrivateKey, ResolverConfig, VerifierIdentity,
    crypto::EphemeralKeyPair,
    metadata::MemoryMetadata,
    node::{Fault, MemoryNodeNetwork, RpcMethod},
};
use serde_json::json;

const ID_TOKEN: &str = "header.payload-with-claims.signature";

fn resolver(network: &MemoryNodeNetwork) -> KeyResolver<MemoryNodeNetwork, MemoryMetadata> {
    KeyResolver::new(
        network.clone(),
        MemoryMetadata::new(),
        ResolverConfig::new(network.threshold()),
    )
    .unwrap()
    .with_clock(FixedClock(1_700_000_000))
    .with_node_public_keys(network.node_public_keys())
}

// ============================================================================
// Assignment Invariants
// ============================================================================

/// INVARIANT: Concurrent resolutions of one identity agree on a single key
#[tokio::test]
async fn invariant_single_key_under_concurrent_resolution() {
    let network = MemoryNodeNetwork::new(5, 3).unwrap();
    let resolver = resolver(&network);
    let endpoints = network.endpoints();
    let node_keys = network.node_public_keys();
    let identity = VerifierIdentity::new("github", "octocat");

    let results = join_all(
        (0..8).map(|_| resolver.resolve_address(&endpoints, &node_keys, &identity, false)),
    )
    .await;

    let addresses: Vec<String> = results.into_iter().map(|r| r.unwrap().address).collect();
    assert!(addresses.iter().all(|a| *a == addresses[0]));
    assert_eq!(network.key_generations(), 1);
}

/// INVARIANT: Distinct identities never share a key
#[tokio::test]
async fn invariant_distinct_identities_distinct_keys() {
    let network = MemoryNodeNetwork::new(3, 2).unwrap();
    let resolver = resolver(&network);
    let endpoints = network.endpoints();

    let mut addresses = Vec::new();
    for id in ["a@example.com", "b@example.com", "c@example.com"] {
        let identity = VerifierIdentity::new("google", id);
        let info = resolver
            .resolve_address(&endpoints, &network.node_public_keys(), &identity, false)
            .await
            .unwrap();
        addresses.push(info.address);
    }

    addresses.sort();
    addresses.dedup();
    assert_eq!(addresses.len(), 3);
    assert_eq!(network.key_generations(), 3);
}

// ============================================================================
// Reconstruction Invariants
// ============================================================================

/// INVARIANT: The retrieved key always controls the resolved address
#[tokio::test]
async fn invariant_retrieved_key_matches_address() {
    for (nodes, threshold) in [(1, 1), (3, 2), (4, 3), (5, 3), (7, 4)] {
        let network = MemoryNodeNetwork::new(nodes, threshold).unwrap();
        let resolver = resolver(&network);
        let identity = VerifierIdentity::new("google", format!("user-{}", nodes));

        let info = resolver
            .resolve_address(&network.endpoints(), &network.node_public_keys(), &identity, false)
            .await
            .unwrap();
        let retrieved = resolver
            .retrieve_shares(&network.endpoints(), &identity, ID_TOKEN, json!({}))
            .await
            .unwrap();

        assert_eq!(
            retrieved.public_address, info.address,
            "{}-of-{} network returned a different key",
            threshold, nodes
        );
        assert_eq!(retrieved.private_key.address().unwrap(), info.address);
    }
}

/// INVARIANT: A retrieval never returns a key other than the assigned one
#[tokio::test]
async fn invariant_no_key_from_bad_shares() {
    let network = MemoryNodeNetwork::new(5, 3).unwrap();
    let identity = VerifierIdentity::new("google", "alice@example.com");
    let key = PrivateKey::from_scalar(&Scalar::from(99u64));
    network.insert_key(identity.clone(), &key).unwrap();
    let resolver = resolver(&network);

    for faulty in 1..=5 {
        network.clear_faults();
        for node in 0..faulty {
            network.set_fault(node, RpcMethod::Share, Fault::WrongShare);
        }
        let result = resolver
            .retrieve_shares(&network.endpoints(), &identity, ID_TOKEN, json!({}))
            .await;
        if let Ok(retrieved) = result {
            assert_eq!(retrieved.private_key, key);
        }
    }
}

// ============================================================================
// Secrecy Invariants
// ============================================================================

/// INVARIANT: Debug output never contains secret material
#[tokio::test]
async fn invariant_secrets_redacted() {
    let network = MemoryNodeNetwork::new(3, 2).unwrap();
    let identity = VerifierIdentity::new("google", "alice@example.com");
    let resolver = resolver(&network);

    let retrieved = resolver
        .retrieve_shares(&network.endpoints(), &identity, ID_TOKEN, json!({}))
        .await
        .unwrap();
    let secret_hex = retrieved.private_key.to_hex();

    let rendered = format!("{:?}", retrieved);
    assert!(!rendered.contains(secret_hex.as_str()));
    assert!(rendered.contains(&retrieved.public_address));

    let ephemeral = EphemeralKeyPair::generate().unwrap();
    let rendered = format!("{:?}", ephemeral);
    assert!(rendered.contains("[REDACTED]"));
    assert!(rendered.contains(&ephemeral.public_x_hex()));
}

/// INVARIANT: Failures never echo the id token
#[tokio::test]
async fn invariant_errors_omit_token() {
    let network = MemoryNodeNetwork::new(3, 2).unwrap();
    let identity = VerifierIdentity::new("google", "alice@example.com");
    let resolver = resolver(&network);
    network.set_fault_all(RpcMethod::Share, Fault::CorruptSignature);

    let err = resolver
        .retrieve_shares(&network.endpoints(), &identity, ID_TOKEN, json!({}))
        .await
        .unwrap_err();

    assert!(!err.to_string().contains(ID_TOKEN));
    assert!(!format!("{:?}", err).contains(ID_TOKEN));
}
