//! Integration tests for address resolution
//!
//! - Lookup of existing keys
//! - Assignment of exactly one key for new identities
//! - Nonce-adjusted addresses

use k256::Scalar;
use key_resolver_core::{
    Error, KeyResolver, PrivateKey, ResolverConfig, VerifierIdentity,
    metadata::MemoryMetadata,
    node::{Fault, MemoryNodeNetwork, RpcMethod},
};

type TestResolver = KeyResolver<MemoryNodeNetwork, MemoryMetadata>;

fn setup(nodes: usize, threshold: usize) -> (MemoryNodeNetwork, MemoryMetadata, TestResolver) {
    let network = MemoryNodeNetwork::new(nodes, threshold).unwrap();
    let metadata = MemoryMetadata::new();
    let resolver = KeyResolver::new(
        network.clone(),
        metadata.clone(),
        ResolverConfig::new(threshold),
    )
    .unwrap();
    (network, metadata, resolver)
}

fn identity() -> VerifierIdentity {
    VerifierIdentity::new("google", "alice@example.com")
}

// ============================================================================
// Assignment
// ============================================================================

#[tokio::test]
async fn test_new_identity_assigned_exactly_once() {
    let (network, _, resolver) = setup(5, 3);
    let endpoints = network.endpoints();
    let node_keys = network.node_public_keys();

    let first = resolver
        .resolve_address(&endpoints, &node_keys, &identity(), false)
        .await
        .unwrap();

    assert_eq!(network.key_generations(), 1);
    for node in 0..5 {
        assert!(network.requests(node, RpcMethod::Assign) <= 1);
    }
    let assigned = network.private_key(&identity()).unwrap();
    assert_eq!(first.address, assigned.address().unwrap());

    let second = resolver
        .resolve_address(&endpoints, &node_keys, &identity(), false)
        .await
        .unwrap();
    assert_eq!(second.address, first.address);
    assert_eq!(network.key_generations(), 1);
    for node in 0..5 {
        assert!(network.requests(node, RpcMethod::Assign) <= 1);
    }
}

#[tokio::test]
async fn test_existing_identity_skips_assignment() {
    let (network, _, resolver) = setup(3, 2);
    let key = PrivateKey::from_scalar(&Scalar::from(0xC0FFEEu64));
    network.insert_key(identity(), &key).unwrap();

    let info = resolver
        .resolve_address(&network.endpoints(), &network.node_public_keys(), &identity(), false)
        .await
        .unwrap();

    assert_eq!(info.address, key.address().unwrap());
    assert!(info.details.is_none());
    for node in 0..3 {
        assert_eq!(network.requests(node, RpcMethod::Assign), 0);
    }
}

#[tokio::test]
async fn test_failed_lookup_after_assignment_is_configuration_error() {
    let (network, _, resolver) = setup(3, 2);
    // Absent keys are reported honestly; once assigned, every node lies
    network.set_fault_all(RpcMethod::Lookup, Fault::WrongPublicKey);

    let result = resolver
        .resolve_address(&network.endpoints(), &network.node_public_keys(), &identity(), false)
        .await;

    assert!(matches!(result, Err(Error::Configuration(_))));
    assert_eq!(network.key_generations(), 1);
}

#[tokio::test]
async fn test_assignment_without_quorum_fails() {
    let (network, _, resolver) = setup(3, 2);
    network.set_fault(0, RpcMethod::Assign, Fault::Unreachable);
    network.set_fault(1, RpcMethod::Assign, Fault::Unreachable);

    let result = resolver
        .resolve_address(&network.endpoints(), &network.node_public_keys(), &identity(), false)
        .await;

    assert!(matches!(result, Err(Error::NodesUnavailable { .. })));
}

// ============================================================================
// Resolution
// ============================================================================

#[tokio::test]
async fn test_resolution_is_idempotent() {
    let (network, metadata, resolver) = setup(5, 3);
    let key = PrivateKey::from_scalar(&Scalar::from(99u64));
    network.insert_key(identity(), &key).unwrap();
    metadata.set_nonce(key.public_key().unwrap(), "abcdef");

    let mut addresses = Vec::new();
    for _ in 0..3 {
        let info = resolver
            .resolve_address(&network.endpoints(), &network.node_public_keys(), &identity(), true)
            .await
            .unwrap();
        addresses.push(info.address);
    }
    assert!(addresses.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(metadata.requests(), 3);
}

#[tokio::test]
async fn test_nonce_shifts_address() {
    let (network, metadata, resolver) = setup(3, 2);
    let key = PrivateKey::from_scalar(&Scalar::from(7u64));
    network.insert_key(identity(), &key).unwrap();
    metadata.set_nonce(key.public_key().unwrap(), "0x03");

    let info = resolver
        .resolve_address(&network.endpoints(), &network.node_public_keys(), &identity(), true)
        .await
        .unwrap();

    let expected = PrivateKey::from_scalar(&Scalar::from(10u64));
    assert_eq!(info.address, expected.address().unwrap());
    assert_ne!(info.address, key.address().unwrap());
    let details = info.details.unwrap();
    assert_eq!(details.public_key, key.public_key().unwrap());
}

#[tokio::test]
async fn test_tolerates_unreachable_minority() {
    let (network, _, resolver) = setup(5, 3);
    let key = PrivateKey::from_scalar(&Scalar::from(12345u64));
    network.insert_key(identity(), &key).unwrap();
    network.set_fault(1, RpcMethod::Lookup, Fault::Unreachable);
    network.set_fault(3, RpcMethod::Lookup, Fault::CorruptSignature);

    let info = resolver
        .resolve_address(&network.endpoints(), &network.node_public_keys(), &identity(), false)
        .await
        .unwrap();
    assert_eq!(info.address, key.address().unwrap());
}

#[tokio::test]
async fn test_extended_output_serializes_flat() {
    let (network, _, resolver) = setup(3, 2);
    let key = PrivateKey::from_scalar(&Scalar::from(5u64));
    network.insert_key(identity(), &key).unwrap();

    let info = resolver
        .resolve_address(&network.endpoints(), &network.node_public_keys(), &identity(), true)
        .await
        .unwrap();
    let json = serde_json::to_value(&info).unwrap();

    assert!(json["address"].is_string());
    assert_eq!(json["public_key"]["x"], key.public_key().unwrap().x_hex());
    assert_eq!(json["nonce"].as_str().unwrap().len(), 64);
}
