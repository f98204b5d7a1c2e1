//! # Key Resolver Core
//!
//! Client side of a distributed key resolution and threshold
//! reconstruction protocol.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Address Resolution**: quorum lookup of an identity's aggregated public key,
//!   on-demand key assignment, nonce adjustment and address derivation
//! - **Share Retrieval**: commitment round, encrypted share retrieval and
//!   Lagrange reconstruction of the private key, under a hard deadline
//! - **Node Transports**: an HTTP JSON-RPC transport and an in-memory node
//!   network for tests and simulation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use key_resolver_core::{KeyResolver, ResolverConfig, VerifierIdentity};
//! use key_resolver_core::metadata::MemoryMetadata;
//! use key_resolver_core::node::MemoryNodeNetwork;
//!
//! let network = MemoryNodeNetwork::new(5, 3)?;
//! let resolver = KeyResolver::new(network.clone(), MemoryMetadata::new(), ResolverConfig::new(3))?
//!     .with_node_public_keys(network.node_public_keys());
//!
//! let identity = VerifierIdentity::new("google", "alice@example.com");
//! let info = resolver
//!     .resolve_address(&network.endpoints(), &network.node_public_keys(), &identity, false)
//!     .await?;
//! let key = resolver
//!     .retrieve_shares(&network.endpoints(), &identity, id_token, serde_json::Value::Null)
//!     .await?;
//! assert_eq!(info.address, key.public_address);
//! ```
//!
//! ## Security Model
//!
//! No single node ever holds the full key. Shares travel encrypted to a
//! single-use ephemeral key, every node reply is signature-checked, and
//! the reconstructed key is only returned after it has been matched
//! against the aggregated public key. Secret material is zeroized on drop
//! and never appears in logs or errors.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keygen;
pub mod metadata;
pub mod node;
pub mod quorum;
pub mod resolver;
pub mod shares;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{NetworkConfig, ResolverConfig};
pub use error::{Error, Result};
pub use metadata::MetadataClient;
pub use node::{NodeSet, NodeTransport};
pub use quorum::{QuorumRequester, Stage};
pub use resolver::KeyResolver;
pub use types::{
    AccountNonce, AddressInfo, AggregatedPublicKey, KeyDetails, NodeEndpoint, NodePublicKey,
    PrivateKey, RetrievedKey, TokenCommitment, VerifierIdentity,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
