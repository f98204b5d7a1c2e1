//! Key Resolver CLI
//!
//! Command-line tool for resolving account addresses and retrieving keys
//! from a network of key-management nodes.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use key_resolver_core::{
    KeyResolver, NetworkConfig, ResolverConfig, VerifierIdentity,
    metadata::{HttpMetadataClient, MemoryMetadata},
    node::{HttpNodeTransport, MemoryNodeNetwork},
};
use std::path::{Path, PathBuf};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "key-resolver")]
#[command(about = "Distributed key resolution CLI", version)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the account address of an identity
    Address {
        /// Network description (JSON)
        #[arg(short, long)]
        network: PathBuf,

        /// Verifier name
        #[arg(long)]
        verifier: String,

        /// Identity within the verifier
        #[arg(long)]
        verifier_id: String,

        /// Include the public key and nonce in the output
        #[arg(long)]
        extended: bool,
    },

    /// Retrieve the private key of an identity
    Retrieve {
        /// Network description (JSON)
        #[arg(short, long)]
        network: PathBuf,

        /// Verifier name
        #[arg(long)]
        verifier: String,

        /// Identity within the verifier
        #[arg(long)]
        verifier_id: String,

        /// Identity token issued by the verifier
        #[arg(long, env = "KEY_RESOLVER_ID_TOKEN", hide_env_values = true)]
        id_token: String,

        /// Extra parameters forwarded to the nodes (JSON)
        #[arg(long, default_value = "{}")]
        extra_params: String,
    },

    /// Run resolution and retrieval against an in-memory node network
    Simulate {
        /// Number of nodes
        #[arg(long, default_value_t = 5)]
        nodes: usize,

        /// Shares required for reconstruction
        #[arg(long, default_value_t = 3)]
        threshold: usize,
    },

    /// Show information about the client
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Address {
            network,
            verifier,
            verifier_id,
            extended,
        } => {
            let identity = VerifierIdentity::new(verifier, verifier_id);
            resolve_address(&network, &identity, extended).await?;
        }
        Commands::Retrieve {
            network,
            verifier,
            verifier_id,
            id_token,
            extra_params,
        } => {
            let identity = VerifierIdentity::new(verifier, verifier_id);
            let extra_params: serde_json::Value =
                serde_json::from_str(&extra_params).context("Invalid --extra-params JSON")?;
            retrieve_key(&network, &identity, &id_token, extra_params).await?;
        }
        Commands::Simulate { nodes, threshold } => {
            simulate(nodes, threshold).await?;
        }
        Commands::Info => {
            show_info();
        }
    }

    Ok(())
}

type HttpResolver = KeyResolver<HttpNodeTransport, HttpMetadataClient>;

fn http_resolver(path: &Path) -> Result<(NetworkConfig, HttpResolver)> {
    let network = NetworkConfig::from_file(path)
        .with_context(|| format!("Failed to load network file {}", path.display()))?;
    let transport = HttpNodeTransport::new(network.resolver.request_timeout())?;
    let metadata =
        HttpMetadataClient::new(&network.metadata_url, network.resolver.request_timeout())?;
    let resolver = KeyResolver::new(transport, metadata, network.resolver.clone())?
        .with_node_public_keys(network.node_pub_keys.clone());
    Ok((network, resolver))
}

async fn resolve_address(path: &Path, identity: &VerifierIdentity, extended: bool) -> Result<()> {
    let (network, resolver) = http_resolver(path)?;
    let info = resolver
        .resolve_address(
            &network.node_endpoints(),
            &network.node_pub_keys,
            identity,
            extended,
        )
        .await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

async fn retrieve_key(
    path: &Path,
    identity: &VerifierIdentity,
    id_token: &str,
    extra_params: serde_json::Value,
) -> Result<()> {
    let (network, resolver) = http_resolver(path)?;
    let key = resolver
        .retrieve_shares(&network.node_endpoints(), identity, id_token, extra_params)
        .await?;
    let output = serde_json::json!({
        "address": key.public_address,
        "private_key": key.private_key.to_hex().as_str(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn simulate(nodes: usize, threshold: usize) -> Result<()> {
    info!(nodes, threshold, "Starting in-memory node network");

    let network = MemoryNodeNetwork::new(nodes, threshold)?;
    let resolver = KeyResolver::new(
        network.clone(),
        MemoryMetadata::new(),
        ResolverConfig::new(threshold),
    )?
    .with_node_public_keys(network.node_public_keys());

    let identity = VerifierIdentity::new("simulation", "user@example.com");
    let info = resolver
        .resolve_address(&network.endpoints(), &network.node_public_keys(), &identity, true)
        .await?;
    let key = resolver
        .retrieve_shares(
            &network.endpoints(),
            &identity,
            "simulated.id.token",
            serde_json::Value::Null,
        )
        .await?;

    let addresses_match = key.public_address == info.address;
    let output = serde_json::json!({
        "nodes": nodes,
        "threshold": threshold,
        "resolved": info,
        "retrieved_address": key.public_address,
        "addresses_match": addresses_match,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn show_info() {
    println!("Key Resolver v{}", key_resolver_core::VERSION);
    println!();
    println!("Defaults:");
    println!(
        "  Overall deadline: {}s",
        key_resolver_core::config::DEFAULT_OVERALL_DEADLINE_SECS
    );
    println!(
        "  Stage timeout: {}s",
        key_resolver_core::config::DEFAULT_STAGE_TIMEOUT_SECS
    );
    println!(
        "  Request timeout: {}s",
        key_resolver_core::config::DEFAULT_REQUEST_TIMEOUT_SECS
    );
    println!();
    println!("Protocol stages:");
    println!("  - Key lookup (quorum agreement)");
    println!("  - Key assignment (when no key exists)");
    println!("  - Commitment signatures");
    println!("  - Encrypted share retrieval and reconstruction");
}
