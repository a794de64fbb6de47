use std::path::PathBuf;

use clap::{Parser, Subcommand};

use bitcoin::BlockHash;
use bridgeproof_core::config::{EndpointOverrides, NetworkMode, Transport};
use bridgeproof_core::types::{BurnHeight, HeightPair, SettlementHeight};

/// bridgeproof — Bitcoin inclusion proofs for cross-chain swap settlement.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Network mode: mainnet, testnet, local-dev or custom.
    #[arg(long, default_value = "mainnet", env = "BRIDGEPROOF_NETWORK")]
    pub network: NetworkMode,

    /// Electrum host (custom network only).
    #[arg(long, env = "ELECTRUM_HOST")]
    pub electrum_host: Option<String>,

    /// Electrum port (custom network only).
    #[arg(long, env = "ELECTRUM_PORT")]
    pub electrum_port: Option<u16>,

    /// Electrum transport, `tcp` or `tls` (custom network only).
    #[arg(long, env = "ELECTRUM_PROTOCOL")]
    pub electrum_protocol: Option<Transport>,

    /// Settlement-chain API used to correlate block heights.
    /// Defaults to the network's public API.
    #[arg(long, env = "BRIDGEPROOF_HEIGHTS_API")]
    pub heights_api: Option<String>,

    /// Fixed height correlation `<blockhash>=<burn height>:<settlement height>`,
    /// repeatable. When given, the heights API is not queried.
    #[arg(
        long = "static-height",
        value_name = "BLOCKHASH=BURN:SETTLEMENT",
        value_parser = parse_static_height
    )]
    pub static_heights: Vec<(BlockHash, HeightPair)>,

    /// Seconds allowed for the TCP connect and TLS handshake.
    #[arg(long, default_value = "10", env = "BRIDGEPROOF_CONNECT_TIMEOUT")]
    pub connect_timeout: u64,

    /// Seconds allowed for each request.
    #[arg(long, default_value = "30", env = "BRIDGEPROOF_REQUEST_TIMEOUT")]
    pub request_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Assemble the inclusion proof bundle for a confirmed transaction.
    Proof {
        /// Transaction id, 64 hex characters.
        #[arg(long)]
        txid: String,

        /// Address the swap output is expected to pay.
        #[arg(long)]
        address: String,

        /// Fail when no output pays `--address` instead of reporting -1.
        #[arg(long)]
        require_output: bool,

        /// Check locally that the proof folds to the header's Merkle root.
        #[arg(long)]
        verify: bool,
    },

    /// Classify the swap records in a JSON file.
    Status {
        /// JSON array of swap records.
        file: PathBuf,

        /// Print the classified records as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub fn endpoint_overrides(&self) -> EndpointOverrides {
        EndpointOverrides {
            host: self
                .electrum_host
                .as_deref()
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_owned),
            port: self.electrum_port,
            transport: self.electrum_protocol,
        }
    }

    pub fn has_overrides(&self) -> bool {
        self.endpoint_overrides() != EndpointOverrides::default()
    }

    pub fn heights_api(&self) -> &str {
        self.heights_api
            .as_deref()
            .unwrap_or_else(|| self.network.default_heights_api())
    }
}

fn parse_static_height(value: &str) -> Result<(BlockHash, HeightPair), String> {
    let (hash, heights) = value
        .split_once('=')
        .ok_or_else(|| format!("expected BLOCKHASH=BURN:SETTLEMENT, got `{value}`"))?;
    let (burn, settlement) = heights
        .split_once(':')
        .ok_or_else(|| format!("expected BURN:SETTLEMENT after `=`, got `{heights}`"))?;

    let hash: BlockHash = hash
        .trim()
        .parse()
        .map_err(|e| format!("invalid block hash `{hash}`: {e}"))?;
    let burn: u32 = burn
        .trim()
        .parse()
        .map_err(|e| format!("invalid burn height `{burn}`: {e}"))?;
    let settlement: u32 = settlement
        .trim()
        .parse()
        .map_err(|e| format!("invalid settlement height `{settlement}`: {e}"))?;

    Ok((
        hash,
        HeightPair {
            burn_height: BurnHeight(burn),
            settlement_height: SettlementHeight(settlement),
        },
    ))
}
