mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{bail, eyre, WrapErr};

use bridgeproof_core::config::{ChainEndpoint, NetworkMode};
use bridgeproof_core::electrum::ElectrumConnector;
use bridgeproof_core::heights::{HeightResolver, HttpHeightResolver, StaticHeightResolver};
use bridgeproof_core::swap::SwapRecord;
use bridgeproof_core::{codec, merkle, ConnectionError, CoreError, ProofAssembler, ProofBundle};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    match &args.command {
        cli::Command::Proof {
            txid,
            address,
            require_output,
            verify,
        } => {
            let assembler = build_assembler(&args)?;
            let bundle = assembler.assemble_str(txid, address).await.map_err(|err| {
                let endpoint = ChainEndpoint::select(args.network, &args.endpoint_overrides());
                eyre!(format_assembly_error(&endpoint, args.heights_api(), &err))
                    .wrap_err("while assembling the inclusion proof")
            })?;

            if *require_output && bundle.output_index.is_none() {
                bail!("no output of {txid} pays {address}");
            }
            if *verify {
                verify_bundle(txid, &bundle)?;
            }

            println!(
                "{}",
                serde_json::to_string_pretty(&bundle).context("serialize proof bundle")?
            );
        }
        cli::Command::Status { file, json } => print_statuses(file, *json).await?,
    }

    Ok(())
}

/// Resolve the data-source configuration once and wire the assembler.
fn build_assembler(args: &cli::Cli) -> eyre::Result<ProofAssembler> {
    if args.network != NetworkMode::Custom && args.has_overrides() {
        tracing::warn!(
            network = %args.network,
            "ELECTRUM_* overrides are ignored unless --network custom is selected"
        );
    }

    let endpoint = ChainEndpoint::select(args.network, &args.endpoint_overrides());
    let request_timeout = Duration::from_secs(args.request_timeout);
    tracing::info!(network = %args.network, %endpoint, "using Electrum server");

    let connector = ElectrumConnector::new(endpoint)
        .context("configure Electrum connector")?
        .with_timeouts(Duration::from_secs(args.connect_timeout), request_timeout);
    Ok(ProofAssembler::new(
        Arc::new(connector),
        height_resolver(args, request_timeout)?,
    ))
}

/// A static table when `--static-height` is given, the heights API otherwise.
fn height_resolver(
    args: &cli::Cli,
    request_timeout: Duration,
) -> eyre::Result<Arc<dyn HeightResolver>> {
    if !args.static_heights.is_empty() {
        tracing::info!(blocks = args.static_heights.len(), "using static height table");
        let table = args
            .static_heights
            .iter()
            .fold(StaticHeightResolver::new(), |table, (hash, pair)| {
                table.with_block(*hash, *pair)
            });
        return Ok(Arc::new(table));
    }

    tracing::info!(heights_api = args.heights_api(), "using settlement-chain heights API");
    let heights = HttpHeightResolver::new(args.heights_api(), request_timeout)
        .context("configure settlement-chain heights API")?;
    Ok(Arc::new(heights))
}

/// Re-check the bundle the way the settlement contract will.
fn verify_bundle(txid: &str, bundle: &ProofBundle) -> eyre::Result<()> {
    let txid: bitcoin::Txid = txid.trim().parse().context("parse txid")?;

    let stripped = codec::decode_transaction(&bundle.tx_hex_no_witness)
        .context("decode witness-stripped transaction")?;
    if stripped.compute_txid() != txid {
        bail!("witness-stripped transaction hashes to {}, not {txid}", stripped.compute_txid());
    }
    if !merkle::verify_inclusion(&txid, &bundle.proof, &bundle.block.header) {
        bail!("proof for {txid} does not fold to the block header's Merkle root");
    }

    tracing::info!(%txid, "proof verified against block header");
    Ok(())
}

async fn print_statuses(file: &Path, json: bool) -> eyre::Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .wrap_err_with(|| format!("read swap records from {}", file.display()))?;
    let records: Vec<SwapRecord> = serde_json::from_str(&content)
        .wrap_err_with(|| format!("parse swap records in {}", file.display()))?;

    if json {
        let rows: Vec<serde_json::Value> = records
            .iter()
            .map(|record| {
                let status = record.status();
                serde_json::json!({
                    "id": record.display_id(),
                    "record": record,
                    "status": status,
                    "label": status.label(),
                    "terminal": status.is_terminal(),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).context("serialize swap statuses")?
        );
        return Ok(());
    }

    for record in &records {
        let direction = match record {
            SwapRecord::Inbound(_) => "inbound",
            SwapRecord::Outbound(_) => "outbound",
        };
        println!("{direction:<9} {:<66} {}", record.display_id(), record.status());
    }
    Ok(())
}

fn format_assembly_error(endpoint: &ChainEndpoint, heights_api: &str, err: &CoreError) -> String {
    let mut lines = vec![format!("error: {err}")];

    let hint = match err {
        CoreError::Connection(ConnectionError::Http(_)) => Some(format!(
            "hint: the heights API at `{heights_api}` could not be queried; verify --heights-api and network access"
        )),
        CoreError::Connection(ConnectionError::Tls(_)) => Some(format!(
            "hint: TLS handshake with `{endpoint}` failed; check that the port serves TLS or select tcp"
        )),
        CoreError::Connection(ConnectionError::Timeout { .. }) => Some(format!(
            "hint: `{endpoint}` did not answer in time; retry or raise --request-timeout"
        )),
        CoreError::Connection(ConnectionError::Io(io)) => Some(match io.kind() {
            std::io::ErrorKind::ConnectionRefused => format!(
                "hint: nothing is listening at `{endpoint}`; verify --network or the ELECTRUM_* settings"
            ),
            _ => format!("hint: could not reach `{endpoint}`; verify the hostname and your network"),
        }),
        CoreError::Unsupported(_) => Some(format!(
            "hint: `{endpoint}` refuses verbose transactions; use an ElectrumX or Fulcrum server"
        )),
        CoreError::UnknownBlock(_) => Some(
            "hint: the settlement chain has not observed this Bitcoin block yet; retry after it catches up"
                .to_owned(),
        ),
        CoreError::Unconfirmed(_) => {
            Some("hint: wait for the transaction to confirm, then retry".to_owned())
        }
        CoreError::TxNotFound(_) => Some(format!(
            "hint: `{endpoint}` does not know this transaction; check the txid and the selected network"
        )),
        _ => None,
    };
    lines.extend(hint);

    if err.is_retryable() {
        lines.push("this failure is retryable".to_owned());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridgeproof_core::config::{EndpointOverrides, Transport};

    fn endpoint() -> ChainEndpoint {
        ChainEndpoint::select(NetworkMode::LocalDev, &EndpointOverrides::default())
    }

    #[test]
    fn refused_connection_hints_at_network_selection() {
        let err = CoreError::Connection(ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        let message = format_assembly_error(&endpoint(), "http://localhost:3999", &err);
        assert!(message.contains("tcp://localhost:50001"));
        assert!(message.contains("nothing is listening"));
        assert!(message.contains("retryable"));
    }

    #[test]
    fn terminal_errors_are_not_marked_retryable() {
        let err = CoreError::MalformedTransaction("bad".into());
        let message = format_assembly_error(&endpoint(), "http://localhost:3999", &err);
        assert!(!message.contains("retryable"));
        assert!(!message.contains("hint:"));
    }

    #[test]
    fn unsupported_server_hints_at_server_choice() {
        let err = CoreError::Unsupported("verbose transactions are unsupported".into());
        let message = format_assembly_error(&endpoint(), "http://localhost:3999", &err);
        assert!(message.contains("ElectrumX or Fulcrum"));
        assert!(!message.contains("retryable"));
    }

    #[test]
    fn static_heights_replace_the_heights_api() {
        let args = cli::Cli::try_parse_from([
            "bridgeproof",
            "--heights-api",
            "not a url",
            "--static-height",
            "00000000000000000002a7c4c1e48d76c5a37902165a270156b7a8d72728a054=1:2",
            "status",
            "x.json",
        ])
        .expect("arguments should parse");
        assert!(height_resolver(&args, Duration::from_secs(1)).is_ok());

        let args =
            cli::Cli::try_parse_from(["bridgeproof", "--heights-api", "not a url", "status", "x.json"])
                .expect("arguments should parse");
        assert!(height_resolver(&args, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn tls_hint_names_endpoint() {
        let endpoint = ChainEndpoint {
            host: "electrum.example".into(),
            port: 50002,
            transport: Transport::Tls,
        };
        let err = CoreError::Connection(ConnectionError::Tls("bad certificate".into()));
        let message = format_assembly_error(&endpoint, "https://api.hiro.so", &err);
        assert!(message.contains("tls://electrum.example:50002"));
    }
}
