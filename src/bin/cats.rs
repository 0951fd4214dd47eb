//! Cats CLI binary.
//!
//! Capability negotiation and data exchange between untrusting peers.
//!
//! # Commands
//!
//! - `match` - Run the matcher over two declaration files
//! - `exchange` - Run a full requester/service exchange in-process

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use cats::{
    config::LoggingConfig,
    find_match, normalize_value,
    protocol::{intents_from_value, PROTOCOL_VERSION},
    Config, DataArray, MatchResult, MemoryTransport, PeerIntent, PeerTarget, Requester,
    ServiceHost, SessionRegistry, VERSION,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// Requester origin used by in-process runs
const REQUESTER_ORIGIN: &str = "cats://requester";

/// Service locator used when none is configured
const DEFAULT_TARGET: &str = "cats://service";

#[derive(Parser)]
#[command(name = "cats")]
#[command(version = VERSION)]
#[command(about = "Cats - capability negotiation between untrusting peers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick the pairing between own declarations and a peer's entries
    Match {
        /// Own intent declarations (JSON object or array)
        #[arg(long)]
        own: PathBuf,

        /// Peer capability entries (JSON array of {side, form, having})
        #[arg(long)]
        peer: PathBuf,

        /// Origin recorded on the peer entries
        #[arg(long, default_value = DEFAULT_TARGET)]
        origin: String,
    },

    /// Run a requester and a service against each other in-process
    Exchange {
        /// Requester intent declarations
        #[arg(long)]
        requester: PathBuf,

        /// Service intent declarations
        #[arg(long)]
        service: PathBuf,

        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Enable debug logging
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Match { own, peer, origin } => cmd_match(&own, &peer, &origin),
        Commands::Exchange {
            requester,
            service,
            config,
            verbose,
        } => cmd_exchange(&requester, &service, config, verbose),
    }
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid JSON in {}: {e}", path.display()))
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let log_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn cmd_match(own: &Path, peer: &Path, origin: &str) -> anyhow::Result<()> {
    let cats = normalize_value(&read_json(own)?)?;

    let entries = match read_json(peer)? {
        Value::Array(entries) => entries,
        entry => vec![entry],
    };
    let peers = entries
        .iter()
        .map(|entry| {
            PeerIntent::from_entry(origin, entry)
                .map_err(|reason| anyhow::anyhow!("Invalid peer entry {entry}: {reason}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    match find_match(&cats, &peers) {
        Some((cat, peer)) => {
            let pairing = json!({ "own": cat.descriptor(), "peer": peer });
            println!("{}", serde_json::to_string_pretty(&pairing)?);
        }
        None => println!("no match"),
    }

    Ok(())
}

fn cmd_exchange(
    requester: &Path,
    service: &Path,
    config: Option<PathBuf>,
    verbose: bool,
) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => Config::from_file(path)?.merge(Config::from_env()),
        None => Config::from_env(),
    };
    init_logging(&config.logging, verbose);

    let requester_intents = intents_from_value(&read_json(requester)?)?;
    let service_intents = Arc::new(intents_from_value(&read_json(service)?)?);

    let mut requester_config = config.requester.clone();
    if requester_config.target.is_none() {
        requester_config.target = Some(DEFAULT_TARGET.to_string());
    }
    let target = requester_config
        .peer_target()
        .unwrap_or_else(|| PeerTarget::new(DEFAULT_TARGET));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let transport = MemoryTransport::new(REQUESTER_ORIGIN);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let outcome_tx = parking_lot::Mutex::new(Some(outcome_tx));
        let service_config = config.service.clone();

        transport.register(&target, move |endpoint| {
            let host = ServiceHost::new(endpoint, service_config.clone());
            let intents = Arc::clone(&service_intents);
            let outcome_tx = outcome_tx.lock().take();
            tokio::spawn(async move {
                let outcome = match host.get_request_default().await {
                    Some(request) => request.open(&intents).await,
                    None => Ok(MatchResult::NotMatched),
                };
                if let Some(tx) = outcome_tx {
                    let _ = tx.send(outcome);
                }
            });
        });

        let session = Requester::new(
            requester_config,
            Arc::new(transport),
            Arc::new(SessionRegistry::new()),
        );
        let requester_outcome = session.open(&requester_intents).await;
        // Releases the transport, so an unlaunched service reports as such.
        drop(session);

        let service_outcome = match outcome_rx.await {
            Ok(outcome) => outcome_json(outcome)?,
            Err(_) => json!({ "outcome": "not_launched" }),
        };
        let report = json!({
            "protocol": PROTOCOL_VERSION,
            "requester": outcome_json(requester_outcome)?,
            "service": service_outcome,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok::<(), anyhow::Error>(())
    })
}

fn outcome_json(outcome: cats::Result<MatchResult<DataArray>>) -> anyhow::Result<Value> {
    Ok(match outcome {
        Ok(result) => serde_json::to_value(result)?,
        Err(e) => json!({ "outcome": "error", "error": e.to_string() }),
    })
}
