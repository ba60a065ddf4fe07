//! eve - build, sign and broadcast deployment transactions
//!
//! Each command resolves one deployment message, runs it through the
//! submission pipeline and prints the node's result as JSON on stdout.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use clap::{Args, Parser, Subcommand};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use eve_deploy::config::Settings;
use eve_deploy::deployment::{
    Coin, DeploymentId, GroupSpec, Message, MsgCloseDeployment, MsgCreateDeployment,
    MsgUpdateDeployment, VERSION_LEN,
};
use eve_deploy::metrics;
use eve_deploy::node::{BroadcastMode, BroadcastResult, TendermintRpc, TxHash};
use eve_deploy::tx::{codec, ConfirmationGate, Decision, SubmitOptions, SubmitOutcome, TxSubmitter};

#[derive(Parser)]
#[command(name = "eve", version, about = "Deploy applications with signed transactions")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Sign and broadcast without asking for confirmation
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    /// async, sync or block
    #[arg(long, global = true)]
    broadcast_mode: Option<BroadcastMode>,

    /// Node RPC endpoint
    #[arg(long, global = true)]
    node: Option<String>,

    /// Name of the signing key
    #[arg(long, global = true)]
    from: Option<String>,

    /// Deployment owner address
    #[arg(long, global = true)]
    owner: Option<String>,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long, global = true)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create, update or close a deployment
    Deploy {
        #[command(subcommand)]
        action: DeployCommand,
    },
    /// Transaction utilities
    Tx {
        #[command(subcommand)]
        action: TxCommand,
    },
}

#[derive(Subcommand)]
enum DeployCommand {
    Create {
        /// JSON file with the deployment's group specs
        #[arg(long)]
        groups: PathBuf,
        /// Deployment sequence; defaults to the current time in milliseconds
        #[arg(long)]
        dseq: Option<u64>,
        #[arg(long)]
        deposit: Option<Coin>,
        /// Hex manifest version; defaults to the SHA-256 of the groups file
        #[arg(long)]
        version: Option<String>,
    },
    Update {
        #[arg(long)]
        dseq: u64,
        #[arg(long)]
        version: String,
    },
    Close {
        #[arg(long)]
        dseq: u64,
    },
}

#[derive(Subcommand)]
enum TxCommand {
    /// Poll for a transaction that reached the node but was not confirmed
    Wait {
        hash: TxHash,
        /// Seconds to keep polling
        #[arg(long)]
        deadline: Option<u64>,
    },
    /// Decode base64 wire bytes and print the transaction as JSON
    Decode { tx: String },
}

impl GlobalArgs {
    fn apply(&self, settings: &mut Settings) {
        if self.yes {
            settings.client.skip_confirm = true;
        }
        if let Some(mode) = self.broadcast_mode {
            settings.client.broadcast_mode = mode;
        }
        if let Some(node) = &self.node {
            settings.client.node = node.clone();
        }
        if let Some(from) = &self.from {
            settings.client.from = from.clone();
        }
        if let Some(owner) = &self.owner {
            settings.client.owner = Some(owner.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    let Cli { global, command } = Cli::parse();

    // Load configuration; flags win over file and environment
    let mut settings = Settings::load()?;
    global.apply(&mut settings);
    settings.validate()?;

    // The prompt reads stdin on this thread, so a second signal exits outright
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            warn!("Shutdown signal received, cancelling (repeat to exit immediately)");
            cancel.cancel();
            shutdown_signal().await;
            warn!("Second shutdown signal received, exiting");
            std::process::exit(130);
        }
    });

    let node = Arc::new(
        TendermintRpc::new(&settings.client.node, settings.request_timeout())
            .with_context(|| format!("Invalid node URL {:?}", settings.client.node))?,
    );
    info!("Using node {}", node.url());

    let run = async {
        match command {
            Command::Deploy { action } => match deploy_message(&settings, action) {
                Ok(message) => submit(&settings, node, message, &cancel).await,
                Err(e) => Err(e),
            },
            Command::Tx {
                action: TxCommand::Wait { hash, deadline },
            } => {
                let deadline = deadline
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| settings.poll_deadline());
                let submitter =
                    TxSubmitter::new(node, ConfirmationGate::preset(Decision::Approved))
                        .with_poll_deadline(deadline)
                        .with_poll_interval(settings.poll_interval());
                match submitter.wait(hash, &cancel).await {
                    Ok(result) => report(&result),
                    Err(e) => Err(e.into()),
                }
            }
            Command::Tx {
                action: TxCommand::Decode { tx },
            } => decode(&tx),
        }
    };

    // The pipeline turns cancellation into its own errors, keeping any hash;
    // this only covers steps that never look at the token
    let result = tokio::select! {
        biased;
        result = run => result,
        _ = cancel.cancelled() => Err(anyhow::anyhow!("Cancelled")),
    };

    if global.metrics {
        eprintln!("{}", metrics::render()?);
    }

    result
}

fn deploy_message(settings: &Settings, action: DeployCommand) -> Result<Message> {
    let owner = settings
        .client
        .owner
        .clone()
        .context("No owner address; set --owner, AKASH_OWNER or client.owner")?;

    let message = match action {
        DeployCommand::Create {
            groups,
            dseq,
            deposit,
            version,
        } => {
            let raw = std::fs::read(&groups)
                .with_context(|| format!("Failed to read groups file {:?}", groups))?;
            let group_specs: Vec<GroupSpec> = serde_json::from_slice(&raw)
                .with_context(|| format!("Failed to parse groups file {:?}", groups))?;
            let version = match version {
                Some(hex) => parse_version(&hex)?,
                None => Sha256::digest(&raw).to_vec(),
            };
            let dseq = match dseq {
                Some(dseq) => dseq,
                None => chrono::Utc::now().timestamp_millis().try_into()?,
            };

            info!("Creating deployment {}/{}", owner, dseq);
            MsgCreateDeployment {
                id: DeploymentId::new(owner.clone(), dseq),
                groups: group_specs,
                version,
                deposit: deposit.unwrap_or_else(|| settings.deployment.deposit.clone()),
                depositor: owner,
            }
            .into()
        }
        DeployCommand::Update { dseq, version } => MsgUpdateDeployment {
            id: DeploymentId::new(owner, dseq),
            version: parse_version(&version)?,
        }
        .into(),
        DeployCommand::Close { dseq } => MsgCloseDeployment {
            id: DeploymentId::new(owner, dseq),
        }
        .into(),
    };

    Ok(message)
}

fn parse_version(input: &str) -> Result<Vec<u8>> {
    let version = hex::decode(input.trim().trim_start_matches("0x"))
        .with_context(|| format!("Invalid version {:?}", input))?;
    if version.len() != VERSION_LEN {
        anyhow::bail!("Version must be {} bytes, got {}", VERSION_LEN, version.len());
    }
    Ok(version)
}

async fn submit(
    settings: &Settings,
    node: Arc<TendermintRpc>,
    message: Message,
    cancel: &CancellationToken,
) -> Result<()> {
    let keyring = Arc::new(settings.open_keyring()?);
    let fee = settings.fee_factory(node.clone(), keyring).build()?;

    let gate = if settings.client.skip_confirm {
        ConfirmationGate::preset(Decision::Approved)
    } else {
        ConfirmationGate::stdio()
    };
    let submitter = TxSubmitter::new(node, gate)
        .with_poll_deadline(settings.poll_deadline())
        .with_poll_interval(settings.poll_interval());

    let options = SubmitOptions {
        mode: settings.client.broadcast_mode,
        skip_confirm: settings.client.skip_confirm,
    };

    match submitter.submit(vec![message], &fee, options, cancel).await {
        Ok(SubmitOutcome::Completed(result)) => report(&result),
        Ok(SubmitOutcome::Aborted) => Ok(()),
        Err(e) => {
            match e.tx_hash() {
                Some(hash) if e.is_retryable() => {
                    error!("Tx {} may still commit; resume with `eve tx wait {}`", hash, hash)
                }
                Some(hash) => {
                    error!("Tx {} may have reached the node; check with `eve tx wait {}`", hash, hash)
                }
                None => {}
            }
            Err(e.into())
        }
    }
}

fn decode(input: &str) -> Result<()> {
    let bytes = BASE64
        .decode(input.trim())
        .context("Transaction must be base64 encoded")?;
    let decoded = codec::decode_tx(&bytes)?;
    println!("{}", serde_json::to_string_pretty(&decoded)?);
    eprintln!("hash: {}", codec::tx_hash(&bytes));
    Ok(())
}

/// Print the result; a non-zero code fails the command
fn report(result: &BroadcastResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    if !result.is_success() {
        anyhow::bail!(
            "Tx {} failed with code {} ({}): {}",
            result.tx_hash,
            result.code,
            result.codespace,
            result.raw_log
        );
    }
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // RUST_LOG, then LOG_LEVEL
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            std::env::var("LOG_LEVEL")
                .ok()
                .and_then(|level| EnvFilter::try_new(level).ok())
        })
        .unwrap_or_else(|| EnvFilter::new("warn,eve=info,eve_deploy=info"));

    let json = std::env::var("EVE_LOG_FORMAT").map_or(false, |f| f == "json");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
