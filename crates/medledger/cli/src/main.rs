//! medledger - operator CLI for the ledger-anchored access log
//!
//! Lets an operator:
//! - generate and inspect the signing identity
//! - register resources for tracking
//! - record accesses by hand
//! - print a resource's audit trail as rebuilt from the ledger

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use medledger_audit::{telemetry, AccessMirror, AuditConfig};
use medledger_client::InMemoryLedger;
use medledger_identity::{load_identity, SigningIdentity};
use medledger_store::{JsonFileResourceStore, ResourceStore};
use medledger_types::{AccessAction, ActorId, ResourceId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// medledger CLI
#[derive(Parser)]
#[command(name = "medledger")]
#[command(about = "Tamper-evident access log for shared health records", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MEDLEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Resource store file
    #[arg(short, long, env = "MEDLEDGER_STORE", default_value = "medledger-resources.json")]
    store: PathBuf,

    /// Ledger backend
    #[arg(long, value_enum, default_value_t = LedgerKind::Rpc)]
    ledger: LedgerKind,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LedgerKind {
    /// JSON-RPC ledger node from the configuration
    Rpc,
    /// Throwaway in-process ledger; records vanish when the command exits
    Memory,
}

#[derive(Subcommand)]
enum Commands {
    /// Signing identity management
    Identity {
        #[command(subcommand)]
        command: IdentityCommands,
    },

    /// Start tracking a resource
    Register {
        #[arg(long)]
        resource: String,
    },

    /// Record one access to a tracked resource
    Record {
        #[arg(long)]
        actor: String,

        #[arg(long)]
        resource: String,

        /// e.g. "uploaded", "downloaded", "shared with someone@example.org"
        #[arg(long)]
        action: String,
    },

    /// Print a resource's audit trail, newest first
    Trail {
        #[arg(long)]
        resource: String,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum IdentityCommands {
    /// Print a fresh keypair as a 64-value JSON array
    Generate,

    /// Load the configured identity and print its public identity
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AuditConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    telemetry::init(&config.logging).context("installing tracing subscriber")?;

    match cli.command {
        Commands::Identity { command } => identity_command(command, &config),
        Commands::Register { resource } => {
            let store = open_store(&cli.store).await?;
            let tracked = store.register(&ResourceId::new(resource)).await?;
            println!("registered {}", tracked.id);
            Ok(())
        }
        Commands::Record {
            actor,
            resource,
            action,
        } => {
            let mirror = build_mirror(cli.ledger, &config, open_store(&cli.store).await?)?;
            let outcome = mirror
                .record(
                    ActorId::new(actor),
                    AccessAction::from_label(&action),
                    ResourceId::new(resource),
                )
                .await?;
            match outcome {
                Some(reference) => println!("{reference}"),
                None => println!("ledger mirror disabled; nothing recorded"),
            }
            Ok(())
        }
        Commands::Trail { resource, json } => {
            let mirror = build_mirror(cli.ledger, &config, open_store(&cli.store).await?)?;
            let trail = mirror.reconstruct_report(&ResourceId::new(resource)).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&trail.entries)?);
            } else {
                for entry in &trail.entries {
                    println!(
                        "{}  {:<32}  {:<40}  {}",
                        entry.timestamp.to_rfc3339(),
                        entry.actor,
                        entry.action,
                        entry.reference
                    );
                }
            }
            for omitted in &trail.omitted {
                eprintln!("omitted {}: {}", omitted.reference, omitted.reason);
            }
            Ok(())
        }
    }
}

fn identity_command(command: IdentityCommands, config: &AuditConfig) -> anyhow::Result<()> {
    match command {
        IdentityCommands::Generate => {
            let identity = SigningIdentity::generate();
            eprintln!("public identity: {}", identity.public_identity());
            println!("{}", identity.to_keypair_json());
        }
        IdentityCommands::Show => {
            let identity = load_identity(&config.secret_source())?;
            println!("{}", identity.public_identity());
        }
    }
    Ok(())
}

async fn open_store(path: &Path) -> anyhow::Result<Arc<dyn ResourceStore>> {
    let store = JsonFileResourceStore::open(path)
        .await
        .with_context(|| format!("opening resource store {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_mirror(
    ledger: LedgerKind,
    config: &AuditConfig,
    store: Arc<dyn ResourceStore>,
) -> anyhow::Result<AccessMirror> {
    match ledger {
        LedgerKind::Rpc => Ok(AccessMirror::from_config(config, store)?),
        LedgerKind::Memory => {
            let identity = match load_identity(&config.secret_source()) {
                Ok(identity) => identity,
                Err(e) if e.is_missing() => {
                    warn!("no signing secret configured; using a throwaway identity");
                    SigningIdentity::generate()
                }
                Err(e) => return Err(e.into()),
            };
            let ledger = Arc::new(InMemoryLedger::new(config.memo_program()?));
            Ok(AccessMirror::with_ledger(
                config,
                ledger,
                store,
                Arc::new(identity),
            )?)
        }
    }
}
