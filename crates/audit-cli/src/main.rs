#![forbid(unsafe_code)]

//! **audit-cli** – Command-line demo harness for the audit pipeline.
//!
//! Starts an `audit-core::AuditPipeline` over the in-memory store/cache
//! reference drivers and drives it through one of a handful of commands.
//! This is a demo harness, not a production front end: a real deployment
//! wires `AuditPipeline` into whatever RPC/HTTP surface calls `log_event`,
//! not this binary.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audit_core::{AuditConfig, AuditPipeline};
use audit_ingest::{EventDraft, RequestContext};
use audit_store::{InMemoryCache, InMemoryStore};
use audit_streamer::{AcceptOutcome, ServerFrame};
use audit_types::config::HashSecretKey;
use audit_types::event::{Actor, TargetRef};

//─────────────────────────────
//  CLI structure
//─────────────────────────────

#[derive(Parser)]
#[command(name = "audit")]
#[command(about = "Audit pipeline demo CLI")]
#[command(version)]
struct Cli {
    /// Hash secret key used to seal the demo chain (falls back to
    /// `AUDIT_HASH_SECRET_KEY`, then to an insecure development default).
    #[arg(long)]
    secret_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a single audit event and wait for it to commit
    LogEvent {
        /// Event type/classification tag, e.g. `auth.login`
        #[arg(long, default_value = "auth.login")]
        event_type: String,
        /// Actor id
        #[arg(long, default_value = "cli-user")]
        actor: String,
        /// Target id
        #[arg(long, default_value = "cli-session")]
        target: String,
        /// Action verb
        #[arg(long, default_value = "login")]
        action: String,
        /// Outcome string
        #[arg(long, default_value = "success")]
        result: String,
    },
    /// Seed the chain with a burst of synthetic demo events
    Seed {
        /// Number of events to log
        #[arg(long, default_value_t = 100)]
        count: u64,
    },
    /// Print the pipeline's current health snapshot as JSON
    Status,
    /// Subscribe to the live event stream and print matching frames until Ctrl+C
    Tail {
        /// Event type to filter on; omit to receive everything
        #[arg(long)]
        event_type: Option<String>,
    },
}

//─────────────────────────────
//  Main application
//─────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level)?;
    info!("starting audit CLI v{}", env!("CARGO_PKG_VERSION"));

    let secret_key = resolve_secret_key(cli.secret_key.as_deref());
    let config = AuditConfig::load(None).unwrap_or_default();
    let store = InMemoryStore::new();
    let cache = InMemoryCache::new();

    let pipeline = AuditPipeline::start(config, secret_key, store, cache).await?;
    info!("audit pipeline started");

    match cli.command {
        Commands::LogEvent { event_type, actor, target, action, result } => {
            handle_log_event(&pipeline, event_type, actor, target, action, result).await?;
        }
        Commands::Seed { count } => {
            handle_seed(&pipeline, count).await?;
        }
        Commands::Status => {
            handle_status(&pipeline).await?;
        }
        Commands::Tail { event_type } => {
            handle_tail(&pipeline, event_type).await?;
        }
    }

    let report = pipeline.shutdown().await;
    info!(unflushed_events = report.unflushed_events, "audit CLI shutting down");

    Ok(())
}

//─────────────────────────────
//  Command handlers
//─────────────────────────────

async fn handle_log_event(
    pipeline: &Arc<AuditPipeline>,
    event_type: String,
    actor: String,
    target: String,
    action: String,
    result: String,
) -> Result<()> {
    let draft = EventDraft {
        event_type,
        actor: Actor::new(actor),
        target: TargetRef::new(target),
        action,
        result,
        data_classes: Default::default(),
        legal_basis: None,
        compliance_attributes: Default::default(),
        attributes: Default::default(),
    };

    let outcome = pipeline.log_event(draft, &RequestContext::empty()).await;
    println!("{outcome:?}");
    if !outcome.is_ok() {
        anyhow::bail!("event was not admitted: {outcome:?}");
    }

    wait_for_drain(pipeline).await;
    let status = pipeline.status().await;
    println!("chain tip is now at sequence {}", status.chain_tip.last_sequence);

    Ok(())
}

async fn handle_seed(pipeline: &Arc<AuditPipeline>, count: u64) -> Result<()> {
    info!(count, "seeding demo events");
    for i in 0..count {
        let draft = EventDraft {
            event_type: "demo.seed".into(),
            actor: Actor::new(format!("seed-actor-{}", i % 10)),
            target: TargetRef::new(format!("seed-target-{i}")),
            action: "seed".into(),
            result: "success".into(),
            data_classes: Default::default(),
            legal_basis: None,
            compliance_attributes: Default::default(),
            attributes: Default::default(),
        };
        pipeline.log_event(draft, &RequestContext::empty()).await;
    }

    wait_for_drain(pipeline).await;
    let status = pipeline.status().await;
    println!("seeded {count} events, chain tip at sequence {}", status.chain_tip.last_sequence);

    Ok(())
}

async fn handle_status(pipeline: &Arc<AuditPipeline>) -> Result<()> {
    let status = pipeline.status().await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn handle_tail(pipeline: &Arc<AuditPipeline>, event_type: Option<String>) -> Result<()> {
    println!("subscribing to the live event stream (Ctrl+C to stop)");

    let AcceptOutcome::Accepted { connection, mut outgoing, welcome } = pipeline.accept_subscriber(None) else {
        anyhow::bail!("subscriber was rejected");
    };
    println!("{welcome:?}");

    if let Some(event_type) = event_type {
        let frame = audit_streamer::ClientFrame::AddFilter {
            name: "cli-tail".into(),
            predicates: audit_streamer::FilterPredicates {
                event_types: Some([event_type].into_iter().collect()),
                ..Default::default()
            },
        };
        pipeline.handle_subscriber_frame(connection.id, frame).await;
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            frame = outgoing.recv() => {
                match frame {
                    Some(ServerFrame::AuditEvent { event }) => {
                        println!("[{}] {} {} -> {}", event.sequence, event.event.event_type, event.event.actor.id, event.event.result);
                    }
                    Some(ServerFrame::Shutdown) => {
                        println!("pipeline is shutting down");
                        break;
                    }
                    Some(other) => println!("{other:?}"),
                    None => break,
                }
            }
            _ = &mut ctrl_c => {
                println!("shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}

//─────────────────────────────
//  Utility functions
//─────────────────────────────

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn resolve_secret_key(cli_value: Option<&str>) -> HashSecretKey {
    if let Some(raw) = cli_value {
        if raw.len() >= HashSecretKey::MIN_LEN {
            return HashSecretKey::from_bytes(raw.as_bytes().to_vec());
        }
        tracing::warn!("--secret-key is shorter than the minimum length, ignoring it");
    }

    if let Ok(key) = AuditConfig::load_secret_key() {
        return key;
    }

    tracing::warn!("no secret key configured, using an insecure development default");
    HashSecretKey::from_bytes(b"audit-cli-development-secret-change-me".to_vec())
}

async fn wait_for_drain(pipeline: &Arc<AuditPipeline>) {
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while pipeline.status().await.queue_depth > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await;
}
