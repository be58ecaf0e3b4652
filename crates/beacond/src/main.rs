//! beacond — the beaconmesh node daemon.
//!
//! Single binary that assembles one mesh node:
//! - Registry catalog (peers + monitored instances)
//! - Dispatcher loop partitioning check work over the consistent-hash ring
//! - Watch roster standing at the check-engine boundary
//! - Admin REST API
//!
//! # Usage
//!
//! ```text
//! beacond run --config beacond.toml
//! beacond run --host 10.0.0.1 --listen 0.0.0.0:7710
//! ```

mod api;
mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use beaconmesh_dispatch::{CheckSink, ClusterView, Dispatcher, WatchRoster};
use beaconmesh_registry::{Catalog, CatalogEvent};

use config::BeacondConfig;

#[derive(Parser)]
#[command(name = "beacond", about = "beaconmesh dispatch daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a mesh node.
    Run {
        /// Path to beacond.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Node identity on the ring; overrides `node.host`.
        #[arg(long)]
        host: Option<String>,

        /// Admin API listen address; overrides `node.listen`.
        #[arg(long)]
        listen: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,beacond=debug,beaconmesh_dispatch=debug,beaconmesh_registry=debug"
                    .parse()
                    .unwrap()
            }),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, host, listen } => run_node(config, host, listen).await,
    }
}

/// Route catalog change events into the dispatcher's dirty flags.
pub(crate) fn wire_change_signals(catalog: &Catalog, dispatcher: &Arc<Dispatcher>) {
    let target = Arc::clone(dispatcher);
    catalog.set_on_change(Arc::new(move |event: CatalogEvent| {
        target.notify_change(event.peers_changed, event.instances_changed);
    }));
}

async fn run_node(
    config_path: Option<PathBuf>,
    host: Option<String>,
    listen: Option<String>,
) -> anyhow::Result<()> {
    let mut config = match &config_path {
        Some(path) => {
            let loaded = BeacondConfig::from_file(path)?;
            info!(path = ?path, "config loaded");
            loaded
        }
        None => BeacondConfig::default(),
    };
    if let Some(host) = host {
        config.node.host = host;
    }
    if let Some(listen) = listen {
        config.node.listen = listen;
    }
    config.validate()?;

    info!(host = %config.node.host, "beacond starting");

    // ── Initialize subsystems ──────────────────────────────────

    let catalog = Arc::new(Catalog::new());
    let roster = Arc::new(WatchRoster::new());

    let view: Arc<dyn ClusterView> = catalog.clone();
    let sink: Arc<dyn CheckSink> = roster.clone();
    let dispatcher = Arc::new(
        Dispatcher::new(&config.node.host, view, sink)
            .with_event_interval(config.dispatch.event_interval())
            .with_ensure_interval(config.dispatch.ensure_interval())
            .with_bucket_weight(config.dispatch.bucket_weight),
    );
    info!(
        event_interval = config.dispatch.event_interval_secs,
        ensure_interval = config.dispatch.ensure_interval_secs,
        bucket_weight = config.dispatch.bucket_weight,
        "dispatcher initialized"
    );

    // Wire before seeding so the seed data raises the first signals.
    wire_change_signals(&catalog, &dispatcher);
    for peer in &config.seed.peers {
        catalog.upsert_peer(peer.clone());
    }
    for spec in &config.seed.instances {
        catalog.upsert_instance(spec.clone());
    }
    if !config.seed.peers.is_empty() || !config.seed.instances.is_empty() {
        info!(
            peers = config.seed.peers.len(),
            instances = config.seed.instances.len(),
            "catalog seeded"
        );
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    // Dispatch reconciliation loop.
    let loop_dispatcher = Arc::clone(&dispatcher);
    let dispatch_handle = tokio::spawn(async move {
        loop_dispatcher.run(shutdown_rx).await;
    });

    // ── Start admin API ────────────────────────────────────────

    let router = api::build_router(api::ApiState {
        catalog,
        dispatcher,
        roster,
    });
    let addr: SocketAddr = config.node.listen.parse()?;

    info!(%addr, "admin API starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = dispatch_handle.await;

    info!("beacond stopped");
    Ok(())
}
