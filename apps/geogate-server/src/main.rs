mod analytics;
mod campaigns;
mod clock;
mod config;
mod error;
mod invitations;
mod ip_intel;
mod location;
mod metrics;
mod routes;
mod sms;
mod state;

#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use geogate_crypto::TokenKey;
use geogate_storage::{InvitationFilter, InvitationStatus, Store};
use geogate_store_sqlite::SqliteStore;
use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use config::ServerConfig;
use invitations::InvitationService;
use state::AppState;

// ────────────────────────────────────── CLI Types ──────────────────────────────────────

#[derive(Parser)]
#[command(name = "geogate-server")]
#[command(about = "Geofenced invitation service: HTTP API and administration")]
struct Cli {
    /// Database URL (sqlite://path/to/geogate.db)
    #[arg(
        long,
        global = true,
        env = "DATABASE_URL",
        default_value = "sqlite://geogate.db"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve {
        /// Listen address
        #[arg(long, env = "GEOGATE_ADDR", default_value = "0.0.0.0:8080")]
        addr: String,
    },
    /// Invitation administration
    Invitation {
        #[command(subcommand)]
        invitation_cmd: InvitationCommand,
    },
    /// Print a fresh token key for GEOGATE_TOKEN_KEY
    Keygen,
}

#[derive(Subcommand)]
enum InvitationCommand {
    /// List invitations, newest first
    List {
        /// Only invitations in this status
        #[arg(long)]
        status: Option<InvitationStatus>,
        /// Only invitations flagged for manual review
        #[arg(long)]
        flagged: bool,
    },
    /// Expire every invitation past its deadline and fire due campaigns
    Sweep,
}

// ────────────────────────────────────── CLI Commands ──────────────────────────────────────

async fn cmd_invitation_list(
    db_url: &str,
    status: Option<InvitationStatus>,
    flagged: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteStore::open(db_url).await?;
    let invitations = store
        .list_invitations(&InvitationFilter {
            status,
            flagged_only: flagged,
        })
        .await?;

    if invitations.is_empty() {
        println!("No invitations found.");
        return Ok(());
    }
    for inv in invitations {
        let flag = if inv.flagged_for_review { "  [review]" } else { "" };
        println!(
            "{:<12} {:<10} {:<13} {}{}",
            inv.number,
            inv.status.as_str(),
            inv.tier.as_str(),
            inv.recipient.organization,
            flag
        );
    }
    Ok(())
}

async fn cmd_invitation_sweep(
    db_url: &str,
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let (_ready_tx, ready_rx) = watch::channel(false);
    let state = AppState::build(config, db_url, ready_rx, None).await?;
    let report = state.service.sweep_expired().await?;
    println!(
        "Examined {} invitations, expired {}.",
        report.examined,
        report.expired.len()
    );
    for number in report.expired {
        println!("  {number}");
    }
    Ok(())
}

async fn cmd_serve(
    db_url: &str,
    config: ServerConfig,
    addr: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = addr.parse()?;
    let metrics_handle = metrics::init_metrics()?;
    let (readiness_tx, readiness_rx) = watch::channel(false);

    let sweep_interval = config.sweep_interval;
    let state = Arc::new(AppState::build(config, db_url, readiness_rx, Some(metrics_handle)).await?);

    if let Some(interval) = sweep_interval {
        tokio::spawn(run_sweeper(state.service.clone(), interval));
    }

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "geogate-server listening");

    // Ready once the listener is bound
    let _ = readiness_tx.send(true);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(Some(readiness_tx)))
    .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn run_sweeper(service: Arc<InvitationService>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match service.sweep_expired().await {
            Ok(report) => tracing::debug!(
                examined = report.examined,
                expired = report.expired.len(),
                "sweep finished"
            ),
            Err(e) => tracing::error!(error = %e, "sweep failed"),
        }
    }
}

async fn shutdown_signal(readiness_tx: Option<watch::Sender<bool>>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down gracefully"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down gracefully"),
    }

    // Mark not ready on shutdown so load balancers drain traffic
    if let Some(tx) = readiness_tx {
        let _ = tx.send(false);
    }
}

// ────────────────────────────────────── Main ──────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geogate_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { addr } => {
            let config = ServerConfig::from_env()?;
            cmd_serve(&cli.database_url, config, &addr).await?;
        }
        Command::Invitation { invitation_cmd } => match invitation_cmd {
            InvitationCommand::List { status, flagged } => {
                cmd_invitation_list(&cli.database_url, status, flagged).await?;
            }
            InvitationCommand::Sweep => {
                let config = ServerConfig::from_env()?;
                cmd_invitation_sweep(&cli.database_url, config).await?;
            }
        },
        Command::Keygen => {
            println!("{}", TokenKey::generate().to_hex());
        }
    }

    Ok(())
}
