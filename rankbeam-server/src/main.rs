//! RankBeam license server.
//!
//! Issues machine-bound license keys, validates them for the desktop app,
//! and onboards paying customers from Paystack webhooks.
//!
//! Usage:
//!   rankbeam-server --addr :8080 --db data/licenses.db --token <secret>

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tower_http::timeout::TimeoutLayer;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use rankbeam_licensing::{LicensingService, TracingMailer};
use rankbeam_server::{AppState, build_router};

const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "rankbeam-server")]
#[command(about = "RankBeam license issuance and validation server")]
struct Args {
    /// Listen address; a bare ":port" binds all interfaces
    #[arg(long, env = "LICENSE_BIND_ADDR", default_value = ":8080")]
    addr: String,

    /// Path to the license database
    #[arg(long, env = "LICENSE_DB_PATH", default_value = "data/licenses.db")]
    db: String,

    /// Installer shared secret; unset leaves the API open
    #[arg(long, env = "LICENSE_API_TOKEN")]
    token: Option<String>,

    /// Paystack webhook signing secret; unset disables the webhook
    #[arg(long, env = "PAYSTACK_WEBHOOK_SECRET")]
    paystack_webhook_secret: Option<String>,

    /// Seconds allowed for reading a request
    #[arg(long, default_value = "10")]
    read_timeout: u64,

    /// Seconds allowed for writing a response
    #[arg(long, default_value = "10")]
    write_timeout: u64,

    /// Seconds an idle keep-alive connection is held open
    #[arg(long, default_value = "60")]
    idle_timeout: u64,

    /// License validity in days; 0 means keys never expire
    #[arg(long, default_value = "365")]
    expiry: i64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let service = LicensingService::open(&args.db, args.expiry)
        .with_context(|| format!("opening license database at {}", args.db))?;

    let state = AppState {
        service: Arc::new(service),
        installer_token: normalize_secret(args.token),
        webhook_secret: normalize_secret(args.paystack_webhook_secret),
        mailer: Arc::new(TracingMailer),
    };
    if state.installer_token.is_none() {
        info!("no installer token configured, license endpoints are open");
    }
    if state.webhook_secret.is_none() {
        info!("no webhook secret configured, Paystack deliveries will be rejected");
    }

    // The read and write budgets bound a whole request/response exchange.
    // Keep-alive idling is left to the runtime's defaults.
    let deadline = Duration::from_secs(args.read_timeout + args.write_timeout);
    tracing::debug!(
        read_timeout = args.read_timeout,
        write_timeout = args.write_timeout,
        idle_timeout = args.idle_timeout,
        "request deadline {}s",
        deadline.as_secs()
    );
    let router = build_router(state).layer(TimeoutLayer::new(deadline));

    let addr = normalize_addr(&args.addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, db = %args.db, expiry_days = args.expiry, "license server listening");

    // Give in-flight requests up to 10 s to drain after the signal.
    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = drain_tx.send(());
    });
    tokio::select! {
        result = server => result.context("serving HTTP")?,
        () = async {
            let _ = drain_rx.await;
            tokio::time::sleep(DRAIN_DEADLINE).await;
        } => warn!("drain deadline reached, abandoning remaining connections"),
    }

    info!("shutdown complete");
    Ok(())
}

/// Expands a bare ":8080" into "0.0.0.0:8080".
fn normalize_addr(addr: &str) -> String {
    let addr = addr.trim();
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

fn normalize_secret(secret: Option<String>) -> Option<String> {
    secret
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
