//! # Relay-Board Binary
//!
//! The entry point that assembles the application based on compile-time features.
//!
//! Startup order:
//! 1. Load layered settings.
//! 2. Initialise tracing.
//! 3. Open the store, pick the auth collaborator.
//! 4. Start the broadcast hub, the board service and the comment sweeper.
//! 5. Serve HTTP until SIGINT/SIGTERM, then wind everything down.

#[cfg(not(feature = "db-sqlite"))]
compile_error!("relay-board needs a storage plugin: enable the `db-sqlite` feature");

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use rb_api::AppState;
use rb_config::{AuthSettings, LogSettings, Settings};
use rb_core::{AuthProvider, SystemClock};
use rb_hub::Hub;
use rb_services::{BoardPolicy, BoardService, CleanupScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// Feature-gated imports: plugins are compiled to order
#[cfg(feature = "db-sqlite")]
use rb_db_sqlite::SqliteBoardRepo;

#[cfg(feature = "auth-simple")]
use rb_auth_simple::{Account, SimpleAuthProvider};

#[cfg(feature = "auth-remote")]
use rb_auth_remote::RemoteAuthProvider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let mut settings = Settings::load()?;

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    init_tracing(&settings.log);
    info!(version = env!("CARGO_PKG_VERSION"), "relay-board starting");

    // ── 3. Plugins ─────────────────────────────────────────────────────────────
    let repo = SqliteBoardRepo::connect(&settings.database.url, settings.database.max_connections).await?;
    let auth = build_auth(std::mem::take(&mut settings.auth))?;

    // ── 4. Core services ───────────────────────────────────────────────────────
    let (hub, hub_task) = Hub::spawn(settings.board.session_queue_capacity);

    let policy = BoardPolicy {
        comment_ttl: chrono::Duration::from_std(settings.board.comment_ttl())
            .context("board.comment_ttl_secs is out of range")?,
        auth_timeout: settings.board.auth_timeout(),
    };
    let board = Arc::new(BoardService::new(
        Arc::new(repo),
        Arc::clone(&auth),
        Arc::new(hub.clone()),
        Arc::new(SystemClock),
        policy,
    ));

    let shutdown = CancellationToken::new();
    let sweeper = CleanupScheduler::new(Arc::clone(&board), settings.board.cleanup_interval()).spawn(shutdown.clone());

    // ── 5. HTTP server with graceful shutdown ──────────────────────────────────
    let app = rb_api::router(AppState { board, auth, hub: hub.clone() });
    let addr: SocketAddr = settings
        .server
        .bind_address
        .parse()
        .with_context(|| format!("invalid server.bind_address {:?}", settings.server.bind_address))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    // Live-feed sockets are long-lived: release them as soon as the signal
    // arrives so the server can drain.
    let stop = {
        let hub = hub.clone();
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
            hub.shutdown();
        }
    };
    axum::serve(listener, app).with_graceful_shutdown(stop).await?;

    // Covers a server that exited on its own.
    shutdown.cancel();
    hub.shutdown();

    if let Err(e) = sweeper.await {
        warn!(error = %e, "comment sweeper ended abnormally");
    }
    if let Err(e) = hub_task.await {
        warn!(error = %e, "hub coordinator ended abnormally");
    }

    info!("relay-board stopped");
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    // RUST_LOG wins over the configured level.
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match log.level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!("WARN: log.level='{}' is not a valid tracing filter ({e}); falling back to 'info'", log.level);
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true);
    if log.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// The remote service wins when it is both compiled in and configured.
#[allow(unreachable_code, unused_variables)]
fn build_auth(auth: AuthSettings) -> anyhow::Result<Arc<dyn AuthProvider>> {
    #[cfg(feature = "auth-remote")]
    {
        if let Some(remote) = auth.remote {
            info!(base_url = %remote.base_url, "using remote auth service");
            let timeout = remote.timeout();
            let provider = RemoteAuthProvider::new(remote.base_url, remote.api_key, timeout)?;
            return Ok(Arc::new(provider));
        }
    }

    #[cfg(feature = "auth-simple")]
    {
        let accounts: Vec<Account> = auth
            .accounts
            .into_iter()
            .map(|a| Account {
                id: a.id,
                username: a.username,
                role: a.role,
                banned: a.banned,
                token_sha256: a.token_sha256,
            })
            .collect();
        if accounts.is_empty() {
            warn!("no auth accounts configured; only anonymous posting will work");
        }
        info!(accounts = accounts.len(), "using local account table");
        return Ok(Arc::new(SimpleAuthProvider::new(accounts)));
    }

    anyhow::bail!("no auth provider available: enable `auth-simple`, or `auth-remote` with `auth.remote` configured")
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
