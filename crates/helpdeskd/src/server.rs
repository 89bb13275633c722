//! HTTP server for helpdeskd

use crate::presence::PresenceHub;
use crate::routes;
use crate::store::Store;
use anyhow::{Context, Result};
use axum::Router;
use chrono::Utc;
use helpdesk_common::{hash_password_with_cost, HelpdeskConfig};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Application state shared across handlers
pub struct AppState {
    pub store: Mutex<Store>,
    pub config: HelpdeskConfig,
    pub presence: PresenceHub,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: Store, config: HelpdeskConfig) -> Self {
        Self {
            store: Mutex::new(store),
            config,
            presence: PresenceHub::new(),
            start_time: Instant::now(),
        }
    }
}

/// All routes with tracing, ready to serve
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::session_routes())
        .merge(routes::admin_routes())
        .merge(routes::ticket_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Create the configured bootstrap admin if that username is free
pub fn ensure_bootstrap_admin(store: &Store, config: &HelpdeskConfig) -> Result<bool> {
    let Some(bootstrap) = &config.bootstrap_admin else {
        return Ok(false);
    };
    if store.find_admin(&bootstrap.username)?.is_some() {
        return Ok(false);
    }

    let hashed = hash_password_with_cost(&bootstrap.password, config.password)
        .context("hashing bootstrap admin password")?;
    let created = store
        .create_admin(&bootstrap.username, &hashed, &bootstrap.name, Utc::now())?
        .is_some();
    if created {
        info!("  Created bootstrap admin {}", bootstrap.username);
    }
    Ok(created)
}

/// Run the HTTP server until ctrl-c or SIGTERM
pub async fn run(config: HelpdeskConfig) -> Result<()> {
    let store = Store::open_at(&config.database.path)
        .with_context(|| format!("opening database {}", config.database.path))?;
    info!("  Database ready at {}", config.database.path);

    ensure_bootstrap_admin(&store, &config)?;
    if store.count_admins()? == 0 {
        warn!("  No admin accounts; set [bootstrap_admin] to create one");
    }
    let pruned = store.prune_expired_sessions(Utc::now())?;
    if pruned > 0 {
        info!("  Pruned {} expired sessions", pruned);
    }

    let addr = config.server.bind.clone();
    let state = Arc::new(AppState::new(store, config));
    let app = build_router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("  Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
