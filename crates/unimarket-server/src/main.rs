//! UniMarket Server: application entry point.

mod config;
mod error;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use unimarket_auth::{AuthRepositories, AuthService};
use unimarket_store::repository::{
    InMemoryRateLimitRepository, InMemorySecurityEventRepository, InMemorySessionRepository,
    InMemoryUserRepository,
};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::routes::{Auth, TrustedProxies};

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "unimarket_server=info,unimarket_auth=info,unimarket_store=info,security=info",
        )
    });
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    info!("Starting UniMarket server...");

    if let Err(err) = run().await {
        error!(error = %err, "UniMarket server failed");
        std::process::exit(1);
    }

    info!("UniMarket server stopped.");
}

async fn run() -> Result<(), ServerError> {
    let config = ServerConfig::from_env()?;
    if config.auth.jwt_private_key_pem.is_empty() || config.auth.jwt_public_key_pem.is_empty() {
        return Err(ServerError::Config(
            "UNIMARKET_JWT_PRIVATE_KEY and UNIMARKET_JWT_PUBLIC_KEY are required".into(),
        ));
    }
    if config.auth.mfa_encryption_key.is_none() {
        warn!("UNIMARKET_MFA_KEY not set, TOTP enrollment is disabled");
    }

    let users = match config.auth.pepper.clone() {
        Some(pepper) => InMemoryUserRepository::with_pepper(pepper),
        None => InMemoryUserRepository::new(),
    };
    if config.seed_demo_users {
        unimarket_store::seed_demo_users(&users).await?;
    }

    let auth = Arc::new(AuthService::new(
        AuthRepositories {
            users,
            sessions: InMemorySessionRepository::new(),
            ip_limits: InMemoryRateLimitRepository::new(),
            identity_limits: InMemoryRateLimitRepository::new(),
            events: InMemorySecurityEventRepository::new(),
        },
        config.auth.clone(),
    ));

    tokio::spawn(housekeeping(
        auth.clone(),
        Duration::from_secs(config.housekeeping_secs.max(1)),
    ));

    if !config.trusted_proxies.is_empty() {
        info!(proxies = ?config.trusted_proxies, "honoring X-Forwarded-For from trusted proxies");
    }
    let app = routes::router(auth, TrustedProxies::new(config.trusted_proxies.clone()));
    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("Listening on {}", config.listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

/// Periodically drop idle sessions and stale rate-limit entries.
async fn housekeeping(auth: Arc<Auth>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match auth.sessions().purge_idle().await {
            Ok(removed) if removed > 0 => info!(removed, "idle sessions purged"),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "session purge failed"),
        }

        let now = Utc::now();
        let gate = auth.gate();
        let stale = gate.ip().store().purge_stale(gate.ip().policy().window, now)
            + gate
                .identity()
                .store()
                .purge_stale(gate.identity().policy().window, now);
        if stale > 0 {
            info!(stale, "stale rate-limit entries purged");
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
    info!("Gracefully shutdown");
}
