//! TaskFlow API server.
//!
//! Wires the auth core to its collaborators (SQLite credential store,
//! logging mailer), starts the reset-registry sweeper, and serves the
//! HTTP routes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{routing::get, Json, Router};
use chrono::Utc;
use dotenv::dotenv;
use serde_json::json;
use tokio::{net::TcpListener, time::interval};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskflow_backend::auth::{
    api, AppState, AuthService, ResetTokenRegistry, TokenService, UserStore,
};
use taskflow_backend::config::Config;
use taskflow_backend::mailer::{LogMailer, Mailer};

const RESET_SWEEP_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    // Creates the schema and seeds/refreshes the canonical roles.
    let store = Arc::new(
        UserStore::new(&config.db_path).context("failed to initialize credential store")?,
    );
    info!(db_path = %config.db_path, "credential store ready");

    let tokens = Arc::new(TokenService::new(
        config.jwt_secret.clone(),
        config.password_reset_secret.clone(),
    ));
    let reset_tokens = Arc::new(ResetTokenRegistry::new());
    let mailer: Arc<dyn Mailer> = Arc::new(LogMailer);

    let auth = Arc::new(AuthService::new(
        store,
        tokens.clone(),
        reset_tokens.clone(),
        mailer,
        config.frontend_base_url.clone(),
    ));

    // Periodic sweep keeps the reset registry bounded; redeemed tokens are
    // already gone, expired ones are dropped here.
    {
        let registry = reset_tokens.clone();
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(RESET_SWEEP_INTERVAL_SECS));
            loop {
                ticker.tick().await;
                let removed = registry.sweep(Utc::now());
                if removed > 0 {
                    debug!(removed, "swept expired password reset tokens");
                }
            }
        });
    }

    let state = AppState { auth, tokens };
    let app = Router::new()
        .route("/health", get(health))
        .merge(api::router(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!("taskflow api listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
