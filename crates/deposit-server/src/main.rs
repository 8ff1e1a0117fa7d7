//! deposit-server
//!
//! Axum server exposing deposit checkout creation and the Stripe webhook.

mod config;
mod handlers;
mod shutdown;
mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deposit_payments::{
    ChannelSink, DepositIssuer, MemoryLedger, RedirectUrls, StripeClient, WebhookHandler,
};

use crate::config::ServerConfig;
use crate::handlers::{create_deposit, health_check, stripe_webhook};
use crate::shutdown::{serve_and_drain, shutdown_signal};
use crate::state::AppState;

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/transaction/deposit-create", post(create_deposit))
        .route("/api/v1/stripe/webhook", post(stripe_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env().inspect_err(|e| {
        tracing::error!("Configuration error: {}", e);
        tracing::error!("  Set STRIPE_SECRET_KEY, STRIPE_WEBHOOK_SECRET and BASE_URL in .env");
    })?;

    let stripe = Arc::new(
        StripeClient::new(&config.processor_secret_key, &config.webhook_signing_secret)
            .with_tolerance(config.webhook_tolerance_secs),
    );

    // Crediting runs on a background worker so webhook acks never wait on it
    let ledger = Arc::new(MemoryLedger::new());
    let (sink, worker) = ChannelSink::spawn(ledger);

    let issuer = DepositIssuer::new(stripe.clone(), RedirectUrls::from_base(&config.base_url))
        .with_timeout(config.upstream_timeout);

    let state = AppState {
        issuer: Arc::new(issuer),
        webhooks: Arc::new(WebhookHandler::new(stripe, Arc::new(sink))),
        stripe_configured: true,
    };

    let app = router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server running on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                            - Health check");
    tracing::info!("  POST /api/v1/transaction/deposit-create - Create deposit checkout");
    tracing::info!("  POST /api/v1/stripe/webhook             - Stripe webhook");

    serve_and_drain(listener, app, worker, shutdown_signal()).await
}
