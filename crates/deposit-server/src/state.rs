//! Application State

use std::sync::Arc;

use deposit_payments::{DepositIssuer, WebhookHandler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Opens checkout sessions for deposit requests
    pub issuer: Arc<DepositIssuer>,

    /// Verifies and forwards Stripe webhooks
    pub webhooks: Arc<WebhookHandler>,

    /// Whether the live Stripe client is wired in (false for mock processors)
    pub stripe_configured: bool,
}
