//! # deposit-payments
//!
//! Account deposits through Stripe Checkout (hosted), confirmed by webhook.
//!
//! ## Flow
//!
//! ```text
//! ┌────────┐  deposit   ┌───────────────┐  create session  ┌────────┐
//! │ Client │──────────▶│ DepositIssuer │────────────────▶│ Stripe │
//! └────────┘◀──────────└───────────────┘                  └────────┘
//!            checkoutUrl                                       │ signed webhook
//!                       ┌────────────────┐  confirmation  ┌────▼───────────┐
//!                       │ Ledger (sink)  │◀──────────────│ WebhookHandler │
//!                       └────────────────┘                └────────────────┘
//! ```
//!
//! The issuer and the handler share no state. `{username, orderId}` travels
//! as checkout session metadata and comes back inside the webhook payload.
//!
//! ## Guarantees
//!
//! - Amounts are converted with exact decimal arithmetic in both directions
//!   (`19.99` ⇄ `1999`).
//! - Webhook signatures are checked over the raw body before it is decoded.
//! - Every authenticated delivery is acknowledged, even unknown event types
//!   and deliveries the ledger fails to accept.
//! - Duplicate deliveries are passed through; sinks deduplicate by session id.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use deposit_payments::{DepositIssuer, DepositRequestBody, RedirectUrls, StripeClient};
//!
//! let stripe = Arc::new(StripeClient::new("sk_test_xxx", "whsec_xxx"));
//! let issuer = DepositIssuer::new(stripe, RedirectUrls::from_base("https://yoursite.com"));
//!
//! let intent = issuer.create_deposit(DepositRequestBody {
//!     username: Some("alice".into()),
//!     order_id: Some("ord-1".into()),
//!     amount: Some("19.99".parse()?),
//! }).await?;
//!
//! // Redirect user to: intent.checkout_url
//! ```

mod checkout;
mod error;
mod ledger;
mod mock;
mod processor;
mod webhook;

pub mod money;
pub mod signature;

pub use checkout::{
    CheckoutSession, CorrelationMetadata, DepositIntent, DepositIssuer, DepositRequest,
    DepositRequestBody, RedirectUrls, SessionRequest, DEFAULT_UPSTREAM_TIMEOUT,
};
pub use error::{PaymentError, Result};
pub use ledger::{ChannelSink, ConfirmationSink, CreditOutcome, LogSink, MemoryLedger};
pub use mock::{MockProcessor, RecordingSink};
pub use processor::{PaymentProcessor, StripeClient};
pub use webhook::{
    ConfirmationEvent, ConfirmationKind, StripeEvent, WebhookEvent, WebhookHandler,
    CHECKOUT_SESSION_ASYNC_PAYMENT_SUCCEEDED, CHECKOUT_SESSION_COMPLETED,
};
