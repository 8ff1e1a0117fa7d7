//! Payment Processor Abstraction
//!
//! The issuer and the webhook handler only talk to the processor through
//! [`PaymentProcessor`], so tests can swap in [`crate::MockProcessor`].

use async_trait::async_trait;
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData,
    CreateCheckoutSessionPaymentMethodTypes, Currency,
};

use crate::checkout::{CheckoutSession, CorrelationMetadata, SessionRequest};
use crate::error::{PaymentError, Result};
use crate::signature::{self, DEFAULT_TOLERANCE_SECS};
use crate::webhook::StripeEvent;

/// Processor capabilities needed by the deposit flow
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Open a hosted checkout session
    async fn create_session(&self, request: &SessionRequest) -> Result<CheckoutSession>;

    /// Authenticate a webhook delivery over its raw bytes, then decode it.
    ///
    /// Must not look at `payload` as structured data before the signature
    /// has been checked.
    fn verify_and_parse_webhook(&self, payload: &[u8], signature: &str) -> Result<StripeEvent>;

    /// Processor name, for logs
    fn name(&self) -> &str;
}

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
    webhook_secret: String,
    tolerance_secs: i64,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str, webhook_secret: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret: webhook_secret.to_string(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Override the maximum accepted age of a signed delivery
    #[must_use]
    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Get the underlying Stripe client
    pub const fn inner(&self) -> &Client {
        &self.client
    }
}

fn parse_currency(code: &str) -> Result<Currency> {
    match code {
        "usd" => Ok(Currency::USD),
        other => Err(PaymentError::InvalidRequest(format!(
            "unsupported currency {other}"
        ))),
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn create_session(&self, request: &SessionRequest) -> Result<CheckoutSession> {
        let mut params = CreateCheckoutSession::new();
        params.customer_email = Some(&request.customer_email);
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.mode = Some(CheckoutSessionMode::Payment);
        params.payment_method_types = Some(vec![CreateCheckoutSessionPaymentMethodTypes::Card]);
        params.metadata = Some(request.metadata.to_map());

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency: parse_currency(&request.currency)?,
                unit_amount: Some(request.unit_amount),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: request.product_name.clone(),
                    description: Some(request.description.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Upstream(e.to_string()))?;

        let redirect_url = session
            .url
            .ok_or_else(|| PaymentError::Upstream("No checkout URL returned".into()))?;

        let metadata = session
            .metadata
            .as_ref()
            .and_then(CorrelationMetadata::from_map)
            .ok_or_else(|| PaymentError::Upstream("Session returned without metadata".into()))?;

        Ok(CheckoutSession {
            id: session.id.to_string(),
            redirect_url,
            metadata,
        })
    }

    fn verify_and_parse_webhook(&self, payload: &[u8], signature: &str) -> Result<StripeEvent> {
        let now = chrono::Utc::now().timestamp();
        signature::verify(&self.webhook_secret, payload, signature, now, self.tolerance_secs)?;
        StripeEvent::from_slice(payload)
    }

    fn name(&self) -> &str {
        "stripe"
    }
}
