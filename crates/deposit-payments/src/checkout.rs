//! Deposit Checkout Issuance
//!
//! Validates a deposit request and asks the processor for a hosted checkout
//! session. Nothing is stored locally; the only link between this request and
//! the later webhook is the correlation metadata attached here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};
use crate::money::to_minor_units;
use crate::processor::PaymentProcessor;

/// Metadata key carrying the username
pub const METADATA_USERNAME: &str = "username";

/// Metadata key carrying the caller's order id
pub const METADATA_ORDER_ID: &str = "orderId";

/// Default bound on the outbound processor call
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Deposit request as it arrives on the wire.
///
/// Every field is optional here so that absence is reported as
/// `InvalidRequest` instead of a deserializer error.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequestBody {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub order_id: Option<String>,

    #[serde(default)]
    pub amount: Option<Decimal>,
}

/// A validated deposit request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositRequest {
    pub username: String,
    pub order_id: String,
    pub amount: Decimal,
}

impl TryFrom<DepositRequestBody> for DepositRequest {
    type Error = PaymentError;

    fn try_from(body: DepositRequestBody) -> Result<Self> {
        let username = body.username.filter(|s| !s.trim().is_empty());
        let order_id = body.order_id.filter(|s| !s.trim().is_empty());

        let (Some(username), Some(order_id), Some(amount)) = (username, order_id, body.amount)
        else {
            return Err(PaymentError::InvalidRequest(
                "username, orderId and amount are required".into(),
            ));
        };

        if amount <= Decimal::ZERO {
            return Err(PaymentError::InvalidAmount(format!(
                "amount must be positive, got {amount}"
            )));
        }

        Ok(Self {
            username,
            order_id,
            amount,
        })
    }
}

/// Correlation data echoed back verbatim by the processor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationMetadata {
    pub username: String,
    pub order_id: String,
}

impl CorrelationMetadata {
    /// Metadata map as sent to the processor
    pub fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            (METADATA_USERNAME.to_string(), self.username.clone()),
            (METADATA_ORDER_ID.to_string(), self.order_id.clone()),
        ])
    }

    /// Recover correlation data from a processor metadata map
    pub fn from_map(map: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            username: map.get(METADATA_USERNAME)?.clone(),
            order_id: map.get(METADATA_ORDER_ID)?.clone(),
        })
    }
}

/// Where the hosted checkout sends the customer afterwards
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedirectUrls {
    pub success_url: String,
    pub cancel_url: String,
}

impl RedirectUrls {
    /// `{base}/success` and `{base}/cancel`
    pub fn from_base(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            success_url: format!("{base}/success"),
            cancel_url: format!("{base}/cancel"),
        }
    }
}

/// Everything the processor needs to open a checkout session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRequest {
    /// Charge in minor units
    pub unit_amount: i64,

    /// ISO currency code, lowercase
    pub currency: String,

    pub product_name: String,
    pub description: String,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: CorrelationMetadata,
}

impl SessionRequest {
    /// Build the session request for a validated deposit
    pub fn for_deposit(request: &DepositRequest, redirects: &RedirectUrls) -> Result<Self> {
        let unit_amount = to_minor_units(request.amount)?;
        if unit_amount <= 0 {
            return Err(PaymentError::InvalidAmount(format!(
                "{} rounds to zero minor units",
                request.amount
            )));
        }

        Ok(Self {
            unit_amount,
            currency: "usd".into(),
            product_name: "Account Deposit".into(),
            description: format!("Deposit for user {}", request.username),
            customer_email: format!("{}@example.com", request.username),
            success_url: redirects.success_url.clone(),
            cancel_url: redirects.cancel_url.clone(),
            metadata: CorrelationMetadata {
                username: request.username.clone(),
                order_id: request.order_id.clone(),
            },
        })
    }
}

/// Checkout session created by the processor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Processor session ID
    pub id: String,

    /// URL to redirect the customer to
    pub redirect_url: String,

    /// Correlation metadata as the processor stored it
    pub metadata: CorrelationMetadata,
}

/// Result of a successful deposit issuance
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositIntent {
    pub checkout_url: String,
    pub session_id: String,
}

/// Issues deposit checkout sessions
pub struct DepositIssuer {
    processor: Arc<dyn PaymentProcessor>,
    redirects: RedirectUrls,
    timeout: Duration,
}

impl DepositIssuer {
    pub fn new(processor: Arc<dyn PaymentProcessor>, redirects: RedirectUrls) -> Self {
        Self {
            processor,
            redirects,
            timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }

    /// Override the outbound call bound
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate `body` and open a checkout session for it.
    ///
    /// Makes exactly one processor call for a valid request and none for an
    /// invalid one. Calling twice with the same order id opens two sessions.
    pub async fn create_deposit(&self, body: DepositRequestBody) -> Result<DepositIntent> {
        let request = DepositRequest::try_from(body).inspect_err(|e| {
            tracing::warn!(error = %e, "Rejected deposit request");
        })?;
        let session_request = SessionRequest::for_deposit(&request, &self.redirects)
            .inspect_err(|e| tracing::warn!(error = %e, "Rejected deposit request"))?;

        let session = tokio::time::timeout(
            self.timeout,
            self.processor.create_session(&session_request),
        )
        .await
        .map_err(|_| {
            PaymentError::Upstream(format!(
                "{} did not answer within {:?}",
                self.processor.name(),
                self.timeout
            ))
        })
        .and_then(|result| result)
        .map_err(|e| {
            tracing::error!(order_id = %request.order_id, error = %e, "Deposit error");
            match e {
                PaymentError::Upstream(_) => e,
                other => PaymentError::Upstream(other.to_string()),
            }
        })?;

        if session.metadata != session_request.metadata {
            tracing::error!(
                order_id = %request.order_id,
                session_id = %session.id,
                "Processor altered correlation metadata"
            );
            return Err(PaymentError::Upstream(
                "correlation metadata did not round-trip".into(),
            ));
        }

        tracing::info!(
            order_id = %request.order_id,
            username = %request.username,
            amount = %request.amount,
            session_id = %session.id,
            "Created deposit checkout session"
        );

        Ok(DepositIntent {
            checkout_url: session.redirect_url,
            session_id: session.id,
        })
    }
}
