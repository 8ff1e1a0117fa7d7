//! Mock Processor and Sink
//!
//! For testing and local demos. The mock processor opens fake sessions and
//! verifies webhooks with the real Stripe signing scheme.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::checkout::{CheckoutSession, SessionRequest};
use crate::error::{PaymentError, Result};
use crate::ledger::ConfirmationSink;
use crate::processor::PaymentProcessor;
use crate::signature::{self, DEFAULT_TOLERANCE_SECS};
use crate::webhook::{ConfirmationEvent, StripeEvent};

/// Mock payment processor
pub struct MockProcessor {
    webhook_secret: String,
    failure: Option<String>,
    delay: Option<Duration>,
    next_id: AtomicU64,
    requests: Mutex<Vec<SessionRequest>>,
}

impl MockProcessor {
    pub fn new(webhook_secret: &str) -> Self {
        Self {
            webhook_secret: webhook_secret.to_string(),
            failure: None,
            delay: None,
            next_id: AtomicU64::new(1),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Make every session creation fail with `reason`
    #[must_use]
    pub fn failing(mut self, reason: &str) -> Self {
        self.failure = Some(reason.to_string());
        self
    }

    /// Sleep before answering session creation
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Session requests received so far
    pub fn session_requests(&self) -> Vec<SessionRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn create_session(&self, request: &SessionRequest) -> Result<CheckoutSession> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(reason) = &self.failure {
            return Err(PaymentError::Upstream(reason.clone()));
        }

        let id = format!("cs_mock_{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        Ok(CheckoutSession {
            redirect_url: format!("https://checkout.mock/pay/{id}"),
            id,
            metadata: request.metadata.clone(),
        })
    }

    fn verify_and_parse_webhook(&self, payload: &[u8], signature: &str) -> Result<StripeEvent> {
        let now = chrono::Utc::now().timestamp();
        signature::verify(&self.webhook_secret, payload, signature, now, DEFAULT_TOLERANCE_SECS)?;
        StripeEvent::from_slice(payload)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Sink that records everything it receives
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ConfirmationEvent>>,
    fail: bool,
}

impl RecordingSink {
    /// A sink that records, then reports failure
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<ConfirmationEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ConfirmationSink for RecordingSink {
    async fn emit(&self, event: ConfirmationEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| PaymentError::Ledger("recording sink poisoned".into()))?
            .push(event);

        if self.fail {
            return Err(PaymentError::Ledger("ledger unavailable".into()));
        }
        Ok(())
    }
}
