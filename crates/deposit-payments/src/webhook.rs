//! Stripe Webhook Handling
//!
//! Turns authenticated Stripe deliveries into [`ConfirmationEvent`]s for the
//! downstream ledger. Every verified delivery is acknowledged, whatever the
//! event type and whatever the ledger does with it.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::checkout::CorrelationMetadata;
use crate::error::{PaymentError, Result};
use crate::ledger::ConfirmationSink;
use crate::money::from_minor_units;
use crate::processor::PaymentProcessor;

/// Event type for a finished checkout
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

/// Event type for a delayed payment method settling after checkout
pub const CHECKOUT_SESSION_ASYNC_PAYMENT_SUCCEEDED: &str =
    "checkout.session.async_payment_succeeded";

/// Stripe event envelope
#[derive(Clone, Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    /// Decode an already-verified payload
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| PaymentError::WebhookParse(e.to_string()))
    }
}

/// The parts of a checkout session object we read
#[derive(Clone, Debug, Deserialize)]
struct SessionObject {
    id: String,
    amount_total: Option<i64>,
    currency: Option<String>,
    payment_status: Option<String>,
    metadata: Option<HashMap<String, String>>,
}

/// What kind of completion produced a confirmation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationKind {
    SessionCompleted,
    AsyncPaymentSucceeded,
}

/// Confirmed deposit, ready for crediting
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationEvent {
    #[serde(rename = "type")]
    pub kind: ConfirmationKind,

    /// Stripe event ID of the delivery
    pub event_id: String,

    /// Checkout session ID; the ledger's dedup key
    pub session_id: String,

    pub username: String,
    pub order_id: String,

    /// Major units, converted exactly from `amount_total`
    pub amount_paid: Decimal,

    pub currency: Option<String>,
}

/// Classified webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Payment collected; credit the user
    Confirmed(ConfirmationEvent),

    /// Checkout finished but the payment has not settled yet
    AwaitingPayment { session_id: String },

    /// Completion we cannot attribute or value
    Unmatched { session_id: String, reason: String },

    /// Unhandled event type
    Other { event_type: String },
}

impl WebhookEvent {
    /// Classify a verified Stripe event
    pub fn from_stripe(event: &StripeEvent) -> Result<Self> {
        let kind = match event.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => ConfirmationKind::SessionCompleted,
            CHECKOUT_SESSION_ASYNC_PAYMENT_SUCCEEDED => ConfirmationKind::AsyncPaymentSucceeded,
            _ => {
                return Ok(Self::Other {
                    event_type: event.event_type.clone(),
                });
            }
        };

        let session: SessionObject = serde_json::from_value(event.data.object.clone())
            .map_err(|e| PaymentError::WebhookParse(format!("Invalid checkout session data: {e}")))?;

        if kind == ConfirmationKind::SessionCompleted
            && session.payment_status.as_deref() == Some("unpaid")
        {
            return Ok(Self::AwaitingPayment {
                session_id: session.id,
            });
        }

        let Some(metadata) = session
            .metadata
            .as_ref()
            .and_then(CorrelationMetadata::from_map)
        else {
            return Ok(Self::Unmatched {
                session_id: session.id,
                reason: "missing correlation metadata".into(),
            });
        };

        let Some(amount_total) = session.amount_total else {
            return Ok(Self::Unmatched {
                session_id: session.id,
                reason: "missing amount_total".into(),
            });
        };

        Ok(Self::Confirmed(ConfirmationEvent {
            kind,
            event_id: event.id.clone(),
            session_id: session.id,
            username: metadata.username,
            order_id: metadata.order_id,
            amount_paid: from_minor_units(amount_total),
            currency: session.currency,
        }))
    }
}

/// Webhook handler
pub struct WebhookHandler {
    processor: Arc<dyn PaymentProcessor>,
    sink: Arc<dyn ConfirmationSink>,
}

impl WebhookHandler {
    pub fn new(processor: Arc<dyn PaymentProcessor>, sink: Arc<dyn ConfirmationSink>) -> Self {
        Self { processor, sink }
    }

    /// Verify, classify, and forward one delivery.
    ///
    /// Errors only for authentication failures and undecodable envelopes.
    /// Ledger failures are logged and swallowed: the delivery is still
    /// acknowledged, and duplicate deliveries are forwarded again for the
    /// ledger to deduplicate by session id.
    pub async fn handle(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookEvent> {
        let Some(signature) = signature else {
            tracing::warn!(target: "security", bytes = payload.len(), "Webhook without signature header");
            return Err(PaymentError::InvalidSignature("missing stripe-signature header".into()));
        };

        let event = self
            .processor
            .verify_and_parse_webhook(payload, signature)
            .inspect_err(|e| match e {
                PaymentError::InvalidSignature(reason) => tracing::warn!(
                    target: "security",
                    processor = self.processor.name(),
                    reason = %reason,
                    bytes = payload.len(),
                    "Webhook signature error"
                ),
                other => tracing::warn!(error = %other, "Rejected verified webhook payload"),
            })?;

        tracing::info!(event_id = %event.id, event_type = %event.event_type, "Processing Stripe webhook");

        let parsed = WebhookEvent::from_stripe(&event)
            .inspect_err(|e| tracing::warn!(event_id = %event.id, error = %e, "Rejected verified webhook payload"))?;

        match &parsed {
            WebhookEvent::Confirmed(confirmation) => {
                tracing::info!(
                    username = %confirmation.username,
                    order_id = %confirmation.order_id,
                    amount_paid = %confirmation.amount_paid,
                    session_id = %confirmation.session_id,
                    "Payment confirmed"
                );

                if let Err(e) = self.sink.emit(confirmation.clone()).await {
                    tracing::error!(
                        session_id = %confirmation.session_id,
                        error = %e,
                        "Ledger did not accept confirmation"
                    );
                }
            }

            WebhookEvent::AwaitingPayment { session_id } => {
                tracing::info!(session_id = %session_id, "Checkout completed, payment pending");
            }

            WebhookEvent::Unmatched { session_id, reason } => {
                tracing::error!(session_id = %session_id, reason = %reason, "Cannot attribute completed checkout");
            }

            WebhookEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
            }
        }

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockProcessor, RecordingSink};
    use crate::signature;
    use rust_decimal_macros::dec;
    use serde_json::json;

    const SECRET: &str = "whsec_test";

    fn completed_body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "livemode": false,
            "data": { "object": {
                "id": "cs_test_1",
                "object": "checkout.session",
                "amount_total": 2500,
                "currency": "usd",
                "payment_status": "paid",
                "metadata": { "username": "alice", "orderId": "ord-1" }
            }}
        }))
        .unwrap()
    }

    fn signed(body: &[u8]) -> String {
        signature::sign(SECRET, chrono::Utc::now().timestamp(), body).unwrap()
    }

    fn handler(sink: &Arc<RecordingSink>) -> WebhookHandler {
        WebhookHandler::new(Arc::new(MockProcessor::new(SECRET)), sink.clone())
    }

    #[tokio::test]
    async fn test_completed_session_emits_one_confirmation() {
        let sink = Arc::new(RecordingSink::default());
        let body = completed_body();

        let outcome = handler(&sink).handle(&body, Some(&signed(&body))).await.unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.kind, ConfirmationKind::SessionCompleted);
        assert_eq!(event.username, "alice");
        assert_eq!(event.order_id, "ord-1");
        assert_eq!(event.session_id, "cs_test_1");
        assert_eq!(event.amount_paid, dec!(25.00));
        assert_eq!(outcome, WebhookEvent::Confirmed(event.clone()));
    }

    #[tokio::test]
    async fn test_tampered_body_rejected_before_parsing() {
        let sink = Arc::new(RecordingSink::default());
        let body = completed_body();
        let header = signed(&body);
        let mut tampered = body.clone();
        let pos = tampered.iter().position(|b| *b == b'2').unwrap();
        tampered[pos] = b'9';

        let err = handler(&sink).handle(&tampered, Some(&header)).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature(_)));
        assert!(sink.events().is_empty());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_signature_failures_logged_under_security_target() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let sink = Arc::new(RecordingSink::default());
        let handler = handler(&sink);
        let body = completed_body();
        let header = signed(&body);
        let mut tampered = body.clone();
        tampered[0] = b' ';

        assert!(handler.handle(&tampered, Some(&header)).await.is_err());
        assert!(handler.handle(&body, None).await.is_err());

        let output = logs.contents();
        let security_lines: Vec<_> = output
            .lines()
            .filter(|line| line.contains("WARN security:"))
            .collect();
        assert_eq!(security_lines.len(), 2, "{output}");
        assert!(security_lines[0].contains("Webhook signature error"));
        assert!(security_lines[1].contains("Webhook without signature header"));

        handler.handle(&body, Some(&header)).await.unwrap();
        assert_eq!(
            logs.contents().matches("WARN security:").count(),
            2,
            "valid deliveries must not log under the security target"
        );
    }

    #[tokio::test]
    async fn test_missing_signature_header() {
        let sink = Arc::new(RecordingSink::default());
        let err = handler(&sink).handle(&completed_body(), None).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature(_)));
    }

    #[tokio::test]
    async fn test_unrecognized_event_ignored() {
        let sink = Arc::new(RecordingSink::default());
        let body = serde_json::to_vec(&json!({
            "id": "evt_2",
            "type": "customer.created",
            "data": { "object": { "id": "cus_1" } }
        }))
        .unwrap();

        let outcome = handler(&sink).handle(&body, Some(&signed(&body))).await.unwrap();
        assert_eq!(outcome, WebhookEvent::Other { event_type: "customer.created".into() });
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_ledger_failure_does_not_fail_delivery() {
        let sink = Arc::new(RecordingSink::failing());
        let body = completed_body();

        let outcome = handler(&sink).handle(&body, Some(&signed(&body))).await;
        assert!(matches!(outcome, Ok(WebhookEvent::Confirmed(_))));
    }

    #[tokio::test]
    async fn test_duplicate_delivery_forwarded_twice() {
        let sink = Arc::new(RecordingSink::default());
        let handler = Arc::new(handler(&sink));
        let body = completed_body();
        let header = signed(&body);

        let (first, second) = tokio::join!(
            handler.handle(&body, Some(&header)),
            handler.handle(&body, Some(&header)),
        );
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(sink.events().len(), 2);
    }

    #[test]
    fn test_unpaid_completion_awaits_payment() {
        let event = StripeEvent::from_slice(
            &serde_json::to_vec(&json!({
                "id": "evt_3",
                "type": "checkout.session.completed",
                "data": { "object": {
                    "id": "cs_2",
                    "amount_total": 1000,
                    "payment_status": "unpaid",
                    "metadata": { "username": "bob", "orderId": "ord-2" }
                }}
            }))
            .unwrap(),
        )
        .unwrap();

        assert_eq!(
            WebhookEvent::from_stripe(&event).unwrap(),
            WebhookEvent::AwaitingPayment { session_id: "cs_2".into() }
        );
    }

    #[test]
    fn test_async_payment_succeeded_confirms() {
        let event = StripeEvent::from_slice(
            &serde_json::to_vec(&json!({
                "id": "evt_4",
                "type": "checkout.session.async_payment_succeeded",
                "data": { "object": {
                    "id": "cs_2",
                    "amount_total": 1999,
                    "payment_status": "paid",
                    "metadata": { "username": "bob", "orderId": "ord-2" }
                }}
            }))
            .unwrap(),
        )
        .unwrap();

        let WebhookEvent::Confirmed(confirmation) = WebhookEvent::from_stripe(&event).unwrap() else {
            panic!("expected confirmation");
        };
        assert_eq!(confirmation.kind, ConfirmationKind::AsyncPaymentSucceeded);
        assert_eq!(confirmation.amount_paid, dec!(19.99));
    }

    #[test]
    fn test_missing_metadata_is_unmatched() {
        let event = StripeEvent::from_slice(
            &serde_json::to_vec(&json!({
                "id": "evt_5",
                "type": "checkout.session.completed",
                "data": { "object": { "id": "cs_3", "amount_total": 500, "metadata": null } }
            }))
            .unwrap(),
        )
        .unwrap();

        assert!(matches!(
            WebhookEvent::from_stripe(&event).unwrap(),
            WebhookEvent::Unmatched { .. }
        ));
    }

    #[test]
    fn test_confirmation_serializes_type_tag() {
        let event = ConfirmationEvent {
            kind: ConfirmationKind::SessionCompleted,
            event_id: "evt_1".into(),
            session_id: "cs_1".into(),
            username: "alice".into(),
            order_id: "ord-1".into(),
            amount_paid: dec!(25.00),
            currency: Some("usd".into()),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "session_completed");
        assert_eq!(value["orderId"], "ord-1");
        assert_eq!(value["amountPaid"], "25.00");
    }
}
