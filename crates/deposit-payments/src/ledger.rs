//! Downstream Crediting
//!
//! The webhook handler hands every confirmation to a [`ConfirmationSink`].
//! Deliveries are at-least-once: Stripe redelivers, and two deliveries of the
//! same event may arrive concurrently. A sink that moves money must
//! deduplicate by `session_id`; [`MemoryLedger`] does.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{PaymentError, Result};
use crate::webhook::ConfirmationEvent;

/// Receiver of confirmed deposits
#[async_trait]
pub trait ConfirmationSink: Send + Sync {
    /// Accept one confirmation. May be called more than once per session.
    async fn emit(&self, event: ConfirmationEvent) -> Result<()>;
}

/// Sink that only logs
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

#[async_trait]
impl ConfirmationSink for LogSink {
    async fn emit(&self, event: ConfirmationEvent) -> Result<()> {
        tracing::info!(
            username = %event.username,
            order_id = %event.order_id,
            amount_paid = %event.amount_paid,
            stripe_session_id = %event.session_id,
            "PAYMENT CONFIRMED"
        );
        Ok(())
    }
}

/// Outcome of crediting one confirmation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreditOutcome {
    /// Balance credited; new balance attached
    Applied { balance: Decimal },

    /// Session already credited, nothing changed
    Duplicate,
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<String, Decimal>,
    by_session: HashMap<String, ConfirmationEvent>,
}

/// In-memory ledger (for development)
///
/// Credits user balances, at most once per checkout session.
#[derive(Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned<T>(_: T) -> PaymentError {
        PaymentError::Ledger("ledger lock poisoned".into())
    }

    /// Credit `event`, atomically with the duplicate check
    pub fn credit(&self, event: &ConfirmationEvent) -> Result<CreditOutcome> {
        let mut state = self.state.write().map_err(Self::poisoned)?;

        if state.by_session.contains_key(&event.session_id) {
            return Ok(CreditOutcome::Duplicate);
        }

        let balance = state
            .balances
            .entry(event.username.clone())
            .or_insert(Decimal::ZERO);
        *balance += event.amount_paid;
        let balance = *balance;

        state
            .by_session
            .insert(event.session_id.clone(), event.clone());

        Ok(CreditOutcome::Applied { balance })
    }

    /// Current balance of `username` (zero if never credited)
    pub fn balance(&self, username: &str) -> Result<Decimal> {
        let state = self.state.read().map_err(Self::poisoned)?;
        Ok(state.balances.get(username).copied().unwrap_or(Decimal::ZERO))
    }

    /// The confirmation a session was credited with, if any
    pub fn credited(&self, session_id: &str) -> Result<Option<ConfirmationEvent>> {
        let state = self.state.read().map_err(Self::poisoned)?;
        Ok(state.by_session.get(session_id).cloned())
    }
}

#[async_trait]
impl ConfirmationSink for MemoryLedger {
    async fn emit(&self, event: ConfirmationEvent) -> Result<()> {
        match self.credit(&event)? {
            CreditOutcome::Applied { balance } => tracing::info!(
                username = %event.username,
                order_id = %event.order_id,
                amount_paid = %event.amount_paid,
                balance = %balance,
                "Credited deposit"
            ),
            CreditOutcome::Duplicate => tracing::info!(
                session_id = %event.session_id,
                order_id = %event.order_id,
                "Ignoring duplicate confirmation"
            ),
        }
        Ok(())
    }
}

/// Hands confirmations to a background worker.
///
/// `emit` only enqueues, so the webhook response never waits on crediting.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ConfirmationEvent>,
}

impl ChannelSink {
    /// Spawn a worker draining into `downstream`.
    ///
    /// The worker stops once every `ChannelSink` clone is dropped.
    pub fn spawn(downstream: Arc<dyn ConfirmationSink>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ConfirmationEvent>();

        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let session_id = event.session_id.clone();
                if let Err(e) = downstream.emit(event).await {
                    tracing::error!(session_id = %session_id, error = %e, "Crediting failed");
                }
            }
            tracing::debug!("Confirmation worker stopped");
        });

        (Self { tx }, worker)
    }
}

#[async_trait]
impl ConfirmationSink for ChannelSink {
    async fn emit(&self, event: ConfirmationEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| PaymentError::Ledger("confirmation worker stopped".into()))
    }
}
