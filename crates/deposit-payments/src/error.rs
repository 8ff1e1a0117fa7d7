//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// Required field missing, empty, or body of the wrong shape
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Amount not strictly positive (or too small to charge)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Processor call failed, timed out, or returned something unusable
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    InvalidSignature(String),

    /// Verified webhook payload could not be decoded
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Downstream ledger rejected or lost a confirmation
    #[error("Ledger error: {0}")]
    Ledger(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Ledger(_))
    }

    /// Stable machine-readable code for API responses
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::InvalidSignature(_) => "INVALID_SIGNATURE",
            Self::WebhookParse(_) => "WEBHOOK_PARSE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Ledger(_) => "LEDGER_ERROR",
        }
    }

    /// Get user-friendly message
    ///
    /// Never includes processor internals.
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "Missing required fields",
            Self::InvalidAmount(_) => "Invalid amount",
            Self::Upstream(_) => "Failed to create checkout session",
            Self::InvalidSignature(_) => "Invalid signature",
            Self::WebhookParse(_) => "Malformed event payload",
            Self::Config(_) => "Service configuration error.",
            Self::Ledger(_) => "An error occurred processing your request.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_message_hides_details() {
        let err = PaymentError::Upstream("card_declined: sk_live_abc leaked".into());
        assert!(!err.user_message().contains("sk_live"));
        assert_eq!(err.code(), "UPSTREAM_ERROR");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_validation_errors_not_retryable() {
        assert!(!PaymentError::InvalidRequest("username".into()).is_retryable());
        assert!(!PaymentError::InvalidAmount("-1".into()).is_retryable());
        assert!(!PaymentError::InvalidSignature("mismatch".into()).is_retryable());
    }
}
