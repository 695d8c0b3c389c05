//! Payment Error Types

use spendlocal_core::CoreError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Record store failure underneath a payment operation
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Stripe API error
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Completion event does not point at a known subscription of its owner
    #[error("Correlation failed: {0}")]
    Correlation(String),

    /// Charge amount is zero, negative or not representable in cents
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Subscription is cancelled or expired and cannot be activated
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payment hand-off could not be started
    #[error("Payment dispatch failed: {0}")]
    Dispatch(String),

    /// External payment call did not answer in time
    #[error("Payment provider timeout after {0}s")]
    Timeout(u64),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::Core(e) => e.is_retryable(),
            PaymentError::Stripe(_) | PaymentError::Dispatch(_) | PaymentError::Timeout(_) => true,
            _ => false,
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            PaymentError::Stripe(_) | PaymentError::Dispatch(_) | PaymentError::Timeout(_) => {
                "Payment processing failed. Please try again."
            }
            PaymentError::WebhookSignature(_) | PaymentError::WebhookParse(_) => {
                "Invalid payment notification."
            }
            PaymentError::Correlation(_) => "Payment could not be matched to a subscription.",
            PaymentError::InvalidAmount(_) => "Payment amount must be greater than zero.",
            PaymentError::InvalidTransition(_) => "This subscription can no longer be activated.",
            PaymentError::Config(_) => "Service configuration error.",
            PaymentError::Core(_) => "An error occurred processing your request.",
        }
    }
}

/// Purchase failures, kept apart so callers can tell "could not reserve"
/// from "could not start payment"
#[derive(Error, Debug)]
pub enum PurchaseError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// The pending subscription was not written; no payment was attempted
    #[error("Reservation failed: {0}")]
    Reservation(#[source] CoreError),

    /// The pending subscription exists but the payment hand-off failed
    #[error("Payment dispatch failed for subscription {subscription_id}: {source}")]
    PaymentDispatch {
        subscription_id: String,
        #[source]
        source: PaymentError,
    },
}

impl PurchaseError {
    /// Stable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            PurchaseError::Validation(_) => "VALIDATION_ERROR",
            PurchaseError::Reservation(_) => "RESERVATION_FAILED",
            PurchaseError::PaymentDispatch { .. } => "PAYMENT_DISPATCH_FAILED",
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, PurchaseError::Validation(_))
    }

    pub fn user_message(&self) -> String {
        match self {
            PurchaseError::Validation(msg) => msg.clone(),
            PurchaseError::Reservation(_) => {
                "We could not reserve your ad space. Please try again.".into()
            }
            PurchaseError::PaymentDispatch { .. } => {
                "Your ad space is reserved but payment could not be started. Please try again or contact support.".into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purchase_error_codes_are_distinct() {
        let reservation = PurchaseError::Reservation(CoreError::Storage("down".into()));
        let dispatch = PurchaseError::PaymentDispatch {
            subscription_id: "sub_1".into(),
            source: PaymentError::Dispatch("no launcher".into()),
        };
        assert_ne!(reservation.code(), dispatch.code());
        assert!(reservation.is_retryable());
        assert!(dispatch.is_retryable());
        assert!(!PurchaseError::Validation("town is required".into()).is_retryable());
    }

    #[test]
    fn test_core_errors_keep_their_retryability() {
        assert!(PaymentError::from(CoreError::Timeout(10)).is_retryable());
        assert!(!PaymentError::from(CoreError::Validation("x".into())).is_retryable());
        assert!(!PaymentError::Correlation("unknown".into()).is_retryable());
    }
}
