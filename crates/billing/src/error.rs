//! Billing error types

use thiserror::Error;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Stripe API error: {message}")]
    Provider {
        code: Option<String>,
        message: String,
    },

    #[error("Price not found: {0}")]
    PriceNotFound(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Subscription has no line items: {0}")]
    NoLineItems(String),

    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Provider failure without a machine-readable error code.
    pub fn provider(message: impl Into<String>) -> Self {
        BillingError::Provider {
            code: None,
            message: message.into(),
        }
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        match err {
            stripe::StripeError::Stripe(req) => BillingError::Provider {
                code: req.code.as_ref().map(|c| c.to_string()),
                message: req
                    .message
                    .clone()
                    .unwrap_or_else(|| "unknown Stripe error".to_string()),
            },
            other => BillingError::provider(other.to_string()),
        }
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
