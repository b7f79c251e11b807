//! Stripe client configuration

use stripe::Client;

use crate::error::{BillingError, BillingResult};

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Stripe publishable key (handed to browser-side payment elements)
    pub publishable_key: String,
    /// Stripe webhook signing secret
    pub webhook_secret: String,
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?,
            publishable_key: std::env::var("STRIPE_PUBLISH_KEY")
                .map_err(|_| BillingError::Config("STRIPE_PUBLISH_KEY not set".to_string()))?,
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?,
        })
    }
}

/// Stripe billing client
///
/// Wraps the async-stripe client plus a plain HTTP client for the
/// subscription-schedule endpoints the 0.39 bindings do not cover.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    http: reqwest::Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self {
            client,
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the raw HTTP client
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}
