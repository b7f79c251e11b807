//! Application configuration

use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the server binds to
    pub bind_address: String,
    /// Static API key required on every route except the webhook
    pub api_key: String,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// `BIND_ADDRESS` wins when set; otherwise `PORT` picks the port on
    /// all interfaces.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_address = env::var("BIND_ADDRESS").unwrap_or_else(|_| {
            let port = env::var("PORT").unwrap_or_else(|_| "3001".to_string());
            format!("0.0.0.0:{port}")
        });

        Ok(Self {
            bind_address,
            api_key: env::var("API_KEY").map_err(|_| ConfigError::Missing("API_KEY"))?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
