//! SMS module for activation codes.
//!
//! Delivery is pluggable through [`SmsProvider`]; [`SmsVerifier`] owns the
//! code lifecycle (issue, rate limit, verify, burn).

mod console;
mod verifier;
mod webhook;

pub use console::ConsoleSmsProvider;
pub use verifier::SmsVerifier;
pub use webhook::WebhookSmsProvider;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{SmsConfig, SmsProviderConfig};

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("Failed to send SMS: {0}")]
    SendFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("too many codes requested, try again later")]
    RateLimited,

    #[error("no active verification code, request a new one")]
    NoActiveCode,

    #[error("incorrect verification code, {remaining} attempts left")]
    Mismatch { remaining: u32 },

    #[error("too many incorrect attempts, request a new code")]
    Burned,

    #[error("verification state unavailable: {0}")]
    Backend(String),
}

/// Trait for SMS providers
#[async_trait]
pub trait SmsProvider: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError>;
}

/// Create an SMS provider from configuration
pub fn create_provider(config: &SmsConfig) -> Result<Arc<dyn SmsProvider>, SmsError> {
    match &config.provider {
        SmsProviderConfig::Console => Ok(Arc::new(ConsoleSmsProvider)),
        SmsProviderConfig::Webhook { url } => {
            let client = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .map_err(|e| SmsError::InvalidConfig(e.to_string()))?;
            Ok(Arc::new(WebhookSmsProvider::new(client, url.clone())))
        }
    }
}

#[cfg(test)]
pub use recording::RecordingSmsProvider;
