use async_trait::async_trait;

use super::{SmsError, SmsProvider};

/// Development provider: writes the message to the log instead of sending it.
#[derive(Debug, Default)]
pub struct ConsoleSmsProvider;

#[async_trait]
impl SmsProvider for ConsoleSmsProvider {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError> {
        tracing::info!(to, body, "sms (console provider, not delivered)");
        Ok(())
    }
}
