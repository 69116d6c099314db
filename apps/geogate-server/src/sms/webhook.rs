//! SMS gateway reached by a JSON POST.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{SmsError, SmsProvider};

pub struct WebhookSmsProvider {
    client: Client,
    url: String,
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    to: &'a str,
    body: &'a str,
}

impl WebhookSmsProvider {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SmsProvider for WebhookSmsProvider {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError> {
        self.client
            .post(&self.url)
            .json(&OutgoingMessage { to, body })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SmsError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(body_json(json!({"to": "+35799123456", "body": "hello"})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let provider = WebhookSmsProvider::new(Client::new(), format!("{}/send", server.uri()));
        provider.send("+35799123456", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn gateway_error_is_send_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = WebhookSmsProvider::new(Client::new(), server.uri());
        assert!(matches!(
            provider.send("+35799123456", "hello").await,
            Err(SmsError::SendFailed(_))
        ));
    }
}
