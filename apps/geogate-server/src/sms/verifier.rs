use std::sync::Arc;
use std::time::Duration;

use geogate_crypto::{generate_verification_code, hash_verification_code, verify_code_hash};
use geogate_storage::KvCache;

use super::{SmsError, SmsProvider};
use crate::config::SmsConfig;

const RATE_WINDOW: Duration = Duration::from_secs(3600);

fn code_key(invitation_number: &str) -> String {
    format!("sms:code:{invitation_number}")
}

fn attempts_key(invitation_number: &str) -> String {
    format!("sms:attempts:{invitation_number}")
}

fn rate_key(invitation_number: &str) -> String {
    format!("sms:rate:{invitation_number}")
}

fn backend(e: impl std::fmt::Display) -> SmsError {
    SmsError::Backend(e.to_string())
}

/// One-time SMS codes bound to an invitation number. Only the Argon2 hash is
/// kept, in the cache, under the code TTL.
pub struct SmsVerifier {
    cache: Arc<dyn KvCache>,
    provider: Arc<dyn SmsProvider>,
    config: SmsConfig,
}

impl SmsVerifier {
    pub fn new(cache: Arc<dyn KvCache>, provider: Arc<dyn SmsProvider>, config: SmsConfig) -> Self {
        Self {
            cache,
            provider,
            config,
        }
    }

    pub fn code_ttl(&self) -> Duration {
        self.config.code_ttl
    }

    /// Send a fresh code, replacing any previous one.
    pub async fn issue(&self, invitation_number: &str, mobile: &str) -> Result<(), SmsError> {
        let sent_this_hour = self
            .cache
            .increment(&rate_key(invitation_number), RATE_WINDOW)
            .await
            .map_err(backend)?;
        if sent_this_hour > u64::from(self.config.max_per_hour) {
            tracing::warn!(invitation = invitation_number, "sms code rate limit reached");
            return Err(SmsError::RateLimited);
        }

        let code = generate_verification_code();
        let number = invitation_number.to_string();
        let hash = {
            let code = code.clone();
            tokio::task::spawn_blocking(move || hash_verification_code(&code, &number))
                .await
                .map_err(backend)?
                .map_err(backend)?
        };

        self.cache
            .set(&code_key(invitation_number), hash, self.config.code_ttl)
            .await
            .map_err(backend)?;
        self.cache
            .delete(&attempts_key(invitation_number))
            .await
            .map_err(backend)?;

        let minutes = self.config.code_ttl.as_secs().div_ceil(60);
        let body = format!(
            "Your activation code for invitation {invitation_number} is {code}. \
             It expires in {minutes} minutes."
        );
        self.provider.send(mobile, &body).await?;
        tracing::info!(invitation = invitation_number, "sms code sent");
        Ok(())
    }

    /// Check a submitted code. A correct code is consumed; the configured
    /// number of wrong guesses burns it.
    pub async fn verify(&self, invitation_number: &str, code: &str) -> Result<(), SmsError> {
        let Some(stored) = self
            .cache
            .get(&code_key(invitation_number))
            .await
            .map_err(backend)?
        else {
            return Err(SmsError::NoActiveCode);
        };

        let attempts = self
            .cache
            .increment(&attempts_key(invitation_number), self.config.code_ttl)
            .await
            .map_err(backend)?;

        let matches = {
            let code = code.trim().to_string();
            let number = invitation_number.to_string();
            tokio::task::spawn_blocking(move || verify_code_hash(&code, &number, &stored))
                .await
                .map_err(backend)?
                .map_err(backend)?
        };

        if matches {
            self.clear(invitation_number).await?;
            return Ok(());
        }

        let max = u64::from(self.config.max_attempts);
        if attempts >= max {
            self.clear(invitation_number).await?;
            tracing::warn!(invitation = invitation_number, "sms code burned");
            return Err(SmsError::Burned);
        }
        Err(SmsError::Mismatch {
            remaining: u32::try_from(max - attempts).unwrap_or(u32::MAX),
        })
    }

    async fn clear(&self, invitation_number: &str) -> Result<(), SmsError> {
        self.cache
            .delete(&code_key(invitation_number))
            .await
            .map_err(backend)?;
        self.cache
            .delete(&attempts_key(invitation_number))
            .await
            .map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sms::RecordingSmsProvider;
    use geogate_cache_memory::MemoryKvCache;

    fn verifier() -> (SmsVerifier, Arc<RecordingSmsProvider>) {
        let provider = Arc::new(RecordingSmsProvider::default());
        let v = SmsVerifier::new(
            Arc::new(MemoryKvCache::new()),
            provider.clone(),
            SmsConfig::default(),
        );
        (v, provider)
    }

    #[tokio::test]
    async fn code_is_single_use() {
        let (v, sms) = verifier();
        v.issue("HTL-000001", "+35799123456").await.unwrap();
        let code = sms.last_code().unwrap();
        assert_eq!(sms.messages()[0].0, "+35799123456");

        v.verify("HTL-000001", &code).await.unwrap();
        assert!(matches!(
            v.verify("HTL-000001", &code).await,
            Err(SmsError::NoActiveCode)
        ));
    }

    #[tokio::test]
    async fn code_is_bound_to_invitation() {
        let (v, sms) = verifier();
        v.issue("HTL-000001", "+35799123456").await.unwrap();
        let code = sms.last_code().unwrap();
        assert!(matches!(
            v.verify("HTL-000002", &code).await,
            Err(SmsError::NoActiveCode)
        ));
    }

    #[tokio::test]
    async fn five_wrong_guesses_burn_the_code() {
        let (v, sms) = verifier();
        v.issue("VIL-000003", "+35799123456").await.unwrap();
        let code = sms.last_code().unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for remaining in (1..5).rev() {
            match v.verify("VIL-000003", wrong).await {
                Err(SmsError::Mismatch { remaining: r }) => assert_eq!(r, remaining),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(matches!(
            v.verify("VIL-000003", wrong).await,
            Err(SmsError::Burned)
        ));
        assert!(matches!(
            v.verify("VIL-000003", &code).await,
            Err(SmsError::NoActiveCode)
        ));
    }

    #[tokio::test]
    async fn hourly_limit() {
        let (v, _) = verifier();
        for _ in 0..3 {
            v.issue("RES-000004", "+35799123456").await.unwrap();
        }
        assert!(matches!(
            v.issue("RES-000004", "+35799123456").await,
            Err(SmsError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn reissue_replaces_previous_code() {
        let (v, sms) = verifier();
        v.issue("HTL-000005", "+35799123456").await.unwrap();
        let first = sms.last_code().unwrap();
        v.issue("HTL-000005", "+35799123456").await.unwrap();
        let second = sms.last_code().unwrap();
        if first != second {
            assert!(v.verify("HTL-000005", &first).await.is_err());
        }
        v.verify("HTL-000005", &second).await.unwrap();
    }
}
