//! QR activation token codec.
//!
//! Wire format: `base64url(json{d, c, v})` where
//! - `d` is `base64url(nonce || XChaCha20-Poly1305 ciphertext)` of the payload,
//! - `c` is a hex HMAC-SHA256 over `(v, d bytes, invitation number)`,
//! - `v` is the schema version string.
//!
//! The checksum binds the token to one invitation number, so a token cannot be
//! replayed against another invitation. The schema version lets the envelope
//! evolve without invalidating cards that are already printed.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::aead;
use crate::key::TokenKey;
use crate::qr::{render_qr_svg, QrError};

pub const TOKEN_SCHEMA_VERSION: &str = "1";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token schema version {0} is not supported")]
    UnsupportedVersion(String),
    #[error("token integrity check failed")]
    Tampered,
    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("token encryption failed")]
    Encryption,
    #[error("QR rendering failed: {0}")]
    Qr(String),
}

impl TokenError {
    /// Message safe to show end users. Malformed, tampered and expired tokens
    /// all read the same so the endpoint can't be used as an oracle.
    pub fn public_message(&self) -> &'static str {
        match self {
            TokenError::Encryption | TokenError::Qr(_) => "unable to issue activation token",
            _ => "invalid or expired activation token",
        }
    }
}

impl From<QrError> for TokenError {
    fn from(e: QrError) -> Self {
        TokenError::Qr(e.to_string())
    }
}

/// Per-invitation policy flags carried inside the token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPolicy {
    pub sms_verification_required: bool,
    pub device_binding_required: bool,
    pub location_required: bool,
}

#[derive(Clone, Debug)]
pub struct IssueOptions {
    pub expiration_hours: u32,
    pub policy: TokenPolicy,
}

#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub token: String,
    pub activation_url: String,
    pub qr_svg: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedToken {
    pub invitation_number: String,
    pub policy: TokenPolicy,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    d: String,
    c: String,
    v: String,
}

#[derive(Serialize, Deserialize)]
struct Payload {
    n: String,
    iat: i64,
    exp: i64,
    p: TokenPolicy,
    r: String,
}

/// Issues and validates activation tokens under one [`TokenKey`].
///
/// Cheap to share behind an `Arc`; holds only derived keys and the public
/// host used for activation URLs.
pub struct TokenCodec {
    enc_key: Zeroizing<[u8; 32]>,
    mac_key: Zeroizing<[u8; 32]>,
    public_host: String,
}

impl TokenCodec {
    pub fn new(key: &TokenKey, public_host: impl Into<String>) -> Self {
        Self {
            enc_key: key.subkey(b"token-enc"),
            mac_key: key.subkey(b"token-mac"),
            public_host: public_host.into(),
        }
    }

    pub fn public_host(&self) -> &str {
        &self.public_host
    }

    pub fn activation_url(&self, invitation_number: &str, token: &str) -> String {
        format!(
            "https://{}/qr/{}?token={}",
            self.public_host, invitation_number, token
        )
    }

    pub fn issue(
        &self,
        invitation_number: &str,
        options: &IssueOptions,
    ) -> Result<IssuedToken, TokenError> {
        self.issue_at(invitation_number, options, Utc::now())
    }

    pub fn issue_at(
        &self,
        invitation_number: &str,
        options: &IssueOptions,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let expires_at = now + Duration::hours(i64::from(options.expiration_hours));

        let mut nonce = [0u8; 16];
        rand_core::OsRng.fill_bytes(&mut nonce);

        let payload = Payload {
            n: invitation_number.to_string(),
            iat: now.timestamp_millis(),
            exp: expires_at.timestamp_millis(),
            p: options.policy,
            r: hex::encode(nonce),
        };
        let plaintext =
            Zeroizing::new(serde_json::to_vec(&payload).map_err(|_| TokenError::Encryption)?);

        let sealed = aead::encrypt(&plaintext, &self.enc_key, TOKEN_SCHEMA_VERSION.as_bytes())
            .map_err(|_| TokenError::Encryption)?;
        let checksum = self.checksum(TOKEN_SCHEMA_VERSION, &sealed, invitation_number)?;

        let envelope = Envelope {
            d: URL_SAFE_NO_PAD.encode(&sealed),
            c: hex::encode(checksum),
            v: TOKEN_SCHEMA_VERSION.to_string(),
        };
        let envelope_json = serde_json::to_vec(&envelope).map_err(|_| TokenError::Encryption)?;
        let token = URL_SAFE_NO_PAD.encode(envelope_json);

        let activation_url = self.activation_url(invitation_number, &token);
        let qr_svg = render_qr_svg(&activation_url)?;

        Ok(IssuedToken {
            token,
            activation_url,
            qr_svg,
            issued_at: now,
            expires_at,
        })
    }

    pub fn validate(&self, token: &str) -> Result<ValidatedToken, TokenError> {
        self.validate_at(token, None, Utc::now())
    }

    /// Validate a token presented for a specific invitation (e.g. the number in
    /// the `/qr/<number>` path). The checksum is checked before decryption.
    pub fn validate_for(
        &self,
        token: &str,
        invitation_number: &str,
    ) -> Result<ValidatedToken, TokenError> {
        self.validate_at(token, Some(invitation_number), Utc::now())
    }

    pub fn validate_at(
        &self,
        token: &str,
        expected_number: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ValidatedToken, TokenError> {
        let envelope_json = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| TokenError::Malformed)?;
        let envelope: Envelope =
            serde_json::from_slice(&envelope_json).map_err(|_| TokenError::Malformed)?;

        if envelope.v != TOKEN_SCHEMA_VERSION {
            return Err(TokenError::UnsupportedVersion(envelope.v));
        }

        let sealed = URL_SAFE_NO_PAD
            .decode(&envelope.d)
            .map_err(|_| TokenError::Malformed)?;
        if sealed.len() < aead::NONCE_LEN + 16 {
            return Err(TokenError::Malformed);
        }
        // A checksum that isn't 32 bytes of hex was altered after issue.
        let presented = hex::decode(&envelope.c).map_err(|_| TokenError::Tampered)?;

        if let Some(number) = expected_number {
            self.verify_checksum(&envelope.v, &sealed, number, &presented)?;
        }

        let plaintext = aead::decrypt(&sealed, &self.enc_key, envelope.v.as_bytes())
            .map_err(|_| TokenError::Tampered)?;
        let payload: Payload =
            serde_json::from_slice(&plaintext).map_err(|_| TokenError::Malformed)?;

        match expected_number {
            Some(number) if number != payload.n => return Err(TokenError::Tampered),
            Some(_) => {}
            None => self.verify_checksum(&envelope.v, &sealed, &payload.n, &presented)?,
        }

        let issued_at = millis_to_utc(payload.iat)?;
        let expires_at = millis_to_utc(payload.exp)?;
        if now >= expires_at {
            return Err(TokenError::Expired(expires_at));
        }

        Ok(ValidatedToken {
            invitation_number: payload.n,
            policy: payload.p,
            issued_at,
            expires_at,
        })
    }

    fn checksum(
        &self,
        version: &str,
        sealed: &[u8],
        invitation_number: &str,
    ) -> Result<[u8; 32], TokenError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.mac_key.as_ref())
            .map_err(|_| TokenError::Encryption)?;
        mac.update(version.as_bytes());
        mac.update(&[0x1f]);
        mac.update(sealed);
        mac.update(&[0x1f]);
        mac.update(invitation_number.as_bytes());
        Ok(mac.finalize().into_bytes().into())
    }

    fn verify_checksum(
        &self,
        version: &str,
        sealed: &[u8],
        invitation_number: &str,
        presented: &[u8],
    ) -> Result<(), TokenError> {
        let expected = self.checksum(version, sealed, invitation_number)?;
        if bool::from(expected.as_slice().ct_eq(presented)) {
            Ok(())
        } else {
            Err(TokenError::Tampered)
        }
    }
}

fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>, TokenError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(TokenError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(&TokenKey::from_bytes(&[42u8; 32]), "access.example.cy")
    }

    fn options(hours: u32) -> IssueOptions {
        IssueOptions {
            expiration_hours: hours,
            policy: TokenPolicy {
                sms_verification_required: true,
                device_binding_required: false,
                location_required: true,
            },
        }
    }

    fn open(token: &str) -> (Vec<u8>, Vec<u8>) {
        let env: Envelope =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(token).unwrap()).unwrap();
        (
            URL_SAFE_NO_PAD.decode(env.d).unwrap(),
            hex::decode(env.c).unwrap(),
        )
    }

    fn seal(d: &[u8], c: &[u8], v: &str) -> String {
        let env = Envelope {
            d: URL_SAFE_NO_PAD.encode(d),
            c: hex::encode(c),
            v: v.to_string(),
        };
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&env).unwrap())
    }

    #[test]
    fn roundtrip_returns_number_and_policy() {
        let c = codec();
        let issued = c.issue("HTL-000001", &options(72)).unwrap();
        let v = c.validate(&issued.token).unwrap();
        assert_eq!(v.invitation_number, "HTL-000001");
        assert_eq!(v.policy, options(72).policy);
        assert_eq!(v.expires_at, issued.expires_at);
    }

    #[test]
    fn activation_url_shape() {
        let issued = codec().issue("RST-000042", &options(1)).unwrap();
        assert_eq!(
            issued.activation_url,
            format!(
                "https://access.example.cy/qr/RST-000042?token={}",
                issued.token
            )
        );
        assert!(issued.qr_svg.contains("<svg"));
    }

    #[test]
    fn token_is_url_safe() {
        let issued = codec().issue("HTL-000001", &options(1)).unwrap();
        assert!(issued
            .token
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'));
    }

    #[test]
    fn same_input_gives_different_tokens() {
        let c = codec();
        let a = c.issue("HTL-000001", &options(1)).unwrap();
        let b = c.issue("HTL-000001", &options(1)).unwrap();
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn every_ciphertext_bit_flip_is_tamper() {
        let c = codec();
        let issued = c.issue("HTL-000001", &options(72)).unwrap();
        let (d, chk) = open(&issued.token);
        for byte in 0..d.len() {
            for bit in 0..8 {
                let mut flipped = d.clone();
                flipped[byte] ^= 1 << bit;
                let token = seal(&flipped, &chk, TOKEN_SCHEMA_VERSION);
                assert_eq!(c.validate(&token), Err(TokenError::Tampered));
            }
        }
    }

    #[test]
    fn every_checksum_bit_flip_is_tamper() {
        let c = codec();
        let issued = c.issue("HTL-000001", &options(72)).unwrap();
        let (d, chk) = open(&issued.token);
        for byte in 0..chk.len() {
            for bit in 0..8 {
                let mut flipped = chk.clone();
                flipped[byte] ^= 1 << bit;
                let token = seal(&d, &flipped, TOKEN_SCHEMA_VERSION);
                assert_eq!(c.validate(&token), Err(TokenError::Tampered));
                assert_eq!(
                    c.validate_for(&token, "HTL-000001"),
                    Err(TokenError::Tampered)
                );
            }
        }
    }

    #[test]
    fn token_cannot_be_replayed_for_other_invitation() {
        let c = codec();
        let issued = c.issue("HTL-000001", &options(72)).unwrap();
        assert_eq!(
            c.validate_for(&issued.token, "HTL-000002"),
            Err(TokenError::Tampered)
        );
        assert!(c.validate_for(&issued.token, "HTL-000001").is_ok());
    }

    #[test]
    fn zero_hour_token_is_expired() {
        let c = codec();
        let issued = c.issue("HTL-000001", &options(0)).unwrap();
        assert!(matches!(
            c.validate(&issued.token),
            Err(TokenError::Expired(_))
        ));
    }

    #[test]
    fn validation_after_expiry_is_expired() {
        let c = codec();
        let now = Utc::now();
        let issued = c.issue_at("HTL-000001", &options(2), now).unwrap();
        assert!(c
            .validate_at(&issued.token, None, now + Duration::minutes(119))
            .is_ok());
        assert!(matches!(
            c.validate_at(&issued.token, None, now + Duration::hours(3)),
            Err(TokenError::Expired(_))
        ));
    }

    #[test]
    fn other_key_cannot_validate() {
        let issued = codec().issue("HTL-000001", &options(1)).unwrap();
        let other = TokenCodec::new(&TokenKey::from_bytes(&[1u8; 32]), "access.example.cy");
        assert_eq!(other.validate(&issued.token), Err(TokenError::Tampered));
    }

    #[test]
    fn malformed_and_versioned_tokens() {
        let c = codec();
        assert_eq!(c.validate("not base64 !!"), Err(TokenError::Malformed));
        assert_eq!(
            c.validate(&URL_SAFE_NO_PAD.encode(b"{}")),
            Err(TokenError::Malformed)
        );

        let issued = c.issue("HTL-000001", &options(1)).unwrap();
        let (d, chk) = open(&issued.token);
        assert_eq!(
            c.validate(&seal(&d, &chk, "9")),
            Err(TokenError::UnsupportedVersion("9".into()))
        );
        assert_eq!(
            c.validate(&seal(&d[..10], &chk, TOKEN_SCHEMA_VERSION)),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn public_message_is_uniform() {
        let msgs = [
            TokenError::Malformed.public_message(),
            TokenError::Tampered.public_message(),
            TokenError::Expired(Utc::now()).public_message(),
        ];
        assert!(msgs.iter().all(|m| *m == msgs[0]));
    }
}
