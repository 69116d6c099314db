//! XChaCha20-Poly1305 with a fresh random nonce per call.

use chacha20poly1305::{aead::Aead, KeyInit};
use rand_core::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

pub const NONCE_LEN: usize = 24;

#[derive(Debug, Error)]
pub enum EncryptError {
    #[error("AEAD encryption failed")]
    AeadFailed(chacha20poly1305::aead::Error),
}

#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("ciphertext too short")]
    TooShort,
    #[error("AEAD decryption failed")]
    AeadFailed(chacha20poly1305::aead::Error),
}

/// AEAD encrypt. Returns `nonce || ciphertext`.
pub fn encrypt(plaintext: &[u8], key: &[u8; 32], aad: &[u8]) -> Result<Vec<u8>, EncryptError> {
    let cipher = chacha20poly1305::XChaCha20Poly1305::new(&chacha20poly1305::Key::from(*key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand_core::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = chacha20poly1305::XNonce::from(nonce_bytes);

    let ct = cipher
        .encrypt(
            &nonce,
            chacha20poly1305::aead::Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(EncryptError::AeadFailed)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ct.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ct);
    Ok(out)
}

/// AEAD decrypt of `nonce || ciphertext`.
pub fn decrypt(
    sealed: &[u8],
    key: &[u8; 32],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, DecryptError> {
    if sealed.len() < NONCE_LEN + 16 {
        return Err(DecryptError::TooShort);
    }
    let (nonce_bytes, ct) = sealed.split_at(NONCE_LEN);
    let cipher = chacha20poly1305::XChaCha20Poly1305::new(&chacha20poly1305::Key::from(*key));
    let nonce = chacha20poly1305::XNonce::from_slice(nonce_bytes);

    let pt = cipher
        .decrypt(nonce, chacha20poly1305::aead::Payload { msg: ct, aad })
        .map_err(DecryptError::AeadFailed)?;

    Ok(Zeroizing::new(pt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = [3u8; 32];
        let sealed = encrypt(b"hello", &key, b"aad").unwrap();
        let pt = decrypt(&sealed, &key, b"aad").unwrap();
        assert_eq!(&pt[..], b"hello");
    }

    #[test]
    fn nonce_differs_per_call() {
        let key = [3u8; 32];
        let a = encrypt(b"same", &key, b"").unwrap();
        let b = encrypt(b"same", &key, b"").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_aad_or_key_fails() {
        let key = [3u8; 32];
        let sealed = encrypt(b"hello", &key, b"good").unwrap();
        assert!(decrypt(&sealed, &key, b"bad").is_err());
        assert!(decrypt(&sealed, &[4u8; 32], b"good").is_err());
    }

    #[test]
    fn truncated_input_is_rejected() {
        assert!(matches!(
            decrypt(&[0u8; 10], &[0u8; 32], b""),
            Err(DecryptError::TooShort)
        ));
    }
}
