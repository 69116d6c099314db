use rand_core::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("token key must be 64 hex characters (32 bytes)")]
    InvalidLength,
    #[error("token key is not valid hex")]
    InvalidHex,
}

/// Process-wide symmetric key for activation tokens.
///
/// Never embedded in source: loaded from configuration at startup and
/// treated as immutable afterwards. Subkeys for encryption and checksums are
/// derived with domain separation so the two uses never share key material.
#[derive(zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
pub struct TokenKey(Zeroizing<[u8; 32]>);

impl TokenKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        TokenKey(Zeroizing::new(*bytes))
    }

    pub fn from_hex(value: &str) -> Result<Self, KeyError> {
        let bytes = Zeroizing::new(hex::decode(value.trim()).map_err(|_| KeyError::InvalidHex)?);
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidLength)?;
        Ok(Self::from_bytes(&arr))
    }

    /// Fresh random key (tests and `geogate-server keygen`).
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        rand_core::OsRng.fill_bytes(key.as_mut());
        TokenKey(key)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_ref())
    }

    pub(crate) fn subkey(&self, label: &[u8]) -> Zeroizing<[u8; 32]> {
        let mut hasher = Sha256::new();
        hasher.update(b"geogate/v1/");
        hasher.update(label);
        hasher.update([0u8]);
        hasher.update(self.0.as_ref());
        Zeroizing::new(hasher.finalize().into())
    }
}

impl std::fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let key = TokenKey::generate();
        let again = TokenKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(key.to_hex(), again.to_hex());
    }

    #[test]
    fn rejects_short_and_non_hex_keys() {
        assert!(matches!(
            TokenKey::from_hex("abcd"),
            Err(KeyError::InvalidLength)
        ));
        assert!(matches!(
            TokenKey::from_hex(&"zz".repeat(32)),
            Err(KeyError::InvalidHex)
        ));
    }

    #[test]
    fn subkeys_are_domain_separated() {
        let key = TokenKey::from_bytes(&[7u8; 32]);
        assert_ne!(*key.subkey(b"enc"), *key.subkey(b"mac"));
        assert_eq!(*key.subkey(b"enc"), *key.subkey(b"enc"));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let key = TokenKey::from_bytes(&[0xAB; 32]);
        assert!(!format!("{:?}", key).contains("ab"));
    }
}
