//! One-time verification codes (SMS).

use rand::Rng;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum KdfError {
    #[error("invalid kdf parameters")]
    InvalidParams(argon2::Error),
    #[error("key derivation failed")]
    DerivationFailed(argon2::Error),
}

const MIB: u32 = 1024;
const MEMORY_COST_KIB: u32 = 19 * MIB;

/// Six random digits, zero padded, for SMS activation.
pub fn generate_verification_code() -> String {
    let code: u32 = rand::rng().random_range(0..1_000_000);
    format!("{code:06}")
}

/// Argon2id hash of a code, salted with the invitation number it was issued
/// for. A code hashed for one invitation never verifies against another.
pub fn hash_verification_code(code: &str, invitation_number: &str) -> Result<String, KdfError> {
    let params =
        argon2::Params::new(MEMORY_COST_KIB, 2, 1, Some(32)).map_err(KdfError::InvalidParams)?;
    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let salt = format!("geogate-sms:{}", invitation_number);
    let mut hash = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(code.as_bytes(), salt.as_bytes(), hash.as_mut())
        .map_err(KdfError::DerivationFailed)?;

    Ok(hex::encode(hash.as_ref()))
}

/// Constant-time check of a submitted code against a stored hash.
pub fn verify_code_hash(
    code: &str,
    invitation_number: &str,
    stored_hash: &str,
) -> Result<bool, KdfError> {
    let candidate = hash_verification_code(code, invitation_number)?;
    Ok(candidate.as_bytes().ct_eq(stored_hash.as_bytes()).into())
}
