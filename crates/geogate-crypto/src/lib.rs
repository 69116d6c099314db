//! Cryptography for geogate activation tokens.
//!
//! - [`TokenKey`]: the process-wide symmetric key, loaded once at startup.
//! - [`TokenCodec`]: issues and validates the tamper-evident, expiring tokens
//!   embedded in invitation QR codes.
//! - [`generate_verification_code`] / [`hash_verification_code`]: one-time SMS
//!   codes, stored hashed.

mod aead;
mod code;
mod key;
mod qr;
mod token;

pub use aead::{decrypt, encrypt, DecryptError, EncryptError, NONCE_LEN};
pub use code::{generate_verification_code, hash_verification_code, verify_code_hash, KdfError};
pub use key::{KeyError, TokenKey};
pub use qr::{render_qr_svg, QrError};
pub use token::{
    IssueOptions, IssuedToken, TokenCodec, TokenError, TokenPolicy, ValidatedToken,
    TOKEN_SCHEMA_VERSION,
};
