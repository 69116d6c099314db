//! Regional (Cyprus) identifier validators.
//!
//! Accepted patterns:
//!
//! | Identifier | Pattern | Example |
//! |---|---|---|
//! | Business registration | `HE`, `AE`, `BN`, `S` or `P`, optional space or dot, 1–6 digits | `HE 123456` |
//! | Mobile number | optional `+357` / `00357`, then `9[45679]` and 6 more digits; spaces and dashes ignored | `+357 99 123456` |
//! | Postal code | exactly 4 digits | `3036` |
//! | Country code | ISO 3166-1 alpha-2, upper case | `CY` |

use std::sync::LazyLock;

use regex::Regex;

use crate::ValidationError;

static BUSINESS_REGISTRATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:HE|AE|BN|S|P)[ .]?\d{1,6}$").expect("valid regex"));

static MOBILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\+357|00357)?9[45679]\d{6}$").expect("valid regex"));

static POSTAL_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}$").expect("valid regex"));

static COUNTRY_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}$").expect("valid regex"));

pub fn validate_business_registration(value: &str) -> Result<(), ValidationError> {
    let normalized = value.trim().to_uppercase();
    if BUSINESS_REGISTRATION.is_match(&normalized) {
        Ok(())
    } else {
        Err(ValidationError::new(
            "business_registration",
            "expected a prefix (HE, AE, BN, S, P) followed by up to 6 digits",
        ))
    }
}

pub fn validate_mobile_number(value: &str) -> Result<(), ValidationError> {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    if MOBILE.is_match(&compact) {
        Ok(())
    } else {
        Err(ValidationError::new(
            "mobile",
            "expected a Cyprus mobile number such as +357 99 123456",
        ))
    }
}

pub fn validate_postal_code(value: &str) -> Result<(), ValidationError> {
    if POSTAL_CODE.is_match(value.trim()) {
        Ok(())
    } else {
        Err(ValidationError::new("postal_code", "expected 4 digits"))
    }
}

pub fn validate_country_code(value: &str) -> Result<(), ValidationError> {
    if COUNTRY_CODE.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new(
            "country_code",
            "expected an upper-case ISO 3166-1 alpha-2 code",
        ))
    }
}
