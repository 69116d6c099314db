//! Storage abstraction for geogate.
//!
//! Backend crates (e.g., geogate-store-sqlite) implement [`Store`] and
//! [`KvCache`] so the service doesn't depend on any database engine or
//! schema details.

use thiserror::Error;

mod cache;
mod store;
mod types;

pub use cache::*;
pub use store::*;
pub use types::*;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("conflict")]
    Conflict,
    #[error("backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_messages() {
        assert_eq!(StoreError::NotFound.to_string(), "not found");
        assert_eq!(
            StoreError::Backend("disk full".into()).to_string(),
            "backend error: disk full"
        );
    }
}
