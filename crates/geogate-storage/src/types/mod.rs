//! Type definitions for geogate storage.

mod campaigns;
mod courier;
mod ids;
mod invitations;
mod location;

// Re-export all types from submodules
pub use campaigns::*;
pub use courier::*;
pub use ids::*;
pub use invitations::*;
pub use location::*;

/// Error returned when a stored or submitted enum string is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl std::fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}
