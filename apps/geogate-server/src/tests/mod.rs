//! Server unit and integration tests.
//!
//! Tests are organized into modules by feature area:
//! - `common` - Shared harness and request builders
//! - `lifecycle_flow` - Creation, dispatch, conversion and expiry
//! - `activation_flow` - QR scan, location checks, lockout, SMS and device binding
//! - `courier_flow` - Carrier webhooks and tracking refresh
//! - `trial_flow` - Trial timeline and campaigns
//! - `routes` - HTTP router, error bodies and operational endpoints

pub mod common;

mod trial_flow;
