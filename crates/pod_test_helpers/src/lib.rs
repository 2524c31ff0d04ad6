//! Shared test utilities for podsync test suites
//!
//! This crate provides common testing utilities so test suites build signed
//! documents and fixtures the same way everywhere.
//!
//! # Modules
//!
//! - [`keys`]: deterministic test keypairs with base58 encoding
//! - [`docs`]: signed and anonymous document builders
//! - [`logging`]: test logging configuration

pub mod docs;
pub mod keys;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::docs::{anonymous_doc, signed_doc, tampered_doc};
    pub use crate::keys::TestKey;
    pub use crate::logging::init_test_logging;
}
