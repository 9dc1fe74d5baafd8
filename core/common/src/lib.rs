//! Common utilities and types shared across the warden crates.
//!
//! This module provides the error taxonomy, the time source every
//! freshness check reads from, and the wrapper used to hold secrets.

pub mod clock;
pub mod error;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use error::{Error, Result};
pub use types::SecretString;

#[cfg(any(test, feature = "test-helpers"))]
pub use clock::MockClock;
