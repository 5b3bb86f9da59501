//! # Concord Common
//!
//! Shared types, errors, and constants used across Concord components.
//!
//! ## Modules
//! - `types` - Published hash entries, update priorities, node roles, reports
//! - `error` - Common error type and `Result` alias
//! - `constants` - Protocol parameters and node defaults

pub mod constants;
pub mod error;
pub mod types;

pub use error::{ConcordError, Result};
pub use types::*;
