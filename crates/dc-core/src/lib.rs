//! # dc-core
//!
//! Core types and error handling for the datacard generator.
//!
//! This crate provides:
//! - The shared error taxonomy (fatal conditions of a datacard run)
//! - [`Count`]: a value with a one-sigma uncertainty and uncorrelated
//!   error propagation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{Count, combine_product, combine_ratio, quadrature_sum};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
