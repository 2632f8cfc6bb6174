//! Configuration types and loading for the payments summary services.
//!
//! The [`shared`] module holds the typed configuration consumed by the `payments` crate and the
//! `summarizer` binary, while [`load`] assembles it from configuration files and environment
//! variable overrides.

pub mod environment;
pub mod load;
pub mod shared;
