//! Long-lived background workers.

pub mod drain;
