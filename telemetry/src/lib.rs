//! Tracing setup shared by the summarizer binary and the test suites.

pub mod tracing;
