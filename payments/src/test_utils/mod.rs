//! Test doubles and helpers for exercising gates, drain loops and log output.

pub mod flusher;
pub mod logs;
pub mod transport;
