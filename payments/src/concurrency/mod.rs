//! Concurrency primitives shared by request handling and background workers.
//!
//! - [`bounded_wait`] races an operation against a deadline without cancelling it, so callers can
//!   cap how long they wait for cross-replica agreement while the operation's eventual outcome is
//!   still logged. [`bounded_wait::InFlight`] lets many callers share one such operation.
//! - [`shutdown`] provides the broadcast-based stop signal used by long-lived workers.

pub mod bounded_wait;
pub mod shutdown;
