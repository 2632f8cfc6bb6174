//! Consistency-coordination core of the payments summary service.
//!
//! Summary readers announce themselves through reference-counted gates whose busy/idle edges are
//! broadcast to every replica. Readers bound how long they wait on other gates before reading the
//! live payment queue, and a background drain worker flushes the queue to durable storage while
//! readers are active.

pub mod concurrency;
pub mod error;
pub mod gate;
mod macros;
pub mod store;
pub mod summary;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transport;
pub mod types;
pub mod workers;
