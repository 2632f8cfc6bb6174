//! Payment queue and durable storage collaborators.
//!
//! The queue is owned by an external producer; this crate only snapshots it. Draining the queue
//! into durable storage is an external operation exposed through [`BatchFlusher`].

pub mod base;
pub mod memory;

pub use base::{BatchFlusher, QueueStore};
pub use memory::MemoryStore;
