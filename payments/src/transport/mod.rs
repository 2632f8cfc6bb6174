//! Broadcast transports carrying gate signals between replicas.

pub mod base;
pub mod memory;

pub use base::BroadcastTransport;
pub use memory::MemoryTransport;
