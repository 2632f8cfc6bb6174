//! Reference-counted gates and their cross-instance observers.
//!
//! A gate is held by an instance while it has at least one in-flight activity of a given kind.
//! Every busy/idle edge is broadcast to all replicas, where [`GateObserver`]s fold the signals
//! of all instances into a single blocked/unblocked view.

mod controller;
mod id;
mod observer;
mod registry;
mod signal;

pub use controller::{GateController, GateGuard};
pub use id::{GateId, InstanceId};
pub use observer::{GateObserver, SourceKey};
pub use registry::GateRegistry;
pub use signal::{GateSignal, GateState};
