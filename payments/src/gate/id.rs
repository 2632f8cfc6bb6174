use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Typed identifier of a coordination gate.
///
/// Every component that needs the same logical gate obtains it from a
/// [`GateRegistry`](crate::gate::GateRegistry) by its [`GateId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GateId(Cow<'static, str>);

impl GateId {
    /// Gate held while summary requests are reading the payment queue.
    pub const SUMMARY_READERS: GateId = GateId(Cow::Borrowed("api:payments-summary"));

    /// Gate held by the storage side while it is busy writing batches.
    pub const STORAGE_BUSY: GateId = GateId(Cow::Borrowed("redis"));

    /// Gate held by the transport side while payments are in flight.
    pub const TRANSPORT_BUSY: GateId = GateId(Cow::Borrowed("http"));

    /// Creates a gate identifier from a name.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Returns the gate name, which is also its broadcast channel name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the replica publishing a gate signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Creates an instance identity from an explicit name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Creates a random instance identity.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
