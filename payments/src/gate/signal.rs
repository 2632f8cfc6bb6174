use serde::{Deserialize, Serialize};

use crate::error::PaymentsResult;
use crate::gate::id::InstanceId;

/// Busy state of a gate as announced by one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// At least one holder is active on the announcing instance.
    Blocked,
    /// No holder is active on the announcing instance.
    Unblocked,
}

impl GateState {
    /// Derives the state from a holder count.
    pub fn from_count(count: u64) -> Self {
        if count > 0 {
            GateState::Blocked
        } else {
            GateState::Unblocked
        }
    }

    /// Returns `true` for [`GateState::Blocked`].
    pub fn is_blocked(&self) -> bool {
        matches!(self, GateState::Blocked)
    }
}

/// Edge transition broadcast on a gate's channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSignal {
    /// Instance whose local count crossed the edge.
    pub instance: InstanceId,
    /// State after the edge.
    pub state: GateState,
}

impl GateSignal {
    /// Creates a new signal.
    pub fn new(instance: InstanceId, state: GateState) -> Self {
        Self { instance, state }
    }

    /// Encodes the signal for transports that carry opaque payloads between processes.
    pub fn encode(&self) -> PaymentsResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a signal produced by [`GateSignal::encode`].
    pub fn decode(payload: &[u8]) -> PaymentsResult<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn state_follows_count() {
        assert_eq!(GateState::from_count(0), GateState::Unblocked);
        assert_eq!(GateState::from_count(3), GateState::Blocked);
    }

    #[test]
    fn wire_format_is_stable() {
        let signal = GateSignal::new(InstanceId::new("api-1"), GateState::Blocked);
        let encoded = signal.encode().unwrap();
        assert_eq!(encoded, br#"{"instance":"api-1","state":"blocked"}"#);
    }

    #[test]
    fn garbage_payload_is_rejected() {
        let err = GateSignal::decode(b"blocked").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeserializationError);
    }
}
