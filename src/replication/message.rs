use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server to client replication traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplicationMessage {
    /// One key changed on the server
    Change { key: String, value: Value },
    /// Server session ended; no further changes follow
    Closed,
}

impl ReplicationMessage {
    pub fn change(key: impl Into<String>, value: Value) -> Self {
        ReplicationMessage::Change {
            key: key.into(),
            value,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ReplicationMessage::Closed)
    }

    pub fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
