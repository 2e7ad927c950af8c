use rollup_common::types::VersionToken;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub token: VersionToken,
    /// Number of successful writes to this id since it was created.
    pub version: i64,
    pub body: serde_json::Value,
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { token: VersionToken, version: i64 },
    /// The presented token was stale. `current` is what the store holds now,
    /// `None` if the document does not exist.
    Conflict { current: Option<VersionToken> },
}

/// Result of a conditional delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Conflict { current: Option<VersionToken> },
}
