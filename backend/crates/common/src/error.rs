use thiserror::Error;

use crate::types::VersionToken;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RollupError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A create hit an id that is taken. `current` is the token of the
    /// document already there.
    #[error("already exists: {id}")]
    AlreadyExists {
        id: String,
        current: Option<VersionToken>,
    },

    /// A write presented a token that is no longer current. `current` is the
    /// store's token at the time of the rejection, `None` when the document is gone.
    #[error("version conflict on {id}: current is {}", describe_token(.current))]
    VersionConflict {
        id: String,
        current: Option<VersionToken>,
    },

    #[error("invalid transition for {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },

    /// Internal inconsistency (e.g. a regressing cursor). Never retried.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RollupError {
    pub fn version_conflict(id: impl Into<String>, current: Option<VersionToken>) -> Self {
        Self::VersionConflict {
            id: id.into(),
            current,
        }
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

fn describe_token(token: &Option<VersionToken>) -> String {
    match token {
        Some(t) => t.to_string(),
        None => "absent".to_string(),
    }
}

pub type RollupResult<T> = Result<T, RollupError>;
