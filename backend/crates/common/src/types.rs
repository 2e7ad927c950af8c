use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub instance_id: Uuid,
}

impl ServiceInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            instance_id: Uuid::new_v4(),
        }
    }
}

/// Optimistic-concurrency token identifying exactly one write of a document.
///
/// Assigned by the document store on every successful write. Callers hand it
/// back on the next conditional write or delete; they never construct one for
/// a document they have not read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken {
    pub seq_no: i64,
    pub primary_term: i64,
}

impl VersionToken {
    pub fn new(seq_no: i64, primary_term: i64) -> Self {
        Self {
            seq_no,
            primary_term,
        }
    }

    /// Whether `self` was assigned after `other` (term first, then sequence).
    pub fn is_after(&self, other: &VersionToken) -> bool {
        (self.primary_term, self.seq_no) > (other.primary_term, other.seq_no)
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seq_no={}, primary_term={}",
            self.seq_no, self.primary_term
        )
    }
}
