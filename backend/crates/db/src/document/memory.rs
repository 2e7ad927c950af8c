use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use rollup_common::error::{RollupError, RollupResult};
use rollup_common::types::VersionToken;

use crate::document::models::{DeleteOutcome, StoredDocument, WriteOutcome};
use crate::document::repositories::DocumentStore;

#[derive(Debug, Default)]
struct Inner {
    docs: BTreeMap<String, StoredDocument>,
    last_seq_no: i64,
    writes: u64,
}

/// Tokens come from one counter shared by all documents.
#[derive(Debug)]
pub struct InMemoryDocumentStore {
    inner: RwLock<Inner>,
    primary_term: i64,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poison_err<T>(_: PoisonError<T>) -> RollupError {
    RollupError::Database("document store lock poisoned".to_string())
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_primary_term(1)
    }

    pub fn with_primary_term(primary_term: i64) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            primary_term,
        }
    }

    /// Successful writes (creates and updates) since the store was created.
    pub fn write_count(&self) -> RollupResult<u64> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner.writes)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn read(&self, id: &str) -> RollupResult<Option<StoredDocument>> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner.docs.get(id).cloned())
    }

    async fn list(&self) -> RollupResult<Vec<StoredDocument>> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner.docs.values().cloned().collect())
    }

    async fn write(
        &self,
        id: &str,
        body: serde_json::Value,
        expected: Option<VersionToken>,
    ) -> RollupResult<WriteOutcome> {
        let mut inner = self.inner.write().map_err(poison_err)?;

        let current = inner.docs.get(id).map(|d| (d.token, d.version));
        let version = match (expected, current) {
            (None, None) => 1,
            (Some(exp), Some((token, version))) if exp == token => version + 1,
            (_, current) => {
                return Ok(WriteOutcome::Conflict {
                    current: current.map(|(token, _)| token),
                })
            }
        };

        inner.last_seq_no += 1;
        inner.writes += 1;
        let token = VersionToken::new(inner.last_seq_no, self.primary_term);
        inner.docs.insert(
            id.to_string(),
            StoredDocument {
                id: id.to_string(),
                token,
                version,
                body,
            },
        );

        Ok(WriteOutcome::Written { token, version })
    }

    async fn delete(&self, id: &str, expected: VersionToken) -> RollupResult<DeleteOutcome> {
        let mut inner = self.inner.write().map_err(poison_err)?;

        match inner.docs.get(id).map(|d| d.token) {
            Some(token) if token == expected => {
                inner.docs.remove(id);
                Ok(DeleteOutcome::Deleted)
            }
            current => Ok(DeleteOutcome::Conflict { current }),
        }
    }
}
