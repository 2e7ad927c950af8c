use std::sync::Arc;

use async_trait::async_trait;
use rollup_common::error::RollupResult;
use rollup_common::types::VersionToken;

use crate::document::models::{DeleteOutcome, StoredDocument, WriteOutcome};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read the current body and token for `id`, `None` if absent.
    async fn read(&self, id: &str) -> RollupResult<Option<StoredDocument>>;

    /// All documents, ordered by id.
    async fn list(&self) -> RollupResult<Vec<StoredDocument>>;

    /// Conditional write.
    ///
    /// With `expected = None` this is a create that conflicts if `id` exists.
    /// With `expected = Some(t)` it replaces the body only if the current
    /// token equals `t`; a missing document also conflicts.
    async fn write(
        &self,
        id: &str,
        body: serde_json::Value,
        expected: Option<VersionToken>,
    ) -> RollupResult<WriteOutcome>;

    /// Remove `id` only if its current token equals `expected`.
    async fn delete(&self, id: &str, expected: VersionToken) -> RollupResult<DeleteOutcome>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn read(&self, id: &str) -> RollupResult<Option<StoredDocument>> {
        (**self).read(id).await
    }

    async fn list(&self) -> RollupResult<Vec<StoredDocument>> {
        (**self).list().await
    }

    async fn write(
        &self,
        id: &str,
        body: serde_json::Value,
        expected: Option<VersionToken>,
    ) -> RollupResult<WriteOutcome> {
        (**self).write(id, body, expected).await
    }

    async fn delete(&self, id: &str, expected: VersionToken) -> RollupResult<DeleteOutcome> {
        (**self).delete(id, expected).await
    }
}
