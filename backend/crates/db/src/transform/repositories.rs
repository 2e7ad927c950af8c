use std::sync::Arc;

use async_trait::async_trait;
use rollup_common::error::RollupResult;
use rollup_common::types::VersionToken;

use crate::transform::models::{TransformJob, UndecodableJob, VersionedJob};

/// CRUD over transform job documents with optimistic concurrency.
///
/// Implementations never retry: a stale token surfaces as
/// `RollupError::VersionConflict` and the caller decides what to do.
#[async_trait]
pub trait TransformRepository: Send + Sync {
    /// Fails with `NotFound` if `id` is absent.
    async fn get(&self, id: &str) -> RollupResult<VersionedJob>;

    /// Fails as a whole if any document cannot be decoded.
    async fn list(&self) -> RollupResult<Vec<VersionedJob>>;

    /// Like `list`, but decodes each document on its own so one bad
    /// document does not hide the others.
    async fn scan(&self) -> RollupResult<Vec<Result<VersionedJob, UndecodableJob>>>;

    /// `expected = None` creates and fails with `AlreadyExists` if the id is
    /// taken. `expected = Some(t)` updates only if `t` is still current.
    async fn put(
        &self,
        job: &TransformJob,
        expected: Option<VersionToken>,
    ) -> RollupResult<VersionedJob>;

    /// Fails with `VersionConflict` if `expected` is stale or the job is gone.
    async fn delete(&self, id: &str, expected: VersionToken) -> RollupResult<()>;
}

#[async_trait]
impl<T: TransformRepository + ?Sized> TransformRepository for Arc<T> {
    async fn get(&self, id: &str) -> RollupResult<VersionedJob> {
        (**self).get(id).await
    }

    async fn list(&self) -> RollupResult<Vec<VersionedJob>> {
        (**self).list().await
    }

    async fn scan(&self) -> RollupResult<Vec<Result<VersionedJob, UndecodableJob>>> {
        (**self).scan().await
    }

    async fn put(
        &self,
        job: &TransformJob,
        expected: Option<VersionToken>,
    ) -> RollupResult<VersionedJob> {
        (**self).put(job, expected).await
    }

    async fn delete(&self, id: &str, expected: VersionToken) -> RollupResult<()> {
        (**self).delete(id, expected).await
    }
}
