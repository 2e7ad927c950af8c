use async_trait::async_trait;
use rollup_common::error::{RollupError, RollupResult};
use rollup_common::types::VersionToken;

use crate::document::models::{DeleteOutcome, StoredDocument, WriteOutcome};
use crate::document::repositories::DocumentStore;
use crate::transform::models::{TransformJob, UndecodableJob, VersionedJob};
use crate::transform::repositories::TransformRepository;

/// [`TransformRepository`] over any [`DocumentStore`]; jobs are stored as
/// their JSON document keyed by id.
#[derive(Clone)]
pub struct DocumentTransformRepository<S> {
    store: S,
}

impl<S: DocumentStore> DocumentTransformRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn decode(doc: StoredDocument) -> RollupResult<VersionedJob> {
        let job: TransformJob = serde_json::from_value(doc.body).map_err(|e| {
            RollupError::Internal(format!("undecodable transform document {}: {e}", doc.id))
        })?;
        if job.id != doc.id {
            return Err(RollupError::Internal(format!(
                "transform document {} carries id {}",
                doc.id, job.id
            )));
        }
        Ok(VersionedJob {
            job,
            token: doc.token,
            version: doc.version,
        })
    }
}

#[async_trait]
impl<S: DocumentStore> TransformRepository for DocumentTransformRepository<S> {
    async fn get(&self, id: &str) -> RollupResult<VersionedJob> {
        match self.store.read(id).await? {
            Some(doc) => Self::decode(doc),
            None => Err(RollupError::NotFound(format!("transform not found: {id}"))),
        }
    }

    async fn list(&self) -> RollupResult<Vec<VersionedJob>> {
        self.store
            .list()
            .await?
            .into_iter()
            .map(Self::decode)
            .collect()
    }

    async fn scan(&self) -> RollupResult<Vec<Result<VersionedJob, UndecodableJob>>> {
        let docs = self.store.list().await?;
        Ok(docs
            .into_iter()
            .map(|doc| {
                let id = doc.id.clone();
                Self::decode(doc).map_err(|error| UndecodableJob { id, error })
            })
            .collect())
    }

    async fn put(
        &self,
        job: &TransformJob,
        expected: Option<VersionToken>,
    ) -> RollupResult<VersionedJob> {
        let body = serde_json::to_value(job)
            .map_err(|e| RollupError::Internal(format!("encoding transform {}: {e}", job.id)))?;

        match self.store.write(&job.id, body, expected).await? {
            WriteOutcome::Written { token, version } => {
                tracing::debug!(
                    job_id = %job.id,
                    seq_no = token.seq_no,
                    primary_term = token.primary_term,
                    version,
                    "transform document written"
                );
                Ok(VersionedJob {
                    job: job.clone(),
                    token,
                    version,
                })
            }
            WriteOutcome::Conflict { current } => match expected {
                None => Err(RollupError::AlreadyExists {
                    id: job.id.clone(),
                    current,
                }),
                Some(_) => Err(RollupError::version_conflict(&job.id, current)),
            },
        }
    }

    async fn delete(&self, id: &str, expected: VersionToken) -> RollupResult<()> {
        match self.store.delete(id, expected).await? {
            DeleteOutcome::Deleted => {
                tracing::debug!(job_id = %id, "transform document deleted");
                Ok(())
            }
            DeleteOutcome::Conflict { current } => Err(RollupError::version_conflict(id, current)),
        }
    }
}
