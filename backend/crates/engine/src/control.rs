use chrono::Utc;
use rollup_common::error::{RollupError, RollupResult};
use rollup_common::types::VersionToken;
use rollup_db::transform::models::{
    validate_job_id, JobStatus, TransformDefinition, TransformJob, VersionedJob,
};
use rollup_db::transform::repositories::TransformRepository;

use crate::lifecycle::{apply_command, JobCommand};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    pub job: VersionedJob,
    pub created: bool,
}

#[derive(Clone)]
pub struct TransformControl<R> {
    repo: R,
}

impl<R: TransformRepository> TransformControl<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Create `id` when `expected` is `None`, otherwise replace the job the
    /// token refers to. Status, checkpoint and `enabled_at` survive a
    /// replace.
    pub async fn create_or_replace(
        &self,
        id: &str,
        definition: TransformDefinition,
        expected: Option<VersionToken>,
    ) -> RollupResult<PutOutcome> {
        validate_job_id(id).map_err(RollupError::Validation)?;
        definition.validate().map_err(RollupError::Validation)?;
        let now = Utc::now();

        let Some(token) = expected else {
            let job = TransformJob::new(id, definition, now);
            let written = self.repo.put(&job, None).await?;
            tracing::info!(job_id = %id, seq_no = written.token.seq_no, "transform created");
            return Ok(PutOutcome {
                job: written,
                created: true,
            });
        };

        let current = match self.repo.get(id).await {
            Ok(current) => current,
            Err(RollupError::NotFound(_)) => {
                return Err(RollupError::version_conflict(id, None));
            }
            Err(e) => return Err(e),
        };
        if current.token != token {
            return Err(RollupError::version_conflict(id, Some(current.token)));
        }
        if current.job.checkpoint.has_progress()
            && current.job.definition.changes_data_shape(&definition)
        {
            return Err(RollupError::Validation(format!(
                "transform {id} has already processed data; source, destination, groups and aggregations cannot change"
            )));
        }

        let mut job = current.job;
        job.definition = definition;
        job.updated_at = now;
        let written = self.repo.put(&job, Some(token)).await?;
        tracing::info!(job_id = %id, seq_no = written.token.seq_no, "transform replaced");
        Ok(PutOutcome {
            job: written,
            created: false,
        })
    }

    pub async fn read(&self, id: &str) -> RollupResult<VersionedJob> {
        self.repo.get(id).await
    }

    pub async fn list(&self) -> RollupResult<Vec<VersionedJob>> {
        self.repo.list().await
    }

    /// A stale token is a `VersionConflict`; a job that no longer exists is
    /// `NotFound`.
    pub async fn delete(&self, id: &str, token: VersionToken) -> RollupResult<()> {
        match self.repo.delete(id, token).await {
            Ok(()) => {
                tracing::info!(job_id = %id, "transform deleted");
                Ok(())
            }
            Err(RollupError::VersionConflict { current: None, .. }) => Err(RollupError::NotFound(
                format!("transform not found: {id}"),
            )),
            Err(e) => Err(e),
        }
    }

    /// Move the job to `desired` using the command defined for its current
    /// status. Requesting the status the job is already in is an invalid
    /// transition, not a no-op.
    pub async fn set_status(
        &self,
        id: &str,
        token: VersionToken,
        desired: JobStatus,
    ) -> RollupResult<VersionedJob> {
        let current = self.repo.get(id).await?;
        if current.token != token {
            return Err(RollupError::version_conflict(id, Some(current.token)));
        }

        let from = current.job.status;
        let command = JobCommand::for_transition(from, desired).ok_or_else(|| {
            RollupError::InvalidTransition {
                id: id.to_string(),
                from: from.to_string(),
                to: desired.to_string(),
            }
        })?;

        let mut job = current.job;
        apply_command(&mut job, command, Utc::now())?;
        let written = self.repo.put(&job, Some(token)).await?;
        tracing::info!(
            job_id = %id,
            command = ?command,
            from = %from,
            to = %written.job.status,
            seq_no = written.token.seq_no,
            "transform status changed"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::tests::{definition, mem_repo, MemRepo, RangeExecutor};
    use crate::coordinator::{ExecutionCoordinator, TickOutcome, TickPolicy};
    use crate::executor::{ExecutionError, UnitExecutor, UnitOutcome, UnitRequest};
    use async_trait::async_trait;
    use rollup_db::transform::models::Schedule;
    use serde_json::json;
    use std::sync::Arc;

    fn control() -> (TransformControl<Arc<MemRepo>>, Arc<MemRepo>) {
        let repo = mem_repo();
        (TransformControl::new(repo.clone()), repo)
    }

    struct Fatal;

    #[async_trait]
    impl UnitExecutor for Fatal {
        async fn execute_unit(
            &self,
            _request: &UnitRequest<'_>,
        ) -> Result<UnitOutcome, ExecutionError> {
            Err(ExecutionError::Fatal("mapping conflict on destination".into()))
        }
    }

    #[tokio::test]
    async fn create_then_read_returns_created_job() {
        let (control, _) = control();
        let put = control
            .create_or_replace("j1", definition(false), None)
            .await
            .unwrap();
        assert!(put.created);
        assert_eq!(put.job.job.status, JobStatus::Created);
        assert_eq!(put.job.version, 1);

        let read = control.read("j1").await.unwrap();
        assert_eq!(read, put.job);
    }

    #[tokio::test]
    async fn create_twice_is_already_exists() {
        let (control, _) = control();
        control
            .create_or_replace("j1", definition(false), None)
            .await
            .unwrap();
        let err = control
            .create_or_replace("j1", definition(false), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RollupError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn invalid_definitions_are_rejected_before_writing() {
        let (control, repo) = control();

        let err = control
            .create_or_replace("bad/id", definition(false), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RollupError::Validation(_)));

        let mut def = definition(false);
        def.schedule = Schedule::Cron {
            expression: "not a cron".into(),
            timezone: "UTC".into(),
        };
        let err = control.create_or_replace("j1", def, None).await.unwrap_err();
        assert!(matches!(err, RollupError::Validation(_)));

        let mut def = definition(false);
        def.destination.index = def.source.index.clone();
        let err = control.create_or_replace("j1", def, None).await.unwrap_err();
        assert!(matches!(err, RollupError::Validation(_)));

        assert_eq!(repo.store().write_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn replace_requires_current_token() {
        let (control, _) = control();
        let created = control
            .create_or_replace("j1", definition(false), None)
            .await
            .unwrap()
            .job;

        let mut def = definition(false);
        def.description = "hourly order rollup".into();
        let replaced = control
            .create_or_replace("j1", def.clone(), Some(created.token))
            .await
            .unwrap();
        assert!(!replaced.created);
        assert_eq!(replaced.job.version, 2);
        assert_eq!(replaced.job.job.definition.description, "hourly order rollup");

        let err = control
            .create_or_replace("j1", def, Some(created.token))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RollupError::version_conflict("j1", Some(replaced.job.token))
        );
    }

    #[tokio::test]
    async fn replace_of_missing_job_is_conflict_without_current() {
        let (control, _) = control();
        let err = control
            .create_or_replace("ghost", definition(false), Some(VersionToken::new(4, 1)))
            .await
            .unwrap_err();
        assert_eq!(err, RollupError::version_conflict("ghost", None));
    }

    #[tokio::test]
    async fn replace_keeps_status_and_checkpoint() {
        let (control, repo) = control();
        let created = control
            .create_or_replace("j1", definition(false), None)
            .await
            .unwrap()
            .job;
        let started = control
            .set_status("j1", created.token, JobStatus::Started)
            .await
            .unwrap();
        let coordinator = ExecutionCoordinator::new(
            repo.clone(),
            RangeExecutor::new(1_000),
            TickPolicy::default(),
        );
        assert!(matches!(
            coordinator.tick("j1").await.unwrap(),
            TickOutcome::Advanced { cursor: 100, .. }
        ));
        let ticked = control.read("j1").await.unwrap();
        assert!(ticked.token.is_after(&started.token));

        let mut def = definition(false);
        def.page_size = Some(500);
        let replaced = control
            .create_or_replace("j1", def, Some(ticked.token))
            .await
            .unwrap()
            .job;
        assert_eq!(replaced.job.status, JobStatus::Started);
        assert_eq!(replaced.job.checkpoint, ticked.job.checkpoint);
        assert_eq!(replaced.job.enabled_at, ticked.job.enabled_at);
        assert_eq!(replaced.job.definition.page_size, Some(500));

        let mut def = definition(false);
        def.groups = json!(["customer_id"]);
        let err = control
            .create_or_replace("j1", def, Some(replaced.token))
            .await
            .unwrap_err();
        assert!(matches!(err, RollupError::Validation(_)));
    }

    #[tokio::test]
    async fn stale_delete_conflicts_and_leaves_document() {
        let (control, _) = control();
        let created = control
            .create_or_replace("j1", definition(false), None)
            .await
            .unwrap()
            .job;
        let started = control
            .set_status("j1", created.token, JobStatus::Started)
            .await
            .unwrap();

        let err = control.delete("j1", created.token).await.unwrap_err();
        assert_eq!(err, RollupError::version_conflict("j1", Some(started.token)));
        assert_eq!(control.read("j1").await.unwrap(), started);

        control.delete("j1", started.token).await.unwrap();
        assert!(matches!(
            control.read("j1").await.unwrap_err(),
            RollupError::NotFound(_)
        ));
        assert!(matches!(
            control.delete("j1", started.token).await.unwrap_err(),
            RollupError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn status_changes_follow_lifecycle() {
        let (control, _) = control();
        let created = control
            .create_or_replace("j1", definition(false), None)
            .await
            .unwrap()
            .job;

        let err = control
            .set_status("j1", created.token, JobStatus::Stopped)
            .await
            .unwrap_err();
        assert!(matches!(err, RollupError::InvalidTransition { .. }));

        let started = control
            .set_status("j1", created.token, JobStatus::Started)
            .await
            .unwrap();
        assert!(started.job.enabled_at.is_some());

        let stopped = control
            .set_status("j1", started.token, JobStatus::Stopped)
            .await
            .unwrap();
        assert_eq!(stopped.job.status, JobStatus::Stopped);
        assert!(stopped.job.enabled_at.is_none());

        let resumed = control
            .set_status("j1", stopped.token, JobStatus::Started)
            .await
            .unwrap();
        assert_eq!(resumed.job.status, JobStatus::Started);

        let err = control
            .set_status("j1", stopped.token, JobStatus::Stopped)
            .await
            .unwrap_err();
        assert!(err.is_version_conflict());
    }

    #[tokio::test]
    async fn failed_job_is_retried_from_last_checkpoint() {
        let (control, repo) = control();
        let created = control
            .create_or_replace("j1", definition(false), None)
            .await
            .unwrap()
            .job;
        control
            .set_status("j1", created.token, JobStatus::Started)
            .await
            .unwrap();

        let good = ExecutionCoordinator::new(
            repo.clone(),
            RangeExecutor::new(1_000),
            TickPolicy::default(),
        );
        good.tick("j1").await.unwrap();
        let bad = ExecutionCoordinator::new(repo.clone(), Fatal, TickPolicy::default());
        assert!(matches!(
            bad.tick("j1").await.unwrap(),
            TickOutcome::Failed { .. }
        ));

        let failed = control.read("j1").await.unwrap();
        assert_eq!(failed.job.status, JobStatus::Failed);
        assert_eq!(failed.job.checkpoint.cursor, 100);
        assert!(failed.job.checkpoint.last_error.is_some());

        let retried = control
            .set_status("j1", failed.token, JobStatus::Started)
            .await
            .unwrap();
        assert_eq!(retried.job.status, JobStatus::Started);
        assert_eq!(retried.job.checkpoint.cursor, 100);
        assert!(retried.job.checkpoint.last_error.is_none());

        assert!(matches!(
            good.tick("j1").await.unwrap(),
            TickOutcome::Advanced { cursor: 200, .. }
        ));
    }

    #[tokio::test]
    async fn list_returns_every_job() {
        let (control, _) = control();
        for id in ["a", "b", "c"] {
            control
                .create_or_replace(id, definition(false), None)
                .await
                .unwrap();
        }
        let ids: Vec<_> = control
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.job.id)
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }
}
