use std::time::Duration;

use chrono::Utc;
use rollup_common::error::{RollupError, RollupResult};
use rollup_common::types::VersionToken;
use rollup_config::SchedulerConfig;
use rollup_db::transform::models::{JobStatus, TransformJob};
use rollup_db::transform::repositories::TransformRepository;

use crate::checkpoint;
use crate::executor::{ExecutionError, UnitExecutor, UnitOutcome, UnitRequest};
use crate::lifecycle::status_after_progress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub max_conflict_retries: u32,
    pub default_page_size: u32,
}

impl Default for TickPolicy {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for TickPolicy {
    fn from(cfg: &SchedulerConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff_base: cfg.backoff_base,
            backoff_max: cfg.backoff_max,
            max_conflict_retries: cfg.max_conflict_retries,
            default_page_size: cfg.default_page_size,
        }
    }
}

impl TickPolicy {
    /// Delay before retry number `attempt` (1-based): doubling from the
    /// base, capped at the maximum.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .map_or(self.backoff_max, |d| d.min(self.backoff_max))
    }
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The job was not STARTED; nothing was written.
    Skipped { status: JobStatus },
    /// Progress committed; the job stays STARTED.
    Advanced { token: VersionToken, cursor: i64 },
    /// Progress committed and the bounded job reached the end of its source.
    Finished { token: VersionToken, cursor: i64 },
    /// The failure was recorded and the job moved to FAILED.
    Failed { token: VersionToken, error: String },
    /// The job was deleted.
    Gone,
    /// Lost the conditional write more times than allowed; nothing was written.
    Contended,
}

impl TickOutcome {
    /// Whether another tick could do useful work without an admin command.
    pub fn keeps_ticking(&self) -> bool {
        matches!(self, Self::Advanced { .. } | Self::Contended)
    }
}

enum Verdict {
    Progress { finished: bool, cursor: i64 },
    Failure { error: String },
}

/// Runs one tick of one job and commits it with a write conditional on the
/// token read at the start. On conflict the computed progress is dropped and
/// the tick starts over from a fresh read.
pub struct ExecutionCoordinator<R, E> {
    repo: R,
    executor: E,
    policy: TickPolicy,
}

impl<R, E> ExecutionCoordinator<R, E>
where
    R: TransformRepository,
    E: UnitExecutor,
{
    pub fn new(repo: R, executor: E, policy: TickPolicy) -> Self {
        Self {
            repo,
            executor,
            policy,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub async fn tick(&self, id: &str) -> RollupResult<TickOutcome> {
        let mut conflicts = 0u32;

        loop {
            let current = match self.repo.get(id).await {
                Ok(current) => current,
                Err(RollupError::NotFound(_)) => {
                    tracing::info!(job_id = %id, "job no longer exists, tick ends");
                    return Ok(TickOutcome::Gone);
                }
                Err(e) => return Err(e),
            };

            if current.job.status != JobStatus::Started {
                tracing::debug!(job_id = %id, status = %current.job.status, "job not started, skipping tick");
                return Ok(TickOutcome::Skipped {
                    status: current.job.status,
                });
            }

            let (next, verdict) = self.evaluate(&current.job).await;

            match self.repo.put(&next, Some(current.token)).await {
                Ok(written) => {
                    return Ok(match verdict {
                        Verdict::Progress { finished, cursor } => {
                            tracing::info!(
                                job_id = %id,
                                cursor,
                                seq_no = written.token.seq_no,
                                primary_term = written.token.primary_term,
                                finished,
                                "checkpoint committed"
                            );
                            if finished {
                                TickOutcome::Finished {
                                    token: written.token,
                                    cursor,
                                }
                            } else {
                                TickOutcome::Advanced {
                                    token: written.token,
                                    cursor,
                                }
                            }
                        }
                        Verdict::Failure { error } => {
                            tracing::error!(job_id = %id, error = %error, "job failed");
                            TickOutcome::Failed {
                                token: written.token,
                                error,
                            }
                        }
                    });
                }
                Err(RollupError::VersionConflict { current: latest, .. }) => {
                    conflicts += 1;
                    tracing::info!(
                        job_id = %id,
                        read_seq_no = current.token.seq_no,
                        latest = ?latest,
                        conflicts,
                        "job changed during tick, discarding progress and re-reading"
                    );
                    if conflicts > self.policy.max_conflict_retries {
                        tracing::warn!(job_id = %id, conflicts, "giving up on contended tick");
                        return Ok(TickOutcome::Contended);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run one unit from the committed cursor and build the document to
    /// write back. Never touches the store.
    async fn evaluate(&self, job: &TransformJob) -> (TransformJob, Verdict) {
        let now = Utc::now();
        let mut next = job.clone();
        next.updated_at = now;

        let failure = match self.execute_with_retry(job).await {
            Ok(unit) => match checkpoint::advance(&job.checkpoint, &unit, now) {
                Ok(cp) => {
                    let status =
                        status_after_progress(job.definition.continuous, unit.source_exhausted);
                    let cursor = cp.cursor;
                    next.checkpoint = cp;
                    next.status = status;
                    return (
                        next,
                        Verdict::Progress {
                            finished: status == JobStatus::Finished,
                            cursor,
                        },
                    );
                }
                Err(e) => e.to_string(),
            },
            Err(e) => e.to_string(),
        };

        next.checkpoint = checkpoint::record_failure(&job.checkpoint, &failure, now);
        next.status = JobStatus::Failed;
        next.enabled_at = None;
        (next, Verdict::Failure { error: failure })
    }

    async fn execute_with_retry(&self, job: &TransformJob) -> Result<UnitOutcome, ExecutionError> {
        let request = UnitRequest {
            job_id: &job.id,
            definition: &job.definition,
            start_cursor: job.checkpoint.cursor,
            page_size: job
                .definition
                .page_size
                .unwrap_or(self.policy.default_page_size),
        };

        let mut attempt = 1;
        loop {
            match self.executor.execute_unit(&request).await {
                Ok(unit) => return Ok(unit),
                Err(ExecutionError::Recoverable(msg)) => {
                    if attempt >= self.policy.max_attempts {
                        return Err(ExecutionError::RetriesExhausted {
                            attempts: attempt,
                            last_error: msg,
                        });
                    }
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(
                        job_id = %job.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %msg,
                        "recoverable execution error, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
