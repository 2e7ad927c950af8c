use chrono::{DateTime, Utc};
use rollup_common::error::{RollupError, RollupResult};
use rollup_db::transform::models::{JobStatus, TransformJob};

/// Administrative commands that move a job between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobCommand {
    /// CREATED -> STARTED
    Start,
    /// STARTED -> STOPPED, observed by the next tick
    Stop,
    /// STOPPED -> STARTED
    Resume,
    /// FAILED -> STARTED, continuing from the last committed cursor
    Retry,
}

impl JobCommand {
    /// The state `self` leads to from `from`, or `None` if the command is
    /// not defined there.
    pub fn next_status(self, from: JobStatus) -> Option<JobStatus> {
        use JobCommand::*;
        use JobStatus::*;

        match (self, from) {
            (Start, Created) | (Resume, Stopped) | (Retry, Failed) => Some(Started),
            (Stop, Started) => Some(Stopped),
            (Start, Started | Stopped | Finished | Failed)
            | (Stop, Created | Stopped | Finished | Failed)
            | (Resume, Created | Started | Finished | Failed)
            | (Retry, Created | Started | Stopped | Finished) => None,
        }
    }

    /// The command that takes a job from `from` to `to`, if any.
    pub fn for_transition(from: JobStatus, to: JobStatus) -> Option<Self> {
        [Self::Start, Self::Stop, Self::Resume, Self::Retry]
            .into_iter()
            .find(|cmd| cmd.next_status(from) == Some(to))
    }
}

/// Apply `command` to `job` in place.
pub fn apply_command(
    job: &mut TransformJob,
    command: JobCommand,
    now: DateTime<Utc>,
) -> RollupResult<()> {
    let next = command
        .next_status(job.status)
        .ok_or_else(|| RollupError::InvalidTransition {
            id: job.id.clone(),
            from: job.status.to_string(),
            to: format!("{command:?}").to_lowercase(),
        })?;

    match command {
        JobCommand::Start | JobCommand::Resume => job.enabled_at = Some(now),
        JobCommand::Retry => {
            job.enabled_at = Some(now);
            job.checkpoint.last_error = None;
        }
        JobCommand::Stop => job.enabled_at = None,
    }
    job.status = next;
    job.updated_at = now;
    Ok(())
}

/// Status after a successful unit of work on a STARTED job.
pub fn status_after_progress(continuous: bool, source_exhausted: bool) -> JobStatus {
    if source_exhausted && !continuous {
        JobStatus::Finished
    } else {
        JobStatus::Started
    }
}
