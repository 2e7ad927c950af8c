use std::sync::Arc;

use async_trait::async_trait;
use rollup_db::transform::models::TransformDefinition;

/// One bounded unit of transform work.
#[derive(Debug, Clone)]
pub struct UnitRequest<'a> {
    pub job_id: &'a str,
    pub definition: &'a TransformDefinition,
    /// Exclusive lower bound: records after this position are processed.
    pub start_cursor: i64,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    /// Position of the last record processed, or the start cursor if none were.
    pub end_cursor: i64,
    pub records_processed: u64,
    pub documents_indexed: u64,
    /// No records remain after `end_cursor` at the time of the read.
    pub source_exhausted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// Transient failure (connectivity, timeouts). Retried within the tick.
    #[error("recoverable execution error: {0}")]
    Recoverable(String),

    /// Unrecoverable failure (e.g. incompatible destination). Fails the job.
    #[error("fatal execution error: {0}")]
    Fatal(String),

    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl ExecutionError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable(_))
    }
}

/// Runs units of work against a job's source and destination.
///
/// Given the same request against an unchanged source, an implementation
/// must return the same `end_cursor` and `records_processed`.
#[async_trait]
pub trait UnitExecutor: Send + Sync {
    async fn execute_unit(&self, request: &UnitRequest<'_>)
        -> Result<UnitOutcome, ExecutionError>;
}

#[async_trait]
impl<T: UnitExecutor + ?Sized> UnitExecutor for Arc<T> {
    async fn execute_unit(
        &self,
        request: &UnitRequest<'_>,
    ) -> Result<UnitOutcome, ExecutionError> {
        (**self).execute_unit(request).await
    }
}
