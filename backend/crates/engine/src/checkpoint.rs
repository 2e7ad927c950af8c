use chrono::{DateTime, Utc};
use rollup_common::error::{RollupError, RollupResult};
use rollup_db::transform::models::Checkpoint;

use crate::executor::UnitOutcome;

/// Fold one successful unit of work into the previous checkpoint.
///
/// A unit that ends before `prev.cursor` means the caller fed the executor
/// the wrong start position; that is reported as `InvariantViolation`.
pub fn advance(
    prev: &Checkpoint,
    unit: &UnitOutcome,
    now: DateTime<Utc>,
) -> RollupResult<Checkpoint> {
    if unit.end_cursor < prev.cursor {
        return Err(RollupError::InvariantViolation(format!(
            "cursor regressed from {} to {}",
            prev.cursor, unit.end_cursor
        )));
    }

    let non_empty = u64::from(unit.records_processed > 0);
    Ok(Checkpoint {
        cursor: unit.end_cursor,
        pages_processed: prev.pages_processed.saturating_add(non_empty),
        documents_processed: prev
            .documents_processed
            .saturating_add(unit.records_processed),
        documents_indexed: prev.documents_indexed.saturating_add(unit.documents_indexed),
        last_error: None,
        last_run_at: Some(now),
    })
}

/// Record a failed tick. Cursor and statistics are left as committed.
pub fn record_failure(prev: &Checkpoint, error: &str, now: DateTime<Utc>) -> Checkpoint {
    Checkpoint {
        last_error: Some(error.to_string()),
        last_run_at: Some(now),
        ..prev.clone()
    }
}
