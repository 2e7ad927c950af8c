use async_trait::async_trait;
use rollup_common::error::{RollupError, RollupResult};
use serde_json::{Map, Value};
use sqlx::{PgPool, Row};

use crate::executor::{ExecutionError, UnitExecutor, UnitOutcome, UnitRequest};

/// One grouping field: read from `source`, written as `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProjectedField {
    pub source: String,
    pub target: String,
}

/// Fields named by `groups`. Entries are either a plain field name or
/// `{ "<kind>": { "source_field": .., "target_field": .. } }`, where the
/// target defaults to the source field. Unrecognised entries are skipped.
pub(crate) fn projected_fields(groups: &Value) -> Vec<ProjectedField> {
    let Some(entries) = groups.as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(name) => Some(ProjectedField {
                source: name.clone(),
                target: name.clone(),
            }),
            Value::Object(map) => {
                let spec = map.values().next()?;
                let source = spec.get("source_field")?.as_str()?.to_string();
                let target = spec
                    .get("target_field")
                    .and_then(Value::as_str)
                    .map_or_else(|| source.clone(), str::to_string);
                Some(ProjectedField { source, target })
            }
            _ => None,
        })
        .collect()
}

/// Destination body for one source record. Missing fields project as null.
pub(crate) fn project(body: &Value, fields: &[ProjectedField]) -> Value {
    if fields.is_empty() {
        return body.clone();
    }
    let mut out = Map::new();
    for field in fields {
        let value = body.get(&field.source).cloned().unwrap_or(Value::Null);
        out.insert(field.target.clone(), value);
    }
    Value::Object(out)
}

fn classify(err: sqlx::Error) -> ExecutionError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Tls(_) => ExecutionError::Recoverable(err.to_string()),
        other => ExecutionError::Fatal(other.to_string()),
    }
}

/// Uses the global `seq` of `index_documents` rows as the cursor. Replaying
/// a page rewrites the same destination rows.
#[derive(Clone)]
pub struct PgProjectionExecutor {
    pool: PgPool,
}

impl PgProjectionExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> RollupResult<()> {
        sqlx::query(
            "create table if not exists index_documents (
               index_name text not null,
               doc_id text not null,
               seq bigserial not null,
               body jsonb not null,
               updated_at timestamptz not null default now(),
               unique (index_name, doc_id)
             )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RollupError::Database(e.to_string()))?;

        sqlx::query(
            "create index if not exists index_documents_index_seq
             on index_documents (index_name, seq)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RollupError::Database(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl UnitExecutor for PgProjectionExecutor {
    async fn execute_unit(
        &self,
        request: &UnitRequest<'_>,
    ) -> Result<UnitOutcome, ExecutionError> {
        let source = &request.definition.source.index;
        let destination = &request.definition.destination.index;
        let fields = projected_fields(&request.definition.groups);

        let mut tx = self.pool.begin().await.map_err(classify)?;

        // One row past the page tells whether the source is exhausted.
        let rows = sqlx::query(
            "select doc_id, seq, body from index_documents
             where index_name = $1 and seq > $2
             order by seq
             limit $3",
        )
        .bind(source)
        .bind(request.start_cursor)
        .bind(i64::from(request.page_size) + 1)
        .fetch_all(&mut *tx)
        .await
        .map_err(classify)?;

        let page_size = request.page_size as usize;
        let source_exhausted = rows.len() <= page_size;

        let mut end_cursor = request.start_cursor;
        let mut records_processed = 0u64;
        let mut documents_indexed = 0u64;

        for row in rows.iter().take(page_size) {
            let doc_id: String = row.get("doc_id");
            let seq: i64 = row.get("seq");
            let body: Value = row.get("body");

            let result = sqlx::query(
                "insert into index_documents (index_name, doc_id, body)
                 values ($1, $2, $3)
                 on conflict (index_name, doc_id)
                 do update set body = excluded.body, updated_at = now()",
            )
            .bind(destination)
            .bind(&doc_id)
            .bind(project(&body, &fields))
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

            end_cursor = seq;
            records_processed += 1;
            documents_indexed += result.rows_affected();
        }

        tx.commit().await.map_err(classify)?;

        tracing::debug!(
            job_id = %request.job_id,
            source = %source,
            destination = %destination,
            start_cursor = request.start_cursor,
            end_cursor,
            records_processed,
            "unit executed"
        );

        Ok(UnitOutcome {
            end_cursor,
            records_processed,
            documents_indexed,
            source_exhausted,
        })
    }
}
