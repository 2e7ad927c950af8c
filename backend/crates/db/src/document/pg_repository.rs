use async_trait::async_trait;
use rollup_common::error::{RollupError, RollupResult};
use rollup_common::types::VersionToken;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::document::models::{DeleteOutcome, StoredDocument, WriteOutcome};
use crate::document::repositories::DocumentStore;

/// Postgres-backed document store.
///
/// `seq_no` is drawn from one sequence for the whole table, so every
/// successful write gets a token no other write has had. Each conditional
/// write is a single statement whose `where` clause carries the token
/// check; there is no read-then-write window. An update never lowers the
/// stored `primary_term`, so a process started with an older term still
/// produces tokens that order after the ones it replaced.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
    primary_term: i64,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool, primary_term: i64) -> Self {
        Self { pool, primary_term }
    }

    /// Create the sequence and table if they are missing.
    pub async fn ensure_schema(&self) -> RollupResult<()> {
        sqlx::query("create sequence if not exists transform_seq_no")
            .execute(&self.pool)
            .await
            .map_err(|e| RollupError::Database(e.to_string()))?;

        sqlx::query(
            "create table if not exists transform_documents (
               id text primary key,
               body jsonb not null,
               seq_no bigint not null,
               primary_term bigint not null,
               version bigint not null default 1,
               created_at timestamptz not null default now(),
               updated_at timestamptz not null default now()
             )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RollupError::Database(e.to_string()))?;

        Ok(())
    }

    fn map_row(row: PgRow) -> StoredDocument {
        StoredDocument {
            id: row.get("id"),
            token: VersionToken::new(row.get("seq_no"), row.get("primary_term")),
            version: row.get("version"),
            body: row.get("body"),
        }
    }

    fn map_written(row: PgRow) -> WriteOutcome {
        WriteOutcome::Written {
            token: VersionToken::new(row.get("seq_no"), row.get("primary_term")),
            version: row.get("version"),
        }
    }

    async fn current_token(&self, id: &str) -> RollupResult<Option<VersionToken>> {
        let row = sqlx::query("select seq_no, primary_term from transform_documents where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RollupError::Database(e.to_string()))?;

        Ok(row.map(|r| VersionToken::new(r.get("seq_no"), r.get("primary_term"))))
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn read(&self, id: &str) -> RollupResult<Option<StoredDocument>> {
        let row = sqlx::query(
            "select id, body, seq_no, primary_term, version
             from transform_documents where id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RollupError::Database(e.to_string()))?;

        Ok(row.map(Self::map_row))
    }

    async fn list(&self) -> RollupResult<Vec<StoredDocument>> {
        let rows = sqlx::query(
            "select id, body, seq_no, primary_term, version
             from transform_documents order by id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RollupError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Self::map_row).collect())
    }

    async fn write(
        &self,
        id: &str,
        body: serde_json::Value,
        expected: Option<VersionToken>,
    ) -> RollupResult<WriteOutcome> {
        let row = match expected {
            None => sqlx::query(
                "insert into transform_documents (id, body, seq_no, primary_term, version)
                 values ($1, $2, nextval('transform_seq_no'), $3, 1)
                 on conflict (id) do nothing
                 returning seq_no, primary_term, version",
            )
            .bind(id)
            .bind(&body)
            .bind(self.primary_term)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RollupError::Database(e.to_string()))?,
            Some(token) => sqlx::query(
                "update transform_documents
                 set body = $1, seq_no = nextval('transform_seq_no'),
                     primary_term = greatest(primary_term, $2),
                     version = version + 1, updated_at = now()
                 where id = $3 and seq_no = $4 and primary_term = $5
                 returning seq_no, primary_term, version",
            )
            .bind(&body)
            .bind(self.primary_term)
            .bind(id)
            .bind(token.seq_no)
            .bind(token.primary_term)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RollupError::Database(e.to_string()))?,
        };

        match row {
            Some(r) => Ok(Self::map_written(r)),
            None => Ok(WriteOutcome::Conflict {
                current: self.current_token(id).await?,
            }),
        }
    }

    async fn delete(&self, id: &str, expected: VersionToken) -> RollupResult<DeleteOutcome> {
        let result = sqlx::query(
            "delete from transform_documents
             where id = $1 and seq_no = $2 and primary_term = $3",
        )
        .bind(id)
        .bind(expected.seq_no)
        .bind(expected.primary_term)
        .execute(&self.pool)
        .await
        .map_err(|e| RollupError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Ok(DeleteOutcome::Conflict {
                current: self.current_token(id).await?,
            });
        }
        Ok(DeleteOutcome::Deleted)
    }
}
