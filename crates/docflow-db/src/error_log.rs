//! Error-recovery audit log repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use docflow_core::{Error, ErrorLogEntry, ErrorLogRepository, Result};

/// PostgreSQL implementation of ErrorLogRepository.
pub struct PgErrorLogRepository {
    pool: Pool<Postgres>,
}

impl PgErrorLogRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> ErrorLogEntry {
        ErrorLogEntry {
            id: row.get("id"),
            operation: row.get("operation"),
            document_id: row.get("document_id"),
            error_type: row.get("error_type"),
            message: row.get("message"),
            strategy: row.get("strategy"),
            success: row.get("success"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl ErrorLogRepository for PgErrorLogRepository {
    async fn record(&self, entry: ErrorLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO error_log
                 (id, operation, document_id, error_type, message, strategy, success, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id)
        .bind(&entry.operation)
        .bind(entry.document_id)
        .bind(&entry.error_type)
        .bind(&entry.message)
        .bind(&entry.strategy)
        .bind(entry.success)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn list_for_document(&self, document_id: Uuid, limit: i64) -> Result<Vec<ErrorLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, operation, document_id, error_type, message, strategy, success, created_at
             FROM error_log WHERE document_id = $1
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(document_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }
}
