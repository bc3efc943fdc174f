//! Processing queue repository implementation.
//!
//! The queue is a Postgres table claimed with `FOR UPDATE SKIP LOCKED` so
//! multiple worker instances never double-claim an item. Attempts are
//! incremented only when an item fails, never on claim.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use docflow_core::{
    new_v7, EnqueueRequest, Error, QueueItem, QueueRepository, QueueStats, QueueStatus, Result,
};

/// PostgreSQL implementation of QueueRepository.
pub struct PgQueueRepository {
    pool: Pool<Postgres>,
}

impl PgQueueRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> QueueItem {
        QueueItem {
            id: row.get("id"),
            document_id: row.get("document_id"),
            priority: row.get("priority"),
            status: QueueStatus::parse(row.get("status")),
            attempts: row.get("attempts"),
            max_attempts: row.get("max_attempts"),
            processor_types: row.get("processor_types"),
            scheduled_at: row.get("scheduled_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            error: row.get("error"),
            created_at: row.get("created_at"),
        }
    }
}

const QUEUE_COLUMNS: &str = "id, document_id, priority, status, attempts, max_attempts, \
     processor_types, scheduled_at, started_at, completed_at, error, created_at";

#[async_trait]
impl QueueRepository for PgQueueRepository {
    async fn enqueue(&self, request: EnqueueRequest) -> Result<QueueItem> {
        let id = new_v7();
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "INSERT INTO processing_queue
                 (id, document_id, priority, status, attempts, max_attempts,
                  processor_types, scheduled_at, created_at)
             VALUES ($1, $2, $3, 'pending', 0, $4, $5, $6, $6)
             RETURNING {QUEUE_COLUMNS}"
        ))
        .bind(id)
        .bind(request.document_id)
        .bind(request.priority)
        .bind(request.max_attempts)
        .bind(&request.processor_types)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_row(row))
    }

    async fn get(&self, id: Uuid) -> Result<QueueItem> {
        let row = sqlx::query(&format!(
            "SELECT {QUEUE_COLUMNS} FROM processing_queue WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_row)
            .ok_or_else(|| Error::NotFound(format!("queue item {}", id)))
    }

    async fn claim_batch(&self, limit: usize) -> Result<Vec<QueueItem>> {
        let now = Utc::now();

        // Filter before locking; SKIP LOCKED keeps concurrent workers from
        // blocking on each other's claims.
        let rows = sqlx::query(&format!(
            "UPDATE processing_queue
             SET status = 'processing', started_at = $1
             WHERE id IN (
                 SELECT id FROM processing_queue
                 WHERE status = 'pending'
                   AND scheduled_at <= $1
                   AND attempts < max_attempts
                 ORDER BY priority DESC, scheduled_at ASC
                 LIMIT $2
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {QUEUE_COLUMNS}"
        ))
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    async fn complete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE processing_queue
             SET status = 'completed', completed_at = $1, error = NULL
             WHERE id = $2",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("queue item {}", id)));
        }
        Ok(())
    }

    async fn retry_later(&self, id: Uuid, error: &str, delay: Duration) -> Result<()> {
        let scheduled_at = Utc::now() + delay;

        let result = sqlx::query(
            "UPDATE processing_queue
             SET status = 'pending', attempts = attempts + 1, error = $1,
                 scheduled_at = $2, started_at = NULL
             WHERE id = $3",
        )
        .bind(error)
        .bind(scheduled_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("queue item {}", id)));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE processing_queue
             SET status = 'failed', attempts = attempts + 1, error = $1, completed_at = $2
             WHERE id = $3",
        )
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("queue item {}", id)));
        }
        Ok(())
    }

    async fn stats(&self) -> Result<QueueStats> {
        // AVG over EXTRACT(EPOCH ...) yields numeric; cast to float8 so
        // the value decodes as f64.
        let row = sqlx::query(
            "SELECT
                 COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                 COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                 COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                 COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                 (AVG(EXTRACT(EPOCH FROM (started_at - scheduled_at)) * 1000)
                     FILTER (WHERE status = 'completed' AND started_at IS NOT NULL)
                     )::float8 AS avg_wait_ms,
                 (AVG(EXTRACT(EPOCH FROM (completed_at - started_at)) * 1000)
                     FILTER (WHERE status = 'completed' AND completed_at IS NOT NULL)
                     )::float8 AS avg_processing_ms
             FROM processing_queue",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get("pending"),
            processing: row.get("processing"),
            completed: row.get("completed"),
            failed: row.get("failed"),
            // NULL when no completed item has timing columns set.
            avg_wait_ms: row.try_get("avg_wait_ms").ok(),
            avg_processing_ms: row.try_get("avg_processing_ms").ok(),
        })
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM processing_queue
             WHERE status IN ('completed', 'failed') AND completed_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }
}
