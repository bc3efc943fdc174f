//! Document repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use docflow_core::{
    new_v7, CreateDocumentRequest, Document, DocumentRepository, DocumentStatus, Error, Result,
};

/// PostgreSQL implementation of DocumentRepository.
pub struct PgDocumentRepository {
    pool: Pool<Postgres>,
}

impl PgDocumentRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Document {
        Document {
            id: row.get("id"),
            filename: row.get("filename"),
            storage_path: row.get("storage_path"),
            mime_type: row.get("mime_type"),
            status: DocumentStatus::parse(row.get("status")),
            processing_attempts: row.get("processing_attempts"),
            processing_error: row.get("processing_error"),
            extracted_text: row.get("extracted_text"),
            page_count: row.get("page_count"),
            metadata: row.get("metadata"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

const DOCUMENT_COLUMNS: &str = "id, filename, storage_path, mime_type, status, \
     processing_attempts, processing_error, extracted_text, page_count, metadata, \
     created_at, updated_at";

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn create(&self, request: CreateDocumentRequest) -> Result<Document> {
        let id = new_v7();
        let now = Utc::now();
        let metadata = request.metadata.unwrap_or_else(|| serde_json::json!({}));

        let row = sqlx::query(&format!(
            "INSERT INTO document (id, filename, storage_path, mime_type, status,
                 processing_attempts, metadata, created_at, updated_at)
             VALUES ($1, $2, $3, $4, 'pending', 0, $5, $6, $6)
             RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(&request.filename)
        .bind(&request.storage_path)
        .bind(&request.mime_type)
        .bind(&metadata)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_row(row))
    }

    async fn get(&self, id: Uuid) -> Result<Document> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM document WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_row)
            .ok_or(Error::DocumentNotFound(id))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM document
             ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    async fn update_status(&self, id: Uuid, status: DocumentStatus) -> Result<()> {
        let result = sqlx::query(
            "UPDATE document SET status = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }
        Ok(())
    }

    async fn set_extracted_text(
        &self,
        id: Uuid,
        text: &str,
        page_count: Option<i32>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE document SET extracted_text = $1, page_count = $2, updated_at = $3
             WHERE id = $4",
        )
        .bind(text)
        .bind(page_count)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE document
             SET status = 'failed', processing_error = $1,
                 processing_attempts = processing_attempts + 1, updated_at = $2
             WHERE id = $3",
        )
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }
        Ok(())
    }

    async fn reset_for_retry(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE document
             SET status = 'pending', processing_error = NULL, updated_at = $1
             WHERE id = $2",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM detected_field WHERE document_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        sqlx::query("DELETE FROM document_chunk WHERE document_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        sqlx::query("DELETE FROM processing_queue WHERE document_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        sqlx::query("DELETE FROM document WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}
