//! Detected field repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use docflow_core::{DetectedField, Error, FieldCoordinates, FieldRepository, FieldType, Result};

/// PostgreSQL implementation of FieldRepository.
pub struct PgFieldRepository {
    pool: Pool<Postgres>,
}

impl PgFieldRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Result<DetectedField> {
        let coordinates: Option<serde_json::Value> = row.get("coordinates");
        let coordinates = coordinates
            .map(serde_json::from_value::<FieldCoordinates>)
            .transpose()?;

        Ok(DetectedField {
            id: row.get("id"),
            document_id: row.get("document_id"),
            name: row.get("name"),
            label: row.get("label"),
            field_type: FieldType::parse(row.get("field_type")),
            value: row.get("value"),
            confidence: row.get("confidence"),
            coordinates,
            source_strategy: row.get("source_strategy"),
            metadata: row.get("metadata"),
        })
    }
}

#[async_trait]
impl FieldRepository for PgFieldRepository {
    async fn replace_for_document(
        &self,
        document_id: Uuid,
        fields: Vec<DetectedField>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM detected_field WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        for field in &fields {
            let coordinates = field
                .coordinates
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?;

            sqlx::query(
                "INSERT INTO detected_field
                     (id, document_id, name, label, field_type, value, confidence,
                      coordinates, source_strategy, metadata)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(field.id)
            .bind(document_id)
            .bind(&field.name)
            .bind(&field.label)
            .bind(field.field_type.as_str())
            .bind(&field.value)
            .bind(field.confidence)
            .bind(coordinates)
            .bind(&field.source_strategy)
            .bind(&field.metadata)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<DetectedField>> {
        let rows = sqlx::query(
            "SELECT id, document_id, name, label, field_type, value, confidence,
                    coordinates, source_strategy, metadata
             FROM detected_field WHERE document_id = $1 ORDER BY id ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_row).collect()
    }

    async fn update_value(&self, field_id: Uuid, value: Option<String>) -> Result<()> {
        let result = sqlx::query("UPDATE detected_field SET value = $1 WHERE id = $2")
            .bind(value)
            .bind(field_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("field {}", field_id)));
        }
        Ok(())
    }
}
