//! Chunk repository implementation with pgvector similarity search.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use docflow_core::{Chunk, ChunkHit, ChunkRepository, Error, Result};

/// PostgreSQL implementation of ChunkRepository.
pub struct PgChunkRepository {
    pool: Pool<Postgres>,
}

impl PgChunkRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Chunk {
        let embedding: Vector = row.get("embedding");
        Chunk {
            id: row.get("id"),
            document_id: row.get("document_id"),
            chunk_index: row.get("chunk_index"),
            text: row.get("text"),
            embedding: embedding.to_vec(),
            page_number: row.get("page_number"),
            metadata: row.get("metadata"),
        }
    }
}

#[async_trait]
impl ChunkRepository for PgChunkRepository {
    async fn replace_for_document(&self, document_id: Uuid, chunks: Vec<Chunk>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM document_chunk WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        for chunk in &chunks {
            sqlx::query(
                "INSERT INTO document_chunk
                     (id, document_id, chunk_index, text, embedding, page_number, metadata)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(chunk.id)
            .bind(document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(Vector::from(chunk.embedding.clone()))
            .bind(chunk.page_number)
            .bind(&chunk.metadata)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn list_for_document(&self, document_id: Uuid) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, text, embedding, page_number, metadata
             FROM document_chunk WHERE document_id = $1 ORDER BY chunk_index ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    async fn search(
        &self,
        document_id: Uuid,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ChunkHit>> {
        let query_vec = Vector::from(embedding.to_vec());

        // Tie-break on chunk_index so equal-similarity results are stable.
        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, text, embedding, page_number, metadata,
                    1.0 - (embedding <=> $1::vector) AS similarity
             FROM document_chunk
             WHERE document_id = $2
             ORDER BY embedding <=> $1::vector ASC, chunk_index ASC
             LIMIT $3",
        )
        .bind(&query_vec)
        .bind(document_id)
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let similarity: f64 = row.get("similarity");
                ChunkHit {
                    similarity: similarity as f32,
                    chunk: Self::parse_row(row),
                }
            })
            .collect())
    }
}
