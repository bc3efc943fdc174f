//! Webhook registration and delivery-history repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use docflow_core::defaults;
use docflow_core::{
    new_v7, CreateWebhookRequest, Error, Result, Webhook, WebhookDelivery, WebhookRepository,
};

/// PostgreSQL implementation of WebhookRepository.
pub struct PgWebhookRepository {
    pool: Pool<Postgres>,
}

impl PgWebhookRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &sqlx::postgres::PgRow) -> Webhook {
        Webhook {
            id: row.get("id"),
            url: row.get("url"),
            secret: row.get("secret"),
            events: row.get("events"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            last_triggered_at: row.get("last_triggered_at"),
            failure_count: row.get("failure_count"),
            max_retries: row.get("max_retries"),
        }
    }
}

const WEBHOOK_COLUMNS: &str = "id, url, secret, events, is_active, created_at, updated_at, \
     last_triggered_at, failure_count, max_retries";

#[async_trait]
impl WebhookRepository for PgWebhookRepository {
    async fn create(&self, request: CreateWebhookRequest) -> Result<Webhook> {
        let id = new_v7();
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "INSERT INTO webhook
                 (id, url, secret, events, is_active, created_at, updated_at,
                  failure_count, max_retries)
             VALUES ($1, $2, $3, $4, true, $5, $5, 0, $6)
             RETURNING {WEBHOOK_COLUMNS}"
        ))
        .bind(id)
        .bind(&request.url)
        .bind(&request.secret)
        .bind(&request.events)
        .bind(now)
        .bind(request.max_retries)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_row(&row))
    }

    async fn get(&self, id: Uuid) -> Result<Webhook> {
        let row = sqlx::query(&format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhook WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref()
            .map(Self::parse_row)
            .ok_or_else(|| Error::NotFound(format!("webhook {}", id)))
    }

    async fn list_active_for_event(&self, event_type: &str) -> Result<Vec<Webhook>> {
        let rows = sqlx::query(&format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhook
             WHERE is_active = true AND ($1 = ANY(events) OR events = '{{}}')"
        ))
        .bind(event_type)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_row).collect())
    }

    async fn record_delivery(&self, delivery: WebhookDelivery) -> Result<()> {
        sqlx::query(
            "INSERT INTO webhook_delivery
                 (id, webhook_id, event_type, payload, status_code, response_body,
                  delivered_at, success)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(delivery.id)
        .bind(delivery.webhook_id)
        .bind(&delivery.event_type)
        .bind(&delivery.payload)
        .bind(delivery.status_code)
        .bind(&delivery.response_body)
        .bind(delivery.delivered_at)
        .bind(delivery.success)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if delivery.success {
            sqlx::query(
                "UPDATE webhook
                 SET last_triggered_at = now(), failure_count = 0, updated_at = now()
                 WHERE id = $1",
            )
            .bind(delivery.webhook_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        } else {
            // Consecutive failures past the threshold disable the endpoint.
            sqlx::query(
                "UPDATE webhook
                 SET failure_count = failure_count + 1, updated_at = now(),
                     is_active = (failure_count + 1 < $2)
                 WHERE id = $1",
            )
            .bind(delivery.webhook_id)
            .bind(defaults::WEBHOOK_AUTO_DISABLE_THRESHOLD)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        }

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM webhook_delivery WHERE webhook_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        sqlx::query("DELETE FROM webhook WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}
