use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use atelier_core::email::{EmailQueue, EmailStatus, QueuedEmail};
use atelier_core::{StoreError, StoreResult};

use crate::database::{decode, encode};

pub struct StoreEmailQueue {
    pool: PgPool,
}

impl StoreEmailQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EmailRow {
    id: Uuid,
    recipient_id: Uuid,
    kind: String,
    body: String,
    status: String,
    attempts: i32,
    next_attempt_at: DateTime<Utc>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EmailRow> for QueuedEmail {
    type Error = StoreError;

    fn try_from(row: EmailRow) -> StoreResult<Self> {
        Ok(QueuedEmail {
            id: row.id,
            recipient_id: row.recipient_id,
            kind: decode(&row.kind)?,
            body: row.body,
            status: decode(&row.status)?,
            attempts: row.attempts.max(0) as u32,
            next_attempt_at: row.next_attempt_at,
            last_error: row.last_error,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl EmailQueue for StoreEmailQueue {
    async fn enqueue(&self, email: &QueuedEmail) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO email_queue (id, recipient_id, kind, body, status, attempts, next_attempt_at, last_error, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(email.id)
        .bind(email.recipient_id)
        .bind(encode(&email.kind)?)
        .bind(&email.body)
        .bind(encode(&email.status)?)
        .bind(email.attempts as i32)
        .bind(email.next_attempt_at)
        .bind(&email.last_error)
        .bind(email.created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn claim_due(&self, now: DateTime<Utc>, lease: Duration, limit: usize) -> StoreResult<Vec<QueuedEmail>> {
        // SKIP LOCKED lets several workers poll without double-claiming
        let rows = sqlx::query_as::<_, EmailRow>(
            r#"
            UPDATE email_queue SET next_attempt_at = $2
            WHERE id IN (
                SELECT id FROM email_queue
                WHERE status = $3 AND next_attempt_at <= $1
                ORDER BY next_attempt_at
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, recipient_id, kind, body, status, attempts, next_attempt_at, last_error, created_at
            "#,
        )
        .bind(now)
        .bind(now + lease)
        .bind(encode(&EmailStatus::Queued)?)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        rows.into_iter().map(QueuedEmail::try_from).collect()
    }

    async fn mark_sent(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE email_queue SET status = $2, attempts = attempts + 1 WHERE id = $1")
            .bind(id)
            .bind(encode(&EmailStatus::Sent)?)
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str, retry_at: Option<DateTime<Utc>>) -> StoreResult<()> {
        let status = match retry_at {
            Some(_) => EmailStatus::Queued,
            None => EmailStatus::Dead,
        };
        sqlx::query(
            r#"
            UPDATE email_queue
            SET attempts = attempts + 1, last_error = $2, status = $3,
                next_attempt_at = COALESCE($4, next_attempt_at)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(encode(&status)?)
        .bind(retry_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }
}
