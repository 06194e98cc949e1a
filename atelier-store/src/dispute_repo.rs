use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use atelier_core::repository::{DisputeStore, DisputeWrite};
use atelier_core::{Dispute, DisputeEvidence, DisputeNote, DisputeStatus, StoreError, StoreResult};

use crate::database::{decode, encode};
use crate::order_repo::{lock_order, write_order};

pub struct StoreDisputeRepository {
    pool: PgPool,
}

impl StoreDisputeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DisputeRow {
    id: Uuid,
    order_id: Uuid,
    creator_id: Uuid,
    category: String,
    description: String,
    status: String,
    resolution: Option<String>,
    notes: Json<Vec<DisputeNote>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DisputeRow> for Dispute {
    type Error = StoreError;

    fn try_from(row: DisputeRow) -> StoreResult<Self> {
        Ok(Dispute {
            id: row.id,
            order_id: row.order_id,
            creator_id: row.creator_id,
            category: row.category,
            description: row.description,
            status: decode(&row.status)?,
            resolution: row.resolution,
            notes: row.notes.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EvidenceRow {
    id: Uuid,
    dispute_id: Uuid,
    uploader_id: Uuid,
    file_url: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<EvidenceRow> for DisputeEvidence {
    fn from(row: EvidenceRow) -> Self {
        DisputeEvidence {
            id: row.id,
            dispute_id: row.dispute_id,
            uploader_id: row.uploader_id,
            file_url: row.file_url,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

const DISPUTE_COLUMNS: &str = "id, order_id, creator_id, category, description, status, resolution, notes, created_at, updated_at";

#[async_trait]
impl DisputeStore for StoreDisputeRepository {
    async fn get_dispute(&self, id: Uuid) -> StoreResult<Option<Dispute>> {
        let sql = format!("SELECT {} FROM disputes WHERE id = $1", DISPUTE_COLUMNS);
        sqlx::query_as::<_, DisputeRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?
            .map(Dispute::try_from)
            .transpose()
    }

    async fn find_active_dispute(&self, order_id: Uuid) -> StoreResult<Option<Dispute>> {
        let sql = format!("SELECT {} FROM disputes WHERE order_id = $1 AND status <> $2", DISPUTE_COLUMNS);
        sqlx::query_as::<_, DisputeRow>(&sql)
            .bind(order_id)
            .bind(encode(&DisputeStatus::Closed)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?
            .map(Dispute::try_from)
            .transpose()
    }

    async fn list_evidence(&self, dispute_id: Uuid) -> StoreResult<Vec<DisputeEvidence>> {
        let rows = sqlx::query_as::<_, EvidenceRow>(
            r#"
            SELECT id, dispute_id, uploader_id, file_url, description, created_at
            FROM dispute_evidence WHERE dispute_id = $1 ORDER BY created_at
            "#,
        )
        .bind(dispute_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(rows.into_iter().map(DisputeEvidence::from).collect())
    }

    async fn write_dispute(&self, write: &DisputeWrite) -> StoreResult<bool> {
        let dispute = &write.dispute;
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        // Serializes every dispute write for the same order
        let Some(mut order) = lock_order(&mut tx, dispute.order_id).await? else {
            return Err(StoreError::Conflict(format!("order {} vanished", dispute.order_id)));
        };

        match write.expected_status {
            None => {
                let active: Option<Uuid> = sqlx::query_scalar(
                    "SELECT id FROM disputes WHERE order_id = $1 AND status <> $2",
                )
                .bind(dispute.order_id)
                .bind(encode(&DisputeStatus::Closed)?)
                .fetch_optional(&mut *tx)
                .await
                .map_err(StoreError::backend)?;
                if active.is_some() {
                    return Ok(false);
                }

                sqlx::query(
                    r#"
                    INSERT INTO disputes (id, order_id, creator_id, category, description, status, resolution, notes, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    "#,
                )
                .bind(dispute.id)
                .bind(dispute.order_id)
                .bind(dispute.creator_id)
                .bind(&dispute.category)
                .bind(&dispute.description)
                .bind(encode(&dispute.status)?)
                .bind(&dispute.resolution)
                .bind(Json(&dispute.notes))
                .bind(dispute.created_at)
                .bind(dispute.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::backend)?;
            }
            Some(expected) => {
                let updated = sqlx::query(
                    r#"
                    UPDATE disputes SET status = $3, resolution = $4, notes = $5, updated_at = $6
                    WHERE id = $1 AND status = $2 AND jsonb_array_length(notes) = $7
                    "#,
                )
                .bind(dispute.id)
                .bind(encode(&expected)?)
                .bind(encode(&dispute.status)?)
                .bind(&dispute.resolution)
                .bind(Json(&dispute.notes))
                .bind(dispute.updated_at)
                .bind(dispute.notes.len() as i32 - 1)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::backend)?;
                if updated.rows_affected() != 1 {
                    return Ok(false);
                }
            }
        }

        for evidence in &write.evidence {
            sqlx::query(
                r#"
                INSERT INTO dispute_evidence (id, dispute_id, uploader_id, file_url, description, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(evidence.id)
            .bind(evidence.dispute_id)
            .bind(evidence.uploader_id)
            .bind(&evidence.file_url)
            .bind(&evidence.description)
            .bind(evidence.created_at)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;
        }

        let projection = dispute.projection();
        order.dispute_status = Some(projection.dispute_status);
        order.dispute_resolution = projection.dispute_resolution;
        order.updated_at = dispute.updated_at;
        write_order(&mut tx, &order).await?;

        tx.commit().await.map_err(StoreError::backend)?;
        Ok(true)
    }
}
