use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use atelier_core::repository::{CommissionPaymentStore, SettingsStore};
use atelier_core::{CommissionPayment, CommissionPaymentStatus, StoreError, StoreResult};

use crate::database::{decode, encode};

const DELIVERY_FEE_KEY: &str = "delivery_fee";

/// Commission payments and the platform settings the ledger reads
pub struct StoreLedgerRepository {
    pool: PgPool,
}

impl StoreLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    designer_id: Uuid,
    amount: i64,
    status: String,
    proof_url: String,
    submitted_at: DateTime<Utc>,
    reviewed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for CommissionPayment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> StoreResult<Self> {
        Ok(CommissionPayment {
            id: row.id,
            designer_id: row.designer_id,
            amount: row.amount,
            status: decode(&row.status)?,
            proof_url: row.proof_url,
            submitted_at: row.submitted_at,
            reviewed_at: row.reviewed_at,
        })
    }
}

#[async_trait]
impl CommissionPaymentStore for StoreLedgerRepository {
    async fn insert_payment(&self, payment: &CommissionPayment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO commission_payments (id, designer_id, amount, status, proof_url, submitted_at, reviewed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(payment.id)
        .bind(payment.designer_id)
        .bind(payment.amount)
        .bind(encode(&payment.status)?)
        .bind(&payment.proof_url)
        .bind(payment.submitted_at)
        .bind(payment.reviewed_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<CommissionPayment>> {
        sqlx::query_as::<_, PaymentRow>(
            "SELECT id, designer_id, amount, status, proof_url, submitted_at, reviewed_at FROM commission_payments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?
        .map(CommissionPayment::try_from)
        .transpose()
    }

    async fn list_payments(&self, designer_id: Uuid) -> StoreResult<Vec<CommissionPayment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, designer_id, amount, status, proof_url, submitted_at, reviewed_at
            FROM commission_payments WHERE designer_id = $1 ORDER BY submitted_at
            "#,
        )
        .bind(designer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        rows.into_iter().map(CommissionPayment::try_from).collect()
    }

    async fn transition_payment(
        &self,
        id: Uuid,
        from: CommissionPaymentStatus,
        to: CommissionPaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<CommissionPayment>> {
        // The status guard in WHERE makes a double approval match zero rows
        sqlx::query_as::<_, PaymentRow>(
            r#"
            UPDATE commission_payments SET status = $3, reviewed_at = $4
            WHERE id = $1 AND status = $2
            RETURNING id, designer_id, amount, status, proof_url, submitted_at, reviewed_at
            "#,
        )
        .bind(id)
        .bind(encode(&from)?)
        .bind(encode(&to)?)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?
        .map(CommissionPayment::try_from)
        .transpose()
    }
}

#[async_trait]
impl SettingsStore for StoreLedgerRepository {
    async fn delivery_fee(&self) -> StoreResult<Option<i64>> {
        let value: Option<Value> = sqlx::query_scalar("SELECT setting_value FROM platform_settings WHERE setting_key = $1")
            .bind(DELIVERY_FEE_KEY)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        // Expected format: {"value": <number>}
        Ok(value.and_then(|v| v.get("value").and_then(Value::as_i64)))
    }

    async fn set_delivery_fee(&self, fee: i64) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO platform_settings (setting_key, setting_value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (setting_key) DO UPDATE SET setting_value = EXCLUDED.setting_value, updated_at = NOW()
            "#,
        )
        .bind(DELIVERY_FEE_KEY)
        .bind(serde_json::json!({ "value": fee }))
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }
}
