use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use atelier_core::repository::{AssignmentOutcome, AssignmentStore, OrderStore};
use atelier_core::{AssignmentStatus, Order, OrderPatch, OrderQuery, OrderStatus, StoreError, StoreResult};

use crate::database::{decode, decode_opt, encode, encode_opt};

pub struct StoreOrderRepository {
    pool: PgPool,
}

impl StoreOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ORDER_COLUMNS: &str = "id, customer_id, category, style, complexity, urgency, template_id, template_name, \
    assignment_status, shortlisted_designer_ids, assignment_expires_at, assigned_designer_id, status, price, total, \
    commission_rate, payment_status, dispute_status, dispute_resolution, created_at, updated_at";

#[derive(sqlx::FromRow)]
pub(crate) struct OrderRow {
    id: Uuid,
    customer_id: Uuid,
    category: Option<String>,
    style: Option<String>,
    complexity: Option<String>,
    urgency: Option<String>,
    template_id: Option<String>,
    template_name: Option<String>,
    assignment_status: String,
    shortlisted_designer_ids: Vec<Uuid>,
    assignment_expires_at: Option<DateTime<Utc>>,
    assigned_designer_id: Option<Uuid>,
    status: String,
    price: i64,
    total: i64,
    commission_rate: Option<String>,
    payment_status: String,
    dispute_status: Option<String>,
    dispute_resolution: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> StoreResult<Self> {
        Ok(Order {
            id: row.id,
            customer_id: row.customer_id,
            category: row.category,
            style: row.style,
            complexity: decode_opt(row.complexity.as_deref())?,
            urgency: row.urgency,
            template_id: row.template_id,
            template_name: row.template_name,
            assignment_status: decode(&row.assignment_status)?,
            shortlisted_designer_ids: row.shortlisted_designer_ids,
            assignment_expires_at: row.assignment_expires_at,
            assigned_designer_id: row.assigned_designer_id,
            status: decode(&row.status)?,
            price: row.price,
            total: row.total,
            commission_rate: decode_opt(row.commission_rate.as_deref())?,
            payment_status: decode(&row.payment_status)?,
            dispute_status: decode_opt(row.dispute_status.as_deref())?,
            dispute_resolution: row.dispute_resolution,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Row-locks the order for the rest of the transaction
pub(crate) async fn lock_order(conn: &mut PgConnection, id: Uuid) -> StoreResult<Option<Order>> {
    let sql = format!("SELECT {} FROM orders WHERE id = $1 FOR UPDATE", ORDER_COLUMNS);
    sqlx::query_as::<_, OrderRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(StoreError::backend)?
        .map(Order::try_from)
        .transpose()
}

/// Writes back every field the core is allowed to change
pub(crate) async fn write_order(conn: &mut PgConnection, order: &Order) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE orders
        SET assignment_status = $2, shortlisted_designer_ids = $3, assignment_expires_at = $4,
            assigned_designer_id = $5, status = $6, payment_status = $7, dispute_status = $8,
            dispute_resolution = $9, updated_at = $10
        WHERE id = $1
        "#,
    )
    .bind(order.id)
    .bind(encode(&order.assignment_status)?)
    .bind(&order.shortlisted_designer_ids)
    .bind(order.assignment_expires_at)
    .bind(order.assigned_designer_id)
    .bind(encode(&order.status)?)
    .bind(encode(&order.payment_status)?)
    .bind(encode_opt(order.dispute_status.as_ref())?)
    .bind(&order.dispute_resolution)
    .bind(order.updated_at)
    .execute(conn)
    .await
    .map_err(StoreError::backend)?;
    Ok(())
}

#[async_trait]
impl OrderStore for StoreOrderRepository {
    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?
            .map(Order::try_from)
            .transpose()
    }

    async fn find_orders(&self, query: &OrderQuery) -> StoreResult<Vec<Order>> {
        let sql_for = |column: &str| {
            format!("SELECT {} FROM orders WHERE {} = $1 ORDER BY created_at DESC", ORDER_COLUMNS, column)
        };

        let rows = match query {
            OrderQuery::Customer(id) => {
                sqlx::query_as::<_, OrderRow>(&sql_for("customer_id")).bind(*id).fetch_all(&self.pool).await
            }
            OrderQuery::AssignedDesigner(id) => {
                sqlx::query_as::<_, OrderRow>(&sql_for("assigned_designer_id")).bind(*id).fetch_all(&self.pool).await
            }
            OrderQuery::Status(status) => {
                sqlx::query_as::<_, OrderRow>(&sql_for("status")).bind(encode(status)?).fetch_all(&self.pool).await
            }
            OrderQuery::AssignmentStatus(status) => {
                sqlx::query_as::<_, OrderRow>(&sql_for("assignment_status")).bind(encode(status)?).fetch_all(&self.pool).await
            }
        }
        .map_err(StoreError::backend)?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, category, style, complexity, urgency, template_id, template_name,
                assignment_status, shortlisted_designer_ids, assignment_expires_at, assigned_designer_id, status,
                price, total, commission_rate, payment_status, dispute_status, dispute_resolution, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            "#,
        )
        .bind(order.id)
        .bind(order.customer_id)
        .bind(&order.category)
        .bind(&order.style)
        .bind(encode_opt(order.complexity.as_ref())?)
        .bind(&order.urgency)
        .bind(&order.template_id)
        .bind(&order.template_name)
        .bind(encode(&order.assignment_status)?)
        .bind(&order.shortlisted_designer_ids)
        .bind(order.assignment_expires_at)
        .bind(order.assigned_designer_id)
        .bind(encode(&order.status)?)
        .bind(order.price)
        .bind(order.total)
        .bind(encode_opt(order.commission_rate.as_ref())?)
        .bind(encode(&order.payment_status)?)
        .bind(encode_opt(order.dispute_status.as_ref())?)
        .bind(&order.dispute_resolution)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn update_order(&self, id: Uuid, patch: &OrderPatch) -> StoreResult<Option<Order>> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;
        let Some(mut order) = lock_order(&mut tx, id).await? else {
            return Ok(None);
        };
        patch.apply(&mut order);
        write_order(&mut tx, &order).await?;
        tx.commit().await.map_err(StoreError::backend)?;
        Ok(Some(order))
    }

    async fn update_order_if(&self, id: Uuid, expected: AssignmentStatus, patch: &OrderPatch) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;
        let Some(mut order) = lock_order(&mut tx, id).await? else {
            return Ok(false);
        };
        if order.assignment_status != expected {
            tracing::debug!(order_id = %id, actual = ?order.assignment_status, ?expected, "Guarded order update rejected");
            return Ok(false);
        }
        patch.apply(&mut order);
        write_order(&mut tx, &order).await?;
        tx.commit().await.map_err(StoreError::backend)?;
        Ok(true)
    }

    async fn delete_order(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct CapacityRow {
    current_load: i32,
    max_capacity: i32,
}

#[async_trait]
impl AssignmentStore for StoreOrderRepository {
    async fn commit_assignment(&self, order_id: Uuid, designer_id: Uuid, at: DateTime<Utc>) -> StoreResult<AssignmentOutcome> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        // Lock order first, then designer, matching commit_completion
        let Some(mut order) = lock_order(&mut tx, order_id).await? else {
            return Ok(AssignmentOutcome::OrderMissing);
        };
        if !order.is_shortlisted_for(designer_id) {
            return Ok(AssignmentOutcome::OrderChanged(order.assignment_status));
        }
        if order.assignment_expires_at.is_some_and(|expires| expires <= at) {
            return Ok(AssignmentOutcome::Expired);
        }

        let capacity = sqlx::query_as::<_, CapacityRow>(
            "SELECT current_load, max_capacity FROM designer_profiles WHERE user_id = $1 FOR UPDATE",
        )
        .bind(designer_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        let Some(capacity) = capacity else {
            return Ok(AssignmentOutcome::DesignerMissing);
        };
        if capacity.current_load >= capacity.max_capacity {
            return Ok(AssignmentOutcome::AtCapacity { max_capacity: capacity.max_capacity });
        }

        let reserved = sqlx::query(
            r#"
            UPDATE designer_profiles
            SET current_load = current_load + 1, updated_at = $2
            WHERE user_id = $1 AND current_load < max_capacity
            "#,
        )
        .bind(designer_id)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::backend)?;
        if reserved.rows_affected() != 1 {
            return Ok(AssignmentOutcome::AtCapacity { max_capacity: capacity.max_capacity });
        }

        order.assigned_designer_id = Some(designer_id);
        order.assignment_status = AssignmentStatus::Assigned;
        order.shortlisted_designer_ids.clear();
        order.assignment_expires_at = None;
        order.status = OrderStatus::Reviewing;
        order.updated_at = at;
        write_order(&mut tx, &order).await?;

        tx.commit().await.map_err(StoreError::backend)?;
        Ok(AssignmentOutcome::Committed(order))
    }

    async fn withdraw_from_shortlist(&self, order_id: Uuid, designer_id: Uuid) -> StoreResult<Option<Order>> {
        let sql = format!(
            r#"
            UPDATE orders
            SET shortlisted_designer_ids = array_remove(shortlisted_designer_ids, $2), updated_at = NOW()
            WHERE id = $1 AND assignment_status = $3 AND $2 = ANY(shortlisted_designer_ids)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_id)
            .bind(designer_id)
            .bind(encode(&AssignmentStatus::Shortlisted)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?
            .map(Order::try_from)
            .transpose()
    }

    async fn commit_completion(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;
        let Some(mut order) = lock_order(&mut tx, order_id).await? else {
            return Ok(None);
        };
        if order.assignment_status != AssignmentStatus::Assigned {
            return Ok(None);
        }

        let now = Utc::now();
        if let Some(designer_id) = order.assigned_designer_id {
            sqlx::query(
                "UPDATE designer_profiles SET current_load = GREATEST(current_load - 1, 0), updated_at = $2 WHERE user_id = $1",
            )
            .bind(designer_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;
        }

        order.assignment_status = AssignmentStatus::Completed;
        order.updated_at = now;
        write_order(&mut tx, &order).await?;
        tx.commit().await.map_err(StoreError::backend)?;
        Ok(Some(order))
    }
}
