use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::commission::{CommissionPayment, CommissionPaymentStatus};
use crate::dispute::{Dispute, DisputeEvidence, DisputeStatus};
use crate::models::{
    AssignmentStatus, DesignerPatch, DesignerProfile, DesignerStatus, Order, OrderPatch, OrderQuery,
};
use crate::StoreResult;

/// Storage access for orders
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>>;

    async fn find_orders(&self, query: &OrderQuery) -> StoreResult<Vec<Order>>;

    async fn insert_order(&self, order: &Order) -> StoreResult<()>;

    /// Shallow merge; returns the updated order, `None` when it does not exist
    async fn update_order(&self, id: Uuid, patch: &OrderPatch) -> StoreResult<Option<Order>>;

    /// Apply `patch` only while the stored assignment status still equals `expected`.
    /// Returns `false` when the guard did not hold (or the order is gone).
    async fn update_order_if(
        &self,
        id: Uuid,
        expected: AssignmentStatus,
        patch: &OrderPatch,
    ) -> StoreResult<bool>;

    async fn delete_order(&self, id: Uuid) -> StoreResult<bool>;
}

/// Storage access for designer profiles
#[async_trait]
pub trait DesignerDirectory: Send + Sync {
    async fn get_designer(&self, user_id: Uuid) -> StoreResult<Option<DesignerProfile>>;

    async fn list_by_status(&self, status: DesignerStatus) -> StoreResult<Vec<DesignerProfile>>;

    async fn insert_designer(&self, profile: &DesignerProfile) -> StoreResult<()>;

    /// Rejects with `StoreError::Conflict` when the patch would drop
    /// `max_capacity` below the current load.
    async fn update_designer(
        &self,
        user_id: Uuid,
        patch: &DesignerPatch,
    ) -> StoreResult<Option<DesignerProfile>>;
}

/// Why a guarded assignment commit did or did not happen
#[derive(Debug, Clone)]
pub enum AssignmentOutcome {
    Committed(Order),
    OrderMissing,
    DesignerMissing,
    /// Order is no longer shortlisted, or the designer is not on its shortlist
    OrderChanged(AssignmentStatus),
    Expired,
    AtCapacity { max_capacity: i32 },
}

/// Multi-record commits that must land atomically across orders and designers
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// In one atomic step: check the order is shortlisted for `designer_id` and
    /// unexpired at `at`, check the designer has headroom, then assign the
    /// order, clear its shortlist and expiry, move it into review and add one
    /// to the designer's load.
    async fn commit_assignment(
        &self,
        order_id: Uuid,
        designer_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<AssignmentOutcome>;

    /// Remove one designer from a shortlisted order's list. `None` when the
    /// order is not shortlisted or the designer is not on the list.
    async fn withdraw_from_shortlist(&self, order_id: Uuid, designer_id: Uuid) -> StoreResult<Option<Order>>;

    /// Move an assigned order to completed and release one unit of its
    /// designer's load. `None` when the order was not assigned.
    async fn commit_completion(&self, order_id: Uuid) -> StoreResult<Option<Order>>;
}

#[async_trait]
pub trait CommissionPaymentStore: Send + Sync {
    async fn insert_payment(&self, payment: &CommissionPayment) -> StoreResult<()>;

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<CommissionPayment>>;

    async fn list_payments(&self, designer_id: Uuid) -> StoreResult<Vec<CommissionPayment>>;

    /// Guarded status change; `None` when the payment is not currently in `from`
    async fn transition_payment(
        &self,
        id: Uuid,
        from: CommissionPaymentStatus,
        to: CommissionPaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<CommissionPayment>>;
}

/// A dispute write together with the evidence that arrived with it
#[derive(Debug, Clone)]
pub struct DisputeWrite {
    pub dispute: Dispute,
    /// `None` for a new dispute: guarded on the order having no active dispute.
    /// `Some(status)`: guarded on the stored dispute still being in `status`
    /// and holding exactly one note fewer than `dispute`.
    pub expected_status: Option<DisputeStatus>,
    pub evidence: Vec<DisputeEvidence>,
}

#[async_trait]
pub trait DisputeStore: Send + Sync {
    async fn get_dispute(&self, id: Uuid) -> StoreResult<Option<Dispute>>;

    /// The order's dispute that is not closed, if any
    async fn find_active_dispute(&self, order_id: Uuid) -> StoreResult<Option<Dispute>>;

    async fn list_evidence(&self, dispute_id: Uuid) -> StoreResult<Vec<DisputeEvidence>>;

    /// Persist the dispute, its evidence and the order's dispute projection
    /// (`Dispute::projection`) in one step. Returns `false` when the guard failed.
    async fn write_dispute(&self, write: &DisputeWrite) -> StoreResult<bool>;
}

/// Admin-mutable platform settings
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn delivery_fee(&self) -> StoreResult<Option<i64>>;

    async fn set_delivery_fee(&self, fee: i64) -> StoreResult<()>;
}
