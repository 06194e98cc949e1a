//! In-memory implementation of every storage collaborator.
//!
//! A single lock covers all tables, so each guarded method below is the
//! equivalent of a short serializable transaction. Used by tests and by the
//! API binary when no database is configured.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use atelier_core::email::{EmailQueue, EmailStatus, QueuedEmail};
use atelier_core::notification::{Notification, NotificationError, NotificationGateway, NotificationKind};
use atelier_core::repository::{
    AssignmentOutcome, AssignmentStore, CommissionPaymentStore, DesignerDirectory, DisputeStore,
    DisputeWrite, OrderStore, SettingsStore,
};
use atelier_core::{
    AssignmentStatus, CommissionPayment, CommissionPaymentStatus, DesignerPatch, DesignerProfile,
    DesignerStatus, Dispute, DisputeEvidence, Order, OrderPatch, OrderQuery, OrderStatus, StoreError,
    StoreResult,
};

#[derive(Default)]
struct Inner {
    orders: HashMap<Uuid, Order>,
    designers: HashMap<Uuid, DesignerProfile>,
    payments: HashMap<Uuid, CommissionPayment>,
    disputes: HashMap<Uuid, Dispute>,
    evidence: Vec<DisputeEvidence>,
    delivery_fee: Option<i64>,
    emails: HashMap<Uuid, QueuedEmail>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::backend("in-memory store lock poisoned"))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::backend("in-memory store lock poisoned"))
    }

    /// Every queued email, for inspection in tests
    pub fn emails(&self) -> StoreResult<Vec<QueuedEmail>> {
        Ok(self.read()?.emails.values().cloned().collect())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.read()?.orders.get(&id).cloned())
    }

    async fn find_orders(&self, query: &OrderQuery) -> StoreResult<Vec<Order>> {
        let inner = self.read()?;
        let mut orders: Vec<Order> = inner.orders.values().filter(|o| query.matches(o)).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let mut inner = self.write()?;
        if inner.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict(format!("order {} already exists", order.id)));
        }
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_order(&self, id: Uuid, patch: &OrderPatch) -> StoreResult<Option<Order>> {
        let mut inner = self.write()?;
        Ok(inner.orders.get_mut(&id).map(|order| {
            patch.apply(order);
            order.clone()
        }))
    }

    async fn update_order_if(&self, id: Uuid, expected: AssignmentStatus, patch: &OrderPatch) -> StoreResult<bool> {
        let mut inner = self.write()?;
        match inner.orders.get_mut(&id) {
            Some(order) if order.assignment_status == expected => {
                patch.apply(order);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_order(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.write()?.orders.remove(&id).is_some())
    }
}

#[async_trait]
impl DesignerDirectory for MemoryStore {
    async fn get_designer(&self, user_id: Uuid) -> StoreResult<Option<DesignerProfile>> {
        Ok(self.read()?.designers.get(&user_id).cloned())
    }

    async fn list_by_status(&self, status: DesignerStatus) -> StoreResult<Vec<DesignerProfile>> {
        let inner = self.read()?;
        Ok(inner.designers.values().filter(|d| d.status == status).cloned().collect())
    }

    async fn insert_designer(&self, profile: &DesignerProfile) -> StoreResult<()> {
        let mut inner = self.write()?;
        if inner.designers.contains_key(&profile.user_id) {
            return Err(StoreError::Conflict(format!("designer {} already exists", profile.user_id)));
        }
        inner.designers.insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn update_designer(&self, user_id: Uuid, patch: &DesignerPatch) -> StoreResult<Option<DesignerProfile>> {
        let mut inner = self.write()?;
        let Some(profile) = inner.designers.get_mut(&user_id) else {
            return Ok(None);
        };
        if let Some(max) = patch.max_capacity {
            if max < profile.current_load {
                return Err(StoreError::Conflict(format!(
                    "max capacity {} is below current load {}",
                    max, profile.current_load
                )));
            }
        }
        patch.apply(profile);
        Ok(Some(profile.clone()))
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn commit_assignment(&self, order_id: Uuid, designer_id: Uuid, at: DateTime<Utc>) -> StoreResult<AssignmentOutcome> {
        let mut guard = self.write()?;
        let inner = &mut *guard;

        let Some(order) = inner.orders.get_mut(&order_id) else {
            return Ok(AssignmentOutcome::OrderMissing);
        };
        if !order.is_shortlisted_for(designer_id) {
            return Ok(AssignmentOutcome::OrderChanged(order.assignment_status));
        }
        if order.assignment_expires_at.is_some_and(|expires| expires <= at) {
            return Ok(AssignmentOutcome::Expired);
        }

        let Some(designer) = inner.designers.get_mut(&designer_id) else {
            return Ok(AssignmentOutcome::DesignerMissing);
        };
        if !designer.has_capacity() {
            return Ok(AssignmentOutcome::AtCapacity { max_capacity: designer.max_capacity });
        }

        designer.current_load += 1;
        designer.updated_at = at;

        order.assigned_designer_id = Some(designer_id);
        order.assignment_status = AssignmentStatus::Assigned;
        order.shortlisted_designer_ids.clear();
        order.assignment_expires_at = None;
        order.status = OrderStatus::Reviewing;
        order.updated_at = at;

        Ok(AssignmentOutcome::Committed(order.clone()))
    }

    async fn withdraw_from_shortlist(&self, order_id: Uuid, designer_id: Uuid) -> StoreResult<Option<Order>> {
        let mut inner = self.write()?;
        match inner.orders.get_mut(&order_id) {
            Some(order) if order.is_shortlisted_for(designer_id) => {
                order.shortlisted_designer_ids.retain(|id| *id != designer_id);
                order.updated_at = Utc::now();
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn commit_completion(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
        let mut guard = self.write()?;
        let inner = &mut *guard;

        let Some(order) = inner.orders.get_mut(&order_id) else {
            return Ok(None);
        };
        if order.assignment_status != AssignmentStatus::Assigned {
            return Ok(None);
        }
        let now = Utc::now();
        order.assignment_status = AssignmentStatus::Completed;
        order.updated_at = now;
        let completed = order.clone();

        if let Some(designer_id) = completed.assigned_designer_id {
            if let Some(designer) = inner.designers.get_mut(&designer_id) {
                designer.current_load = (designer.current_load - 1).max(0);
                designer.updated_at = now;
            }
        }
        Ok(Some(completed))
    }
}

#[async_trait]
impl CommissionPaymentStore for MemoryStore {
    async fn insert_payment(&self, payment: &CommissionPayment) -> StoreResult<()> {
        self.write()?.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<CommissionPayment>> {
        Ok(self.read()?.payments.get(&id).cloned())
    }

    async fn list_payments(&self, designer_id: Uuid) -> StoreResult<Vec<CommissionPayment>> {
        let inner = self.read()?;
        let mut payments: Vec<CommissionPayment> = inner
            .payments
            .values()
            .filter(|p| p.designer_id == designer_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        Ok(payments)
    }

    async fn transition_payment(
        &self,
        id: Uuid,
        from: CommissionPaymentStatus,
        to: CommissionPaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<CommissionPayment>> {
        let mut inner = self.write()?;
        match inner.payments.get_mut(&id) {
            Some(payment) if payment.status == from => {
                payment.status = to;
                payment.reviewed_at = Some(at);
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl DisputeStore for MemoryStore {
    async fn get_dispute(&self, id: Uuid) -> StoreResult<Option<Dispute>> {
        Ok(self.read()?.disputes.get(&id).cloned())
    }

    async fn find_active_dispute(&self, order_id: Uuid) -> StoreResult<Option<Dispute>> {
        let inner = self.read()?;
        Ok(inner
            .disputes
            .values()
            .find(|d| d.order_id == order_id && d.status.blocks_new_dispute())
            .cloned())
    }

    async fn list_evidence(&self, dispute_id: Uuid) -> StoreResult<Vec<DisputeEvidence>> {
        let inner = self.read()?;
        Ok(inner.evidence.iter().filter(|e| e.dispute_id == dispute_id).cloned().collect())
    }

    async fn write_dispute(&self, write: &DisputeWrite) -> StoreResult<bool> {
        let mut inner = self.write()?;
        let dispute = &write.dispute;

        let guard_holds = match write.expected_status {
            None => !inner
                .disputes
                .values()
                .any(|d| d.order_id == dispute.order_id && d.status.blocks_new_dispute()),
            Some(expected) => inner
                .disputes
                .get(&dispute.id)
                .is_some_and(|d| d.status == expected && d.notes.len() + 1 == dispute.notes.len()),
        };
        if !guard_holds {
            return Ok(false);
        }

        let projection = dispute.projection();
        let Some(order) = inner.orders.get_mut(&projection.order_id) else {
            return Err(StoreError::Conflict(format!("order {} vanished", projection.order_id)));
        };
        order.dispute_status = Some(projection.dispute_status);
        order.dispute_resolution = projection.dispute_resolution;
        order.updated_at = dispute.updated_at;

        inner.disputes.insert(dispute.id, dispute.clone());
        inner.evidence.extend(write.evidence.iter().cloned());
        Ok(true)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn delivery_fee(&self) -> StoreResult<Option<i64>> {
        Ok(self.read()?.delivery_fee)
    }

    async fn set_delivery_fee(&self, fee: i64) -> StoreResult<()> {
        self.write()?.delivery_fee = Some(fee);
        Ok(())
    }
}

#[async_trait]
impl EmailQueue for MemoryStore {
    async fn enqueue(&self, email: &QueuedEmail) -> StoreResult<()> {
        self.write()?.emails.insert(email.id, email.clone());
        Ok(())
    }

    async fn claim_due(&self, now: DateTime<Utc>, lease: Duration, limit: usize) -> StoreResult<Vec<QueuedEmail>> {
        let mut inner = self.write()?;
        let mut due: Vec<&mut QueuedEmail> = inner
            .emails
            .values_mut()
            .filter(|e| e.status == EmailStatus::Queued && e.next_attempt_at <= now)
            .collect();
        due.sort_by(|a, b| a.next_attempt_at.cmp(&b.next_attempt_at));

        Ok(due
            .into_iter()
            .take(limit)
            .map(|email| {
                email.next_attempt_at = now + lease;
                email.clone()
            })
            .collect())
    }

    async fn mark_sent(&self, id: Uuid) -> StoreResult<()> {
        if let Some(email) = self.write()?.emails.get_mut(&id) {
            email.status = EmailStatus::Sent;
            email.attempts += 1;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str, retry_at: Option<DateTime<Utc>>) -> StoreResult<()> {
        if let Some(email) = self.write()?.emails.get_mut(&id) {
            email.attempts += 1;
            email.last_error = Some(error.to_string());
            match retry_at {
                Some(at) => email.next_attempt_at = at,
                None => email.status = EmailStatus::Dead,
            }
        }
        Ok(())
    }
}

/// Notification gateway that records what it was asked to send
#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway whose every send fails
    pub fn failing() -> Self {
        Self { sent: Mutex::new(Vec::new()), fail: true }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, user_id: Uuid) -> Vec<Notification> {
        self.sent().into_iter().filter(|n| n.user_id == user_id).collect()
    }
}

#[async_trait]
impl NotificationGateway for MemoryNotifier {
    async fn send(&self, user_id: Uuid, kind: NotificationKind, message: &str) -> Result<(), NotificationError> {
        if self.fail {
            return Err(NotificationError { user_id, reason: "gateway unavailable".into() });
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(Notification::new(user_id, kind, message));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::SkillLevel;

    fn shortlisted_order(designers: &[Uuid]) -> Order {
        let mut order = Order::new(Uuid::new_v4());
        order.assignment_status = AssignmentStatus::Shortlisted;
        order.shortlisted_designer_ids = designers.to_vec();
        order.assignment_expires_at = Some(Utc::now() + Duration::hours(24));
        order
    }

    #[tokio::test]
    async fn test_guarded_update_respects_expected_status() {
        let store = MemoryStore::new();
        let order = Order::new(Uuid::new_v4());
        store.insert_order(&order).await.unwrap();

        let patch = OrderPatch { assignment_status: Some(AssignmentStatus::Shortlisted), ..Default::default() };
        assert!(!store.update_order_if(order.id, AssignmentStatus::Assigned, &patch).await.unwrap());
        assert!(store.update_order_if(order.id, AssignmentStatus::Unassigned, &patch).await.unwrap());
        assert!(!store.update_order_if(order.id, AssignmentStatus::Unassigned, &patch).await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_assignment_reports_capacity() {
        let store = MemoryStore::new();
        let mut designer = DesignerProfile::new(Uuid::new_v4(), vec!["dress".into()], SkillLevel::Basic, 1);
        designer.current_load = 1;
        store.insert_designer(&designer).await.unwrap();
        let order = shortlisted_order(&[designer.user_id]);
        store.insert_order(&order).await.unwrap();

        let outcome = store.commit_assignment(order.id, designer.user_id, Utc::now()).await.unwrap();
        assert!(matches!(outcome, AssignmentOutcome::AtCapacity { max_capacity: 1 }));

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.assignment_status, AssignmentStatus::Shortlisted);
    }

    #[tokio::test]
    async fn test_completion_releases_load() {
        let store = MemoryStore::new();
        let designer = DesignerProfile::new(Uuid::new_v4(), vec![], SkillLevel::Premium, 2);
        store.insert_designer(&designer).await.unwrap();
        let order = shortlisted_order(&[designer.user_id]);
        store.insert_order(&order).await.unwrap();

        store.commit_assignment(order.id, designer.user_id, Utc::now()).await.unwrap();
        assert_eq!(store.get_designer(designer.user_id).await.unwrap().unwrap().current_load, 1);

        let completed = store.commit_completion(order.id).await.unwrap().unwrap();
        assert_eq!(completed.assignment_status, AssignmentStatus::Completed);
        assert_eq!(store.get_designer(designer.user_id).await.unwrap().unwrap().current_load, 0);
        assert!(store.commit_completion(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_capacity_cannot_drop_below_load() {
        let store = MemoryStore::new();
        let mut designer = DesignerProfile::new(Uuid::new_v4(), vec![], SkillLevel::Basic, 3);
        designer.current_load = 2;
        store.insert_designer(&designer).await.unwrap();

        let patch = DesignerPatch { max_capacity: Some(1), ..Default::default() };
        let result = store.update_designer(designer.user_id, &patch).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_claimed_emails_are_leased() {
        let store = MemoryStore::new();
        let email = QueuedEmail::new(Uuid::new_v4(), NotificationKind::OrderAssigned, "hi".into());
        store.enqueue(&email).await.unwrap();

        let now = Utc::now();
        assert_eq!(store.claim_due(now, Duration::minutes(5), 10).await.unwrap().len(), 1);
        assert!(store.claim_due(now, Duration::minutes(5), 10).await.unwrap().is_empty());
    }
}
