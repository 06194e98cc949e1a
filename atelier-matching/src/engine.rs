use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use atelier_core::notification::{dispatch_all, Notification, NotificationGateway, NotificationKind};
use atelier_core::repository::{AssignmentOutcome, AssignmentStore, DesignerDirectory, OrderStore};
use atelier_core::{
    AssignmentStatus, CoreError, CoreResult, DesignerProfile, DesignerStatus, Order, OrderPatch,
};

use crate::eligibility::EligibilityFilter;

#[derive(Debug, Clone)]
pub struct MatchingConfig {
    pub shortlist_size: usize,
    pub shortlist_ttl: Duration,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            shortlist_size: 3,
            shortlist_ttl: Duration::hours(24),
        }
    }
}

/// `{success, message}` view of an assignment attempt for request handlers
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentResult {
    pub success: bool,
    pub message: String,
}

impl AssignmentResult {
    pub fn from_outcome(outcome: &CoreResult<Order>) -> Self {
        match outcome {
            Ok(order) => Self {
                success: true,
                message: format!("Order {} assigned", order.id),
            },
            Err(e) => Self {
                success: false,
                message: e.to_string(),
            },
        }
    }
}

/// Matches orders to designers and runs the shortlist-then-accept flow.
///
/// Holds no state between calls: every decision re-reads the stores.
pub struct MatchingEngine {
    orders: Arc<dyn OrderStore>,
    designers: Arc<dyn DesignerDirectory>,
    assignments: Arc<dyn AssignmentStore>,
    notifier: Arc<dyn NotificationGateway>,
    config: MatchingConfig,
}

impl MatchingEngine {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        designers: Arc<dyn DesignerDirectory>,
        assignments: Arc<dyn AssignmentStore>,
        notifier: Arc<dyn NotificationGateway>,
        config: MatchingConfig,
    ) -> Self {
        Self { orders, designers, assignments, notifier, config }
    }

    /// Designers who could take `order`, best match first
    pub async fn find_eligible_designers(&self, order: &Order) -> CoreResult<Vec<DesignerProfile>> {
        let candidates = self.designers.list_by_status(DesignerStatus::Available).await?;
        Ok(EligibilityFilter::new(order).apply(candidates))
    }

    pub async fn eligible_designers_for(&self, order_id: Uuid) -> CoreResult<Vec<DesignerProfile>> {
        let order = self.load_order(order_id).await?;
        self.find_eligible_designers(&order).await
    }

    /// Offer the order to the top eligible designers.
    ///
    /// Returns `false` without touching the order when it is already assigned
    /// or completed, when nobody is eligible, when the configured shortlist
    /// is empty or never open, or when a concurrent change beat this call to
    /// the order.
    #[tracing::instrument(skip(self))]
    pub async fn shortlist_designers(&self, order_id: Uuid) -> CoreResult<bool> {
        let order = self.load_order(order_id).await?;
        if self.config.shortlist_size == 0 || self.config.shortlist_ttl <= Duration::zero() {
            debug!(config = ?self.config, "Shortlisting disabled by configuration");
            return Ok(false);
        }
        if matches!(order.assignment_status, AssignmentStatus::Assigned | AssignmentStatus::Completed) {
            debug!(status = ?order.assignment_status, "Order already placed, not shortlisting");
            return Ok(false);
        }

        let eligible = self.find_eligible_designers(&order).await?;
        if eligible.is_empty() {
            info!("No eligible designers for order");
            return Ok(false);
        }

        let shortlist: Vec<Uuid> = eligible
            .iter()
            .take(self.config.shortlist_size)
            .map(|d| d.user_id)
            .collect();
        let expires_at = Utc::now() + self.config.shortlist_ttl;
        let patch = OrderPatch {
            assignment_status: Some(AssignmentStatus::Shortlisted),
            shortlisted_designer_ids: Some(shortlist.clone()),
            assignment_expires_at: Some(Some(expires_at)),
            ..Default::default()
        };

        if !self.orders.update_order_if(order_id, order.assignment_status, &patch).await? {
            debug!("Order changed while shortlisting, giving up");
            return Ok(false);
        }
        info!(designers = shortlist.len(), %expires_at, "Order shortlisted");

        let offers = shortlist
            .iter()
            .map(|designer_id| {
                Notification::new(
                    *designer_id,
                    NotificationKind::ShortlistOffer,
                    format!("Order {} is available to you until {}", order_id, expires_at.to_rfc3339()),
                )
            })
            .collect();
        dispatch_all(self.notifier.as_ref(), offers).await;

        Ok(true)
    }

    /// Accept a shortlisted order on behalf of `designer_id`.
    ///
    /// The pre-checks here give callers precise rejections; the store commit
    /// repeats every check atomically, so of several designers racing for the
    /// same order exactly one wins and the rest see `InvalidState`.
    #[tracing::instrument(skip(self))]
    pub async fn assign_order(&self, order_id: Uuid, designer_id: Uuid) -> CoreResult<Order> {
        let order = self.load_order(order_id).await?;
        if matches!(order.assignment_status, AssignmentStatus::Assigned | AssignmentStatus::Completed) {
            return Err(CoreError::InvalidState(format!("order {} is already assigned", order_id)));
        }
        if order.assignment_status != AssignmentStatus::Shortlisted {
            return Err(CoreError::InvalidState(format!("order {} has no open shortlist", order_id)));
        }
        if !order.shortlisted_designer_ids.contains(&designer_id) {
            return Err(CoreError::Forbidden(format!(
                "designer {} is not shortlisted for order {}",
                designer_id, order_id
            )));
        }
        let now = Utc::now();
        if order.assignment_expires_at.is_some_and(|expires| expires <= now) {
            return Err(CoreError::InvalidState(format!("shortlist for order {} has expired", order_id)));
        }

        // Capacity at accept time, not at shortlist time
        let designer = self
            .designers
            .get_designer(designer_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("designer {}", designer_id)))?;
        if !designer.has_capacity() {
            return Err(CoreError::CapacityExceeded {
                designer_id,
                max_capacity: designer.max_capacity,
            });
        }

        let assigned = match self.assignments.commit_assignment(order_id, designer_id, now).await? {
            AssignmentOutcome::Committed(order) => order,
            AssignmentOutcome::OrderMissing => return Err(CoreError::NotFound(format!("order {}", order_id))),
            AssignmentOutcome::DesignerMissing => {
                return Err(CoreError::NotFound(format!("designer {}", designer_id)))
            }
            AssignmentOutcome::OrderChanged(status) => {
                debug!(?status, "Lost assignment race");
                return Err(CoreError::InvalidState(format!(
                    "order {} is no longer open to designer {} ({:?})",
                    order_id, designer_id, status
                )));
            }
            AssignmentOutcome::Expired => {
                return Err(CoreError::InvalidState(format!("shortlist for order {} has expired", order_id)))
            }
            AssignmentOutcome::AtCapacity { max_capacity } => {
                return Err(CoreError::CapacityExceeded { designer_id, max_capacity })
            }
        };
        info!("Order assigned");

        dispatch_all(
            self.notifier.as_ref(),
            vec![
                Notification::new(
                    assigned.customer_id,
                    NotificationKind::OrderAssigned,
                    format!("A designer has accepted order {}", order_id),
                ),
                Notification::new(
                    designer_id,
                    NotificationKind::AssignmentConfirmed,
                    format!("You are now assigned to order {}", order_id),
                ),
            ],
        )
        .await;

        Ok(assigned)
    }

    /// Take `designer_id` off the order's shortlist.
    ///
    /// An emptied shortlist stays `shortlisted`; a fresh `shortlist_designers`
    /// call is the way out.
    #[tracing::instrument(skip(self))]
    pub async fn decline_order(&self, order_id: Uuid, designer_id: Uuid) -> CoreResult<Order> {
        if let Some(order) = self.assignments.withdraw_from_shortlist(order_id, designer_id).await? {
            info!(remaining = order.shortlisted_designer_ids.len(), "Designer declined order");
            return Ok(order);
        }

        let order = self.load_order(order_id).await?;
        if order.assignment_status != AssignmentStatus::Shortlisted {
            return Err(CoreError::InvalidState(format!("order {} has no open shortlist", order_id)));
        }
        Err(CoreError::Forbidden(format!(
            "designer {} is not shortlisted for order {}",
            designer_id, order_id
        )))
    }

    /// Close out an assigned order and free the designer's slot
    #[tracing::instrument(skip(self))]
    pub async fn complete_assignment(&self, order_id: Uuid) -> CoreResult<Order> {
        if let Some(order) = self.assignments.commit_completion(order_id).await? {
            info!(designer_id = ?order.assigned_designer_id, "Assignment completed");
            return Ok(order);
        }
        let order = self.load_order(order_id).await?;
        Err(CoreError::InvalidState(format!(
            "order {} is {:?}, not assigned",
            order_id, order.assignment_status
        )))
    }

    async fn load_order(&self, order_id: Uuid) -> CoreResult<Order> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::{Complexity, OrderStatus, SkillLevel};
    use atelier_store::{MemoryNotifier, MemoryStore};

    struct Fixture {
        store: MemoryStore,
        notifier: Arc<MemoryNotifier>,
        engine: Arc<MatchingEngine>,
    }

    fn fixture_configured(notifier: MemoryNotifier, config: MatchingConfig) -> Fixture {
        let store = MemoryStore::new();
        let notifier = Arc::new(notifier);
        let engine = Arc::new(MatchingEngine::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            notifier.clone(),
            config,
        ));
        Fixture { store, notifier, engine }
    }

    fn fixture_with(notifier: MemoryNotifier) -> Fixture {
        fixture_configured(notifier, MatchingConfig::default())
    }

    fn fixture() -> Fixture {
        fixture_with(MemoryNotifier::new())
    }

    async fn add_designer(store: &MemoryStore, rating: f64, max_capacity: i32) -> DesignerProfile {
        let mut designer = DesignerProfile::new(Uuid::new_v4(), vec!["dress".into()], SkillLevel::Advanced, max_capacity);
        designer.rating = rating;
        DesignerDirectory::insert_designer(store, &designer).await.unwrap();
        designer
    }

    async fn add_order(store: &MemoryStore) -> Order {
        let mut order = Order::new(Uuid::new_v4());
        order.category = Some("dress".into());
        order.complexity = Some(Complexity::Moderate);
        OrderStore::insert_order(store, &order).await.unwrap();
        order
    }

    async fn reload(store: &MemoryStore, id: Uuid) -> Order {
        OrderStore::get_order(store, id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_shortlist_takes_top_designers() {
        let f = fixture();
        let mut designers = Vec::new();
        for rating in [3.0, 4.0, 5.0, 4.5] {
            designers.push(add_designer(&f.store, rating, 2).await);
        }
        let order = add_order(&f.store).await;

        assert!(f.engine.shortlist_designers(order.id).await.unwrap());

        let stored = reload(&f.store, order.id).await;
        assert_eq!(stored.assignment_status, AssignmentStatus::Shortlisted);
        assert!(stored.assignment_expires_at.is_some());
        let expected: Vec<Uuid> = [2, 3, 1].iter().map(|i| designers[*i].user_id).collect();
        assert_eq!(stored.shortlisted_designer_ids, expected);
        assert_eq!(f.notifier.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_shortlist_without_candidates_leaves_order_alone() {
        let f = fixture();
        let order = add_order(&f.store).await;

        assert!(!f.engine.shortlist_designers(order.id).await.unwrap());

        let stored = reload(&f.store, order.id).await;
        assert_eq!(stored.assignment_status, AssignmentStatus::Unassigned);
        assert!(stored.assignment_expires_at.is_none());
    }

    #[tokio::test]
    async fn test_shortlist_survives_notification_failure() {
        let f = fixture_with(MemoryNotifier::failing());
        add_designer(&f.store, 4.0, 2).await;
        let order = add_order(&f.store).await;

        assert!(f.engine.shortlist_designers(order.id).await.unwrap());
        assert_eq!(reload(&f.store, order.id).await.assignment_status, AssignmentStatus::Shortlisted);
    }

    #[tokio::test]
    async fn test_assign_updates_order_and_load() {
        let f = fixture();
        let designer = add_designer(&f.store, 4.0, 2).await;
        let order = add_order(&f.store).await;
        f.engine.shortlist_designers(order.id).await.unwrap();

        let assigned = f.engine.assign_order(order.id, designer.user_id).await.unwrap();
        assert_eq!(assigned.assignment_status, AssignmentStatus::Assigned);
        assert_eq!(assigned.assigned_designer_id, Some(designer.user_id));
        assert_eq!(assigned.status, OrderStatus::Reviewing);
        assert!(assigned.shortlisted_designer_ids.is_empty());
        assert!(assigned.assignment_expires_at.is_none());

        let load = DesignerDirectory::get_designer(&f.store, designer.user_id).await.unwrap().unwrap().current_load;
        assert_eq!(load, 1);
        assert_eq!(f.notifier.sent_to(order.customer_id).len(), 1);

        // Second attempt is a double-assign
        let again = f.engine.assign_order(order.id, designer.user_id).await;
        assert!(matches!(again, Err(CoreError::InvalidState(_))));
        assert!(!f.engine.shortlist_designers(order.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_assign_rejects_expired_shortlist() {
        let f = fixture();
        let designer = add_designer(&f.store, 4.0, 2).await;
        let order = add_order(&f.store).await;
        f.engine.shortlist_designers(order.id).await.unwrap();

        let patch = OrderPatch {
            assignment_expires_at: Some(Some(Utc::now() - Duration::minutes(1))),
            ..Default::default()
        };
        OrderStore::update_order(&f.store, order.id, &patch).await.unwrap();

        let result = f.engine.assign_order(order.id, designer.user_id).await;
        let Err(CoreError::InvalidState(message)) = result else {
            panic!("expected expiry rejection, got {:?}", result);
        };
        assert!(message.contains("expired"));
    }

    #[tokio::test]
    async fn test_assign_rechecks_capacity_at_accept_time() {
        let f = fixture();
        let designer = add_designer(&f.store, 4.0, 1).await;
        let first = add_order(&f.store).await;
        let second = add_order(&f.store).await;
        f.engine.shortlist_designers(first.id).await.unwrap();
        f.engine.shortlist_designers(second.id).await.unwrap();

        f.engine.assign_order(first.id, designer.user_id).await.unwrap();
        let result = f.engine.assign_order(second.id, designer.user_id).await;
        assert!(matches!(result, Err(CoreError::CapacityExceeded { max_capacity: 1, .. })));
        assert_eq!(reload(&f.store, second.id).await.assignment_status, AssignmentStatus::Shortlisted);
    }

    #[tokio::test]
    async fn test_assign_requires_shortlist_membership() {
        let f = fixture();
        add_designer(&f.store, 4.0, 2).await;
        let outsider = Uuid::new_v4();
        let order = add_order(&f.store).await;
        f.engine.shortlist_designers(order.id).await.unwrap();

        let result = f.engine.assign_order(order.id, outsider).await;
        assert!(matches!(result, Err(CoreError::Forbidden(_))));
        let missing = f.engine.assign_order(Uuid::new_v4(), outsider).await;
        assert!(matches!(missing, Err(CoreError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accepts_yield_one_winner() {
        let f = fixture();
        let mut designers = Vec::new();
        for _ in 0..3 {
            designers.push(add_designer(&f.store, 4.0, 1).await);
        }
        let order = add_order(&f.store).await;
        assert!(f.engine.shortlist_designers(order.id).await.unwrap());

        let attempts = designers.iter().map(|d| {
            let engine = f.engine.clone();
            let designer_id = d.user_id;
            tokio::spawn(async move { engine.assign_order(order.id, designer_id).await })
        });
        let results: Vec<CoreResult<Order>> = futures_util::future::join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results.iter().filter(|r| matches!(r, Err(CoreError::InvalidState(_)))).count(),
            2
        );

        let mut total_load = 0;
        for d in &designers {
            total_load += DesignerDirectory::get_designer(&f.store, d.user_id).await.unwrap().unwrap().current_load;
        }
        assert_eq!(total_load, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accepts_never_exceed_capacity() {
        let f = fixture();
        let designer = add_designer(&f.store, 4.0, 2).await;
        let mut orders = Vec::new();
        for _ in 0..8 {
            let order = add_order(&f.store).await;
            assert!(f.engine.shortlist_designers(order.id).await.unwrap());
            orders.push(order);
        }

        let attempts = orders.iter().map(|o| {
            let engine = f.engine.clone();
            let order_id = o.id;
            let designer_id = designer.user_id;
            tokio::spawn(async move { engine.assign_order(order_id, designer_id).await })
        });
        let results: Vec<CoreResult<Order>> = futures_util::future::join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
        assert_eq!(
            results.iter().filter(|r| matches!(r, Err(CoreError::CapacityExceeded { .. }))).count(),
            6
        );
        let profile = DesignerDirectory::get_designer(&f.store, designer.user_id).await.unwrap().unwrap();
        assert_eq!(profile.current_load, 2);

        let mut still_shortlisted = 0;
        for o in &orders {
            if reload(&f.store, o.id).await.assignment_status == AssignmentStatus::Shortlisted {
                still_shortlisted += 1;
            }
        }
        assert_eq!(still_shortlisted, 6);
    }

    #[tokio::test]
    async fn test_empty_or_closed_shortlist_config_offers_nothing() {
        for config in [
            MatchingConfig { shortlist_size: 0, ..Default::default() },
            MatchingConfig { shortlist_ttl: Duration::zero(), ..Default::default() },
        ] {
            let f = fixture_configured(MemoryNotifier::new(), config);
            add_designer(&f.store, 4.0, 2).await;
            let order = add_order(&f.store).await;

            assert!(!f.engine.shortlist_designers(order.id).await.unwrap());
            let stored = reload(&f.store, order.id).await;
            assert_eq!(stored.assignment_status, AssignmentStatus::Unassigned);
            assert!(stored.assignment_expires_at.is_none());
            assert!(f.notifier.sent().is_empty());
        }
    }

    #[tokio::test]
    async fn test_declining_everyone_leaves_empty_shortlist() {
        let f = fixture();
        let a = add_designer(&f.store, 4.0, 2).await;
        let b = add_designer(&f.store, 3.0, 2).await;
        let order = add_order(&f.store).await;
        f.engine.shortlist_designers(order.id).await.unwrap();

        f.engine.decline_order(order.id, a.user_id).await.unwrap();
        let after = f.engine.decline_order(order.id, b.user_id).await.unwrap();
        assert!(after.shortlisted_designer_ids.is_empty());
        assert_eq!(after.assignment_status, AssignmentStatus::Shortlisted);

        let repeat = f.engine.decline_order(order.id, a.user_id).await;
        assert!(matches!(repeat, Err(CoreError::Forbidden(_))));

        // Recovery is an explicit re-shortlist
        assert!(f.engine.shortlist_designers(order.id).await.unwrap());
        assert_eq!(reload(&f.store, order.id).await.shortlisted_designer_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_complete_assignment_frees_slot() {
        let f = fixture();
        let designer = add_designer(&f.store, 4.0, 1).await;
        let order = add_order(&f.store).await;

        let early = f.engine.complete_assignment(order.id).await;
        assert!(matches!(early, Err(CoreError::InvalidState(_))));

        f.engine.shortlist_designers(order.id).await.unwrap();
        f.engine.assign_order(order.id, designer.user_id).await.unwrap();
        let done = f.engine.complete_assignment(order.id).await.unwrap();
        assert_eq!(done.assignment_status, AssignmentStatus::Completed);

        let profile = DesignerDirectory::get_designer(&f.store, designer.user_id).await.unwrap().unwrap();
        assert_eq!(profile.current_load, 0);
    }

    #[test]
    fn test_assignment_result_view() {
        let failed: CoreResult<Order> = Err(CoreError::InvalidState("order x is already assigned".into()));
        let view = AssignmentResult::from_outcome(&failed);
        assert!(!view.success);
        assert!(view.message.contains("already assigned"));
    }
}
