use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use atelier_core::notification::{dispatch_all, Notification, NotificationGateway, NotificationKind};
use atelier_core::repository::{DisputeStore, DisputeWrite, OrderStore};
use atelier_core::{CoreError, CoreResult, Dispute, DisputeEvidence, DisputeStatus, NoteAction, Order};

/// Designer's stance on a dispute. Every stance hands the dispute to an
/// admin; the stance itself is kept in the audit notes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseAction {
    Accept,
    Reject,
    Counter,
}

impl ResponseAction {
    pub fn note_action(&self) -> NoteAction {
        match self {
            ResponseAction::Accept => NoteAction::DesignerAccept,
            ResponseAction::Reject => NoteAction::DesignerReject,
            ResponseAction::Counter => NoteAction::DesignerCounter,
        }
    }
}

/// An uploaded file reference attached to a dispute action
#[derive(Debug, Clone, Deserialize)]
pub struct EvidenceInput {
    pub file_url: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisputeDetails {
    pub dispute: Dispute,
    pub evidence: Vec<DisputeEvidence>,
}

/// Customer-raised dispute lifecycle: OPEN, then RESPONSE_REQUIRED once the
/// designer answers, then RESOLVED or CLOSED by an admin.
///
/// Each transition is one guarded `DisputeStore::write_dispute`, which also
/// rewrites the order's dispute projection.
pub struct DisputeWorkflow {
    orders: Arc<dyn OrderStore>,
    disputes: Arc<dyn DisputeStore>,
    notifier: Arc<dyn NotificationGateway>,
}

impl DisputeWorkflow {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        disputes: Arc<dyn DisputeStore>,
        notifier: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self { orders, disputes, notifier }
    }

    #[tracing::instrument(skip(self, description, evidence))]
    pub async fn create_dispute(
        &self,
        order_id: Uuid,
        creator_id: Uuid,
        category: &str,
        description: &str,
        evidence: Vec<EvidenceInput>,
    ) -> CoreResult<Dispute> {
        let description = description.trim();
        if description.is_empty() {
            return Err(CoreError::ValidationError("dispute description is required".into()));
        }
        validate_evidence(&evidence)?;

        let order = self.load_order(order_id).await?;
        if let Some(active) = self.disputes.find_active_dispute(order_id).await? {
            return Err(CoreError::InvalidState(format!(
                "order {} already has dispute {} in {:?}",
                order_id, active.id, active.status
            )));
        }

        let mut dispute = Dispute::new(order_id, creator_id, category.trim().to_string(), description.to_string());
        dispute.append_note(creator_id, NoteAction::Opened, description);
        let write = DisputeWrite {
            evidence: attach(&dispute, creator_id, evidence),
            dispute,
            expected_status: None,
        };
        if !self.disputes.write_dispute(&write).await? {
            debug!("Concurrent dispute won the order");
            return Err(CoreError::InvalidState(format!("order {} already has an active dispute", order_id)));
        }
        info!(dispute_id = %write.dispute.id, "Dispute opened");

        if let Some(designer_id) = order.assigned_designer_id {
            dispatch_all(
                self.notifier.as_ref(),
                vec![Notification::new(
                    designer_id,
                    NotificationKind::DisputeOpened,
                    format!("A dispute was opened on order {}", order_id),
                )],
            )
            .await;
        }
        Ok(write.dispute)
    }

    /// Record the assigned designer's answer and hand the dispute to an admin.
    /// A further answer while awaiting the admin only adds notes and evidence.
    #[tracing::instrument(skip(self, comment, evidence))]
    pub async fn respond_to_dispute(
        &self,
        dispute_id: Uuid,
        designer_id: Uuid,
        action: ResponseAction,
        comment: &str,
        evidence: Vec<EvidenceInput>,
    ) -> CoreResult<Dispute> {
        validate_evidence(&evidence)?;
        let mut dispute = self.load_dispute(dispute_id).await?;
        let order = self.load_order(dispute.order_id).await?;
        if order.assigned_designer_id != Some(designer_id) {
            return Err(CoreError::Forbidden(format!(
                "designer {} is not assigned to order {}",
                designer_id, order.id
            )));
        }
        if dispute.status.is_terminal() {
            return Err(CoreError::InvalidState(format!("dispute {} is {:?}", dispute_id, dispute.status)));
        }

        let expected = dispute.status;
        dispute.status = DisputeStatus::ResponseRequired;
        dispute.append_note(designer_id, action.note_action(), comment.trim());
        let write = DisputeWrite {
            evidence: attach(&dispute, designer_id, evidence),
            dispute,
            expected_status: Some(expected),
        };
        self.commit(&write).await?;
        info!(?action, "Designer responded to dispute");

        dispatch_all(
            self.notifier.as_ref(),
            vec![Notification::new(
                write.dispute.creator_id,
                NotificationKind::DisputeResponded,
                format!("The designer responded to your dispute on order {}", order.id),
            )],
        )
        .await;
        Ok(write.dispute)
    }

    /// Admin decision. `status` must be RESOLVED or CLOSED; a resolved
    /// dispute requires resolution text, which is projected onto the order.
    #[tracing::instrument(skip(self, resolution, notes))]
    pub async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        admin_id: Uuid,
        resolution: &str,
        notes: &str,
        status: DisputeStatus,
    ) -> CoreResult<Dispute> {
        let action = match status {
            DisputeStatus::Resolved => NoteAction::Resolved,
            DisputeStatus::Closed => NoteAction::Closed,
            other => {
                return Err(CoreError::ValidationError(format!(
                    "disputes can only be resolved or closed, not moved to {:?}",
                    other
                )))
            }
        };
        let resolution = resolution.trim();
        if status == DisputeStatus::Resolved && resolution.is_empty() {
            return Err(CoreError::ValidationError("resolution text is required".into()));
        }

        let mut dispute = self.load_dispute(dispute_id).await?;
        if dispute.status.is_terminal() {
            return Err(CoreError::InvalidState(format!("dispute {} is already {:?}", dispute_id, dispute.status)));
        }

        let expected = dispute.status;
        dispute.status = status;
        dispute.resolution = (!resolution.is_empty()).then(|| resolution.to_string());
        dispute.append_note(admin_id, action, notes.trim());
        let write = DisputeWrite { dispute, expected_status: Some(expected), evidence: Vec::new() };
        self.commit(&write).await?;
        info!(?status, "Dispute decided");

        let mut recipients = vec![write.dispute.creator_id];
        if let Some(order) = self.orders.get_order(write.dispute.order_id).await? {
            recipients.extend(order.assigned_designer_id);
        }
        let message = format!("The dispute on order {} was {:?}", write.dispute.order_id, status);
        let notices = recipients
            .into_iter()
            .map(|user_id| Notification::new(user_id, NotificationKind::DisputeResolved, message.clone()))
            .collect();
        dispatch_all(self.notifier.as_ref(), notices).await;
        Ok(write.dispute)
    }

    pub async fn get_dispute(&self, dispute_id: Uuid) -> CoreResult<DisputeDetails> {
        let dispute = self.load_dispute(dispute_id).await?;
        let evidence = self.disputes.list_evidence(dispute_id).await?;
        Ok(DisputeDetails { dispute, evidence })
    }

    pub async fn active_dispute_for(&self, order_id: Uuid) -> CoreResult<Option<Dispute>> {
        Ok(self.disputes.find_active_dispute(order_id).await?)
    }

    async fn commit(&self, write: &DisputeWrite) -> CoreResult<()> {
        if self.disputes.write_dispute(write).await? {
            return Ok(());
        }
        debug!(dispute_id = %write.dispute.id, "Dispute changed under us");
        Err(CoreError::InvalidState(format!(
            "dispute {} was changed concurrently",
            write.dispute.id
        )))
    }

    async fn load_order(&self, order_id: Uuid) -> CoreResult<Order> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))
    }

    async fn load_dispute(&self, dispute_id: Uuid) -> CoreResult<Dispute> {
        self.disputes
            .get_dispute(dispute_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("dispute {}", dispute_id)))
    }
}

fn validate_evidence(evidence: &[EvidenceInput]) -> CoreResult<()> {
    if evidence.iter().any(|e| e.file_url.trim().is_empty()) {
        return Err(CoreError::ValidationError("evidence file reference is required".into()));
    }
    Ok(())
}

fn attach(dispute: &Dispute, uploader_id: Uuid, evidence: Vec<EvidenceInput>) -> Vec<DisputeEvidence> {
    evidence
        .into_iter()
        .map(|e| DisputeEvidence::new(dispute.id, uploader_id, e.file_url.trim().to_string(), e.description))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::{AssignmentStatus, OrderDisputeStatus};
    use atelier_store::{MemoryNotifier, MemoryStore};

    struct Fixture {
        store: MemoryStore,
        notifier: Arc<MemoryNotifier>,
        workflow: DisputeWorkflow,
        order: Order,
        designer_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let notifier = Arc::new(MemoryNotifier::new());
        let workflow = DisputeWorkflow::new(Arc::new(store.clone()), Arc::new(store.clone()), notifier.clone());

        let designer_id = Uuid::new_v4();
        let mut order = Order::new(Uuid::new_v4());
        order.assignment_status = AssignmentStatus::Assigned;
        order.assigned_designer_id = Some(designer_id);
        OrderStore::insert_order(&store, &order).await.unwrap();

        Fixture { store, notifier, workflow, order, designer_id }
    }

    fn photo(url: &str) -> Vec<EvidenceInput> {
        vec![EvidenceInput { file_url: url.into(), description: Some("photo".into()) }]
    }

    async fn order_view(f: &Fixture) -> Order {
        OrderStore::get_order(&f.store, f.order.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_create_projects_onto_order() {
        let f = fixture().await;
        let dispute = f
            .workflow
            .create_dispute(f.order.id, f.order.customer_id, "quality", "Seam split", photo("https://files/1.jpg"))
            .await
            .unwrap();

        assert_eq!(dispute.status, DisputeStatus::Open);
        assert_eq!(dispute.notes.len(), 1);
        assert_eq!(order_view(&f).await.dispute_status, Some(OrderDisputeStatus::Opened));
        assert_eq!(f.notifier.sent_to(f.designer_id).len(), 1);

        let details = f.workflow.get_dispute(dispute.id).await.unwrap();
        assert_eq!(details.evidence.len(), 1);
        assert_eq!(details.evidence[0].uploader_id, f.order.customer_id);
    }

    #[tokio::test]
    async fn test_create_validation_and_lookup() {
        let f = fixture().await;
        let empty = f.workflow.create_dispute(f.order.id, f.order.customer_id, "quality", "   ", Vec::new()).await;
        assert!(matches!(empty, Err(CoreError::ValidationError(_))));

        let missing = f
            .workflow
            .create_dispute(Uuid::new_v4(), f.order.customer_id, "quality", "Late", Vec::new())
            .await;
        assert!(matches!(missing, Err(CoreError::NotFound(_))));
        assert!(order_view(&f).await.dispute_status.is_none());
    }

    #[tokio::test]
    async fn test_one_active_dispute_per_order() {
        let f = fixture().await;
        let first = f
            .workflow
            .create_dispute(f.order.id, f.order.customer_id, "quality", "Seam split", Vec::new())
            .await
            .unwrap();

        let second = f.workflow.create_dispute(f.order.id, f.order.customer_id, "fit", "Too long", Vec::new()).await;
        assert!(matches!(second, Err(CoreError::InvalidState(_))));

        // A resolved dispute is terminal but still blocks
        f.workflow
            .resolve_dispute(first.id, Uuid::new_v4(), "Partial refund", "", DisputeStatus::Resolved)
            .await
            .unwrap();
        let blocked = f.workflow.create_dispute(f.order.id, f.order.customer_id, "fit", "Too long", Vec::new()).await;
        assert!(matches!(blocked, Err(CoreError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_new_dispute_after_close() {
        let f = fixture().await;
        let first = f
            .workflow
            .create_dispute(f.order.id, f.order.customer_id, "quality", "Seam split", Vec::new())
            .await
            .unwrap();
        f.workflow
            .resolve_dispute(first.id, Uuid::new_v4(), "", "Customer withdrew", DisputeStatus::Closed)
            .await
            .unwrap();
        assert_eq!(order_view(&f).await.dispute_status, Some(OrderDisputeStatus::Closed));

        let second = f
            .workflow
            .create_dispute(f.order.id, f.order.customer_id, "fit", "Too long", Vec::new())
            .await
            .unwrap();
        assert_eq!(order_view(&f).await.dispute_status, Some(OrderDisputeStatus::Opened));
        assert_eq!(f.workflow.active_dispute_for(f.order.id).await.unwrap().map(|d| d.id), Some(second.id));
    }

    #[tokio::test]
    async fn test_every_response_action_awaits_admin() {
        for action in [ResponseAction::Accept, ResponseAction::Reject, ResponseAction::Counter] {
            let f = fixture().await;
            let dispute = f
                .workflow
                .create_dispute(f.order.id, f.order.customer_id, "quality", "Seam split", Vec::new())
                .await
                .unwrap();

            let responded = f
                .workflow
                .respond_to_dispute(dispute.id, f.designer_id, action, "Will fix", photo("https://files/2.jpg"))
                .await
                .unwrap();
            assert_eq!(responded.status, DisputeStatus::ResponseRequired);
            let last = responded.notes.last().unwrap();
            assert_eq!(last.action, action.note_action());
            assert_eq!(last.comment, "Will fix");
            assert_eq!(order_view(&f).await.dispute_status, Some(OrderDisputeStatus::AwaitingAdmin));
            assert_eq!(f.notifier.sent_to(f.order.customer_id).len(), 1);
        }
    }

    #[tokio::test]
    async fn test_follow_up_response_keeps_status() {
        let f = fixture().await;
        let dispute = f
            .workflow
            .create_dispute(f.order.id, f.order.customer_id, "quality", "Seam split", Vec::new())
            .await
            .unwrap();
        f.workflow
            .respond_to_dispute(dispute.id, f.designer_id, ResponseAction::Counter, "Offer repair", Vec::new())
            .await
            .unwrap();
        let again = f
            .workflow
            .respond_to_dispute(dispute.id, f.designer_id, ResponseAction::Accept, "Fine, refund", photo("https://files/3.jpg"))
            .await
            .unwrap();

        assert_eq!(again.status, DisputeStatus::ResponseRequired);
        let actions: Vec<NoteAction> = again.notes.iter().map(|n| n.action).collect();
        assert_eq!(
            actions,
            vec![NoteAction::Opened, NoteAction::DesignerCounter, NoteAction::DesignerAccept]
        );
        assert_eq!(f.workflow.get_dispute(dispute.id).await.unwrap().evidence.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_follow_up_does_not_drop_notes() {
        let f = fixture().await;
        let dispute = f
            .workflow
            .create_dispute(f.order.id, f.order.customer_id, "quality", "Seam split", Vec::new())
            .await
            .unwrap();
        f.workflow
            .respond_to_dispute(dispute.id, f.designer_id, ResponseAction::Counter, "Offer repair", Vec::new())
            .await
            .unwrap();

        // Two writers read the same state, both append one note
        let base = DisputeStore::get_dispute(&f.store, dispute.id).await.unwrap().unwrap();
        let mut first = base.clone();
        first.append_note(f.designer_id, NoteAction::DesignerAccept, "one");
        let mut second = base;
        second.append_note(f.designer_id, NoteAction::DesignerReject, "two");

        let write = |d: Dispute| DisputeWrite {
            dispute: d,
            expected_status: Some(DisputeStatus::ResponseRequired),
            evidence: Vec::new(),
        };
        assert!(DisputeStore::write_dispute(&f.store, &write(first)).await.unwrap());
        assert!(!DisputeStore::write_dispute(&f.store, &write(second)).await.unwrap());

        let stored = f.workflow.get_dispute(dispute.id).await.unwrap().dispute;
        assert_eq!(stored.notes.len(), 3);
        assert_eq!(stored.notes[2].comment, "one");
    }

    #[tokio::test]
    async fn test_only_assigned_designer_may_respond() {
        let f = fixture().await;
        let dispute = f
            .workflow
            .create_dispute(f.order.id, f.order.customer_id, "quality", "Seam split", Vec::new())
            .await
            .unwrap();

        let stranger = f
            .workflow
            .respond_to_dispute(dispute.id, Uuid::new_v4(), ResponseAction::Reject, "No", Vec::new())
            .await;
        assert!(matches!(stranger, Err(CoreError::Forbidden(_))));
        let stored = f.workflow.get_dispute(dispute.id).await.unwrap().dispute;
        assert_eq!(stored.status, DisputeStatus::Open);
    }

    #[tokio::test]
    async fn test_resolution_is_terminal_and_projected() {
        let f = fixture().await;
        let admin = Uuid::new_v4();
        let dispute = f
            .workflow
            .create_dispute(f.order.id, f.order.customer_id, "quality", "Seam split", Vec::new())
            .await
            .unwrap();

        let bad_status = f
            .workflow
            .resolve_dispute(dispute.id, admin, "Refund", "", DisputeStatus::ResponseRequired)
            .await;
        assert!(matches!(bad_status, Err(CoreError::ValidationError(_))));
        let no_text = f.workflow.resolve_dispute(dispute.id, admin, " ", "", DisputeStatus::Resolved).await;
        assert!(matches!(no_text, Err(CoreError::ValidationError(_))));

        let resolved = f
            .workflow
            .resolve_dispute(dispute.id, admin, "Full refund", "Photos confirm defect", DisputeStatus::Resolved)
            .await
            .unwrap();
        assert_eq!(resolved.status, DisputeStatus::Resolved);
        assert_eq!(resolved.notes.last().unwrap().actor_id, admin);

        let order = order_view(&f).await;
        assert_eq!(order.dispute_status, Some(OrderDisputeStatus::Resolved));
        assert_eq!(order.dispute_resolution.as_deref(), Some("Full refund"));
        assert_eq!(f.notifier.sent_to(f.designer_id).len(), 2);

        let late = f
            .workflow
            .respond_to_dispute(dispute.id, f.designer_id, ResponseAction::Accept, "ok", Vec::new())
            .await;
        assert!(matches!(late, Err(CoreError::InvalidState(_))));
        let twice = f.workflow.resolve_dispute(dispute.id, admin, "", "", DisputeStatus::Closed).await;
        assert!(matches!(twice, Err(CoreError::InvalidState(_))));
    }
}
