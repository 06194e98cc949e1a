use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::models::OrderDisputeStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Open,
    ResponseRequired,
    Resolved,
    Closed,
}

impl DisputeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DisputeStatus::Resolved | DisputeStatus::Closed)
    }

    /// Any dispute that is not closed blocks a new one on the same order
    pub fn blocks_new_dispute(&self) -> bool {
        *self != DisputeStatus::Closed
    }
}

/// What an audit note records having happened
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoteAction {
    Opened,
    DesignerAccept,
    DesignerReject,
    DesignerCounter,
    Resolved,
    Closed,
}

/// Append-only audit record on a dispute
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisputeNote {
    pub actor_id: Uuid,
    pub action: NoteAction,
    pub comment: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: Uuid,
    pub order_id: Uuid,
    pub creator_id: Uuid,
    pub category: String,
    pub description: String,
    pub status: DisputeStatus,
    pub resolution: Option<String>,
    pub notes: Vec<DisputeNote>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dispute {
    pub fn new(order_id: Uuid, creator_id: Uuid, category: String, description: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            creator_id,
            category,
            description,
            status: DisputeStatus::Open,
            resolution: None,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn append_note(&mut self, actor_id: Uuid, action: NoteAction, comment: impl Into<String>) {
        let at = Utc::now();
        self.notes.push(DisputeNote {
            actor_id,
            action,
            comment: comment.into(),
            at,
        });
        self.updated_at = at;
    }

    pub fn projection(&self) -> DisputeProjection {
        DisputeProjection::of(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeEvidence {
    pub id: Uuid,
    pub dispute_id: Uuid,
    pub uploader_id: Uuid,
    pub file_url: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DisputeEvidence {
    pub fn new(dispute_id: Uuid, uploader_id: Uuid, file_url: String, description: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            dispute_id,
            uploader_id,
            file_url,
            description,
            created_at: Utc::now(),
        }
    }
}

/// The order-side fields derived from a dispute. Always computed, never hand-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisputeProjection {
    pub order_id: Uuid,
    pub dispute_status: OrderDisputeStatus,
    pub dispute_resolution: Option<String>,
}

impl DisputeProjection {
    pub fn of(dispute: &Dispute) -> Self {
        let dispute_status = match dispute.status {
            DisputeStatus::Open => OrderDisputeStatus::Opened,
            DisputeStatus::ResponseRequired => OrderDisputeStatus::AwaitingAdmin,
            DisputeStatus::Resolved => OrderDisputeStatus::Resolved,
            DisputeStatus::Closed => OrderDisputeStatus::Closed,
        };
        let dispute_resolution = match dispute.status {
            DisputeStatus::Resolved => dispute.resolution.clone(),
            _ => None,
        };
        Self {
            order_id: dispute.order_id,
            dispute_status,
            dispute_resolution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_follows_status() {
        let mut dispute = Dispute::new(Uuid::new_v4(), Uuid::new_v4(), "quality".into(), "torn seam".into());
        assert_eq!(dispute.projection().dispute_status, OrderDisputeStatus::Opened);

        dispute.status = DisputeStatus::ResponseRequired;
        dispute.resolution = Some("draft".into());
        let projection = dispute.projection();
        assert_eq!(projection.dispute_status, OrderDisputeStatus::AwaitingAdmin);
        assert!(projection.dispute_resolution.is_none());

        dispute.status = DisputeStatus::Resolved;
        dispute.resolution = Some("partial refund".into());
        assert_eq!(dispute.projection().dispute_resolution.as_deref(), Some("partial refund"));
    }

    #[test]
    fn test_only_closed_releases_order() {
        assert!(DisputeStatus::Open.blocks_new_dispute());
        assert!(DisputeStatus::ResponseRequired.blocks_new_dispute());
        assert!(DisputeStatus::Resolved.blocks_new_dispute());
        assert!(!DisputeStatus::Closed.blocks_new_dispute());
    }
}
