pub mod models;
pub mod commission;
pub mod dispute;
pub mod repository;
pub mod notification;
pub mod email;

pub use models::{
    AssignmentStatus, Complexity, DesignerPatch, DesignerProfile, DesignerStatus, Order,
    OrderDisputeStatus, OrderPatch, OrderQuery, OrderStatus, SkillLevel,
};
pub use commission::{CommissionPayment, CommissionPaymentStatus, CommissionRate};
pub use dispute::{Dispute, DisputeEvidence, DisputeNote, DisputeProjection, DisputeStatus, NoteAction};
pub use notification::{NotificationError, NotificationGateway, NotificationKind};

/// Failure reported by a storage collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Concurrent modification rejected: {0}")]
    Conflict(String),
    #[error("Storage backend error: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Backend(err.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Designer {designer_id} is at capacity ({max_capacity})")]
    CapacityExceeded {
        designer_id: uuid::Uuid,
        max_capacity: i32,
    },
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Whether the whole operation may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Store(StoreError::Backend(_)))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
