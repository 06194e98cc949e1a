use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::notification::{NotificationError, NotificationGateway, NotificationKind};
use crate::StoreResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Queued,
    Sent,
    Dead,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedEmail {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub body: String,
    pub status: EmailStatus,
    pub attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QueuedEmail {
    pub fn new(recipient_id: Uuid, kind: NotificationKind, body: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            kind,
            body,
            status: EmailStatus::Queued,
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
            created_at: now,
        }
    }
}

/// Durable outbox polled by the email worker
#[async_trait]
pub trait EmailQueue: Send + Sync {
    async fn enqueue(&self, email: &QueuedEmail) -> StoreResult<()>;

    /// Queued messages due at `now`, leased until `now + lease` so a second
    /// poller does not pick them up while they are in flight.
    async fn claim_due(&self, now: DateTime<Utc>, lease: Duration, limit: usize) -> StoreResult<Vec<QueuedEmail>>;

    async fn mark_sent(&self, id: Uuid) -> StoreResult<()>;

    /// Record a failed attempt. `retry_at = None` gives up on the message.
    async fn mark_failed(&self, id: Uuid, error: &str, retry_at: Option<DateTime<Utc>>) -> StoreResult<()>;
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// When to try again after `attempts` failed attempts, or `None` once exhausted
    pub fn next_attempt(&self, attempts: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if attempts >= self.max_attempts {
            return None;
        }
        let exponent = attempts.saturating_sub(1).min(30);
        let backoff = self
            .base_backoff
            .checked_mul(1 << exponent)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff);
        Some(now + backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::seconds(30),
            max_backoff: Duration::hours(1),
        }
    }
}

/// Notification gateway that only enqueues; delivery happens in the worker
pub struct QueuedEmailGateway {
    queue: Arc<dyn EmailQueue>,
}

impl QueuedEmailGateway {
    pub fn new(queue: Arc<dyn EmailQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl NotificationGateway for QueuedEmailGateway {
    async fn send(&self, user_id: Uuid, kind: NotificationKind, message: &str) -> Result<(), NotificationError> {
        let email = QueuedEmail::new(user_id, kind, message.to_string());
        self.queue.enqueue(&email).await.map_err(|e| NotificationError {
            user_id,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_backoff: Duration::seconds(30),
            max_backoff: Duration::seconds(200),
        };
        let now = Utc::now();
        assert_eq!(policy.next_attempt(1, now), Some(now + Duration::seconds(30)));
        assert_eq!(policy.next_attempt(2, now), Some(now + Duration::seconds(60)));
        assert_eq!(policy.next_attempt(3, now), Some(now + Duration::seconds(120)));
        assert_eq!(policy.next_attempt(4, now), Some(now + Duration::seconds(200)));
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.next_attempt(4, Utc::now()).is_some());
        assert!(policy.next_attempt(5, Utc::now()).is_none());
    }
}
