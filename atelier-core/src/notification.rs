use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ShortlistOffer,
    OrderAssigned,
    AssignmentConfirmed,
    DisputeOpened,
    DisputeResponded,
    DisputeResolved,
    CommissionPaymentReviewed,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn new(user_id: Uuid, kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            user_id,
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Notification to {user_id} failed: {reason}")]
pub struct NotificationError {
    pub user_id: Uuid,
    pub reason: String,
}

/// Outbound messaging. Callers never branch on the result beyond logging it.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(&self, user_id: Uuid, kind: NotificationKind, message: &str) -> Result<(), NotificationError>;
}

/// Send every notification concurrently. Failures are logged and dropped;
/// returns how many were accepted by the gateway.
pub async fn dispatch_all(gateway: &dyn NotificationGateway, notifications: Vec<Notification>) -> usize {
    let sends = notifications
        .iter()
        .map(|n| gateway.send(n.user_id, n.kind, &n.message));

    let mut delivered = 0;
    for (notification, result) in notifications.iter().zip(join_all(sends).await) {
        match result {
            Ok(()) => delivered += 1,
            Err(e) => tracing::warn!(
                user_id = %notification.user_id,
                kind = ?notification.kind,
                "Dropping failed notification: {}",
                e
            ),
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FlakyGateway {
        fail_for: Uuid,
        sent: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl NotificationGateway for FlakyGateway {
        async fn send(&self, user_id: Uuid, _kind: NotificationKind, _message: &str) -> Result<(), NotificationError> {
            if user_id == self.fail_for {
                return Err(NotificationError { user_id, reason: "mailbox full".into() });
            }
            self.sent.lock().unwrap().push(user_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_other_sends() {
        let bad = Uuid::new_v4();
        let good = Uuid::new_v4();
        let gateway = FlakyGateway { fail_for: bad, sent: Mutex::new(Vec::new()) };

        let delivered = dispatch_all(
            &gateway,
            vec![
                Notification::new(bad, NotificationKind::ShortlistOffer, "offer"),
                Notification::new(good, NotificationKind::ShortlistOffer, "offer"),
            ],
        )
        .await;

        assert_eq!(delivered, 1);
        assert_eq!(*gateway.sent.lock().unwrap(), vec![good]);
    }
}
