use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use atelier_core::email::{EmailQueue, QueuedEmail, RetryPolicy};
use atelier_core::StoreResult;

#[derive(Debug, thiserror::Error)]
#[error("email transport failed: {0}")]
pub struct TransportError(pub String);

/// Hands a message to whatever actually delivers mail
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn deliver(&self, email: &QueuedEmail) -> Result<(), TransportError>;
}

/// Transport that only writes the message to the log
pub struct LogTransport;

#[async_trait]
impl EmailTransport for LogTransport {
    async fn deliver(&self, email: &QueuedEmail) -> Result<(), TransportError> {
        info!(recipient = %email.recipient_id, kind = ?email.kind, "Email: {}", email.body);
        Ok(())
    }
}

/// Counts from one polling pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub sent: usize,
    pub retried: usize,
    pub dead: usize,
}

pub struct EmailWorker {
    queue: Arc<dyn EmailQueue>,
    transport: Arc<dyn EmailTransport>,
    policy: RetryPolicy,
    batch_size: usize,
    lease: Duration,
}

impl EmailWorker {
    pub fn new(
        queue: Arc<dyn EmailQueue>,
        transport: Arc<dyn EmailTransport>,
        policy: RetryPolicy,
        batch_size: usize,
    ) -> Self {
        Self {
            queue,
            transport,
            policy,
            batch_size,
            lease: Duration::minutes(5),
        }
    }

    /// Deliver one batch of due messages
    pub async fn drain_once(&self) -> StoreResult<DrainReport> {
        let now = Utc::now();
        let due = self.queue.claim_due(now, self.lease, self.batch_size).await?;
        let mut report = DrainReport::default();

        for email in due {
            match self.transport.deliver(&email).await {
                Ok(()) => {
                    self.queue.mark_sent(email.id).await?;
                    report.sent += 1;
                }
                Err(e) => {
                    let attempts = email.attempts + 1;
                    let retry_at = self.policy.next_attempt(attempts, Utc::now());
                    self.queue.mark_failed(email.id, &e.to_string(), retry_at).await?;
                    match retry_at {
                        Some(at) => {
                            warn!(email_id = %email.id, attempts, retry_at = %at, "Email delivery failed, will retry");
                            report.retried += 1;
                        }
                        None => {
                            error!(email_id = %email.id, attempts, "Email delivery failed, giving up");
                            report.dead += 1;
                        }
                    }
                }
            }
        }
        Ok(report)
    }

    /// Poll forever on `interval`
    pub async fn run(self, interval: std::time::Duration) {
        info!("Email worker started, polling every {:?}", interval);
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.drain_once().await {
                Ok(report) if report != DrainReport::default() => info!(?report, "Email batch processed"),
                Ok(_) => {}
                Err(e) => error!("Email worker failed to poll queue: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::email::EmailStatus;
    use atelier_core::NotificationKind;
    use atelier_store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Fails the first `failures` deliveries
    struct FlakyTransport {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmailTransport for FlakyTransport {
        async fn deliver(&self, _email: &QueuedEmail) -> Result<(), TransportError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(TransportError("smtp timeout".into()));
            }
            Ok(())
        }
    }

    fn worker(store: &MemoryStore, failures: usize, max_attempts: u32) -> EmailWorker {
        let policy = RetryPolicy {
            max_attempts,
            base_backoff: Duration::zero(),
            max_backoff: Duration::zero(),
        };
        let transport = Arc::new(FlakyTransport { failures, calls: AtomicUsize::new(0) });
        let mut worker = EmailWorker::new(Arc::new(store.clone()), transport, policy, 10);
        worker.lease = Duration::zero();
        worker
    }

    async fn enqueue(store: &MemoryStore) -> Uuid {
        let email = QueuedEmail::new(Uuid::new_v4(), NotificationKind::OrderAssigned, "assigned".into());
        EmailQueue::enqueue(store, &email).await.unwrap();
        email.id
    }

    #[tokio::test]
    async fn test_retries_until_delivered() {
        let store = MemoryStore::new();
        let id = enqueue(&store).await;
        let worker = worker(&store, 2, 5);

        assert_eq!(worker.drain_once().await.unwrap(), DrainReport { sent: 0, retried: 1, dead: 0 });
        assert_eq!(worker.drain_once().await.unwrap(), DrainReport { sent: 0, retried: 1, dead: 0 });
        assert_eq!(worker.drain_once().await.unwrap(), DrainReport { sent: 1, retried: 0, dead: 0 });

        let email = store.emails().unwrap().into_iter().find(|e| e.id == id).unwrap();
        assert_eq!(email.status, EmailStatus::Sent);
        assert_eq!(email.attempts, 3);
        assert_eq!(email.last_error.as_deref(), Some("email transport failed: smtp timeout"));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let store = MemoryStore::new();
        enqueue(&store).await;
        let worker = worker(&store, usize::MAX, 2);

        assert_eq!(worker.drain_once().await.unwrap().retried, 1);
        assert_eq!(worker.drain_once().await.unwrap().dead, 1);
        assert_eq!(worker.drain_once().await.unwrap(), DrainReport::default());

        let email = store.emails().unwrap().remove(0);
        assert_eq!(email.status, EmailStatus::Dead);
        assert_eq!(email.attempts, 2);
    }
}
