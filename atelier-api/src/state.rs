use std::sync::Arc;

use atelier_core::email::{EmailQueue, QueuedEmailGateway};
use atelier_core::repository::{
    AssignmentStore, CommissionPaymentStore, DesignerDirectory, DisputeStore, OrderStore, SettingsStore,
};
use atelier_core::NotificationGateway;
use atelier_dispute::DisputeWorkflow;
use atelier_ledger::CommissionLedger;
use atelier_matching::{MatchingConfig, MatchingEngine};
use atelier_store::app_config::BusinessRules;
use atelier_store::{
    DbClient, MemoryStore, StoreDesignerRepository, StoreDisputeRepository, StoreEmailQueue,
    StoreLedgerRepository, StoreOrderRepository,
};

/// Every storage collaborator the services need, behind trait objects
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub designers: Arc<dyn DesignerDirectory>,
    pub assignments: Arc<dyn AssignmentStore>,
    pub payments: Arc<dyn CommissionPaymentStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub disputes: Arc<dyn DisputeStore>,
    pub emails: Arc<dyn EmailQueue>,
}

impl Stores {
    pub fn in_memory(store: MemoryStore) -> Self {
        Self {
            orders: Arc::new(store.clone()),
            designers: Arc::new(store.clone()),
            assignments: Arc::new(store.clone()),
            payments: Arc::new(store.clone()),
            settings: Arc::new(store.clone()),
            disputes: Arc::new(store.clone()),
            emails: Arc::new(store),
        }
    }

    pub fn postgres(db: &DbClient) -> Self {
        let orders = Arc::new(StoreOrderRepository::new(db.pool.clone()));
        let ledger = Arc::new(StoreLedgerRepository::new(db.pool.clone()));
        Self {
            orders: orders.clone(),
            designers: Arc::new(StoreDesignerRepository::new(db.pool.clone())),
            assignments: orders,
            payments: ledger.clone(),
            settings: ledger,
            disputes: Arc::new(StoreDisputeRepository::new(db.pool.clone())),
            emails: Arc::new(StoreEmailQueue::new(db.pool.clone())),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderStore>,
    pub designers: Arc<dyn DesignerDirectory>,
    pub matching: Arc<MatchingEngine>,
    pub ledger: Arc<CommissionLedger>,
    pub disputes: Arc<DisputeWorkflow>,
}

impl AppState {
    /// Wire the services over `stores`; notifications go out through the email queue
    pub fn new(stores: &Stores, rules: &BusinessRules) -> Self {
        let notifier: Arc<dyn NotificationGateway> = Arc::new(QueuedEmailGateway::new(stores.emails.clone()));

        let matching = MatchingEngine::new(
            stores.orders.clone(),
            stores.designers.clone(),
            stores.assignments.clone(),
            notifier.clone(),
            MatchingConfig {
                shortlist_size: rules.shortlist_size,
                shortlist_ttl: chrono::Duration::hours(rules.shortlist_ttl_hours),
            },
        );
        let ledger = CommissionLedger::new(
            stores.orders.clone(),
            stores.payments.clone(),
            stores.settings.clone(),
            notifier.clone(),
            rules.default_delivery_fee,
        );
        let disputes = DisputeWorkflow::new(stores.orders.clone(), stores.disputes.clone(), notifier);

        Self {
            orders: stores.orders.clone(),
            designers: stores.designers.clone(),
            matching: Arc::new(matching),
            ledger: Arc::new(ledger),
            disputes: Arc::new(disputes),
        }
    }
}
