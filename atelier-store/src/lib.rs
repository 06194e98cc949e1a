pub mod app_config;
pub mod database;
pub mod memory;
pub mod order_repo;
pub mod designer_repo;
pub mod ledger_repo;
pub mod dispute_repo;
pub mod email_repo;

pub use database::DbClient;
pub use memory::{MemoryNotifier, MemoryStore};
pub use order_repo::StoreOrderRepository;
pub use designer_repo::StoreDesignerRepository;
pub use ledger_repo::StoreLedgerRepository;
pub use dispute_repo::StoreDisputeRepository;
pub use email_repo::StoreEmailQueue;
