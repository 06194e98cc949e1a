pub mod ledger;

pub use ledger::{CommissionLedger, CommissionLine, CommissionStatement, CommissionSummary};
