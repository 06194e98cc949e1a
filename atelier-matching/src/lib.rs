pub mod eligibility;
pub mod engine;

pub use eligibility::EligibilityFilter;
pub use engine::{AssignmentResult, MatchingConfig, MatchingEngine};
