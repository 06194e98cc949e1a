pub mod workflow;

pub use workflow::{DisputeDetails, DisputeWorkflow, EvidenceInput, ResponseAction};
