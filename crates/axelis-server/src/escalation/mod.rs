// crates/axelis-server/src/escalation/mod.rs
// Escalation engine: detection, routing, context construction

pub mod context;
pub mod detector;
pub mod router;

pub use context::ContextBuilder;
pub use detector::{EscalationAssessment, EscalationDetector, EscalationInput, Priority};
pub use router::EscalationRouter;
