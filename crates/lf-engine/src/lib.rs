//! Lead routing, assignment tracking, deal pipelines and escalation.
//!
//! [`LeadFlow`] is the entry point; the individual services are exposed for
//! callers that only need one of them.

pub mod deal_pipeline;
pub mod directory;
pub mod engine;
pub mod estimate;
pub mod events;
pub mod onboarding;
pub mod router;
pub mod territory;
pub mod tracker;

pub use deal_pipeline::DealPipeline;
pub use directory::TeamDirectory;
pub use engine::{LeadFlow, LeadFlowBuilder};
pub use events::{EventSink, NotificationEvent};
pub use onboarding::{NoopOnboarding, OnboardingTrigger};
pub use router::{EscalationOutcome, RouteOutcome, Router};
pub use tracker::AssignmentTracker;
