use async_trait::async_trait;

use lf_core::types::{Deal, Lead, TeamMember};

#[derive(Debug, thiserror::Error)]
#[error("onboarding failed: {0}")]
pub struct OnboardingError(pub String);

/// Kicks off client or distributor onboarding once a deal is won.
///
/// Called at most once per deal. A failure is logged by the caller and never
/// undoes the stage change that triggered it.
#[async_trait]
pub trait OnboardingTrigger: Send + Sync {
    async fn start_onboarding(
        &self,
        deal: &Deal,
        lead: Option<&Lead>,
        member: Option<&TeamMember>,
    ) -> Result<(), OnboardingError>;
}

/// For deployments without an onboarding workflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOnboarding;

#[async_trait]
impl OnboardingTrigger for NoopOnboarding {
    async fn start_onboarding(
        &self,
        deal: &Deal,
        _lead: Option<&Lead>,
        _member: Option<&TeamMember>,
    ) -> Result<(), OnboardingError> {
        tracing::debug!(deal_id = %deal.id, "no onboarding workflow configured");
        Ok(())
    }
}
