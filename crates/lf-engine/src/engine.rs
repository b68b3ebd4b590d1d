use std::sync::Arc;

use uuid::Uuid;

use lf_core::clock::{Clock, SystemClock};
use lf_core::config::{Config, EscalationConfig, RoutingConfig, SlaConfig};
use lf_core::error::Result;
use lf_core::store::LeadStore;
use lf_core::types::{Assignment, Deal, Lead, ReassignReason, TeamMember};

use crate::deal_pipeline::DealPipeline;
use crate::directory::TeamDirectory;
use crate::events::EventSink;
use crate::onboarding::{NoopOnboarding, OnboardingTrigger};
use crate::router::{EscalationOutcome, RouteOutcome, Router};
use crate::territory::{NoTerritoryMatch, TerritoryMatcher};
use crate::tracker::AssignmentTracker;

/// The lead-management core behind one handle.
///
/// Cloning is cheap; clones share the store, the locks and the event sink.
#[derive(Clone)]
pub struct LeadFlow {
    directory: TeamDirectory,
    tracker: AssignmentTracker,
    pipeline: DealPipeline,
    router: Router,
    escalation: EscalationConfig,
}

impl LeadFlow {
    pub fn builder(store: Arc<dyn LeadStore>) -> LeadFlowBuilder {
        LeadFlowBuilder::new(store)
    }

    pub async fn route_lead(&self, lead: Lead) -> Result<RouteOutcome> {
        self.router.route_lead(lead).await
    }

    pub async fn reassign_lead(
        &self,
        lead_id: Uuid,
        new_member_id: Uuid,
        reason: ReassignReason,
    ) -> Result<(TeamMember, Assignment)> {
        self.router
            .reassign_lead(lead_id, new_member_id, reason, None)
            .await
    }

    /// Same as [`reassign_lead`](Self::reassign_lead), recording who asked.
    pub async fn reassign_lead_by(
        &self,
        lead_id: Uuid,
        new_member_id: Uuid,
        reason: ReassignReason,
        assigned_by: Uuid,
    ) -> Result<(TeamMember, Assignment)> {
        self.router
            .reassign_lead(lead_id, new_member_id, reason, Some(assigned_by))
            .await
    }

    pub async fn escalate_assignment(
        &self,
        assignment_id: Uuid,
        level: u8,
    ) -> Result<EscalationOutcome> {
        self.router.escalate_lead(assignment_id, level).await
    }

    pub async fn advance_deal(&self, deal_id: Uuid, notes: Option<String>) -> Result<Deal> {
        self.pipeline.move_deal_to_next_stage(deal_id, notes).await
    }

    /// Move a deal to a stage given by name.
    pub async fn set_deal_stage(
        &self,
        deal_id: Uuid,
        stage: &str,
        notes: Option<String>,
    ) -> Result<Deal> {
        self.pipeline
            .update_deal_stage_named(deal_id, stage, notes)
            .await
    }

    pub async fn close_deal(
        &self,
        deal_id: Uuid,
        won: bool,
        final_value: Option<f64>,
        notes: Option<String>,
    ) -> Result<Deal> {
        self.pipeline
            .close_deal(deal_id, won, final_value, notes)
            .await
    }

    pub async fn pause_deal(&self, deal_id: Uuid) -> Result<Deal> {
        self.pipeline.pause_deal(deal_id).await
    }

    pub async fn resume_deal(&self, deal_id: Uuid) -> Result<Deal> {
        self.pipeline.resume_deal(deal_id).await
    }

    pub async fn sweep_overdue_assignments(&self) -> Result<Vec<Assignment>> {
        self.tracker.sweep_overdue().await
    }

    pub async fn deals_for_lead(&self, lead_id: Uuid) -> Result<Vec<Deal>> {
        self.pipeline.deals_for_lead(lead_id).await
    }

    pub async fn assignment_history(&self, lead_id: Uuid) -> Result<Vec<Assignment>> {
        self.tracker.history_for_lead(lead_id).await
    }

    pub fn directory(&self) -> &TeamDirectory {
        &self.directory
    }

    pub fn tracker(&self) -> &AssignmentTracker {
        &self.tracker
    }

    pub fn pipeline(&self) -> &DealPipeline {
        &self.pipeline
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn max_escalation_level(&self) -> u8 {
        self.escalation.max_level
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct LeadFlowBuilder {
    store: Arc<dyn LeadStore>,
    clock: Arc<dyn Clock>,
    sink: EventSink,
    onboarding: Arc<dyn OnboardingTrigger>,
    territory: Arc<dyn TerritoryMatcher>,
    routing: RoutingConfig,
    sla: SlaConfig,
    escalation: EscalationConfig,
}

impl LeadFlowBuilder {
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            sink: EventSink::disabled(),
            onboarding: Arc::new(NoopOnboarding),
            territory: Arc::new(NoTerritoryMatch),
            routing: RoutingConfig::default(),
            sla: SlaConfig::default(),
            escalation: EscalationConfig::default(),
        }
    }

    /// Take the routing, SLA and escalation sections from `config`.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.routing = config.routing;
        self.sla = config.sla;
        self.escalation = config.escalation;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_sink(mut self, sink: EventSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_onboarding(mut self, onboarding: Arc<dyn OnboardingTrigger>) -> Self {
        self.onboarding = onboarding;
        self
    }

    pub fn with_territory_matcher(mut self, territory: Arc<dyn TerritoryMatcher>) -> Self {
        self.territory = territory;
        self
    }

    pub fn build(self) -> LeadFlow {
        let directory = TeamDirectory::new(self.store.clone(), self.clock.clone());
        let tracker = AssignmentTracker::new(
            self.store.clone(),
            directory.clone(),
            self.clock.clone(),
            self.routing,
            self.sla,
        );
        let pipeline = DealPipeline::new(
            self.store.clone(),
            self.clock.clone(),
            self.sink.clone(),
            self.onboarding,
        );
        let router = Router::new(
            self.store,
            directory.clone(),
            tracker.clone(),
            pipeline.clone(),
            self.territory,
            self.clock,
            self.sink,
            self.routing,
            self.escalation,
        );
        LeadFlow {
            directory,
            tracker,
            pipeline,
            router,
            escalation: self.escalation,
        }
    }
}
