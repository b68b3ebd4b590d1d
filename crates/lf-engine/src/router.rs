use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use lf_core::clock::Clock;
use lf_core::config::{EscalationConfig, RoutingConfig};
use lf_core::error::{LeadFlowError, Result};
use lf_core::locks::KeyedLocks;
use lf_core::store::LeadStore;
use lf_core::types::{
    Assignment, AssignmentReason, CounterKey, Deal, Department, Lead, ReassignReason, TeamMember,
};

use crate::deal_pipeline::DealPipeline;
use crate::directory::TeamDirectory;
use crate::estimate::estimate_deal_value;
use crate::events::{EventSink, NotificationEvent};
use crate::territory::TerritoryMatcher;
use crate::tracker::AssignmentTracker;

/// Result of routing a fresh lead.
#[derive(Debug, Clone, Serialize)]
pub struct RouteOutcome {
    pub member: TeamMember,
    pub assignment: Assignment,
    /// Present when the lead scored hot enough to open a deal.
    pub deal: Option<Deal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EscalationOutcome {
    /// `false` when the request was a no-op.
    pub escalated: bool,
    pub reassigned: bool,
    /// The lead's assignment after the call: the new one when reassigned.
    pub assignment: Assignment,
}

/// Decides who works a lead, and moves it when that has to change.
///
/// Every operation on one lead runs under that lead's lock. Member selection
/// additionally holds the department lock until the chosen member's load is
/// recorded, so concurrent routes never read a stale rotation order. Locks
/// are always taken lead, then department, then assignment.
#[derive(Clone)]
pub struct Router {
    store: Arc<dyn LeadStore>,
    directory: TeamDirectory,
    tracker: AssignmentTracker,
    pipeline: DealPipeline,
    territory: Arc<dyn TerritoryMatcher>,
    clock: Arc<dyn Clock>,
    sink: EventSink,
    routing: RoutingConfig,
    escalation: EscalationConfig,
    lead_locks: Arc<KeyedLocks>,
    department_locks: Arc<KeyedLocks<Department>>,
}

impl Router {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn LeadStore>,
        directory: TeamDirectory,
        tracker: AssignmentTracker,
        pipeline: DealPipeline,
        territory: Arc<dyn TerritoryMatcher>,
        clock: Arc<dyn Clock>,
        sink: EventSink,
        routing: RoutingConfig,
        escalation: EscalationConfig,
    ) -> Self {
        Self {
            store,
            directory,
            tracker,
            pipeline,
            territory,
            clock,
            sink,
            routing,
            escalation,
            lead_locks: Arc::new(KeyedLocks::new()),
            department_locks: Arc::new(KeyedLocks::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    /// Pick a member for `lead`, assign it and open a deal for hot leads.
    pub async fn route_lead(&self, lead: Lead) -> Result<RouteOutcome> {
        let _guard = self.lead_locks.lock(lead.id).await;

        if let Some(live) = self.live_assignment(lead.id).await? {
            return Err(LeadFlowError::LeadAlreadyAssigned {
                lead_id: lead.id,
                assignment_id: live.id,
            });
        }
        self.store.put_lead(&lead).await?;

        let department = lead.department();
        let (member, assignment) = self.assign_next_member(&lead, department).await?;

        // The assignment is already committed, so a failed deal insert is
        // logged rather than returned; failing here would leave a retry
        // rejected as already assigned.
        let deal = if self.routing.is_hot(&lead) {
            let value = estimate_deal_value(&lead);
            match self
                .pipeline
                .create_deal(&lead, &member, value, assignment.priority)
                .await
            {
                Ok(deal) => Some(deal),
                Err(e) => {
                    tracing::warn!(lead_id = %lead.id, error = %e, "could not open deal for hot lead");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            lead_id = %lead.id,
            member_id = %member.id,
            %department,
            score = lead.lead_score,
            deal = deal.is_some(),
            "lead routed"
        );
        self.sink.emit(NotificationEvent::LeadAssigned {
            lead_id: lead.id,
            member_id: member.id,
            assignment_id: assignment.id,
            department,
            reason: assignment.reason,
            response_deadline: assignment.response_deadline,
        });

        Ok(RouteOutcome {
            member,
            assignment,
            deal,
        })
    }

    /// Territory match, else round-robin; then record the assignment and the
    /// member's new load before releasing the department.
    async fn assign_next_member(
        &self,
        lead: &Lead,
        department: Department,
    ) -> Result<(TeamMember, Assignment)> {
        let _selection = self.department_locks.lock(department).await;

        let candidates = self.directory.routing_candidates(department).await?;
        if candidates.is_empty() {
            tracing::warn!(lead_id = %lead.id, %department, "no routable team member");
            return Err(LeadFlowError::NoAvailableMember(department));
        }

        let (member_id, reason) = match self.territory.match_member(lead, &candidates) {
            Some(id) if candidates.iter().any(|m| m.id == id) => (id, AssignmentReason::Territory),
            _ => {
                let ids: Vec<Uuid> = candidates.iter().map(|m| m.id).collect();
                let picked = self
                    .store
                    .advance_rotation(CounterKey::round_robin(department), &ids, self.clock.now())
                    .await?
                    .ok_or(LeadFlowError::NoAvailableMember(department))?;
                (picked, AssignmentReason::RoundRobin)
            }
        };
        tracing::debug!(
            lead_id = %lead.id,
            member_id = %member_id,
            candidates = candidates.len(),
            ?reason,
            "member selected"
        );

        let member = candidates
            .into_iter()
            .find(|m| m.id == member_id)
            .ok_or(LeadFlowError::MemberNotFound(member_id))?;

        let assignment = self.tracker.create(lead, &member, reason, None, 0).await?;
        let member = self.directory.record_assignment(member.id).await?;
        Ok((member, assignment))
    }

    // -----------------------------------------------------------------------
    // Reassignment
    // -----------------------------------------------------------------------

    /// Hand the lead to `new_member_id`. The escalation level carries over.
    pub async fn reassign_lead(
        &self,
        lead_id: Uuid,
        new_member_id: Uuid,
        reason: ReassignReason,
        assigned_by: Option<Uuid>,
    ) -> Result<(TeamMember, Assignment)> {
        let _guard = self.lead_locks.lock(lead_id).await;

        let current = self.tracker.current_for_lead(lead_id).await?;
        if current.status.is_terminal() {
            return Err(LeadFlowError::AlreadyTerminal {
                entity: "assignment",
                id: current.id,
                status: current.status.to_string(),
            });
        }
        let new_member = self.directory.get_active_member(new_member_id).await?;
        let lead = self.load_lead(lead_id).await?;
        let level = current.escalation_level;

        self.move_lead(&lead, &current, &new_member, reason, assigned_by, level)
            .await
    }

    /// Caller holds the lead lock and has checked `current` is live.
    async fn move_lead(
        &self,
        lead: &Lead,
        current: &Assignment,
        new_member: &TeamMember,
        reason: ReassignReason,
        assigned_by: Option<Uuid>,
        level: u8,
    ) -> Result<(TeamMember, Assignment)> {
        let reason = AssignmentReason::from(reason);
        let old = self.tracker.mark_reassigned(current).await?;
        let fresh = match self
            .tracker
            .create(lead, new_member, reason, assigned_by, level)
            .await
        {
            Ok(fresh) => fresh,
            Err(e) => {
                self.tracker.restore_status(&old, current.status).await;
                return Err(e);
            }
        };

        if let Err(e) = self.directory.release_lead(old.member_id).await {
            tracing::warn!(member_id = %old.member_id, error = %e, "could not release member load");
        }
        let member = match self.directory.record_assignment(new_member.id).await {
            Ok(member) => member,
            Err(e) => {
                tracing::warn!(member_id = %new_member.id, error = %e, "could not record member load");
                new_member.clone()
            }
        };

        tracing::info!(
            lead_id = %lead.id,
            from = %old.member_id,
            to = %member.id,
            ?reason,
            level,
            "lead reassigned"
        );
        self.sink.emit(NotificationEvent::LeadReassigned {
            lead_id: lead.id,
            from_member_id: old.member_id,
            to_member_id: member.id,
            assignment_id: fresh.id,
            reason,
        });
        Ok((member, fresh))
    }

    // -----------------------------------------------------------------------
    // Escalation
    // -----------------------------------------------------------------------

    /// Raise an assignment to `level`, clamped to the configured maximum.
    ///
    /// Reaching the maximum only flags the assignment. Below it, the lead
    /// goes to the least recently assigned active manager of the department
    /// when there is one, otherwise the assignment is escalated in place.
    pub async fn escalate_lead(&self, assignment_id: Uuid, level: u8) -> Result<EscalationOutcome> {
        let lead_id = self.tracker.get(assignment_id).await?.lead_id;
        let _guard = self.lead_locks.lock(lead_id).await;
        let current = self.tracker.get(assignment_id).await?;

        if current.status.is_terminal() {
            return Err(LeadFlowError::AlreadyTerminal {
                entity: "assignment",
                id: current.id,
                status: current.status.to_string(),
            });
        }

        let max = self.escalation.max_level;
        let level = level.min(max);
        if level <= current.escalation_level || current.escalation_level >= max {
            tracing::debug!(
                assignment_id = %assignment_id,
                current = current.escalation_level,
                requested = level,
                "escalation not needed"
            );
            return Ok(EscalationOutcome {
                escalated: false,
                reassigned: false,
                assignment: current,
            });
        }

        if level >= max {
            let flagged = self.tracker.flag_for_intervention(&current, level).await?;
            tracing::warn!(
                assignment_id = %assignment_id,
                lead_id = %lead_id,
                level,
                "assignment flagged for intervention"
            );
            self.sink.emit(NotificationEvent::EscalationFlagged {
                assignment_id,
                lead_id,
                member_id: flagged.member_id,
            });
            return Ok(EscalationOutcome {
                escalated: true,
                reassigned: false,
                assignment: flagged,
            });
        }

        let lead = self.load_lead(lead_id).await?;
        let holder = self.directory.get_member(current.member_id).await?;
        let manager = self
            .directory
            .escalation_manager(holder.department, holder.id)
            .await?;

        let (assignment, reassigned) = match manager {
            Some(manager) => {
                let (_, fresh) = self
                    .move_lead(&lead, &current, &manager, ReassignReason::Escalation, None, level)
                    .await?;
                (fresh, true)
            }
            None => {
                let escalated = self
                    .tracker
                    .escalate_in_place(&current, level, &lead, holder.department)
                    .await?;
                (escalated, false)
            }
        };

        tracing::info!(
            assignment_id = %assignment.id,
            lead_id = %lead_id,
            level,
            reassigned,
            "assignment escalated"
        );
        self.sink.emit(NotificationEvent::AssignmentEscalated {
            assignment_id: assignment.id,
            lead_id,
            level,
            member_id: assignment.member_id,
        });
        Ok(EscalationOutcome {
            escalated: true,
            reassigned,
            assignment,
        })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn live_assignment(&self, lead_id: Uuid) -> Result<Option<Assignment>> {
        let history = self.tracker.history_for_lead(lead_id).await?;
        Ok(history.into_iter().rev().find(|a| a.status.is_live()))
    }

    async fn load_lead(&self, lead_id: Uuid) -> Result<Lead> {
        self.store
            .get_lead(lead_id)
            .await?
            .ok_or(LeadFlowError::LeadNotFound(lead_id))
    }
}
