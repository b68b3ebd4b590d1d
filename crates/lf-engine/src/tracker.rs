use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use lf_core::clock::Clock;
use lf_core::config::{RoutingConfig, SlaConfig};
use lf_core::error::{LeadFlowError, Result};
use lf_core::locks::KeyedLocks;
use lf_core::store::LeadStore;
use lf_core::types::{
    Assignment, AssignmentReason, AssignmentStatus, Department, Lead, Priority, TeamMember,
};

use crate::directory::TeamDirectory;

/// Owns the assignment lifecycle: SLA deadlines, contact tracking,
/// completion and overdue detection.
///
/// Status changes on one assignment are serialised through a per-assignment
/// lock and land through the store's versioned update.
#[derive(Clone)]
pub struct AssignmentTracker {
    store: Arc<dyn LeadStore>,
    directory: TeamDirectory,
    clock: Arc<dyn Clock>,
    routing: RoutingConfig,
    sla: SlaConfig,
    locks: Arc<KeyedLocks>,
}

impl AssignmentTracker {
    pub fn new(
        store: Arc<dyn LeadStore>,
        directory: TeamDirectory,
        clock: Arc<dyn Clock>,
        routing: RoutingConfig,
        sla: SlaConfig,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            routing,
            sla,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    // -----------------------------------------------------------------------
    // SLA rules
    // -----------------------------------------------------------------------

    /// How long the member has to make first contact.
    pub fn response_window(&self, department: Department, score: u8) -> Duration {
        let hours =
            self.sla
                .window_hours(department, score, self.routing.urgent_score_threshold);
        Duration::hours(i64::from(hours))
    }

    pub fn response_deadline(
        &self,
        department: Department,
        score: u8,
        from: DateTime<Utc>,
    ) -> DateTime<Utc> {
        from + self.response_window(department, score)
    }

    /// Urgent for hot scores, high for deal-worthy ones. Anything escalated
    /// is at least high.
    pub fn priority_for(&self, score: u8, escalation_level: u8) -> Priority {
        let base = if score >= self.routing.urgent_score_threshold {
            Priority::Urgent
        } else if score >= self.routing.hot_lead_threshold {
            Priority::High
        } else {
            Priority::Normal
        };
        if escalation_level > 0 {
            base.max(Priority::High)
        } else {
            base
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn get(&self, id: Uuid) -> Result<Assignment> {
        self.store
            .get_assignment(id)
            .await?
            .ok_or(LeadFlowError::AssignmentNotFound(id))
    }

    /// Every assignment the lead has had, oldest first.
    pub async fn history_for_lead(&self, lead_id: Uuid) -> Result<Vec<Assignment>> {
        Ok(self.store.list_assignments_for_lead(lead_id).await?)
    }

    /// The live assignment for a lead, or its most recent one when none is
    /// live. `AssignmentNotFound(lead_id)` when the lead was never assigned.
    pub async fn current_for_lead(&self, lead_id: Uuid) -> Result<Assignment> {
        let history = self.history_for_lead(lead_id).await?;
        let live = history.iter().rev().find(|a| a.status.is_live()).cloned();
        live.or_else(|| history.last().cloned())
            .ok_or(LeadFlowError::AssignmentNotFound(lead_id))
    }

    /// Assignments nobody acknowledged before their deadline, earliest
    /// deadline first.
    pub async fn sweep_overdue(&self) -> Result<Vec<Assignment>> {
        let now = self.clock.now();
        let mut overdue: Vec<Assignment> = self
            .store
            .list_assignments_by_status(AssignmentStatus::Assigned)
            .await?
            .into_iter()
            .filter(|a| a.is_overdue(now))
            .collect();
        overdue.sort_by_key(|a| (a.response_deadline, a.id));
        if !overdue.is_empty() {
            tracing::info!(count = overdue.len(), "overdue assignments found");
        }
        Ok(overdue)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Record a new assignment of `lead` to `member`.
    ///
    /// Member load is not touched here; the caller owns that bookkeeping.
    pub async fn create(
        &self,
        lead: &Lead,
        member: &TeamMember,
        reason: AssignmentReason,
        assigned_by: Option<Uuid>,
        escalation_level: u8,
    ) -> Result<Assignment> {
        let now = self.clock.now();
        let deadline = self.response_deadline(member.department, lead.lead_score, now);
        let priority = self.priority_for(lead.lead_score, escalation_level);

        let mut assignment = Assignment::new(lead.id, member.id, reason, priority, deadline, now);
        assignment.assigned_by = assigned_by;
        assignment.escalation_level = escalation_level;
        if reason == AssignmentReason::Escalation {
            assignment.escalated_at = Some(now);
        }
        self.store.insert_assignment(&assignment).await?;

        tracing::info!(
            assignment_id = %assignment.id,
            lead_id = %lead.id,
            member_id = %member.id,
            ?reason,
            ?priority,
            deadline = %deadline,
            "assignment created"
        );
        Ok(assignment)
    }

    pub async fn accept(&self, id: Uuid) -> Result<Assignment> {
        let _guard = self.locks.lock(id).await;
        let mut assignment = self.get(id).await?;
        check_transition(&assignment, AssignmentStatus::Accepted)?;

        assignment.status = AssignmentStatus::Accepted;
        assignment.updated_at = self.clock.now();
        let assignment = self.store.update_assignment(&assignment).await?;
        tracing::info!(assignment_id = %id, "assignment accepted");
        Ok(assignment)
    }

    /// Log a contact attempt. The first one moves the assignment to
    /// `in_progress`.
    pub async fn mark_contacted(&self, id: Uuid) -> Result<Assignment> {
        let _guard = self.locks.lock(id).await;
        let mut assignment = self.get(id).await?;
        if assignment.status.is_terminal() {
            return Err(already_terminal(&assignment));
        }

        let now = self.clock.now();
        assignment.contact_attempts += 1;
        assignment.first_contacted_at.get_or_insert(now);
        assignment.last_contacted_at = Some(now);
        if matches!(
            assignment.status,
            AssignmentStatus::Assigned | AssignmentStatus::Accepted
        ) {
            assignment.status = AssignmentStatus::InProgress;
        }
        assignment.updated_at = now;

        let assignment = self.store.update_assignment(&assignment).await?;
        tracing::info!(
            assignment_id = %id,
            attempts = assignment.contact_attempts,
            "contact attempt recorded"
        );
        Ok(assignment)
    }

    /// Close the assignment and free one unit of the member's load.
    pub async fn complete(&self, id: Uuid) -> Result<Assignment> {
        let _guard = self.locks.lock(id).await;
        let mut assignment = self.get(id).await?;
        check_transition(&assignment, AssignmentStatus::Completed)?;

        let now = self.clock.now();
        assignment.status = AssignmentStatus::Completed;
        assignment.completed_at = Some(now);
        assignment.updated_at = now;
        let assignment = self.store.update_assignment(&assignment).await?;

        if let Err(e) = self.directory.release_lead(assignment.member_id).await {
            tracing::warn!(
                member_id = %assignment.member_id,
                error = %e,
                "could not release member load"
            );
        }
        tracing::info!(assignment_id = %id, "assignment completed");
        Ok(assignment)
    }

    // -----------------------------------------------------------------------
    // Used by the router while it holds the lead lock
    // -----------------------------------------------------------------------

    pub(crate) async fn mark_reassigned(&self, current: &Assignment) -> Result<Assignment> {
        let _guard = self.locks.lock(current.id).await;
        check_transition(current, AssignmentStatus::Reassigned)?;

        let mut assignment = current.clone();
        assignment.status = AssignmentStatus::Reassigned;
        assignment.updated_at = self.clock.now();
        Ok(self.store.update_assignment(&assignment).await?)
    }

    /// Undo [`mark_reassigned`](Self::mark_reassigned) when the replacement
    /// could not be written. `retired` is the record that call returned.
    pub(crate) async fn restore_status(&self, retired: &Assignment, status: AssignmentStatus) {
        let _guard = self.locks.lock(retired.id).await;
        let mut assignment = retired.clone();
        assignment.status = status;
        assignment.updated_at = self.clock.now();
        match self.store.update_assignment(&assignment).await {
            Ok(_) => tracing::warn!(
                assignment_id = %retired.id,
                %status,
                "reassignment rolled back"
            ),
            Err(e) => tracing::error!(
                assignment_id = %retired.id,
                error = %e,
                "could not roll back reassignment; lead has no live assignment"
            ),
        }
    }

    /// Raise the level without moving the lead. The deadline is pushed out by
    /// a fresh response window and never pulled in.
    pub(crate) async fn escalate_in_place(
        &self,
        current: &Assignment,
        level: u8,
        lead: &Lead,
        department: Department,
    ) -> Result<Assignment> {
        let _guard = self.locks.lock(current.id).await;
        if current.status.is_terminal() {
            return Err(already_terminal(current));
        }

        let now = self.clock.now();
        let mut assignment = current.clone();
        assignment.escalation_level = level;
        assignment.priority = Priority::Urgent;
        assignment.escalated_at = Some(now);
        assignment.response_deadline = assignment
            .response_deadline
            .max(self.response_deadline(department, lead.lead_score, now));
        assignment.updated_at = now;
        Ok(self.store.update_assignment(&assignment).await?)
    }

    /// Park the assignment at the top level for a human to pick up.
    pub(crate) async fn flag_for_intervention(
        &self,
        current: &Assignment,
        level: u8,
    ) -> Result<Assignment> {
        let _guard = self.locks.lock(current.id).await;
        check_transition(current, AssignmentStatus::Escalated)?;

        let now = self.clock.now();
        let mut assignment = current.clone();
        assignment.status = AssignmentStatus::Escalated;
        assignment.escalation_level = level;
        assignment.priority = Priority::Urgent;
        assignment.escalated_at = Some(now);
        assignment.updated_at = now;
        Ok(self.store.update_assignment(&assignment).await?)
    }
}

fn already_terminal(assignment: &Assignment) -> LeadFlowError {
    LeadFlowError::AlreadyTerminal {
        entity: "assignment",
        id: assignment.id,
        status: assignment.status.to_string(),
    }
}

fn check_transition(assignment: &Assignment, target: AssignmentStatus) -> Result<()> {
    if assignment.status.is_terminal() {
        return Err(already_terminal(assignment));
    }
    if !assignment.status.can_transition_to(&target) {
        return Err(LeadFlowError::InvalidTransition {
            entity: "assignment",
            id: assignment.id,
            from: assignment.status.to_string(),
            to: target.to_string(),
        });
    }
    Ok(())
}
