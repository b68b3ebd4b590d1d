use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use lf_core::types::AssignmentStatus;
use lf_engine::LeadFlow;

/// Outcome of one pass over the overdue assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Assignments past their response deadline when the sweep started.
    pub overdue: usize,
    /// Assignments whose level was raised, including the two counts below.
    pub escalated: usize,
    /// Escalations that moved the lead to a manager.
    pub reassigned: usize,
    /// Escalations that reached the top level and now wait on a person.
    pub flagged: usize,
    /// Escalations that errored; the assignment is retried next sweep.
    pub failed: usize,
    /// The overdue assignment ids, in deadline order.
    pub ids: Vec<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// Raises every overdue assignment by one escalation level.
#[derive(Clone)]
pub struct EscalationSweep {
    flow: LeadFlow,
}

impl EscalationSweep {
    pub fn new(flow: LeadFlow) -> Self {
        Self { flow }
    }

    pub async fn run_sweep(&self) -> Result<SweepReport> {
        let started = Utc::now();
        debug!("escalation sweep starting");

        let overdue = self
            .flow
            .sweep_overdue_assignments()
            .await
            .context("failed to list overdue assignments")?;

        let mut report = SweepReport {
            overdue: overdue.len(),
            ids: overdue.iter().map(|a| a.id).collect(),
            timestamp: started,
            ..SweepReport::default()
        };

        let max = self.flow.max_escalation_level();
        for assignment in overdue {
            if assignment.escalation_level >= max {
                continue;
            }
            let next = assignment.escalation_level + 1;
            match self.flow.escalate_assignment(assignment.id, next).await {
                Ok(out) if out.escalated => {
                    report.escalated += 1;
                    if out.reassigned {
                        report.reassigned += 1;
                    }
                    if out.assignment.status == AssignmentStatus::Escalated {
                        report.flagged += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        assignment_id = %assignment.id,
                        level = next,
                        error = %e,
                        "escalation failed during sweep"
                    );
                }
            }
        }

        if report.overdue > 0 {
            info!(
                overdue = report.overdue,
                escalated = report.escalated,
                reassigned = report.reassigned,
                flagged = report.flagged,
                failed = report.failed,
                "escalation sweep completed"
            );
        } else {
            debug!("escalation sweep found nothing overdue");
        }
        Ok(report)
    }
}
