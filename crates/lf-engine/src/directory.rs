use std::cmp::Ordering;
use std::sync::Arc;

use uuid::Uuid;

use lf_core::clock::Clock;
use lf_core::error::{LeadFlowError, Result};
use lf_core::rotation;
use lf_core::store::LeadStore;
use lf_core::types::{Department, TeamMember};

/// Team roster and per-member load bookkeeping.
#[derive(Clone)]
pub struct TeamDirectory {
    store: Arc<dyn LeadStore>,
    clock: Arc<dyn Clock>,
}

impl TeamDirectory {
    pub fn new(store: Arc<dyn LeadStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn add_member(&self, member: TeamMember) -> Result<TeamMember> {
        self.store.put_member(&member).await?;
        tracing::info!(
            member_id = %member.id,
            department = %member.department,
            "team member added"
        );
        Ok(member)
    }

    pub async fn get_member(&self, id: Uuid) -> Result<TeamMember> {
        self.store
            .get_member(id)
            .await?
            .ok_or(LeadFlowError::MemberNotFound(id))
    }

    /// Like [`get_member`](Self::get_member) but rejects inactive members.
    pub async fn get_active_member(&self, id: Uuid) -> Result<TeamMember> {
        let member = self.get_member(id).await?;
        if !member.is_active {
            return Err(LeadFlowError::MemberInactive(id));
        }
        Ok(member)
    }

    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<TeamMember> {
        let mut member = self.get_member(id).await?;
        member.is_active = active;
        member.updated_at = self.clock.now();
        self.store.put_member(&member).await?;
        tracing::info!(member_id = %id, active, "team member availability changed");
        Ok(member)
    }

    pub async fn members(&self, department: Department) -> Result<Vec<TeamMember>> {
        Ok(self.store.list_members(department).await?)
    }

    /// Active members with spare capacity, in rotation order.
    pub async fn routing_candidates(&self, department: Department) -> Result<Vec<TeamMember>> {
        let members = self.store.list_members(department).await?;
        Ok(rotation::order_candidates(members))
    }

    /// The least recently assigned active manager in `department`, other than
    /// `exclude`.
    pub async fn escalation_manager(
        &self,
        department: Department,
        exclude: Uuid,
    ) -> Result<Option<TeamMember>> {
        let mut managers: Vec<TeamMember> = self
            .store
            .list_members(department)
            .await?
            .into_iter()
            .filter(|m| m.is_active && m.is_manager() && m.id != exclude)
            .collect();
        managers.sort_by(|a, b| match (a.last_assigned_at, b.last_assigned_at) {
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (x, y) => x.cmp(&y).then(a.created_at.cmp(&b.created_at)),
        });
        Ok(managers.into_iter().next())
    }

    /// One more open lead for `id`, stamped as its most recent assignment.
    pub async fn record_assignment(&self, id: Uuid) -> Result<TeamMember> {
        let now = self.clock.now();
        self.store
            .adjust_member_load(id, 1, Some(now), now)
            .await?
            .ok_or(LeadFlowError::MemberNotFound(id))
    }

    /// One fewer open lead for `id`; never drops below zero.
    pub async fn release_lead(&self, id: Uuid) -> Result<TeamMember> {
        let now = self.clock.now();
        self.store
            .adjust_member_load(id, -1, None, now)
            .await?
            .ok_or(LeadFlowError::MemberNotFound(id))
    }
}
