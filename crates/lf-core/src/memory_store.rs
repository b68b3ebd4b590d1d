use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::rotation;
use crate::store::LeadStore;
use crate::types::{
    Assignment, AssignmentStatus, CounterKey, Deal, Department, Lead, RoutingCounter, TeamMember,
};

/// In-process [`LeadStore`] backed by sharded maps.
///
/// Every mutation happens while holding the shard lock for its key, which is
/// what makes `advance_rotation` and the versioned updates atomic. No lock is
/// held across an `.await`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    members: DashMap<Uuid, TeamMember>,
    leads: DashMap<Uuid, Lead>,
    assignments: DashMap<Uuid, Assignment>,
    deals: DashMap<Uuid, Deal>,
    counters: DashMap<CounterKey, RoutingCounter>,
    /// Insertion order of assignments and deals, the in-memory `rowid`.
    inserted: DashMap<Uuid, u64>,
    next_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_insert(&self, id: Uuid) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.inserted.entry(id).or_insert(seq);
    }

    fn seq_of(&self, id: Uuid) -> u64 {
        self.inserted.get(&id).map(|s| *s).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn put_member(&self, member: &TeamMember) -> StoreResult<()> {
        self.members.insert(member.id, member.clone());
        Ok(())
    }

    async fn get_member(&self, id: Uuid) -> StoreResult<Option<TeamMember>> {
        Ok(self.members.get(&id).map(|m| m.clone()))
    }

    async fn list_members(&self, department: Department) -> StoreResult<Vec<TeamMember>> {
        let mut out: Vec<TeamMember> = self
            .members
            .iter()
            .filter(|m| m.department == department)
            .map(|m| m.clone())
            .collect();
        out.sort_by_key(|m| (m.created_at, m.id));
        Ok(out)
    }

    async fn adjust_member_load(
        &self,
        id: Uuid,
        delta: i32,
        assigned_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<TeamMember>> {
        let Some(mut member) = self.members.get_mut(&id) else {
            return Ok(None);
        };
        member.current_lead_count = member.current_lead_count.saturating_add_signed(delta);
        if assigned_at.is_some() {
            member.last_assigned_at = assigned_at;
        }
        member.updated_at = now;
        Ok(Some(member.clone()))
    }

    async fn put_lead(&self, lead: &Lead) -> StoreResult<()> {
        self.leads.insert(lead.id, lead.clone());
        Ok(())
    }

    async fn get_lead(&self, id: Uuid) -> StoreResult<Option<Lead>> {
        Ok(self.leads.get(&id).map(|l| l.clone()))
    }

    async fn insert_assignment(&self, assignment: &Assignment) -> StoreResult<()> {
        self.assignments.insert(assignment.id, assignment.clone());
        self.record_insert(assignment.id);
        Ok(())
    }

    async fn get_assignment(&self, id: Uuid) -> StoreResult<Option<Assignment>> {
        Ok(self.assignments.get(&id).map(|a| a.clone()))
    }

    async fn update_assignment(&self, assignment: &Assignment) -> StoreResult<Assignment> {
        let conflict = StoreError::Conflict {
            entity: "assignment",
            id: assignment.id,
        };
        let Some(mut stored) = self.assignments.get_mut(&assignment.id) else {
            return Err(conflict);
        };
        if stored.version != assignment.version {
            return Err(conflict);
        }
        let mut next = assignment.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn list_assignments_for_lead(&self, lead_id: Uuid) -> StoreResult<Vec<Assignment>> {
        let mut out: Vec<Assignment> = self
            .assignments
            .iter()
            .filter(|a| a.lead_id == lead_id)
            .map(|a| a.clone())
            .collect();
        out.sort_by_key(|a| (a.created_at, self.seq_of(a.id)));
        Ok(out)
    }

    async fn list_assignments_by_status(
        &self,
        status: AssignmentStatus,
    ) -> StoreResult<Vec<Assignment>> {
        let mut out: Vec<Assignment> = self
            .assignments
            .iter()
            .filter(|a| a.status == status)
            .map(|a| a.clone())
            .collect();
        out.sort_by_key(|a| a.response_deadline);
        Ok(out)
    }

    async fn insert_deal(&self, deal: &Deal) -> StoreResult<()> {
        self.deals.insert(deal.id, deal.clone());
        self.record_insert(deal.id);
        Ok(())
    }

    async fn get_deal(&self, id: Uuid) -> StoreResult<Option<Deal>> {
        Ok(self.deals.get(&id).map(|d| d.clone()))
    }

    async fn update_deal(&self, deal: &Deal) -> StoreResult<Deal> {
        let conflict = StoreError::Conflict {
            entity: "deal",
            id: deal.id,
        };
        let Some(mut stored) = self.deals.get_mut(&deal.id) else {
            return Err(conflict);
        };
        if stored.version != deal.version {
            return Err(conflict);
        }
        let mut next = deal.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn list_deals_for_lead(&self, lead_id: Uuid) -> StoreResult<Vec<Deal>> {
        let mut out: Vec<Deal> = self
            .deals
            .iter()
            .filter(|d| d.lead_id == lead_id)
            .map(|d| d.clone())
            .collect();
        out.sort_by_key(|d| (d.created_at, self.seq_of(d.id)));
        Ok(out)
    }

    async fn get_counter(&self, key: CounterKey) -> StoreResult<Option<RoutingCounter>> {
        Ok(self.counters.get(&key).map(|c| c.clone()))
    }

    async fn advance_rotation(
        &self,
        key: CounterKey,
        candidates: &[Uuid],
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>> {
        let mut counter = self
            .counters
            .entry(key)
            .or_insert_with(|| RoutingCounter::new(key, now));
        let selected = rotation::next_after(candidates, counter.last_assigned_member_id);
        if let Some(id) = selected {
            counter.last_assigned_member_id = Some(id);
            counter.assignment_count += 1;
            counter.updated_at = now;
        }
        Ok(selected)
    }

    async fn reset_counter(&self, key: CounterKey, now: DateTime<Utc>) -> StoreResult<()> {
        let mut counter = self
            .counters
            .entry(key)
            .or_insert_with(|| RoutingCounter::new(key, now));
        counter.last_assigned_member_id = None;
        counter.assignment_count = 0;
        counter.reset_at = Some(now);
        counter.updated_at = now;
        Ok(())
    }
}
