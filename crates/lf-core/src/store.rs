use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::{
    Assignment, AssignmentStatus, CounterKey, Deal, Department, Lead, RoutingCounter, TeamMember,
};

/// Persistence seam for everything the routing core reads and writes.
///
/// Versioned updates (`update_assignment`, `update_deal`) are
/// compare-and-swap: the write only lands when the stored `version` equals
/// the caller's, and the returned record carries the bumped version.
/// Otherwise the store reports [`StoreError::Conflict`](crate::error::StoreError::Conflict).
#[async_trait]
pub trait LeadStore: Send + Sync {
    // --- team members ---
    async fn put_member(&self, member: &TeamMember) -> StoreResult<()>;
    async fn get_member(&self, id: Uuid) -> StoreResult<Option<TeamMember>>;
    async fn list_members(&self, department: Department) -> StoreResult<Vec<TeamMember>>;

    /// Atomically add `delta` to a member's load, clamping at zero, and stamp
    /// `last_assigned_at` when given. Returns `None` for unknown members.
    async fn adjust_member_load(
        &self,
        id: Uuid,
        delta: i32,
        assigned_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<TeamMember>>;

    // --- leads ---
    async fn put_lead(&self, lead: &Lead) -> StoreResult<()>;
    async fn get_lead(&self, id: Uuid) -> StoreResult<Option<Lead>>;

    // --- assignments ---
    async fn insert_assignment(&self, assignment: &Assignment) -> StoreResult<()>;
    async fn get_assignment(&self, id: Uuid) -> StoreResult<Option<Assignment>>;
    async fn update_assignment(&self, assignment: &Assignment) -> StoreResult<Assignment>;
    /// All assignments for a lead, oldest first.
    async fn list_assignments_for_lead(&self, lead_id: Uuid) -> StoreResult<Vec<Assignment>>;
    async fn list_assignments_by_status(
        &self,
        status: AssignmentStatus,
    ) -> StoreResult<Vec<Assignment>>;

    // --- deals ---
    async fn insert_deal(&self, deal: &Deal) -> StoreResult<()>;
    async fn get_deal(&self, id: Uuid) -> StoreResult<Option<Deal>>;
    async fn update_deal(&self, deal: &Deal) -> StoreResult<Deal>;
    async fn list_deals_for_lead(&self, lead_id: Uuid) -> StoreResult<Vec<Deal>>;

    // --- routing counters ---
    async fn get_counter(&self, key: CounterKey) -> StoreResult<Option<RoutingCounter>>;

    /// Pick the next member in rotation and move the pointer to them, as one
    /// atomic step. See [`crate::rotation::next_after`] for the selection rule.
    async fn advance_rotation(
        &self,
        key: CounterKey,
        candidates: &[Uuid],
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>>;

    async fn reset_counter(&self, key: CounterKey, now: DateTime<Utc>) -> StoreResult<()>;
}
