use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::DealStage;

// ---------------------------------------------------------------------------
// Department
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Insurance,
    Recruiting,
}

impl Department {
    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Insurance => "insurance",
            Department::Recruiting => "recruiting",
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TeamMember
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Agent,
    Recruiter,
    Manager,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub department: Department,
    pub role: MemberRole,
    pub territories: BTreeSet<String>,
    pub specializations: BTreeSet<String>,
    pub is_active: bool,
    /// Maximum open leads; `0` means unlimited.
    pub lead_cap: u32,
    pub current_lead_count: u32,
    pub last_assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TeamMember {
    pub fn new(name: impl Into<String>, department: Department, role: MemberRole) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: None,
            department,
            role,
            territories: BTreeSet::new(),
            specializations: BTreeSet::new(),
            is_active: true,
            lead_cap: 0,
            current_lead_count: 0,
            last_assigned_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_lead_cap(mut self, cap: u32) -> Self {
        self.lead_cap = cap;
        self
    }

    pub fn with_territories<I, S>(mut self, territories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.territories = territories.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_manager(&self) -> bool {
        self.role == MemberRole::Manager
    }

    /// Returns `true` while the member can take another lead.
    pub fn has_capacity(&self) -> bool {
        self.lead_cap == 0 || self.current_lead_count < self.lead_cap
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Website,
    Referral,
    SocialMedia,
    PaidAd,
    Event,
    Recruiting,
    #[serde(other)]
    Other,
}

impl LeadSource {
    /// Recruiting-sourced leads go to the recruiting team, everything else
    /// to insurance.
    pub fn department(&self) -> Department {
        match self {
            LeadSource::Recruiting => Department::Recruiting,
            _ => Department::Insurance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub source: LeadSource,
    pub lead_score: u8,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(name: impl Into<String>, source: LeadSource, lead_score: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source,
            lead_score: lead_score.min(100),
            phone: None,
            email: None,
            interests: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_interests<I, S>(mut self, interests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interests = interests.into_iter().map(Into::into).collect();
        self
    }

    pub fn department(&self) -> Department {
        self.source.department()
    }

    pub fn has_phone(&self) -> bool {
        self.phone.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Assignment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentReason {
    Territory,
    RoundRobin,
    Manual,
    Escalation,
}

/// Why a lead is being moved to someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReassignReason {
    Manual,
    Escalation,
}

impl From<ReassignReason> for AssignmentReason {
    fn from(reason: ReassignReason) -> Self {
        match reason {
            ReassignReason::Manual => AssignmentReason::Manual,
            ReassignReason::Escalation => AssignmentReason::Escalation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    Accepted,
    InProgress,
    Completed,
    Reassigned,
    /// Flagged at the top escalation level; waiting on a human.
    Escalated,
}

impl AssignmentStatus {
    /// Returns `true` when a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &AssignmentStatus) -> bool {
        use AssignmentStatus::*;
        matches!(
            (self, target),
            (Assigned, Accepted)
                | (Assigned, InProgress)
                | (Accepted, InProgress)
                | (Assigned, Completed)
                | (Accepted, Completed)
                | (InProgress, Completed)
                | (Escalated, Completed)
                | (Assigned, Reassigned)
                | (Accepted, Reassigned)
                | (InProgress, Reassigned)
                | (Escalated, Reassigned)
                | (Assigned, Escalated)
                | (Accepted, Escalated)
                | (InProgress, Escalated)
        )
    }

    /// A live assignment still owns its lead.
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AssignmentStatus::Completed | AssignmentStatus::Reassigned)
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::Accepted => "accepted",
            AssignmentStatus::InProgress => "in_progress",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Reassigned => "reassigned",
            AssignmentStatus::Escalated => "escalated",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub member_id: Uuid,
    pub assigned_by: Option<Uuid>,
    pub reason: AssignmentReason,
    pub priority: Priority,
    pub status: AssignmentStatus,
    pub response_deadline: DateTime<Utc>,
    pub escalation_level: u8,
    pub contact_attempts: u32,
    pub first_contacted_at: Option<DateTime<Utc>>,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every successful update.
    pub version: u64,
}

impl Assignment {
    pub fn new(
        lead_id: Uuid,
        member_id: Uuid,
        reason: AssignmentReason,
        priority: Priority,
        response_deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            member_id,
            assigned_by: None,
            reason,
            priority,
            status: AssignmentStatus::Assigned,
            response_deadline,
            escalation_level: 0,
            contact_attempts: 0,
            first_contacted_at: None,
            last_contacted_at: None,
            escalated_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Overdue means nobody picked it up before the deadline.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == AssignmentStatus::Assigned && self.response_deadline < now
    }
}

// ---------------------------------------------------------------------------
// Deal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Active,
    Won,
    Lost,
    Paused,
}

impl DealStatus {
    pub fn is_closed(&self) -> bool {
        matches!(self, DealStatus::Won | DealStatus::Lost)
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DealStatus::Active => "active",
            DealStatus::Won => "won",
            DealStatus::Lost => "lost",
            DealStatus::Paused => "paused",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageHistoryEntry {
    pub stage: DealStage,
    pub timestamp: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub member_id: Uuid,
    pub department: Department,
    pub stage: DealStage,
    pub value: f64,
    pub priority: Priority,
    pub stage_history: Vec<StageHistoryEntry>,
    pub next_followup_at: Option<DateTime<Utc>>,
    pub status: DealStatus,
    pub onboarding_triggered_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Deal {
    /// A fresh deal sitting in the first stage of its department's pipeline.
    pub fn new(
        lead_id: Uuid,
        member_id: Uuid,
        department: Department,
        value: f64,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Self {
        let pipeline = department.pipeline();
        let stage = pipeline.first_stage();
        Self {
            id: Uuid::new_v4(),
            lead_id,
            member_id,
            department,
            stage,
            value,
            priority,
            stage_history: vec![StageHistoryEntry {
                stage,
                timestamp: now,
                notes: None,
            }],
            next_followup_at: pipeline.followup_after(stage, now),
            status: DealStatus::Active,
            onboarding_triggered_at: None,
            closed_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// RoutingCounter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingType {
    RoundRobin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterKey {
    pub department: Department,
    pub routing_type: RoutingType,
}

impl CounterKey {
    pub fn round_robin(department: Department) -> Self {
        Self {
            department,
            routing_type: RoutingType::RoundRobin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingCounter {
    pub department: Department,
    pub routing_type: RoutingType,
    pub last_assigned_member_id: Option<Uuid>,
    pub assignment_count: u64,
    pub reset_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl RoutingCounter {
    pub fn new(key: CounterKey, now: DateTime<Utc>) -> Self {
        Self {
            department: key.department,
            routing_type: key.routing_type,
            last_assigned_member_id: None,
            assignment_count: 0,
            reset_at: None,
            updated_at: now,
        }
    }

    pub fn key(&self) -> CounterKey {
        CounterKey {
            department: self.department,
            routing_type: self.routing_type,
        }
    }
}
