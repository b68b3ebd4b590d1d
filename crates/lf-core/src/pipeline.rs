//! Per-department deal pipelines.
//!
//! Each [`Department`] owns a fixed, ordered stage table. Stages belong to a
//! [`Track`]: deals advance step by step along the `Linear` track, leave it
//! only by closing (`Success` or `Lost`), and a won deal continues along the
//! `PostWin` track.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LeadFlowError, Result};
use crate::types::Department;

// ---------------------------------------------------------------------------
// DealStage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStage {
    // shared
    New,
    ClosedLost,

    // insurance
    Engaged,
    ConsultationScheduled,
    ProposalSent,
    ClosedWon,
    Onboarding,
    ActiveClient,

    // recruiting
    Contacted,
    InterviewScheduled,
    OfferExtended,
    EnrolledDistributor,
    Licensing,
    ActiveDistributor,
}

impl DealStage {
    pub const ALL: [DealStage; 14] = [
        DealStage::New,
        DealStage::ClosedLost,
        DealStage::Engaged,
        DealStage::ConsultationScheduled,
        DealStage::ProposalSent,
        DealStage::ClosedWon,
        DealStage::Onboarding,
        DealStage::ActiveClient,
        DealStage::Contacted,
        DealStage::InterviewScheduled,
        DealStage::OfferExtended,
        DealStage::EnrolledDistributor,
        DealStage::Licensing,
        DealStage::ActiveDistributor,
    ];

    /// The display name used by people moving deals around.
    pub fn label(&self) -> &'static str {
        match self {
            DealStage::New => "New",
            DealStage::ClosedLost => "Closed Lost",
            DealStage::Engaged => "Engaged",
            DealStage::ConsultationScheduled => "Consultation Scheduled",
            DealStage::ProposalSent => "Proposal Sent",
            DealStage::ClosedWon => "Closed Won",
            DealStage::Onboarding => "Onboarding",
            DealStage::ActiveClient => "Active Client",
            DealStage::Contacted => "Contacted",
            DealStage::InterviewScheduled => "Interview Scheduled",
            DealStage::OfferExtended => "Offer Extended",
            DealStage::EnrolledDistributor => "Enrolled Distributor",
            DealStage::Licensing => "Licensing",
            DealStage::ActiveDistributor => "Active Distributor",
        }
    }
}

impl fmt::Display for DealStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A stage name that matches no known stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown deal stage: {0}")]
pub struct UnknownStage(pub String);

impl FromStr for DealStage {
    type Err = UnknownStage;

    /// Accepts the display label (`"Proposal Sent"`) or the snake_case form
    /// (`"proposal_sent"`), case-insensitively.
    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = normalize(raw);
        DealStage::ALL
            .iter()
            .copied()
            .find(|stage| normalize(stage.label()) == wanted)
            .ok_or_else(|| UnknownStage(raw.to_string()))
    }
}

fn normalize(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c.to_ascii_lowercase() })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Stage table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    Linear,
    Success,
    Lost,
    PostWin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDef {
    pub stage: DealStage,
    pub description: &'static str,
    /// Hours until the next follow-up is due; `None` means no follow-up.
    pub followup_hours: Option<u32>,
    pub track: Track,
}

const fn stage(
    stage: DealStage,
    description: &'static str,
    followup_hours: Option<u32>,
    track: Track,
) -> StageDef {
    StageDef {
        stage,
        description,
        followup_hours,
        track,
    }
}

static INSURANCE_STAGES: [StageDef; 8] = [
    stage(DealStage::New, "Lead assigned, no conversation yet", Some(24), Track::Linear),
    stage(DealStage::Engaged, "Two-way contact established", Some(48), Track::Linear),
    stage(
        DealStage::ConsultationScheduled,
        "Needs-analysis consultation on the calendar",
        Some(24),
        Track::Linear,
    ),
    stage(DealStage::ProposalSent, "Quote delivered, awaiting decision", Some(72), Track::Linear),
    stage(DealStage::ClosedWon, "Policy sold", Some(24), Track::Success),
    stage(DealStage::ClosedLost, "Prospect declined or went dark", None, Track::Lost),
    stage(DealStage::Onboarding, "Policy paperwork and welcome call", Some(72), Track::PostWin),
    stage(DealStage::ActiveClient, "In force, periodic review", Some(720), Track::PostWin),
];

static RECRUITING_STAGES: [StageDef; 8] = [
    stage(DealStage::New, "Candidate assigned, no conversation yet", Some(24), Track::Linear),
    stage(DealStage::Contacted, "First conversation held", Some(48), Track::Linear),
    stage(
        DealStage::InterviewScheduled,
        "Opportunity interview on the calendar",
        Some(24),
        Track::Linear,
    ),
    stage(DealStage::OfferExtended, "Agreement sent, awaiting signature", Some(72), Track::Linear),
    stage(DealStage::EnrolledDistributor, "Candidate signed on", Some(24), Track::Success),
    stage(DealStage::ClosedLost, "Candidate declined or went dark", None, Track::Lost),
    stage(DealStage::Licensing, "Pre-licensing coursework and exam", Some(168), Track::PostWin),
    stage(DealStage::ActiveDistributor, "Licensed and producing", Some(720), Track::PostWin),
];

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pipeline {
    department: Department,
    stages: &'static [StageDef],
}

impl Department {
    pub fn pipeline(self) -> Pipeline {
        let stages: &'static [StageDef] = match self {
            Department::Insurance => &INSURANCE_STAGES,
            Department::Recruiting => &RECRUITING_STAGES,
        };
        Pipeline {
            department: self,
            stages,
        }
    }
}

impl Pipeline {
    pub fn department(&self) -> Department {
        self.department
    }

    pub fn stages(&self) -> &'static [StageDef] {
        self.stages
    }

    pub fn first_stage(&self) -> DealStage {
        self.stages[0].stage
    }

    pub fn contains(&self, stage: DealStage) -> bool {
        self.def(stage).is_some()
    }

    pub fn def(&self, stage: DealStage) -> Option<&'static StageDef> {
        self.stages.iter().find(|d| d.stage == stage)
    }

    /// Look up a stage, rejecting stages from other pipelines.
    pub fn require(&self, stage: DealStage) -> Result<&'static StageDef> {
        self.def(stage).ok_or_else(|| LeadFlowError::InvalidStage {
            stage: stage.label().to_string(),
            department: self.department,
        })
    }

    /// Parse a stage name and check it belongs to this pipeline.
    pub fn parse_stage(&self, raw: &str) -> Result<DealStage> {
        let stage = raw.parse::<DealStage>().map_err(|e| LeadFlowError::InvalidStage {
            stage: e.0,
            department: self.department,
        })?;
        self.require(stage)?;
        Ok(stage)
    }

    pub fn success_stage(&self) -> DealStage {
        self.first_on(Track::Success)
    }

    pub fn lost_stage(&self) -> DealStage {
        self.first_on(Track::Lost)
    }

    pub fn is_onboarding_trigger(&self, stage: DealStage) -> bool {
        self.def(stage).is_some_and(|d| d.track == Track::Success)
    }

    /// The stage that linear advancement moves to from `current`.
    ///
    /// Linear stages step forward until the last one; the success stage
    /// opens the post-win track. Closing branches are never reached this way.
    pub fn next_stage(&self, current: DealStage) -> Result<DealStage> {
        let def = self.require(current)?;
        let following_track = match def.track {
            Track::Linear => Track::Linear,
            Track::Success | Track::PostWin => Track::PostWin,
            Track::Lost => return Err(LeadFlowError::AlreadyFinalStage { stage: current }),
        };
        let position = self
            .stages
            .iter()
            .position(|d| d.stage == current)
            .unwrap_or_default();
        self.stages[position + 1..]
            .iter()
            .take_while(|d| d.track == following_track || def.track == Track::Success)
            .find(|d| d.track == following_track)
            .map(|d| d.stage)
            .ok_or(LeadFlowError::AlreadyFinalStage { stage: current })
    }

    /// When the next follow-up falls due after entering `stage` at `at`.
    pub fn followup_after(&self, stage: DealStage, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.def(stage)
            .and_then(|d| d.followup_hours)
            .map(|hours| at + Duration::hours(i64::from(hours)))
    }

    fn first_on(&self, track: Track) -> DealStage {
        self.stages
            .iter()
            .find(|d| d.track == track)
            .map(|d| d.stage)
            .unwrap_or_else(|| self.first_stage())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_labels_and_snake_case() {
        assert_eq!("Proposal Sent".parse::<DealStage>().unwrap(), DealStage::ProposalSent);
        assert_eq!("proposal_sent".parse::<DealStage>().unwrap(), DealStage::ProposalSent);
        assert_eq!("  closed   WON ".parse::<DealStage>().unwrap(), DealStage::ClosedWon);
        assert!("Negotiation".parse::<DealStage>().is_err());
    }

    #[test]
    fn every_stage_is_in_some_pipeline() {
        for stage in DealStage::ALL {
            assert!(
                Department::Insurance.pipeline().contains(stage)
                    || Department::Recruiting.pipeline().contains(stage),
                "{stage} is orphaned"
            );
        }
    }
}
