use uuid::Uuid;

use crate::pipeline::DealStage;
use crate::types::Department;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Failures raised by a [`LeadStore`](crate::store::LeadStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),

    #[error("codec: {0}")]
    Codec(String),

    /// The stored row changed since the caller read it.
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: Uuid },
}

impl StoreError {
    /// Busy/locked SQLite databases are contention, not corruption.
    pub fn is_contention(&self) -> bool {
        match self {
            StoreError::Conflict { .. } => true,
            StoreError::Sqlite(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(
                err,
                _,
            ))) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// LeadFlowError
// ---------------------------------------------------------------------------

/// Every failure the routing, assignment and pipeline operations report.
///
/// None of these are retried internally. [`LeadFlowError::is_retryable`]
/// tells the caller which ones are safe to retry as a whole operation.
#[derive(Debug, thiserror::Error)]
pub enum LeadFlowError {
    #[error("team member not found: {0}")]
    MemberNotFound(Uuid),

    #[error("team member {0} is inactive")]
    MemberInactive(Uuid),

    /// Carries the assignment id, or the lead id when looking up a lead's
    /// current assignment.
    #[error("assignment not found: {0}")]
    AssignmentNotFound(Uuid),

    #[error("deal not found: {0}")]
    DealNotFound(Uuid),

    #[error("lead not found: {0}")]
    LeadNotFound(Uuid),

    /// The lead already has a live assignment; move it with a reassignment.
    #[error("lead {lead_id} is already assigned ({assignment_id})")]
    LeadAlreadyAssigned { lead_id: Uuid, assignment_id: Uuid },

    #[error("no available team member in {0}")]
    NoAvailableMember(Department),

    #[error("stage '{stage}' is not part of the {department} pipeline")]
    InvalidStage { stage: String, department: Department },

    #[error("deal is already at the final stage ({stage})")]
    AlreadyFinalStage { stage: DealStage },

    #[error("{entity} {id} is already {status}")]
    AlreadyTerminal {
        entity: &'static str,
        id: Uuid,
        status: String,
    },

    #[error("cannot move {entity} {id} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: Uuid,
        from: String,
        to: String,
    },

    #[error("deal {0} is paused")]
    DealPaused(Uuid),

    #[error("concurrent update: {0}")]
    ConcurrentUpdate(String),

    #[error("store: {0}")]
    Store(#[source] StoreError),
}

impl LeadFlowError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LeadFlowError::MemberNotFound(_)
                | LeadFlowError::AssignmentNotFound(_)
                | LeadFlowError::DealNotFound(_)
                | LeadFlowError::LeadNotFound(_)
        )
    }

    /// Only contention is worth retrying; every other failure is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LeadFlowError::ConcurrentUpdate(_))
    }
}

impl From<StoreError> for LeadFlowError {
    fn from(err: StoreError) -> Self {
        if err.is_contention() {
            LeadFlowError::ConcurrentUpdate(err.to_string())
        } else {
            LeadFlowError::Store(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, LeadFlowError>;
