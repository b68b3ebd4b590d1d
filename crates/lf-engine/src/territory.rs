use uuid::Uuid;

use lf_core::types::{Lead, TeamMember};

/// Picks a member by territory before round-robin gets a turn.
///
/// `candidates` are already filtered to active members with capacity, in
/// rotation order. Returning `None` falls through to round-robin.
pub trait TerritoryMatcher: Send + Sync {
    fn match_member(&self, lead: &Lead, candidates: &[TeamMember]) -> Option<Uuid>;
}

/// Leads carry no location yet, so nothing ever matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTerritoryMatch;

impl TerritoryMatcher for NoTerritoryMatch {
    fn match_member(&self, _lead: &Lead, _candidates: &[TeamMember]) -> Option<Uuid> {
        None
    }
}
