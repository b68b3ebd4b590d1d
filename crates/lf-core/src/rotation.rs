//! Round-robin fairness.
//!
//! Candidates are ordered longest-idle first. The routing counter remembers
//! who got the previous lead; the next lead goes to whoever follows that
//! member in the ordering, wrapping around. A pointer that no longer names a
//! candidate (deactivated, at capacity) falls back to the first candidate.

use std::cmp::Ordering;

use uuid::Uuid;

use crate::types::TeamMember;

/// Order routable members for rotation.
///
/// Inactive and at-capacity members are dropped. The rest are sorted by
/// `last_assigned_at` ascending (never-assigned members first), then by
/// `created_at`, then by id so the order is total.
pub fn order_candidates(members: Vec<TeamMember>) -> Vec<TeamMember> {
    let mut candidates: Vec<TeamMember> = members
        .into_iter()
        .filter(|m| m.is_active && m.has_capacity())
        .collect();

    candidates.sort_by(|a, b| {
        let idle_ord = match (a.last_assigned_at, b.last_assigned_at) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(&y),
        };
        if idle_ord != Ordering::Equal {
            return idle_ord;
        }
        let created_ord = a.created_at.cmp(&b.created_at);
        if created_ord != Ordering::Equal {
            return created_ord;
        }
        a.id.cmp(&b.id)
    });

    candidates
}

/// The candidate immediately after `pointer`, wrapping around.
///
/// Returns `None` only when there are no candidates.
pub fn next_after(candidates: &[Uuid], pointer: Option<Uuid>) -> Option<Uuid> {
    let first = candidates.first().copied()?;
    let Some(pointer) = pointer else {
        return Some(first);
    };
    match candidates.iter().position(|id| *id == pointer) {
        Some(idx) => Some(candidates[(idx + 1) % candidates.len()]),
        None => Some(first),
    }
}
