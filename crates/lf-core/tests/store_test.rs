use chrono::{Duration, Utc};
use lf_core::error::StoreError;
use lf_core::memory_store::MemoryStore;
use lf_core::pipeline::DealStage;
use lf_core::sqlite_store::SqliteStore;
use lf_core::store::LeadStore;
use lf_core::types::*;
use uuid::Uuid;

async fn sqlite() -> SqliteStore {
    SqliteStore::new_in_memory().await.expect("open in-memory sqlite")
}

// ---------------------------------------------------------------------------
// Shared contract, run against every backend
// ---------------------------------------------------------------------------

async fn member_roundtrip(store: &dyn LeadStore) {
    let member = TeamMember::new("Rita", Department::Recruiting, MemberRole::Recruiter)
        .with_lead_cap(5)
        .with_territories(["TX", "OK"]);
    store.put_member(&member).await.unwrap();

    let fetched = store.get_member(member.id).await.unwrap().expect("member exists");
    assert_eq!(fetched, member);

    assert_eq!(store.list_members(Department::Recruiting).await.unwrap().len(), 1);
    assert!(store.list_members(Department::Insurance).await.unwrap().is_empty());
    assert!(store.get_member(Uuid::new_v4()).await.unwrap().is_none());
}

async fn load_never_goes_negative(store: &dyn LeadStore) {
    let member = TeamMember::new("Sam", Department::Insurance, MemberRole::Agent);
    store.put_member(&member).await.unwrap();
    let now = Utc::now();

    let m = store
        .adjust_member_load(member.id, 1, Some(now), now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(m.current_lead_count, 1);
    assert_eq!(m.last_assigned_at, Some(now));

    let m = store
        .adjust_member_load(member.id, -3, None, now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(m.current_lead_count, 0);
    assert_eq!(m.last_assigned_at, Some(now), "release keeps the stamp");

    assert!(store
        .adjust_member_load(Uuid::new_v4(), 1, None, now)
        .await
        .unwrap()
        .is_none());
}

async fn lead_roundtrip(store: &dyn LeadStore) {
    let lead = Lead::new("Jo", LeadSource::Referral, 82)
        .with_phone("555-0100")
        .with_interests(["life", "annuity"]);
    store.put_lead(&lead).await.unwrap();
    let fetched = store.get_lead(lead.id).await.unwrap().expect("lead exists");
    assert_eq!(fetched, lead);
}

async fn assignment_cas(store: &dyn LeadStore) {
    let now = Utc::now();
    let a = Assignment::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        AssignmentReason::RoundRobin,
        Priority::High,
        now + Duration::hours(24),
        now,
    );
    store.insert_assignment(&a).await.unwrap();

    let mut first = a.clone();
    first.status = AssignmentStatus::Accepted;
    let stored = store.update_assignment(&first).await.unwrap();
    assert_eq!(stored.version, 1);

    // A writer holding the old version loses.
    let mut stale = a.clone();
    stale.status = AssignmentStatus::Completed;
    let err = store.update_assignment(&stale).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { entity: "assignment", .. }));
    assert!(err.is_contention());

    let fetched = store.get_assignment(a.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, AssignmentStatus::Accepted);
    assert_eq!(fetched.version, 1);
}

async fn assignment_listings(store: &dyn LeadStore) {
    let now = Utc::now();
    let lead_id = Uuid::new_v4();
    let early = Assignment::new(
        lead_id,
        Uuid::new_v4(),
        AssignmentReason::RoundRobin,
        Priority::Normal,
        now + Duration::hours(2),
        now,
    );
    let late = Assignment::new(
        lead_id,
        Uuid::new_v4(),
        AssignmentReason::Manual,
        Priority::Normal,
        now + Duration::hours(1),
        now + Duration::minutes(5),
    );
    store.insert_assignment(&late).await.unwrap();
    store.insert_assignment(&early).await.unwrap();

    let for_lead = store.list_assignments_for_lead(lead_id).await.unwrap();
    let ids: Vec<Uuid> = for_lead.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![early.id, late.id], "oldest first");

    let assigned = store
        .list_assignments_by_status(AssignmentStatus::Assigned)
        .await
        .unwrap();
    let ids: Vec<Uuid> = assigned.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![late.id, early.id], "earliest deadline first");
}

async fn same_instant_history_keeps_insertion_order(store: &dyn LeadStore) {
    let now = Utc::now();
    let lead_id = Uuid::new_v4();
    let make = |reason| {
        Assignment::new(
            lead_id,
            Uuid::new_v4(),
            reason,
            Priority::Normal,
            now + Duration::hours(24),
            now,
        )
    };
    let first = make(AssignmentReason::RoundRobin);
    let second = make(AssignmentReason::Manual);
    let third = make(AssignmentReason::Manual);

    // Reassignment bumps the retired record's version before the next
    // insert, which must not reorder the history.
    store.insert_assignment(&first).await.unwrap();
    let mut retired = first.clone();
    retired.status = AssignmentStatus::Reassigned;
    store.update_assignment(&retired).await.unwrap();
    store.insert_assignment(&second).await.unwrap();
    let mut retired = second.clone();
    retired.status = AssignmentStatus::Reassigned;
    store.update_assignment(&retired).await.unwrap();
    store.insert_assignment(&third).await.unwrap();

    let ids: Vec<Uuid> = store
        .list_assignments_for_lead(lead_id)
        .await
        .unwrap()
        .iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(ids, vec![first.id, second.id, third.id]);
}

async fn deal_roundtrip_and_cas(store: &dyn LeadStore) {
    let now = Utc::now();
    let deal = Deal::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        Department::Insurance,
        3450.25,
        Priority::Urgent,
        now,
    );
    store.insert_deal(&deal).await.unwrap();
    assert_eq!(store.get_deal(deal.id).await.unwrap().unwrap(), deal);

    let mut moved = deal.clone();
    moved.stage = DealStage::Engaged;
    moved.stage_history.push(StageHistoryEntry {
        stage: DealStage::Engaged,
        timestamp: now,
        notes: Some("called back".into()),
    });
    let stored = store.update_deal(&moved).await.unwrap();
    assert_eq!(stored.version, 1);

    let err = store.update_deal(&moved).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { entity: "deal", .. }));

    let fetched = store.get_deal(deal.id).await.unwrap().unwrap();
    assert_eq!(fetched.stage, DealStage::Engaged);
    assert_eq!(fetched.stage_history.len(), 2);
    assert_eq!(store.list_deals_for_lead(deal.lead_id).await.unwrap().len(), 1);
}

async fn rotation_wraps_and_counts(store: &dyn LeadStore) {
    let key = CounterKey::round_robin(Department::Insurance);
    let now = Utc::now();
    let c: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

    assert!(store.get_counter(key).await.unwrap().is_none());
    let mut picks = Vec::new();
    for _ in 0..4 {
        picks.push(store.advance_rotation(key, &c, now).await.unwrap().unwrap());
    }
    assert_eq!(picks, vec![c[0], c[1], c[2], c[0]]);

    let counter = store.get_counter(key).await.unwrap().unwrap();
    assert_eq!(counter.assignment_count, 4);
    assert_eq!(counter.last_assigned_member_id, Some(c[0]));

    assert_eq!(store.advance_rotation(key, &[], now).await.unwrap(), None);

    store.reset_counter(key, now).await.unwrap();
    let counter = store.get_counter(key).await.unwrap().unwrap();
    assert_eq!(counter.assignment_count, 0);
    assert_eq!(counter.last_assigned_member_id, None);
    assert_eq!(counter.reset_at, Some(now));
    assert_eq!(store.advance_rotation(key, &c, now).await.unwrap(), Some(c[0]));

    // Departments rotate independently.
    let other = CounterKey::round_robin(Department::Recruiting);
    assert_eq!(store.advance_rotation(other, &c, now).await.unwrap(), Some(c[0]));
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[tokio::test]
async fn memory_member_roundtrip() {
    member_roundtrip(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_load_never_goes_negative() {
    load_never_goes_negative(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_lead_roundtrip() {
    lead_roundtrip(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_assignment_cas() {
    assignment_cas(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_assignment_listings() {
    assignment_listings(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_same_instant_history_keeps_insertion_order() {
    same_instant_history_keeps_insertion_order(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_deal_roundtrip_and_cas() {
    deal_roundtrip_and_cas(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_rotation_wraps_and_counts() {
    rotation_wraps_and_counts(&MemoryStore::new()).await;
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sqlite_member_roundtrip() {
    member_roundtrip(&sqlite().await).await;
}

#[tokio::test]
async fn sqlite_load_never_goes_negative() {
    load_never_goes_negative(&sqlite().await).await;
}

#[tokio::test]
async fn sqlite_lead_roundtrip() {
    lead_roundtrip(&sqlite().await).await;
}

#[tokio::test]
async fn sqlite_assignment_cas() {
    assignment_cas(&sqlite().await).await;
}

#[tokio::test]
async fn sqlite_assignment_listings() {
    assignment_listings(&sqlite().await).await;
}

#[tokio::test]
async fn sqlite_same_instant_history_keeps_insertion_order() {
    same_instant_history_keeps_insertion_order(&sqlite().await).await;
}

#[tokio::test]
async fn sqlite_deal_roundtrip_and_cas() {
    deal_roundtrip_and_cas(&sqlite().await).await;
}

#[tokio::test]
async fn sqlite_rotation_wraps_and_counts() {
    rotation_wraps_and_counts(&sqlite().await).await;
}

#[tokio::test]
async fn sqlite_survives_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("leadflow.db");
    let member = TeamMember::new("Kim", Department::Insurance, MemberRole::Manager);

    {
        let store = SqliteStore::new(&path).await.expect("open file db");
        store.put_member(&member).await.unwrap();
        store
            .advance_rotation(CounterKey::round_robin(Department::Insurance), &[member.id], Utc::now())
            .await
            .unwrap();
    }

    let store = SqliteStore::new(&path).await.expect("reopen file db");
    let fetched = store.get_member(member.id).await.unwrap().expect("persisted");
    assert_eq!(fetched.name, "Kim");
    let counter = store
        .get_counter(CounterKey::round_robin(Department::Insurance))
        .await
        .unwrap()
        .expect("counter persisted");
    assert_eq!(counter.last_assigned_member_id, Some(member.id));
}
