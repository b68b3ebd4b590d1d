use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use lf_core::clock::{Clock, ManualClock};
use lf_core::error::LeadFlowError;
use lf_core::memory_store::MemoryStore;
use lf_core::pipeline::DealStage;
use lf_core::store::LeadStore;
use lf_core::types::*;
use lf_engine::estimate::estimate_deal_value;
use lf_engine::territory::TerritoryMatcher;
use lf_engine::{EventSink, LeadFlow, NotificationEvent};
use uuid::Uuid;

struct Harness {
    flow: LeadFlow,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    events: flume::Receiver<NotificationEvent>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let (sink, events) = EventSink::unbounded();
    let flow = LeadFlow::builder(store.clone())
        .with_clock(clock.clone())
        .with_event_sink(sink)
        .build();
    Harness {
        flow,
        store,
        clock,
        events,
    }
}

async fn add(flow: &LeadFlow, name: &str, department: Department) -> TeamMember {
    let role = match department {
        Department::Insurance => MemberRole::Agent,
        Department::Recruiting => MemberRole::Recruiter,
    };
    flow.directory()
        .add_member(TeamMember::new(name, department, role))
        .await
        .expect("add member")
}

fn cold(name: &str) -> Lead {
    Lead::new(name, LeadSource::Website, 20)
}

// ---------------------------------------------------------------------------
// Round-robin
// ---------------------------------------------------------------------------

#[tokio::test]
async fn everyone_gets_a_lead_before_anyone_gets_two() {
    let h = harness();
    for name in ["ana", "ben", "cal", "dee"] {
        add(&h.flow, name, Department::Insurance).await;
    }

    let mut counts: HashMap<Uuid, usize> = HashMap::new();
    for i in 0..4 {
        let out = h.flow.route_lead(cold(&format!("lead {i}"))).await.unwrap();
        assert_eq!(out.assignment.reason, AssignmentReason::RoundRobin);
        *counts.entry(out.member.id).or_default() += 1;
    }
    assert_eq!(counts.len(), 4);
    assert!(counts.values().all(|&c| c == 1));
}

#[tokio::test]
async fn rotation_keeps_cycling_evenly() {
    let h = harness();
    for name in ["ana", "ben", "cal"] {
        add(&h.flow, name, Department::Insurance).await;
    }

    let mut order = Vec::new();
    for i in 0..9 {
        let out = h.flow.route_lead(cold(&format!("lead {i}"))).await.unwrap();
        order.push(out.member.id);
    }
    // Same member every third lead.
    for i in 3..9 {
        assert_eq!(order[i], order[i - 3]);
    }
    let counter = h
        .store
        .get_counter(CounterKey::round_robin(Department::Insurance))
        .await
        .unwrap()
        .expect("counter exists");
    assert_eq!(counter.assignment_count, 9);
    assert_eq!(counter.last_assigned_member_id, Some(order[8]));
}

#[tokio::test]
async fn longest_idle_member_goes_first() {
    let h = harness();
    let busy = add(&h.flow, "busy", Department::Insurance).await;
    let idle = add(&h.flow, "idle", Department::Insurance).await;
    h.store
        .adjust_member_load(busy.id, 0, Some(h.clock.now()), h.clock.now())
        .await
        .unwrap();

    let out = h.flow.route_lead(cold("first")).await.unwrap();
    assert_eq!(out.member.id, idle.id);
}

#[tokio::test]
async fn recruiting_leads_stay_in_recruiting() {
    let h = harness();
    let agent = add(&h.flow, "agent", Department::Insurance).await;
    let recruiter = add(&h.flow, "recruiter", Department::Recruiting).await;

    let out = h
        .flow
        .route_lead(Lead::new("cand", LeadSource::Recruiting, 30))
        .await
        .unwrap();
    assert_eq!(out.member.id, recruiter.id);
    assert_ne!(out.member.id, agent.id);
}

#[tokio::test]
async fn inactive_and_full_members_are_skipped() {
    let h = harness();
    let off = add(&h.flow, "off", Department::Insurance).await;
    h.flow.directory().set_active(off.id, false).await.unwrap();
    let capped = h
        .flow
        .directory()
        .add_member(TeamMember::new("capped", Department::Insurance, MemberRole::Agent).with_lead_cap(1))
        .await
        .unwrap();

    let out = h.flow.route_lead(cold("one")).await.unwrap();
    assert_eq!(out.member.id, capped.id);

    let err = h.flow.route_lead(cold("two")).await.unwrap_err();
    assert!(matches!(
        err,
        LeadFlowError::NoAvailableMember(Department::Insurance)
    ));
}

#[tokio::test]
async fn empty_department_has_no_available_member() {
    let h = harness();
    add(&h.flow, "agent", Department::Insurance).await;
    let err = h
        .flow
        .route_lead(Lead::new("cand", LeadSource::Recruiting, 90))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LeadFlowError::NoAvailableMember(Department::Recruiting)
    ));
}

#[tokio::test]
async fn routing_the_same_lead_twice_is_rejected() {
    let h = harness();
    add(&h.flow, "ana", Department::Insurance).await;
    add(&h.flow, "ben", Department::Insurance).await;
    let lead = cold("dup");

    let first = h.flow.route_lead(lead.clone()).await.unwrap();
    let err = h.flow.route_lead(lead).await.unwrap_err();
    match err {
        LeadFlowError::LeadAlreadyAssigned { assignment_id, .. } => {
            assert_eq!(assignment_id, first.assignment.id)
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_routes_pick_distinct_members() {
    let h = harness();
    for i in 0..6 {
        add(&h.flow, &format!("agent {i}"), Department::Insurance).await;
    }

    let mut tasks = Vec::new();
    for i in 0..6 {
        let flow = h.flow.clone();
        tasks.push(tokio::spawn(async move {
            flow.route_lead(cold(&format!("lead {i}"))).await
        }));
    }

    let mut picked = Vec::new();
    for task in tasks {
        picked.push(task.await.unwrap().unwrap().member.id);
    }
    picked.sort();
    picked.dedup();
    assert_eq!(picked.len(), 6, "no member may get two leads in one round");
}

// ---------------------------------------------------------------------------
// Territory seam
// ---------------------------------------------------------------------------

struct PickLast;

impl TerritoryMatcher for PickLast {
    fn match_member(&self, _lead: &Lead, candidates: &[TeamMember]) -> Option<Uuid> {
        candidates.last().map(|m| m.id)
    }
}

#[tokio::test]
async fn territory_match_skips_rotation() {
    let store = Arc::new(MemoryStore::new());
    let flow = LeadFlow::builder(store.clone())
        .with_territory_matcher(Arc::new(PickLast))
        .build();
    add(&flow, "ana", Department::Insurance).await;
    let last = add(&flow, "ben", Department::Insurance).await;

    let out = flow.route_lead(cold("local")).await.unwrap();
    assert_eq!(out.member.id, last.id);
    assert_eq!(out.assignment.reason, AssignmentReason::Territory);
    assert!(store
        .get_counter(CounterKey::round_robin(Department::Insurance))
        .await
        .unwrap()
        .is_none());
}

// ---------------------------------------------------------------------------
// Scores, deals, deadlines
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deal_opens_at_hot_threshold() {
    let h = harness();
    add(&h.flow, "ana", Department::Insurance).await;

    let below = h
        .flow
        .route_lead(Lead::new("49", LeadSource::Referral, 49))
        .await
        .unwrap();
    assert!(below.deal.is_none());
    assert_eq!(below.assignment.priority, Priority::Normal);

    let lead = Lead::new("50", LeadSource::Referral, 50).with_phone("555-0102");
    let at = h.flow.route_lead(lead.clone()).await.unwrap();
    let deal = at.deal.expect("deal at threshold");
    assert_eq!(deal.stage, DealStage::New);
    assert_eq!(deal.status, DealStatus::Active);
    assert_eq!(deal.lead_id, lead.id);
    assert_eq!(deal.member_id, at.member.id);
    assert_eq!(deal.value, estimate_deal_value(&lead));
    assert_eq!(at.assignment.priority, Priority::High);
}

#[tokio::test]
async fn deadlines_follow_department_and_score() {
    let h = harness();
    add(&h.flow, "ana", Department::Insurance).await;
    add(&h.flow, "rex", Department::Recruiting).await;
    let now = h.clock.now();

    let hot = h
        .flow
        .route_lead(Lead::new("hot", LeadSource::Website, 75))
        .await
        .unwrap();
    assert_eq!(hot.assignment.response_deadline, now + Duration::hours(2));
    assert_eq!(hot.assignment.priority, Priority::Urgent);

    let warm = h
        .flow
        .route_lead(Lead::new("warm", LeadSource::Website, 74))
        .await
        .unwrap();
    assert_eq!(warm.assignment.response_deadline, now + Duration::hours(24));

    let cand = h
        .flow
        .route_lead(Lead::new("cand", LeadSource::Recruiting, 99))
        .await
        .unwrap();
    assert_eq!(cand.assignment.response_deadline, now + Duration::hours(4));
}

#[tokio::test]
async fn routing_updates_load_and_emits_events() {
    let h = harness();
    let ana = add(&h.flow, "ana", Department::Insurance).await;

    let out = h
        .flow
        .route_lead(Lead::new("hot", LeadSource::Event, 90))
        .await
        .unwrap();
    assert_eq!(out.member.current_lead_count, 1);
    assert_eq!(out.member.last_assigned_at, Some(h.clock.now()));

    let stored = h.flow.directory().get_member(ana.id).await.unwrap();
    assert_eq!(stored.current_lead_count, 1);

    let kinds: Vec<&str> = h.events.drain().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec!["deal_created", "lead_assigned"]);
}

// ---------------------------------------------------------------------------
// Reassignment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reassigning_twice_leaves_one_live_assignment() {
    let h = harness();
    let a = add(&h.flow, "a", Department::Insurance).await;
    let b = add(&h.flow, "b", Department::Insurance).await;
    let c = add(&h.flow, "c", Department::Insurance).await;

    let lead = cold("moving");
    let routed = h.flow.route_lead(lead.clone()).await.unwrap();
    assert_eq!(routed.member.id, a.id);

    let (_, middle) = h
        .flow
        .reassign_lead(lead.id, b.id, ReassignReason::Manual)
        .await
        .unwrap();
    let (member, latest) = h
        .flow
        .reassign_lead(lead.id, c.id, ReassignReason::Manual)
        .await
        .unwrap();
    assert_eq!(member.id, c.id);
    assert_eq!(latest.reason, AssignmentReason::Manual);

    // All three share one clock instant; history is still oldest first.
    let history = h.flow.assignment_history(lead.id).await.unwrap();
    let order: Vec<Uuid> = history.iter().map(|x| x.id).collect();
    assert_eq!(order, vec![routed.assignment.id, middle.id, latest.id]);
    let live: Vec<&Assignment> = history.iter().filter(|x| x.status.is_live()).collect();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, latest.id);
    assert_eq!(
        history
            .iter()
            .filter(|x| x.status == AssignmentStatus::Reassigned)
            .count(),
        2
    );

    let load = |id: Uuid| {
        let dir = h.flow.directory().clone();
        async move { dir.get_member(id).await.unwrap().current_lead_count }
    };
    assert_eq!(load(a.id).await, 0);
    assert_eq!(load(b.id).await, 0);
    assert_eq!(load(c.id).await, 1);

    h.flow.tracker().complete(latest.id).await.unwrap();
    let current = h.flow.tracker().current_for_lead(lead.id).await.unwrap();
    assert_eq!(current.id, latest.id, "falls back to the newest record");
}

#[tokio::test]
async fn reassign_records_who_asked() {
    let h = harness();
    add(&h.flow, "a", Department::Insurance).await;
    let b = add(&h.flow, "b", Department::Insurance).await;
    let boss = Uuid::new_v4();
    let lead = cold("x");
    h.flow.route_lead(lead.clone()).await.unwrap();

    let (_, fresh) = h
        .flow
        .reassign_lead_by(lead.id, b.id, ReassignReason::Manual, boss)
        .await
        .unwrap();
    assert_eq!(fresh.assigned_by, Some(boss));
    assert!(h
        .events
        .drain()
        .any(|e| matches!(e, NotificationEvent::LeadReassigned { to_member_id, .. } if to_member_id == b.id)));
}

#[tokio::test]
async fn reassign_error_cases() {
    let h = harness();
    add(&h.flow, "a", Department::Insurance).await;
    let b = add(&h.flow, "b", Department::Insurance).await;

    let never = Uuid::new_v4();
    let err = h
        .flow
        .reassign_lead(never, b.id, ReassignReason::Manual)
        .await
        .unwrap_err();
    assert!(matches!(err, LeadFlowError::AssignmentNotFound(id) if id == never));

    let lead = cold("x");
    let routed = h.flow.route_lead(lead.clone()).await.unwrap();

    let ghost = Uuid::new_v4();
    let err = h
        .flow
        .reassign_lead(lead.id, ghost, ReassignReason::Manual)
        .await
        .unwrap_err();
    assert!(matches!(err, LeadFlowError::MemberNotFound(id) if id == ghost));

    h.flow.directory().set_active(b.id, false).await.unwrap();
    let err = h
        .flow
        .reassign_lead(lead.id, b.id, ReassignReason::Manual)
        .await
        .unwrap_err();
    assert!(matches!(err, LeadFlowError::MemberInactive(_)));

    h.flow.tracker().complete(routed.assignment.id).await.unwrap();
    h.flow.directory().set_active(b.id, true).await.unwrap();
    let err = h
        .flow
        .reassign_lead(lead.id, b.id, ReassignReason::Manual)
        .await
        .unwrap_err();
    assert!(matches!(err, LeadFlowError::AlreadyTerminal { .. }));
}

#[tokio::test]
async fn deals_keep_their_owner_on_reassign() {
    let h = harness();
    let a = add(&h.flow, "a", Department::Insurance).await;
    let b = add(&h.flow, "b", Department::Insurance).await;
    let lead = Lead::new("hot", LeadSource::Referral, 85);
    h.flow.route_lead(lead.clone()).await.unwrap();

    h.flow
        .reassign_lead(lead.id, b.id, ReassignReason::Manual)
        .await
        .unwrap();
    let deals = h.flow.deals_for_lead(lead.id).await.unwrap();
    assert_eq!(deals.len(), 1);
    assert_eq!(deals[0].member_id, a.id);
}
