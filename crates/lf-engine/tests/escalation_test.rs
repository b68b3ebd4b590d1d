use std::sync::Arc;

use chrono::{Duration, Utc};
use lf_core::clock::{Clock, ManualClock};
use lf_core::error::LeadFlowError;
use lf_core::memory_store::MemoryStore;
use lf_core::types::*;
use lf_engine::{EventSink, LeadFlow, NotificationEvent};

struct Harness {
    flow: LeadFlow,
    clock: Arc<ManualClock>,
    events: flume::Receiver<NotificationEvent>,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let (sink, events) = EventSink::unbounded();
    let flow = LeadFlow::builder(Arc::new(MemoryStore::new()))
        .with_clock(clock.clone())
        .with_event_sink(sink)
        .build();
    Harness {
        flow,
        clock,
        events,
    }
}

async fn member(flow: &LeadFlow, name: &str, role: MemberRole) -> TeamMember {
    flow.directory()
        .add_member(TeamMember::new(name, Department::Insurance, role))
        .await
        .expect("add member")
}

async fn routed(flow: &LeadFlow) -> Assignment {
    flow.route_lead(Lead::new("slow", LeadSource::Website, 30))
        .await
        .expect("route")
        .assignment
}

#[tokio::test]
async fn without_a_manager_escalation_stays_in_place() {
    let h = harness();
    member(&h.flow, "ana", MemberRole::Agent).await;
    let a = routed(&h.flow).await;

    h.clock.advance(Duration::hours(25));
    let out = h.flow.escalate_assignment(a.id, 1).await.unwrap();
    assert!(out.escalated);
    assert!(!out.reassigned);
    assert_eq!(out.assignment.id, a.id);
    assert_eq!(out.assignment.escalation_level, 1);
    assert_eq!(out.assignment.priority, Priority::Urgent);
    assert_eq!(out.assignment.status, AssignmentStatus::Assigned);
    assert_eq!(
        out.assignment.response_deadline,
        h.clock.now() + Duration::hours(24),
        "deadline restarts from the escalation"
    );
    assert!(h.events.drain().any(|e| matches!(
        e,
        NotificationEvent::AssignmentEscalated { level: 1, .. }
    )));
}

#[tokio::test]
async fn escalation_hands_the_lead_to_a_manager() {
    let h = harness();
    let agent = member(&h.flow, "ana", MemberRole::Agent).await;
    let a = routed(&h.flow).await;
    assert_eq!(a.member_id, agent.id);
    // Joins after routing so round-robin never picked them.
    let boss = member(&h.flow, "boss", MemberRole::Manager).await;

    let out = h.flow.escalate_assignment(a.id, 1).await.unwrap();
    assert!(out.escalated);
    assert!(out.reassigned);
    assert_eq!(out.assignment.member_id, boss.id);
    assert_eq!(out.assignment.reason, AssignmentReason::Escalation);
    assert_eq!(out.assignment.escalation_level, 1);
    assert!(out.assignment.priority >= Priority::High);

    let old = h.flow.tracker().get(a.id).await.unwrap();
    assert_eq!(old.status, AssignmentStatus::Reassigned);

    let dir = h.flow.directory();
    assert_eq!(dir.get_member(agent.id).await.unwrap().current_lead_count, 0);
    assert_eq!(dir.get_member(boss.id).await.unwrap().current_lead_count, 1);
}

#[tokio::test]
async fn manager_holding_the_lead_escalates_in_place() {
    let h = harness();
    let boss = member(&h.flow, "boss", MemberRole::Manager).await;
    let a = routed(&h.flow).await;
    assert_eq!(a.member_id, boss.id);

    let out = h.flow.escalate_assignment(a.id, 2).await.unwrap();
    assert!(out.escalated);
    assert!(!out.reassigned);
    assert_eq!(out.assignment.member_id, boss.id);
    assert_eq!(out.assignment.escalation_level, 2);
}

#[tokio::test]
async fn top_level_only_flags() {
    let h = harness();
    member(&h.flow, "ana", MemberRole::Agent).await;
    let a = routed(&h.flow).await;
    member(&h.flow, "boss", MemberRole::Manager).await;

    let out = h.flow.escalate_assignment(a.id, 9).await.unwrap();
    assert!(out.escalated);
    assert!(!out.reassigned, "level 3 never auto-reassigns");
    assert_eq!(out.assignment.id, a.id);
    assert_eq!(out.assignment.escalation_level, 3);
    assert_eq!(out.assignment.status, AssignmentStatus::Escalated);
    assert!(out.assignment.escalated_at.is_some());
    assert!(h
        .events
        .drain()
        .any(|e| matches!(e, NotificationEvent::EscalationFlagged { .. })));

    // Flagged work is out of the sweep and cannot climb further.
    h.clock.advance(Duration::days(5));
    assert!(h.flow.sweep_overdue_assignments().await.unwrap().is_empty());
    let again = h.flow.escalate_assignment(a.id, 3).await.unwrap();
    assert!(!again.escalated);

    // A person can still take it over.
    let other = member(&h.flow, "ben", MemberRole::Agent).await;
    let (_, fresh) = h
        .flow
        .reassign_lead(a.lead_id, other.id, ReassignReason::Manual)
        .await
        .unwrap();
    assert_eq!(fresh.escalation_level, 3);
}

#[tokio::test]
async fn lower_or_equal_level_is_a_no_op() {
    let h = harness();
    member(&h.flow, "ana", MemberRole::Agent).await;
    let a = routed(&h.flow).await;

    h.flow.escalate_assignment(a.id, 2).await.unwrap();
    for level in [0, 1, 2] {
        let out = h.flow.escalate_assignment(a.id, level).await.unwrap();
        assert!(!out.escalated);
        assert_eq!(out.assignment.escalation_level, 2);
    }
}

#[tokio::test]
async fn terminal_assignments_cannot_escalate() {
    let h = harness();
    member(&h.flow, "ana", MemberRole::Agent).await;
    let a = routed(&h.flow).await;
    h.flow.tracker().complete(a.id).await.unwrap();

    let err = h.flow.escalate_assignment(a.id, 1).await.unwrap_err();
    assert!(matches!(err, LeadFlowError::AlreadyTerminal { .. }));

    let err = h
        .flow
        .escalate_assignment(uuid::Uuid::new_v4(), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, LeadFlowError::AssignmentNotFound(_)));
}

#[tokio::test]
async fn reassignment_keeps_the_escalation_level() {
    let h = harness();
    member(&h.flow, "ana", MemberRole::Agent).await;
    let a = routed(&h.flow).await;
    h.flow.escalate_assignment(a.id, 1).await.unwrap();

    let ben = member(&h.flow, "ben", MemberRole::Agent).await;
    let (_, fresh) = h
        .flow
        .reassign_lead(a.lead_id, ben.id, ReassignReason::Manual)
        .await
        .unwrap();
    assert_eq!(fresh.escalation_level, 1);
    assert!(fresh.priority >= Priority::High);
}
