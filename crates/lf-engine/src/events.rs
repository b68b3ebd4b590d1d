//! Outbound notifications.
//!
//! Services push [`NotificationEvent`]s into an [`EventSink`]; a
//! [`NotificationWorker`] drains the channel and hands each event to a
//! [`NotificationDispatcher`]. Emitting never blocks and never fails the
//! operation that produced the event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lf_core::pipeline::DealStage;
use lf_core::types::{AssignmentReason, Department};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    LeadAssigned {
        lead_id: Uuid,
        member_id: Uuid,
        assignment_id: Uuid,
        department: Department,
        reason: AssignmentReason,
        response_deadline: DateTime<Utc>,
    },
    LeadReassigned {
        lead_id: Uuid,
        from_member_id: Uuid,
        to_member_id: Uuid,
        assignment_id: Uuid,
        reason: AssignmentReason,
    },
    DealCreated {
        deal_id: Uuid,
        lead_id: Uuid,
        member_id: Uuid,
        value: f64,
    },
    DealStageChanged {
        deal_id: Uuid,
        from: DealStage,
        to: DealStage,
    },
    DealClosed {
        deal_id: Uuid,
        won: bool,
        value: f64,
    },
    AssignmentEscalated {
        assignment_id: Uuid,
        lead_id: Uuid,
        level: u8,
        member_id: Uuid,
    },
    /// The assignment hit the top escalation level and needs a person.
    EscalationFlagged {
        assignment_id: Uuid,
        lead_id: Uuid,
        member_id: Uuid,
    },
    OnboardingStarted {
        deal_id: Uuid,
        lead_id: Uuid,
    },
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::LeadAssigned { .. } => "lead_assigned",
            NotificationEvent::LeadReassigned { .. } => "lead_reassigned",
            NotificationEvent::DealCreated { .. } => "deal_created",
            NotificationEvent::DealStageChanged { .. } => "deal_stage_changed",
            NotificationEvent::DealClosed { .. } => "deal_closed",
            NotificationEvent::AssignmentEscalated { .. } => "assignment_escalated",
            NotificationEvent::EscalationFlagged { .. } => "escalation_flagged",
            NotificationEvent::OnboardingStarted { .. } => "onboarding_started",
        }
    }
}

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

/// Sending half of the notification channel. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<flume::Sender<NotificationEvent>>,
}

impl EventSink {
    /// A sink with a bounded buffer; events are dropped (and logged) once it
    /// is full.
    pub fn bounded(capacity: usize) -> (Self, flume::Receiver<NotificationEvent>) {
        let (tx, rx) = flume::bounded(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    pub fn unbounded() -> (Self, flume::Receiver<NotificationEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: NotificationEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(flume::TrySendError::Full(event)) => {
                tracing::warn!(kind = event.kind(), "notification channel full, event dropped");
            }
            Err(flume::TrySendError::Disconnected(event)) => {
                tracing::warn!(kind = event.kind(), "notification channel closed, event dropped");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
#[error("dispatch failed: {0}")]
pub struct DispatchError(pub String);

/// Delivers one notification to the outside world.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), DispatchError>;
}

/// Writes every event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), DispatchError> {
        let payload = serde_json::to_string(event).map_err(|e| DispatchError(e.to_string()))?;
        tracing::info!(kind = event.kind(), %payload, "notification");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub delivered: u64,
    pub failed: u64,
}

/// Drains the notification channel into a dispatcher.
pub struct NotificationWorker<D> {
    rx: flume::Receiver<NotificationEvent>,
    dispatcher: D,
}

impl<D: NotificationDispatcher> NotificationWorker<D> {
    pub fn new(rx: flume::Receiver<NotificationEvent>, dispatcher: D) -> Self {
        Self { rx, dispatcher }
    }

    /// Run until every sender is dropped. Failed deliveries are logged and
    /// not retried.
    pub async fn run(self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        while let Ok(event) = self.rx.recv_async().await {
            self.deliver(&event, &mut stats).await;
        }
        tracing::debug!(
            delivered = stats.delivered,
            failed = stats.failed,
            "notification worker stopped"
        );
        stats
    }

    /// Like [`run`](Self::run), but also stops once `stop` resolves. Events
    /// already queued at that point are still delivered.
    pub async fn run_until<F>(&self, stop: F) -> WorkerStats
    where
        F: std::future::Future<Output = ()>,
    {
        let mut stats = WorkerStats::default();
        tokio::pin!(stop);
        loop {
            tokio::select! {
                received = self.rx.recv_async() => match received {
                    Ok(event) => self.deliver(&event, &mut stats).await,
                    Err(_) => break,
                },
                _ = &mut stop => {
                    let rest = self.drain().await;
                    stats.delivered += rest.delivered;
                    stats.failed += rest.failed;
                    break;
                }
            }
        }
        stats
    }

    /// Deliver whatever is already queued, then return.
    pub async fn drain(&self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        while let Ok(event) = self.rx.try_recv() {
            self.deliver(&event, &mut stats).await;
        }
        stats
    }

    async fn deliver(&self, event: &NotificationEvent, stats: &mut WorkerStats) {
        match self.dispatcher.notify(event).await {
            Ok(()) => stats.delivered += 1,
            Err(e) => {
                stats.failed += 1;
                tracing::warn!(kind = event.kind(), error = %e, "notification delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Flaky {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl NotificationDispatcher for Flaky {
        async fn notify(&self, _event: &NotificationEvent) -> Result<(), DispatchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 0 {
                Ok(())
            } else {
                Err(DispatchError("smtp down".into()))
            }
        }
    }

    fn closed(id: Uuid) -> NotificationEvent {
        NotificationEvent::DealClosed {
            deal_id: id,
            won: true,
            value: 10.0,
        }
    }

    #[test]
    fn full_channel_drops_without_panicking() {
        let (sink, rx) = EventSink::bounded(1);
        sink.emit(closed(Uuid::new_v4()));
        sink.emit(closed(Uuid::new_v4()));
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn disconnected_and_disabled_sinks_are_silent() {
        let (sink, rx) = EventSink::unbounded();
        drop(rx);
        sink.emit(closed(Uuid::new_v4()));
        EventSink::disabled().emit(closed(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn worker_counts_failures_and_stops_when_senders_drop() {
        let (sink, rx) = EventSink::unbounded();
        for _ in 0..4 {
            sink.emit(closed(Uuid::new_v4()));
        }
        drop(sink);

        let calls = Arc::new(AtomicUsize::new(0));
        let worker = NotificationWorker::new(rx, Flaky { calls: calls.clone() });
        let stats = worker.run().await;
        assert_eq!(stats, WorkerStats { delivered: 2, failed: 2 });
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn run_until_delivers_the_backlog_then_stops() {
        let (sink, rx) = EventSink::unbounded();
        for _ in 0..3 {
            sink.emit(closed(Uuid::new_v4()));
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let worker = NotificationWorker::new(rx, Flaky { calls: calls.clone() });
        // The sink stays alive, so only the stop future ends the loop.
        let stats = worker.run_until(async {}).await;
        assert_eq!(stats.delivered + stats.failed, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        drop(sink);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(closed(Uuid::nil())).unwrap();
        assert_eq!(json["type"], "deal_closed");
        assert_eq!(json["won"], true);
    }
}
