use std::sync::Arc;

use uuid::Uuid;

use lf_core::clock::Clock;
use lf_core::error::{LeadFlowError, Result};
use lf_core::locks::KeyedLocks;
use lf_core::pipeline::{DealStage, Track};
use lf_core::store::LeadStore;
use lf_core::types::{Deal, DealStatus, Lead, Priority, StageHistoryEntry, TeamMember};

use crate::events::{EventSink, NotificationEvent};
use crate::onboarding::OnboardingTrigger;

/// Moves deals through their department's pipeline.
///
/// Every write to a deal happens under its per-deal lock, so stage history
/// is appended in order and onboarding fires at most once.
#[derive(Clone)]
pub struct DealPipeline {
    store: Arc<dyn LeadStore>,
    clock: Arc<dyn Clock>,
    sink: EventSink,
    onboarding: Arc<dyn OnboardingTrigger>,
    locks: Arc<KeyedLocks>,
}

impl DealPipeline {
    pub fn new(
        store: Arc<dyn LeadStore>,
        clock: Arc<dyn Clock>,
        sink: EventSink,
        onboarding: Arc<dyn OnboardingTrigger>,
    ) -> Self {
        Self {
            store,
            clock,
            sink,
            onboarding,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub async fn create_deal(
        &self,
        lead: &Lead,
        member: &TeamMember,
        value: f64,
        priority: Priority,
    ) -> Result<Deal> {
        let deal = Deal::new(
            lead.id,
            member.id,
            lead.department(),
            value,
            priority,
            self.clock.now(),
        );
        self.store.insert_deal(&deal).await?;

        tracing::info!(
            deal_id = %deal.id,
            lead_id = %lead.id,
            member_id = %member.id,
            value = deal.value,
            "deal created"
        );
        self.sink.emit(NotificationEvent::DealCreated {
            deal_id: deal.id,
            lead_id: lead.id,
            member_id: member.id,
            value: deal.value,
        });
        Ok(deal)
    }

    pub async fn get(&self, id: Uuid) -> Result<Deal> {
        self.store
            .get_deal(id)
            .await?
            .ok_or(LeadFlowError::DealNotFound(id))
    }

    pub async fn deals_for_lead(&self, lead_id: Uuid) -> Result<Vec<Deal>> {
        Ok(self.store.list_deals_for_lead(lead_id).await?)
    }

    // -----------------------------------------------------------------------
    // Stage moves
    // -----------------------------------------------------------------------

    /// Advance one step along the deal's current track.
    pub async fn move_deal_to_next_stage(&self, id: Uuid, notes: Option<String>) -> Result<Deal> {
        let _guard = self.locks.lock(id).await;
        let deal = self.get(id).await?;
        match deal.status {
            DealStatus::Lost => return Err(closed(&deal)),
            DealStatus::Paused => return Err(LeadFlowError::DealPaused(id)),
            DealStatus::Active | DealStatus::Won => {}
        }
        let next = deal.department.pipeline().next_stage(deal.stage)?;
        self.apply_stage(deal, next, notes).await
    }

    /// Move the deal to `stage`.
    ///
    /// Active deals may jump to any stage before the post-win track. Won
    /// deals only move along the post-win track.
    ///
    /// Re-setting the current stage appends a history entry and restarts the
    /// follow-up on an active deal. A won or lost deal is returned unchanged:
    /// no history entry, no version bump and no onboarding. A paused deal
    /// rejects it with `DealPaused`.
    pub async fn update_deal_stage(
        &self,
        id: Uuid,
        stage: DealStage,
        notes: Option<String>,
    ) -> Result<Deal> {
        let _guard = self.locks.lock(id).await;
        let deal = self.get(id).await?;
        let pipeline = deal.department.pipeline();
        let target = pipeline.require(stage)?;

        if stage == deal.stage {
            return match deal.status {
                // Closed deals never gain history from a re-set.
                DealStatus::Won | DealStatus::Lost => Ok(deal),
                DealStatus::Paused => Err(LeadFlowError::DealPaused(id)),
                DealStatus::Active => self.record_reset(deal, notes).await,
            };
        }

        let allowed = match deal.status {
            DealStatus::Lost => return Err(closed(&deal)),
            DealStatus::Paused => return Err(LeadFlowError::DealPaused(id)),
            DealStatus::Won => target.track == Track::PostWin,
            DealStatus::Active => target.track != Track::PostWin,
        };
        if !allowed {
            return Err(LeadFlowError::InvalidTransition {
                entity: "deal",
                id,
                from: deal.stage.to_string(),
                to: stage.to_string(),
            });
        }
        self.apply_stage(deal, stage, notes).await
    }

    /// [`update_deal_stage`](Self::update_deal_stage) with a stage name as
    /// people type it (`"Proposal Sent"`, `"proposal_sent"`).
    pub async fn update_deal_stage_named(
        &self,
        id: Uuid,
        stage: &str,
        notes: Option<String>,
    ) -> Result<Deal> {
        let deal = self.get(id).await?;
        let stage = deal.department.pipeline().parse_stage(stage)?;
        self.update_deal_stage(id, stage, notes).await
    }

    /// Close the deal as won or lost, optionally fixing its final value.
    pub async fn close_deal(
        &self,
        id: Uuid,
        won: bool,
        final_value: Option<f64>,
        notes: Option<String>,
    ) -> Result<Deal> {
        let _guard = self.locks.lock(id).await;
        let mut deal = self.get(id).await?;
        if deal.status.is_closed() {
            return Err(closed(&deal));
        }
        if let Some(value) = final_value {
            deal.value = value;
        }
        let pipeline = deal.department.pipeline();
        let stage = if won {
            pipeline.success_stage()
        } else {
            pipeline.lost_stage()
        };
        self.apply_stage(deal, stage, notes).await
    }

    // -----------------------------------------------------------------------
    // Pause / resume
    // -----------------------------------------------------------------------

    pub async fn pause_deal(&self, id: Uuid) -> Result<Deal> {
        self.set_paused(id, true).await
    }

    pub async fn resume_deal(&self, id: Uuid) -> Result<Deal> {
        self.set_paused(id, false).await
    }

    async fn set_paused(&self, id: Uuid, paused: bool) -> Result<Deal> {
        let _guard = self.locks.lock(id).await;
        let mut deal = self.get(id).await?;
        let target = match (deal.status, paused) {
            (DealStatus::Won | DealStatus::Lost, _) => return Err(closed(&deal)),
            (DealStatus::Active, false) | (DealStatus::Paused, true) => return Ok(deal),
            (DealStatus::Active, true) => DealStatus::Paused,
            (DealStatus::Paused, false) => DealStatus::Active,
        };

        let now = self.clock.now();
        deal.status = target;
        deal.updated_at = now;
        if target == DealStatus::Active {
            // The clock stopped while paused; restart the follow-up from now.
            deal.next_followup_at = deal.department.pipeline().followup_after(deal.stage, now);
        }
        let deal = self.store.update_deal(&deal).await?;
        tracing::info!(deal_id = %id, status = %deal.status, "deal status changed");
        Ok(deal)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn record_reset(&self, mut deal: Deal, notes: Option<String>) -> Result<Deal> {
        let now = self.clock.now();
        deal.stage_history.push(StageHistoryEntry {
            stage: deal.stage,
            timestamp: now,
            notes,
        });
        deal.next_followup_at = deal.department.pipeline().followup_after(deal.stage, now);
        deal.updated_at = now;
        let deal = self.store.update_deal(&deal).await?;
        tracing::debug!(deal_id = %deal.id, stage = %deal.stage, "deal stage re-set");
        Ok(deal)
    }

    /// Write the stage change, then fire notifications and onboarding.
    /// Caller holds the deal lock.
    async fn apply_stage(&self, mut deal: Deal, stage: DealStage, notes: Option<String>) -> Result<Deal> {
        let pipeline = deal.department.pipeline();
        let def = pipeline.require(stage)?;
        let now = self.clock.now();
        let from = deal.stage;

        deal.stage = stage;
        deal.stage_history.push(StageHistoryEntry {
            stage,
            timestamp: now,
            notes,
        });
        deal.next_followup_at = pipeline.followup_after(stage, now);
        deal.updated_at = now;

        let closing = match def.track {
            Track::Success if deal.status != DealStatus::Won => Some(true),
            Track::Lost => Some(false),
            _ => None,
        };
        if let Some(won) = closing {
            deal.status = if won { DealStatus::Won } else { DealStatus::Lost };
            deal.closed_at = Some(now);
        }

        let start_onboarding =
            pipeline.is_onboarding_trigger(stage) && deal.onboarding_triggered_at.is_none();
        if start_onboarding {
            deal.onboarding_triggered_at = Some(now);
        }

        let deal = self.store.update_deal(&deal).await?;
        tracing::info!(
            deal_id = %deal.id,
            from = %from,
            to = %stage,
            status = %deal.status,
            "deal stage changed"
        );

        self.sink.emit(NotificationEvent::DealStageChanged {
            deal_id: deal.id,
            from,
            to: stage,
        });
        if let Some(won) = closing {
            self.sink.emit(NotificationEvent::DealClosed {
                deal_id: deal.id,
                won,
                value: deal.value,
            });
        }
        if start_onboarding {
            self.run_onboarding(&deal).await;
        }
        Ok(deal)
    }

    async fn run_onboarding(&self, deal: &Deal) {
        let lead = match self.store.get_lead(deal.lead_id).await {
            Ok(lead) => lead,
            Err(e) => {
                tracing::warn!(deal_id = %deal.id, error = %e, "could not load lead for onboarding");
                None
            }
        };
        let member = match self.store.get_member(deal.member_id).await {
            Ok(member) => member,
            Err(e) => {
                tracing::warn!(deal_id = %deal.id, error = %e, "could not load member for onboarding");
                None
            }
        };

        match self
            .onboarding
            .start_onboarding(deal, lead.as_ref(), member.as_ref())
            .await
        {
            Ok(()) => {
                tracing::info!(deal_id = %deal.id, "onboarding started");
                self.sink.emit(NotificationEvent::OnboardingStarted {
                    deal_id: deal.id,
                    lead_id: deal.lead_id,
                });
            }
            Err(e) => {
                tracing::warn!(deal_id = %deal.id, error = %e, "onboarding trigger failed");
            }
        }
    }
}

fn closed(deal: &Deal) -> LeadFlowError {
    LeadFlowError::AlreadyTerminal {
        entity: "deal",
        id: deal.id,
        status: deal.status.to_string(),
    }
}
