use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use lf_core::config::Config;
use lf_core::store::LeadStore;
use lf_engine::events::{LogDispatcher, NotificationWorker, WorkerStats};
use lf_engine::{EventSink, LeadFlow, NotificationEvent};

use crate::shutdown::ShutdownSignal;
use crate::sweep::EscalationSweep;

/// How long shutdown waits for the notification worker to flush.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonIntervals {
    pub sweep_secs: u64,
}

impl Default for DaemonIntervals {
    fn default() -> Self {
        Self { sweep_secs: 300 }
    }
}

impl DaemonIntervals {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sweep_secs: config.escalation.sweep_interval_secs,
        }
    }
}

/// What the daemon did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaemonStats {
    pub sweeps: u64,
    pub sweep_errors: u64,
    pub escalated: u64,
    pub notifications: WorkerStats,
}

/// Runs the escalation sweep on a timer and delivers notifications until
/// the shutdown signal fires.
pub struct Daemon {
    flow: LeadFlow,
    events: flume::Receiver<NotificationEvent>,
    intervals: DaemonIntervals,
    shutdown: ShutdownSignal,
}

impl Daemon {
    /// Wire a [`LeadFlow`] over `store` using `config`, with notifications
    /// going to the log.
    pub fn new(config: &Config, store: Arc<dyn LeadStore>) -> Self {
        let (sink, events) = EventSink::bounded(config.notifications.channel_capacity);
        let flow = LeadFlow::builder(store)
            .with_config(config)
            .with_event_sink(sink)
            .build();
        Self::with_flow(flow, events, DaemonIntervals::from_config(config))
    }

    /// Run around an already-built flow. `events` must be the receiving end
    /// of the flow's event sink.
    pub fn with_flow(
        flow: LeadFlow,
        events: flume::Receiver<NotificationEvent>,
        intervals: DaemonIntervals,
    ) -> Self {
        Self {
            flow,
            events,
            intervals,
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn set_intervals(&mut self, intervals: DaemonIntervals) {
        self.intervals = intervals;
    }

    /// Handle for stopping the daemon from another task.
    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn flow(&self) -> &LeadFlow {
        &self.flow
    }

    /// Run until shutdown. The first sweep happens one interval after start.
    pub async fn run(self) -> Result<DaemonStats> {
        info!(sweep_secs = self.intervals.sweep_secs, "leadflow daemon started");

        let mut stats = DaemonStats::default();

        let mut worker = {
            let signal = self.shutdown.clone();
            let worker = NotificationWorker::new(self.events.clone(), LogDispatcher);
            tokio::spawn(async move { worker.run_until(signal.wait()).await })
        };

        let sweep = EscalationSweep::new(self.flow.clone());
        let mut sweep_interval =
            tokio::time::interval(Duration::from_secs(self.intervals.sweep_secs.max(1)));
        // Skip the immediate first tick.
        sweep_interval.tick().await;

        loop {
            tokio::select! {
                _ = sweep_interval.tick() => {
                    stats.sweeps += 1;
                    match sweep.run_sweep().await {
                        Ok(report) => {
                            stats.escalated += report.escalated as u64;
                            debug!(
                                overdue = report.overdue,
                                escalated = report.escalated,
                                "sweep tick"
                            );
                        }
                        Err(e) => {
                            stats.sweep_errors += 1;
                            warn!(error = %e, "escalation sweep failed");
                        }
                    }
                }
                _ = self.shutdown.wait() => {
                    info!("shutdown signal received, stopping sweep loop");
                    break;
                }
            }
        }

        stats.notifications = match tokio::time::timeout(DRAIN_TIMEOUT, &mut worker).await {
            Ok(Ok(delivered)) => delivered,
            Ok(Err(e)) => {
                warn!(error = %e, "notification worker failed");
                WorkerStats::default()
            }
            Err(_) => {
                warn!("notification worker did not flush in time");
                worker.abort();
                WorkerStats::default()
            }
        };

        info!(
            sweeps = stats.sweeps,
            escalated = stats.escalated,
            notifications = stats.notifications.delivered,
            "leadflow daemon stopped"
        );
        Ok(stats)
    }
}
