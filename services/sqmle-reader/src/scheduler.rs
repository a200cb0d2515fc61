//! Periodic polling of one SQM-LE unit.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument};

use photometer_common::gate::format_wait;
use photometer_common::{GateDecision, ReaderError, WindowGate};
use sinks::{DispatchReport, SinkDispatcher};

use crate::client::SqmleClient;
use crate::protocol::SqmCommand;

/// Shortest sleep through a deferral.
const MIN_DEFER_SLEEP: Duration = Duration::from_secs(1);

/// What to ask the unit and how often.
#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    pub command: SqmCommand,
    /// Polls to attempt; 0 polls until shutdown.
    pub number_of_reads: u32,
    /// Pause between polls.
    pub reads_frequency: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            command: SqmCommand::ReadWithSerial,
            number_of_reads: 3,
            reads_frequency: Duration::from_secs(30),
        }
    }
}

impl PollSchedule {
    fn is_complete(&self, attempted: u32) -> bool {
        self.number_of_reads != 0 && attempted >= self.number_of_reads
    }
}

/// Result of a single poll.
#[derive(Debug)]
pub enum PollOutcome {
    Dispatched(DispatchReport),
    Deferred { wait: ChronoDuration },
    Failed(ReaderError),
}

impl PollOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Dispatched(_) => "dispatched",
            Self::Deferred { .. } => "deferred",
            Self::Failed(_) => "failed",
        }
    }
}

/// Counters for one poller's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub attempted: u32,
    pub dispatched: u32,
    pub failed: u32,
    pub deferred: u32,
}

/// Polls one device on a schedule, inside its site's night window.
pub struct SqmlePoller {
    client: SqmleClient,
    schedule: PollSchedule,
    gate: Arc<dyn WindowGate>,
    dispatcher: SinkDispatcher,
}

impl SqmlePoller {
    pub fn new(
        client: SqmleClient,
        schedule: PollSchedule,
        gate: Arc<dyn WindowGate>,
        dispatcher: SinkDispatcher,
    ) -> Self {
        Self {
            client,
            schedule,
            gate,
            dispatcher,
        }
    }

    pub fn client(&self) -> &SqmleClient {
        &self.client
    }

    /// Gate, poll and dispatch once at `now`.
    #[instrument(skip_all, fields(device = %self.client.device().serial_id))]
    pub async fn poll_once(&mut self, now: DateTime<Utc>) -> PollOutcome {
        let outcome = self.process(now).await;
        counter!("sqmle_polls_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    async fn process(&mut self, now: DateTime<Utc>) -> PollOutcome {
        let site = self.client.device().site.clone();

        if let GateDecision::Defer { wait, until } = self.gate.decide(&site, now) {
            debug!(
                wait = %format_wait(wait),
                next_sunset = %until.map(|t| site.local_time(t)).unwrap_or_default(),
                "Waiting for next night window"
            );
            return PollOutcome::Deferred { wait };
        }

        match self.client.poll(self.schedule.command, now).await {
            Ok(reading) => PollOutcome::Dispatched(self.dispatcher.dispatch(&reading).await),
            Err(e) => {
                error!(error = %e, "SQM-LE poll failed");
                PollOutcome::Failed(e)
            }
        }
    }

    /// Poll until the schedule is complete or `shutdown` fires. A poll in
    /// progress when the signal arrives is finished first.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> PollStats {
        let mut stats = PollStats::default();
        let device = self.client.device().serial_id.clone();

        info!(
            device = %device,
            addr = %self.client.addr(),
            command = %self.schedule.command,
            number_of_reads = self.schedule.number_of_reads,
            reads_frequency_secs = self.schedule.reads_frequency.as_secs(),
            "Starting SQM-LE poller"
        );

        while !self.schedule.is_complete(stats.attempted) {
            let pause = match self.poll_once(Utc::now()).await {
                PollOutcome::Deferred { wait } => {
                    stats.deferred += 1;
                    wait.to_std().unwrap_or(MIN_DEFER_SLEEP).max(MIN_DEFER_SLEEP)
                }
                outcome => {
                    stats.attempted += 1;
                    match outcome {
                        PollOutcome::Dispatched(_) => stats.dispatched += 1,
                        _ => stats.failed += 1,
                    }
                    if self.schedule.is_complete(stats.attempted) {
                        break;
                    }
                    self.schedule.reads_frequency
                }
            };

            tokio::select! {
                _ = shutdown.recv() => {
                    info!(device = %device, "SQM-LE poller stopped by user");
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!(
            device = %device,
            attempted = stats.attempted,
            dispatched = stats.dispatched,
            failed = stats.failed,
            deferred = stats.deferred,
            "SQM-LE poller finished"
        );
        stats
    }
}
