// Staging dispatcher - periodic, single-flight scoring requests
//
// State machine per scoring cycle:
//
//   Idle --(period due)--> InFlight --(completion)--> Idle     [Completed | Failed]
//                             |
//                             +--(next period due)--> Idle     [TimedOut]
//
// Requests run as detached tokio tasks. Each task reports back over a single
// consumer channel tagged with its sequence number; the dispatcher only accepts
// the completion of the request it currently tracks, so a late answer from a
// cancelled request can never overwrite a newer result. Transitions happen only
// inside `maybe_dispatch` and `poll_latest`, both of which take `&mut self`.
//
// All `now` arguments are loop time: the offset from session start. Latency is
// always measured on the tokio clock, for timeouts as well as completions.

use super::{Scorer, ScoringError, ScoringRequest};
use crate::streaming::SlidingWindow;
use crate::types::{ScoringResult, CHANNEL_COUNT};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Message sent by a scoring task when the scorer returns
#[derive(Debug)]
struct Completion {
    seq: u64,
    outcome: Result<ScoringResult, ScoringError>,
    finished_at: Instant,
}

struct InFlight {
    seq: u64,
    /// Wall-clock time of dispatch, for latency
    started: Instant,
    /// Stream time the request's window ends at
    epoch_secs: f64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

enum DispatchState {
    Idle,
    InFlight(InFlight),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DispatchPhase {
    Idle,
    InFlight,
}

/// How a scoring cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Resolution {
    Completed,
    Failed,
    TimedOut,
}

/// The result currently considered "latest"
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurrentResult {
    pub result: ScoringResult,
    pub latency: Duration,
    pub epoch_secs: f64,
}

/// One resolved scoring cycle, in resolution order
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredEpoch {
    pub epoch_secs: f64,
    pub result: ScoringResult,
    pub latency: Duration,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Latest {
    Ready(CurrentResult),
    /// Nothing has resolved yet
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not due yet
    Noop,
    /// A new request was submitted; `timed_out` is set when the previous one
    /// had to be cancelled first
    Dispatched { seq: u64, timed_out: bool },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub stale_discarded: u64,
}

pub struct StagingDispatcher {
    scorer: Arc<dyn Scorer>,
    scoring_period: Duration,
    sampling_rates: [f64; CHANNEL_COUNT],
    token: Arc<str>,

    state: DispatchState,
    next_due: Option<Duration>,
    next_seq: u64,

    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,

    latest: Option<CurrentResult>,
    resolved: Vec<ScoredEpoch>,
    stats: DispatchStats,
}

impl StagingDispatcher {
    pub fn new(
        scorer: Arc<dyn Scorer>,
        scoring_period: Duration,
        sample_rate: f64,
        token: impl Into<Arc<str>>,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            scorer,
            scoring_period,
            sampling_rates: [sample_rate; CHANNEL_COUNT],
            token: token.into(),
            state: DispatchState::Idle,
            next_due: None,
            next_seq: 0,
            completions_tx,
            completions_rx,
            latest: None,
            resolved: Vec::new(),
            stats: DispatchStats::default(),
        }
    }

    /// Submit the window if a scoring period is due.
    ///
    /// A request still in flight when the period comes due is cancelled and
    /// resolved with the sentinel before the new one is sent. Dispatches stay
    /// on a fixed grid anchored at the first dispatch, so cadence does not drift
    /// with loop jitter or scorer latency.
    pub fn maybe_dispatch(
        &mut self,
        window: &SlidingWindow,
        now: Duration,
        epoch_secs: f64,
    ) -> DispatchOutcome {
        if let Some(due) = self.next_due {
            if now < due {
                return DispatchOutcome::Noop;
            }
        }

        // A request that finished but was not polled yet still counts
        self.collect_completions();

        let timed_out = matches!(self.state, DispatchState::InFlight(_));
        if timed_out {
            self.time_out();
        }

        let seq = self.dispatch(window, epoch_secs);

        self.next_due = Some(match self.next_due {
            None => now + self.scoring_period,
            Some(due) => {
                let mut next = due + self.scoring_period;
                while next <= now {
                    next += self.scoring_period;
                }
                next
            }
        });

        DispatchOutcome::Dispatched { seq, timed_out }
    }

    /// Apply any finished request and return the latest result
    pub fn poll_latest(&mut self) -> Latest {
        self.collect_completions();
        match self.latest {
            Some(current) => Latest::Ready(current),
            None => Latest::Pending,
        }
    }

    /// Resolved cycles since the previous call, oldest first
    pub fn drain_resolved(&mut self) -> Vec<ScoredEpoch> {
        std::mem::take(&mut self.resolved)
    }

    /// Cancel any outstanding request without recording a result
    pub fn shutdown(&mut self) {
        if let DispatchState::InFlight(flight) =
            std::mem::replace(&mut self.state, DispatchState::Idle)
        {
            log::debug!("Abandoning in-flight scoring request {}", flight.seq);
            flight.cancel.cancel();
        }
    }

    pub fn phase(&self) -> DispatchPhase {
        match self.state {
            DispatchState::Idle => DispatchPhase::Idle,
            DispatchState::InFlight(_) => DispatchPhase::InFlight,
        }
    }

    pub fn in_flight_seq(&self) -> Option<u64> {
        match &self.state {
            DispatchState::Idle => None,
            DispatchState::InFlight(flight) => Some(flight.seq),
        }
    }

    /// Loop time at which the next request is due
    pub fn next_due(&self) -> Option<Duration> {
        self.next_due
    }

    pub fn scoring_period(&self) -> Duration {
        self.scoring_period
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats.clone()
    }

    fn dispatch(&mut self, window: &SlidingWindow, epoch_secs: f64) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        let request = ScoringRequest {
            channels: window.snapshot(),
            sampling_rates: self.sampling_rates,
            token: Arc::clone(&self.token),
        };

        let scorer = Arc::clone(&self.scorer);
        let tx = self.completions_tx.clone();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;

                _ = task_cancel.cancelled() => {
                    log::debug!("Scoring request {} cancelled", seq);
                }

                outcome = scorer.score(&request) => {
                    // Receiver is gone once the dispatcher is dropped
                    let _ = tx.send(Completion {
                        seq,
                        outcome,
                        finished_at: Instant::now(),
                    });
                }
            }
        });

        log::debug!(
            "Dispatched scoring request {} to {} scorer at {:.2} s",
            seq,
            self.scorer.name(),
            epoch_secs
        );

        self.state = DispatchState::InFlight(InFlight {
            seq,
            started: Instant::now(),
            epoch_secs,
            cancel,
            handle,
        });
        self.stats.dispatched += 1;
        seq
    }

    fn time_out(&mut self) {
        let DispatchState::InFlight(flight) =
            std::mem::replace(&mut self.state, DispatchState::Idle)
        else {
            return;
        };

        flight.cancel.cancel();
        let latency = flight.started.elapsed();

        log::warn!(
            "Scoring could not be completed in {:.1} s (request {}); consider a longer scoring period",
            self.scoring_period.as_secs_f64(),
            flight.seq
        );

        self.stats.timed_out += 1;
        self.resolve(
            flight.epoch_secs,
            ScoringResult::sentinel(),
            latency,
            Resolution::TimedOut,
        );
    }

    fn collect_completions(&mut self) {
        while let Ok(completion) = self.completions_rx.try_recv() {
            let is_current = matches!(
                &self.state,
                DispatchState::InFlight(flight) if flight.seq == completion.seq
            );
            if !is_current {
                self.stats.stale_discarded += 1;
                log::debug!("Discarding stale result of request {}", completion.seq);
                continue;
            }

            let DispatchState::InFlight(flight) =
                std::mem::replace(&mut self.state, DispatchState::Idle)
            else {
                continue;
            };
            // Task has already sent its only message and is finishing
            drop(flight.handle);

            let latency = completion
                .finished_at
                .saturating_duration_since(flight.started);

            match completion.outcome {
                Ok(result) => {
                    self.stats.completed += 1;
                    self.resolve(flight.epoch_secs, result, latency, Resolution::Completed);
                }
                Err(e) => {
                    log::warn!("Scoring request {} failed ({}): {}", flight.seq, e.kind(), e);
                    self.stats.failed += 1;
                    self.resolve(
                        flight.epoch_secs,
                        ScoringResult::sentinel(),
                        latency,
                        Resolution::Failed,
                    );
                }
            }
        }
    }

    fn resolve(
        &mut self,
        epoch_secs: f64,
        result: ScoringResult,
        latency: Duration,
        resolution: Resolution,
    ) {
        log::info!(
            "Time: {:.2} Stage: {} Confidence: {:.2}",
            epoch_secs,
            result.stage,
            result.confidence
        );

        self.latest = Some(CurrentResult {
            result,
            latency,
            epoch_secs,
        });
        self.resolved.push(ScoredEpoch {
            epoch_secs,
            result,
            latency,
            resolution,
        });
    }
}

impl Drop for StagingDispatcher {
    fn drop(&mut self) {
        if let DispatchState::InFlight(flight) = &self.state {
            flight.cancel.cancel();
        }
    }
}
