// Closed-loop acquisition
//
// One task pulls buffers from the source, keeps the 60 s window current, hands
// the window to the staging dispatcher on a fixed cadence, asks the feedback
// controller whether to cue, and publishes snapshots. Scoring itself runs on a
// separate task and is only ever polled from here.

use crate::config::LoopConfig;
use crate::error::{Result, TmrError};
use crate::feedback::{CueSink, FeedbackController, LogCueSink};
use crate::result_log::{ResultLog, ResultRecord};
use crate::scoring::{DispatchStats, Latest, Scorer, StagingDispatcher};
use crate::streaming::{SimulatedRealtimeSource, SlidingWindow, SourceRead, SourceStats};
use crate::telemetry::{NullTelemetry, TelemetryMessage, TelemetrySink, TelemetrySnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    EndOfStream,
    Shutdown,
}

/// Summary of a finished session
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stop_reason: StopReason,
    /// Stream time covered
    pub elapsed_seconds: f64,
    pub source: SourceStats,
    pub dispatch: DispatchStats,
    pub cues_emitted: u64,
    pub results: ResultLog,
}

/// Time base for cadence decisions
enum LoopClock {
    /// Wall-clock since session start
    Wall(Instant),
    /// Stream time derived from samples read
    Stream,
}

impl LoopClock {
    fn now(&self, window: &SlidingWindow) -> Duration {
        match self {
            LoopClock::Wall(started) => started.elapsed(),
            LoopClock::Stream => {
                let nanos = window.samples_ingested() as f64 * 1e9 / window.sample_rate();
                Duration::from_nanos(nanos.round() as u64)
            }
        }
    }
}

pub struct OrchestrationLoop {
    config: LoopConfig,
    source: SimulatedRealtimeSource,
    window: SlidingWindow,
    dispatcher: StagingDispatcher,
    feedback: FeedbackController,
    cue_sink: Arc<dyn CueSink>,
    telemetry: Arc<dyn TelemetrySink>,
    results: ResultLog,
}

impl OrchestrationLoop {
    pub fn new(
        config: LoopConfig,
        source: SimulatedRealtimeSource,
        scorer: Arc<dyn Scorer>,
        token: impl Into<Arc<str>>,
    ) -> Result<Self> {
        config.validate()?;

        if source.buffer_duration() != config.buffer_duration() {
            return Err(TmrError::InvalidConfig(format!(
                "Source reads {} ms buffers but the loop is configured for {} ms",
                source.buffer_duration().as_millis(),
                config.buffer_ms
            )));
        }

        let sample_rate = source.sample_rate();
        let window = SlidingWindow::new(
            config.channel_count,
            config.window_samples(sample_rate),
            sample_rate,
        )?;
        let dispatcher =
            StagingDispatcher::new(scorer, config.scoring_period(), sample_rate, token);
        let feedback = FeedbackController::new(config.refractory());

        Ok(Self {
            config,
            source,
            window,
            dispatcher,
            feedback,
            cue_sink: Arc::new(LogCueSink),
            telemetry: Arc::new(NullTelemetry),
            results: ResultLog::new(),
        })
    }

    pub fn with_cue_sink(mut self, cue_sink: Arc<dyn CueSink>) -> Self {
        self.cue_sink = cue_sink;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Run until the recording ends or `shutdown` is cancelled
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<SessionReport> {
        let session_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let realistic = self.config.realistic;
        let clock = if realistic {
            LoopClock::Wall(Instant::now())
        } else {
            LoopClock::Stream
        };

        log::info!(
            "Session {} started: {:.1} s recording at {} Hz, {} ms buffers, scoring every {:.1} s{}",
            session_id,
            self.source.total_samples() as f64 / self.source.sample_rate(),
            self.source.sample_rate(),
            self.config.buffer_ms,
            self.config.scoring_period_secs,
            if realistic { "" } else { " (replay)" }
        );

        match self.drive(&shutdown, &clock).await {
            Ok(stop_reason) => self.finish(session_id, started_at, stop_reason),
            Err(e) => {
                log::error!("Session {} aborted: {}", session_id, e);
                self.dispatcher.shutdown();
                self.telemetry.send(TelemetryMessage::Terminated);
                Err(e)
            }
        }
    }

    async fn drive(
        &mut self,
        shutdown: &CancellationToken,
        clock: &LoopClock,
    ) -> Result<StopReason> {
        let realistic = self.config.realistic;
        let tail_samples = self.config.telemetry_tail_samples(self.source.sample_rate());
        let telemetry_interval = self.config.telemetry_interval();
        let mut last_telemetry: Option<Duration> = None;
        let mut overflows_seen = 0;

        loop {
            let read = tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    log::info!("Shutdown requested");
                    return Ok(StopReason::Shutdown);
                }

                read = self.source.read_buffer(realistic) => read,
            };

            let chunk = match read {
                SourceRead::Chunk(chunk) => chunk,
                SourceRead::EndOfStream => return Ok(StopReason::EndOfStream),
            };

            self.window.ingest(chunk)?;
            let elapsed_secs = self.window.elapsed_secs();
            let now = clock.now(&self.window);

            let stats = self.source.stats();
            let acquisition_late_ms = if stats.overflow_events > overflows_seen {
                overflows_seen = stats.overflow_events;
                self.source
                    .last_overflow()
                    .map(|o| o.late_by.as_secs_f64() * 1000.0)
                    .unwrap_or(0.0)
            } else {
                0.0
            };

            let telemetry_due = last_telemetry
                .map(|last| now.saturating_sub(last) >= telemetry_interval)
                .unwrap_or(true);

            if !self.window.is_primed() {
                if telemetry_due {
                    let mut snapshot = TelemetrySnapshot::warming_up(elapsed_secs);
                    snapshot.acquisition_late_ms = acquisition_late_ms;
                    self.telemetry.send(TelemetryMessage::Snapshot(snapshot));
                    last_telemetry = Some(now);
                }
                continue;
            }

            self.dispatcher.maybe_dispatch(&self.window, now, elapsed_secs);
            let latest = self.dispatcher.poll_latest();
            self.record_resolved();

            if let Latest::Ready(current) = latest {
                if self.feedback.evaluate(&current.result, now) {
                    log::info!("Playing cue at {:.2} s", elapsed_secs);
                    self.cue_sink.play_cue();
                }
            }

            if telemetry_due {
                let (stage, confidence, latency_ms) = match latest {
                    Latest::Ready(current) => (
                        Some(current.result.stage),
                        current.result.confidence,
                        current.latency.as_secs_f64() * 1000.0,
                    ),
                    // Primed but nothing resolved yet
                    Latest::Pending => (None, 0.0, 0.0),
                };
                self.telemetry.send(TelemetryMessage::Snapshot(TelemetrySnapshot {
                    window_tail: self.window.tail(tail_samples),
                    stage,
                    confidence,
                    latency_ms,
                    elapsed_seconds: elapsed_secs,
                    acquisition_late_ms,
                }));
                last_telemetry = Some(now);
            }
        }
    }

    fn record_resolved(&mut self) {
        for scored in self.dispatcher.drain_resolved() {
            self.results.push(ResultRecord::new(scored.epoch_secs, scored.result));
        }
    }

    fn finish(
        mut self,
        session_id: String,
        started_at: DateTime<Utc>,
        stop_reason: StopReason,
    ) -> Result<SessionReport> {
        self.dispatcher.shutdown();
        self.record_resolved();

        log::info!(
            "Stream ended after {:.2} s; {} scoring results",
            self.window.elapsed_secs(),
            self.results.len()
        );

        let persisted = match &self.config.results_path {
            Some(path) => self.results.save(path),
            None => Ok(()),
        };

        // The display must be released even when the log could not be written
        self.telemetry.send(TelemetryMessage::Terminated);
        persisted?;

        Ok(SessionReport {
            session_id,
            started_at,
            finished_at: Utc::now(),
            stop_reason,
            elapsed_seconds: self.window.elapsed_secs(),
            source: self.source.stats(),
            dispatch: self.dispatcher.stats(),
            cues_emitted: self.feedback.cues_emitted(),
            results: self.results,
        })
    }
}
