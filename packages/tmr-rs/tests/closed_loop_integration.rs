use async_trait::async_trait;
use std::sync::Arc;
use tempfile::TempDir;
use tmr_rs::{
    telemetry_channel, FixedScorer, LoopConfig, OrchestrationLoop, Recording, Scorer,
    ScoringError, ScoringRequest, ScoringResult, SimulatedRealtimeSource, Stage, StopReason,
    TelemetryMessage,
};
use tokio_util::sync::CancellationToken;

/// Scorer whose requests never complete
struct HangingScorer;

#[async_trait]
impl Scorer for HangingScorer {
    async fn score(&self, _request: &ScoringRequest) -> Result<ScoringResult, ScoringError> {
        std::future::pending().await
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

fn session(
    seconds: f64,
    config: LoopConfig,
    scorer: Arc<dyn Scorer>,
) -> OrchestrationLoop {
    let recording = Recording::synthetic(seconds, 100.0).unwrap();
    let source = SimulatedRealtimeSource::new(recording, config.buffer_duration()).unwrap();
    OrchestrationLoop::new(config, source, scorer, "test-token").unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_ten_minute_replay_scores_every_period() {
    let dir = TempDir::new().unwrap();
    let results_path = dir.path().join("realtime_score.csv");

    let config = LoopConfig {
        realistic: false,
        results_path: Some(results_path.clone()),
        ..Default::default()
    };
    let scorer = Arc::new(FixedScorer::new(ScoringResult::new(Stage::Nrem2, 5.0)));

    let report = session(600.0, config, scorer)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::EndOfStream);
    assert_eq!(report.source.overflow_events, 0);
    assert_eq!(report.source.samples_lost, 0);
    assert_eq!(report.dispatch.timed_out, 0);

    // ceil((600 - 60) / 3)
    assert_eq!(report.results.len(), 180);
    assert!(report
        .results
        .records()
        .iter()
        .all(|r| r.stage == Stage::Nrem2 && r.confidence == 5.0));

    let first = report.results.records()[0];
    assert_eq!(first.elapsed_seconds, 60.0);
    let second = report.results.records()[1];
    assert_eq!(second.elapsed_seconds, 63.0);

    let csv = std::fs::read_to_string(&results_path).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("Time (sec),Stage,Confidence"));
    assert_eq!(lines.next(), Some("60.00,NREM 2,5.00"));
    assert_eq!(lines.count(), 179);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_scorer_times_out_each_period() {
    let config = LoopConfig {
        realistic: false,
        ..Default::default()
    };

    let report = session(120.0, config, Arc::new(HangingScorer))
        .run(CancellationToken::new())
        .await
        .unwrap();

    let records = report.results.records();
    assert_eq!(records.len(), 20);
    assert!(records
        .iter()
        .all(|r| r.stage == Stage::Unknown && r.confidence == 10.0));

    // Dispatches stay one period apart regardless of resolution
    let times: Vec<f64> = records.iter().map(|r| r.elapsed_seconds).collect();
    assert_eq!(&times[..3], &[60.0, 63.0, 66.0]);

    assert_eq!(report.dispatch.dispatched, 21);
    assert_eq!(report.dispatch.timed_out, 20);
    assert_eq!(report.dispatch.completed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_realistic_pacing_without_overflow() {
    let (tx, rx) = telemetry_channel(1024);
    let config = LoopConfig::default();
    let scorer = Arc::new(FixedScorer::new(ScoringResult::new(Stage::Rem, 6.0)));

    let started = tokio::time::Instant::now();
    let report = session(70.0, config, scorer)
        .with_telemetry(Arc::new(tx))
        .run(CancellationToken::new())
        .await
        .unwrap();

    // 700 reads, the first unthrottled
    assert_eq!(started.elapsed(), std::time::Duration::from_millis(69_900));
    assert_eq!(report.source.chunks_delivered, 700);
    assert_eq!(report.source.overflow_events, 0);

    let times: Vec<f64> = report
        .results
        .records()
        .iter()
        .map(|r| r.elapsed_seconds)
        .collect();
    assert_eq!(times, vec![60.0, 63.0, 66.0, 69.0]);

    let messages = rx.drain();
    assert!(matches!(messages.last(), Some(TelemetryMessage::Terminated)));
    let scored = messages
        .iter()
        .filter_map(|m| match m {
            TelemetryMessage::Snapshot(s) => s.stage,
            TelemetryMessage::Terminated => None,
        })
        .filter(|stage| *stage == Stage::Rem)
        .count();
    assert!(scored > 0);
}

#[tokio::test(start_paused = true)]
async fn test_external_shutdown_mid_session() {
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    let config = LoopConfig::default();
    let scorer = Arc::new(FixedScorer::new(ScoringResult::new(Stage::Wake, 8.0)));

    let handle = tokio::spawn(session(600.0, config, scorer).run(shutdown));

    tokio::time::sleep(std::time::Duration::from_secs(90)).await;
    trigger.cancel();

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.stop_reason, StopReason::Shutdown);
    assert!(report.elapsed_seconds < 600.0);
    assert!(!report.results.is_empty());
}
