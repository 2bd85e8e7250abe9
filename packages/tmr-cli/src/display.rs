// Terminal status line fed by loop telemetry, and the terminal cue sink

use std::io::Write;
use std::thread::JoinHandle;
use std::time::Duration;
use tmr_rs::{
    ConfidenceLevel, CueSink, TelemetryMessage, TelemetryReceiver, TelemetrySnapshot,
};

/// Render one snapshot as a single status line
pub fn status_line(snapshot: &TelemetrySnapshot, window_secs: f64) -> String {
    match snapshot.stage {
        None if snapshot.elapsed_seconds < window_secs => format!(
            "Waiting for {:.0} sec buffer to fill up... {:5.1} s",
            window_secs, snapshot.elapsed_seconds
        ),
        None => format!(
            "Waiting for first score...             {:5.1} s",
            snapshot.elapsed_seconds
        ),
        Some(stage) => format!(
            "Stage: {:<7} Confidence: {:<6} Scoring latency: {:6.0} ms  Acquisition latency: {:4.0} ms  Time: {:8.1} s",
            stage.label(),
            ConfidenceLevel::from_confidence(snapshot.confidence).label(),
            snapshot.latency_ms,
            snapshot.acquisition_late_ms,
            snapshot.elapsed_seconds
        ),
    }
}

/// Consume telemetry on a dedicated thread until the termination marker
pub fn spawn_status_display(receiver: TelemetryReceiver, window_secs: f64) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let stderr = std::io::stderr();
        loop {
            let Some(message) = receiver.recv_timeout(Duration::from_millis(250)) else {
                continue;
            };
            match message {
                TelemetryMessage::Snapshot(snapshot) => {
                    let mut handle = stderr.lock();
                    let _ = write!(handle, "\r{}", status_line(&snapshot, window_secs));
                    let _ = handle.flush();
                }
                TelemetryMessage::Terminated => {
                    let _ = writeln!(stderr.lock());
                    break;
                }
            }
        }
        let metrics = receiver.metrics();
        log::debug!(
            "Display received {} of {} snapshots ({} dropped)",
            metrics.total_received,
            metrics.total_pushed,
            metrics.total_dropped
        );
    })
}

/// Rings the terminal bell for each cue
pub struct BellCueSink {
    ring: bool,
}

impl BellCueSink {
    pub fn new(ring: bool) -> Self {
        Self { ring }
    }
}

impl CueSink for BellCueSink {
    fn play_cue(&self) {
        log::info!("Playing audio cue");
        if self.ring {
            let mut handle = std::io::stderr().lock();
            let _ = handle.write_all(b"\x07");
            let _ = handle.flush();
        }
    }
}
