// Lossy telemetry channel between the loop and a display
//
// The loop never waits on a display. Snapshots go into a bounded lock-free
// queue; when the consumer falls behind the oldest snapshot is dropped so the
// newest state always gets through.

use crate::types::Stage;
use crossbeam::queue::ArrayQueue;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Current state of the session, as shown to an operator
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    /// Newest samples of each channel
    pub window_tail: Vec<Vec<f32>>,
    /// None while the window is still filling
    pub stage: Option<Stage>,
    pub confidence: f64,
    pub latency_ms: f64,
    /// Stream time covered so far
    pub elapsed_seconds: f64,
    /// Time the last read spent past its deadline
    pub acquisition_late_ms: f64,
}

impl TelemetrySnapshot {
    pub fn warming_up(elapsed_seconds: f64) -> Self {
        Self {
            window_tail: Vec::new(),
            stage: None,
            confidence: 0.0,
            latency_ms: 0.0,
            elapsed_seconds,
            acquisition_late_ms: 0.0,
        }
    }

    pub fn is_warming_up(&self) -> bool {
        self.stage.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum TelemetryMessage {
    Snapshot(TelemetrySnapshot),
    /// Session over; nothing follows
    Terminated,
}

/// Non-blocking destination for telemetry
pub trait TelemetrySink: Send + Sync {
    fn send(&self, message: TelemetryMessage);
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn send(&self, _message: TelemetryMessage) {}
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TelemetryMetrics {
    pub total_pushed: u64,
    pub total_received: u64,
    pub total_dropped: u64,
    pub capacity: usize,
}

struct Shared {
    queue: ArrayQueue<TelemetryMessage>,
    total_pushed: AtomicU64,
    total_received: AtomicU64,
    total_dropped: AtomicU64,
}

impl Shared {
    fn metrics(&self) -> TelemetryMetrics {
        TelemetryMetrics {
            total_pushed: self.total_pushed.load(Ordering::Relaxed),
            total_received: self.total_received.load(Ordering::Relaxed),
            total_dropped: self.total_dropped.load(Ordering::Relaxed),
            capacity: self.queue.capacity(),
        }
    }
}

/// Create a drop-oldest channel holding at most `capacity` messages
pub fn telemetry_channel(capacity: usize) -> (TelemetryPublisher, TelemetryReceiver) {
    let shared = Arc::new(Shared {
        queue: ArrayQueue::new(capacity.max(1)),
        total_pushed: AtomicU64::new(0),
        total_received: AtomicU64::new(0),
        total_dropped: AtomicU64::new(0),
    });
    (
        TelemetryPublisher {
            shared: Arc::clone(&shared),
        },
        TelemetryReceiver { shared },
    )
}

/// Producer half, handed to the loop
#[derive(Clone)]
pub struct TelemetryPublisher {
    shared: Arc<Shared>,
}

impl TelemetryPublisher {
    pub fn metrics(&self) -> TelemetryMetrics {
        self.shared.metrics()
    }
}

impl TelemetrySink for TelemetryPublisher {
    fn send(&self, message: TelemetryMessage) {
        if let Some(evicted) = self.shared.queue.force_push(message) {
            self.shared.total_dropped.fetch_add(1, Ordering::Relaxed);
            log::trace!(
                "Telemetry consumer behind, dropped {}",
                match evicted {
                    TelemetryMessage::Snapshot(_) => "snapshot",
                    TelemetryMessage::Terminated => "termination marker",
                }
            );
        }
        self.shared.total_pushed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Consumer half, owned by the display
pub struct TelemetryReceiver {
    shared: Arc<Shared>,
}

impl TelemetryReceiver {
    pub fn try_recv(&self) -> Option<TelemetryMessage> {
        self.shared.queue.pop().map(|message| {
            self.shared.total_received.fetch_add(1, Ordering::Relaxed);
            message
        })
    }

    /// Poll until a message arrives or `timeout` passes
    pub fn recv_timeout(&self, timeout: Duration) -> Option<TelemetryMessage> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = self.try_recv() {
                return Some(message);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(5)));
        }
    }

    /// Everything currently queued, oldest first
    pub fn drain(&self) -> Vec<TelemetryMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    pub fn len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    pub fn metrics(&self) -> TelemetryMetrics {
        self.shared.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(elapsed: f64) -> TelemetryMessage {
        TelemetryMessage::Snapshot(TelemetrySnapshot::warming_up(elapsed))
    }

    fn elapsed_of(message: &TelemetryMessage) -> Option<f64> {
        match message {
            TelemetryMessage::Snapshot(s) => Some(s.elapsed_seconds),
            TelemetryMessage::Terminated => None,
        }
    }

    #[test]
    fn test_drop_oldest_when_full() {
        let (tx, rx) = telemetry_channel(3);
        for i in 0..5 {
            tx.send(snapshot(i as f64));
        }

        let received: Vec<_> = rx.drain().iter().filter_map(elapsed_of).collect();
        assert_eq!(received, vec![2.0, 3.0, 4.0]);

        let metrics = tx.metrics();
        assert_eq!(metrics.total_pushed, 5);
        assert_eq!(metrics.total_dropped, 2);
        assert_eq!(metrics.total_received, 3);
    }

    #[test]
    fn test_termination_marker_survives_backlog() {
        let (tx, rx) = telemetry_channel(2);
        for i in 0..10 {
            tx.send(snapshot(i as f64));
        }
        tx.send(TelemetryMessage::Terminated);

        let messages = rx.drain();
        assert!(matches!(messages.last(), Some(TelemetryMessage::Terminated)));
    }

    #[test]
    fn test_recv_timeout_empty() {
        let (_tx, rx) = telemetry_channel(2);
        assert!(rx.recv_timeout(Duration::from_millis(10)).is_none());
        assert!(rx.is_empty());
    }

    #[test]
    fn test_cross_thread_delivery() {
        let (tx, rx) = telemetry_channel(4);
        let producer = std::thread::spawn(move || {
            tx.send(snapshot(1.0));
            tx.send(TelemetryMessage::Terminated);
        });

        let mut saw_terminated = false;
        while let Some(message) = rx.recv_timeout(Duration::from_secs(5)) {
            if matches!(message, TelemetryMessage::Terminated) {
                saw_terminated = true;
                break;
            }
        }
        producer.join().unwrap();
        assert!(saw_terminated);
    }
}
