// Sleep staging through an external scoring service
//
// - `Scorer`: async trait over anything that can classify a 60 s window
// - `http`: client for the remote real-time scoring endpoint
// - `dispatcher`: keeps at most one request in flight, times out late requests
//   and publishes the latest result

pub mod dispatcher;
pub mod http;

use crate::types::{ScoringResult, CHANNEL_COUNT};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use dispatcher::{
    CurrentResult, DispatchOutcome, DispatchPhase, DispatchStats, Latest, Resolution,
    ScoredEpoch, StagingDispatcher,
};
pub use http::HttpScorer;

/// Ways a scoring attempt can fail. None of these stop acquisition.
#[derive(Error, Debug, Clone)]
pub enum ScoringError {
    #[error("Error communicating with server: {0}")]
    Transport(String),

    #[error("Server responded with status {0}")]
    HttpStatus(u16),

    #[error("Scoring failed: {0}")]
    Service(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl ScoringError {
    /// Short tag used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            ScoringError::Transport(_) | ScoringError::HttpStatus(_) => "transport",
            ScoringError::Service(_) => "service",
            ScoringError::Decode(_) => "decode",
        }
    }
}

/// Snapshot of the window submitted for scoring
#[derive(Debug, Clone, Serialize)]
pub struct ScoringRequest {
    /// C3, C4, EOGL, EOGR and EMG, in that order
    pub channels: Vec<Vec<f32>>,
    pub sampling_rates: [f64; CHANNEL_COUNT],
    #[serde(skip)]
    pub token: Arc<str>,
}

impl ScoringRequest {
    pub fn c3(&self) -> &[f32] {
        &self.channels[0]
    }

    pub fn c4(&self) -> &[f32] {
        &self.channels[1]
    }

    pub fn eog_left(&self) -> &[f32] {
        &self.channels[2]
    }

    pub fn eog_right(&self) -> &[f32] {
        &self.channels[3]
    }

    pub fn emg(&self) -> &[f32] {
        &self.channels[4]
    }
}

#[async_trait]
pub trait Scorer: Send + Sync {
    /// Classify one window. Implementations must be cancel-safe: the caller may
    /// drop the future at any await point.
    async fn score(&self, request: &ScoringRequest) -> Result<ScoringResult, ScoringError>;

    fn name(&self) -> &str;
}

/// Scorer that answers every request with the same result, optionally after a
/// fixed delay. Useful for dry runs without a service account.
#[derive(Debug, Clone)]
pub struct FixedScorer {
    result: ScoringResult,
    delay: Duration,
}

impl FixedScorer {
    pub fn new(result: ScoringResult) -> Self {
        Self {
            result,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Scorer for FixedScorer {
    async fn score(&self, _request: &ScoringRequest) -> Result<ScoringResult, ScoringError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.result)
    }

    fn name(&self) -> &str {
        "fixed"
    }
}
