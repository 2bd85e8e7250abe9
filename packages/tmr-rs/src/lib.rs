pub mod config;
pub mod error;
pub mod feedback;
pub mod offline;
pub mod orchestrator;
pub mod recording;
pub mod result_log;
pub mod scoring;
pub mod streaming;
pub mod telemetry;
pub mod types;

pub use config::{LoopConfig, ScorerConfig, SessionConfig};
pub use error::{Result, TmrError};
pub use feedback::{CueSink, FeedbackController, LogCueSink};
pub use offline::AgreementReport;
pub use orchestrator::{OrchestrationLoop, SessionReport, StopReason};
pub use recording::{Montage, Recording, DEFAULT_MONTAGE};
pub use result_log::{ResultLog, ResultRecord};
pub use scoring::{
    FixedScorer, HttpScorer, Latest, Scorer, ScoringError, ScoringRequest, StagingDispatcher,
};
pub use streaming::{SampleChunk, SimulatedRealtimeSource, SlidingWindow, SourceRead};
pub use telemetry::{
    telemetry_channel, NullTelemetry, TelemetryMessage, TelemetryPublisher, TelemetryReceiver,
    TelemetrySink, TelemetrySnapshot,
};
pub use types::*;
