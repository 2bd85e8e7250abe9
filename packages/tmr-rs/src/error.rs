use thiserror::Error;

#[derive(Error, Debug)]
pub enum TmrError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Recording error: {0}")]
    Recording(String),

    #[error("Channel mismatch: expected {expected} channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("Sample rate mismatch: expected {expected} Hz, got {actual} Hz")]
    SampleRateMismatch { expected: f64, actual: f64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TmrError>;
