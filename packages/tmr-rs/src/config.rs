// Session configuration
//
// All tunables of the acquisition loop and the scoring client live here and are
// handed to the loop constructor. Values can be loaded from a JSON file; missing
// fields fall back to the defaults below.

use crate::error::{Result, TmrError};
use crate::types::CHANNEL_COUNT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "https://z3score.com/api/v2";

/// Acquisition loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Duration of each source read in milliseconds; a read issued later than
    /// this after the previous one loses samples
    pub buffer_ms: u64,

    /// Seconds between scoring requests; also the per-request timeout
    pub scoring_period_secs: f64,

    /// Minimum interval between telemetry snapshots in milliseconds
    pub telemetry_interval_ms: u64,

    /// Minimum spacing between feedback cues in seconds
    pub refractory_secs: f64,

    /// Length of the analysis window in seconds (two epochs)
    pub window_secs: f64,

    /// Channel count; the scoring service only accepts 5
    pub channel_count: usize,

    /// Trailing seconds of the window included in telemetry snapshots
    pub telemetry_tail_secs: f64,

    /// Telemetry queue capacity; the oldest snapshot is dropped when full
    pub telemetry_capacity: usize,

    /// Pace reads at wall-clock speed. When false the recording is replayed
    /// as fast as possible and stream time drives all timers.
    pub realistic: bool,

    /// Where the result log is written on loop exit
    pub results_path: Option<PathBuf>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            buffer_ms: 100,
            scoring_period_secs: 3.0,
            telemetry_interval_ms: 50,
            refractory_secs: 5.0,
            window_secs: 60.0,
            channel_count: CHANNEL_COUNT,
            telemetry_tail_secs: 30.0,
            telemetry_capacity: 8,
            realistic: true,
            results_path: None,
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_ms == 0 {
            return Err(TmrError::InvalidConfig(
                "buffer_ms must be greater than 0".to_string(),
            ));
        }
        if !(self.scoring_period_secs > 0.0) {
            return Err(TmrError::InvalidConfig(format!(
                "scoring_period_secs must be positive, got {}",
                self.scoring_period_secs
            )));
        }
        if !(self.refractory_secs >= 0.0) {
            return Err(TmrError::InvalidConfig(format!(
                "refractory_secs must not be negative, got {}",
                self.refractory_secs
            )));
        }
        if !(self.window_secs > 0.0) {
            return Err(TmrError::InvalidConfig(format!(
                "window_secs must be positive, got {}",
                self.window_secs
            )));
        }
        if self.channel_count != CHANNEL_COUNT {
            return Err(TmrError::InvalidConfig(format!(
                "channel_count must be {}, got {}",
                CHANNEL_COUNT, self.channel_count
            )));
        }
        if !(self.telemetry_tail_secs > 0.0) || self.telemetry_tail_secs > self.window_secs {
            return Err(TmrError::InvalidConfig(format!(
                "telemetry_tail_secs must be in (0, {}], got {}",
                self.window_secs, self.telemetry_tail_secs
            )));
        }
        if self.telemetry_capacity == 0 {
            return Err(TmrError::InvalidConfig(
                "telemetry_capacity must be greater than 0".to_string(),
            ));
        }
        if (self.buffer_ms as f64) / 1000.0 > self.window_secs {
            return Err(TmrError::InvalidConfig(format!(
                "buffer_ms ({}) exceeds the window length ({} s)",
                self.buffer_ms, self.window_secs
            )));
        }
        Ok(())
    }

    pub fn buffer_duration(&self) -> Duration {
        Duration::from_millis(self.buffer_ms)
    }

    pub fn scoring_period(&self) -> Duration {
        Duration::from_secs_f64(self.scoring_period_secs)
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms)
    }

    pub fn refractory(&self) -> Duration {
        Duration::from_secs_f64(self.refractory_secs)
    }

    /// Window length in samples at the given sampling rate
    pub fn window_samples(&self, sample_rate: f64) -> usize {
        (self.window_secs * sample_rate).round() as usize
    }

    pub fn telemetry_tail_samples(&self, sample_rate: f64) -> usize {
        (self.telemetry_tail_secs * sample_rate).round() as usize
    }
}

/// Scoring service client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub server_url: String,

    /// Opaque authorization token issued by the service
    pub token: String,

    /// Transport-level timeout for a single HTTP exchange
    pub request_timeout_secs: u64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            token: String::new(),
            request_timeout_secs: 30,
        }
    }
}

/// Everything a session needs, as stored in a config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    #[serde(rename = "loop")]
    pub loop_config: LoopConfig,
    pub scorer: ScorerConfig,
}

impl SessionConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: SessionConfig = serde_json::from_str(&content)?;
        config.loop_config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = LoopConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_duration(), Duration::from_millis(100));
        assert_eq!(config.scoring_period(), Duration::from_secs(3));
        assert_eq!(config.refractory(), Duration::from_secs(5));
        assert_eq!(config.window_samples(256.0), 15360);
    }

    #[test]
    fn test_rejects_wrong_channel_count() {
        let config = LoopConfig {
            channel_count: 4,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TmrError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_zero_buffer() {
        let config = LoopConfig {
            buffer_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"loop": {{"buffer_ms": 50, "realistic": false}}, "scorer": {{"token": "abc"}}}}"#
        )
        .unwrap();

        let config = SessionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.loop_config.buffer_ms, 50);
        assert!(!config.loop_config.realistic);
        assert_eq!(config.loop_config.scoring_period_secs, 3.0);
        assert_eq!(config.scorer.token, "abc");
        assert_eq!(config.scorer.server_url, DEFAULT_SERVER_URL);
    }
}
