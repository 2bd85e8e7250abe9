use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of signal channels the scoring service expects
pub const CHANNEL_COUNT: usize = 5;

/// Channel montage, in the order the scorer consumes them
pub const CHANNEL_NAMES: [&str; CHANNEL_COUNT] = [
    "C3-A2 (uV)",
    "C4-A1 (uV)",
    "EOGL-A2 (uV)",
    "EOGR-A2 (uV)",
    "EMG (uV)",
];

/// Duration of one scoring epoch in seconds
pub const EPOCH_SECS: f64 = 30.0;

/// Confidence reported alongside `Stage::Unknown` when no score could be obtained
pub const SENTINEL_CONFIDENCE: f64 = 10.0;

/// Sleep stage as classified by the scoring service.
///
/// Wire codes follow the service: 0 Wake, 1-3 NREM, 5 REM, 9 Unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Wake,
    Nrem1,
    Nrem2,
    Nrem3,
    Rem,
    Unknown,
}

impl Stage {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Stage::Wake),
            1 => Some(Stage::Nrem1),
            2 => Some(Stage::Nrem2),
            3 => Some(Stage::Nrem3),
            5 => Some(Stage::Rem),
            9 => Some(Stage::Unknown),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Stage::Wake => 0,
            Stage::Nrem1 => 1,
            Stage::Nrem2 => 2,
            Stage::Nrem3 => 3,
            Stage::Rem => 5,
            Stage::Unknown => 9,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Wake => "Wake",
            Stage::Nrem1 => "NREM 1",
            Stage::Nrem2 => "NREM 2",
            Stage::Nrem3 => "NREM 3",
            Stage::Rem => "REM",
            Stage::Unknown => "Unknown",
        }
    }

    /// Parse either a wire code ("3") or a label ("NREM 3", "nrem3", "rem")
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<i64>() {
            return Self::from_code(code);
        }
        let normalized: String = trimmed
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "wake" | "w" => Some(Stage::Wake),
            "nrem1" | "n1" => Some(Stage::Nrem1),
            "nrem2" | "n2" => Some(Stage::Nrem2),
            "nrem3" | "n3" | "sws" => Some(Stage::Nrem3),
            "rem" | "r" => Some(Stage::Rem),
            "unknown" => Some(Stage::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Display bucket for a confidence value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence < 2.0 {
            ConfidenceLevel::Low
        } else if confidence < 4.0 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::High
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "Low",
            ConfidenceLevel::Medium => "Medium",
            ConfidenceLevel::High => "High",
        }
    }
}

/// A stage classification with its confidence in [0, 10]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    pub stage: Stage,
    pub confidence: f64,
}

impl ScoringResult {
    pub fn new(stage: Stage, confidence: f64) -> Self {
        Self { stage, confidence }
    }

    /// Result substituted when scoring timed out or failed
    pub fn sentinel() -> Self {
        Self {
            stage: Stage::Unknown,
            confidence: SENTINEL_CONFIDENCE,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.stage == Stage::Unknown
    }

    pub fn confidence_level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_confidence(self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_codes_roundtrip() {
        for stage in [
            Stage::Wake,
            Stage::Nrem1,
            Stage::Nrem2,
            Stage::Nrem3,
            Stage::Rem,
            Stage::Unknown,
        ] {
            assert_eq!(Stage::from_code(stage.code()), Some(stage));
        }
        assert_eq!(Stage::from_code(4), None);
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!(Stage::parse("NREM 3"), Some(Stage::Nrem3));
        assert_eq!(Stage::parse("nrem2"), Some(Stage::Nrem2));
        assert_eq!(Stage::parse("5"), Some(Stage::Rem));
        assert_eq!(Stage::parse("deep"), None);
    }

    #[test]
    fn test_confidence_buckets() {
        assert_eq!(ConfidenceLevel::from_confidence(1.99), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_confidence(2.0), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_confidence(3.99), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_confidence(4.0), ConfidenceLevel::High);
    }

    #[test]
    fn test_sentinel() {
        let result = ScoringResult::sentinel();
        assert_eq!(result.stage, Stage::Unknown);
        assert_eq!(result.confidence, 10.0);
        assert!(result.is_sentinel());
    }
}
