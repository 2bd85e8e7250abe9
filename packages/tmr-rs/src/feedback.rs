// Cue decision: trigger predicate plus refractory timer

use crate::types::{ScoringResult, Stage};
use std::time::Duration;

/// Confidence a deep-sleep result must exceed before a cue is considered
pub const CUE_CONFIDENCE_THRESHOLD: f64 = 4.0;

/// Receives cue requests. Must return promptly; playback happens elsewhere.
pub trait CueSink: Send + Sync {
    fn play_cue(&self);
}

/// Cue sink that only records the cue in the log
#[derive(Debug, Default)]
pub struct LogCueSink;

impl CueSink for LogCueSink {
    fn play_cue(&self) {
        log::info!("Playing cue");
    }
}

#[derive(Debug, Clone)]
pub struct FeedbackController {
    refractory: Duration,
    last_emitted: Option<Duration>,
    cues_emitted: u64,
}

impl FeedbackController {
    pub fn new(refractory: Duration) -> Self {
        Self {
            refractory,
            last_emitted: None,
            cues_emitted: 0,
        }
    }

    /// Decide whether `result` at loop time `now` warrants a cue.
    ///
    /// Returns true and starts a new refractory period when the result is
    /// confident NREM 3 and at least `refractory` has passed since the last
    /// cue.
    pub fn evaluate(&mut self, result: &ScoringResult, now: Duration) -> bool {
        if !Self::is_trigger(result) {
            return false;
        }

        if let Some(last) = self.last_emitted {
            if now.saturating_sub(last) < self.refractory {
                return false;
            }
        }

        self.last_emitted = Some(now);
        self.cues_emitted += 1;
        true
    }

    pub fn is_trigger(result: &ScoringResult) -> bool {
        result.stage == Stage::Nrem3 && result.confidence > CUE_CONFIDENCE_THRESHOLD
    }

    pub fn last_emitted(&self) -> Option<Duration> {
        self.last_emitted
    }

    pub fn refractory(&self) -> Duration {
        self.refractory
    }

    pub fn cues_emitted(&self) -> u64 {
        self.cues_emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deep(confidence: f64) -> ScoringResult {
        ScoringResult::new(Stage::Nrem3, confidence)
    }

    #[test]
    fn test_refractory_spacing() {
        let mut controller = FeedbackController::new(Duration::from_secs(5));
        let emitted: Vec<u64> = [0, 2, 6]
            .into_iter()
            .filter(|&t| controller.evaluate(&deep(4.5), Duration::from_secs(t)))
            .collect();

        assert_eq!(emitted, vec![0, 6]);
        assert_eq!(controller.cues_emitted(), 2);
        assert_eq!(controller.last_emitted(), Some(Duration::from_secs(6)));
    }

    #[test]
    fn test_refractory_boundary_is_inclusive() {
        let mut controller = FeedbackController::new(Duration::from_secs(5));
        assert!(controller.evaluate(&deep(9.0), Duration::from_secs(10)));
        assert!(controller.evaluate(&deep(9.0), Duration::from_secs(15)));
    }

    #[test]
    fn test_trigger_predicate() {
        let mut controller = FeedbackController::new(Duration::ZERO);
        assert!(!controller.evaluate(&deep(4.0), Duration::ZERO));
        assert!(!controller.evaluate(&ScoringResult::new(Stage::Nrem2, 9.0), Duration::ZERO));
        assert!(!controller.evaluate(&ScoringResult::sentinel(), Duration::ZERO));
        assert!(controller.evaluate(&deep(4.01), Duration::ZERO));
    }

    #[test]
    fn test_non_trigger_does_not_reset_timer() {
        let mut controller = FeedbackController::new(Duration::from_secs(5));
        assert!(controller.evaluate(&deep(6.0), Duration::from_secs(0)));
        assert!(!controller.evaluate(&ScoringResult::new(Stage::Rem, 8.0), Duration::from_secs(3)));
        assert!(controller.evaluate(&deep(6.0), Duration::from_secs(5)));
    }
}
