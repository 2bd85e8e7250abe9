use crate::cli::{InputArgs, RunArgs, ScorerArgs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tmr_rs::{
    FixedScorer, HttpScorer, LoopConfig, Montage, Recording, Scorer, ScorerConfig, ScoringResult,
    SessionConfig, Stage, CHANNEL_COUNT, DEFAULT_MONTAGE,
};

/// Load the config file if one was given, defaults otherwise
pub fn load_session_config(path: &Option<String>) -> Result<SessionConfig, String> {
    match path {
        Some(path) => SessionConfig::from_file(path)
            .map_err(|e| format!("Invalid config file '{}': {}", path, e)),
        None => Ok(SessionConfig::default()),
    }
}

/// Apply command-line overrides to the loop section
pub fn apply_loop_overrides(mut config: LoopConfig, args: &RunArgs) -> Result<LoopConfig, String> {
    if let Some(buffer_ms) = args.buffer_ms {
        config.buffer_ms = buffer_ms;
    }
    if let Some(period) = args.scoring_period {
        config.scoring_period_secs = period;
    }
    if let Some(refractory) = args.refractory {
        config.refractory_secs = refractory;
    }
    if let Some(interval) = args.telemetry_interval_ms {
        config.telemetry_interval_ms = interval;
    }
    if args.replay {
        config.realistic = false;
    }
    if let Some(ref results) = args.results {
        config.results_path = Some(PathBuf::from(results));
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Apply command-line overrides to the scorer section
pub fn apply_scorer_overrides(mut config: ScorerConfig, args: &ScorerArgs) -> ScorerConfig {
    if let Some(ref url) = args.server_url {
        config.server_url = url.clone();
    }
    if let Some(ref token) = args.token {
        config.token = token.clone();
    }
    config
}

pub fn parse_montage(columns: &Option<Vec<usize>>) -> Result<Montage, String> {
    match columns {
        None => Ok(DEFAULT_MONTAGE),
        Some(columns) => Montage::try_from(columns.as_slice()).map_err(|_| {
            format!(
                "Montage needs exactly {} column indices (C3,C4,EOGL,EOGR,EMG), got {}",
                CHANNEL_COUNT,
                columns.len()
            )
        }),
    }
}

/// Read the recording named by the input arguments
pub fn load_recording(args: &InputArgs) -> Result<Recording, String> {
    if !(args.sr > 0.0) {
        return Err(format!("Sampling rate must be positive, got {}", args.sr));
    }

    match (&args.file, args.synthetic) {
        (Some(file), _) => {
            if !Path::new(file).exists() {
                return Err(format!("Input file not found: {}", file));
            }
            let montage = parse_montage(&args.montage)?;
            Recording::from_path(file, args.sr, montage)
                .map_err(|e| format!("Failed to read '{}': {}", file, e))
        }
        (None, Some(seconds)) => {
            if !(seconds > 0.0) {
                return Err(format!("Synthetic duration must be positive, got {}", seconds));
            }
            Recording::synthetic(seconds, args.sr).map_err(|e| e.to_string())
        }
        (None, None) => Err("Either --file or --synthetic must be given".to_string()),
    }
}

/// Warning for replay runs against the scoring service.
///
/// Replay advances loop time with the stream, so a scoring period passes in a
/// few milliseconds of wall time and a network scorer times out every cycle.
pub fn replay_scorer_warning(config: &LoopConfig, args: &ScorerArgs) -> Option<String> {
    if config.realistic || args.stub_stage.is_some() {
        return None;
    }
    Some(
        "Replay mode runs faster than real time; the scoring service cannot answer \
         within a period and every result will be Unknown. Use --stub-stage with --replay"
            .to_string(),
    )
}

/// Stub scorer when `--stub-stage` is set, the HTTP client otherwise
pub fn build_scorer(args: &ScorerArgs, config: &ScorerConfig) -> Result<Arc<dyn Scorer>, String> {
    if let Some(ref stage) = args.stub_stage {
        let stage = Stage::parse(stage).ok_or_else(|| {
            format!(
                "Unknown stage '{}'. Valid stages: wake, nrem1, nrem2, nrem3, rem, unknown or 0-3, 5, 9",
                stage
            )
        })?;
        if !(0.0..=10.0).contains(&args.stub_confidence) {
            return Err(format!(
                "Stub confidence must be within [0, 10], got {}",
                args.stub_confidence
            ));
        }
        let scorer = FixedScorer::new(ScoringResult::new(stage, args.stub_confidence))
            .with_delay(Duration::from_millis(args.stub_delay_ms));
        return Ok(Arc::new(scorer));
    }

    if config.token.is_empty() {
        return Err(
            "A service token is required. Set $TMR_TOKEN, use --token, or use --stub-stage"
                .to_string(),
        );
    }

    let scorer = HttpScorer::new(config).map_err(|e| e.to_string())?;
    log::info!("Scoring through {}", scorer.base_url());
    Ok(Arc::new(scorer))
}
