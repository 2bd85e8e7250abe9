// Epoch-by-epoch scoring of a whole recording, and agreement with an expert
//
// Scoring epoch N needs the 60 s window made of epochs N-1 and N, so epoch 0 is
// never scored and is recorded as Unknown.

use crate::error::{Result, TmrError};
use crate::recording::Recording;
use crate::scoring::{Scorer, ScoringRequest};
use crate::types::{ScoringResult, Stage, CHANNEL_COUNT, EPOCH_SECS};
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// Number of whole epochs in the recording
pub fn epoch_count(recording: &Recording) -> usize {
    match epoch_samples(recording.sample_rate()) {
        0 => 0,
        per_epoch => recording.num_samples() / per_epoch,
    }
}

fn epoch_samples(sample_rate: f64) -> usize {
    (EPOCH_SECS * sample_rate).round() as usize
}

/// Score every epoch of `recording`. The returned vector has one entry per
/// epoch; failures become the Unknown sentinel.
pub async fn score_epochs(
    recording: &Recording,
    scorer: &dyn Scorer,
    token: &str,
) -> Vec<ScoringResult> {
    let total_epochs = epoch_count(recording);
    let per_epoch = epoch_samples(recording.sample_rate());
    let token: Arc<str> = token.into();

    let mut results = Vec::with_capacity(total_epochs);
    if total_epochs == 0 {
        return results;
    }
    results.push(ScoringResult::sentinel());

    for epoch in 1..total_epochs {
        let request = ScoringRequest {
            channels: recording.slice((epoch - 1) * per_epoch, 2 * per_epoch),
            sampling_rates: [recording.sample_rate(); CHANNEL_COUNT],
            token: Arc::clone(&token),
        };

        log::info!("Scoring epoch number {}", epoch);
        let result = match scorer.score(&request).await {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Epoch {} could not be scored ({}): {}", epoch, e.kind(), e);
                ScoringResult::sentinel()
            }
        };

        log::info!(
            "Sleep Stage: {}, Confidence: {}",
            result.stage,
            result.confidence_level().label()
        );
        results.push(result);
    }

    results
}

/// Write one stage code per line
pub fn write_auto_scores<W: std::io::Write>(results: &[ScoringResult], writer: W) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);
    for result in results {
        csv_writer.write_record([result.stage.code().to_string()])?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn save_auto_scores<P: AsRef<Path>>(results: &[ScoringResult], path: P) -> Result<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_auto_scores(results, std::io::BufWriter::new(file))?;
    log::info!("Saved auto scores in {}", path.as_ref().display());
    Ok(())
}

/// Read an expert hypnogram: integer stage codes, any number per row
pub fn read_expert_scores<R: Read>(reader: R) -> Result<Vec<Stage>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut stages = Vec::new();
    for (row, record) in csv_reader.records().enumerate() {
        let record = record?;
        for field in record.iter().map(str::trim).filter(|f| !f.is_empty()) {
            let code: i64 = field.parse().map_err(|_| {
                TmrError::Recording(format!(
                    "Expert scores row {}: '{}' is not a stage code",
                    row + 1,
                    field
                ))
            })?;
            let stage = Stage::from_code(code).ok_or_else(|| {
                TmrError::Recording(format!(
                    "Expert scores row {}: unknown stage code {}",
                    row + 1,
                    code
                ))
            })?;
            stages.push(stage);
        }
    }
    Ok(stages)
}

pub fn load_expert_scores<P: AsRef<Path>>(path: P) -> Result<Vec<Stage>> {
    let file = std::fs::File::open(path.as_ref())?;
    read_expert_scores(file)
}

#[derive(Debug, Clone, Serialize)]
pub struct AgreementReport {
    pub epochs: usize,
    pub accuracy_pct: f64,
    pub kappa: f64,
}

/// Unknown counts as Wake on both sides
fn comparable_code(stage: Stage) -> i64 {
    match stage {
        Stage::Unknown => Stage::Wake.code(),
        other => other.code(),
    }
}

/// Percent agreement and Cohen's kappa over the epochs both sides cover
pub fn agreement(auto: &[Stage], expert: &[Stage]) -> Result<AgreementReport> {
    let epochs = auto.len().min(expert.len());
    if epochs == 0 {
        return Err(TmrError::Recording(
            "No overlapping epochs to compare".to_string(),
        ));
    }
    if auto.len() != expert.len() {
        log::warn!(
            "Auto scores cover {} epochs, expert scores {}; comparing the first {}",
            auto.len(),
            expert.len(),
            epochs
        );
    }

    let a: Vec<i64> = auto[..epochs].iter().map(|s| comparable_code(*s)).collect();
    let b: Vec<i64> = expert[..epochs].iter().map(|s| comparable_code(*s)).collect();

    let matches = a.iter().zip(&b).filter(|(x, y)| x == y).count();
    let observed = matches as f64 / epochs as f64;

    let mut labels: Vec<i64> = a.iter().chain(&b).copied().collect();
    labels.sort_unstable();
    labels.dedup();

    let n = epochs as f64;
    let expected: f64 = labels
        .iter()
        .map(|label| {
            let pa = a.iter().filter(|x| *x == label).count() as f64 / n;
            let pb = b.iter().filter(|x| *x == label).count() as f64 / n;
            pa * pb
        })
        .sum();

    let kappa = if (1.0 - expected).abs() < f64::EPSILON {
        // Both raters used one identical label throughout
        1.0
    } else {
        (observed - expected) / (1.0 - expected)
    };

    Ok(AgreementReport {
        epochs,
        accuracy_pct: observed * 100.0,
        kappa,
    })
}
