// Append-only history of resolved scoring cycles

use crate::error::Result;
use crate::types::{ScoringResult, Stage};
use serde::Serialize;
use std::path::Path;

pub const RESULT_CSV_HEADER: [&str; 3] = ["Time (sec)", "Stage", "Confidence"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResultRecord {
    /// Stream time of the scored window's end
    pub elapsed_seconds: f64,
    pub stage: Stage,
    pub confidence: f64,
}

impl ResultRecord {
    pub fn new(elapsed_seconds: f64, result: ScoringResult) -> Self {
        Self {
            elapsed_seconds,
            stage: result.stage,
            confidence: result.confidence,
        }
    }

    pub fn result(&self) -> ScoringResult {
        ScoringResult::new(self.stage, self.confidence)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultLog {
    records: Vec<ResultRecord>,
}

impl ResultLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ResultRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&ResultRecord> {
        self.records.last()
    }

    /// Number of entries that carry the Unknown sentinel
    pub fn unknown_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.stage == Stage::Unknown)
            .count()
    }

    /// Write as CSV with a `Time (sec),Stage,Confidence` header
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);
        csv_writer.write_record(RESULT_CSV_HEADER)?;
        for record in &self.records {
            csv_writer.write_record([
                format!("{:.2}", record.elapsed_seconds),
                record.stage.label().to_string(),
                format!("{:.2}", record.confidence),
            ])?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(path)?;
        self.write_csv(std::io::BufWriter::new(file))?;
        log::info!("Wrote {} results to {}", self.len(), path.display());
        Ok(())
    }
}
