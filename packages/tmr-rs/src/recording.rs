// Prerecorded multi-channel signal held in memory
//
// Supports:
// - CSV: comma-separated values with optional header row
// - ASCII: whitespace-separated values with optional header row
// - Synthetic: deterministic oscillations for demos and tests
//
// Text files carry no sampling rate, so the caller supplies it. Each column is a
// channel and each row a time point; five columns are picked by a montage and
// stored in scorer order (C3, C4, EOGL, EOGR, EMG).

use crate::error::{Result, TmrError};
use crate::types::CHANNEL_COUNT;
use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Column indices of C3, C4, EOGL, EOGR and EMG in a source file
pub type Montage = [usize; CHANNEL_COUNT];

pub const DEFAULT_MONTAGE: Montage = [0, 1, 2, 3, 4];

#[derive(Debug, Clone)]
pub struct Recording {
    data: Vec<Vec<f32>>, // [channel][sample]
    sample_rate: f64,
}

impl Recording {
    /// Build a recording from channel-major samples
    pub fn new(data: Vec<Vec<f32>>, sample_rate: f64) -> Result<Self> {
        if !(sample_rate > 0.0) {
            return Err(TmrError::Recording(format!(
                "Sampling rate must be positive, got {}",
                sample_rate
            )));
        }
        if data.len() != CHANNEL_COUNT {
            return Err(TmrError::ChannelMismatch {
                expected: CHANNEL_COUNT,
                actual: data.len(),
            });
        }
        let len = data[0].len();
        if data.iter().any(|ch| ch.len() != len) {
            return Err(TmrError::Recording(
                "All channels must have the same number of samples".to_string(),
            ));
        }
        Ok(Self { data, sample_rate })
    }

    /// Read a CSV file (comma-separated)
    pub fn from_csv<P: AsRef<Path>>(path: P, sample_rate: f64, montage: Montage) -> Result<Self> {
        Self::read_text(path, Some(','), sample_rate, montage)
    }

    /// Read an ASCII file (whitespace-separated)
    pub fn from_ascii<P: AsRef<Path>>(path: P, sample_rate: f64, montage: Montage) -> Result<Self> {
        Self::read_text(path, None, sample_rate, montage)
    }

    /// Pick the reader from the file extension (`.csv` or anything else as ASCII)
    pub fn from_path<P: AsRef<Path>>(path: P, sample_rate: f64, montage: Montage) -> Result<Self> {
        let is_csv = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_csv {
            Self::from_csv(path, sample_rate, montage)
        } else {
            Self::from_ascii(path, sample_rate, montage)
        }
    }

    fn read_text<P: AsRef<Path>>(
        path: P,
        delimiter: Option<char>,
        sample_rate: f64,
        montage: Montage,
    ) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);

        let mut columns: Vec<Vec<f32>> = Vec::new();
        let mut header_checked = false;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_line(&line, delimiter);

            // First non-empty row may hold channel labels
            if !header_checked {
                header_checked = true;
                columns = vec![Vec::new(); fields.len()];
                if fields.iter().any(|s| s.parse::<f64>().is_err()) {
                    log::debug!("Skipping header row: {:?}", fields);
                    continue;
                }
            }

            if fields.len() != columns.len() {
                return Err(TmrError::Recording(format!(
                    "Line {}: expected {} columns, found {}",
                    line_no + 1,
                    columns.len(),
                    fields.len()
                )));
            }

            for (col, field) in columns.iter_mut().zip(&fields) {
                let value = field.parse::<f32>().map_err(|_| {
                    TmrError::Recording(format!(
                        "Line {}: '{}' is not a number",
                        line_no + 1,
                        field
                    ))
                })?;
                col.push(value);
            }
        }

        if columns.is_empty() || columns[0].is_empty() {
            return Err(TmrError::Recording("File contains no samples".to_string()));
        }

        let mut data = Vec::with_capacity(CHANNEL_COUNT);
        for &index in &montage {
            let column = columns.get(index).ok_or_else(|| {
                TmrError::Recording(format!(
                    "Montage column {} out of range ({} columns in file)",
                    index,
                    columns.len()
                ))
            })?;
            data.push(column.clone());
        }

        log::info!(
            "Loaded recording {}: {} samples @ {} Hz ({:.1} s)",
            path.as_ref().display(),
            data[0].len(),
            sample_rate,
            data[0].len() as f64 / sample_rate
        );

        Self::new(data, sample_rate)
    }

    /// Deterministic five-channel signal resembling a sleep recording.
    ///
    /// EEG channels carry a slow-wave plus spindle-band mixture, EOG channels a
    /// slow drift, EMG a low-amplitude high-frequency tone.
    pub fn synthetic(duration_secs: f64, sample_rate: f64) -> Result<Self> {
        let n = (duration_secs * sample_rate).round() as usize;
        let spec: [(f64, f64, f64, f64); CHANNEL_COUNT] = [
            // (slow Hz, slow uV, fast Hz, fast uV)
            (0.8, 40.0, 12.0, 8.0),
            (0.9, 35.0, 13.0, 7.0),
            (0.3, 25.0, 2.0, 5.0),
            (0.35, 25.0, 2.5, 5.0),
            (0.5, 3.0, 45.0, 6.0),
        ];

        let data = spec
            .iter()
            .enumerate()
            .map(|(ch, &(f_slow, a_slow, f_fast, a_fast))| {
                let phase = ch as f64 * 0.7;
                (0..n)
                    .map(|i| {
                        let t = i as f64 / sample_rate;
                        (a_slow * (2.0 * PI * f_slow * t + phase).sin()
                            + a_fast * (2.0 * PI * f_fast * t).sin()) as f32
                    })
                    .collect()
            })
            .collect();

        Self::new(data, sample_rate)
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn num_samples(&self) -> usize {
        self.data.first().map(|ch| ch.len()).unwrap_or(0)
    }

    pub fn duration_secs(&self) -> f64 {
        self.num_samples() as f64 / self.sample_rate
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.data[index]
    }

    /// Copy `len` samples of every channel starting at `start`
    pub fn slice(&self, start: usize, len: usize) -> Vec<Vec<f32>> {
        self.data
            .iter()
            .map(|ch| ch[start..start + len].to_vec())
            .collect()
    }
}

fn split_line(line: &str, delimiter: Option<char>) -> Vec<String> {
    match delimiter {
        Some(d) => line.split(d).map(|s| s.trim().to_string()).collect(),
        None => line.split_whitespace().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_csv_with_header_and_montage() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "C3,C4,X,EOGL,EOGR,EMG").unwrap();
        writeln!(file, "1,2,99,3,4,5").unwrap();
        writeln!(file, "6,7,99,8,9,10").unwrap();

        let rec = Recording::from_path(file.path(), 100.0, [0, 1, 3, 4, 5]).unwrap();
        assert_eq!(rec.num_samples(), 2);
        assert_eq!(rec.channel(0), &[1.0, 6.0]);
        assert_eq!(rec.channel(2), &[3.0, 8.0]);
        assert_eq!(rec.channel(4), &[5.0, 10.0]);
    }

    #[test]
    fn test_ascii_without_header() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "1 2 3 4 5").unwrap();
        writeln!(file, "6\t7\t8\t9\t10").unwrap();

        let rec = Recording::from_path(file.path(), 256.0, DEFAULT_MONTAGE).unwrap();
        assert_eq!(rec.num_samples(), 2);
        assert_eq!(rec.channel(4), &[5.0, 10.0]);
        assert_eq!(rec.sample_rate(), 256.0);
    }

    #[test]
    fn test_montage_out_of_range() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "1,2,3").unwrap();

        let result = Recording::from_csv(file.path(), 100.0, DEFAULT_MONTAGE);
        assert!(matches!(result, Err(TmrError::Recording(_))));
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "1,2,3,4,5").unwrap();
        writeln!(file, "1,2,3").unwrap();

        assert!(Recording::from_csv(file.path(), 100.0, DEFAULT_MONTAGE).is_err());
    }

    #[test]
    fn test_synthetic_shape() {
        let rec = Recording::synthetic(10.0, 128.0).unwrap();
        assert_eq!(rec.num_samples(), 1280);
        assert!((rec.duration_secs() - 10.0).abs() < 1e-9);
        assert_eq!(rec.slice(100, 32).len(), CHANNEL_COUNT);
        assert_eq!(rec.slice(100, 32)[3].len(), 32);
    }

    #[test]
    fn test_rejects_bad_rate() {
        let data = vec![vec![0.0; 4]; CHANNEL_COUNT];
        assert!(Recording::new(data, 0.0).is_err());
    }
}
