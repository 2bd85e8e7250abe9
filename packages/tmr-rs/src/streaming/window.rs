// Fixed-length sliding window over the incoming stream
//
// The window always holds exactly `len` samples per channel. Ingesting a chunk
// of n samples shifts every channel left by n and writes the chunk at the tail,
// so the newest samples are always last. The window starts zero-filled and is
// only meaningful once `is_primed` reports a full window of real samples.

use crate::error::{Result, TmrError};
use crate::streaming::source::SampleChunk;

#[derive(Debug, Clone)]
pub struct SlidingWindow {
    channels: Vec<Vec<f32>>,
    len: usize,
    sample_rate: f64,
    samples_ingested: u64,
}

impl SlidingWindow {
    pub fn new(num_channels: usize, len: usize, sample_rate: f64) -> Result<Self> {
        if len == 0 {
            return Err(TmrError::InvalidConfig(
                "Window must hold at least one sample".to_string(),
            ));
        }
        Ok(Self {
            channels: vec![vec![0.0; len]; num_channels],
            len,
            sample_rate,
            samples_ingested: 0,
        })
    }

    /// Append a chunk, evicting the same number of oldest samples
    pub fn ingest(&mut self, chunk: SampleChunk) -> Result<()> {
        if chunk.num_channels() != self.channels.len() {
            return Err(TmrError::ChannelMismatch {
                expected: self.channels.len(),
                actual: chunk.num_channels(),
            });
        }
        if chunk.sample_rate != self.sample_rate {
            return Err(TmrError::SampleRateMismatch {
                expected: self.sample_rate,
                actual: chunk.sample_rate,
            });
        }

        let n = chunk.num_samples();
        for (channel, incoming) in self.channels.iter_mut().zip(&chunk.samples) {
            if incoming.len() != n {
                return Err(TmrError::Recording(
                    "Chunk channels differ in length".to_string(),
                ));
            }
            if n >= self.len {
                channel.copy_from_slice(&incoming[n - self.len..]);
            } else {
                channel.copy_within(n.., 0);
                channel[self.len - n..].copy_from_slice(incoming);
            }
        }

        self.samples_ingested += n as u64;
        Ok(())
    }

    /// True once a full window of real samples has been ingested
    pub fn is_primed(&self) -> bool {
        self.samples_ingested >= self.len as u64
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Owned copy of the whole window
    pub fn snapshot(&self) -> Vec<Vec<f32>> {
        self.channels.clone()
    }

    /// Owned copy of the newest `n` samples of every channel
    pub fn tail(&self, n: usize) -> Vec<Vec<f32>> {
        let n = n.min(self.len);
        self.channels
            .iter()
            .map(|ch| ch[self.len - n..].to_vec())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.samples_ingested == 0
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn samples_ingested(&self) -> u64 {
        self.samples_ingested
    }

    /// Stream time covered by everything ingested so far
    pub fn elapsed_secs(&self) -> f64 {
        self.samples_ingested as f64 / self.sample_rate
    }
}
