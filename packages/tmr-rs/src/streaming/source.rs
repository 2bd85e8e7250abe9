// Recording replay that behaves like a live amplifier
//
// Each call to `read_buffer` hands out exactly one buffer's worth of samples.
// A real device keeps acquiring while the caller is busy; if the caller comes
// back later than one buffer duration, the samples acquired during the overshoot
// are gone. This source reproduces that contract on top of a prerecorded signal.

use crate::error::{Result, TmrError};
use crate::recording::Recording;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// A block of samples handed out by one read
#[derive(Debug, Clone)]
pub struct SampleChunk {
    /// Multi-channel samples: samples[channel_idx][sample_idx]
    pub samples: Vec<Vec<f32>>,

    /// Sample rate in Hz
    pub sample_rate: f64,

    /// Position of the first sample in the recording
    pub start: usize,
}

impl SampleChunk {
    pub fn num_samples(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    pub fn duration_secs(&self) -> f64 {
        self.num_samples() as f64 / self.sample_rate
    }
}

/// Outcome of a read
#[derive(Debug, Clone)]
pub enum SourceRead {
    Chunk(SampleChunk),
    /// Terminal; every later read returns this as well
    EndOfStream,
}

/// A read was issued after its deadline
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverflowEvent {
    /// Time past the buffer deadline
    pub late_by: Duration,
    pub samples_lost: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceStats {
    pub chunks_delivered: u64,
    pub overflow_events: u64,
    pub samples_lost: u64,
}

/// Whole samples covered by `duration` at `sample_rate`.
///
/// Computed from integer nanoseconds so millisecond durations like 290 ms
/// at 100 Hz floor to 29, not 28.
pub(crate) fn samples_in(duration: Duration, sample_rate: f64) -> usize {
    (duration.as_nanos() as f64 * sample_rate / 1e9).floor() as usize
}

pub struct SimulatedRealtimeSource {
    recording: Recording,
    buffer_duration: Duration,
    buffer_samples: usize,
    position: usize,
    last_call: Option<Instant>,
    exhausted: bool,
    last_overflow: Option<OverflowEvent>,
    stats: SourceStats,
}

impl SimulatedRealtimeSource {
    pub fn new(recording: Recording, buffer_duration: Duration) -> Result<Self> {
        let buffer_samples = samples_in(buffer_duration, recording.sample_rate());
        if buffer_samples == 0 {
            return Err(TmrError::InvalidConfig(format!(
                "Buffer of {} ms holds no samples at {} Hz",
                buffer_duration.as_millis(),
                recording.sample_rate()
            )));
        }

        log::debug!(
            "Realtime source: {} samples per {} ms buffer, {} samples total",
            buffer_samples,
            buffer_duration.as_millis(),
            recording.num_samples()
        );

        Ok(Self {
            recording,
            buffer_duration,
            buffer_samples,
            position: 0,
            last_call: None,
            exhausted: false,
            last_overflow: None,
            stats: SourceStats::default(),
        })
    }

    /// Read the next buffer.
    ///
    /// With `realistic` the call blocks until the buffer's nominal duration has
    /// passed since the previous read returned, so the caller receives data at
    /// the rate a device would produce it. Without it the call only yields to
    /// the scheduler.
    pub async fn read_buffer(&mut self, realistic: bool) -> SourceRead {
        if self.exhausted {
            return SourceRead::EndOfStream;
        }

        let now = Instant::now();

        let Some(last_call) = self.last_call else {
            // First read anchors the deadline and returns immediately
            if self.would_pass_end() {
                return self.finish();
            }
            let chunk = self.take_chunk();
            self.last_call = Some(now);
            return SourceRead::Chunk(chunk);
        };

        let delta = now.saturating_duration_since(last_call);
        if delta > self.buffer_duration {
            // Only the overshoot past the deadline is lost
            let late_by = delta - self.buffer_duration;
            let lost = samples_in(late_by, self.recording.sample_rate());
            let total = self.recording.num_samples();
            let skipped = lost.min(total - self.position);
            self.position += skipped;

            self.stats.overflow_events += 1;
            self.stats.samples_lost += skipped as u64;
            self.last_overflow = Some(OverflowEvent {
                late_by,
                samples_lost: skipped,
            });

            log::warn!(
                "Buffer overflow - read was {:.1} ms late, {} samples lost",
                late_by.as_secs_f64() * 1000.0,
                skipped
            );
        }

        if self.would_pass_end() {
            return self.finish();
        }

        let chunk = self.take_chunk();

        if realistic {
            if let Some(wait) = self.buffer_duration.checked_sub(delta) {
                if !wait.is_zero() {
                    sleep(wait).await;
                }
            }
        } else {
            // Let the scoring task make progress on single-threaded runtimes
            tokio::task::yield_now().await;
        }

        self.last_call = Some(Instant::now());
        SourceRead::Chunk(chunk)
    }

    fn would_pass_end(&self) -> bool {
        self.position + self.buffer_samples > self.recording.num_samples()
    }

    fn finish(&mut self) -> SourceRead {
        self.exhausted = true;
        log::info!(
            "Data stream ended at sample {} of {}",
            self.position,
            self.recording.num_samples()
        );
        SourceRead::EndOfStream
    }

    fn take_chunk(&mut self) -> SampleChunk {
        let start = self.position;
        let samples = self.recording.slice(start, self.buffer_samples);
        self.position += self.buffer_samples;
        self.stats.chunks_delivered += 1;
        SampleChunk {
            samples,
            sample_rate: self.recording.sample_rate(),
            start,
        }
    }

    /// Index of the next sample to be read
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn buffer_samples(&self) -> usize {
        self.buffer_samples
    }

    pub fn buffer_duration(&self) -> Duration {
        self.buffer_duration
    }

    pub fn sample_rate(&self) -> f64 {
        self.recording.sample_rate()
    }

    pub fn total_samples(&self) -> usize {
        self.recording.num_samples()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn last_overflow(&self) -> Option<OverflowEvent> {
        self.last_overflow
    }

    pub fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CHANNEL_COUNT;

    /// Recording whose sample value equals its index, on every channel
    fn ramp(num_samples: usize, sample_rate: f64) -> Recording {
        let ramp: Vec<f32> = (0..num_samples).map(|i| i as f32).collect();
        Recording::new(vec![ramp; CHANNEL_COUNT], sample_rate).unwrap()
    }

    fn expect_chunk(read: SourceRead) -> SampleChunk {
        match read {
            SourceRead::Chunk(chunk) => chunk,
            SourceRead::EndOfStream => panic!("unexpected end of stream"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_count_without_overflow() {
        // 1005 samples, 10 per buffer -> 100 full chunks
        let mut source =
            SimulatedRealtimeSource::new(ramp(1005, 100.0), Duration::from_millis(100)).unwrap();

        let mut chunks = 0;
        while let SourceRead::Chunk(chunk) = source.read_buffer(false).await {
            assert_eq!(chunk.num_samples(), 10);
            assert_eq!(chunk.num_channels(), CHANNEL_COUNT);
            chunks += 1;
        }

        assert_eq!(chunks, 100);
        assert_eq!(source.stats().overflow_events, 0);
        assert!(source.position() <= source.total_samples());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exact_multiple_reads_every_sample() {
        let mut source =
            SimulatedRealtimeSource::new(ramp(1000, 100.0), Duration::from_millis(100)).unwrap();

        let mut chunks = 0;
        while let SourceRead::Chunk(_) = source.read_buffer(false).await {
            chunks += 1;
        }
        assert_eq!(chunks, 100);
        assert_eq!(source.position(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_of_stream_is_terminal() {
        let mut source =
            SimulatedRealtimeSource::new(ramp(15, 100.0), Duration::from_millis(100)).unwrap();

        assert!(matches!(source.read_buffer(false).await, SourceRead::Chunk(_)));
        assert!(matches!(source.read_buffer(false).await, SourceRead::EndOfStream));
        assert!(source.is_exhausted());
        assert!(matches!(source.read_buffer(false).await, SourceRead::EndOfStream));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_skips_overshoot_only() {
        let mut source =
            SimulatedRealtimeSource::new(ramp(1000, 100.0), Duration::from_millis(100)).unwrap();

        let first = expect_chunk(source.read_buffer(false).await);
        assert_eq!(first.start, 0);

        // 250 ms past the 100 ms deadline -> 25 samples lost at 100 Hz
        tokio::time::advance(Duration::from_millis(350)).await;
        let second = expect_chunk(source.read_buffer(false).await);

        assert_eq!(second.start, 10 + 25);
        assert_eq!(second.samples[0][0], 35.0);
        assert_eq!(
            source.last_overflow(),
            Some(OverflowEvent {
                late_by: Duration::from_millis(250),
                samples_lost: 25,
            })
        );
        assert_eq!(source.stats().overflow_events, 1);
        assert_eq!(source.stats().samples_lost, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_near_end_never_passes_length() {
        let mut source =
            SimulatedRealtimeSource::new(ramp(100, 100.0), Duration::from_millis(100)).unwrap();

        expect_chunk(source.read_buffer(false).await);
        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(matches!(source.read_buffer(false).await, SourceRead::EndOfStream));
        assert!(source.position() <= source.total_samples());
    }

    #[tokio::test(start_paused = true)]
    async fn test_realistic_read_is_throttled() {
        let mut source =
            SimulatedRealtimeSource::new(ramp(1000, 100.0), Duration::from_millis(100)).unwrap();

        let start = Instant::now();
        expect_chunk(source.read_buffer(true).await);
        assert_eq!(start.elapsed(), Duration::ZERO);

        tokio::time::advance(Duration::from_millis(30)).await;
        expect_chunk(source.read_buffer(true).await);

        // Second read returns once the full 100 ms buffer has elapsed
        assert_eq!(start.elapsed(), Duration::from_millis(100));
        assert_eq!(source.stats().overflow_events, 0);
    }

    #[test]
    fn test_buffer_samples_from_decimal_milliseconds() {
        let source =
            SimulatedRealtimeSource::new(ramp(10_000, 100.0), Duration::from_millis(290)).unwrap();
        assert_eq!(source.buffer_samples(), 29);

        let source =
            SimulatedRealtimeSource::new(ramp(10_000, 200.0), Duration::from_millis(145)).unwrap();
        assert_eq!(source.buffer_samples(), 29);

        assert_eq!(samples_in(Duration::from_millis(285), 200.0), 57);
        assert_eq!(samples_in(Duration::from_millis(290), 200.0), 58);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_skip_from_decimal_milliseconds() {
        // 290 ms late at 100 Hz -> 29 samples
        let mut source =
            SimulatedRealtimeSource::new(ramp(10_000, 100.0), Duration::from_millis(100)).unwrap();
        expect_chunk(source.read_buffer(false).await);
        tokio::time::advance(Duration::from_millis(390)).await;
        let chunk = expect_chunk(source.read_buffer(false).await);
        assert_eq!(source.stats().samples_lost, 29);
        assert_eq!(chunk.start, 10 + 29);

        // 145 ms late at 200 Hz -> 29 samples
        let mut source =
            SimulatedRealtimeSource::new(ramp(10_000, 200.0), Duration::from_millis(100)).unwrap();
        expect_chunk(source.read_buffer(false).await);
        tokio::time::advance(Duration::from_millis(245)).await;
        let chunk = expect_chunk(source.read_buffer(false).await);
        assert_eq!(source.stats().samples_lost, 29);
        assert_eq!(chunk.start, 20 + 29);
    }

    #[test]
    fn test_buffer_too_small_for_rate() {
        let result = SimulatedRealtimeSource::new(ramp(100, 5.0), Duration::from_millis(100));
        assert!(matches!(result, Err(TmrError::InvalidConfig(_))));
    }
}
