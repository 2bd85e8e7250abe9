// Simulated real-time acquisition
//
// Architecture:
// - `source`: replays a recording at wall-clock cadence with a fixed per-read
//   buffer contract; late reads lose samples (overflow)
// - `window`: fixed-length sliding window over the most recent samples

pub mod source;
pub mod window;

pub use source::{OverflowEvent, SampleChunk, SimulatedRealtimeSource, SourceRead, SourceStats};
pub use window::SlidingWindow;
