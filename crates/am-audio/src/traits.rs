//! Audio output trait and error types.

use am_engine::Frame;

/// Error type for audio operations.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("device init error: {0}")]
    DeviceInit(String),
    #[error("stream create error: {0}")]
    StreamCreate(String),
    #[error("playback error: {0}")]
    Playback(String),
}

/// Trait for audio output sinks.
pub trait AudioOutput {
    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Interleaved channels per output frame.
    fn channels(&self) -> u16;

    /// Queue frames for output. Returns how many were accepted; the rest
    /// are dropped when the sink is full.
    fn write(&mut self, frames: &[Frame]) -> usize;

    /// Start playback.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop playback.
    fn stop(&mut self) -> Result<(), AudioError>;
}
