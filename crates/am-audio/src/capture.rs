//! In-memory sink for offline rendering and tests.

use am_engine::Frame;

use crate::traits::{AudioError, AudioOutput};

/// Collects every written frame while started.
#[derive(Debug, Default)]
pub struct CaptureOutput {
    sample_rate: u32,
    channels: u16,
    running: bool,
    frames: Vec<Frame>,
}

impl CaptureOutput {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            running: false,
            frames: Vec::new(),
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn take(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.frames)
    }
}

impl AudioOutput for CaptureOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn write(&mut self, frames: &[Frame]) -> usize {
        if !self.running {
            return 0;
        }
        self.frames.extend_from_slice(frames);
        frames.len()
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running = false;
        Ok(())
    }
}
