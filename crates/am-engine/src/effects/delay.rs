//! Feedback delay, one line per channel.
//!
//! Each output sample is `(delayed × feedback + input) × output`, and that
//! same sum (before `output`) is written back into the line, so the input
//! passes straight through along with its echoes.

use alloc::vec::Vec;

use am_ir::{AudioBuffer, ChannelMask, DelayParams, EffectKind, MAX_CHANNELS};

use super::DelayLine;
use crate::effect::AuxEffect;

pub struct Delay {
    sample_rate: u32,
    lines: Vec<DelayLine>,
    delay: usize,
    feedback: f32,
    output: f32,
}

impl Delay {
    pub fn new(params: DelayParams, sample_rate: u32) -> Self {
        let mut delay = Self {
            sample_rate,
            lines: Vec::new(),
            delay: 0,
            feedback: 0.0,
            output: 0.0,
        };
        delay.update(params);
        delay
    }

    fn update(&mut self, params: DelayParams) {
        let ms = params.delay_ms.clamp(10, 5000);
        // Percentages map onto a /128 scale.
        self.feedback = (params.feedback.min(100) * 128 / 100) as f32 / 128.0;
        self.output = (params.output.min(100) * 128 / 100) as f32 / 128.0;
        self.delay = (ms as u64 * self.sample_rate as u64 / 1000).max(1) as usize;
        if self.lines.first().map_or(true, |l| l.capacity() < self.delay) {
            self.lines = (0..MAX_CHANNELS).map(|_| DelayLine::new(self.delay)).collect();
        }
    }
}

impl AuxEffect for Delay {
    fn name(&self) -> &'static str {
        "Delay"
    }

    fn process(&mut self, buffer: &mut AudioBuffer, mask: ChannelMask) {
        for ch in mask.channels() {
            let line = &mut self.lines[ch as usize];
            for sample in buffer.channel_mut(ch as u16) {
                let echo = line.tap(self.delay);
                let sum = (echo * self.feedback + *sample).clamp(-1.0, 1.0);
                line.write(sum);
                *sample = sum * self.output;
            }
        }
    }

    fn set_params(&mut self, kind: &EffectKind) -> bool {
        match kind {
            EffectKind::Delay(p) => {
                self.update(*p);
                true
            }
            _ => false,
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
    }
}
