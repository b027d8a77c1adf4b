//! Built-in aux effects.

mod chorus;
mod delay;
mod reverb;

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use am_ir::EffectKind;

use crate::effect::AuxEffect;

pub use chorus::Chorus;
pub use delay::Delay;
pub use reverb::{Reverb, ReverbQuality};

/// Create the effect for `kind`, or `None` for an empty bus.
pub fn create_effect(kind: &EffectKind, sample_rate: u32) -> Option<Box<dyn AuxEffect>> {
    Some(match *kind {
        EffectKind::None => return None,
        EffectKind::ReverbStd(p) => Box::new(Reverb::new(ReverbQuality::Standard, p, sample_rate)),
        EffectKind::ReverbHi(p) => Box::new(Reverb::new(ReverbQuality::High, p, sample_rate)),
        EffectKind::Delay(p) => Box::new(Delay::new(p, sample_rate)),
        EffectKind::Chorus(p) => Box::new(Chorus::new(p, sample_rate)),
    })
}

/// Fixed-size circular delay line.
#[derive(Clone, Debug)]
pub(crate) struct DelayLine {
    buffer: Vec<f32>,
    pos: usize,
}

impl DelayLine {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            pos: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Read the sample written `delay` samples ago (`1..=capacity`).
    pub(crate) fn tap(&self, delay: usize) -> f32 {
        let len = self.buffer.len();
        let delay = delay.clamp(1, len);
        self.buffer[(self.pos + len - delay) % len]
    }

    /// Linearly interpolated read at a fractional delay.
    pub(crate) fn tap_frac(&self, delay: f32) -> f32 {
        let max = (self.buffer.len() - 1) as f32;
        let d = delay.clamp(1.0, max.max(1.0));
        let whole = d as usize;
        let frac = d - whole as f32;
        let a = self.tap(whole);
        let b = self.tap(whole + 1);
        a + (b - a) * frac
    }

    pub(crate) fn write(&mut self, value: f32) {
        self.buffer[self.pos] = value;
        self.pos += 1;
        if self.pos >= self.buffer.len() {
            self.pos = 0;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}
