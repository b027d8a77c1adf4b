//! Chorus: a delay line whose length is swept by a sine LFO.

use alloc::vec::Vec;
use core::f32::consts::TAU;

use am_ir::{AudioBuffer, ChannelMask, ChorusParams, EffectKind, MAX_CHANNELS};

use super::DelayLine;
use crate::effect::AuxEffect;

const MAX_BASE_MS: u32 = 15;
const MAX_VARIATION_MS: u32 = 5;

pub struct Chorus {
    sample_rate: u32,
    lines: Vec<DelayLine>,
    /// LFO phase per channel, 0..1.
    phases: [f32; MAX_CHANNELS as usize],
    base: f32,
    variation: f32,
    phase_step: f32,
}

impl Chorus {
    pub fn new(params: ChorusParams, sample_rate: u32) -> Self {
        let max = ((MAX_BASE_MS + MAX_VARIATION_MS) * sample_rate / 1000) as usize + 2;
        let mut phases = [0.0; MAX_CHANNELS as usize];
        // Spread the channels around the cycle for width.
        for (i, p) in phases.iter_mut().enumerate() {
            *p = i as f32 / MAX_CHANNELS as f32;
        }
        let mut chorus = Self {
            sample_rate,
            lines: (0..MAX_CHANNELS).map(|_| DelayLine::new(max)).collect(),
            phases,
            base: 0.0,
            variation: 0.0,
            phase_step: 0.0,
        };
        chorus.update(params);
        chorus
    }

    fn update(&mut self, params: ChorusParams) {
        let per_ms = self.sample_rate as f32 / 1000.0;
        self.base = params.base_delay_ms.clamp(5, MAX_BASE_MS) as f32 * per_ms;
        self.variation = params.variation_ms.min(MAX_VARIATION_MS) as f32 * per_ms;
        let period = params.period_ms.clamp(500, 10_000) as f32 * per_ms;
        self.phase_step = 1.0 / period;
    }
}

impl AuxEffect for Chorus {
    fn name(&self) -> &'static str {
        "Chorus"
    }

    fn process(&mut self, buffer: &mut AudioBuffer, mask: ChannelMask) {
        for ch in mask.channels() {
            let i = ch as usize;
            let line = &mut self.lines[i];
            let mut phase = self.phases[i];
            for sample in buffer.channel_mut(ch as u16) {
                line.write(*sample);
                let delay = self.base + self.variation * libm::sinf(phase * TAU);
                let wet = line.tap_frac(delay);
                *sample = (*sample + wet) * 0.5;
                phase += self.phase_step;
                if phase >= 1.0 {
                    phase -= 1.0;
                }
            }
            self.phases[i] = phase;
        }
    }

    fn set_params(&mut self, kind: &EffectKind) -> bool {
        match kind {
            EffectKind::Chorus(p) => {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_reappears_near_base_delay() {
        let params = ChorusParams { base_delay_ms: 10, variation_ms: 0, period_ms: 1000 };
        let mut chorus = Chorus::new(params, 1000);
        let mut buf = AudioBuffer::new(MAX_CHANNELS, 32);
        buf.add(0, 0, 1.0);
        chorus.process(&mut buf, ChannelMask::STEREO);
        let left = buf.channel(0);
        assert_eq!(left[0], 0.5);
        // Written before the tap, so a delay of 10 reads the sample 9 frames back.
        assert_eq!(left[9], 0.5);
        assert_eq!(left[20], 0.0);
    }

    #[test]
    fn inactive_channels_untouched() {
        let mut chorus = Chorus::new(ChorusParams::default(), 1000);
        let mut buf = AudioBuffer::new(MAX_CHANNELS, 8);
        buf.add(2, 0, 1.0);
        chorus.process(&mut buf, ChannelMask::STEREO);
        assert_eq!(buf.get(2, 0), 1.0);
    }
}
