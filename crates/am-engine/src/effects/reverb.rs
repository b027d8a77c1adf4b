//! Freeverb-style reverb: 8 parallel damped combs into serial allpasses,
//! one network per speaker channel.
//!
//! The high-quality variant adds two diffusion allpasses per channel and
//! left/right crosstalk.

use alloc::vec::Vec;

use am_ir::{AudioBuffer, AudioChannel, ChannelMask, EffectKind, ReverbParams, MAX_CHANNELS};

use super::DelayLine;
use crate::effect::AuxEffect;

// Tunings in samples at 44.1 kHz.
const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];
const DIFFUSION_TUNINGS: [usize; 2] = [179, 131];
const CHANNEL_SPREAD: usize = 23;

const FIXED_GAIN: f32 = 0.015;
const SCALE_WET: f32 = 3.0;
const SCALE_DAMPING: f32 = 0.4;
const MAX_PRE_DELAY: f32 = 0.1;

/// Which reverb network to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReverbQuality {
    Standard,
    High,
}

#[derive(Clone, Debug)]
struct Comb {
    line: DelayLine,
    store: f32,
}

impl Comb {
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let out = self.line.tap(self.line.capacity());
        self.store = out * (1.0 - damp) + self.store * damp;
        self.line.write(input + self.store * feedback);
        out
    }
}

#[derive(Clone, Debug)]
struct Allpass {
    line: DelayLine,
}

impl Allpass {
    fn process(&mut self, input: f32, feedback: f32) -> f32 {
        let delayed = self.line.tap(self.line.capacity());
        self.line.write(input + delayed * feedback);
        delayed - input
    }
}

#[derive(Clone, Debug)]
struct Network {
    pre: DelayLine,
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
}

impl Network {
    fn new(quality: ReverbQuality, channel: usize, sample_rate: u32) -> Self {
        let scale = sample_rate as f32 / 44100.0;
        let size = |tuning: usize| ((tuning + channel * CHANNEL_SPREAD) as f32 * scale) as usize;
        let diffusion: &[usize] = match quality {
            ReverbQuality::Standard => &[],
            ReverbQuality::High => &DIFFUSION_TUNINGS,
        };
        Self {
            pre: DelayLine::new((MAX_PRE_DELAY * sample_rate as f32) as usize + 1),
            combs: COMB_TUNINGS
                .iter()
                .map(|&t| Comb { line: DelayLine::new(size(t)), store: 0.0 })
                .collect(),
            allpasses: ALLPASS_TUNINGS
                .iter()
                .chain(diffusion)
                .map(|&t| Allpass { line: DelayLine::new(size(t)) })
                .collect(),
        }
    }

    fn mean_comb_len(&self) -> f32 {
        let total: usize = self.combs.iter().map(|c| c.line.capacity()).sum();
        total as f32 / self.combs.len() as f32
    }

    fn clear(&mut self) {
        self.pre.clear();
        for c in &mut self.combs {
            c.line.clear();
            c.store = 0.0;
        }
        for a in &mut self.allpasses {
            a.line.clear();
        }
    }
}

/// Reverb on every speaker channel.
pub struct Reverb {
    quality: ReverbQuality,
    sample_rate: u32,
    networks: Vec<Network>,
    params: ReverbParams,
    feedback: f32,
    damp: f32,
    diffusion: f32,
    pre_delay: usize,
}

impl Reverb {
    pub fn new(quality: ReverbQuality, params: ReverbParams, sample_rate: u32) -> Self {
        let networks = (0..MAX_CHANNELS as usize)
            .map(|ch| Network::new(quality, ch, sample_rate))
            .collect();
        let mut reverb = Self {
            quality,
            sample_rate,
            networks,
            params,
            feedback: 0.0,
            damp: 0.0,
            diffusion: 0.5,
            pre_delay: 0,
        };
        reverb.update(params);
        reverb
    }

    fn update(&mut self, params: ReverbParams) {
        let time = params.time.clamp(0.01, 10.0);
        // Comb feedback for a 60 dB decay over `time` seconds.
        let mean = self.networks.first().map_or(1.0, Network::mean_comb_len);
        let exponent = -3.0 * mean / (time * self.sample_rate as f32);
        self.feedback = libm::powf(10.0, exponent).min(0.98);
        self.damp = params.damping.clamp(0.0, 1.0) * SCALE_DAMPING;
        self.diffusion = 0.3 + params.coloration.clamp(0.0, 1.0) * 0.4;
        self.pre_delay = (params.pre_delay.clamp(0.0, MAX_PRE_DELAY) * self.sample_rate as f32) as usize;
        self.params = params;
    }

    fn wet_sample(&mut self, channel: usize, input: f32) -> f32 {
        let (feedback, damp, diffusion, pre_delay) = (self.feedback, self.damp, self.diffusion, self.pre_delay);
        let net = &mut self.networks[channel];
        net.pre.write(input);
        let delayed = if pre_delay == 0 { input } else { net.pre.tap(pre_delay) };
        let fed = delayed * FIXED_GAIN;
        let mut out = 0.0;
        for comb in &mut net.combs {
            out += comb.process(fed, feedback, damp);
        }
        for ap in &mut net.allpasses {
            out = ap.process(out, diffusion);
        }
        out * SCALE_WET
    }
}

/// Left/right pairs crosstalk mixes between.
const PAIRS: [(AudioChannel, AudioChannel); 3] = [
    (AudioChannel::FrontLeft, AudioChannel::FrontRight),
    (AudioChannel::RearLeft, AudioChannel::RearRight),
    (AudioChannel::SideLeft, AudioChannel::SideRight),
];

impl AuxEffect for Reverb {
    fn name(&self) -> &'static str {
        match self.quality {
            ReverbQuality::Standard => "Reverb",
            ReverbQuality::High => "Reverb HQ",
        }
    }

    fn process(&mut self, buffer: &mut AudioBuffer, mask: ChannelMask) {
        let mix = self.params.mix.clamp(0.0, 1.0);
        let crosstalk = match self.quality {
            ReverbQuality::Standard => 0.0,
            ReverbQuality::High => self.params.crosstalk.clamp(0.0, 1.0) * 0.5,
        };
        let mut wet = [0.0f32; MAX_CHANNELS as usize];
        for frame in 0..buffer.len() {
            for ch in mask.channels() {
                let i = ch as usize;
                wet[i] = self.wet_sample(i, buffer.get(i as u16, frame));
            }
            if crosstalk > 0.0 {
                for (l, r) in PAIRS {
                    let (l, r) = (l as usize, r as usize);
                    let (wl, wr) = (wet[l], wet[r]);
                    wet[l] = wl * (1.0 - crosstalk) + wr * crosstalk;
                    wet[r] = wr * (1.0 - crosstalk) + wl * crosstalk;
                }
            }
            for ch in mask.channels() {
                let i = ch as usize;
                let plane = buffer.channel_mut(i as u16);
                plane[frame] = plane[frame] * (1.0 - mix) + wet[i] * mix;
            }
        }
    }

    fn set_params(&mut self, kind: &EffectKind) -> bool {
        match (self.quality, kind) {
            (ReverbQuality::Standard, EffectKind::ReverbStd(p))
            | (ReverbQuality::High, EffectKind::ReverbHi(p)) => {
                self.update(*p);
                true
            }
            _ => false,
        }
    }

    fn reset(&mut self) {
        for net in &mut self.networks {
            net.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 22050;

    fn impulse(len: usize) -> AudioBuffer {
        let mut buf = AudioBuffer::new(MAX_CHANNELS, len);
        buf.set_len(len);
        buf.add(0, 0, 1.0);
        buf
    }

    fn energy(buf: &AudioBuffer, ch: u16, range: core::ops::Range<usize>) -> f32 {
        buf.channel(ch)[range].iter().map(|v| v * v).sum()
    }

    #[test]
    fn impulse_produces_tail() {
        let params = ReverbParams { mix: 1.0, pre_delay: 0.0, ..ReverbParams::default() };
        let mut rev = Reverb::new(ReverbQuality::Standard, params, RATE);
        let mut buf = impulse(4096);
        rev.process(&mut buf, ChannelMask::STEREO);
        assert!(energy(&buf, 0, 1000..4096) > 0.0);
        // Right channel had no input.
        assert_eq!(energy(&buf, 1, 0..4096), 0.0);
    }

    #[test]
    fn longer_time_decays_slower() {
        let tail = |time: f32| {
            let params = ReverbParams { mix: 1.0, time, pre_delay: 0.0, ..ReverbParams::default() };
            let mut rev = Reverb::new(ReverbQuality::Standard, params, RATE);
            let mut buf = impulse(16384);
            rev.process(&mut buf, ChannelMask::STEREO);
            energy(&buf, 0, 8192..16384)
        };
        assert!(tail(5.0) > tail(0.2));
    }

    #[test]
    fn crosstalk_bleeds_into_other_side() {
        let params = ReverbParams { mix: 1.0, crosstalk: 1.0, pre_delay: 0.0, ..ReverbParams::default() };
        let mut rev = Reverb::new(ReverbQuality::High, params, RATE);
        let mut buf = impulse(4096);
        rev.process(&mut buf, ChannelMask::STEREO);
        assert!(energy(&buf, 1, 0..4096) > 0.0);
    }

    #[test]
    fn zero_mix_is_dry() {
        let params = ReverbParams { mix: 0.0, ..ReverbParams::default() };
        let mut rev = Reverb::new(ReverbQuality::Standard, params, RATE);
        let mut buf = impulse(64);
        rev.process(&mut buf, ChannelMask::STEREO);
        assert_eq!(buf.get(0, 0), 1.0);
        assert_eq!(energy(&buf, 0, 1..64), 0.0);
    }

    #[test]
    fn params_only_accept_same_quality() {
        let mut rev = Reverb::new(ReverbQuality::Standard, ReverbParams::default(), RATE);
        assert!(rev.set_params(&EffectKind::ReverbStd(ReverbParams::default())));
        assert!(!rev.set_params(&EffectKind::ReverbHi(ReverbParams::default())));
    }
}
