//! Pan law and the main/aux mix buses.
//!
//! Voices are summed into three planar buffers (main, aux A, aux B) with one
//! plane per speaker position. At the end of a block the aux effects run,
//! their returns are added to main, master volume is applied and the
//! active channels are packed into [`Frame`]s.

use am_ir::{AudioBuffer, AudioChannel, ChannelMask, MAX_CHANNELS};

use crate::frame::{saturate, Frame};
use crate::studio::Studio;

const PAN_STEPS: usize = 128;

/// Constant-power pan curves.
#[derive(Clone, Debug)]
pub struct PanLaw {
    /// `(cos, sin)` of a quarter turn in `PAN_STEPS` steps.
    table: [(f32, f32); PAN_STEPS + 1],
}

impl Default for PanLaw {
    fn default() -> Self {
        Self::new()
    }
}

impl PanLaw {
    pub fn new() -> Self {
        let mut table = [(0.0, 0.0); PAN_STEPS + 1];
        for (i, entry) in table.iter_mut().enumerate() {
            let angle = i as f32 / PAN_STEPS as f32 * core::f32::consts::FRAC_PI_2;
            *entry = (libm::cosf(angle), libm::sinf(angle));
        }
        Self { table }
    }

    /// Crossfade between two positions; `t` in 0..=1.
    fn fade(&self, t: f32) -> (f32, f32) {
        let pos = t.clamp(0.0, 1.0) * PAN_STEPS as f32;
        let i = (pos as usize).min(PAN_STEPS - 1);
        let frac = pos - i as f32;
        let (a0, b0) = self.table[i];
        let (a1, b1) = self.table[i + 1];
        (a0 + (a1 - a0) * frac, b0 + (b1 - b0) * frac)
    }

    /// Per-speaker gains for `pan` (-1 left ..= 1 right) and `span`
    /// (0 front ..= 1 rear). Positions missing from `mask` fold into the
    /// nearest present row, so power is preserved on any layout.
    pub fn gains(&self, pan: f32, span: f32, mask: ChannelMask) -> [f32; MAX_CHANNELS as usize] {
        let mut out = [0.0; MAX_CHANNELS as usize];
        let has = |c| mask.contains(c);
        let has_rear = has(AudioChannel::RearLeft) && has(AudioChannel::RearRight);
        let has_side = has(AudioChannel::SideLeft) && has(AudioChannel::SideRight);

        let (front, side, rear) = match (has_side, has_rear) {
            (true, true) => {
                let t = span.clamp(0.0, 1.0) * 2.0;
                if t <= 1.0 {
                    let (f, s) = self.fade(t);
                    (f, s, 0.0)
                } else {
                    let (s, r) = self.fade(t - 1.0);
                    (0.0, s, r)
                }
            }
            (false, true) => {
                let (f, r) = self.fade(span);
                (f, 0.0, r)
            }
            (true, false) => {
                let (f, s) = self.fade(span);
                (f, s, 0.0)
            }
            (false, false) => (1.0, 0.0, 0.0),
        };

        let (left, right) = self.fade((pan.clamp(-1.0, 1.0) + 1.0) * 0.5);

        if has(AudioChannel::FrontCenter) {
            // Three-way front: L/C on the left half, C/R on the right.
            let p = pan.clamp(-1.0, 1.0);
            let (l, c, r) = if p < 0.0 {
                let (l, c) = self.fade(p + 1.0);
                (l, c, 0.0)
            } else {
                let (c, r) = self.fade(p);
                (0.0, c, r)
            };
            out[AudioChannel::FrontLeft as usize] = l * front;
            out[AudioChannel::FrontCenter as usize] = c * front;
            out[AudioChannel::FrontRight as usize] = r * front;
        } else {
            out[AudioChannel::FrontLeft as usize] = left * front;
            out[AudioChannel::FrontRight as usize] = right * front;
        }
        out[AudioChannel::SideLeft as usize] = left * side;
        out[AudioChannel::SideRight as usize] = right * side;
        out[AudioChannel::RearLeft as usize] = left * rear;
        out[AudioChannel::RearRight as usize] = right * rear;

        if !has(AudioChannel::FrontLeft) || !has(AudioChannel::FrontRight) {
            // Mono-ish layouts: everything into the first present channel.
            let total = libm::sqrtf(out.iter().map(|g| g * g).sum());
            out = [0.0; MAX_CHANNELS as usize];
            if let Some(first) = mask.channels().next() {
                out[first as usize] = total;
            }
        }
        out
    }
}

/// The mix buses for one block.
pub struct Mixer {
    main: AudioBuffer,
    aux_a: AudioBuffer,
    aux_b: AudioBuffer,
    pan_law: PanLaw,
}

impl Mixer {
    pub fn new(block: usize) -> Self {
        Self {
            main: AudioBuffer::new(MAX_CHANNELS, block),
            aux_a: AudioBuffer::new(MAX_CHANNELS, block),
            aux_b: AudioBuffer::new(MAX_CHANNELS, block),
            pan_law: PanLaw::new(),
        }
    }

    pub fn pan_law(&self) -> &PanLaw {
        &self.pan_law
    }

    /// Clear the buses for a block of `frames`.
    pub fn begin(&mut self, frames: usize) {
        for buf in [&mut self.main, &mut self.aux_a, &mut self.aux_b] {
            buf.set_len(frames);
            buf.silence();
        }
    }

    /// Accumulate one voice sample.
    #[inline]
    pub fn mix(
        &mut self,
        frame: usize,
        value: f32,
        gains: &[f32; MAX_CHANNELS as usize],
        sends: (f32, f32),
        mask: ChannelMask,
    ) {
        if value == 0.0 {
            return;
        }
        for ch in mask.channels() {
            let g = gains[ch as usize];
            if g == 0.0 {
                continue;
            }
            let v = value * g;
            let ch = ch as u16;
            self.main.add(ch, frame, v);
            if sends.0 > 0.0 {
                self.aux_a.add(ch, frame, v * sends.0);
            }
            if sends.1 > 0.0 {
                self.aux_b.add(ch, frame, v * sends.1);
            }
        }
    }

    /// Run effects, sum returns and master, and write `out`.
    pub fn finish(&mut self, studio: &mut Studio, out: &mut [Frame]) {
        let mask = studio.channel_mask();
        studio.aux_a.process(&mut self.aux_a, mask);
        studio.aux_b.process(&mut self.aux_b, mask);
        self.main.mix_from_scaled(&self.aux_a, studio.aux_a.level());
        self.main.mix_from_scaled(&self.aux_b, studio.aux_b.level());

        let master = studio.master_volume();
        let frames = out.len().min(self.main.len());
        for (f, frame) in out[..frames].iter_mut().enumerate() {
            *frame = Frame::for_mask(mask);
            for (slot, ch) in mask.channels().enumerate() {
                frame.samples[slot] = saturate(self.main.get(ch as u16, f) * master);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use am_ir::StudioSetup;

    fn power(g: &[f32]) -> f32 {
        g.iter().map(|v| v * v).sum()
    }

    #[test]
    fn centre_pan_is_equal_power() {
        let law = PanLaw::new();
        let g = law.gains(0.0, 0.0, ChannelMask::STEREO);
        assert!((g[0] - g[1]).abs() < 1e-6);
        assert!((power(&g) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn hard_pan_silences_other_side() {
        let law = PanLaw::new();
        let g = law.gains(-1.0, 0.0, ChannelMask::STEREO);
        assert!((g[0] - 1.0).abs() < 1e-6);
        assert!(g[1].abs() < 1e-6);
    }

    #[test]
    fn power_preserved_on_every_layout() {
        let law = PanLaw::new();
        for mask in [ChannelMask::STEREO, ChannelMask::QUAD, ChannelMask::SURROUND_5_1, ChannelMask::SURROUND_7_1] {
            for &pan in &[-1.0, -0.3, 0.0, 0.6, 1.0] {
                for &span in &[0.0, 0.25, 0.5, 1.0] {
                    let g = law.gains(pan, span, mask);
                    assert!((power(&g) - 1.0).abs() < 1e-3, "{mask:?} {pan} {span}");
                }
            }
        }
    }

    #[test]
    fn rear_span_folds_into_front_on_stereo() {
        let law = PanLaw::new();
        let g = law.gains(0.0, 1.0, ChannelMask::STEREO);
        assert!(g[0] > 0.7 && g[1] > 0.7);
        let q = law.gains(0.0, 1.0, ChannelMask::QUAD);
        assert!(q[0] < 1e-6 && q[AudioChannel::RearLeft as usize] > 0.7);
    }

    #[test]
    fn finish_packs_active_channels() {
        let mut studio = Studio::new(StudioSetup::default(), 48000);
        let mut mixer = Mixer::new(4);
        mixer.begin(2);
        mixer.mix(0, 0.5, &[1.0, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], (0.0, 0.0), ChannelMask::STEREO);
        let mut out = [Frame::default(); 2];
        mixer.finish(&mut studio, &mut out);
        assert_eq!(out[0].channels, 2);
        assert_eq!(out[0].left(), 16384);
        assert_eq!(out[0].right(), 8192);
        assert!(out[1].is_silent());
    }

    #[test]
    fn master_volume_scales_output() {
        let setup = StudioSetup { master_volume: 0.5, ..StudioSetup::default() };
        let mut studio = Studio::new(setup, 48000);
        let mut mixer = Mixer::new(1);
        mixer.begin(1);
        mixer.mix(0, 0.5, &[1.0; 8], (0.0, 0.0), ChannelMask::STEREO);
        let mut out = [Frame::default()];
        mixer.finish(&mut studio, &mut out);
        assert_eq!(out[0].left(), 8192);
    }
}
