//! Planar f32 mix buffer used by the mixer and aux effects.

use alloc::vec;
use alloc::vec::Vec;

/// Maximum number of speaker channels.
pub const MAX_CHANNELS: u16 = 8;

/// Frames rendered per mixer block.
pub const BLOCK_SIZE: usize = 256;

/// A multichannel f32 buffer in planar layout.
///
/// Storage is fixed at construction; `set_len` selects how many frames of
/// each plane are in use so short blocks never reallocate.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    data: Vec<f32>,
    channels: u16,
    capacity: usize,
    len: usize,
}

impl AudioBuffer {
    /// Create a silent buffer of `channels` planes with `capacity` frames each.
    pub fn new(channels: u16, capacity: usize) -> Self {
        Self {
            data: vec![0.0; channels as usize * capacity],
            channels,
            capacity,
            len: capacity,
        }
    }

    /// Zero every plane.
    pub fn silence(&mut self) {
        self.data.fill(0.0);
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Frames in use.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Select the number of frames in use, clamped to the capacity.
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.capacity);
    }

    /// One plane, limited to the frames in use.
    pub fn channel(&self, ch: u16) -> &[f32] {
        let start = ch as usize * self.capacity;
        &self.data[start..start + self.len]
    }

    pub fn channel_mut(&mut self, ch: u16) -> &mut [f32] {
        let start = ch as usize * self.capacity;
        let len = self.len;
        &mut self.data[start..start + len]
    }

    /// Accumulate one value into a single frame of one plane.
    #[inline]
    pub fn add(&mut self, ch: u16, frame: usize, value: f32) {
        self.data[ch as usize * self.capacity + frame] += value;
    }

    #[inline]
    pub fn get(&self, ch: u16, frame: usize) -> f32 {
        self.data[ch as usize * self.capacity + frame]
    }

    /// Sum `source * gain` into the overlapping planes and frames.
    pub fn mix_from_scaled(&mut self, source: &AudioBuffer, gain: f32) {
        let chs = self.channels.min(source.channels);
        let frames = self.len.min(source.len);
        for ch in 0..chs {
            let src = &source.channel(ch)[..frames];
            let dst = &mut self.channel_mut(ch)[..frames];
            for (d, s) in dst.iter_mut().zip(src) {
                *d += s * gain;
            }
        }
    }

    /// Scale the frames in use by `gain`.
    pub fn apply_gain(&mut self, gain: f32) {
        for ch in 0..self.channels {
            for s in self.channel_mut(ch) {
                *s *= gain;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_silent() {
        let buf = AudioBuffer::new(2, 4);
        assert_eq!(buf.channels(), 2);
        assert_eq!(buf.len(), 4);
        assert!(buf.channel(1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn set_len_limits_planes() {
        let mut buf = AudioBuffer::new(2, 8);
        buf.set_len(3);
        assert_eq!(buf.channel(0).len(), 3);
        buf.set_len(100);
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn add_accumulates_in_place() {
        let mut buf = AudioBuffer::new(2, 2);
        buf.add(1, 1, 0.25);
        buf.add(1, 1, 0.25);
        assert_eq!(buf.channel(1), &[0.0, 0.5]);
        assert_eq!(buf.channel(0), &[0.0, 0.0]);
    }

    #[test]
    fn mix_from_scaled_uses_overlap() {
        let mut dst = AudioBuffer::new(2, 4);
        let mut src = AudioBuffer::new(1, 2);
        src.channel_mut(0)[0] = 1.0;
        src.channel_mut(0)[1] = -1.0;

        dst.mix_from_scaled(&src, 0.5);
        assert_eq!(dst.channel(0), &[0.5, -0.5, 0.0, 0.0]);
        assert!(dst.channel(1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn apply_gain_skips_unused_frames() {
        let mut buf = AudioBuffer::new(1, 2);
        buf.channel_mut(0).fill(1.0);
        buf.set_len(1);
        buf.apply_gain(2.0);
        buf.set_len(2);
        assert_eq!(buf.channel(0), &[2.0, 1.0]);
    }
}
