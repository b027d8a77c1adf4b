//! Output frame type.

use am_ir::{ChannelMask, MAX_CHANNELS};

/// One multichannel output frame (16-bit integer).
///
/// Only the first `channels` samples are meaningful; they hold the active
/// speakers of the studio's channel mask in buffer order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    pub samples: [i16; MAX_CHANNELS as usize],
    pub channels: u8,
}

impl Default for Frame {
    fn default() -> Self {
        Self::silence(2)
    }
}

impl Frame {
    /// Create a silent frame.
    pub const fn silence(channels: u8) -> Self {
        Self {
            samples: [0; MAX_CHANNELS as usize],
            channels,
        }
    }

    /// Create a stereo frame.
    pub const fn stereo(left: i16, right: i16) -> Self {
        let mut samples = [0; MAX_CHANNELS as usize];
        samples[0] = left;
        samples[1] = right;
        Self { samples, channels: 2 }
    }

    /// Silent frame laid out for `mask`.
    pub fn for_mask(mask: ChannelMask) -> Self {
        Self::silence(mask.count() as u8)
    }

    /// The meaningful samples.
    pub fn as_slice(&self) -> &[i16] {
        &self.samples[..self.channels as usize]
    }

    pub fn left(&self) -> i16 {
        self.samples[0]
    }

    pub fn right(&self) -> i16 {
        if self.channels > 1 {
            self.samples[1]
        } else {
            self.samples[0]
        }
    }

    /// Mix another frame into this one, saturating.
    pub fn mix(&mut self, other: &Frame) {
        for (a, b) in self.samples.iter_mut().zip(other.samples.iter()) {
            *a = a.saturating_add(*b);
        }
        self.channels = self.channels.max(other.channels);
    }

    /// Whether every meaningful sample is zero.
    pub fn is_silent(&self) -> bool {
        self.as_slice().iter().all(|&s| s == 0)
    }
}

/// Convert an f32 accumulator value to i16, saturating.
#[inline]
pub fn saturate(value: f32) -> i16 {
    let scaled = value * 32768.0;
    if scaled >= 32767.0 {
        32767
    } else if scaled <= -32768.0 {
        -32768
    } else {
        scaled as i16
    }
}
