//! Sample data types.

use alloc::vec::Vec;

use crate::Name;

/// Fractional bits of a playback position.
pub const FRAC_BITS: u32 = 16;

/// A PCM sample region referenced by `StartSample`.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub name: Name,
    pub data: SampleData,
    /// Rate the sample was recorded at, in Hz.
    pub sample_rate: u32,
    /// Key at which the sample plays back unshifted.
    pub root_key: u8,
    /// Loop start (in frames).
    pub loop_start: u32,
    /// Loop end, exclusive (in frames). Equal to `loop_start` when unlooped.
    pub loop_end: u32,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            name: Name::new(),
            data: SampleData::Mono16(Vec::new()),
            sample_rate: 32000,
            root_key: 60,
            loop_start: 0,
            loop_end: 0,
        }
    }
}

impl Sample {
    /// Create a new empty sample.
    pub fn new(name: &str) -> Self {
        Self {
            name: crate::name(name),
            ..Self::default()
        }
    }

    /// Create a 16-bit sample.
    pub fn from_pcm16(name: &str, pcm: Vec<i16>, sample_rate: u32, root_key: u8) -> Self {
        Self {
            name: crate::name(name),
            data: SampleData::Mono16(pcm),
            sample_rate,
            root_key,
            ..Self::default()
        }
    }

    /// Set the loop region, clamped to the data.
    pub fn with_loop(mut self, start: u32, end: u32) -> Self {
        let len = self.len() as u32;
        self.loop_end = end.min(len);
        self.loop_start = start.min(self.loop_end);
        self
    }

    /// Length in frames.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the sample has a usable loop region.
    pub fn has_loop(&self) -> bool {
        self.loop_end > self.loop_start
    }
}

/// Mono PCM storage.
#[derive(Clone, Debug, PartialEq)]
pub enum SampleData {
    Mono8(Vec<i8>),
    Mono16(Vec<i16>),
}

impl SampleData {
    /// Number of frames.
    pub fn len(&self) -> usize {
        match self {
            SampleData::Mono8(v) => v.len(),
            SampleData::Mono16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample at `pos` as i16, silence past the end.
    pub fn get(&self, pos: usize) -> i16 {
        match self {
            SampleData::Mono8(v) => v.get(pos).copied().unwrap_or(0) as i16 * 256,
            SampleData::Mono16(v) => v.get(pos).copied().unwrap_or(0),
        }
    }

    /// Linearly interpolated value at a fixed-point position.
    ///
    /// `next` is the frame blended towards, so loops can wrap the
    /// interpolation back to the loop start.
    pub fn get_interpolated(&self, pos_fixed: u64, next: usize) -> i16 {
        let idx = (pos_fixed >> FRAC_BITS) as usize;
        let frac = (pos_fixed & ((1 << FRAC_BITS) - 1)) as i64;

        let a = self.get(idx) as i64;
        let b = self.get(next) as i64;

        (a + (((b - a) * frac) >> FRAC_BITS)) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn mono8(data: &[i8]) -> SampleData {
        SampleData::Mono8(data.to_vec())
    }

    #[test]
    fn interpolated_at_integer_matches_nearest() {
        let data = mono8(&[0, 100, -50, 30]);
        assert_eq!(data.get_interpolated(1 << FRAC_BITS, 2), data.get(1));
    }

    #[test]
    fn interpolated_midpoint_averages_neighbors() {
        let data = mono8(&[0, 100]);
        let mid = data.get_interpolated(1 << (FRAC_BITS - 1), 1);
        let expected = (data.get(1) as i32 / 2) as i16;
        assert!((mid as i32 - expected as i32).abs() <= 1);
    }

    #[test]
    fn interpolation_can_wrap_to_loop_start() {
        let data = SampleData::Mono16(vec![1000, 0, 0, 2000]);
        // Halfway between frame 3 and the loop start (frame 0).
        let v = data.get_interpolated((3 << FRAC_BITS) + (1 << (FRAC_BITS - 1)), 0);
        assert!((v as i32 - 1500).abs() <= 1);
    }

    #[test]
    fn past_end_is_silent() {
        let data = SampleData::Mono16(vec![5]);
        assert_eq!(data.get(3), 0);
    }

    #[test]
    fn with_loop_clamps_to_length() {
        let s = Sample::from_pcm16("s", vec![0; 10], 32000, 60).with_loop(4, 50);
        assert_eq!(s.loop_end, 10);
        assert_eq!(s.loop_start, 4);
        assert!(s.has_loop());
    }
}
