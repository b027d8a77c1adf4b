//! Pitch-to-increment conversion for sample playback.
//!
//! Pitches are in cents (MIDI note × 100). A sample recorded at
//! `sample_rate` plays unshifted at its `root_key`; the result is a
//! fixed-point increment with [`FRAC_BITS`] fractional bits for stepping
//! through sample frames at the output rate.

use am_ir::FRAC_BITS;

/// Multipliers for 0-11 semitones, scaled by 65536.
/// `SEMITONE_MUL[n] = round(2^(n/12) * 65536)`
const SEMITONE_MUL: [u64; 12] = [
    65536, 69433, 73562, 77936, 82570, 87480, 92682, 98193, 104032, 110218, 116772, 123715,
];

/// Lowest and highest pitch accepted, in cents.
const PITCH_MIN: i32 = 0;
const PITCH_MAX: i32 = 127 * 100 + 99;

/// Fixed-point increment for playing a sample at `pitch_cents`.
pub fn pitch_to_increment(sample_rate: u32, root_key: u8, pitch_cents: i32, output_rate: u32) -> u64 {
    if output_rate == 0 || sample_rate == 0 {
        return 0;
    }
    let offset = pitch_cents.clamp(PITCH_MIN, PITCH_MAX) - root_key as i32 * 100;
    // `shift_frequency` already carries FRAC_BITS fractional bits.
    shift_frequency(sample_rate as u64, offset) / output_rate as u64
}

const _: () = assert!(FRAC_BITS == 16);

/// Shift a frequency by `cents`; the result carries 16 fractional bits.
fn shift_frequency(base: u64, cents: i32) -> u64 {
    let semitones = cents.div_euclid(100);
    let fine = cents.rem_euclid(100);
    let octaves = semitones.div_euclid(12);
    let remainder = semitones.rem_euclid(12) as usize;

    let fine_mul = (libm::exp2(fine as f64 / 1200.0) * 65536.0) as u64;
    let scaled = (base * SEMITONE_MUL[remainder]) * fine_mul >> 16;

    if octaves >= 0 {
        scaled << octaves as u32
    } else {
        scaled >> (-octaves) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 32000;
    const OUT: u32 = 48000;

    fn unit() -> u64 {
        1 << FRAC_BITS
    }

    #[test]
    fn root_key_at_same_rate_is_unity() {
        assert_eq!(pitch_to_increment(OUT, 60, 6000, OUT), unit());
    }

    #[test]
    fn octave_up_doubles() {
        let base = pitch_to_increment(RATE, 60, 6000, OUT);
        let up = pitch_to_increment(RATE, 60, 7200, OUT);
        assert!((up as i64 - base as i64 * 2).abs() <= 1);
    }

    #[test]
    fn octave_down_halves() {
        let base = pitch_to_increment(RATE, 60, 6000, OUT);
        let down = pitch_to_increment(RATE, 60, 4800, OUT);
        assert!((down as i64 - base as i64 / 2).abs() <= 1);
    }

    #[test]
    fn fifty_cents_is_quarter_tone() {
        let base = pitch_to_increment(OUT, 60, 6000, OUT) as f64;
        let up = pitch_to_increment(OUT, 60, 6050, OUT) as f64;
        let ratio = up / base;
        assert!((ratio - 1.029302).abs() < 0.001);
    }

    #[test]
    fn sample_rate_scales_increment() {
        let half = pitch_to_increment(OUT / 2, 60, 6000, OUT);
        assert_eq!(half, unit() / 2);
    }

    #[test]
    fn zero_rates_return_zero() {
        assert_eq!(pitch_to_increment(RATE, 60, 6000, 0), 0);
        assert_eq!(pitch_to_increment(0, 60, 6000, OUT), 0);
    }

    #[test]
    fn out_of_range_pitch_is_clamped() {
        let top = pitch_to_increment(RATE, 60, PITCH_MAX, OUT);
        assert_eq!(pitch_to_increment(RATE, 60, 99_999, OUT), top);
        assert!(pitch_to_increment(RATE, 60, -500, OUT) > 0);
    }
}
