//! ADSR envelope definitions.

use crate::ids::CurveId;
use crate::Name;

/// Attack/decay/sustain/release parameters shared by many voices.
#[derive(Clone, Debug, PartialEq)]
pub struct Adsr {
    pub name: Name,
    /// Attack time in milliseconds.
    pub attack_ms: u32,
    /// Decay time in milliseconds (see `dls` for its meaning).
    pub decay_ms: u32,
    /// Sustain level, 0.0..=1.0.
    pub sustain: f32,
    /// Release time in milliseconds.
    pub release_ms: u32,
    /// DLS convention: decay time runs from full level to silence rather
    /// than from full level to the sustain level.
    pub dls: bool,
    /// Velocity-to-attack scaling in time-cents (negative = faster when louder).
    pub vel_to_attack: i32,
    /// Key-to-decay scaling in time-cents relative to key 60.
    pub key_to_decay: i32,
    /// Optional shaping curves for attack, decay and release.
    pub attack_curve: Option<CurveId>,
    pub decay_curve: Option<CurveId>,
    pub release_curve: Option<CurveId>,
}

impl Default for Adsr {
    fn default() -> Self {
        Self {
            name: Name::new(),
            attack_ms: 0,
            decay_ms: 0,
            sustain: 1.0,
            release_ms: 0,
            dls: false,
            vel_to_attack: 0,
            key_to_decay: 0,
            attack_curve: None,
            decay_curve: None,
            release_curve: None,
        }
    }
}

impl Adsr {
    /// Create a linear ADSR.
    pub fn new(name: &str, attack_ms: u32, decay_ms: u32, sustain: f32, release_ms: u32) -> Self {
        Self {
            name: crate::name(name),
            attack_ms,
            decay_ms,
            sustain: sustain.clamp(0.0, 1.0),
            release_ms,
            ..Self::default()
        }
    }

    /// Curve references used by this envelope.
    pub fn curves(&self) -> impl Iterator<Item = CurveId> + '_ {
        [self.attack_curve, self.decay_curve, self.release_curve]
            .into_iter()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clamps_sustain() {
        assert_eq!(Adsr::new("a", 1, 1, 1.5, 1).sustain, 1.0);
        assert_eq!(Adsr::new("a", 1, 1, -0.5, 1).sustain, 0.0);
    }

    #[test]
    fn curves_lists_only_present_references() {
        let mut adsr = Adsr::new("a", 1, 1, 0.5, 1);
        adsr.decay_curve = Some(CurveId(4));
        let ids: alloc::vec::Vec<_> = adsr.curves().collect();
        assert_eq!(ids, [CurveId(4)]);
    }
}
