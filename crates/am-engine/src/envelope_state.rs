//! Runtime ADSR envelope generator.
//!
//! `Idle → Attack → Decay → Sustain → Release → Idle`, advanced per output
//! sample. Every phase starts from the level the previous one left, so the
//! output is continuous across Attack→Decay and Sustain/Decay→Release.

use am_ir::{Adsr, CurveId, Subproject};

use crate::curve_eval::CurveEvaluator;

/// Envelope phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AdsrPhase {
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Velocity-to-attack and key-to-decay scaling.
pub trait EnvelopeScaling {
    /// Factor applied to the attack time for a note-on velocity.
    fn attack_factor(&self, adsr: &Adsr, velocity: u8) -> f32;
    /// Factor applied to the decay time for a key.
    fn decay_factor(&self, adsr: &Adsr, key: u8) -> f32;
}

/// DLS time-cents scaling.
///
/// `attack × 2^(vel/128 × vel_to_attack / 1200)` and
/// `decay × 2^((key − 60)/128 × key_to_decay / 1200)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeCentsScaling;

impl EnvelopeScaling for TimeCentsScaling {
    fn attack_factor(&self, adsr: &Adsr, velocity: u8) -> f32 {
        let cents = velocity as f32 / 128.0 * adsr.vel_to_attack as f32;
        libm::exp2f(cents / 1200.0)
    }

    fn decay_factor(&self, adsr: &Adsr, key: u8) -> f32 {
        let cents = (key as f32 - 60.0) / 128.0 * adsr.key_to_decay as f32;
        libm::exp2f(cents / 1200.0)
    }
}

/// Length of the fade applied to voices released without an ADSR.
pub const FADE_MS: u32 = 5;

/// Per-voice envelope state.
#[derive(Clone, Debug, Default)]
pub struct AdsrState {
    phase: AdsrPhase,
    level: f32,
    /// Level at the start of the current phase.
    from: f32,
    /// Level the current phase ends at.
    to: f32,
    elapsed: u32,
    duration: u32,
    attack: u32,
    decay: u32,
    sustain: f32,
    release: u32,
    attack_curve: Option<CurveId>,
    decay_curve: Option<CurveId>,
    release_curve: Option<CurveId>,
    /// False for the implicit full-level gate used before `SetAdsr`.
    shaped: bool,
    eval: CurveEvaluator,
}

impl AdsrState {
    /// A held full-level gate with no ADSR attached.
    pub fn gate() -> Self {
        Self {
            phase: AdsrPhase::Sustain,
            level: 1.0,
            sustain: 1.0,
            ..Self::default()
        }
    }

    /// Note-on: start the attack from the current level.
    ///
    /// Phase lengths are resolved to samples here, so the envelope no
    /// longer needs the ADSR definition afterwards.
    pub fn note_on(
        &mut self,
        adsr: &Adsr,
        velocity: u8,
        key: u8,
        sample_rate: u32,
        scaling: &dyn EnvelopeScaling,
    ) {
        let ms_to_samples = |ms: f32| (ms * sample_rate as f32 / 1000.0) as u32;
        let sustain = adsr.sustain.clamp(0.0, 1.0);

        let decay_ms = adsr.decay_ms as f32 * scaling.decay_factor(adsr, key);
        // DLS decay runs from full level to silence; only the part down to
        // the sustain level is used.
        let decay_ms = if adsr.dls { decay_ms * (1.0 - sustain) } else { decay_ms };

        self.attack = ms_to_samples(adsr.attack_ms as f32 * scaling.attack_factor(adsr, velocity));
        self.decay = ms_to_samples(decay_ms);
        self.sustain = sustain;
        self.release = ms_to_samples(adsr.release_ms as f32);
        self.attack_curve = adsr.attack_curve;
        self.decay_curve = adsr.decay_curve;
        self.release_curve = adsr.release_curve;
        // The implicit gate has no attack of its own; a first ADSR starts
        // from silence like an idle one.
        if self.phase == AdsrPhase::Idle || !self.shaped {
            self.level = 0.0;
        }
        self.shaped = true;
        self.eval.reset();

        self.enter(AdsrPhase::Attack);
    }

    /// Note-off: release from the current level.
    pub fn note_off(&mut self) {
        if self.shaped && !matches!(self.phase, AdsrPhase::Idle | AdsrPhase::Release) {
            self.enter(AdsrPhase::Release);
        }
    }

    /// Release over `fade` samples when no ADSR is attached, otherwise
    /// use the envelope's own release.
    pub fn force_release(&mut self, fade: u32) {
        if self.phase == AdsrPhase::Idle || (self.phase == AdsrPhase::Release && self.shaped) {
            return;
        }
        if !self.shaped {
            self.release = fade;
            self.release_curve = None;
            self.shaped = true;
        }
        self.enter(AdsrPhase::Release);
    }

    pub fn phase(&self) -> AdsrPhase {
        self.phase
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_idle(&self) -> bool {
        self.phase == AdsrPhase::Idle
    }

    /// Whether a real ADSR (or a forced fade) drives this envelope.
    pub fn is_shaped(&self) -> bool {
        self.shaped
    }

    /// Whether an invalid shaping curve was evaluated.
    pub fn faulted(&self) -> bool {
        self.eval.faulted()
    }

    /// Advance by `samples` and return the new level.
    pub fn advance(&mut self, samples: u32, subproject: &Subproject) -> f32 {
        let mut remaining = samples;
        while remaining > 0 {
            match self.phase {
                AdsrPhase::Idle | AdsrPhase::Sustain => break,
                _ => {}
            }
            let step = remaining.min(self.duration - self.elapsed);
            self.elapsed += step;
            remaining -= step;
            if self.elapsed >= self.duration {
                self.level = self.to;
                self.finish_phase();
            } else {
                self.level = self.interpolate(subproject);
            }
        }
        self.level
    }

    fn interpolate(&mut self, subproject: &Subproject) -> f32 {
        let curve = match self.phase {
            AdsrPhase::Attack => self.attack_curve,
            AdsrPhase::Decay => self.decay_curve,
            AdsrPhase::Release => self.release_curve,
            _ => None,
        };
        let x = self.elapsed as f32 / self.duration as f32;
        let t = self.eval.progress(curve.and_then(|c| subproject.curve(c)), x);
        (self.from + (self.to - self.from) * t).clamp(0.0, 1.0)
    }

    fn finish_phase(&mut self) {
        match self.phase {
            AdsrPhase::Attack => self.enter(AdsrPhase::Decay),
            AdsrPhase::Decay => self.enter(AdsrPhase::Sustain),
            AdsrPhase::Release => self.enter(AdsrPhase::Idle),
            AdsrPhase::Idle | AdsrPhase::Sustain => {}
        }
    }

    fn enter(&mut self, phase: AdsrPhase) {
        self.phase = phase;
        self.from = self.level;
        self.elapsed = 0;
        let (to, duration) = match phase {
            AdsrPhase::Attack => (1.0, self.attack),
            AdsrPhase::Decay => (self.sustain, self.decay),
            AdsrPhase::Sustain => (self.sustain, 0),
            AdsrPhase::Release => (0.0, self.release),
            AdsrPhase::Idle => (0.0, 0),
        };
        self.to = to;
        self.duration = duration;
        match phase {
            AdsrPhase::Sustain => self.level = self.sustain,
            AdsrPhase::Idle => self.level = 0.0,
            _ if duration == 0 => {
                self.level = to;
                self.finish_phase();
            }
            _ => {}
        }
    }
}
