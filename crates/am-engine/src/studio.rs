//! Runtime studio: the two aux buses and their effects.

use alloc::boxed::Box;

use am_ir::{AudioBuffer, AuxSetup, ChannelMask, EffectKind, StudioSetup};

use crate::effect::AuxEffect;
use crate::effects::create_effect;

/// One aux bus and the effect running on it.
pub struct AuxBus {
    effect: Option<Box<dyn AuxEffect>>,
    kind: EffectKind,
    level: f32,
}

impl AuxBus {
    fn new(setup: &AuxSetup, sample_rate: u32) -> Self {
        Self {
            effect: create_effect(&setup.effect, sample_rate),
            kind: setup.effect,
            level: setup.level.clamp(0.0, 1.0),
        }
    }

    fn apply(&mut self, setup: &AuxSetup, sample_rate: u32) {
        self.level = setup.level.clamp(0.0, 1.0);
        if setup.effect == self.kind {
            return;
        }
        let retuned = self
            .effect
            .as_mut()
            .is_some_and(|e| e.set_params(&setup.effect));
        if !retuned {
            tracing::debug!(effect = setup.effect.tag(), "aux effect replaced");
            self.effect = create_effect(&setup.effect, sample_rate);
        }
        self.kind = setup.effect;
    }

    pub fn kind(&self) -> &EffectKind {
        &self.kind
    }

    pub fn effect_name(&self) -> Option<&'static str> {
        self.effect.as_ref().map(|e| e.name())
    }

    /// Return level, 0 when the bus is empty.
    pub fn level(&self) -> f32 {
        if self.effect.is_some() {
            self.level
        } else {
            0.0
        }
    }

    /// Run the effect over the bus buffer.
    pub fn process(&mut self, buffer: &mut AudioBuffer, mask: ChannelMask) {
        if let Some(effect) = &mut self.effect {
            effect.process(buffer, mask);
        }
    }

    pub fn reset(&mut self) {
        if let Some(effect) = &mut self.effect {
            effect.reset();
        }
    }
}

/// Active studio configuration.
pub struct Studio {
    setup: StudioSetup,
    sample_rate: u32,
    pub aux_a: AuxBus,
    pub aux_b: AuxBus,
}

impl Studio {
    pub fn new(setup: StudioSetup, sample_rate: u32) -> Self {
        Self {
            aux_a: AuxBus::new(&setup.aux_a, sample_rate),
            aux_b: AuxBus::new(&setup.aux_b, sample_rate),
            setup,
            sample_rate,
        }
    }

    pub fn setup(&self) -> &StudioSetup {
        &self.setup
    }

    pub fn channel_mask(&self) -> ChannelMask {
        self.setup.channel_mask
    }

    pub fn master_volume(&self) -> f32 {
        self.setup.master_volume.clamp(0.0, 1.0)
    }

    /// Switch to `setup`. Effects of the same kind are retuned in place so
    /// their tails survive; a different kind replaces the effect.
    pub fn apply(&mut self, setup: StudioSetup) {
        self.aux_a.apply(&setup.aux_a, self.sample_rate);
        self.aux_b.apply(&setup.aux_b, self.sample_rate);
        if setup.channel_mask != self.setup.channel_mask {
            self.aux_a.reset();
            self.aux_b.reset();
        }
        self.setup = setup;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use am_ir::{DelayParams, ReverbParams};

    fn with_a(effect: EffectKind) -> StudioSetup {
        StudioSetup {
            aux_a: AuxSetup { effect, level: 0.5 },
            ..StudioSetup::default()
        }
    }

    #[test]
    fn empty_bus_returns_nothing() {
        let studio = Studio::new(StudioSetup::default(), 48000);
        assert_eq!(studio.aux_a.level(), 0.0);
        assert!(studio.aux_a.effect_name().is_none());
    }

    #[test]
    fn switching_kind_replaces_effect() {
        let mut studio = Studio::new(with_a(EffectKind::Delay(DelayParams::default())), 48000);
        assert_eq!(studio.aux_a.effect_name(), Some("Delay"));
        studio.apply(with_a(EffectKind::ReverbStd(ReverbParams::default())));
        assert_eq!(studio.aux_a.effect_name(), Some("Reverb"));
        assert_eq!(studio.aux_a.level(), 0.5);
    }

    #[test]
    fn same_kind_retunes_in_place() {
        let mut studio = Studio::new(with_a(EffectKind::Delay(DelayParams::default())), 48000);
        let longer = EffectKind::Delay(DelayParams { delay_ms: 400, ..DelayParams::default() });
        studio.apply(with_a(longer));
        assert_eq!(studio.aux_a.kind(), &longer);
        assert_eq!(studio.aux_a.effect_name(), Some("Delay"));
    }

    #[test]
    fn clearing_bus_drops_effect() {
        let mut studio = Studio::new(with_a(EffectKind::Delay(DelayParams::default())), 48000);
        studio.apply(StudioSetup::default());
        assert!(studio.aux_a.effect_name().is_none());
    }
}
