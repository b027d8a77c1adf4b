//! Runtime settings.
//!
//! Settings come from an optional YAML file overlaid with `AMUSE__*`
//! environment variables (`AMUSE__SAMPLE_RATE=44100`,
//! `AMUSE__STUDIO__MASTER_VOLUME=0.5`). Every field has a default, so an
//! empty source yields a working configuration.

use std::path::Path;

use am_engine::EngineConfig;
use am_ir::{
    AuxSetup, ChannelMask, ChorusParams, DelayParams, EffectKind, ReverbParams, StudioSetup,
};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::ControllerError;

/// Engine and studio settings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Offline render rate; real-time playback uses the device rate.
    pub sample_rate: u32,
    pub tick_rate: u32,
    pub max_voices: usize,
    pub seed: u64,
    pub instruction_budget: u16,
    pub studio: StudioSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            sample_rate: engine.sample_rate,
            tick_rate: engine.tick_rate,
            max_voices: engine.max_voices,
            seed: engine.seed,
            instruction_budget: engine.instruction_budget,
            studio: StudioSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Settings, ControllerError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("AMUSE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.check()?;
        Ok(settings)
    }

    /// Parse settings from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Settings, ControllerError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        settings.check()?;
        Ok(settings)
    }

    fn check(&self) -> Result<(), ControllerError> {
        if self.sample_rate == 0 {
            return Err(invalid("sample_rate", "must be positive"));
        }
        if self.tick_rate == 0 || self.tick_rate > self.sample_rate {
            return Err(invalid("tick_rate", "must be between 1 and the sample rate"));
        }
        if self.max_voices == 0 {
            return Err(invalid("max_voices", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.studio.master_volume) {
            return Err(invalid("studio.master_volume", "must be within 0..=1"));
        }
        Ok(())
    }

    /// Engine parameters for rendering at `sample_rate`.
    pub fn engine_config(&self, sample_rate: u32) -> EngineConfig {
        EngineConfig {
            sample_rate,
            tick_rate: self.tick_rate,
            max_voices: self.max_voices,
            seed: self.seed,
            instruction_budget: self.instruction_budget,
        }
    }

    pub fn studio_setup(&self) -> StudioSetup {
        self.studio.setup()
    }
}

fn invalid(name: &'static str, message: &str) -> ControllerError {
    ControllerError::InvalidSetting { name, message: message.to_string() }
}

/// Speaker layout names accepted in settings.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
pub enum ChannelLayout {
    #[default]
    #[serde(rename = "stereo")]
    Stereo,
    #[serde(rename = "quad")]
    Quad,
    #[serde(rename = "5.1")]
    Surround51,
    #[serde(rename = "7.1")]
    Surround71,
}

impl ChannelLayout {
    pub fn mask(self) -> ChannelMask {
        match self {
            ChannelLayout::Stereo => ChannelMask::STEREO,
            ChannelLayout::Quad => ChannelMask::QUAD,
            ChannelLayout::Surround51 => ChannelMask::SURROUND_5_1,
            ChannelLayout::Surround71 => ChannelMask::SURROUND_7_1,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct StudioSettings {
    pub master_volume: f32,
    pub channels: ChannelLayout,
    pub aux_a: AuxSettings,
    pub aux_b: AuxSettings,
}

impl Default for StudioSettings {
    fn default() -> Self {
        Self {
            master_volume: 1.0,
            channels: ChannelLayout::Stereo,
            aux_a: AuxSettings::default(),
            aux_b: AuxSettings::default(),
        }
    }
}

impl StudioSettings {
    pub fn setup(&self) -> StudioSetup {
        StudioSetup {
            aux_a: self.aux_a.setup(),
            aux_b: self.aux_b.setup(),
            master_volume: self.master_volume,
            channel_mask: self.channels.mask(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuxSettings {
    pub effect: EffectSettings,
    pub level: f32,
}

impl AuxSettings {
    fn setup(&self) -> AuxSetup {
        AuxSetup {
            effect: self.effect.kind(),
            level: self.level.clamp(0.0, 1.0),
        }
    }
}

/// Aux effect selection, tagged by `type`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectSettings {
    #[default]
    None,
    Reverb(ReverbSettings),
    ReverbHq(ReverbSettings),
    Delay(DelaySettings),
    Chorus(ChorusSettings),
}

impl EffectSettings {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectSettings::None => EffectKind::None,
            EffectSettings::Reverb(r) => EffectKind::ReverbStd(r.params()),
            EffectSettings::ReverbHq(r) => EffectKind::ReverbHi(r.params()),
            EffectSettings::Delay(d) => EffectKind::Delay(DelayParams {
                delay_ms: d.delay_ms,
                feedback: d.feedback,
                output: d.output,
            }),
            EffectSettings::Chorus(c) => EffectKind::Chorus(ChorusParams {
                base_delay_ms: c.base_delay_ms,
                variation_ms: c.variation_ms,
                period_ms: c.period_ms,
            }),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReverbSettings {
    pub coloration: f32,
    pub mix: f32,
    pub time: f32,
    pub damping: f32,
    pub pre_delay: f32,
    pub crosstalk: f32,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        let p = ReverbParams::default();
        Self {
            coloration: p.coloration,
            mix: p.mix,
            time: p.time,
            damping: p.damping,
            pre_delay: p.pre_delay,
            crosstalk: p.crosstalk,
        }
    }
}

impl ReverbSettings {
    fn params(&self) -> ReverbParams {
        ReverbParams {
            coloration: self.coloration.clamp(0.0, 1.0),
            mix: self.mix.clamp(0.0, 1.0),
            time: self.time.clamp(0.01, 10.0),
            damping: self.damping.clamp(0.0, 1.0),
            pre_delay: self.pre_delay.clamp(0.0, 0.1),
            crosstalk: self.crosstalk.clamp(0.0, 1.0),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DelaySettings {
    pub delay_ms: u32,
    pub feedback: u32,
    pub output: u32,
}

impl Default for DelaySettings {
    fn default() -> Self {
        let p = DelayParams::default();
        Self { delay_ms: p.delay_ms, feedback: p.feedback, output: p.output }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChorusSettings {
    pub base_delay_ms: u32,
    pub variation_ms: u32,
    pub period_ms: u32,
}

impl Default for ChorusSettings {
    fn default() -> Self {
        let p = ChorusParams::default();
        Self { base_delay_ms: p.base_delay_ms, variation_ms: p.variation_ms, period_ms: p.period_ms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let settings = Settings::from_yaml("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.studio_setup(), StudioSetup::default());
    }

    #[test]
    fn studio_section_deserializes() {
        let yaml = r#"
            sample_rate: 32000
            max_voices: 24
            studio:
              master_volume: 0.8
              channels: "5.1"
              aux_a:
                effect:
                  type: reverb_hq
                  time: 3.0
                level: 0.6
              aux_b:
                effect:
                  type: delay
                  delay_ms: 120
                level: 0.3
        "#;

        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.sample_rate, 32000);
        assert_eq!(settings.max_voices, 24);
        assert_eq!(settings.tick_rate, 200);

        let setup = settings.studio_setup();
        assert_eq!(setup.channel_mask, ChannelMask::SURROUND_5_1);
        assert_eq!(setup.master_volume, 0.8);
        match setup.aux_a.effect {
            EffectKind::ReverbHi(p) => {
                assert_eq!(p.time, 3.0);
                assert_eq!(p.mix, ReverbParams::default().mix);
            }
            other => panic!("unexpected effect {other:?}"),
        }
        assert_eq!(
            setup.aux_b.effect,
            EffectKind::Delay(DelayParams { delay_ms: 120, ..DelayParams::default() })
        );
        assert_eq!(setup.aux_b.level, 0.3);
    }

    #[test]
    fn out_of_range_values_rejected() {
        assert!(matches!(
            Settings::from_yaml("max_voices: 0"),
            Err(ControllerError::InvalidSetting { name: "max_voices", .. })
        ));
        assert!(Settings::from_yaml("studio:\n  master_volume: 2.0").is_err());
        assert!(Settings::from_yaml("sample_rate: 8000\ntick_rate: 9000").is_err());
    }

    #[test]
    fn unknown_effect_type_is_an_error() {
        let yaml = "studio:\n  aux_a:\n    effect:\n      type: flanger";
        assert!(matches!(Settings::from_yaml(yaml), Err(ControllerError::Config(_))));
    }

    #[test]
    fn engine_config_uses_requested_rate() {
        let settings = Settings { seed: 9, ..Settings::default() };
        let config = settings.engine_config(22050);
        assert_eq!(config.sample_rate, 22050);
        assert_eq!(config.seed, 9);
        assert_eq!(config.max_voices, settings.max_voices);
    }
}
