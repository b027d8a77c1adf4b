//! Studio setup: speaker layout, aux effect selection and master volume.

/// Speaker positions, in channel-buffer order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioChannel {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
    FrontCenter,
    Lfe,
    SideLeft,
    SideRight,
}

impl AudioChannel {
    pub const ALL: [AudioChannel; 8] = [
        AudioChannel::FrontLeft,
        AudioChannel::FrontRight,
        AudioChannel::RearLeft,
        AudioChannel::RearRight,
        AudioChannel::FrontCenter,
        AudioChannel::Lfe,
        AudioChannel::SideLeft,
        AudioChannel::SideRight,
    ];

    pub const fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Set of active speaker positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelMask(pub u8);

impl ChannelMask {
    pub const STEREO: ChannelMask = ChannelMask(0b0000_0011);
    pub const QUAD: ChannelMask = ChannelMask(0b0000_1111);
    pub const SURROUND_5_1: ChannelMask = ChannelMask(0b0011_1111);
    pub const SURROUND_7_1: ChannelMask = ChannelMask(0xFF);

    pub fn contains(self, channel: AudioChannel) -> bool {
        self.0 & channel.bit() != 0
    }

    /// Active channels in buffer order.
    pub fn channels(self) -> impl Iterator<Item = AudioChannel> {
        AudioChannel::ALL.into_iter().filter(move |c| self.contains(*c))
    }

    /// Number of active channels.
    pub fn count(self) -> u16 {
        self.0.count_ones() as u16
    }

    /// Position of `channel` within the packed output frame.
    pub fn slot(self, channel: AudioChannel) -> Option<u16> {
        self.channels().position(|c| c == channel).map(|p| p as u16)
    }
}

impl Default for ChannelMask {
    fn default() -> Self {
        ChannelMask::STEREO
    }
}

/// Effect placed on an aux bus.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum EffectKind {
    #[default]
    None,
    ReverbStd(ReverbParams),
    ReverbHi(ReverbParams),
    Delay(DelayParams),
    Chorus(ChorusParams),
}

impl EffectKind {
    /// Discriminant shared by every parameterisation of the same effect.
    pub fn tag(&self) -> u8 {
        match self {
            EffectKind::None => 0,
            EffectKind::ReverbStd(_) => 1,
            EffectKind::ReverbHi(_) => 2,
            EffectKind::Delay(_) => 3,
            EffectKind::Chorus(_) => 4,
        }
    }
}

/// Reverb parameters (standard and high quality).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReverbParams {
    /// 0.0..=1.0, surface character of the room.
    pub coloration: f32,
    /// 0.0..=1.0, dry/wet mix.
    pub mix: f32,
    /// 0.01..=10.0 seconds of reflection decay.
    pub time: f32,
    /// 0.0..=1.0, low-pass damping of reflections.
    pub damping: f32,
    /// 0.0..=0.1 seconds before the first reflection.
    pub pre_delay: f32,
    /// 0.0..=1.0, left/right crosstalk (high-quality reverb only).
    pub crosstalk: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            coloration: 0.5,
            mix: 0.5,
            time: 1.5,
            damping: 0.5,
            pre_delay: 0.01,
            crosstalk: 0.0,
        }
    }
}

/// Delay parameters, applied to every channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelayParams {
    /// 10..=5000 ms
    pub delay_ms: u32,
    /// 0..=100 percent
    pub feedback: u32,
    /// 0..=100 percent
    pub output: u32,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            delay_ms: 250,
            feedback: 40,
            output: 100,
        }
    }
}

/// Chorus parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChorusParams {
    /// 5..=15 ms
    pub base_delay_ms: u32,
    /// 0..=5 ms
    pub variation_ms: u32,
    /// 500..=10000 ms
    pub period_ms: u32,
}

impl Default for ChorusParams {
    fn default() -> Self {
        Self {
            base_delay_ms: 10,
            variation_ms: 2,
            period_ms: 1000,
        }
    }
}

/// One aux bus: effect and return level.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AuxSetup {
    pub effect: EffectKind,
    /// 0.0..=1.0
    pub level: f32,
}

/// Process-wide mixing configuration of one studio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StudioSetup {
    pub aux_a: AuxSetup,
    pub aux_b: AuxSetup,
    /// 0.0..=1.0
    pub master_volume: f32,
    pub channel_mask: ChannelMask,
}

impl Default for StudioSetup {
    fn default() -> Self {
        Self {
            aux_a: AuxSetup::default(),
            aux_b: AuxSetup::default(),
            master_volume: 1.0,
            channel_mask: ChannelMask::STEREO,
        }
    }
}
