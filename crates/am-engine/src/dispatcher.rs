//! Song/SFX group dispatch: from a trigger to the voices it should start.

use am_ir::{Group, MidiSetup, Subproject, TableKind, TriggerTable, MIDI_CHANNELS};
use arrayvec::ArrayVec;

use crate::resolver::{resolve, Resolved, MAX_LAYERS};
use crate::voice::PoolId;

/// Per-MIDI-channel mix defaults.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelState {
    configured: bool,
    /// 0..=1
    pub volume: f32,
    /// -64..=63
    pub pan: i8,
    pub aux_a: f32,
    pub aux_b: f32,
    /// Pitch wheel, -1..=1.
    pub wheel: f32,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            configured: false,
            volume: 1.0,
            pan: 0,
            aux_a: 0.0,
            aux_b: 0.0,
            wheel: 0.0,
        }
    }
}

impl ChannelState {
    fn configure(&mut self, setup: &MidiSetup) {
        self.configured = true;
        self.volume = setup.volume.min(127) as f32 / 127.0;
        self.pan = (setup.pan.min(127) as i16 - 64) as i8;
        self.aux_a = setup.reverb.min(127) as f32 / 127.0;
        self.aux_b = setup.chorus.min(127) as f32 / 127.0;
    }
}

/// Everything the engine needs to start the voices of one trigger.
#[derive(Clone, Debug)]
pub struct TriggerPlan {
    pub pool: PoolId,
    pub priority: u8,
    pub max_voices: u8,
    /// Pan offset from the channel or SFX entry.
    pub pan: i8,
    pub volume: f32,
    pub aux_a: f32,
    pub aux_b: f32,
    pub layers: ArrayVec<Resolved, MAX_LAYERS>,
}

impl TriggerPlan {
    /// Final priority of one layer.
    pub fn layer_priority(&self, layer: &Resolved) -> u8 {
        (self.priority as i16 + layer.priority_offset as i16).clamp(0, 127) as u8
    }
}

/// Tracks channel setups for the active song.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    song_id: u16,
    channels: [ChannelState; MIDI_CHANNELS],
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            song_id: 0,
            channels: [ChannelState::default(); MIDI_CHANNELS],
        }
    }

    pub fn song_id(&self) -> u16 {
        self.song_id
    }

    /// Switch to another song's MIDI setups. Channels pick up the new
    /// defaults on their next trigger.
    pub fn select_song(&mut self, song_id: u16) {
        self.song_id = song_id;
        for ch in &mut self.channels {
            let wheel = ch.wheel;
            *ch = ChannelState { wheel, ..ChannelState::default() };
        }
    }

    pub fn channel(&self, channel: u8) -> &ChannelState {
        &self.channels[channel as usize % MIDI_CHANNELS]
    }

    pub fn set_pitch_wheel(&mut self, channel: u8, value: f32) {
        self.channels[channel as usize % MIDI_CHANNELS].wheel = value.clamp(-1.0, 1.0);
    }

    /// Look up and resolve a trigger. `None` when the group, program or
    /// note maps to nothing; these are dropped, not errors.
    pub fn plan(
        &mut self,
        subproject: &Subproject,
        table: TriggerTable,
        program: u16,
        note: u8,
        velocity: u8,
        channel: u8,
    ) -> Option<TriggerPlan> {
        let Some(group) = subproject.group(table.group) else {
            tracing::debug!(group = %table.group, "trigger for unknown group dropped");
            return None;
        };
        let Some((object, priority, max_voices)) = group.lookup(table.kind, program) else {
            tracing::debug!(group = %table.group, kind = table.kind.name(), program, "program not found");
            return None;
        };

        let (pan, volume, aux_a, aux_b) = match group {
            Group::Song(song) => {
                let state = &mut self.channels[channel as usize % MIDI_CHANNELS];
                if !state.configured {
                    let setup = song
                        .setup(self.song_id)
                        .map(|s| s.channels[channel as usize % MIDI_CHANNELS])
                        .unwrap_or_default();
                    state.configure(&setup);
                }
                (state.pan, state.volume, state.aux_a, state.aux_b)
            }
            Group::Sfx(sfx) => {
                let pan = sfx.sfx.get(program).map_or(0, |e| e.pan);
                (pan, 1.0, 0.0, 0.0)
            }
        };

        let layers = resolve(subproject, object, note, velocity);
        if layers.is_empty() {
            return None;
        }
        Some(TriggerPlan {
            pool: PoolId {
                group: table.group,
                kind: table.kind,
                program,
            },
            priority: priority.min(127),
            max_voices,
            pan,
            volume,
            aux_a,
            aux_b,
            layers,
        })
    }

    /// Default key and velocity of an SFX entry.
    pub fn sfx_defaults(subproject: &Subproject, table: TriggerTable, sfx_id: u16) -> Option<(u8, u8)> {
        if table.kind != TableKind::Sfx {
            return None;
        }
        match subproject.group(table.group)? {
            Group::Sfx(g) => g.sfx.get(sfx_id).map(|e| (e.default_key, e.default_velocity)),
            Group::Song(_) => None,
        }
    }
}
