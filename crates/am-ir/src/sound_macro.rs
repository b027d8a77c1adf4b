//! SoundMacro instruction sequences.
//!
//! A SoundMacro is a small program that drives one voice over its lifetime:
//! which sample to play, how its pitch and volume move, when it waits for
//! the key to be released and when it ends. Commands are grouped into the
//! six categories the authoring tool presents.

use alloc::vec::Vec;

use crate::ids::{AdsrId, CurveId, SampleId, SoundMacroId};
use crate::Name;

/// Number of per-voice macro variables.
pub const MACRO_VARS: usize = 16;

/// A named sequence of commands.
#[derive(Clone, Debug, PartialEq)]
pub struct SoundMacro {
    pub name: Name,
    pub commands: Vec<Command>,
}

impl SoundMacro {
    /// Create a macro from a command list.
    pub fn new(name: &str, commands: Vec<Command>) -> Self {
        Self {
            name: crate::name(name),
            commands,
        }
    }

    /// Command at `step`, or `None` past the end.
    pub fn get(&self, step: u16) -> Option<&Command> {
        self.commands.get(step as usize)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Jump destination. `macro_id: None` stays in the running macro.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MacroTarget {
    pub macro_id: Option<SoundMacroId>,
    pub step: u16,
}

impl MacroTarget {
    /// A step within the running macro.
    pub const fn local(step: u16) -> Self {
        Self { macro_id: None, step }
    }

    /// A step in another macro.
    pub const fn remote(macro_id: SoundMacroId, step: u16) -> Self {
        Self { macro_id: Some(macro_id), step }
    }
}

/// Sample loop behaviour selected by `StartSample`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopMode {
    /// Play once; key-off has no effect on the sample.
    #[default]
    NoLoop,
    /// Loop forever (until the voice is released and silent).
    Loop,
    /// Loop until key-off, then play through to the end.
    LoopRelease,
    /// Loop until key-off, then leave the loop and let the ADSR release fade it.
    LoopSoftRelease,
    /// Like `LoopSoftRelease`, but finishes the current loop pass first.
    LoopSoftReleaseNoClick,
    /// Loop for as long as the ADSR is not idle.
    LoopAdsrGated,
    /// Loop until the sample is explicitly stopped.
    LoopHold,
    /// Play once and ignore key-off entirely (voice ends with the sample).
    OneShot,
    /// One-shot at the sample's root pitch.
    OneShotFixedNote,
    /// No loop, root pitch regardless of key.
    FixedNote,
    /// Loop at the root pitch regardless of key.
    LoopFixedNote,
}

impl LoopMode {
    /// Whether the sample loop region is used at all.
    pub fn loops(self) -> bool {
        matches!(
            self,
            LoopMode::Loop
                | LoopMode::LoopRelease
                | LoopMode::LoopSoftRelease
                | LoopMode::LoopSoftReleaseNoClick
                | LoopMode::LoopAdsrGated
                | LoopMode::LoopHold
                | LoopMode::LoopFixedNote
        )
    }

    /// Whether key-off makes the playback cursor leave the loop.
    pub fn exits_loop_on_release(self) -> bool {
        matches!(
            self,
            LoopMode::LoopRelease | LoopMode::LoopSoftRelease | LoopMode::LoopSoftReleaseNoClick
        )
    }

    /// Whether the pitch ignores the played key.
    pub fn fixed_note(self) -> bool {
        matches!(
            self,
            LoopMode::OneShotFixedNote | LoopMode::FixedNote | LoopMode::LoopFixedNote
        )
    }

    /// Whether key-off is ignored by the sample.
    pub fn one_shot(self) -> bool {
        matches!(self, LoopMode::OneShot | LoopMode::OneShotFixedNote)
    }

    pub fn to_raw(self) -> u8 {
        self as u8
    }

    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => LoopMode::NoLoop,
            1 => LoopMode::Loop,
            2 => LoopMode::LoopRelease,
            3 => LoopMode::LoopSoftRelease,
            4 => LoopMode::LoopSoftReleaseNoClick,
            5 => LoopMode::LoopAdsrGated,
            6 => LoopMode::LoopHold,
            7 => LoopMode::OneShot,
            8 => LoopMode::OneShotFixedNote,
            9 => LoopMode::FixedNote,
            10 => LoopMode::LoopFixedNote,
            _ => return None,
        })
    }
}

/// Command grouping used by the authoring tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandCategory {
    Control,
    Pitch,
    Sample,
    Setup,
    Special,
    Volume,
}

/// One SoundMacro instruction.
///
/// Pans are -64 (left) ..= 63 (right); volumes and sends are 0 ..= 127.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    // === Control ===
    /// End the macro; the voice keeps sounding until released and silent.
    End,
    /// Stop the voice immediately (forces release).
    Stop,
    /// Jump when the played key is >= `key`.
    SplitKey { key: u8, target: MacroTarget },
    /// Jump when the velocity is >= `velocity`.
    SplitVel { velocity: u8, target: MacroTarget },
    /// Jump when a random byte is < `threshold`.
    SplitRnd { threshold: u8, target: MacroTarget },
    /// Wait for a number of control ticks.
    WaitTicks {
        ticks: u16,
        key_off: bool,
        sample_end: bool,
        random: bool,
    },
    /// Wait for a number of milliseconds.
    WaitMs {
        ms: u16,
        key_off: bool,
        sample_end: bool,
        random: bool,
    },
    /// Jump back to `step` `times` times (0 = forever).
    Loop {
        step: u16,
        times: u16,
        key_off: bool,
        sample_end: bool,
    },
    Goto { target: MacroTarget },
    /// Call a sub-macro on this voice's frame stack.
    GoSub { target: MacroTarget },
    Return,
    /// Redirect execution to `target` when the key is released.
    TrapKeyOff { target: MacroTarget },
    UntrapKeyOff,

    // === Pitch ===
    SetNote { key: u8, cents: i8 },
    AddNote { add: i8, cents: i8 },
    /// Offset the note by a random amount in `lo..=hi` semitones.
    RndNote { lo: i8, hi: i8 },
    /// Glide time for subsequent note changes (0 disables).
    Portamento { ms: u16 },
    Vibrato { semitones: u8, cents: u8, period_ms: u16 },
    /// Add `cents` to the pitch linearly over `ticks`.
    PitchSweep { cents: i16, ticks: u16 },
    SetPitchAdsr { adsr: AdsrId, semitones: i8 },
    PitchWheelRange { up: u8, down: u8 },

    // === Sample ===
    StartSample { sample: SampleId, mode: LoopMode, offset: u32 },
    StopSample,
    /// Release this voice as if its key had been lifted.
    KeyOff,

    // === Volume ===
    SetAdsr { adsr: AdsrId },
    /// Volume from velocity: `curve(vel) * scale/127 + add/127`.
    ScaleVolume { scale: u8, add: i8, curve: Option<CurveId> },
    /// Ramp the macro volume to `target` over `ms`.
    Envelope { target: u8, ms: u16, curve: Option<CurveId> },
    /// Ramp from silence up to the current macro volume.
    FadeIn { ms: u16, curve: Option<CurveId> },
    SetupTremolo { depth: u8, period_ms: u16 },

    // === Setup ===
    Panning { pan: i8, ms: u16 },
    /// Pan from key distance to `center_key`, `scale` in pan units per 8 keys.
    PianoPan { scale: i8, center_key: u8, center_pan: i8 },
    Spanning { span: i8, ms: u16 },
    AuxSends { a: u8, b: u8 },
    SetPriority { priority: u8 },
    AddPriority { add: i8 },

    // === Special / structure ===
    /// Spawn a dependent child voice running `target`.
    PlayMacro {
        add_note: i8,
        target: MacroTarget,
        priority_offset: i8,
    },
    /// Release every child voice spawned by this voice.
    SendKeyOff,
    SetVar { var: u8, value: i16 },
    /// `vars[dst] = vars[a] + vars[b]`
    AddVar { dst: u8, a: u8, b: u8 },
    IfEqual { a: u8, b: u8, target: MacroTarget },
    IfLess { a: u8, b: u8, target: MacroTarget },
}

impl Command {
    /// Category this command belongs to.
    pub fn category(&self) -> CommandCategory {
        use Command::*;
        match self {
            End | Stop | SplitKey { .. } | SplitVel { .. } | SplitRnd { .. } | WaitTicks { .. }
            | WaitMs { .. } | Loop { .. } | Goto { .. } | GoSub { .. } | Return
            | TrapKeyOff { .. } | UntrapKeyOff => CommandCategory::Control,
            SetNote { .. } | AddNote { .. } | RndNote { .. } | Portamento { .. }
            | Vibrato { .. } | PitchSweep { .. } | SetPitchAdsr { .. }
            | PitchWheelRange { .. } => CommandCategory::Pitch,
            StartSample { .. } | StopSample | KeyOff => CommandCategory::Sample,
            SetAdsr { .. } | ScaleVolume { .. } | Envelope { .. } | FadeIn { .. }
            | SetupTremolo { .. } => CommandCategory::Volume,
            Panning { .. } | PianoPan { .. } | Spanning { .. } | AuxSends { .. }
            | SetPriority { .. } | AddPriority { .. } => CommandCategory::Setup,
            PlayMacro { .. } | SendKeyOff | SetVar { .. } | AddVar { .. } | IfEqual { .. }
            | IfLess { .. } => CommandCategory::Special,
        }
    }

    /// Jump target carried by this command, if any.
    pub fn target(&self) -> Option<MacroTarget> {
        use Command::*;
        match *self {
            SplitKey { target, .. }
            | SplitVel { target, .. }
            | SplitRnd { target, .. }
            | Goto { target }
            | GoSub { target }
            | TrapKeyOff { target }
            | PlayMacro { target, .. }
            | IfEqual { target, .. }
            | IfLess { target, .. } => Some(target),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn categories_group_commands() {
        assert_eq!(Command::End.category(), CommandCategory::Control);
        assert_eq!(Command::SetNote { key: 60, cents: 0 }.category(), CommandCategory::Pitch);
        assert_eq!(Command::StopSample.category(), CommandCategory::Sample);
        assert_eq!(Command::SetAdsr { adsr: AdsrId(0) }.category(), CommandCategory::Volume);
        assert_eq!(Command::AuxSends { a: 0, b: 0 }.category(), CommandCategory::Setup);
        assert_eq!(Command::SendKeyOff.category(), CommandCategory::Special);
    }

    #[test]
    fn target_reports_jump_destination() {
        let t = MacroTarget::remote(SoundMacroId(2), 5);
        assert_eq!(Command::GoSub { target: t }.target(), Some(t));
        assert_eq!(Command::Return.target(), None);
    }

    #[test]
    fn loop_mode_raw_values_are_stable() {
        for raw in 0..=10u8 {
            let mode = LoopMode::from_raw(raw).unwrap();
            assert_eq!(mode.to_raw(), raw);
        }
        assert!(LoopMode::from_raw(11).is_none());
    }

    #[test]
    fn loop_mode_flags() {
        assert!(LoopMode::LoopRelease.loops());
        assert!(LoopMode::LoopRelease.exits_loop_on_release());
        assert!(!LoopMode::LoopHold.exits_loop_on_release());
        assert!(LoopMode::OneShotFixedNote.one_shot());
        assert!(LoopMode::OneShotFixedNote.fixed_note());
        assert!(!LoopMode::NoLoop.loops());
    }

    #[test]
    fn get_past_end_is_none() {
        let m = SoundMacro::new("m", vec![Command::End]);
        assert!(m.get(0).is_some());
        assert!(m.get(1).is_none());
        assert_eq!(m.len(), 1);
    }
}
