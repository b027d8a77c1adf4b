//! Data model for the amuse SoundMacro runtime.
//!
//! Everything an authoring tool edits and the engine plays lives here:
//! SoundMacros, ADSRs, curves, keymaps, layers, song/SFX groups, samples
//! and the studio setup, grouped into subprojects.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod adsr;
mod audio_buffer;
mod curve;
mod error;
mod event;
mod group;
mod ids;
mod keymap;
mod layers;
mod project;
mod sample;
mod sound_macro;
mod studio;

pub use adsr::Adsr;
pub use audio_buffer::{AudioBuffer, BLOCK_SIZE, MAX_CHANNELS};
pub use curve::{BinaryOp, Curve, CurveData, CurveExpr, Function};
pub use error::{ConfigError, ObjectKind};
pub use event::{Event, EventPayload, TriggerTable};
pub use group::{
    Group, MidiSetup, PageEntry, PageTable, ProgramEntry, ProgramTable, SfxEntry, SfxGroup,
    SfxTable, SongGroup, SongSetup, TableKind, MIDI_CHANNELS,
};
pub use ids::{
    AdsrId, CurveId, GroupId, KeymapId, LayersId, ObjectId, ObjectRef, SampleId, SoundMacroId,
};
pub use keymap::{Keymap, KeymapEntry, KEY_COUNT};
pub use layers::{LayerEntry, Layers};
pub use project::{Named, ObjectTable, Project, Subproject};
pub use sample::{Sample, SampleData, FRAC_BITS};
pub use sound_macro::{Command, CommandCategory, LoopMode, MacroTarget, SoundMacro, MACRO_VARS};
pub use studio::{
    AudioChannel, AuxSetup, ChannelMask, ChorusParams, DelayParams, EffectKind, ReverbParams,
    StudioSetup,
};

/// Fixed-capacity object name.
pub type Name = arrayvec::ArrayString<32>;

/// Build a [`Name`], truncating at the capacity on a char boundary.
pub fn name(s: &str) -> Name {
    let mut out = Name::new();
    for c in s.chars() {
        if out.try_push(c).is_err() {
            break;
        }
    }
    out
}
