//! Configuration errors detected when loading or validating a subproject.
//!
//! None of these are fatal to playback: the runtime substitutes a safe
//! default or drops the affected trigger.

use alloc::string::String;

use crate::ids::{CurveId, GroupId};

/// The kind of object a missing reference points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    SoundMacro,
    Adsr,
    Curve,
    Keymap,
    Layers,
    Sample,
    Group,
}

impl core::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            ObjectKind::SoundMacro => "SoundMacro",
            ObjectKind::Adsr => "ADSR",
            ObjectKind::Curve => "curve",
            ObjectKind::Keymap => "keymap",
            ObjectKind::Layers => "layers",
            ObjectKind::Sample => "sample",
            ObjectKind::Group => "group",
        };
        f.write_str(name)
    }
}

/// A configuration problem in authored data.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("program {program} defined more than once in {table} of {group} (first definition wins)")]
    DuplicateProgram {
        group: GroupId,
        table: &'static str,
        program: u16,
    },
    #[error("{kind} name '{name}' already used in this subproject")]
    NameConflict { kind: ObjectKind, name: String },
    #[error("{owner} references missing {kind} #{index}")]
    MissingReference {
        owner: String,
        kind: ObjectKind,
        index: u16,
    },
    #[error("curve {curve}: {message}")]
    MalformedCurve { curve: CurveId, message: String },
    #[error("{owner}: key range {lo}..={hi} is inverted")]
    InvertedKeyRange { owner: String, lo: u8, hi: u8 },
}
