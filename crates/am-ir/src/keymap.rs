//! Keymaps: one SoundMacro selection per key.

use alloc::vec::Vec;

use crate::ids::SoundMacroId;
use crate::Name;

/// Number of MIDI keys.
pub const KEY_COUNT: usize = 128;

/// What a single key of a keymap plays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeymapEntry {
    pub macro_id: SoundMacroId,
    /// Semitones added to the played key.
    pub transpose: i8,
    /// Initial pan, -64..=63.
    pub pan: i8,
    /// Route to the rear speakers.
    pub surround: bool,
    pub priority_offset: i8,
}

/// A per-key table with an optional fallback entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Keymap {
    pub name: Name,
    /// Always `KEY_COUNT` long.
    keys: Vec<Option<KeymapEntry>>,
    /// Used for keys without their own entry.
    pub default: Option<KeymapEntry>,
}

impl Keymap {
    /// Create an empty keymap.
    pub fn new(name: &str) -> Self {
        Self {
            name: crate::name(name),
            keys: alloc::vec![None; KEY_COUNT],
            default: None,
        }
    }

    /// Create a keymap where every key plays `entry`.
    pub fn with_default(name: &str, entry: KeymapEntry) -> Self {
        let mut keymap = Self::new(name);
        keymap.default = Some(entry);
        keymap
    }

    /// Set the entry for one key. Keys above 127 are ignored.
    pub fn set(&mut self, key: u8, entry: Option<KeymapEntry>) {
        if let Some(slot) = self.keys.get_mut(key as usize) {
            *slot = entry;
        }
    }

    /// The key's own entry, without the fallback.
    pub fn entry(&self, key: u8) -> Option<&KeymapEntry> {
        self.keys.get(key as usize).and_then(|e| e.as_ref())
    }

    /// The key's entry, falling back to the default.
    pub fn lookup(&self, key: u8) -> Option<&KeymapEntry> {
        self.entry(key).or(self.default.as_ref())
    }

    /// All customised keys.
    pub fn entries(&self) -> impl Iterator<Item = (u8, &KeymapEntry)> {
        self.keys
            .iter()
            .enumerate()
            .filter_map(|(k, e)| e.as_ref().map(|e| (k as u8, e)))
    }
}
