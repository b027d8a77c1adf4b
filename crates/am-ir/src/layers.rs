//! Layers: key-range tables where several entries may sound at once.

use alloc::vec::Vec;

use crate::ids::SoundMacroId;
use crate::Name;

/// One layer of a layered patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerEntry {
    pub macro_id: SoundMacroId,
    /// Lowest key, inclusive.
    pub key_lo: u8,
    /// Highest key, inclusive.
    pub key_hi: u8,
    pub transpose: i8,
    /// Layer volume, 0..=127.
    pub volume: u8,
    pub priority_offset: i8,
    /// Pan, -64..=63.
    pub pan: i8,
    /// Front/rear placement, -64 (front) ..= 63 (rear).
    pub span: i8,
}

impl LayerEntry {
    /// A full-volume, centred layer over `key_lo..=key_hi`.
    pub fn new(macro_id: SoundMacroId, key_lo: u8, key_hi: u8) -> Self {
        Self {
            macro_id,
            key_lo,
            key_hi,
            transpose: 0,
            volume: 127,
            priority_offset: 0,
            pan: 0,
            span: -64,
        }
    }

    /// Whether `note` is inside this layer's key range.
    pub fn contains(&self, note: u8) -> bool {
        (self.key_lo..=self.key_hi).contains(&note)
    }
}

/// A set of possibly overlapping layers.
#[derive(Clone, Debug, PartialEq)]
pub struct Layers {
    pub name: Name,
    pub entries: Vec<LayerEntry>,
}

impl Layers {
    pub fn new(name: &str, entries: Vec<LayerEntry>) -> Self {
        Self {
            name: crate::name(name),
            entries,
        }
    }

    /// Every layer whose range contains `note`, in authoring order.
    pub fn matching(&self, note: u8) -> impl Iterator<Item = &LayerEntry> {
        self.entries.iter().filter(move |e| e.contains(note))
    }
}
