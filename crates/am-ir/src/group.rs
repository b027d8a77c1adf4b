//! Song and SFX groups: program tables and MIDI channel setups.

use alloc::vec::Vec;

use crate::error::ConfigError;
use crate::ids::{GroupId, ObjectRef};
use crate::Name;

/// Number of MIDI channels a song setup covers.
pub const MIDI_CHANNELS: usize = 16;

/// Which namespace of a group a trigger addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// Melodic page table of a song group.
    Normal,
    /// Drum page table of a song group.
    Drum,
    /// SFX table of an SFX group.
    Sfx,
}

impl TableKind {
    pub fn name(self) -> &'static str {
        match self {
            TableKind::Normal => "normal pages",
            TableKind::Drum => "drum pages",
            TableKind::Sfx => "sfx table",
        }
    }
}

/// Entries addressable by a program number.
pub trait ProgramEntry: Clone {
    fn program(&self) -> u16;
    fn object(&self) -> ObjectRef;
}

/// One program of a song group's page table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageEntry {
    pub program: u16,
    pub object: ObjectRef,
    pub priority: u8,
    pub max_voices: u8,
}

impl ProgramEntry for PageEntry {
    fn program(&self) -> u16 {
        self.program
    }
    fn object(&self) -> ObjectRef {
        self.object
    }
}

/// One sound effect of an SFX group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SfxEntry {
    pub sfx_id: u16,
    pub object: ObjectRef,
    pub priority: u8,
    pub max_voices: u8,
    pub default_key: u8,
    pub default_velocity: u8,
    pub pan: i8,
}

impl ProgramEntry for SfxEntry {
    fn program(&self) -> u16 {
        self.sfx_id
    }
    fn object(&self) -> ObjectRef {
        self.object
    }
}

/// Program number → entry, sorted for binary search.
///
/// Duplicate program numbers are a configuration error; the first
/// definition is kept.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgramTable<E> {
    entries: Vec<E>,
}

impl<E> Default for ProgramTable<E> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<E: ProgramEntry> ProgramTable<E> {
    /// Build a table, reporting every duplicate program.
    pub fn from_entries(
        group: GroupId,
        kind: TableKind,
        entries: impl IntoIterator<Item = E>,
    ) -> (Self, Vec<ConfigError>) {
        let mut table = Self::default();
        let mut errors = Vec::new();
        for entry in entries {
            if let Err(program) = table.insert(entry) {
                errors.push(ConfigError::DuplicateProgram {
                    group,
                    table: kind.name(),
                    program,
                });
            }
        }
        (table, errors)
    }

    /// Insert an entry, rejecting it if the program is already defined.
    pub fn insert(&mut self, entry: E) -> Result<(), u16> {
        let program = entry.program();
        match self.entries.binary_search_by_key(&program, |e| e.program()) {
            Ok(_) => Err(program),
            Err(pos) => {
                self.entries.insert(pos, entry);
                Ok(())
            }
        }
    }

    /// Replace or add an entry (authoring-side commit).
    pub fn replace(&mut self, entry: E) {
        let program = entry.program();
        match self.entries.binary_search_by_key(&program, |e| e.program()) {
            Ok(pos) => self.entries[pos] = entry,
            Err(pos) => self.entries.insert(pos, entry),
        }
    }

    /// Look up a program.
    pub fn get(&self, program: u16) -> Option<&E> {
        self.entries
            .binary_search_by_key(&program, |e| e.program())
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Entries in program order.
    pub fn entries(&self) -> &[E] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub type PageTable = ProgramTable<PageEntry>;
pub type SfxTable = ProgramTable<SfxEntry>;

/// Channel defaults applied before the first note on a MIDI channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiSetup {
    pub program: u16,
    /// 0..=127
    pub volume: u8,
    /// 0..=127, 64 = centre (MIDI convention).
    pub pan: u8,
    /// Aux A send, 0..=127.
    pub reverb: u8,
    /// Aux B send, 0..=127.
    pub chorus: u8,
}

impl Default for MidiSetup {
    fn default() -> Self {
        Self {
            program: 0,
            volume: 127,
            pan: 64,
            reverb: 0,
            chorus: 0,
        }
    }
}

/// Setups for all sixteen channels of one song.
#[derive(Clone, Debug, PartialEq)]
pub struct SongSetup {
    pub song_id: u16,
    pub channels: [MidiSetup; MIDI_CHANNELS],
}

impl SongSetup {
    pub fn new(song_id: u16) -> Self {
        Self {
            song_id,
            channels: [MidiSetup::default(); MIDI_CHANNELS],
        }
    }
}

/// A song group: melodic and drum page tables plus channel setups.
#[derive(Clone, Debug, PartialEq)]
pub struct SongGroup {
    pub name: Name,
    pub normal: PageTable,
    pub drum: PageTable,
    pub setups: Vec<SongSetup>,
}

impl SongGroup {
    pub fn new(name: &str) -> Self {
        Self {
            name: crate::name(name),
            normal: PageTable::default(),
            drum: PageTable::default(),
            setups: Vec::new(),
        }
    }

    /// Setup for a song id, if any.
    pub fn setup(&self, song_id: u16) -> Option<&SongSetup> {
        self.setups.iter().find(|s| s.song_id == song_id)
    }
}

/// A group of sound effects.
#[derive(Clone, Debug, PartialEq)]
pub struct SfxGroup {
    pub name: Name,
    pub sfx: SfxTable,
}

impl SfxGroup {
    pub fn new(name: &str) -> Self {
        Self {
            name: crate::name(name),
            sfx: SfxTable::default(),
        }
    }
}

/// Either kind of group, as stored in a subproject.
#[derive(Clone, Debug, PartialEq)]
pub enum Group {
    Song(SongGroup),
    Sfx(SfxGroup),
}

impl Group {
    pub fn name(&self) -> &str {
        match self {
            Group::Song(g) => &g.name,
            Group::Sfx(g) => &g.name,
        }
    }

    /// Look up a program in one of the group's namespaces.
    ///
    /// Returns the object, priority and voice cap.
    pub fn lookup(&self, kind: TableKind, program: u16) -> Option<(ObjectRef, u8, u8)> {
        match (self, kind) {
            (Group::Song(g), TableKind::Normal) => g.normal.get(program).map(|e| (e.object, e.priority, e.max_voices)),
            (Group::Song(g), TableKind::Drum) => g.drum.get(program).map(|e| (e.object, e.priority, e.max_voices)),
            (Group::Sfx(g), TableKind::Sfx) => g.sfx.get(program).map(|e| (e.object, e.priority, e.max_voices)),
            _ => None,
        }
    }

    /// Every object referenced by the group's tables.
    pub fn objects(&self) -> Vec<ObjectRef> {
        match self {
            Group::Song(g) => g
                .normal
                .entries()
                .iter()
                .chain(g.drum.entries())
                .map(|e| e.object)
                .collect(),
            Group::Sfx(g) => g.sfx.entries().iter().map(|e| e.object).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SoundMacroId;

    fn page(program: u16, macro_id: u16) -> PageEntry {
        PageEntry {
            program,
            object: ObjectRef::SoundMacro(SoundMacroId(macro_id)),
            priority: 64,
            max_voices: 8,
        }
    }

    #[test]
    fn duplicate_program_reports_and_keeps_first() {
        let (table, errors) = PageTable::from_entries(
            GroupId(0),
            TableKind::Normal,
            [page(3, 1), page(5, 2), page(3, 9)],
        );
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ConfigError::DuplicateProgram { program: 3, .. }));
        assert_eq!(table.get(3).unwrap().object, ObjectRef::SoundMacro(SoundMacroId(1)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn lookup_is_idempotent() {
        let (table, _) = PageTable::from_entries(GroupId(0), TableKind::Normal, [page(7, 4)]);
        let first = *table.get(7).unwrap();
        for _ in 0..10 {
            assert_eq!(*table.get(7).unwrap(), first);
        }
        assert!(table.get(8).is_none());
    }

    #[test]
    fn replace_overwrites_existing() {
        let mut table = PageTable::default();
        table.replace(page(1, 1));
        table.replace(page(1, 2));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(1).unwrap().object, ObjectRef::SoundMacro(SoundMacroId(2)));
    }

    #[test]
    fn normal_and_drum_are_separate_namespaces() {
        let mut song = SongGroup::new("s");
        song.normal.replace(page(0, 1));
        song.drum.replace(page(0, 2));
        let group = Group::Song(song);
        assert_eq!(group.lookup(TableKind::Normal, 0).unwrap().0, ObjectRef::SoundMacro(SoundMacroId(1)));
        assert_eq!(group.lookup(TableKind::Drum, 0).unwrap().0, ObjectRef::SoundMacro(SoundMacroId(2)));
        assert!(group.lookup(TableKind::Sfx, 0).is_none());
    }
}
