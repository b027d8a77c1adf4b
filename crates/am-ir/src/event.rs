//! Time-stamped trigger events.

use crate::group::TableKind;
use crate::ids::GroupId;
use crate::studio::StudioSetup;

/// The namespace a trigger is looked up in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TriggerTable {
    pub group: GroupId,
    pub kind: TableKind,
}

impl TriggerTable {
    pub const fn normal(group: GroupId) -> Self {
        Self { group, kind: TableKind::Normal }
    }

    pub const fn drum(group: GroupId) -> Self {
        Self { group, kind: TableKind::Drum }
    }

    pub const fn sfx(group: GroupId) -> Self {
        Self { group, kind: TableKind::Sfx }
    }
}

/// An event applied at a control-tick boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Control tick at which the event fires.
    pub tick: u64,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(tick: u64, payload: EventPayload) -> Self {
        Self { tick, payload }
    }
}

/// What an event does.
#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    NoteOn {
        table: TriggerTable,
        program: u16,
        note: u8,
        velocity: u8,
        channel: u8,
    },
    /// Release every voice started by (channel, note).
    NoteOff { channel: u8, note: u8 },
    AllNotesOff,
    SetStudio(StudioSetup),
}
