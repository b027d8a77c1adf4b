//! Tick-ordered queue for scheduled events.

use alloc::vec::Vec;
use am_ir::Event;

/// Events sorted by tick.
///
/// Playback consumes events through a cursor that moves forward without
/// removing elements, so the drain path never allocates. Events at the
/// same tick keep their insertion order.
#[derive(Clone, Debug, Default)]
pub struct EventQueue {
    events: Vec<Event>,
    cursor: usize,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            cursor: 0,
        }
    }

    /// Pre-allocate room for `additional` events.
    pub fn reserve(&mut self, additional: usize) {
        self.events.reserve(additional);
    }

    /// Insert an event. Events behind the cursor are never replayed.
    pub fn push(&mut self, event: Event) {
        let pos = self.events.partition_point(|e| e.tick <= event.tick);
        let pos = pos.max(self.cursor);
        self.events.insert(pos, event);
    }

    /// Index range of pending events with `tick <= tick`, advancing the cursor.
    pub fn drain_until(&mut self, tick: u64) -> core::ops::Range<usize> {
        let start = self.cursor;
        while self.cursor < self.events.len() && self.events[self.cursor].tick <= tick {
            self.cursor += 1;
        }
        start..self.cursor
    }

    /// Event by index, for use with `drain_until` ranges.
    pub fn get(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    /// Drop consumed events (setup phase only; moves memory).
    pub fn compact(&mut self) {
        self.events.drain(..self.cursor);
        self.cursor = 0;
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.cursor = 0;
    }

    /// Events not yet consumed.
    pub fn pending(&self) -> usize {
        self.events.len() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}
