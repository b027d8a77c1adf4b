//! Keymap/Layers resolution: what a note on an object actually plays.

use am_ir::{ObjectRef, SoundMacroId, Subproject};
use arrayvec::ArrayVec;

/// Most layers a single trigger can sound.
pub const MAX_LAYERS: usize = 16;

/// One SoundMacro selection with its per-entry parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolved {
    pub macro_id: SoundMacroId,
    /// Semitones added to the played note.
    pub transpose: i8,
    /// -64..=63
    pub pan: i8,
    pub priority_offset: i8,
    /// 0..=127
    pub volume: u8,
    /// -64 (front) ..= 63 (rear)
    pub span: i8,
    pub velocity: u8,
}

impl Resolved {
    fn direct(macro_id: SoundMacroId, velocity: u8) -> Self {
        Self {
            macro_id,
            transpose: 0,
            pan: 0,
            priority_offset: 0,
            volume: 127,
            span: -64,
            velocity,
        }
    }
}

/// Resolve `object` for `note`.
///
/// An empty result means nothing plays; it is not an error. Layers beyond
/// [`MAX_LAYERS`] are ignored.
pub fn resolve(
    subproject: &Subproject,
    object: ObjectRef,
    note: u8,
    velocity: u8,
) -> ArrayVec<Resolved, MAX_LAYERS> {
    let mut out = ArrayVec::new();
    match object {
        ObjectRef::SoundMacro(id) => out.push(Resolved::direct(id, velocity)),
        ObjectRef::Keymap(id) => {
            if let Some(entry) = subproject.keymap(id).and_then(|k| k.lookup(note)) {
                out.push(Resolved {
                    macro_id: entry.macro_id,
                    transpose: entry.transpose,
                    pan: entry.pan,
                    priority_offset: entry.priority_offset,
                    volume: 127,
                    span: if entry.surround { 63 } else { -64 },
                    velocity,
                });
            }
        }
        ObjectRef::Layers(id) => {
            let Some(layers) = subproject.layer_set(id) else {
                return out;
            };
            for entry in layers.matching(note) {
                let resolved = Resolved {
                    macro_id: entry.macro_id,
                    transpose: entry.transpose,
                    pan: entry.pan,
                    priority_offset: entry.priority_offset,
                    volume: entry.volume,
                    span: entry.span,
                    velocity,
                };
                if out.try_push(resolved).is_err() {
                    tracing::debug!(%object, note, "layer limit reached");
                    break;
                }
            }
        }
    }
    if out.is_empty() {
        tracing::debug!(%object, note, "no entry for note");
    }
    out
}
