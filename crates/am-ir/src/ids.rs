//! Object identifiers within a subproject.
//!
//! Every authored object is addressed by a small per-kind index into the
//! owning [`Subproject`](crate::Subproject)'s table. Voices and references
//! hold these ids, never copies of the objects themselves.

use core::fmt;

/// Common behaviour of the per-kind ids.
pub trait ObjectId: Copy + Eq + fmt::Display {
    fn from_index(index: usize) -> Self;
    fn index(self) -> usize;
}

macro_rules! object_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u16);

        impl $name {
            /// Index into the owning table.
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl ObjectId for $name {
            fn from_index(index: usize) -> Self {
                $name(index as u16)
            }
            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

object_id!(
    /// Index of a SoundMacro.
    SoundMacroId, "macro"
);
object_id!(
    /// Index of an ADSR definition.
    AdsrId, "adsr"
);
object_id!(
    /// Index of a curve.
    CurveId, "curve"
);
object_id!(
    /// Index of a keymap.
    KeymapId, "keymap"
);
object_id!(
    /// Index of a layers table.
    LayersId, "layers"
);
object_id!(
    /// Index of a sample.
    SampleId, "sample"
);
object_id!(
    /// Index of a song or SFX group.
    GroupId, "group"
);

/// A playable object referenced from a page or SFX entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectRef {
    SoundMacro(SoundMacroId),
    Keymap(KeymapId),
    Layers(LayersId),
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectRef::SoundMacro(id) => id.fmt(f),
            ObjectRef::Keymap(id) => id.fmt(f),
            ObjectRef::Layers(id) => id.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn display_includes_kind_prefix() {
        assert_eq!(SoundMacroId(3).to_string(), "macro#3");
        assert_eq!(ObjectRef::Layers(LayersId(1)).to_string(), "layers#1");
    }

    #[test]
    fn index_matches_raw_value() {
        assert_eq!(SampleId(42).index(), 42);
    }
}
