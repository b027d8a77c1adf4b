//! Subprojects: the namespaces that own every authored object.
//!
//! A subproject holds one table per object kind. Objects reference each
//! other by id within the same subproject only; a [`Project`] is just a
//! list of independent subprojects, so names may repeat across them.
//!
//! Editing is whole-entity: an authoring tool replaces an object and then
//! calls [`Subproject::validate`] to collect every configuration problem.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::marker::PhantomData;

use crate::adsr::Adsr;
use crate::curve::Curve;
use crate::error::{ConfigError, ObjectKind};
use crate::group::Group;
use crate::ids::{
    AdsrId, CurveId, GroupId, KeymapId, LayersId, ObjectId, ObjectRef, SampleId, SoundMacroId,
};
use crate::keymap::Keymap;
use crate::layers::Layers;
use crate::sample::Sample;
use crate::sound_macro::{Command, SoundMacro};
use crate::Name;

/// Objects stored in a subproject table.
pub trait Named {
    fn name(&self) -> &str;
}

macro_rules! impl_named {
    ($($ty:ty),*) => {
        $(impl Named for $ty {
            fn name(&self) -> &str {
                &self.name
            }
        })*
    };
}

impl_named!(SoundMacro, Adsr, Curve, Keymap, Layers, Sample);

impl Named for Group {
    fn name(&self) -> &str {
        Group::name(self)
    }
}

/// An id-indexed table of one object kind.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectTable<I, T> {
    items: Vec<T>,
    _id: PhantomData<I>,
}

impl<I, T> Default for ObjectTable<I, T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            _id: PhantomData,
        }
    }
}

impl<I: ObjectId, T: Named> ObjectTable<I, T> {
    /// Append an object and return its id.
    pub fn push(&mut self, item: T) -> I {
        self.items.push(item);
        I::from_index(self.items.len() - 1)
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.items.get(id.index())
    }

    /// Replace an existing object, returning the previous version.
    pub fn replace(&mut self, id: I, item: T) -> Option<T> {
        self.items
            .get_mut(id.index())
            .map(|slot| core::mem::replace(slot, item))
    }

    /// First object with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<I> {
        self.items
            .iter()
            .position(|item| item.name() == name)
            .map(I::from_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (I::from_index(i), item))
    }

    pub fn contains(&self, id: I) -> bool {
        id.index() < self.items.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Report every name used by more than one object.
    fn check_names(&self, kind: ObjectKind, errors: &mut Vec<ConfigError>) {
        for (i, item) in self.items.iter().enumerate() {
            let name = item.name();
            if name.is_empty() {
                continue;
            }
            let first = self.items.iter().position(|other| other.name() == name);
            if first.is_some_and(|f| f < i) {
                let already = errors.iter().any(|e| {
                    matches!(e, ConfigError::NameConflict { kind: k, name: n } if *k == kind && n == name)
                });
                if !already {
                    errors.push(ConfigError::NameConflict {
                        kind,
                        name: String::from(name),
                    });
                }
            }
        }
    }
}

/// One authoring namespace.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Subproject {
    pub name: Name,
    pub macros: ObjectTable<SoundMacroId, SoundMacro>,
    pub adsrs: ObjectTable<AdsrId, Adsr>,
    pub curves: ObjectTable<CurveId, Curve>,
    pub keymaps: ObjectTable<KeymapId, Keymap>,
    pub layers: ObjectTable<LayersId, Layers>,
    pub samples: ObjectTable<SampleId, Sample>,
    pub groups: ObjectTable<GroupId, Group>,
}

impl Subproject {
    pub fn new(name: &str) -> Self {
        Self {
            name: crate::name(name),
            ..Self::default()
        }
    }

    pub fn sound_macro(&self, id: SoundMacroId) -> Option<&SoundMacro> {
        self.macros.get(id)
    }

    pub fn adsr(&self, id: AdsrId) -> Option<&Adsr> {
        self.adsrs.get(id)
    }

    pub fn curve(&self, id: CurveId) -> Option<&Curve> {
        self.curves.get(id)
    }

    pub fn keymap(&self, id: KeymapId) -> Option<&Keymap> {
        self.keymaps.get(id)
    }

    pub fn layer_set(&self, id: LayersId) -> Option<&Layers> {
        self.layers.get(id)
    }

    pub fn sample(&self, id: SampleId) -> Option<&Sample> {
        self.samples.get(id)
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(id)
    }

    pub fn add_sound_macro(&mut self, m: SoundMacro) -> SoundMacroId {
        self.macros.push(m)
    }

    pub fn add_adsr(&mut self, adsr: Adsr) -> AdsrId {
        self.adsrs.push(adsr)
    }

    pub fn add_curve(&mut self, curve: Curve) -> CurveId {
        self.curves.push(curve)
    }

    pub fn add_keymap(&mut self, keymap: Keymap) -> KeymapId {
        self.keymaps.push(keymap)
    }

    pub fn add_layers(&mut self, layers: Layers) -> LayersId {
        self.layers.push(layers)
    }

    pub fn add_sample(&mut self, sample: Sample) -> SampleId {
        self.samples.push(sample)
    }

    pub fn add_group(&mut self, group: Group) -> GroupId {
        self.groups.push(group)
    }

    pub fn find_sound_macro_by_name(&self, name: &str) -> Option<SoundMacroId> {
        self.macros.find_by_name(name)
    }

    pub fn find_adsr_by_name(&self, name: &str) -> Option<AdsrId> {
        self.adsrs.find_by_name(name)
    }

    pub fn find_curve_by_name(&self, name: &str) -> Option<CurveId> {
        self.curves.find_by_name(name)
    }

    pub fn find_keymap_by_name(&self, name: &str) -> Option<KeymapId> {
        self.keymaps.find_by_name(name)
    }

    pub fn find_layers_by_name(&self, name: &str) -> Option<LayersId> {
        self.layers.find_by_name(name)
    }

    pub fn find_sample_by_name(&self, name: &str) -> Option<SampleId> {
        self.samples.find_by_name(name)
    }

    pub fn find_group_by_name(&self, name: &str) -> Option<GroupId> {
        self.groups.find_by_name(name)
    }

    pub fn replace_sound_macro(&mut self, id: SoundMacroId, m: SoundMacro) -> Option<SoundMacro> {
        self.macros.replace(id, m)
    }

    pub fn replace_adsr(&mut self, id: AdsrId, adsr: Adsr) -> Option<Adsr> {
        self.adsrs.replace(id, adsr)
    }

    pub fn replace_curve(&mut self, id: CurveId, curve: Curve) -> Option<Curve> {
        self.curves.replace(id, curve)
    }

    pub fn replace_keymap(&mut self, id: KeymapId, keymap: Keymap) -> Option<Keymap> {
        self.keymaps.replace(id, keymap)
    }

    pub fn replace_layers(&mut self, id: LayersId, layers: Layers) -> Option<Layers> {
        self.layers.replace(id, layers)
    }

    pub fn replace_sample(&mut self, id: SampleId, sample: Sample) -> Option<Sample> {
        self.samples.replace(id, sample)
    }

    pub fn replace_group(&mut self, id: GroupId, group: Group) -> Option<Group> {
        self.groups.replace(id, group)
    }

    /// Whether a playable object reference resolves.
    pub fn contains(&self, object: ObjectRef) -> bool {
        match object {
            ObjectRef::SoundMacro(id) => self.macros.contains(id),
            ObjectRef::Keymap(id) => self.keymaps.contains(id),
            ObjectRef::Layers(id) => self.layers.contains(id),
        }
    }

    /// Collect every configuration problem in the subproject.
    ///
    /// Duplicate programs are reported when the tables are built
    /// ([`ProgramTable::from_entries`](crate::ProgramTable::from_entries)),
    /// not here.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        self.macros.check_names(ObjectKind::SoundMacro, &mut errors);
        self.adsrs.check_names(ObjectKind::Adsr, &mut errors);
        self.curves.check_names(ObjectKind::Curve, &mut errors);
        self.keymaps.check_names(ObjectKind::Keymap, &mut errors);
        self.layers.check_names(ObjectKind::Layers, &mut errors);
        self.samples.check_names(ObjectKind::Sample, &mut errors);
        self.groups.check_names(ObjectKind::Group, &mut errors);

        for (_, m) in self.macros.iter() {
            let owner = format!("SoundMacro '{}'", m.name);
            for cmd in &m.commands {
                self.check_command(&owner, cmd, &mut errors);
            }
        }

        for (_, adsr) in self.adsrs.iter() {
            for curve in adsr.curves() {
                require(&format!("ADSR '{}'", adsr.name), ObjectKind::Curve, curve.0, self.curves.contains(curve), &mut errors);
            }
        }

        for (id, curve) in self.curves.iter() {
            if !curve.is_valid() {
                errors.push(ConfigError::MalformedCurve {
                    curve: id,
                    message: String::from("expression is not compiled"),
                });
            }
        }

        for (_, keymap) in self.keymaps.iter() {
            let owner = format!("keymap '{}'", keymap.name);
            let entries = keymap.entries().map(|(_, e)| e).chain(keymap.default.as_ref());
            for entry in entries {
                require(&owner, ObjectKind::SoundMacro, entry.macro_id.0, self.macros.contains(entry.macro_id), &mut errors);
            }
        }

        for (_, layers) in self.layers.iter() {
            let owner = format!("layers '{}'", layers.name);
            for entry in &layers.entries {
                require(&owner, ObjectKind::SoundMacro, entry.macro_id.0, self.macros.contains(entry.macro_id), &mut errors);
                if entry.key_lo > entry.key_hi {
                    errors.push(ConfigError::InvertedKeyRange {
                        owner: owner.clone(),
                        lo: entry.key_lo,
                        hi: entry.key_hi,
                    });
                }
            }
        }

        for (_, group) in self.groups.iter() {
            let owner = format!("group '{}'", group.name());
            for object in group.objects() {
                let (kind, index) = match object {
                    ObjectRef::SoundMacro(id) => (ObjectKind::SoundMacro, id.0),
                    ObjectRef::Keymap(id) => (ObjectKind::Keymap, id.0),
                    ObjectRef::Layers(id) => (ObjectKind::Layers, id.0),
                };
                require(&owner, kind, index, self.contains(object), &mut errors);
            }
        }

        errors
    }

    fn check_command(&self, owner: &str, cmd: &Command, errors: &mut Vec<ConfigError>) {
        if let Some(id) = cmd.target().and_then(|t| t.macro_id) {
            require(owner, ObjectKind::SoundMacro, id.0, self.macros.contains(id), errors);
        }
        match *cmd {
            Command::StartSample { sample, .. } => {
                require(owner, ObjectKind::Sample, sample.0, self.samples.contains(sample), errors);
            }
            Command::SetAdsr { adsr } | Command::SetPitchAdsr { adsr, .. } => {
                require(owner, ObjectKind::Adsr, adsr.0, self.adsrs.contains(adsr), errors);
            }
            Command::ScaleVolume { curve: Some(curve), .. }
            | Command::Envelope { curve: Some(curve), .. }
            | Command::FadeIn { curve: Some(curve), .. } => {
                require(owner, ObjectKind::Curve, curve.0, self.curves.contains(curve), errors);
            }
            _ => {}
        }
    }

}

fn require(owner: &str, kind: ObjectKind, index: u16, present: bool, errors: &mut Vec<ConfigError>) {
    if !present {
        errors.push(ConfigError::MissingReference {
            owner: String::from(owner),
            kind,
            index,
        });
    }
}

/// A set of independent subprojects.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Project {
    pub subprojects: Vec<Subproject>,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subproject, returning its index.
    pub fn add(&mut self, subproject: Subproject) -> usize {
        self.subprojects.push(subproject);
        self.subprojects.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Subproject> {
        self.subprojects.get(index)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Subproject> {
        self.subprojects.iter().find(|s| s.name.as_str() == name)
    }

    /// Validate every subproject, tagging errors with the subproject index.
    pub fn validate(&self) -> Vec<(usize, ConfigError)> {
        self.subprojects
            .iter()
            .enumerate()
            .flat_map(|(i, s)| s.validate().into_iter().map(move |e| (i, e)))
            .collect()
    }
}
