//! Binary subproject format.
//!
//! Layout (little-endian): `AMSP` magic, `u16` version, then one record
//! table per object kind in id order, so ids survive a round trip.
//! Macros store each command as an opcode byte plus four `i32` arguments.
//! Expression curves store only their source and are recompiled on load.

use std::io::Cursor;

use am_ir::{
    Adsr, AdsrId, Command, ConfigError, Curve, CurveData, CurveId, Group, Keymap, KeymapEntry, LayerEntry,
    Layers, LoopMode, MacroTarget, MidiSetup, ObjectRef, PageEntry, PageTable, Sample, SampleData,
    SampleId, SfxEntry, SfxGroup, SfxTable, SongGroup, SongSetup, SoundMacro, SoundMacroId,
    Subproject, TableKind, KEY_COUNT, MIDI_CHANNELS,
};
use binrw::{binrw, BinRead, BinWrite};

use crate::curve_expr::recompile_curves;
use crate::FormatError;

pub const FORMAT_VERSION: u16 = 1;

// --- Records ---

#[binrw]
#[brw(little, magic = b"AMSP")]
struct FileHeader {
    version: u16,
}

#[binrw]
#[derive(Clone, Debug, Default)]
struct PString {
    #[br(temp)]
    #[bw(calc = bytes.len() as u16)]
    len: u16,
    #[br(count = len)]
    bytes: Vec<u8>,
}

impl PString {
    fn new(s: &str) -> Self {
        Self { bytes: s.as_bytes().to_vec() }
    }

    fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[binrw]
#[brw(little)]
struct SubprojectRecord {
    name: PString,
    #[br(temp)]
    #[bw(calc = macros.len() as u32)]
    macro_count: u32,
    #[br(count = macro_count)]
    macros: Vec<MacroRecord>,
    #[br(temp)]
    #[bw(calc = adsrs.len() as u32)]
    adsr_count: u32,
    #[br(count = adsr_count)]
    adsrs: Vec<AdsrRecord>,
    #[br(temp)]
    #[bw(calc = curves.len() as u32)]
    curve_count: u32,
    #[br(count = curve_count)]
    curves: Vec<CurveRecord>,
    #[br(temp)]
    #[bw(calc = keymaps.len() as u32)]
    keymap_count: u32,
    #[br(count = keymap_count)]
    keymaps: Vec<KeymapRecord>,
    #[br(temp)]
    #[bw(calc = layers.len() as u32)]
    layers_count: u32,
    #[br(count = layers_count)]
    layers: Vec<LayersRecord>,
    #[br(temp)]
    #[bw(calc = samples.len() as u32)]
    sample_count: u32,
    #[br(count = sample_count)]
    samples: Vec<SampleRecord>,
    #[br(temp)]
    #[bw(calc = groups.len() as u32)]
    group_count: u32,
    #[br(count = group_count)]
    groups: Vec<GroupRecord>,
}

#[binrw]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CommandRecord {
    opcode: u8,
    args: [i32; 4],
}

#[binrw]
struct MacroRecord {
    name: PString,
    #[br(temp)]
    #[bw(calc = commands.len() as u32)]
    count: u32,
    #[br(count = count)]
    commands: Vec<CommandRecord>,
}

#[binrw]
struct AdsrRecord {
    name: PString,
    attack_ms: u32,
    decay_ms: u32,
    sustain: f32,
    release_ms: u32,
    dls: u8,
    vel_to_attack: i32,
    key_to_decay: i32,
    /// -1 = linear
    curves: [i32; 3],
}

#[binrw]
struct FloatList {
    #[br(temp)]
    #[bw(calc = values.len() as u32)]
    count: u32,
    #[br(count = count)]
    values: Vec<f32>,
}

#[binrw]
enum CurveBody {
    #[brw(magic = 0u8)]
    Table(FloatList),
    #[brw(magic = 1u8)]
    Expression(PString),
}

#[binrw]
struct CurveRecord {
    name: PString,
    body: CurveBody,
}

#[binrw]
#[derive(Clone, Copy, Default)]
struct KeySlot {
    present: u8,
    macro_id: u16,
    transpose: i8,
    pan: i8,
    surround: u8,
    priority_offset: i8,
}

#[binrw]
struct KeymapRecord {
    name: PString,
    default: KeySlot,
    #[br(count = KEY_COUNT)]
    keys: Vec<KeySlot>,
}

#[binrw]
struct LayerRecord {
    macro_id: u16,
    key_lo: u8,
    key_hi: u8,
    transpose: i8,
    volume: u8,
    priority_offset: i8,
    pan: i8,
    span: i8,
}

#[binrw]
struct LayersRecord {
    name: PString,
    #[br(temp)]
    #[bw(calc = entries.len() as u32)]
    count: u32,
    #[br(count = count)]
    entries: Vec<LayerRecord>,
}

#[binrw]
struct Pcm8 {
    #[br(temp)]
    #[bw(calc = frames.len() as u32)]
    count: u32,
    #[br(count = count)]
    frames: Vec<i8>,
}

#[binrw]
struct Pcm16 {
    #[br(temp)]
    #[bw(calc = frames.len() as u32)]
    count: u32,
    #[br(count = count)]
    frames: Vec<i16>,
}

#[binrw]
enum PcmRecord {
    #[brw(magic = 8u8)]
    Mono8(Pcm8),
    #[brw(magic = 16u8)]
    Mono16(Pcm16),
}

#[binrw]
struct SampleRecord {
    name: PString,
    sample_rate: u32,
    root_key: u8,
    loop_start: u32,
    loop_end: u32,
    pcm: PcmRecord,
}

#[binrw]
#[derive(Clone, Copy)]
struct ObjectRecord {
    /// 0 macro, 1 keymap, 2 layers
    kind: u8,
    id: u16,
}

#[binrw]
struct PageRecord {
    program: u16,
    object: ObjectRecord,
    priority: u8,
    max_voices: u8,
}

#[binrw]
#[derive(Clone, Copy)]
struct MidiRecord {
    program: u16,
    volume: u8,
    pan: u8,
    reverb: u8,
    chorus: u8,
}

#[binrw]
struct SetupRecord {
    song_id: u16,
    #[br(count = MIDI_CHANNELS)]
    channels: Vec<MidiRecord>,
}

#[binrw]
struct SongRecord {
    name: PString,
    #[br(temp)]
    #[bw(calc = normal.len() as u32)]
    normal_count: u32,
    #[br(count = normal_count)]
    normal: Vec<PageRecord>,
    #[br(temp)]
    #[bw(calc = drum.len() as u32)]
    drum_count: u32,
    #[br(count = drum_count)]
    drum: Vec<PageRecord>,
    #[br(temp)]
    #[bw(calc = setups.len() as u32)]
    setup_count: u32,
    #[br(count = setup_count)]
    setups: Vec<SetupRecord>,
}

#[binrw]
struct SfxRecord {
    sfx_id: u16,
    object: ObjectRecord,
    priority: u8,
    max_voices: u8,
    default_key: u8,
    default_velocity: u8,
    pan: i8,
}

#[binrw]
struct SfxGroupRecord {
    name: PString,
    #[br(temp)]
    #[bw(calc = entries.len() as u32)]
    count: u32,
    #[br(count = count)]
    entries: Vec<SfxRecord>,
}

#[binrw]
enum GroupRecord {
    #[brw(magic = 0u8)]
    Song(SongRecord),
    #[brw(magic = 1u8)]
    Sfx(SfxGroupRecord),
}

// --- Public API ---

/// Serialize a subproject.
pub fn save_subproject(subproject: &Subproject) -> Result<Vec<u8>, FormatError> {
    let mut out = Cursor::new(Vec::new());
    FileHeader { version: FORMAT_VERSION }.write(&mut out)?;
    to_record(subproject).write(&mut out)?;
    Ok(out.into_inner())
}

/// Load a subproject saved by [`save_subproject`].
///
/// Problems that do not stop the load come back alongside the subproject:
/// duplicate program or sound effect numbers (the first entry is kept) and
/// expression curves that fail to recompile (kept invalid, played as
/// identity).
pub fn load_subproject(data: &[u8]) -> Result<(Subproject, Vec<ConfigError>), FormatError> {
    let mut cursor = Cursor::new(data);
    let header = FileHeader::read(&mut cursor).map_err(|e| match e {
        binrw::Error::BadMagic { .. } => FormatError::InvalidHeader,
        other => FormatError::from(other),
    })?;
    if header.version != FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion(header.version));
    }
    let record = SubprojectRecord::read(&mut cursor)?;
    let mut problems = Vec::new();
    let mut subproject = from_record(record, &mut problems)?;
    let curve_errors = recompile_curves(&mut subproject);
    tracing::debug!(
        name = %subproject.name,
        macros = subproject.macros.len(),
        samples = subproject.samples.len(),
        duplicates = problems.len(),
        curve_errors = curve_errors.len(),
        "subproject loaded"
    );
    problems.extend(curve_errors);
    Ok((subproject, problems))
}

// --- IR → records ---

fn to_record(sp: &Subproject) -> SubprojectRecord {
    SubprojectRecord {
        name: PString::new(&sp.name),
        macros: sp
            .macros
            .iter()
            .map(|(_, m)| MacroRecord {
                name: PString::new(&m.name),
                commands: m.commands.iter().map(encode_command).collect(),
            })
            .collect(),
        adsrs: sp.adsrs.iter().map(|(_, a)| adsr_record(a)).collect(),
        curves: sp
            .curves
            .iter()
            .map(|(_, c)| CurveRecord {
                name: PString::new(&c.name),
                body: match &c.data {
                    CurveData::Table(points) => CurveBody::Table(FloatList { values: points.clone() }),
                    CurveData::Expression { source, .. } => CurveBody::Expression(PString::new(source)),
                },
            })
            .collect(),
        keymaps: sp.keymaps.iter().map(|(_, k)| keymap_record(k)).collect(),
        layers: sp
            .layers
            .iter()
            .map(|(_, l)| LayersRecord {
                name: PString::new(&l.name),
                entries: l
                    .entries
                    .iter()
                    .map(|e| LayerRecord {
                        macro_id: e.macro_id.0,
                        key_lo: e.key_lo,
                        key_hi: e.key_hi,
                        transpose: e.transpose,
                        volume: e.volume,
                        priority_offset: e.priority_offset,
                        pan: e.pan,
                        span: e.span,
                    })
                    .collect(),
            })
            .collect(),
        samples: sp
            .samples
            .iter()
            .map(|(_, s)| SampleRecord {
                name: PString::new(&s.name),
                sample_rate: s.sample_rate,
                root_key: s.root_key,
                loop_start: s.loop_start,
                loop_end: s.loop_end,
                pcm: match &s.data {
                    SampleData::Mono8(v) => PcmRecord::Mono8(Pcm8 { frames: v.clone() }),
                    SampleData::Mono16(v) => PcmRecord::Mono16(Pcm16 { frames: v.clone() }),
                },
            })
            .collect(),
        groups: sp.groups.iter().map(|(_, g)| group_record(g)).collect(),
    }
}

fn curve_arg(curve: Option<CurveId>) -> i32 {
    curve.map_or(-1, |c| c.0 as i32)
}

fn adsr_record(a: &Adsr) -> AdsrRecord {
    AdsrRecord {
        name: PString::new(&a.name),
        attack_ms: a.attack_ms,
        decay_ms: a.decay_ms,
        sustain: a.sustain,
        release_ms: a.release_ms,
        dls: a.dls as u8,
        vel_to_attack: a.vel_to_attack,
        key_to_decay: a.key_to_decay,
        curves: [curve_arg(a.attack_curve), curve_arg(a.decay_curve), curve_arg(a.release_curve)],
    }
}

fn key_slot(entry: Option<&KeymapEntry>) -> KeySlot {
    match entry {
        Some(e) => KeySlot {
            present: 1,
            macro_id: e.macro_id.0,
            transpose: e.transpose,
            pan: e.pan,
            surround: e.surround as u8,
            priority_offset: e.priority_offset,
        },
        None => KeySlot::default(),
    }
}

fn keymap_record(k: &Keymap) -> KeymapRecord {
    KeymapRecord {
        name: PString::new(&k.name),
        default: key_slot(k.default.as_ref()),
        keys: (0..KEY_COUNT).map(|key| key_slot(k.entry(key as u8))).collect(),
    }
}

fn object_record(object: ObjectRef) -> ObjectRecord {
    match object {
        ObjectRef::SoundMacro(id) => ObjectRecord { kind: 0, id: id.0 },
        ObjectRef::Keymap(id) => ObjectRecord { kind: 1, id: id.0 },
        ObjectRef::Layers(id) => ObjectRecord { kind: 2, id: id.0 },
    }
}

fn page_records(table: &PageTable) -> Vec<PageRecord> {
    table
        .entries()
        .iter()
        .map(|e| PageRecord {
            program: e.program,
            object: object_record(e.object),
            priority: e.priority,
            max_voices: e.max_voices,
        })
        .collect()
}

fn group_record(g: &Group) -> GroupRecord {
    match g {
        Group::Song(song) => GroupRecord::Song(SongRecord {
            name: PString::new(&song.name),
            normal: page_records(&song.normal),
            drum: page_records(&song.drum),
            setups: song
                .setups
                .iter()
                .map(|s| SetupRecord {
                    song_id: s.song_id,
                    channels: s
                        .channels
                        .iter()
                        .map(|c| MidiRecord {
                            program: c.program,
                            volume: c.volume,
                            pan: c.pan,
                            reverb: c.reverb,
                            chorus: c.chorus,
                        })
                        .collect(),
                })
                .collect(),
        }),
        Group::Sfx(sfx) => GroupRecord::Sfx(SfxGroupRecord {
            name: PString::new(&sfx.name),
            entries: sfx
                .sfx
                .entries()
                .iter()
                .map(|e| SfxRecord {
                    sfx_id: e.sfx_id,
                    object: object_record(e.object),
                    priority: e.priority,
                    max_voices: e.max_voices,
                    default_key: e.default_key,
                    default_velocity: e.default_velocity,
                    pan: e.pan,
                })
                .collect(),
        }),
    }
}

// --- Records → IR ---

fn from_record(record: SubprojectRecord, problems: &mut Vec<ConfigError>) -> Result<Subproject, FormatError> {
    let mut sp = Subproject::new(&record.name.to_string_lossy());
    for m in record.macros {
        let name = m.name.to_string_lossy();
        let commands = m
            .commands
            .iter()
            .map(|c| {
                decode_command(c).ok_or_else(|| FormatError::UnknownCommand {
                    macro_name: name.clone(),
                    opcode: c.opcode,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        sp.add_sound_macro(SoundMacro::new(&name, commands));
    }
    for a in record.adsrs {
        sp.add_adsr(Adsr {
            name: am_ir::name(&a.name.to_string_lossy()),
            attack_ms: a.attack_ms,
            decay_ms: a.decay_ms,
            sustain: a.sustain.clamp(0.0, 1.0),
            release_ms: a.release_ms,
            dls: a.dls != 0,
            vel_to_attack: a.vel_to_attack,
            key_to_decay: a.key_to_decay,
            attack_curve: curve_id(a.curves[0]),
            decay_curve: curve_id(a.curves[1]),
            release_curve: curve_id(a.curves[2]),
        });
    }
    for c in record.curves {
        let name = c.name.to_string_lossy();
        sp.add_curve(match c.body {
            CurveBody::Table(list) => Curve::table(&name, list.values),
            // Compiled after every table is loaded.
            CurveBody::Expression(source) => Curve::expression(&name, &source.to_string_lossy(), None),
        });
    }
    for k in record.keymaps {
        let mut keymap = Keymap::new(&k.name.to_string_lossy());
        keymap.default = keymap_entry(&k.default);
        for (key, slot) in k.keys.iter().enumerate() {
            keymap.set(key as u8, keymap_entry(slot));
        }
        sp.add_keymap(keymap);
    }
    for l in record.layers {
        let entries = l
            .entries
            .iter()
            .map(|e| LayerEntry {
                macro_id: SoundMacroId(e.macro_id),
                key_lo: e.key_lo,
                key_hi: e.key_hi,
                transpose: e.transpose,
                volume: e.volume,
                priority_offset: e.priority_offset,
                pan: e.pan,
                span: e.span,
            })
            .collect();
        sp.add_layers(Layers::new(&l.name.to_string_lossy(), entries));
    }
    for s in record.samples {
        let data = match s.pcm {
            PcmRecord::Mono8(p) => SampleData::Mono8(p.frames),
            PcmRecord::Mono16(p) => SampleData::Mono16(p.frames),
        };
        let sample = Sample {
            name: am_ir::name(&s.name.to_string_lossy()),
            data,
            sample_rate: s.sample_rate,
            root_key: s.root_key,
            loop_start: 0,
            loop_end: 0,
        };
        sp.add_sample(sample.with_loop(s.loop_start, s.loop_end));
    }
    for (index, g) in record.groups.into_iter().enumerate() {
        let group = group_from_record(g, am_ir::GroupId(index as u16), problems)?;
        sp.add_group(group);
    }
    Ok(sp)
}

fn curve_id(raw: i32) -> Option<CurveId> {
    u16::try_from(raw).ok().map(CurveId)
}

fn keymap_entry(slot: &KeySlot) -> Option<KeymapEntry> {
    (slot.present != 0).then(|| KeymapEntry {
        macro_id: SoundMacroId(slot.macro_id),
        transpose: slot.transpose,
        pan: slot.pan,
        surround: slot.surround != 0,
        priority_offset: slot.priority_offset,
    })
}

fn object_ref(r: ObjectRecord) -> Result<ObjectRef, FormatError> {
    Ok(match r.kind {
        0 => ObjectRef::SoundMacro(SoundMacroId(r.id)),
        1 => ObjectRef::Keymap(am_ir::KeymapId(r.id)),
        2 => ObjectRef::Layers(am_ir::LayersId(r.id)),
        kind => return Err(FormatError::Malformed(format!("unknown object kind {kind}"))),
    })
}

fn page_table(
    group: am_ir::GroupId,
    kind: TableKind,
    records: Vec<PageRecord>,
    problems: &mut Vec<ConfigError>,
) -> Result<PageTable, FormatError> {
    let entries = records
        .into_iter()
        .map(|r| {
            Ok(PageEntry {
                program: r.program,
                object: object_ref(r.object)?,
                priority: r.priority,
                max_voices: r.max_voices,
            })
        })
        .collect::<Result<Vec<_>, FormatError>>()?;
    let (table, errors) = PageTable::from_entries(group, kind, entries);
    for err in &errors {
        tracing::warn!(%err, "duplicate program in saved group");
    }
    problems.extend(errors);
    Ok(table)
}

fn group_from_record(
    record: GroupRecord,
    id: am_ir::GroupId,
    problems: &mut Vec<ConfigError>,
) -> Result<Group, FormatError> {
    Ok(match record {
        GroupRecord::Song(song) => {
            let mut group = SongGroup::new(&song.name.to_string_lossy());
            group.normal = page_table(id, TableKind::Normal, song.normal, problems)?;
            group.drum = page_table(id, TableKind::Drum, song.drum, problems)?;
            for s in song.setups {
                let mut setup = SongSetup::new(s.song_id);
                for (slot, c) in setup.channels.iter_mut().zip(&s.channels) {
                    *slot = MidiSetup {
                        program: c.program,
                        volume: c.volume,
                        pan: c.pan,
                        reverb: c.reverb,
                        chorus: c.chorus,
                    };
                }
                group.setups.push(setup);
            }
            Group::Song(group)
        }
        GroupRecord::Sfx(sfx) => {
            let mut group = SfxGroup::new(&sfx.name.to_string_lossy());
            let entries = sfx
                .entries
                .into_iter()
                .map(|r| {
                    Ok(SfxEntry {
                        sfx_id: r.sfx_id,
                        object: object_ref(r.object)?,
                        priority: r.priority,
                        max_voices: r.max_voices,
                        default_key: r.default_key,
                        default_velocity: r.default_velocity,
                        pan: r.pan,
                    })
                })
                .collect::<Result<Vec<_>, FormatError>>()?;
            let (table, errors) = SfxTable::from_entries(id, TableKind::Sfx, entries);
            for err in &errors {
                tracing::warn!(%err, "duplicate sound effect in saved group");
            }
            problems.extend(errors);
            group.sfx = table;
            Group::Sfx(group)
        }
    })
}

// --- Command codec ---

fn target_args(t: MacroTarget) -> (i32, i32) {
    (t.macro_id.map_or(-1, |m| m.0 as i32), t.step as i32)
}

fn target_from(macro_arg: i32, step: i32) -> MacroTarget {
    MacroTarget {
        macro_id: u16::try_from(macro_arg).ok().map(SoundMacroId),
        step: step as u16,
    }
}

fn flags(a: bool, b: bool, c: bool) -> i32 {
    a as i32 | (b as i32) << 1 | (c as i32) << 2
}

fn rec(opcode: u8, args: [i32; 4]) -> CommandRecord {
    CommandRecord { opcode, args }
}

fn encode_command(cmd: &Command) -> CommandRecord {
    use Command::*;
    match *cmd {
        End => rec(0, [0; 4]),
        Stop => rec(1, [0; 4]),
        SplitKey { key, target } => {
            let (m, s) = target_args(target);
            rec(2, [key as i32, m, s, 0])
        }
        SplitVel { velocity, target } => {
            let (m, s) = target_args(target);
            rec(3, [velocity as i32, m, s, 0])
        }
        SplitRnd { threshold, target } => {
            let (m, s) = target_args(target);
            rec(4, [threshold as i32, m, s, 0])
        }
        WaitTicks { ticks, key_off, sample_end, random } => rec(5, [ticks as i32, flags(key_off, sample_end, random), 0, 0]),
        WaitMs { ms, key_off, sample_end, random } => rec(6, [ms as i32, flags(key_off, sample_end, random), 0, 0]),
        Loop { step, times, key_off, sample_end } => rec(7, [step as i32, times as i32, flags(key_off, sample_end, false), 0]),
        Goto { target } => {
            let (m, s) = target_args(target);
            rec(8, [m, s, 0, 0])
        }
        GoSub { target } => {
            let (m, s) = target_args(target);
            rec(9, [m, s, 0, 0])
        }
        Return => rec(10, [0; 4]),
        TrapKeyOff { target } => {
            let (m, s) = target_args(target);
            rec(11, [m, s, 0, 0])
        }
        UntrapKeyOff => rec(12, [0; 4]),
        SetNote { key, cents } => rec(13, [key as i32, cents as i32, 0, 0]),
        AddNote { add, cents } => rec(14, [add as i32, cents as i32, 0, 0]),
        RndNote { lo, hi } => rec(15, [lo as i32, hi as i32, 0, 0]),
        Portamento { ms } => rec(16, [ms as i32, 0, 0, 0]),
        Vibrato { semitones, cents, period_ms } => rec(17, [semitones as i32, cents as i32, period_ms as i32, 0]),
        PitchSweep { cents, ticks } => rec(18, [cents as i32, ticks as i32, 0, 0]),
        SetPitchAdsr { adsr, semitones } => rec(19, [adsr.0 as i32, semitones as i32, 0, 0]),
        PitchWheelRange { up, down } => rec(20, [up as i32, down as i32, 0, 0]),
        StartSample { sample, mode, offset } => rec(21, [sample.0 as i32, mode.to_raw() as i32, offset as i32, 0]),
        StopSample => rec(22, [0; 4]),
        KeyOff => rec(23, [0; 4]),
        SetAdsr { adsr } => rec(24, [adsr.0 as i32, 0, 0, 0]),
        ScaleVolume { scale, add, curve } => rec(25, [scale as i32, add as i32, curve_arg(curve), 0]),
        Envelope { target, ms, curve } => rec(26, [target as i32, ms as i32, curve_arg(curve), 0]),
        FadeIn { ms, curve } => rec(27, [ms as i32, curve_arg(curve), 0, 0]),
        SetupTremolo { depth, period_ms } => rec(28, [depth as i32, period_ms as i32, 0, 0]),
        Panning { pan, ms } => rec(29, [pan as i32, ms as i32, 0, 0]),
        PianoPan { scale, center_key, center_pan } => rec(30, [scale as i32, center_key as i32, center_pan as i32, 0]),
        Spanning { span, ms } => rec(31, [span as i32, ms as i32, 0, 0]),
        AuxSends { a, b } => rec(32, [a as i32, b as i32, 0, 0]),
        SetPriority { priority } => rec(33, [priority as i32, 0, 0, 0]),
        AddPriority { add } => rec(34, [add as i32, 0, 0, 0]),
        PlayMacro { add_note, target, priority_offset } => {
            let (m, s) = target_args(target);
            rec(35, [add_note as i32, m, s, priority_offset as i32])
        }
        SendKeyOff => rec(36, [0; 4]),
        SetVar { var, value } => rec(37, [var as i32, value as i32, 0, 0]),
        AddVar { dst, a, b } => rec(38, [dst as i32, a as i32, b as i32, 0]),
        IfEqual { a, b, target } => {
            let (m, s) = target_args(target);
            rec(39, [a as i32, b as i32, m, s])
        }
        IfLess { a, b, target } => {
            let (m, s) = target_args(target);
            rec(40, [a as i32, b as i32, m, s])
        }
    }
}

fn decode_command(r: &CommandRecord) -> Option<Command> {
    use Command::*;
    let [a, b, c, d] = r.args;
    let bit = |v: i32, n: u32| v & (1 << n) != 0;
    Some(match r.opcode {
        0 => End,
        1 => Stop,
        2 => SplitKey { key: a as u8, target: target_from(b, c) },
        3 => SplitVel { velocity: a as u8, target: target_from(b, c) },
        4 => SplitRnd { threshold: a as u8, target: target_from(b, c) },
        5 => WaitTicks { ticks: a as u16, key_off: bit(b, 0), sample_end: bit(b, 1), random: bit(b, 2) },
        6 => WaitMs { ms: a as u16, key_off: bit(b, 0), sample_end: bit(b, 1), random: bit(b, 2) },
        7 => Loop { step: a as u16, times: b as u16, key_off: bit(c, 0), sample_end: bit(c, 1) },
        8 => Goto { target: target_from(a, b) },
        9 => GoSub { target: target_from(a, b) },
        10 => Return,
        11 => TrapKeyOff { target: target_from(a, b) },
        12 => UntrapKeyOff,
        13 => SetNote { key: a as u8, cents: b as i8 },
        14 => AddNote { add: a as i8, cents: b as i8 },
        15 => RndNote { lo: a as i8, hi: b as i8 },
        16 => Portamento { ms: a as u16 },
        17 => Vibrato { semitones: a as u8, cents: b as u8, period_ms: c as u16 },
        18 => PitchSweep { cents: a as i16, ticks: b as u16 },
        19 => SetPitchAdsr { adsr: AdsrId(a as u16), semitones: b as i8 },
        20 => PitchWheelRange { up: a as u8, down: b as u8 },
        21 => StartSample { sample: SampleId(a as u16), mode: LoopMode::from_raw(b as u8)?, offset: c as u32 },
        22 => StopSample,
        23 => KeyOff,
        24 => SetAdsr { adsr: AdsrId(a as u16) },
        25 => ScaleVolume { scale: a as u8, add: b as i8, curve: curve_id(c) },
        26 => Envelope { target: a as u8, ms: b as u16, curve: curve_id(c) },
        27 => FadeIn { ms: a as u16, curve: curve_id(b) },
        28 => SetupTremolo { depth: a as u8, period_ms: b as u16 },
        29 => Panning { pan: a as i8, ms: b as u16 },
        30 => PianoPan { scale: a as i8, center_key: b as u8, center_pan: c as i8 },
        31 => Spanning { span: a as i8, ms: b as u16 },
        32 => AuxSends { a: a as u8, b: b as u8 },
        33 => SetPriority { priority: a as u8 },
        34 => AddPriority { add: a as i8 },
        35 => PlayMacro { add_note: a as i8, target: target_from(b, c), priority_offset: d as i8 },
        36 => SendKeyOff,
        37 => SetVar { var: a as u8, value: b as i16 },
        38 => AddVar { dst: a as u8, a: b as u8, b: c as u8 },
        39 => IfEqual { a: a as u8, b: b as u8, target: target_from(c, d) },
        40 => IfLess { a: a as u8, b: b as u8, target: target_from(c, d) },
        _ => return None,
    })
}
