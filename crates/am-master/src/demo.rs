//! A small built-in subproject for trying the runtime without authored data.

use am_ir::{
    Adsr, Command, Curve, Event, EventPayload, Group, Keymap, KeymapEntry, LayerEntry, Layers,
    LoopMode, MacroTarget, ObjectRef, PageEntry, Sample, SfxEntry, SfxGroup, SongGroup, SongSetup,
    SoundMacro, Subproject, TriggerTable,
};

pub const DEMO_SONG_GROUP: &str = "demo-song";
pub const DEMO_SFX_GROUP: &str = "demo-sfx";

/// One 128-frame cycle at 28160 Hz is exactly A3.
const CYCLE: usize = 128;
const CYCLE_RATE: u32 = 28160;
const CYCLE_ROOT: u8 = 57;

fn saw_cycle() -> Vec<i16> {
    (0..CYCLE)
        .map(|i| ((i as f32 / CYCLE as f32) * 2.0 - 1.0) * 12000.0)
        .map(|v| v as i16)
        .collect()
}

fn square_cycle() -> Vec<i16> {
    (0..CYCLE).map(|i| if i < CYCLE / 2 { 9000 } else { -9000 }).collect()
}

/// Pitch-dropping decaying sine, 22050 Hz.
fn kick() -> Vec<i16> {
    let mut phase = 0.0f32;
    (0..4000)
        .map(|i| {
            let t = i as f32 / 22050.0;
            let freq = 50.0 + 110.0 * (-t * 30.0).exp();
            phase += core::f32::consts::TAU * freq / 22050.0;
            (phase.sin() * (-t * 9.0).exp() * 26000.0) as i16
        })
        .collect()
}

/// Build the demo subproject: a layered pad/lead, an echoing arpeggio
/// macro, a drum keymap and one sweep sound effect.
pub fn demo_subproject() -> Subproject {
    let mut sp = Subproject::new("demo");

    let saw = sp.add_sample(
        Sample::from_pcm16("saw", saw_cycle(), CYCLE_RATE, CYCLE_ROOT).with_loop(0, CYCLE as u32),
    );
    let square = sp.add_sample(
        Sample::from_pcm16("square", square_cycle(), CYCLE_RATE, CYCLE_ROOT)
            .with_loop(0, CYCLE as u32),
    );
    let kick = sp.add_sample(Sample::from_pcm16("kick", kick(), 22050, 36));

    let soft = sp.add_curve(Curve::table("soft", vec![0.0, 0.25, 0.55, 0.8, 1.0]));
    let pluck = sp.add_adsr(Adsr::new("pluck", 4, 250, 0.3, 150));
    let pad = sp.add_adsr(Adsr::new("pad", 300, 400, 0.7, 600));

    let wait_key_off = Command::WaitTicks { ticks: 0, key_off: true, sample_end: false, random: false };

    let lead = sp.add_sound_macro(SoundMacro::new(
        "lead",
        vec![
            Command::SetAdsr { adsr: pluck },
            Command::ScaleVolume { scale: 127, add: 0, curve: Some(soft) },
            Command::Vibrato { semitones: 0, cents: 12, period_ms: 180 },
            Command::StartSample { sample: saw, mode: LoopMode::Loop, offset: 0 },
            Command::PianoPan { scale: 8, center_key: 60, center_pan: 0 },
            wait_key_off,
            Command::End,
        ],
    ));
    let pad_macro = sp.add_sound_macro(SoundMacro::new(
        "pad",
        vec![
            Command::SetAdsr { adsr: pad },
            Command::StartSample { sample: square, mode: LoopMode::Loop, offset: 0 },
            Command::AuxSends { a: 90, b: 40 },
            Command::Spanning { span: 20, ms: 500 },
            Command::Panning { pan: -20, ms: 800 },
            wait_key_off,
            Command::End,
        ],
    ));
    let kick_macro = sp.add_sound_macro(SoundMacro::new(
        "kick",
        vec![
            Command::StartSample { sample: kick, mode: LoopMode::NoLoop, offset: 0 },
            Command::WaitTicks { ticks: 0, key_off: false, sample_end: true, random: false },
            Command::End,
        ],
    ));
    let echo = sp.add_sound_macro(SoundMacro::new(
        "echo",
        vec![
            Command::PlayMacro { add_note: 0, target: MacroTarget::remote(lead, 0), priority_offset: 0 },
            Command::WaitMs { ms: 120, key_off: true, sample_end: false, random: false },
            Command::PlayMacro { add_note: 7, target: MacroTarget::remote(lead, 0), priority_offset: -4 },
            Command::WaitMs { ms: 120, key_off: true, sample_end: false, random: false },
            Command::PlayMacro { add_note: 12, target: MacroTarget::remote(lead, 0), priority_offset: -8 },
            wait_key_off,
            Command::SendKeyOff,
            Command::End,
        ],
    ));
    let sweep = sp.add_sound_macro(SoundMacro::new(
        "sweep",
        vec![
            Command::SetAdsr { adsr: pluck },
            Command::StartSample { sample: saw, mode: LoopMode::Loop, offset: 0 },
            Command::AuxSends { a: 60, b: 0 },
            Command::PitchSweep { cents: 1200, ticks: 40 },
            Command::WaitMs { ms: 200, key_off: false, sample_end: false, random: false },
            Command::KeyOff,
            Command::End,
        ],
    ));

    let mut drums = Keymap::new("drums");
    drums.set(36, Some(KeymapEntry { macro_id: kick_macro, ..Default::default() }));
    drums.set(
        38,
        Some(KeymapEntry { macro_id: kick_macro, transpose: 7, pan: 12, ..Default::default() }),
    );
    let drums = sp.add_keymap(drums);

    let mut lead_layer = LayerEntry::new(lead, 0, 127);
    lead_layer.volume = 100;
    let mut pad_layer = LayerEntry::new(pad_macro, 0, 127);
    pad_layer.transpose = -12;
    pad_layer.volume = 80;
    pad_layer.span = -10;
    let stack = sp.add_layers(Layers::new("stack", vec![lead_layer, pad_layer]));

    let mut song = SongGroup::new(DEMO_SONG_GROUP);
    song.normal.replace(PageEntry {
        program: 0,
        object: ObjectRef::Layers(stack),
        priority: 64,
        max_voices: 8,
    });
    song.normal.replace(PageEntry {
        program: 1,
        object: ObjectRef::SoundMacro(echo),
        priority: 64,
        max_voices: 12,
    });
    song.drum.replace(PageEntry {
        program: 0,
        object: ObjectRef::Keymap(drums),
        priority: 96,
        max_voices: 4,
    });
    let mut setup = SongSetup::new(0);
    setup.channels[0].reverb = 60;
    setup.channels[0].chorus = 20;
    setup.channels[1].program = 1;
    setup.channels[1].reverb = 30;
    setup.channels[9].volume = 120;
    song.setups.push(setup);
    sp.add_group(Group::Song(song));

    let mut sfx = SfxGroup::new(DEMO_SFX_GROUP);
    sfx.sfx.replace(SfxEntry {
        sfx_id: 0,
        object: ObjectRef::SoundMacro(sweep),
        priority: 110,
        max_voices: 2,
        default_key: 60,
        default_velocity: 127,
        pan: 0,
    });
    sp.add_group(Group::Sfx(sfx));

    sp
}

/// A two-bar pattern over the demo groups, timed for `tick_rate`.
///
/// Empty when `subproject` lacks the demo groups.
pub fn demo_events(subproject: &Subproject, tick_rate: u32) -> Vec<Event> {
    let (Some(song), Some(sfx)) = (
        subproject.find_group_by_name(DEMO_SONG_GROUP),
        subproject.find_group_by_name(DEMO_SFX_GROUP),
    ) else {
        return Vec::new();
    };
    let at = |ms: u64| ms * tick_rate as u64 / 1000;
    let note_on = |ms, table, program, note, velocity, channel| {
        Event::new(at(ms), EventPayload::NoteOn { table, program, note, velocity, channel })
    };
    let note_off = |ms, channel, note| Event::new(at(ms), EventPayload::NoteOff { channel, note });

    let mut events = vec![
        note_on(0, TriggerTable::normal(song), 0, 60, 100, 0),
        note_off(1800, 0, 60),
    ];
    for (i, note) in [67u8, 72, 71, 64].into_iter().enumerate() {
        let start = 250 + i as u64 * 400;
        events.push(note_on(start, TriggerTable::normal(song), 1, note, 90, 1));
        events.push(note_off(start + 300, 1, note));
    }
    for beat in 0..8u64 {
        let note = if beat % 2 == 0 { 36 } else { 38 };
        events.push(note_on(beat * 250, TriggerTable::drum(song), 0, note, 120, 9));
        events.push(note_off(beat * 250 + 100, 9, note));
    }
    events.push(note_on(1000, TriggerTable::sfx(sfx), 0, 60, 127, 15));
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_subproject_validates() {
        let sp = demo_subproject();
        assert!(sp.validate().is_empty(), "{:?}", sp.validate());
    }

    #[test]
    fn demo_events_cover_two_seconds() {
        let sp = demo_subproject();
        let events = demo_events(&sp, 200);
        assert!(events.iter().all(|e| e.tick <= 400));
        assert!(events.iter().any(|e| matches!(e.payload, EventPayload::NoteOff { channel: 0, note: 60 })));
    }

    #[test]
    fn foreign_subproject_has_no_demo_events() {
        assert!(demo_events(&Subproject::new("empty"), 200).is_empty());
    }
}
