//! End-to-end playback scenarios over the demo subproject.

use am_engine::{Engine, EngineConfig, Frame};
use am_ir::{
    AuxSetup, ChannelMask, EffectKind, Event, EventPayload, ReverbParams, StudioSetup, TriggerTable,
};
use am_master::{demo_events, Controller, Settings, DEMO_SFX_GROUP, DEMO_SONG_GROUP};

const RATE: u32 = 16000;

fn settings() -> Settings {
    Settings { sample_rate: RATE, seed: 11, ..Settings::default() }
}

fn demo_engine() -> Engine {
    Controller::demo(settings()).engine(RATE)
}

fn render(engine: &mut Engine, seconds: f32) -> Vec<Frame> {
    let mut out = vec![Frame::default(); (RATE as f32 * seconds) as usize];
    engine.render(&mut out);
    out
}

#[test]
fn controller_render_matches_engine() {
    let controller = Controller::demo(settings());
    let events = demo_events(controller.subproject(), controller.settings().tick_rate);
    let offline = controller.render_frames(&events, RATE as usize);

    let mut engine = controller.engine(RATE);
    for event in events {
        engine.schedule(event);
    }
    let direct = render(&mut engine, 1.0);
    assert_eq!(offline, direct);
    assert!(offline.iter().any(|f| !f.is_silent()));
}

#[test]
fn rendering_is_deterministic_per_seed() {
    let controller = Controller::demo(settings());
    let events = demo_events(controller.subproject(), controller.settings().tick_rate);
    let a = controller.render_frames(&events, 8000);
    let b = controller.render_frames(&events, 8000);
    assert_eq!(a, b);
}

#[test]
fn layered_program_starts_every_layer() {
    let mut engine = demo_engine();
    let song = engine.subproject().find_group_by_name(DEMO_SONG_GROUP).unwrap();
    let started = engine.trigger(TriggerTable::normal(song), 0, 60, 100, 0);
    assert_eq!(started.len(), 2);

    let keys: Vec<u8> = started.iter().map(|k| engine.voice(*k).unwrap().key).collect();
    assert!(keys.contains(&60));
    assert!(keys.contains(&48));
}

#[test]
fn unmapped_drum_key_starts_nothing() {
    let mut engine = demo_engine();
    let song = engine.subproject().find_group_by_name(DEMO_SONG_GROUP).unwrap();
    assert!(engine.trigger(TriggerTable::drum(song), 0, 37, 100, 9).is_empty());
    assert_eq!(engine.trigger(TriggerTable::drum(song), 0, 38, 100, 9).len(), 1);
}

#[test]
fn echo_macro_spawns_children_over_time() {
    let mut engine = demo_engine();
    let song = engine.subproject().find_group_by_name(DEMO_SONG_GROUP).unwrap();
    let started = engine.trigger(TriggerTable::normal(song), 1, 64, 100, 1);
    let parent = started[0];

    render(&mut engine, 0.3);
    let children = engine.voice(parent).unwrap().children.clone();
    assert!(children.len() >= 2, "children: {}", children.len());
    for child in &children {
        assert_eq!(engine.voice(*child).unwrap().parent, Some(parent));
    }

    // Releasing the parent runs SendKeyOff, which releases the children.
    engine.release_voice(parent);
    render(&mut engine, 0.05);
    for child in &children {
        if let Some(voice) = engine.voice(*child) {
            assert!(voice.released);
        }
    }
}

#[test]
fn sound_effect_finishes_on_its_own() {
    let mut engine = demo_engine();
    let sfx = engine.subproject().find_group_by_name(DEMO_SFX_GROUP).unwrap();
    assert!(engine.note_on(TriggerTable::sfx(sfx), 0, 60, 127, 15));
    render(&mut engine, 0.1);
    assert_eq!(engine.voice_count(), 1);
    render(&mut engine, 1.0);
    assert_eq!(engine.voice_count(), 0);
}

#[test]
fn studio_change_applies_at_its_tick() {
    let mut engine = demo_engine();
    let quad = StudioSetup {
        aux_a: AuxSetup { effect: EffectKind::ReverbStd(ReverbParams::default()), level: 0.5 },
        channel_mask: ChannelMask::QUAD,
        ..StudioSetup::default()
    };
    engine.schedule(Event::new(10, EventPayload::SetStudio(quad)));

    // 80 frames per tick at 16 kHz and 200 Hz.
    let out = render(&mut engine, 0.1);
    assert_eq!(out[0].channels, 2);
    assert_eq!(out[799].channels, 2);
    assert_eq!(out[800].channels, 4);
}

#[test]
fn saved_project_file_reloads() {
    let path = std::env::temp_dir().join(format!("amuse-demo-{}.amsp", std::process::id()));
    let source = Controller::demo(settings());
    source.save_project_file(&path).unwrap();

    let mut loaded = Controller::new(settings());
    let problems = loaded.load_project_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert!(problems.is_empty());

    let events = demo_events(loaded.subproject(), loaded.settings().tick_rate);
    assert_eq!(loaded.render_frames(&events, 4000), source.render_frames(&events, 4000));
}
