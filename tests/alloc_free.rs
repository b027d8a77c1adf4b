//! Allocation-free render path tests.
//!
//! These tests verify that `Engine::render()` does not allocate once the
//! engine is warmed up: the studio effects are built on the first tick, and
//! every later tick, trigger, steal, child spawn and release must run
//! without touching the heap.
//!
//! Just run `cargo test`; no feature flags needed.

use assert_no_alloc::{assert_no_alloc, AllocDisabler};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

use am_engine::{Engine, EngineConfig, Frame};
use am_ir::{
    AuxSetup, ChannelMask, ChorusParams, DelayParams, EffectKind, ReverbParams, StudioSetup,
    TriggerTable,
};
use am_master::{demo_events, demo_subproject, DEMO_SONG_GROUP};

const SAMPLE_RATE: u32 = 32000;

fn studio(a: EffectKind, b: EffectKind, channel_mask: ChannelMask) -> StudioSetup {
    StudioSetup {
        aux_a: AuxSetup { effect: a, level: 0.7 },
        aux_b: AuxSetup { effect: b, level: 0.5 },
        master_volume: 0.9,
        channel_mask,
    }
}

/// Render the demo pattern for `seconds`, aborting on any heap allocation
/// after a one-block warm-up.
fn assert_demo_alloc_free(setup: StudioSetup, max_voices: usize, seconds: u32) {
    let subproject = demo_subproject();
    let events = demo_events(&subproject, EngineConfig::default().tick_rate);
    let config = EngineConfig { sample_rate: SAMPLE_RATE, max_voices, seed: 3, ..EngineConfig::default() };
    let mut engine = Engine::new(subproject, config);
    engine.set_studio(setup);
    for event in events {
        engine.schedule(event);
    }

    let mut block = [Frame::default(); 256];
    engine.render(&mut block);

    assert_no_alloc(|| {
        for _ in 0..(SAMPLE_RATE * seconds) as usize / block.len() {
            engine.render(&mut block);
        }
    });
}

#[test]
fn demo_with_reverb_and_chorus_alloc_free() {
    let setup = studio(
        EffectKind::ReverbStd(ReverbParams::default()),
        EffectKind::Chorus(ChorusParams::default()),
        ChannelMask::STEREO,
    );
    assert_demo_alloc_free(setup, 64, 3);
}

#[test]
fn demo_surround_with_hq_reverb_and_delay_alloc_free() {
    let setup = studio(
        EffectKind::ReverbHi(ReverbParams { crosstalk: 0.4, ..ReverbParams::default() }),
        EffectKind::Delay(DelayParams::default()),
        ChannelMask::SURROUND_7_1,
    );
    assert_demo_alloc_free(setup, 64, 3);
}

#[test]
fn voice_stealing_alloc_free() {
    // Four voices for a pattern that wants far more: every tick steals.
    assert_demo_alloc_free(StudioSetup::default(), 4, 3);
}

#[test]
fn live_triggers_alloc_free() {
    let subproject = demo_subproject();
    let song = subproject.find_group_by_name(DEMO_SONG_GROUP).unwrap();
    let config = EngineConfig { sample_rate: SAMPLE_RATE, max_voices: 16, ..EngineConfig::default() };
    let mut engine = Engine::new(subproject, config);
    let mut block = [Frame::default(); 256];
    engine.render(&mut block);

    assert_no_alloc(|| {
        for i in 0..200u32 {
            let note = 48 + (i % 24) as u8;
            engine.note_on(TriggerTable::normal(song), i as u16 % 2, note, 100, (i % 4) as u8);
            if i % 3 == 0 {
                engine.note_off((i % 4) as u8, note);
            }
            if i % 50 == 49 {
                engine.all_notes_off();
            }
            engine.render(&mut block);
        }
    });
}
