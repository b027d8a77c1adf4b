use am_engine::{Engine, EngineConfig, Frame};
use am_ir::{
    Adsr, Command, Group, LoopMode, ObjectRef, PageEntry, Sample, SongGroup, SoundMacro,
    Subproject, TriggerTable,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn pad_project() -> (Subproject, TriggerTable) {
    let mut sp = Subproject::new("bench");
    let pcm: Vec<i16> = (0..4096)
        .map(|i| ((i as f32 * 0.05).sin() * 12000.0) as i16)
        .collect();
    let sample = sp.add_sample(Sample::from_pcm16("saw", pcm, 32000, 60).with_loop(0, 4096));
    let adsr = sp.add_adsr(Adsr::new("pad", 20, 100, 0.7, 200));
    let m = sp.add_sound_macro(SoundMacro::new(
        "pad",
        vec![
            Command::SetAdsr { adsr },
            Command::Vibrato { semitones: 0, cents: 20, period_ms: 250 },
            Command::StartSample { sample, mode: LoopMode::Loop, offset: 0 },
            Command::Panning { pan: 40, ms: 500 },
            Command::WaitTicks { ticks: 0, key_off: true, sample_end: false, random: false },
            Command::End,
        ],
    ));
    let mut song = SongGroup::new("song");
    song.normal
        .insert(PageEntry { program: 0, object: ObjectRef::SoundMacro(m), priority: 64, max_voices: 0 })
        .unwrap();
    let g = sp.add_group(Group::Song(song));
    (sp, TriggerTable::normal(g))
}

fn bench_render(c: &mut Criterion) {
    let (sp, table) = pad_project();
    let mut engine = Engine::new(sp, EngineConfig { max_voices: 32, ..EngineConfig::default() });
    for note in 0..32u8 {
        engine.trigger(table, 0, 40 + note, 100, note % 16);
    }
    let mut out = vec![Frame::default(); 1024];
    c.bench_function("render 32 voices x 1024 frames", |b| {
        b.iter(|| {
            engine.render(black_box(&mut out));
        })
    });
}

fn bench_tick(c: &mut Criterion) {
    let (sp, table) = pad_project();
    let mut engine = Engine::new(sp, EngineConfig::default());
    for note in 0..64u8 {
        engine.trigger(table, 0, 30 + note, 100, 0);
    }
    c.bench_function("tick 64 voices", |b| b.iter(|| engine.tick()));
}

criterion_group!(benches, bench_render, bench_tick);
criterion_main!(benches);
