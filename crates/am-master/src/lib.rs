//! Headless controller for the amuse SoundMacro runtime.
//!
//! Owns a subproject and its settings, and provides the loading, real-time
//! playback and offline rendering API the CLI is built on.

mod demo;
mod error;
mod settings;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use am_audio::{AudioOutput, CpalOutput};
use am_engine::{Engine, EngineCommand};
use am_ir::{BLOCK_SIZE, ConfigError, Event, SampleId, StudioSetup, Subproject, TriggerTable};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

// Re-export common types so callers don't need am-ir/am-engine directly.
pub use am_engine::{Frame, VoiceKey};
pub use am_formats::{frames_to_wav, write_wav, FormatError};
pub use demo::{demo_events, demo_subproject, DEMO_SFX_GROUP, DEMO_SONG_GROUP};
pub use error::ControllerError;
pub use settings::{
    AuxSettings, ChannelLayout, ChorusSettings, DelaySettings, EffectSettings, ReverbSettings,
    Settings, StudioSettings,
};

/// Trigger commands buffered between the caller and the audio thread.
const COMMAND_RING: usize = 1024;

/// Silence written after playback stops so the device drains cleanly.
const TAIL_SECONDS: u32 = 1;

/// Headless controller: owns a subproject and manages playback.
pub struct Controller {
    subproject: Subproject,
    settings: Settings,
    playback: Option<PlaybackHandle>,
}

struct PlaybackHandle {
    stop_signal: Arc<AtomicBool>,
    current_tick: Arc<AtomicU64>,
    active_voices: Arc<AtomicUsize>,
    finished: Arc<AtomicBool>,
    commands: HeapProd<EngineCommand>,
    thread: Option<JoinHandle<()>>,
}

impl Controller {
    pub fn new(settings: Settings) -> Self {
        Self {
            subproject: Subproject::new("Untitled"),
            settings,
            playback: None,
        }
    }

    /// Controller preloaded with the built-in demo subproject.
    pub fn demo(settings: Settings) -> Self {
        let mut controller = Self::new(settings);
        controller.subproject = demo_subproject();
        controller
    }

    // --- Subproject management ---

    pub fn subproject(&self) -> &Subproject {
        &self.subproject
    }

    /// Mutable access for authoring edits. Playing audio keeps the copy it
    /// started with until the next `play`.
    pub fn subproject_mut(&mut self) -> &mut Subproject {
        &mut self.subproject
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Replace the subproject with one decoded from `data`.
    ///
    /// Returns the configuration problems found while loading, including
    /// duplicate entries the loader had to drop.
    pub fn load_project(&mut self, data: &[u8]) -> Result<Vec<ConfigError>, ControllerError> {
        self.stop();
        let (subproject, mut problems) = am_formats::load_subproject(data)?;
        self.subproject = subproject;
        tracing::info!(name = self.subproject.name.as_str(), "subproject loaded");
        for problem in self.validate() {
            if !problems.contains(&problem) {
                problems.push(problem);
            }
        }
        Ok(problems)
    }

    pub fn load_project_file(&mut self, path: &Path) -> Result<Vec<ConfigError>, ControllerError> {
        let data = read(path)?;
        self.load_project(&data)
    }

    pub fn save_project(&self) -> Result<Vec<u8>, ControllerError> {
        Ok(am_formats::save_subproject(&self.subproject)?)
    }

    pub fn save_project_file(&self, path: &Path) -> Result<(), ControllerError> {
        let data = self.save_project()?;
        std::fs::write(path, data).map_err(|source| ControllerError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Decode a WAV file and add it to the subproject as a sample.
    pub fn import_wav(&mut self, data: &[u8], name: &str) -> Result<SampleId, ControllerError> {
        let sample = am_formats::load_wav(data, name)?;
        Ok(self.subproject.add_sample(sample))
    }

    /// Check the subproject, logging each problem.
    pub fn validate(&self) -> Vec<ConfigError> {
        let problems = self.subproject.validate();
        for problem in &problems {
            tracing::warn!(%problem, "subproject configuration problem");
        }
        problems
    }

    // --- Real-time playback ---

    /// Start the audio thread with a fresh engine over a snapshot of the
    /// subproject. Triggers are delivered through the `note_*` methods.
    pub fn play(&mut self) {
        self.play_events(Vec::new());
    }

    /// Like [`play`](Self::play), with `events` scheduled from tick 0.
    pub fn play_events(&mut self, events: Vec<Event>) {
        self.stop();

        let subproject = self.subproject.clone();
        let settings = self.settings.clone();
        let stop_signal = Arc::new(AtomicBool::new(false));
        let current_tick = Arc::new(AtomicU64::new(0));
        let active_voices = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        let (commands, consumer) = HeapRb::<EngineCommand>::new(COMMAND_RING).split();

        let shared = Shared {
            stop: stop_signal.clone(),
            tick: current_tick.clone(),
            voices: active_voices.clone(),
            done: finished.clone(),
        };

        let thread = std::thread::spawn(move || {
            audio_thread(subproject, settings, events, consumer, shared);
        });

        self.playback = Some(PlaybackHandle {
            stop_signal,
            current_tick,
            active_voices,
            finished,
            commands,
            thread: Some(thread),
        });
    }

    pub fn stop(&mut self) {
        if let Some(mut pb) = self.playback.take() {
            pb.stop_signal.store(true, Ordering::Relaxed);
            if let Some(handle) = pb.thread.take() {
                let _ = handle.join();
            }
            tracing::info!("playback stopped");
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| !p.finished.load(Ordering::Relaxed))
    }

    /// Control tick the audio thread last reported.
    pub fn current_tick(&self) -> Option<u64> {
        let pb = self.playback.as_ref()?;
        Some(pb.current_tick.load(Ordering::Relaxed))
    }

    pub fn active_voices(&self) -> Option<usize> {
        let pb = self.playback.as_ref()?;
        Some(pb.active_voices.load(Ordering::Relaxed))
    }

    // --- Trigger API ---
    //
    // Each call queues a command for the next tick boundary. `false` means
    // nothing is playing or the ring is full; the trigger is dropped.

    pub fn note_on(&mut self, table: TriggerTable, program: u16, note: u8, velocity: u8, channel: u8) -> bool {
        self.send(EngineCommand::NoteOn { table, program, note, velocity, channel })
    }

    pub fn note_off_voice(&mut self, voice: VoiceKey) -> bool {
        self.send(EngineCommand::NoteOffVoice(voice))
    }

    pub fn note_off(&mut self, channel: u8, note: u8) -> bool {
        self.send(EngineCommand::NoteOff { channel, note })
    }

    pub fn all_notes_off(&mut self) -> bool {
        self.send(EngineCommand::AllNotesOff)
    }

    pub fn set_studio(&mut self, setup: StudioSetup) -> bool {
        self.send(EngineCommand::SetStudio(setup))
    }

    pub fn pitch_wheel(&mut self, channel: u8, value: f32) -> bool {
        self.send(EngineCommand::PitchWheel { channel, value })
    }

    pub fn select_song(&mut self, song_id: u16) -> bool {
        self.send(EngineCommand::SelectSong(song_id))
    }

    pub fn send(&mut self, command: EngineCommand) -> bool {
        let Some(pb) = self.playback.as_mut() else {
            return false;
        };
        if pb.commands.try_push(command).is_err() {
            tracing::debug!(?command, "command ring full; trigger dropped");
            return false;
        }
        true
    }

    // --- Offline rendering ---

    /// Engine over a copy of the subproject, with the configured studio.
    pub fn engine(&self, sample_rate: u32) -> Engine {
        let mut engine = Engine::new(self.subproject.clone(), self.settings.engine_config(sample_rate));
        engine.set_studio(self.settings.studio_setup());
        engine
    }

    /// Render `frames` frames at the configured sample rate with `events`
    /// scheduled.
    pub fn render_frames(&self, events: &[Event], frames: usize) -> Vec<Frame> {
        let mut engine = self.engine(self.settings.sample_rate);
        for event in events {
            engine.schedule(event.clone());
        }
        let mut out = vec![Frame::default(); frames];
        engine.render(&mut out);
        out
    }

    pub fn render_to_wav(&self, events: &[Event], seconds: f32) -> Vec<u8> {
        let sample_rate = self.settings.sample_rate;
        let frames = (sample_rate as f32 * seconds.max(0.0)) as usize;
        frames_to_wav(&self.render_frames(events, frames), sample_rate)
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read(path: &Path) -> Result<Vec<u8>, ControllerError> {
    std::fs::read(path).map_err(|source| ControllerError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// State the audio thread reports back to the controller.
struct Shared {
    stop: Arc<AtomicBool>,
    tick: Arc<AtomicU64>,
    voices: Arc<AtomicUsize>,
    done: Arc<AtomicBool>,
}

fn audio_thread(
    subproject: Subproject,
    settings: Settings,
    events: Vec<Event>,
    mut commands: HeapCons<EngineCommand>,
    shared: Shared,
) {
    let studio = settings.studio_setup();
    let (mut output, consumer) = match CpalOutput::new(studio.channel_mask.count()) {
        Ok(opened) => opened,
        Err(err) => {
            tracing::error!(%err, "could not open audio output");
            shared.done.store(true, Ordering::Relaxed);
            return;
        }
    };

    let sample_rate = output.sample_rate();
    if sample_rate != settings.sample_rate {
        tracing::info!(device = sample_rate, configured = settings.sample_rate, "using device sample rate");
    }
    let mut engine = Engine::new(subproject, settings.engine_config(sample_rate));
    engine.set_studio(studio);
    for event in events {
        engine.schedule(event);
    }

    if let Err(err) = output.build_stream(consumer) {
        tracing::error!(%err, "could not start audio stream");
        shared.done.store(true, Ordering::Relaxed);
        return;
    }
    if let Err(err) = output.start() {
        tracing::error!(%err, "could not start playback");
        shared.done.store(true, Ordering::Relaxed);
        return;
    }
    tracing::info!(sample_rate, "playback started");

    let mut block = [Frame::for_mask(studio.channel_mask); BLOCK_SIZE];
    while !shared.stop.load(Ordering::Relaxed) {
        while let Some(command) = commands.try_pop() {
            engine.send(command);
        }

        render_block(&mut engine, &mut block);
        output.write_spin(&block);

        shared.tick.store(engine.tick_count(), Ordering::Relaxed);
        shared.voices.store(engine.voice_count(), Ordering::Relaxed);
    }

    let silence = [Frame::for_mask(studio.channel_mask); BLOCK_SIZE];
    for _ in 0..(sample_rate * TAIL_SECONDS) as usize / BLOCK_SIZE {
        output.write_spin(&silence);
    }
    let _ = output.stop();
    tracing::debug!(underruns = output.underruns(), ticks = engine.tick_count(), "audio thread finished");
    shared.done.store(true, Ordering::Relaxed);
}

#[cfg(feature = "alloc_check")]
fn render_block(engine: &mut Engine, block: &mut [Frame]) {
    assert_no_alloc::assert_no_alloc(|| engine.render(block));
}

#[cfg(not(feature = "alloc_check"))]
fn render_block(engine: &mut Engine, block: &mut [Frame]) {
    engine.render(block);
}

#[cfg(test)]
mod tests {
    use super::*;
    use am_ir::{
        Command, EventPayload, Group, GroupId, LoopMode, ObjectRef, PageEntry, Sample, SongGroup,
        SoundMacro,
    };

    fn tone_controller() -> (Controller, GroupId) {
        let mut controller = Controller::new(Settings { sample_rate: 8000, ..Settings::default() });
        let sp = controller.subproject_mut();
        let pcm: Vec<i16> = (0..64).map(|i| if i < 32 { 8000 } else { -8000 }).collect();
        let sample = sp.add_sample(Sample::from_pcm16("sq", pcm, 8000, 60).with_loop(0, 64));
        let tone = sp.add_sound_macro(SoundMacro::new(
            "tone",
            vec![
                Command::StartSample { sample, mode: LoopMode::Loop, offset: 0 },
                Command::WaitTicks { ticks: 0, key_off: true, sample_end: false, random: false },
                Command::End,
            ],
        ));
        let mut song = SongGroup::new("tones");
        song.normal.replace(PageEntry {
            program: 0,
            object: ObjectRef::SoundMacro(tone),
            priority: 64,
            max_voices: 0,
        });
        let group = sp.add_group(Group::Song(song));
        (controller, group)
    }

    #[test]
    fn triggers_without_playback_are_dropped() {
        let (mut controller, group) = tone_controller();
        assert!(!controller.is_playing());
        assert!(!controller.note_on(TriggerTable::normal(group), 0, 60, 100, 0));
        assert!(!controller.all_notes_off());
        assert_eq!(controller.current_tick(), None);
    }

    #[test]
    fn render_frames_is_silent_without_events() {
        let (controller, _) = tone_controller();
        let frames = controller.render_frames(&[], 800);
        assert_eq!(frames.len(), 800);
        assert!(frames.iter().all(Frame::is_silent));
    }

    #[test]
    fn demo_renders_sound() {
        let controller = Controller::demo(Settings { sample_rate: 16000, ..Settings::default() });
        let events = demo_events(controller.subproject(), controller.settings().tick_rate);
        let frames = controller.render_frames(&events, 16000);
        assert!(frames.iter().any(|f| !f.is_silent()));
    }

    #[test]
    fn render_to_wav_has_expected_length() {
        let controller = Controller::demo(Settings { sample_rate: 8000, ..Settings::default() });
        let wav = controller.render_to_wav(&[], 0.5);
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(wav.len(), 44 + 4000 * 4);
    }

    #[test]
    fn project_round_trip_through_controller() {
        let source = Controller::demo(Settings::default());
        let bytes = source.save_project().unwrap();

        let mut loaded = Controller::default();
        let problems = loaded.load_project(&bytes).unwrap();
        assert!(problems.is_empty());
        assert_eq!(loaded.subproject(), source.subproject());
        assert!(loaded.validate().is_empty());
    }

    #[test]
    fn load_returns_dropped_duplicate_programs() {
        let mut sp = Subproject::new("dups");
        let m = sp.add_sound_macro(SoundMacro::new("m", vec![Command::End]));
        let mut song = SongGroup::new("song");
        for (program, priority) in [(3, 0x41), (4, 0x5a)] {
            song.normal
                .insert(PageEntry { program, object: ObjectRef::SoundMacro(m), priority, max_voices: 2 })
                .unwrap();
        }
        sp.add_group(Group::Song(song));
        let mut bytes = am_formats::save_subproject(&sp).unwrap();

        // Renumber program 4 to 3 in the saved page table.
        let entry = [4, 0, 0, 0, 0, 0x5a, 2];
        let at = bytes.windows(entry.len()).position(|w| w == entry).unwrap();
        bytes[at] = 3;

        let mut controller = Controller::default();
        let problems = controller.load_project(&bytes).unwrap();
        assert!(problems
            .iter()
            .any(|p| matches!(p, ConfigError::DuplicateProgram { program: 3, .. })));
    }

    #[test]
    fn corrupt_project_is_reported() {
        let mut controller = Controller::default();
        let err = controller.load_project(b"nope").unwrap_err();
        assert!(matches!(err, ControllerError::Format(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let mut controller = Controller::default();
        let err = controller.load_project_file(Path::new("/nonexistent/demo.amsp")).unwrap_err();
        assert!(matches!(err, ControllerError::Io { .. }));
        assert!(err.to_string().contains("demo.amsp"));
    }

    #[test]
    fn imported_wav_becomes_a_sample() {
        let mut controller = Controller::default();
        let wav = frames_to_wav(&[Frame::stereo(100, 100); 32], 22050);
        let id = controller.import_wav(&wav, "imported").unwrap();
        let sample = controller.subproject().sample(id).unwrap();
        assert_eq!(sample.sample_rate, 22050);
        assert_eq!(sample.len(), 32);
    }

    #[test]
    fn scheduled_note_renders_until_released() {
        let (controller, group) = tone_controller();
        let events = [
            Event::new(
                0,
                EventPayload::NoteOn {
                    table: TriggerTable::normal(group),
                    program: 0,
                    note: 60,
                    velocity: 127,
                    channel: 0,
                },
            ),
            Event::new(4, EventPayload::NoteOff { channel: 0, note: 60 }),
        ];
        // 40 frames per tick at 8 kHz.
        let frames = controller.render_frames(&events, 800);
        assert!(frames[..160].iter().any(|f| !f.is_silent()));
        assert!(frames[400..].iter().all(Frame::is_silent));
    }
}
