//! The engine: trigger API, control tick and render loop.
//!
//! Commands and scheduled events are only applied at tick boundaries. Each
//! tick runs every voice's SoundMacro, applies the structure requests it
//! produced, updates per-voice control values and reclaims finished voices.
//! Between ticks the engine renders audio in blocks of at most
//! [`BLOCK_SIZE`] frames.

use alloc::boxed::Box;
use alloc::vec::Vec;

use am_ir::{Event, EventPayload, StudioSetup, Subproject, TriggerTable, BLOCK_SIZE};
use arrayvec::ArrayVec;
use heapless::Deque;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use crate::dispatcher::Dispatcher;
use crate::envelope_state::{EnvelopeScaling, TimeCentsScaling};
use crate::event_queue::EventQueue;
use crate::frame::Frame;
use crate::interpreter::{self, Cursor, ExecEnv, MacroRequest, Outcome, DEFAULT_BUDGET, MAX_REQUESTS};
use crate::mixer::Mixer;
use crate::resolver::MAX_LAYERS;
use crate::studio::Studio;
use crate::voice::{Timing, Voice, VoiceInit, VoiceKey};
use crate::voice_pool::VoicePool;

/// Trigger commands queued per tick.
pub const COMMAND_QUEUE: usize = 256;

/// Engine construction parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Control ticks per second.
    pub tick_rate: u32,
    /// Voices that may sound at once (fading stolen voices excluded).
    pub max_voices: usize,
    /// Seed for the macro random generator.
    pub seed: u64,
    /// Instructions per voice per tick.
    pub instruction_budget: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            tick_rate: 200,
            max_voices: 64,
            seed: 0,
            instruction_budget: DEFAULT_BUDGET,
        }
    }
}

/// A queued trigger-API call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EngineCommand {
    NoteOn {
        table: TriggerTable,
        program: u16,
        note: u8,
        velocity: u8,
        channel: u8,
    },
    NoteOffVoice(VoiceKey),
    NoteOff { channel: u8, note: u8 },
    AllNotesOff,
    SetStudio(StudioSetup),
    /// Pitch wheel for a MIDI channel, -1..=1.
    PitchWheel { channel: u8, value: f32 },
    SelectSong(u16),
}

/// The SoundMacro runtime.
pub struct Engine {
    subproject: Subproject,
    timing: Timing,
    budget: u16,
    voices: VoicePool,
    dispatcher: Dispatcher,
    studio: Studio,
    mixer: Mixer,
    events: EventQueue,
    commands: Deque<EngineCommand, COMMAND_QUEUE>,
    rng: Pcg32,
    scaling: Box<dyn EnvelopeScaling + Send>,
    requests: ArrayVec<MacroRequest, MAX_REQUESTS>,
    pending: Vec<(VoiceKey, MacroRequest)>,
    keys: Vec<VoiceKey>,
    tick: u64,
    /// Output samples left before the next tick.
    until_tick: f64,
}

impl Engine {
    pub fn new(subproject: Subproject, config: EngineConfig) -> Self {
        let timing = Timing {
            sample_rate: config.sample_rate.max(1),
            tick_rate: config.tick_rate.max(1),
        };
        let max_voices = config.max_voices.max(1);
        tracing::debug!(
            sample_rate = timing.sample_rate,
            tick_rate = timing.tick_rate,
            max_voices,
            "engine created"
        );
        Self {
            subproject,
            timing,
            budget: config.instruction_budget.max(1),
            voices: VoicePool::new(max_voices),
            dispatcher: Dispatcher::new(),
            studio: Studio::new(StudioSetup::default(), timing.sample_rate),
            mixer: Mixer::new(BLOCK_SIZE),
            events: EventQueue::new(),
            commands: Deque::new(),
            rng: Pcg32::seed_from_u64(config.seed),
            scaling: Box::new(TimeCentsScaling),
            requests: ArrayVec::new(),
            pending: Vec::with_capacity(MAX_REQUESTS * 4),
            keys: Vec::with_capacity(max_voices * 2),
            tick: 0,
            until_tick: 0.0,
        }
    }

    /// Replace the envelope scaling used by `SetAdsr`.
    pub fn set_envelope_scaling(&mut self, scaling: Box<dyn EnvelopeScaling + Send>) {
        self.scaling = scaling;
    }

    // --- Accessors ---

    pub fn subproject(&self) -> &Subproject {
        &self.subproject
    }

    /// Authoring-side edits. Running voices hold ids, so replaced objects
    /// take effect on their next lookup.
    pub fn subproject_mut(&mut self) -> &mut Subproject {
        &mut self.subproject
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn studio(&self) -> &Studio {
        &self.studio
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn voice(&self, key: VoiceKey) -> Option<&Voice> {
        self.voices.get(key)
    }

    pub fn voices(&self) -> impl Iterator<Item = (VoiceKey, &Voice)> {
        self.voices.iter()
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Control ticks processed so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    // --- Queued trigger API ---

    fn enqueue(&mut self, command: EngineCommand) -> bool {
        if self.commands.push_back(command).is_err() {
            tracing::debug!(?command, "command queue full, dropped");
            return false;
        }
        true
    }

    /// Queue a note-on for the next tick.
    pub fn note_on(&mut self, table: TriggerTable, program: u16, note: u8, velocity: u8, channel: u8) -> bool {
        self.enqueue(EngineCommand::NoteOn {
            table,
            program,
            note,
            velocity,
            channel,
        })
    }

    pub fn note_off_voice(&mut self, voice: VoiceKey) -> bool {
        self.enqueue(EngineCommand::NoteOffVoice(voice))
    }

    pub fn note_off(&mut self, channel: u8, note: u8) -> bool {
        self.enqueue(EngineCommand::NoteOff { channel, note })
    }

    pub fn all_notes_off(&mut self) -> bool {
        self.enqueue(EngineCommand::AllNotesOff)
    }

    pub fn set_studio(&mut self, setup: StudioSetup) -> bool {
        self.enqueue(EngineCommand::SetStudio(setup))
    }

    pub fn pitch_wheel(&mut self, channel: u8, value: f32) -> bool {
        self.enqueue(EngineCommand::PitchWheel { channel, value })
    }

    pub fn select_song(&mut self, song_id: u16) -> bool {
        self.enqueue(EngineCommand::SelectSong(song_id))
    }

    /// Queue any command.
    pub fn send(&mut self, command: EngineCommand) -> bool {
        self.enqueue(command)
    }

    /// Schedule an event for a future tick. Allocates; not for the
    /// audio thread.
    pub fn schedule(&mut self, event: Event) {
        self.events.push(event);
    }

    // --- Immediate operations ---

    /// Start the voices for a trigger now and return their handles.
    pub fn trigger(
        &mut self,
        table: TriggerTable,
        program: u16,
        note: u8,
        velocity: u8,
        channel: u8,
    ) -> ArrayVec<VoiceKey, MAX_LAYERS> {
        let mut started = ArrayVec::new();
        let Some(plan) = self
            .dispatcher
            .plan(&self.subproject, table, program, note, velocity, channel)
        else {
            return started;
        };
        let wheel = self.dispatcher.channel(channel).wheel;
        for layer in &plan.layers {
            let init = VoiceInit {
                pool: plan.pool,
                macro_id: layer.macro_id,
                step: 0,
                priority: plan.layer_priority(layer),
                channel,
                trigger_note: note,
                key: (note as i16 + layer.transpose as i16).clamp(0, 127) as u8,
                velocity: layer.velocity,
                pan: (layer.pan as i16 + plan.pan as i16).clamp(-64, 63) as i8,
                span: layer.span,
                volume: layer.volume.min(127) as f32 / 127.0 * plan.volume,
                aux_a: plan.aux_a,
                aux_b: plan.aux_b,
                parent: None,
            };
            let mut voice = Voice::new(init, &self.timing);
            voice.max_voices = plan.max_voices;
            voice.set_wheel(wheel);
            if let Some(key) = self.voices.allocate(voice, plan.max_voices).key() {
                started.push(key);
            }
        }
        started
    }

    /// Release every voice started by (`channel`, `note`).
    pub fn release_note(&mut self, channel: u8, note: u8) {
        for (_, voice) in self.voices.iter_mut() {
            if voice.channel == channel && voice.trigger_note == note {
                voice.key_off();
            }
        }
    }

    /// Release one voice. Stale handles are ignored.
    pub fn release_voice(&mut self, key: VoiceKey) {
        if let Some(voice) = self.voices.get_mut(key) {
            voice.key_off();
        }
    }

    pub fn release_all(&mut self) {
        for (_, voice) in self.voices.iter_mut() {
            voice.key_off();
        }
    }

    /// Drop every voice and pending command immediately.
    pub fn reset(&mut self) {
        self.voices.clear();
        self.commands.clear();
        self.events.clear();
        self.pending.clear();
        self.studio.aux_a.reset();
        self.studio.aux_b.reset();
    }

    fn apply_studio(&mut self, setup: StudioSetup) {
        // Switching effect kinds builds new delay lines.
        #[cfg(feature = "alloc_check")]
        assert_no_alloc::permit_alloc(|| self.studio.apply(setup));
        #[cfg(not(feature = "alloc_check"))]
        self.studio.apply(setup);
    }

    fn apply_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::NoteOn {
                table,
                program,
                note,
                velocity,
                channel,
            } => {
                self.trigger(table, program, note, velocity, channel);
            }
            EngineCommand::NoteOffVoice(key) => self.release_voice(key),
            EngineCommand::NoteOff { channel, note } => self.release_note(channel, note),
            EngineCommand::AllNotesOff => self.release_all(),
            EngineCommand::SetStudio(setup) => self.apply_studio(setup),
            EngineCommand::PitchWheel { channel, value } => {
                self.dispatcher.set_pitch_wheel(channel, value);
                let value = self.dispatcher.channel(channel).wheel;
                for (_, voice) in self.voices.iter_mut() {
                    if voice.channel == channel {
                        voice.set_wheel(value);
                    }
                }
            }
            EngineCommand::SelectSong(id) => self.dispatcher.select_song(id),
        }
    }

    fn apply_event(&mut self, payload: EventPayload) {
        match payload {
            EventPayload::NoteOn {
                table,
                program,
                note,
                velocity,
                channel,
            } => {
                self.trigger(table, program, note, velocity, channel);
            }
            EventPayload::NoteOff { channel, note } => self.release_note(channel, note),
            EventPayload::AllNotesOff => self.release_all(),
            EventPayload::SetStudio(setup) => self.apply_studio(setup),
        }
    }

    // --- Tick ---

    /// Run one control tick.
    pub fn tick(&mut self) {
        let due = self.events.drain_until(self.tick);
        for i in due {
            if let Some(payload) = self.events.get(i).map(|e| e.payload.clone()) {
                self.apply_event(payload);
            }
        }
        while let Some(command) = self.commands.pop_front() {
            self.apply_command(command);
        }

        self.run_macros();
        self.apply_requests();

        let mask = self.studio.channel_mask();
        for (_, voice) in self.voices.iter_mut() {
            voice.update_control(&self.subproject, &self.timing, self.mixer.pan_law(), mask);
        }
        let reaped = self.voices.reap();
        if reaped > 0 {
            tracing::trace!(reaped, tick = self.tick, "voices reclaimed");
        }
        self.tick += 1;
    }

    fn run_macros(&mut self) {
        self.keys.clear();
        self.keys.extend(self.voices.keys());
        for i in 0..self.keys.len() {
            let key = self.keys[i];
            let Some(voice) = self.voices.get_mut(key) else {
                continue;
            };
            if voice.stolen {
                continue;
            }
            self.requests.clear();
            let mut env = ExecEnv {
                subproject: &self.subproject,
                rng: &mut self.rng,
                requests: &mut self.requests,
                timing: self.timing,
                scaling: &*self.scaling,
                budget: self.budget,
            };
            if let Outcome::Aborted(reason) = interpreter::step(voice, &mut env) {
                tracing::warn!(%reason, ?key, "voice aborted");
                voice.force_release();
            }
            for request in self.requests.drain(..) {
                if self.pending.len() < self.pending.capacity() {
                    self.pending.push((key, request));
                } else {
                    tracing::debug!(?request, "request backlog full, dropped");
                }
            }
        }
    }

    fn apply_requests(&mut self) {
        for i in 0..self.pending.len() {
            let (key, request) = self.pending[i];
            match request {
                MacroRequest::SetPriority(priority) => {
                    if let Some(voice) = self.voices.get_mut(key) {
                        voice.priority = priority;
                    }
                }
                MacroRequest::ReleaseChildren => {
                    let children = match self.voices.get(key) {
                        Some(voice) => voice.children.clone(),
                        None => continue,
                    };
                    for child in children {
                        self.release_voice(child);
                    }
                }
                MacroRequest::Spawn {
                    target,
                    note,
                    priority_offset,
                } => self.spawn_child(key, target, note, priority_offset),
            }
        }
        self.pending.clear();
    }

    fn spawn_child(&mut self, parent_key: VoiceKey, target: Cursor, note: u8, priority_offset: i8) {
        let Some(parent) = self.voices.get(parent_key) else {
            return;
        };
        let init = VoiceInit {
            pool: parent.pool,
            macro_id: target.macro_id,
            step: target.step,
            priority: (parent.priority as i16 + priority_offset as i16).clamp(0, 127) as u8,
            channel: parent.channel,
            trigger_note: parent.trigger_note,
            key: note,
            velocity: parent.velocity,
            pan: parent.pan() as i8,
            span: parent.span() as i8,
            volume: parent.entry_volume(),
            aux_a: parent.aux_a,
            aux_b: parent.aux_b,
            parent: Some(parent_key),
        };
        let max_voices = parent.max_voices;
        let mut child = Voice::new(init, &self.timing);
        child.max_voices = max_voices;
        let Some(child_key) = self.voices.allocate(child, max_voices).key() else {
            return;
        };
        if let Some(parent) = self.voices.get_mut(parent_key) {
            parent.children.retain(|k| *k != child_key);
            if parent.children.try_push(child_key).is_err() {
                tracing::debug!(?parent_key, "child list full; child not tracked");
            }
        }
    }

    // --- Rendering ---

    /// Fill `out`, running control ticks as output time passes.
    pub fn render(&mut self, out: &mut [Frame]) {
        let mut done = 0;
        while done < out.len() {
            if self.until_tick <= 0.0 {
                self.tick();
                self.until_tick += self.timing.sample_rate as f64 / self.timing.tick_rate as f64;
            }
            let to_tick = libm::ceil(self.until_tick) as usize;
            let n = (out.len() - done).min(BLOCK_SIZE).min(to_tick.max(1));
            self.render_block(&mut out[done..done + n]);
            self.until_tick -= n as f64;
            done += n;
        }
    }

    /// Render a single frame.
    pub fn render_frame(&mut self) -> Frame {
        let mut frame = [Frame::default()];
        self.render(&mut frame);
        frame[0]
    }

    fn render_block(&mut self, out: &mut [Frame]) {
        let mask = self.studio.channel_mask();
        self.mixer.begin(out.len());
        for (_, voice) in self.voices.iter_mut() {
            let gains = voice.gains;
            let sends = (voice.aux_a, voice.aux_b);
            for f in 0..out.len() {
                let value = voice.render(&self.subproject);
                self.mixer.mix(f, value, &gains, sends, mask);
            }
        }
        self.mixer.finish(&mut self.studio, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope_state::AdsrPhase;
    use alloc::vec;
    use am_ir::{
        Adsr, Command, Group, GroupId, Keymap, KeymapEntry, LoopMode, MacroTarget, ObjectRef,
        PageEntry, Sample, SongGroup, SoundMacro, SoundMacroId,
    };

    const CONFIG: EngineConfig = EngineConfig {
        sample_rate: 8000,
        tick_rate: 200,
        max_voices: 16,
        seed: 1,
        instruction_budget: 64,
    };

    fn held(sample: am_ir::SampleId, adsr: Option<am_ir::AdsrId>) -> Vec<Command> {
        let mut cmds = vec![];
        if let Some(adsr) = adsr {
            cmds.push(Command::SetAdsr { adsr });
        }
        cmds.push(Command::StartSample { sample, mode: LoopMode::Loop, offset: 0 });
        cmds.push(Command::WaitTicks { ticks: 0, key_off: true, sample_end: false, random: false });
        cmds.push(Command::End);
        cmds
    }

    /// Program 3 → keymap {60: M1}; program 5 → M2 directly with cap 1.
    fn project() -> (Subproject, GroupId, SoundMacroId) {
        let mut sp = Subproject::new("sp");
        let sample = sp.add_sample(Sample::from_pcm16("s", vec![8000; 64], 8000, 60).with_loop(0, 64));
        let adsr = sp.add_adsr(Adsr::new("a", 5, 5, 0.8, 20));
        let m1 = sp.add_sound_macro(SoundMacro::new("m1", held(sample, Some(adsr))));
        let m2 = sp.add_sound_macro(SoundMacro::new("m2", held(sample, Some(adsr))));
        let mut km = Keymap::new("k");
        km.set(60, Some(KeymapEntry { macro_id: m1, ..Default::default() }));
        let k = sp.add_keymap(km);
        let mut song = SongGroup::new("song");
        song.normal
            .insert(PageEntry { program: 3, object: ObjectRef::Keymap(k), priority: 64, max_voices: 8 })
            .unwrap();
        song.normal
            .insert(PageEntry { program: 5, object: ObjectRef::SoundMacro(m2), priority: 5, max_voices: 1 })
            .unwrap();
        let g = sp.add_group(Group::Song(song));
        (sp, g, m1)
    }

    #[test]
    fn keymap_program_starts_one_voice() {
        let (sp, g, m1) = project();
        let mut engine = Engine::new(sp, CONFIG);
        let voices = engine.trigger(TriggerTable::normal(g), 3, 60, 100, 0);
        assert_eq!(voices.len(), 1);
        let v = engine.voice(voices[0]).unwrap();
        assert_eq!(v.macro_id(), Some(m1));
        assert_eq!(v.key, 60);
        assert_eq!(v.velocity, 100);
    }

    #[test]
    fn queued_note_on_applies_at_tick() {
        let (sp, g, _) = project();
        let mut engine = Engine::new(sp, CONFIG);
        assert!(engine.note_on(TriggerTable::normal(g), 3, 60, 100, 0));
        assert_eq!(engine.voice_count(), 0);
        engine.tick();
        assert_eq!(engine.voice_count(), 1);
    }

    /// Program 7 → keymap {60: +0, 62: -2, 64: +2} over base priority 5, cap 1.
    fn steal_project() -> (Subproject, GroupId) {
        let mut sp = Subproject::new("sp");
        let sample = sp.add_sample(Sample::from_pcm16("s", vec![8000; 64], 8000, 60).with_loop(0, 64));
        let adsr = sp.add_adsr(Adsr::new("a", 50, 5, 0.8, 20));
        let m = sp.add_sound_macro(SoundMacro::new("m", held(sample, Some(adsr))));
        let mut km = Keymap::new("k");
        for (key, offset) in [(60, 0), (62, -2), (64, 2)] {
            km.set(key, Some(KeymapEntry { macro_id: m, priority_offset: offset, ..Default::default() }));
        }
        let k = sp.add_keymap(km);
        let mut song = SongGroup::new("song");
        song.normal
            .insert(PageEntry { program: 7, object: ObjectRef::Keymap(k), priority: 5, max_voices: 1 })
            .unwrap();
        let g = sp.add_group(Group::Song(song));
        (sp, g)
    }

    #[test]
    fn priority_steal_scenario() {
        let (sp, g) = steal_project();
        let mut engine = Engine::new(sp, CONFIG);
        let table = TriggerTable::normal(g);

        let a = engine.trigger(table, 7, 60, 100, 0)[0];
        engine.tick();
        assert_eq!(engine.voice(a).unwrap().priority, 5);
        assert_eq!(engine.voice(a).unwrap().phase(), AdsrPhase::Attack);

        // Priority 3 finds nothing to evict.
        assert!(engine.trigger(table, 7, 62, 100, 0).is_empty());
        assert_eq!(engine.voice_count(), 1);
        assert_eq!(engine.voice(a).unwrap().phase(), AdsrPhase::Attack);

        // Priority 7 evicts A, which fades out.
        let b = engine.trigger(table, 7, 64, 100, 0)[0];
        engine.tick();
        assert_eq!(engine.voice(b).unwrap().priority, 7);
        assert_eq!(engine.voice(a).unwrap().phase(), AdsrPhase::Release);
        assert_eq!(engine.voice(b).unwrap().phase(), AdsrPhase::Attack);
    }

    #[test]
    fn macro_adsr_attack_rises_from_silence() {
        let (sp, g) = steal_project();
        let mut engine = Engine::new(sp, CONFIG);
        let v = engine.trigger(TriggerTable::normal(g), 7, 60, 127, 0)[0];
        // 5 ms of a 50 ms attack.
        let mut out = vec![Frame::default(); 40];
        engine.render(&mut out);
        let voice = engine.voice(v).unwrap();
        assert_eq!(voice.phase(), AdsrPhase::Attack);
        let early = voice.adsr.level();
        assert!(early < 0.15, "attack started at {early}");
        engine.render(&mut out);
        assert!(engine.voice(v).unwrap().adsr.level() > early);
    }

    #[test]
    fn note_off_releases_and_voice_is_reaped() {
        let (sp, g, _) = project();
        let mut engine = Engine::new(sp, CONFIG);
        let v = engine.trigger(TriggerTable::normal(g), 3, 60, 100, 0)[0];
        let mut out = vec![Frame::default(); 400];
        engine.render(&mut out);
        assert!(out.iter().any(|f| !f.is_silent()));
        engine.note_off(0, 60);
        engine.render(&mut out);
        assert!(engine.voice(v).is_none());
        engine.render(&mut out);
        assert!(out.iter().all(|f| f.is_silent()));
    }

    #[test]
    fn stale_handle_is_harmless() {
        let (sp, g, _) = project();
        let mut engine = Engine::new(sp, CONFIG);
        let v = engine.trigger(TriggerTable::normal(g), 3, 60, 100, 0)[0];
        engine.reset();
        engine.note_off_voice(v);
        engine.tick();
        assert_eq!(engine.voice_count(), 0);
    }

    #[test]
    fn ticks_follow_output_time() {
        let (sp, _, _) = project();
        let mut engine = Engine::new(sp, CONFIG);
        let mut out = vec![Frame::default(); 400];
        engine.render(&mut out);
        // 40 samples per tick at 8 kHz / 200 Hz.
        assert_eq!(engine.tick_count(), 10);
    }

    #[test]
    fn scheduled_events_fire_on_their_tick() {
        let (sp, g, _) = project();
        let mut engine = Engine::new(sp, CONFIG);
        engine.schedule(Event::new(
            3,
            EventPayload::NoteOn { table: TriggerTable::normal(g), program: 3, note: 60, velocity: 90, channel: 1 },
        ));
        for _ in 0..3 {
            engine.tick();
        }
        assert_eq!(engine.voice_count(), 0);
        engine.tick();
        assert_eq!(engine.voice_count(), 1);
    }

    #[test]
    fn play_macro_spawns_tracked_child() {
        let mut sp = Subproject::new("sp");
        let sample = sp.add_sample(Sample::from_pcm16("s", vec![100; 16], 8000, 60).with_loop(0, 16));
        let child = sp.add_sound_macro(SoundMacro::new("child", held(sample, None)));
        let parent = sp.add_sound_macro(SoundMacro::new(
            "parent",
            vec![
                Command::PlayMacro { add_note: 7, target: MacroTarget::remote(child, 0), priority_offset: 0 },
                Command::WaitTicks { ticks: 2, key_off: false, sample_end: false, random: false },
                Command::SendKeyOff,
                Command::WaitTicks { ticks: 0, key_off: true, sample_end: false, random: false },
            ],
        ));
        let mut song = SongGroup::new("g");
        song.normal
            .insert(PageEntry { program: 0, object: ObjectRef::SoundMacro(parent), priority: 64, max_voices: 0 })
            .unwrap();
        let g = sp.add_group(Group::Song(song));

        let mut engine = Engine::new(sp, CONFIG);
        let p = engine.trigger(TriggerTable::normal(g), 0, 60, 100, 0)[0];
        engine.tick();
        let children = engine.voice(p).unwrap().children.clone();
        assert_eq!(children.len(), 1);
        let c = engine.voice(children[0]).unwrap();
        assert_eq!(c.key, 67);
        assert_eq!(c.parent, Some(p));

        for _ in 0..3 {
            engine.tick();
        }
        assert!(engine.voice(children[0]).map_or(true, |c| c.released));
    }

    #[test]
    fn aborted_voice_is_released_without_stalling() {
        let mut sp = Subproject::new("sp");
        let bad = sp.add_sound_macro(SoundMacro::new(
            "bad",
            vec![Command::SetAdsr { adsr: am_ir::AdsrId(42) }],
        ));
        let mut song = SongGroup::new("g");
        song.normal
            .insert(PageEntry { program: 0, object: ObjectRef::SoundMacro(bad), priority: 64, max_voices: 0 })
            .unwrap();
        let g = sp.add_group(Group::Song(song));
        let mut engine = Engine::new(sp, CONFIG);
        engine.trigger(TriggerTable::normal(g), 0, 60, 100, 0);
        let mut out = vec![Frame::default(); 200];
        engine.render(&mut out);
        assert_eq!(engine.voice_count(), 0);
    }
}
