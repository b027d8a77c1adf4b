//! Voice: one sounding instance of a SoundMacro.
//!
//! Holds the per-voice DSP state the interpreter programs: pitch, volume,
//! pan and span ramps, LFOs, the ADSR and the sample cursor. Control values
//! are updated once per tick; `render` produces one mono sample per output
//! frame.

use am_ir::{
    ChannelMask, CurveId, GroupId, LoopMode, Sample, SampleId, SoundMacroId, Subproject, TableKind,
    FRAC_BITS, MAX_CHANNELS,
};
use arrayvec::ArrayVec;
use slotmap::new_key_type;

use crate::curve_eval::CurveEvaluator;
use crate::envelope_state::{AdsrPhase, AdsrState, FADE_MS};
use crate::frequency::pitch_to_increment;
use crate::interpreter::MacroState;
use crate::mixer::PanLaw;

new_key_type! {
    /// Generational handle to a voice. Stale handles are harmless.
    pub struct VoiceKey;
}

/// Most child voices one voice tracks.
pub const MAX_CHILDREN: usize = 8;

/// The voice-cap namespace a voice is counted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolId {
    pub group: GroupId,
    pub kind: TableKind,
    pub program: u16,
}

/// Output and control rates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    pub sample_rate: u32,
    pub tick_rate: u32,
}

impl Timing {
    /// Milliseconds to control ticks, rounding up so short non-zero
    /// times still take a tick.
    pub fn ms_to_ticks(&self, ms: u32) -> u32 {
        (ms as u64 * self.tick_rate as u64).div_ceil(1000) as u32
    }

    pub fn ms_to_samples(&self, ms: u32) -> u32 {
        (ms as u64 * self.sample_rate as u64 / 1000) as u32
    }

    pub fn samples_per_tick(&self) -> f32 {
        self.sample_rate as f32 / self.tick_rate.max(1) as f32
    }

    pub fn tick_ms(&self) -> f32 {
        1000.0 / self.tick_rate.max(1) as f32
    }
}

/// A control-rate ramp with optional curve shaping.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ramp {
    value: f32,
    from: f32,
    to: f32,
    elapsed: u32,
    duration: u32,
    curve: Option<CurveId>,
    eval: CurveEvaluator,
}

impl Ramp {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            from: value,
            to: value,
            ..Self::default()
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Where the ramp ends up.
    pub fn target(&self) -> f32 {
        self.to
    }

    /// Jump immediately.
    pub fn set(&mut self, value: f32) {
        *self = Self::new(value);
    }

    /// Move to `to` over `ticks`.
    pub fn start(&mut self, to: f32, ticks: u32, curve: Option<CurveId>) {
        if ticks == 0 {
            self.set(to);
            return;
        }
        self.from = self.value;
        self.to = to;
        self.elapsed = 0;
        self.duration = ticks;
        self.curve = curve;
    }

    pub fn is_moving(&self) -> bool {
        self.elapsed < self.duration
    }

    /// Advance one tick.
    pub fn advance(&mut self, subproject: &Subproject) {
        if !self.is_moving() {
            return;
        }
        self.elapsed += 1;
        let x = self.elapsed as f32 / self.duration as f32;
        let t = self.eval.progress(self.curve.and_then(|c| subproject.curve(c)), x);
        self.value = self.from + (self.to - self.from) * t;
    }
}

/// Sine LFO stepped per tick.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lfo {
    depth: f32,
    period_ticks: f32,
    phase: f32,
}

impl Lfo {
    /// Configure depth and period; a zero period disables the LFO.
    pub fn configure(&mut self, depth: f32, period_ms: u32, timing: &Timing) {
        self.depth = depth;
        self.period_ticks = period_ms as f32 / timing.tick_ms();
        self.phase = 0.0;
    }

    /// Current value in `-depth..=depth`, then step.
    pub fn advance(&mut self) -> f32 {
        if self.period_ticks <= 0.0 || self.depth == 0.0 {
            return 0.0;
        }
        let value = self.depth * libm::sinf(self.phase * core::f32::consts::TAU);
        self.phase += 1.0 / self.period_ticks;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        value
    }
}

/// Sample playback cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplePlayback {
    pub sample: SampleId,
    pub mode: LoopMode,
    /// Position in frames with `FRAC_BITS` fractional bits.
    pub position: u64,
    pub increment: u64,
    /// The cursor has left the loop and plays to the end.
    pub exited_loop: bool,
    /// Leave the loop the next time the loop end is reached.
    pub exit_at_loop_end: bool,
}

/// Parameters a new voice starts with.
#[derive(Clone, Copy, Debug)]
pub struct VoiceInit {
    pub pool: PoolId,
    pub macro_id: SoundMacroId,
    pub step: u16,
    pub priority: u8,
    pub channel: u8,
    /// Note as triggered, used to match note-offs.
    pub trigger_note: u8,
    /// Note after transpose.
    pub key: u8,
    pub velocity: u8,
    /// -64..=63
    pub pan: i8,
    /// -64..=63
    pub span: i8,
    /// Entry and channel volume, 0..=1.
    pub volume: f32,
    pub aux_a: f32,
    pub aux_b: f32,
    pub parent: Option<VoiceKey>,
}

/// A single voice.
#[derive(Clone, Debug)]
pub struct Voice {
    pub pool: PoolId,
    /// Cap of the voice's pool, inherited by child voices.
    pub max_voices: u8,
    pub priority: u8,
    /// Allocation order, used to evict the oldest voice on ties.
    pub serial: u64,
    pub channel: u8,
    pub trigger_note: u8,
    pub key: u8,
    pub velocity: u8,
    pub parent: Option<VoiceKey>,
    pub children: ArrayVec<VoiceKey, MAX_CHILDREN>,
    pub macro_state: MacroState,
    /// Key-off received.
    pub released: bool,
    /// Evicted by a higher-priority voice.
    pub stolen: bool,
    pub adsr: AdsrState,
    pitch_adsr: Option<(AdsrState, i8)>,
    /// Base pitch in cents (note × 100 + cents), glides under portamento.
    pitch: Ramp,
    portamento_ticks: u32,
    sweep_offset: f32,
    sweep_step: f32,
    sweep_ticks: u32,
    vibrato: Lfo,
    tremolo: Lfo,
    wheel: f32,
    wheel_range: (u8, u8),
    /// Macro volume, 0..=1.
    volume: Ramp,
    entry_volume: f32,
    pan: Ramp,
    span: Ramp,
    pub aux_a: f32,
    pub aux_b: f32,
    sample: Option<SamplePlayback>,
    sample_ended: bool,
    fade_samples: u32,
    eval: CurveEvaluator,
    /// Per-speaker gains from the pan law.
    pub gains: [f32; MAX_CHANNELS as usize],
    gain: f32,
    gain_target: f32,
    gain_step: f32,
}

impl Voice {
    pub fn new(init: VoiceInit, timing: &Timing) -> Self {
        Self {
            pool: init.pool,
            max_voices: 0,
            priority: init.priority,
            serial: 0,
            channel: init.channel,
            trigger_note: init.trigger_note,
            key: init.key,
            velocity: init.velocity,
            parent: init.parent,
            children: ArrayVec::new(),
            macro_state: MacroState::new(init.macro_id, init.step, init.priority),
            released: false,
            stolen: false,
            adsr: AdsrState::gate(),
            pitch_adsr: None,
            pitch: Ramp::new(init.key as f32 * 100.0),
            portamento_ticks: 0,
            sweep_offset: 0.0,
            sweep_step: 0.0,
            sweep_ticks: 0,
            vibrato: Lfo::default(),
            tremolo: Lfo::default(),
            wheel: 0.0,
            wheel_range: (2, 2),
            volume: Ramp::new(init.velocity as f32 / 127.0),
            entry_volume: init.volume.clamp(0.0, 1.0),
            pan: Ramp::new(init.pan as f32),
            span: Ramp::new(init.span as f32),
            aux_a: init.aux_a,
            aux_b: init.aux_b,
            sample: None,
            sample_ended: false,
            fade_samples: timing.ms_to_samples(FADE_MS).max(1),
            eval: CurveEvaluator::new(),
            gains: [0.0; MAX_CHANNELS as usize],
            gain: 0.0,
            gain_target: 0.0,
            gain_step: 0.0,
        }
    }

    // --- Queries ---

    /// Macro currently executing, if the macro has not ended.
    pub fn macro_id(&self) -> Option<SoundMacroId> {
        self.macro_state.cursor().map(|c| c.macro_id)
    }

    pub fn phase(&self) -> AdsrPhase {
        self.adsr.phase()
    }

    pub fn sample(&self) -> Option<&SamplePlayback> {
        self.sample.as_ref()
    }

    pub fn sample_ended(&self) -> bool {
        self.sample_ended
    }

    /// Base pitch in cents.
    pub fn pitch_cents(&self) -> f32 {
        self.pitch.value()
    }

    pub fn volume(&self) -> f32 {
        self.volume.value()
    }

    pub fn pan(&self) -> f32 {
        self.pan.value()
    }

    pub fn span(&self) -> f32 {
        self.span.value()
    }

    /// Layer and channel volume the voice was started with.
    pub fn entry_volume(&self) -> f32 {
        self.entry_volume
    }

    /// Whether the voice can be reclaimed.
    pub fn is_finished(&self) -> bool {
        if self.adsr.is_shaped() && self.adsr.is_idle() {
            return true;
        }
        // An armed trap keeps the voice alive until its key is released.
        let trapped = self.macro_state.has_trap() && !self.released;
        self.sample.is_none() && self.macro_state.is_done() && !trapped
    }

    /// Counted against pool occupancy.
    pub fn occupies(&self) -> bool {
        !self.stolen
    }

    // --- Lifecycle ---

    /// Key released: trap, envelopes and loop exit.
    pub fn key_off(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.macro_state.on_key_off();

        let mode = self.sample.map(|s| s.mode);
        if mode.is_some_and(LoopMode::one_shot) {
            return;
        }
        self.adsr.note_off();
        if let Some((env, _)) = &mut self.pitch_adsr {
            env.note_off();
        }
        if let Some(play) = &mut self.sample {
            match play.mode {
                LoopMode::LoopSoftReleaseNoClick => play.exit_at_loop_end = true,
                m if m.exits_loop_on_release() => play.exited_loop = true,
                _ => {}
            }
        }
        // Without an ADSR a plain loop would never end.
        let endless = mode.is_some_and(|m| m.loops() && !m.exits_loop_on_release() && m != LoopMode::LoopHold);
        if !self.adsr.is_shaped() && endless {
            self.adsr.force_release(self.fade_samples);
        }
    }

    /// Fade out now: ADSR release, or a short fade without one.
    pub fn force_release(&mut self) {
        self.released = true;
        self.adsr.force_release(self.fade_samples);
    }

    /// Evicted by the pool.
    pub fn steal(&mut self) {
        self.stolen = true;
        self.force_release();
    }

    // --- Commands ---

    pub fn set_note(&mut self, cents: f32) {
        self.pitch.start(cents, self.portamento_ticks, None);
    }

    /// Note the pitch is heading to, in cents.
    pub fn target_cents(&self) -> f32 {
        self.pitch.target()
    }

    pub fn set_portamento(&mut self, ticks: u32) {
        self.portamento_ticks = ticks;
    }

    pub fn set_vibrato(&mut self, depth_cents: f32, period_ms: u32, timing: &Timing) {
        self.vibrato.configure(depth_cents, period_ms, timing);
    }

    pub fn set_tremolo(&mut self, depth: f32, period_ms: u32, timing: &Timing) {
        self.tremolo.configure(depth, period_ms, timing);
    }

    pub fn pitch_sweep(&mut self, cents: f32, ticks: u32) {
        if ticks == 0 {
            self.sweep_offset += cents;
            self.sweep_ticks = 0;
        } else {
            self.sweep_step = cents / ticks as f32;
            self.sweep_ticks = ticks;
        }
    }

    pub fn set_pitch_adsr(&mut self, env: AdsrState, semitones: i8) {
        self.pitch_adsr = Some((env, semitones));
    }

    pub fn set_wheel_range(&mut self, up: u8, down: u8) {
        self.wheel_range = (up, down);
    }

    /// Pitch wheel position, -1.0..=1.0.
    pub fn set_wheel(&mut self, value: f32) {
        self.wheel = value.clamp(-1.0, 1.0);
    }

    pub fn volume_ramp(&mut self) -> &mut Ramp {
        &mut self.volume
    }

    pub fn pan_ramp(&mut self) -> &mut Ramp {
        &mut self.pan
    }

    pub fn span_ramp(&mut self) -> &mut Ramp {
        &mut self.span
    }

    /// Evaluate a macro-level curve (velocity scaling and the like).
    pub fn eval_curve(&mut self, subproject: &Subproject, curve: Option<CurveId>, x: f32) -> f32 {
        self.eval.evaluate(curve.and_then(|c| subproject.curve(c)), x)
    }

    pub fn start_sample(&mut self, id: SampleId, sample: &Sample, mode: LoopMode, offset: u32) {
        let offset = offset.min(sample.len() as u32);
        self.sample = Some(SamplePlayback {
            sample: id,
            mode,
            position: (offset as u64) << FRAC_BITS,
            increment: 0,
            exited_loop: false,
            exit_at_loop_end: false,
        });
        self.sample_ended = false;
    }

    pub fn stop_sample(&mut self) {
        if self.sample.take().is_some() {
            self.sample_ended = true;
        }
    }

    // --- Rendering ---

    /// Per-tick update of ramps, modulation, increment and mix gains.
    pub fn update_control(
        &mut self,
        subproject: &Subproject,
        timing: &Timing,
        pan_law: &PanLaw,
        mask: ChannelMask,
    ) {
        self.pitch.advance(subproject);
        self.volume.advance(subproject);
        self.pan.advance(subproject);
        self.span.advance(subproject);

        if self.sweep_ticks > 0 {
            self.sweep_offset += self.sweep_step;
            self.sweep_ticks -= 1;
        }
        let vibrato = self.vibrato.advance();
        let tremolo = self.tremolo.advance();

        let per_tick = timing.samples_per_tick();
        let mut pitch_env = 0.0;
        if let Some((env, semitones)) = &mut self.pitch_adsr {
            pitch_env = env.advance(per_tick as u32, subproject) * *semitones as f32 * 100.0;
        }
        let wheel = if self.wheel >= 0.0 {
            self.wheel * self.wheel_range.0 as f32 * 100.0
        } else {
            self.wheel * self.wheel_range.1 as f32 * 100.0
        };
        let cents = self.pitch.value() + self.sweep_offset + vibrato + pitch_env + wheel;

        if let Some(play) = &mut self.sample {
            if let Some(sample) = subproject.sample(play.sample) {
                let pitch = if play.mode.fixed_note() {
                    sample.root_key as i32 * 100
                } else {
                    libm::roundf(cents) as i32
                };
                play.increment =
                    pitch_to_increment(sample.sample_rate, sample.root_key, pitch, timing.sample_rate);
            }
        }

        let pan = (self.pan.value() / 64.0).clamp(-1.0, 1.0);
        let span = ((self.span.value() + 64.0) / 127.0).clamp(0.0, 1.0);
        self.gains = pan_law.gains(pan, span, mask);

        // Tremolo dips the level by up to `depth`.
        let trem = 1.0 - (tremolo.abs()).min(1.0);
        self.gain_target = (self.volume.value() * self.entry_volume * trem).clamp(0.0, 1.0);
        self.gain_step = (self.gain_target - self.gain) / per_tick.max(1.0);
    }

    /// Produce one mono output sample.
    pub fn render(&mut self, subproject: &Subproject) -> f32 {
        let env = self.adsr.advance(1, subproject);
        if self.gain != self.gain_target {
            self.gain += self.gain_step;
            if (self.gain_step > 0.0 && self.gain > self.gain_target)
                || (self.gain_step < 0.0 && self.gain < self.gain_target)
            {
                self.gain = self.gain_target;
            }
        }

        let Some(play) = self.sample.as_mut() else {
            return 0.0;
        };
        let Some(sample) = subproject.sample(play.sample) else {
            self.sample = None;
            self.sample_ended = true;
            return 0.0;
        };

        let looping = play.mode.loops() && sample.has_loop() && !play.exited_loop;
        let idx = (play.position >> FRAC_BITS) as usize;
        let next = if looping && idx + 1 >= sample.loop_end as usize {
            sample.loop_start as usize
        } else {
            idx + 1
        };
        let value = sample.data.get_interpolated(play.position, next) as f32 / 32768.0;

        play.position += play.increment;
        let mut ended = false;
        let loop_end = (sample.loop_end as u64) << FRAC_BITS;
        if looping && play.position >= loop_end {
            if play.exit_at_loop_end {
                play.exited_loop = true;
            } else {
                let loop_len = ((sample.loop_end - sample.loop_start) as u64) << FRAC_BITS;
                while play.position >= loop_end {
                    play.position -= loop_len;
                }
            }
        }
        if play.position >= (sample.len() as u64) << FRAC_BITS && !(looping && !play.exited_loop) {
            ended = true;
        }
        if ended {
            self.sample = None;
            self.sample_ended = true;
        }

        value * env * self.gain
    }
}
