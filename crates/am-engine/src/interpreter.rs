//! SoundMacro interpreter.
//!
//! Runs once per control tick for every voice. Execution continues from the
//! voice's cursor until a wait, the end of the macro, or the instruction
//! budget for the tick is used up. Control flow lives here; commands that
//! touch sound are applied to the [`Voice`]. Commands that affect other
//! voices become [`MacroRequest`]s the engine applies after the step.

use core::fmt;

use am_ir::{Command, MacroTarget, SampleId, SoundMacroId, Subproject, MACRO_VARS};
use arrayvec::ArrayVec;
use rand::Rng;
use rand_pcg::Pcg32;

use crate::envelope_state::{AdsrState, EnvelopeScaling};
use crate::voice::{Timing, Voice};

/// Nested `GoSub` frames per voice.
pub const MAX_CALL_DEPTH: usize = 16;
/// Requests one tick may emit across all voices.
pub const MAX_REQUESTS: usize = 64;
/// Instructions a voice may run per tick.
pub const DEFAULT_BUDGET: u16 = 64;

/// Position in a macro.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    pub macro_id: SoundMacroId,
    pub step: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Wait {
    /// Ticks left; `None` waits only for the flags.
    remaining: Option<u32>,
    key_off: bool,
    sample_end: bool,
}

/// Interpreter state carried by a voice.
#[derive(Clone, Debug)]
pub struct MacroState {
    cursor: Option<Cursor>,
    stack: ArrayVec<Cursor, MAX_CALL_DEPTH>,
    wait: Option<Wait>,
    trap: Option<Cursor>,
    /// Active loop: the `Loop` command's position and jumps left.
    loop_counter: Option<(Cursor, u16)>,
    vars: [i16; MACRO_VARS],
    /// Priority as seen by the macro; changes are forwarded as requests.
    priority: u8,
}

impl MacroState {
    pub fn new(macro_id: SoundMacroId, step: u16, priority: u8) -> Self {
        Self {
            cursor: Some(Cursor { macro_id, step }),
            stack: ArrayVec::new(),
            wait: None,
            trap: None,
            loop_counter: None,
            vars: [0; MACRO_VARS],
            priority,
        }
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    /// The macro has ended (a key-off trap may still restart it).
    pub fn is_done(&self) -> bool {
        self.cursor.is_none()
    }

    /// A key-off trap is armed.
    pub fn has_trap(&self) -> bool {
        self.trap.is_some()
    }

    pub fn is_waiting(&self) -> bool {
        self.wait.is_some()
    }

    pub fn var(&self, index: u8) -> i16 {
        self.vars[index as usize % MACRO_VARS]
    }

    /// Stop executing; the trap is kept.
    pub fn end(&mut self) {
        self.cursor = None;
        self.wait = None;
        self.stack.clear();
        self.loop_counter = None;
    }

    /// Key released: jump to the trap if one is armed.
    pub fn on_key_off(&mut self) {
        if let Some(trap) = self.trap.take() {
            self.cursor = Some(trap);
            self.wait = None;
            self.stack.clear();
            self.loop_counter = None;
        }
    }
}

/// Effects on other voices, applied by the engine after the step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacroRequest {
    Spawn {
        target: Cursor,
        note: u8,
        priority_offset: i8,
    },
    ReleaseChildren,
    SetPriority(u8),
}

/// Why a voice stopped executing abnormally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Abort {
    StackOverflow,
    MissingMacro(SoundMacroId),
    MissingSample(SampleId),
    MissingAdsr(am_ir::AdsrId),
    MissingCurve(am_ir::CurveId),
}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Abort::StackOverflow => write!(f, "call stack overflow"),
            Abort::MissingMacro(id) => write!(f, "missing {id}"),
            Abort::MissingSample(id) => write!(f, "missing {id}"),
            Abort::MissingAdsr(id) => write!(f, "missing {id}"),
            Abort::MissingCurve(id) => write!(f, "missing {id}"),
        }
    }
}

/// Result of one tick of execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Blocked on a wait.
    Waiting,
    /// Ran out of instruction budget.
    Yielded,
    Ended,
    Aborted(Abort),
}

/// What the interpreter needs besides the voice.
pub struct ExecEnv<'a> {
    pub subproject: &'a Subproject,
    pub rng: &'a mut Pcg32,
    pub requests: &'a mut ArrayVec<MacroRequest, MAX_REQUESTS>,
    pub timing: Timing,
    pub scaling: &'a dyn EnvelopeScaling,
    pub budget: u16,
}

enum Flow {
    Next,
    Wait,
    End,
    Abort(Abort),
}

/// Run `voice`'s macro for one tick.
pub fn step(voice: &mut Voice, env: &mut ExecEnv<'_>) -> Outcome {
    if !resume(voice) {
        return Outcome::Waiting;
    }
    for _ in 0..env.budget {
        let Some(cursor) = voice.macro_state.cursor else {
            return Outcome::Ended;
        };
        let Some(sound_macro) = env.subproject.sound_macro(cursor.macro_id) else {
            voice.macro_state.end();
            return Outcome::Aborted(Abort::MissingMacro(cursor.macro_id));
        };
        let Some(&command) = sound_macro.get(cursor.step) else {
            voice.macro_state.end();
            return Outcome::Ended;
        };
        voice.macro_state.cursor = Some(Cursor {
            step: cursor.step + 1,
            ..cursor
        });
        match execute(voice, env, cursor, command) {
            Flow::Next => {}
            Flow::Wait => return Outcome::Waiting,
            Flow::End => {
                voice.macro_state.end();
                return Outcome::Ended;
            }
            Flow::Abort(reason) => {
                voice.macro_state.end();
                return Outcome::Aborted(reason);
            }
        }
    }
    Outcome::Yielded
}

/// Count down an active wait; true when execution may continue.
fn resume(voice: &mut Voice) -> bool {
    let Some(wait) = voice.macro_state.wait else {
        return true;
    };
    if (wait.key_off && voice.released) || (wait.sample_end && voice.sample_ended()) {
        voice.macro_state.wait = None;
        return true;
    }
    match wait.remaining {
        Some(n) if n > 1 => {
            voice.macro_state.wait = Some(Wait {
                remaining: Some(n - 1),
                ..wait
            });
            false
        }
        Some(_) => {
            voice.macro_state.wait = None;
            true
        }
        None => false,
    }
}

fn resolve_target(env: &ExecEnv<'_>, here: Cursor, target: MacroTarget) -> Result<Cursor, Abort> {
    let macro_id = target.macro_id.unwrap_or(here.macro_id);
    if env.subproject.sound_macro(macro_id).is_none() {
        return Err(Abort::MissingMacro(macro_id));
    }
    Ok(Cursor {
        macro_id,
        step: target.step,
    })
}

fn jump(voice: &mut Voice, env: &ExecEnv<'_>, here: Cursor, target: MacroTarget) -> Flow {
    match resolve_target(env, here, target) {
        Ok(cursor) => {
            voice.macro_state.cursor = Some(cursor);
            Flow::Next
        }
        Err(reason) => Flow::Abort(reason),
    }
}

fn begin_wait(
    voice: &mut Voice,
    env: &mut ExecEnv<'_>,
    ticks: u32,
    key_off: bool,
    sample_end: bool,
    random: bool,
) -> Flow {
    let ticks = if random && ticks > 0 {
        env.rng.gen_range(0..=ticks)
    } else {
        ticks
    };
    if ticks == 0 && !key_off && !sample_end {
        return Flow::Next;
    }
    if (key_off && voice.released) || (sample_end && voice.sample_ended()) {
        return Flow::Next;
    }
    voice.macro_state.wait = Some(Wait {
        remaining: (ticks > 0).then_some(ticks),
        key_off,
        sample_end,
    });
    Flow::Wait
}

fn request(env: &mut ExecEnv<'_>, req: MacroRequest) {
    if env.requests.try_push(req).is_err() {
        tracing::debug!(?req, "macro request dropped, queue full");
    }
}

fn execute(voice: &mut Voice, env: &mut ExecEnv<'_>, here: Cursor, command: Command) -> Flow {
    let sp = env.subproject;
    let timing = env.timing;
    match command {
        // === Control ===
        Command::End => Flow::End,
        Command::Stop => {
            voice.force_release();
            Flow::End
        }
        Command::SplitKey { key, target } if voice.key >= key => jump(voice, env, here, target),
        Command::SplitVel { velocity, target } if voice.velocity >= velocity => {
            jump(voice, env, here, target)
        }
        Command::SplitRnd { threshold, target } if env.rng.gen::<u8>() < threshold => {
            jump(voice, env, here, target)
        }
        Command::SplitKey { .. } | Command::SplitVel { .. } | Command::SplitRnd { .. } => Flow::Next,
        Command::WaitTicks { ticks, key_off, sample_end, random } => {
            begin_wait(voice, env, ticks as u32, key_off, sample_end, random)
        }
        Command::WaitMs { ms, key_off, sample_end, random } => {
            let ticks = timing.ms_to_ticks(ms as u32);
            begin_wait(voice, env, ticks, key_off, sample_end, random)
        }
        Command::Loop { step, times, key_off, sample_end } => {
            if (key_off && voice.released) || (sample_end && voice.sample_ended()) {
                voice.macro_state.loop_counter = None;
                return Flow::Next;
            }
            let back = Cursor { step, ..here };
            let state = &mut voice.macro_state;
            match state.loop_counter {
                Some((at, 0)) if at == here => {
                    state.loop_counter = None;
                    return Flow::Next;
                }
                Some((at, n)) if at == here => state.loop_counter = Some((at, n - 1)),
                _ if times == 0 => {}
                _ => state.loop_counter = Some((here, times - 1)),
            }
            state.cursor = Some(back);
            Flow::Next
        }
        Command::Goto { target } => jump(voice, env, here, target),
        Command::GoSub { target } => {
            let Some(ret) = voice.macro_state.cursor else {
                return Flow::End;
            };
            if voice.macro_state.stack.try_push(ret).is_err() {
                return Flow::Abort(Abort::StackOverflow);
            }
            jump(voice, env, here, target)
        }
        Command::Return => match voice.macro_state.stack.pop() {
            Some(ret) => {
                voice.macro_state.cursor = Some(ret);
                Flow::Next
            }
            None => Flow::End,
        },
        Command::TrapKeyOff { target } => match resolve_target(env, here, target) {
            Ok(cursor) => {
                voice.macro_state.trap = Some(cursor);
                Flow::Next
            }
            Err(reason) => Flow::Abort(reason),
        },
        Command::UntrapKeyOff => {
            voice.macro_state.trap = None;
            Flow::Next
        }

        // === Pitch ===
        Command::SetNote { key, cents } => {
            voice.set_note(key.min(127) as f32 * 100.0 + cents as f32);
            Flow::Next
        }
        Command::AddNote { add, cents } => {
            let target = voice.target_cents() + add as f32 * 100.0 + cents as f32;
            voice.set_note(target);
            Flow::Next
        }
        Command::RndNote { lo, hi } => {
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            let offset = env.rng.gen_range(lo..=hi);
            let target = voice.target_cents() + offset as f32 * 100.0;
            voice.set_note(target);
            Flow::Next
        }
        Command::Portamento { ms } => {
            voice.set_portamento(timing.ms_to_ticks(ms as u32));
            Flow::Next
        }
        Command::Vibrato { semitones, cents, period_ms } => {
            let depth = semitones as f32 * 100.0 + cents as f32;
            voice.set_vibrato(depth, period_ms as u32, &timing);
            Flow::Next
        }
        Command::PitchSweep { cents, ticks } => {
            voice.pitch_sweep(cents as f32, ticks as u32);
            Flow::Next
        }
        Command::SetPitchAdsr { adsr, semitones } => {
            let Some(def) = sp.adsr(adsr) else {
                return Flow::Abort(Abort::MissingAdsr(adsr));
            };
            let mut env_state = AdsrState::default();
            env_state.note_on(def, voice.velocity, voice.key, timing.sample_rate, env.scaling);
            voice.set_pitch_adsr(env_state, semitones);
            Flow::Next
        }
        Command::PitchWheelRange { up, down } => {
            voice.set_wheel_range(up, down);
            Flow::Next
        }

        // === Sample ===
        Command::StartSample { sample, mode, offset } => match sp.sample(sample) {
            Some(data) if !data.is_empty() => {
                voice.start_sample(sample, data, mode, offset);
                Flow::Next
            }
            _ => Flow::Abort(Abort::MissingSample(sample)),
        },
        Command::StopSample => {
            voice.stop_sample();
            Flow::Next
        }
        Command::KeyOff => {
            voice.key_off();
            Flow::Next
        }

        // === Volume ===
        Command::SetAdsr { adsr } => {
            let Some(def) = sp.adsr(adsr) else {
                return Flow::Abort(Abort::MissingAdsr(adsr));
            };
            voice.adsr.note_on(def, voice.velocity, voice.key, timing.sample_rate, env.scaling);
            Flow::Next
        }
        Command::ScaleVolume { scale, add, curve } => {
            if let Some(c) = curve {
                if sp.curve(c).is_none() {
                    return Flow::Abort(Abort::MissingCurve(c));
                }
            }
            let x = voice.velocity as f32 / 127.0;
            let shaped = voice.eval_curve(sp, curve, x);
            let volume = shaped * scale as f32 / 127.0 + add as f32 / 127.0;
            voice.volume_ramp().set(volume.clamp(0.0, 1.0));
            Flow::Next
        }
        Command::Envelope { target, ms, curve } => {
            if let Some(c) = curve.filter(|c| sp.curve(*c).is_none()) {
                return Flow::Abort(Abort::MissingCurve(c));
            }
            let ticks = timing.ms_to_ticks(ms as u32);
            voice.volume_ramp().start(target.min(127) as f32 / 127.0, ticks, curve);
            Flow::Next
        }
        Command::FadeIn { ms, curve } => {
            if let Some(c) = curve.filter(|c| sp.curve(*c).is_none()) {
                return Flow::Abort(Abort::MissingCurve(c));
            }
            let ticks = timing.ms_to_ticks(ms as u32);
            let ramp = voice.volume_ramp();
            let target = ramp.target();
            ramp.set(0.0);
            ramp.start(target, ticks, curve);
            Flow::Next
        }
        Command::SetupTremolo { depth, period_ms } => {
            voice.set_tremolo(depth.min(127) as f32 / 127.0, period_ms as u32, &timing);
            Flow::Next
        }

        // === Setup ===
        Command::Panning { pan, ms } => {
            let ticks = timing.ms_to_ticks(ms as u32);
            voice.pan_ramp().start(pan.clamp(-64, 63) as f32, ticks, None);
            Flow::Next
        }
        Command::PianoPan { scale, center_key, center_pan } => {
            let distance = voice.key as f32 - center_key as f32;
            let pan = center_pan as f32 + distance * scale as f32 / 8.0;
            voice.pan_ramp().set(pan.clamp(-64.0, 63.0));
            Flow::Next
        }
        Command::Spanning { span, ms } => {
            let ticks = timing.ms_to_ticks(ms as u32);
            voice.span_ramp().start(span.clamp(-64, 63) as f32, ticks, None);
            Flow::Next
        }
        Command::AuxSends { a, b } => {
            voice.aux_a = a.min(127) as f32 / 127.0;
            voice.aux_b = b.min(127) as f32 / 127.0;
            Flow::Next
        }
        Command::SetPriority { priority } => {
            let priority = priority.min(127);
            voice.macro_state.priority = priority;
            request(env, MacroRequest::SetPriority(priority));
            Flow::Next
        }
        Command::AddPriority { add } => {
            let priority = (voice.macro_state.priority as i16 + add as i16).clamp(0, 127) as u8;
            voice.macro_state.priority = priority;
            request(env, MacroRequest::SetPriority(priority));
            Flow::Next
        }

        // === Special ===
        Command::PlayMacro { add_note, target, priority_offset } => {
            match resolve_target(env, here, target) {
                Ok(target) => {
                    let note = (voice.key as i16 + add_note as i16).clamp(0, 127) as u8;
                    request(env, MacroRequest::Spawn { target, note, priority_offset });
                    Flow::Next
                }
                Err(reason) => Flow::Abort(reason),
            }
        }
        Command::SendKeyOff => {
            request(env, MacroRequest::ReleaseChildren);
            Flow::Next
        }
        Command::SetVar { var, value } => {
            voice.macro_state.vars[var as usize % MACRO_VARS] = value;
            Flow::Next
        }
        Command::AddVar { dst, a, b } => {
            let state = &mut voice.macro_state;
            state.vars[dst as usize % MACRO_VARS] = state.var(a).wrapping_add(state.var(b));
            Flow::Next
        }
        Command::IfEqual { a, b, target } => {
            if voice.macro_state.var(a) == voice.macro_state.var(b) {
                jump(voice, env, here, target)
            } else {
                Flow::Next
            }
        }
        Command::IfLess { a, b, target } => {
            if voice.macro_state.var(a) < voice.macro_state.var(b) {
                jump(voice, env, here, target)
            } else {
                Flow::Next
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope_state::{AdsrPhase, TimeCentsScaling};
    use crate::voice::{PoolId, VoiceInit};
    use alloc::vec;
    use alloc::vec::Vec;
    use am_ir::{Adsr, GroupId, LoopMode, Sample, SoundMacro, TableKind};
    use rand::SeedableRng;

    const TIMING: Timing = Timing {
        sample_rate: 1000,
        tick_rate: 100,
    };

    struct Harness {
        sp: Subproject,
        rng: Pcg32,
        requests: ArrayVec<MacroRequest, MAX_REQUESTS>,
    }

    impl Harness {
        fn new(sp: Subproject) -> Self {
            Self {
                sp,
                rng: Pcg32::seed_from_u64(7),
                requests: ArrayVec::new(),
            }
        }

        fn voice(&self, id: SoundMacroId) -> Voice {
            Voice::new(
                VoiceInit {
                    pool: PoolId { group: GroupId(0), kind: TableKind::Normal, program: 0 },
                    macro_id: id,
                    step: 0,
                    priority: 64,
                    channel: 0,
                    trigger_note: 60,
                    key: 60,
                    velocity: 100,
                    pan: 0,
                    span: -64,
                    volume: 1.0,
                    aux_a: 0.0,
                    aux_b: 0.0,
                    parent: None,
                },
                &TIMING,
            )
        }

        fn step(&mut self, voice: &mut Voice) -> Outcome {
            let mut env = ExecEnv {
                subproject: &self.sp,
                rng: &mut self.rng,
                requests: &mut self.requests,
                timing: TIMING,
                scaling: &TimeCentsScaling,
                budget: DEFAULT_BUDGET,
            };
            step(voice, &mut env)
        }
    }

    fn single(commands: Vec<Command>) -> (Harness, SoundMacroId) {
        let mut sp = Subproject::new("sp");
        let id = sp.add_sound_macro(SoundMacro::new("m", commands));
        (Harness::new(sp), id)
    }

    fn wait_ticks(ticks: u16) -> Command {
        Command::WaitTicks { ticks, key_off: false, sample_end: false, random: false }
    }

    #[test]
    fn wait_resumes_after_n_ticks() {
        let (mut h, id) = single(vec![wait_ticks(3), Command::SetVar { var: 0, value: 1 }, Command::End]);
        let mut v = h.voice(id);
        assert_eq!(h.step(&mut v), Outcome::Waiting);
        assert_eq!(h.step(&mut v), Outcome::Waiting);
        assert_eq!(h.step(&mut v), Outcome::Waiting);
        assert_eq!(v.macro_state.var(0), 0);
        assert_eq!(h.step(&mut v), Outcome::Ended);
        assert_eq!(v.macro_state.var(0), 1);
    }

    #[test]
    fn zero_tick_wait_is_noop() {
        let (mut h, id) = single(vec![wait_ticks(0), Command::End]);
        let mut v = h.voice(id);
        assert_eq!(h.step(&mut v), Outcome::Ended);
    }

    #[test]
    fn key_off_wait_blocks_until_release() {
        let wait = Command::WaitTicks { ticks: 0, key_off: true, sample_end: false, random: false };
        let (mut h, id) = single(vec![wait, Command::Stop]);
        let mut v = h.voice(id);
        for _ in 0..10 {
            assert_eq!(h.step(&mut v), Outcome::Waiting);
        }
        v.key_off();
        assert_eq!(h.step(&mut v), Outcome::Ended);
    }

    #[test]
    fn wait_ms_rounds_up_to_ticks() {
        let wait = Command::WaitMs { ms: 15, key_off: false, sample_end: false, random: false };
        let (mut h, id) = single(vec![wait, Command::End]);
        let mut v = h.voice(id);
        assert_eq!(h.step(&mut v), Outcome::Waiting);
        assert_eq!(h.step(&mut v), Outcome::Waiting);
        assert_eq!(h.step(&mut v), Outcome::Ended);
    }

    #[test]
    fn running_past_end_ends_macro() {
        let (mut h, id) = single(vec![Command::SetVar { var: 1, value: 5 }]);
        let mut v = h.voice(id);
        assert_eq!(h.step(&mut v), Outcome::Ended);
        assert!(v.macro_state.is_done());
    }

    #[test]
    fn loop_repeats_given_times() {
        let (mut h, id) = single(vec![
            Command::SetVar { var: 1, value: 1 },
            Command::AddVar { dst: 0, a: 0, b: 1 },
            Command::Loop { step: 1, times: 3, key_off: false, sample_end: false },
            Command::End,
        ]);
        let mut v = h.voice(id);
        assert_eq!(h.step(&mut v), Outcome::Ended);
        assert_eq!(v.macro_state.var(0), 4);
    }

    #[test]
    fn infinite_loop_yields_at_budget() {
        let (mut h, id) = single(vec![Command::Loop { step: 0, times: 0, key_off: false, sample_end: false }]);
        let mut v = h.voice(id);
        assert_eq!(h.step(&mut v), Outcome::Yielded);
        assert_eq!(h.step(&mut v), Outcome::Yielded);
    }

    #[test]
    fn loop_exits_on_key_off() {
        let (mut h, id) = single(vec![
            wait_ticks(1),
            Command::Loop { step: 0, times: 0, key_off: true, sample_end: false },
            Command::SetVar { var: 2, value: 9 },
            Command::End,
        ]);
        let mut v = h.voice(id);
        for _ in 0..5 {
            h.step(&mut v);
        }
        assert_eq!(v.macro_state.var(2), 0);
        v.key_off();
        h.step(&mut v);
        h.step(&mut v);
        assert_eq!(v.macro_state.var(2), 9);
    }

    #[test]
    fn gosub_and_return() {
        let (mut h, id) = single(vec![
            Command::GoSub { target: MacroTarget::local(3) },
            Command::SetVar { var: 1, value: 2 },
            Command::End,
            Command::SetVar { var: 0, value: 1 },
            Command::Return,
        ]);
        let mut v = h.voice(id);
        assert_eq!(h.step(&mut v), Outcome::Ended);
        assert_eq!(v.macro_state.var(0), 1);
        assert_eq!(v.macro_state.var(1), 2);
    }

    #[test]
    fn return_on_empty_stack_ends() {
        let (mut h, id) = single(vec![Command::Return, Command::SetVar { var: 0, value: 1 }]);
        let mut v = h.voice(id);
        assert_eq!(h.step(&mut v), Outcome::Ended);
        assert_eq!(v.macro_state.var(0), 0);
    }

    #[test]
    fn runaway_recursion_aborts() {
        let (mut h, id) = single(vec![Command::GoSub { target: MacroTarget::local(0) }]);
        let mut v = h.voice(id);
        assert_eq!(h.step(&mut v), Outcome::Aborted(Abort::StackOverflow));
    }

    #[test]
    fn key_off_trap_runs_after_end() {
        let (mut h, id) = single(vec![
            Command::TrapKeyOff { target: MacroTarget::local(2) },
            Command::End,
            Command::SetVar { var: 3, value: 7 },
            Command::End,
        ]);
        let mut v = h.voice(id);
        assert_eq!(h.step(&mut v), Outcome::Ended);
        v.key_off();
        assert_eq!(h.step(&mut v), Outcome::Ended);
        assert_eq!(v.macro_state.var(3), 7);
    }

    #[test]
    fn untrap_disarms() {
        let (mut h, id) = single(vec![
            Command::TrapKeyOff { target: MacroTarget::local(3) },
            Command::UntrapKeyOff,
            Command::End,
            Command::SetVar { var: 3, value: 7 },
        ]);
        let mut v = h.voice(id);
        h.step(&mut v);
        v.key_off();
        h.step(&mut v);
        assert_eq!(v.macro_state.var(3), 0);
    }

    #[test]
    fn split_key_branches_on_trigger_key() {
        let (mut h, id) = single(vec![
            Command::SplitKey { key: 60, target: MacroTarget::local(3) },
            Command::SetVar { var: 0, value: 1 },
            Command::End,
            Command::SetVar { var: 0, value: 2 },
        ]);
        let mut v = h.voice(id);
        h.step(&mut v);
        assert_eq!(v.macro_state.var(0), 2);

        let mut low = h.voice(id);
        low.key = 59;
        h.step(&mut low);
        assert_eq!(low.macro_state.var(0), 1);
    }

    #[test]
    fn missing_jump_target_aborts() {
        let (mut h, id) = single(vec![Command::Goto { target: MacroTarget::remote(SoundMacroId(9), 0) }]);
        let mut v = h.voice(id);
        assert_eq!(h.step(&mut v), Outcome::Aborted(Abort::MissingMacro(SoundMacroId(9))));
    }

    #[test]
    fn missing_sample_aborts() {
        let (mut h, id) = single(vec![Command::StartSample {
            sample: SampleId(0),
            mode: LoopMode::NoLoop,
            offset: 0,
        }]);
        let mut v = h.voice(id);
        assert_eq!(h.step(&mut v), Outcome::Aborted(Abort::MissingSample(SampleId(0))));
    }

    #[test]
    fn set_adsr_starts_attack() {
        let mut sp = Subproject::new("sp");
        let adsr = sp.add_adsr(Adsr::new("a", 10, 10, 0.5, 10));
        let id = sp.add_sound_macro(SoundMacro::new("m", vec![Command::SetAdsr { adsr }, Command::End]));
        let mut h = Harness::new(sp);
        let mut v = h.voice(id);
        h.step(&mut v);
        assert_eq!(v.phase(), AdsrPhase::Attack);
    }

    #[test]
    fn stop_forces_release() {
        let mut sp = Subproject::new("sp");
        let sample = sp.add_sample(Sample::from_pcm16("s", vec![1; 100], 1000, 60).with_loop(0, 100));
        let id = sp.add_sound_macro(SoundMacro::new(
            "m",
            vec![
                Command::StartSample { sample, mode: LoopMode::Loop, offset: 0 },
                wait_ticks(2),
                Command::Stop,
            ],
        ));
        let mut h = Harness::new(sp);
        let mut v = h.voice(id);
        h.step(&mut v);
        assert_eq!(v.phase(), AdsrPhase::Sustain);
        h.step(&mut v);
        h.step(&mut v);
        assert_eq!(v.phase(), AdsrPhase::Release);
    }

    #[test]
    fn structure_commands_emit_requests() {
        let (mut h, id) = single(vec![
            Command::PlayMacro { add_note: 12, target: MacroTarget::local(4), priority_offset: -1 },
            Command::AddPriority { add: 10 },
            Command::AddPriority { add: 10 },
            Command::SendKeyOff,
            Command::End,
        ]);
        let mut v = h.voice(id);
        h.step(&mut v);
        assert_eq!(
            h.requests.as_slice(),
            &[
                MacroRequest::Spawn { target: Cursor { macro_id: id, step: 4 }, note: 72, priority_offset: -1 },
                MacroRequest::SetPriority(74),
                MacroRequest::SetPriority(84),
                MacroRequest::ReleaseChildren,
            ]
        );
    }

    #[test]
    fn add_var_wraps() {
        let (mut h, id) = single(vec![
            Command::SetVar { var: 0, value: i16::MAX },
            Command::SetVar { var: 17, value: 1 },
            Command::AddVar { dst: 2, a: 0, b: 1 },
            Command::IfLess { a: 2, b: 0, target: MacroTarget::local(5) },
            Command::End,
            Command::SetVar { var: 3, value: 1 },
        ]);
        let mut v = h.voice(id);
        h.step(&mut v);
        assert_eq!(v.macro_state.var(2), i16::MIN);
        assert_eq!(v.macro_state.var(3), 1);
    }

    #[test]
    fn set_note_moves_pitch() {
        let (mut h, id) = single(vec![Command::SetNote { key: 72, cents: 25 }, Command::AddNote { add: -1, cents: 0 }]);
        let mut v = h.voice(id);
        h.step(&mut v);
        assert_eq!(v.pitch_cents(), 7125.0);
    }

    #[test]
    fn rnd_note_with_swapped_bounds_stays_in_range() {
        let (mut h, id) = single(vec![Command::RndNote { lo: 3, hi: -3 }]);
        for _ in 0..20 {
            let mut v = h.voice(id);
            h.step(&mut v);
            let c = v.pitch_cents();
            assert!((5700.0..=6300.0).contains(&c));
        }
    }

    #[test]
    fn scale_volume_from_velocity() {
        let (mut h, id) = single(vec![Command::ScaleVolume { scale: 127, add: 0, curve: None }]);
        let mut v = h.voice(id);
        h.step(&mut v);
        assert!((v.volume() - 100.0 / 127.0).abs() < 1e-6);
    }
}
