//! SoundMacro interpreter and polyphonic voice engine for amuse.
//!
//! The [`Engine`] owns a [`Subproject`](am_ir::Subproject), turns triggers
//! into voices, runs each voice's SoundMacro once per control tick and
//! mixes the voices through the studio's aux effects into interleaved
//! 16-bit [`Frame`]s.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod curve_eval;
mod dispatcher;
mod effect;
pub mod effects;
mod engine;
mod envelope_state;
mod event_queue;
mod frame;
mod frequency;
pub mod interpreter;
mod mixer;
mod resolver;
mod studio;
mod voice;
mod voice_pool;

pub use curve_eval::CurveEvaluator;
pub use dispatcher::{ChannelState, Dispatcher, TriggerPlan};
pub use effect::AuxEffect;
pub use engine::{Engine, EngineCommand, EngineConfig, COMMAND_QUEUE};
pub use envelope_state::{AdsrPhase, AdsrState, EnvelopeScaling, TimeCentsScaling};
pub use event_queue::EventQueue;
pub use frame::{saturate, Frame};
pub use frequency::pitch_to_increment;
pub use interpreter::{Abort, Cursor, MacroRequest, MacroState, Outcome};
pub use mixer::{Mixer, PanLaw};
pub use resolver::{resolve, Resolved, MAX_LAYERS};
pub use studio::{AuxBus, Studio};
pub use voice::{PoolId, Ramp, SamplePlayback, Timing, Voice, VoiceInit, VoiceKey};
pub use voice_pool::{Allocation, VoicePool};
