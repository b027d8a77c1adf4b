//! Aux-bus effect trait.

use am_ir::{AudioBuffer, ChannelMask, EffectKind};

/// An effect running on an aux bus.
///
/// `process` works in place on the bus buffer, one plane per speaker
/// position. Implementations allocate their delay lines up front so that
/// processing and parameter changes never allocate.
pub trait AuxEffect: Send {
    fn name(&self) -> &'static str;

    /// Process the active channels of `buffer` in place.
    fn process(&mut self, buffer: &mut AudioBuffer, mask: ChannelMask);

    /// Apply new parameters. Returns false when `kind` is a different effect.
    fn set_params(&mut self, kind: &EffectKind) -> bool;

    /// Clear all internal state (tails, delay lines).
    fn reset(&mut self);
}
