//! Audio output backends for amuse.

mod capture;
mod cpal_backend;
mod traits;

pub use capture::CaptureOutput;
pub use cpal_backend::CpalOutput;
pub use traits::{AudioError, AudioOutput};
