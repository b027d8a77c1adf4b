//! File formats for amuse.
//!
//! Saves and loads subprojects in the `AMSP` binary layout, compiles curve
//! expressions, and reads and writes WAV audio.

mod curve_expr;
mod project_format;
mod wav_format;

pub use curve_expr::{compile_curve, expression_curve, recompile_curves, VALIDATION_POINTS};
pub use project_format::{load_subproject, save_subproject, FORMAT_VERSION};
pub use wav_format::{frames_to_wav, load_wav, write_wav};

/// Error type for format parsing.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("invalid file header or magic bytes")]
    InvalidHeader,
    #[error("unexpected end of file")]
    UnexpectedEof,
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),
    #[error("unsupported WAV encoding: {0}")]
    UnsupportedWav(String),
    #[error("macro '{macro_name}' contains unknown command opcode {opcode}")]
    UnknownCommand { macro_name: String, opcode: u8 },
    #[error("malformed record: {0}")]
    Malformed(String),
    #[error(transparent)]
    Binary(#[from] binrw::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
