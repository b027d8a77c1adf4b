use std::path::PathBuf;

use am_audio::AudioError;
use am_formats::FormatError;

/// Errors surfaced by the controller.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Config load/parse error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("invalid setting {name}: {message}")]
    InvalidSetting { name: &'static str, message: String },
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
