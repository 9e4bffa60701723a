use std::path::PathBuf;

use thiserror::Error;

use crate::sequencer::InputEvent;

#[derive(Error, Debug)]
pub enum Error {
    #[error("tempo must be a positive number of beats per minute, got {0}")]
    InvalidTempo(f32),
    #[error("sample volume must be a finite, non-negative number, got {0}")]
    InvalidVolume(f32),
    #[error("{what}: expected {expected} sounds, found {found}")]
    SoundCountMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("button index out of range for {0:?}")]
    ButtonOutOfRange(InputEvent),
    #[error("step {0} is outside the pattern")]
    StepOutOfRange(usize),
    #[error("sound {0} is not in the sample bank")]
    SoundOutOfRange(usize),
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to load sample {path:?}: {source}")]
    Wav { path: PathBuf, source: hound::Error },
    #[error("unsupported sample format in {path:?}: {detail}")]
    UnsupportedSample { path: PathBuf, detail: String },
    #[error("audio output: {0}")]
    Audio(String),
    #[error("MIDI output: {0}")]
    Midi(String),
    #[error("window: {0}")]
    Window(String),
}

impl Error {
    /// Errors that can only happen before the engine starts running.
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self,
            Error::ButtonOutOfRange(_)
                | Error::StepOutOfRange(_)
                | Error::SoundOutOfRange(_)
                | Error::UnknownCommand(_)
                | Error::Window(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
