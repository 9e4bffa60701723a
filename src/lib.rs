/// thrum - a 12-step drum sequencer driven by buttons
///
/// This library provides the sequencer engine and its collaborators:
/// - Pattern grid and record/play state machine
/// - Button dispatch and the step clock
/// - Sample output through cpal or MIDI
/// - Startup configuration

pub mod audio;
pub mod config;
pub mod error;
pub mod indicator;
pub mod midi;
pub mod sequencer;

// Re-export commonly used types
pub use audio::{AudioOutput, MultiBank, SampleBank, SilentBank};
pub use config::Config;
pub use error::{Error, Result};
pub use indicator::{LogIndicator, RecordIndicator, SharedIndicator};
pub use midi::{midi_note_name, MidiDrumBank};
pub use sequencer::playback::{MonotonicTime, PlaybackEngine, PlaybackEvent, StepClock, TimeSource};
pub use sequencer::{
    Action, Dispatcher, InputEvent, PatternGrid, Sequencer, SequencerState, Tempo, SOUND_COUNT,
    STEP_BUTTON_COUNT, STEP_COUNT,
};
