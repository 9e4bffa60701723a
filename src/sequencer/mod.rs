/// Core sequencer logic - pattern grid, transport state and step cursor
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{Error, Result};

pub mod dispatch;
pub mod playback;

pub use dispatch::{Action, Dispatcher, InputEvent};

/// Steps in one loop of the pattern.
pub const STEP_COUNT: usize = 12;
/// Samples in the bank; sound buttons cover grid positions `0..SOUND_COUNT`.
pub const SOUND_COUNT: usize = 6;
/// Buttons that only arm steps, covering grid positions `SOUND_COUNT..STEP_COUNT`.
pub const STEP_BUTTON_COUNT: usize = STEP_COUNT - SOUND_COUNT;

const _: () = assert!(STEP_COUNT > 0 && SOUND_COUNT > 0 && SOUND_COUNT <= STEP_COUNT);

/// Which sounds fire on which step. Each step holds a set of sound slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternGrid {
    cells: [[bool; SOUND_COUNT]; STEP_COUNT],
}

impl PatternGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self, step: usize, sound: usize) -> Result<bool> {
        check_sound(sound)?;
        Ok(self.row(step)?[sound])
    }

    pub fn set(&mut self, step: usize, sound: usize, armed: bool) -> Result<()> {
        check_sound(sound)?;
        let row = self.cells.get_mut(step).ok_or(Error::StepOutOfRange(step))?;
        row[sound] = armed;
        Ok(())
    }

    /// Flips `sound` at `step` and returns whether it is now armed.
    pub fn toggle(&mut self, step: usize, sound: usize) -> Result<bool> {
        let armed = !self.is_armed(step, sound)?;
        self.set(step, sound, armed)?;
        Ok(armed)
    }

    /// Sounds armed at `step`, in ascending slot order.
    pub fn armed(&self, step: usize) -> Result<Vec<usize>> {
        Ok(self
            .row(step)?
            .iter()
            .enumerate()
            .filter_map(|(sound, &armed)| armed.then_some(sound))
            .collect())
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().flatten().all(|&armed| !armed)
    }

    fn row(&self, step: usize) -> Result<&[bool; SOUND_COUNT]> {
        self.cells.get(step).ok_or(Error::StepOutOfRange(step))
    }
}

fn check_sound(sound: usize) -> Result<()> {
    if sound < SOUND_COUNT {
        Ok(())
    } else {
        Err(Error::SoundOutOfRange(sound))
    }
}

/// Beats per minute, validated once at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f32,
    interval: Duration,
}

impl Tempo {
    /// The step interval must fit in a `Duration` and be at least 1 ns.
    pub fn from_bpm(bpm: f32) -> Result<Self> {
        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(Error::InvalidTempo(bpm));
        }
        match Duration::try_from_secs_f64(15.0 / f64::from(bpm)) {
            Ok(interval) if !interval.is_zero() => Ok(Self { bpm, interval }),
            _ => Err(Error::InvalidTempo(bpm)),
        }
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    /// Time between steps: 15000 / bpm milliseconds, four steps per beat.
    pub fn step_interval(&self) -> Duration {
        self.interval
    }
}

/// Transport and edit state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerState {
    pub playing: bool,
    pub recording: bool,
    pub current_selection: Option<usize>,
    pub cursor: usize,
}

impl Default for SequencerState {
    fn default() -> Self {
        Self {
            playing: false,
            recording: false,
            current_selection: None,
            // first advance lands on step 0
            cursor: STEP_COUNT - 1,
        }
    }
}

/// A step the clock has just reached, with the sounds to fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub index: usize,
    pub sounds: Vec<usize>,
}

/// The whole engine aggregate: state, pattern and tempo. Share it between the
/// dispatcher and the playback thread as `Arc<Mutex<Sequencer>>`.
#[derive(Debug, Clone)]
pub struct Sequencer {
    state: SequencerState,
    grid: PatternGrid,
    tempo: Tempo,
}

impl Sequencer {
    pub fn new(tempo: Tempo) -> Self {
        Self {
            state: SequencerState::default(),
            grid: PatternGrid::new(),
            tempo,
        }
    }

    pub fn state(&self) -> &SequencerState {
        &self.state
    }

    pub fn grid(&self) -> &PatternGrid {
        &self.grid
    }

    pub(crate) fn grid_mut(&mut self) -> &mut PatternGrid {
        &mut self.grid
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing
    }

    pub fn is_recording(&self) -> bool {
        self.state.recording
    }

    pub fn current_selection(&self) -> Option<usize> {
        self.state.current_selection
    }

    pub fn cursor(&self) -> usize {
        self.state.cursor
    }

    pub fn toggle_play(&mut self) -> bool {
        self.state.playing = !self.state.playing;
        self.state.playing
    }

    pub fn toggle_record(&mut self) -> bool {
        self.state.recording = !self.state.recording;
        self.state.recording
    }

    pub(crate) fn select(&mut self, sound: usize) -> Result<()> {
        check_sound(sound)?;
        self.state.current_selection = Some(sound);
        Ok(())
    }

    /// Moves the cursor to the next step and returns what is armed there.
    pub fn advance(&mut self) -> Step {
        self.state.cursor = (self.state.cursor + 1) % STEP_COUNT;
        let index = self.state.cursor;
        Step {
            index,
            sounds: self.grid.armed(index).unwrap_or_default(),
        }
    }
}

/// Locks the shared sequencer, recovering from a poisoned lock. Mutations of
/// the aggregate are single writes.
pub fn lock(sequencer: &Mutex<Sequencer>) -> MutexGuard<'_, Sequencer> {
    sequencer.lock().unwrap_or_else(PoisonError::into_inner)
}
