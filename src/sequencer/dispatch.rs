/// Button handling - turns input events into sequencer mutations
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::{lock, Sequencer, SOUND_COUNT, STEP_BUTTON_COUNT};
use crate::audio::SampleBank;
use crate::error::{Error, Result};
use crate::indicator::RecordIndicator;

/// A debounced button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// One of the sample buttons, `0..SOUND_COUNT`.
    SoundButton(usize),
    /// One of the step-only buttons, `0..STEP_BUTTON_COUNT`.
    StepButton(usize),
    PlayButton,
    RecordButton,
}

impl InputEvent {
    /// Grid position of a sound or step button. Sound buttons sit on steps
    /// `0..SOUND_COUNT`, step-only buttons on the remaining steps.
    pub fn logical_step(&self) -> Option<usize> {
        match *self {
            InputEvent::SoundButton(s) => Some(s),
            InputEvent::StepButton(t) => SOUND_COUNT.checked_add(t),
            InputEvent::PlayButton | InputEvent::RecordButton => None,
        }
    }

    fn validate(self) -> Result<Self> {
        let in_range = match self {
            InputEvent::SoundButton(s) => s < SOUND_COUNT,
            InputEvent::StepButton(t) => t < STEP_BUTTON_COUNT,
            InputEvent::PlayButton | InputEvent::RecordButton => true,
        };
        if in_range {
            Ok(self)
        } else {
            Err(Error::ButtonOutOfRange(self))
        }
    }
}

/// Console syntax: `s3` (sound button 3), `t0` (step button 0), `p`/`play`,
/// `r`/`rec`.
impl FromStr for InputEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim().to_ascii_lowercase();
        let unknown = || Error::UnknownCommand(s.trim().to_string());

        let event = match text.as_str() {
            "p" | "play" => InputEvent::PlayButton,
            "r" | "rec" | "record" => InputEvent::RecordButton,
            _ => {
                let digits = text.find(|c: char| c.is_ascii_digit()).ok_or_else(unknown)?;
                let (kind, index) = text.split_at(digits);
                let index: usize = index.parse().map_err(|_| unknown())?;
                match kind.trim() {
                    "s" | "sound" => InputEvent::SoundButton(index),
                    "t" | "step" => InputEvent::StepButton(index),
                    _ => return Err(unknown()),
                }
            }
        };
        event.validate()
    }
}

/// What a dispatched event did to the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Sound should be played right now; it is also the new selection.
    Play(usize),
    /// `sound` was armed (`armed == true`) or disarmed at `step`.
    Toggled { step: usize, sound: usize, armed: bool },
    Playing(bool),
    Recording(bool),
    /// Event had no effect in the current mode.
    Ignored,
}

impl Sequencer {
    /// Applies one input event. Out-of-range events are rejected before
    /// anything changes.
    pub fn dispatch(&mut self, event: InputEvent) -> Result<Action> {
        let event = event.validate()?;

        let action = match event {
            InputEvent::PlayButton => Action::Playing(self.toggle_play()),
            InputEvent::RecordButton => Action::Recording(self.toggle_record()),
            InputEvent::SoundButton(sound) if !self.is_recording() => {
                self.select(sound)?;
                Action::Play(sound)
            }
            InputEvent::StepButton(_) if !self.is_recording() => Action::Ignored,
            // While recording every pad is a step button arming the selection
            InputEvent::SoundButton(_) | InputEvent::StepButton(_) => {
                match (self.current_selection(), event.logical_step()) {
                    (Some(sound), Some(step)) => Action::Toggled {
                        step,
                        sound,
                        armed: self.grid_mut().toggle(step, sound)?,
                    },
                    _ => Action::Ignored,
                }
            }
        };
        Ok(action)
    }
}

/// Routes input events into a shared sequencer and performs the resulting
/// side effects on the sample bank and record indicator.
#[derive(Clone)]
pub struct Dispatcher {
    sequencer: Arc<Mutex<Sequencer>>,
    bank: Arc<dyn SampleBank>,
    indicator: Arc<dyn RecordIndicator>,
}

impl Dispatcher {
    pub fn new(
        sequencer: Arc<Mutex<Sequencer>>,
        bank: Arc<dyn SampleBank>,
        indicator: Arc<dyn RecordIndicator>,
    ) -> Result<Self> {
        if bank.len() != SOUND_COUNT {
            return Err(Error::SoundCountMismatch {
                what: "sample bank",
                expected: SOUND_COUNT,
                found: bank.len(),
            });
        }
        indicator.set(lock(&sequencer).is_recording());

        Ok(Self {
            sequencer,
            bank,
            indicator,
        })
    }

    pub fn sequencer(&self) -> &Arc<Mutex<Sequencer>> {
        &self.sequencer
    }

    pub fn handle(&self, event: InputEvent) -> Result<Action> {
        let action = {
            let mut seq = lock(&self.sequencer);
            let action = seq.dispatch(event)?;
            if let Action::Recording(recording) = action {
                self.indicator.set(recording);
            }
            action
        };
        debug!("{:?} -> {:?}", event, action);

        if let Action::Play(sound) = action {
            self.bank.play(sound);
        }
        Ok(action)
    }

    /// Turns the record indicator off; call on shutdown.
    pub fn release(&self) {
        self.indicator.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::RecordingBank;
    use crate::indicator::SharedIndicator;
    use crate::sequencer::{PatternGrid, Tempo, STEP_COUNT};

    fn sequencer() -> Sequencer {
        Sequencer::new(Tempo::from_bpm(120.0).unwrap())
    }

    fn dispatcher() -> (Dispatcher, Arc<RecordingBank>, Arc<SharedIndicator>) {
        let bank = Arc::new(RecordingBank::new(SOUND_COUNT));
        let indicator = Arc::new(SharedIndicator::new());
        let dispatcher = Dispatcher::new(
            Arc::new(Mutex::new(sequencer())),
            bank.clone(),
            indicator.clone(),
        )
        .unwrap();
        (dispatcher, bank, indicator)
    }

    #[test]
    fn test_logical_steps() {
        assert_eq!(InputEvent::SoundButton(0).logical_step(), Some(0));
        assert_eq!(InputEvent::SoundButton(5).logical_step(), Some(5));
        assert_eq!(InputEvent::StepButton(0).logical_step(), Some(6));
        assert_eq!(InputEvent::StepButton(5).logical_step(), Some(STEP_COUNT - 1));
        assert_eq!(InputEvent::PlayButton.logical_step(), None);
    }

    #[test]
    fn test_sound_button_plays_and_selects() {
        let (dispatcher, bank, _) = dispatcher();

        let action = dispatcher.handle(InputEvent::SoundButton(3)).unwrap();

        assert_eq!(action, Action::Play(3));
        assert_eq!(bank.played(), vec![3]);
        let seq = lock(dispatcher.sequencer());
        assert_eq!(seq.current_selection(), Some(3));
        assert_eq!(seq.grid(), &PatternGrid::new());
    }

    #[test]
    fn test_step_button_ignored_outside_recording() {
        let mut seq = sequencer();
        seq.dispatch(InputEvent::SoundButton(1)).unwrap();
        assert_eq!(seq.dispatch(InputEvent::StepButton(2)).unwrap(), Action::Ignored);
        assert!(seq.grid().is_empty());
    }

    #[test]
    fn test_step_button_toggles_selection_while_recording() {
        let mut seq = sequencer();
        seq.dispatch(InputEvent::SoundButton(3)).unwrap();
        seq.dispatch(InputEvent::RecordButton).unwrap();
        let before = seq.grid().is_armed(7, 3).unwrap();

        assert_eq!(
            seq.dispatch(InputEvent::StepButton(1)).unwrap(),
            Action::Toggled {
                step: 7,
                sound: 3,
                armed: !before
            }
        );
        assert_eq!(seq.grid().is_armed(7, 3).unwrap(), !before);

        seq.dispatch(InputEvent::StepButton(1)).unwrap();
        assert_eq!(seq.grid().is_armed(7, 3).unwrap(), before);
    }

    #[test]
    fn test_step_button_without_selection_is_noop() {
        let mut seq = sequencer();
        seq.dispatch(InputEvent::RecordButton).unwrap();
        assert_eq!(seq.dispatch(InputEvent::StepButton(0)).unwrap(), Action::Ignored);
        assert_eq!(seq.dispatch(InputEvent::SoundButton(0)).unwrap(), Action::Ignored);
        assert!(seq.grid().is_empty());
    }

    #[test]
    fn test_sound_button_while_recording_arms_selection_silently() {
        let (dispatcher, bank, _) = dispatcher();
        dispatcher.handle(InputEvent::SoundButton(2)).unwrap();
        dispatcher.handle(InputEvent::RecordButton).unwrap();
        bank.clear();

        let action = dispatcher.handle(InputEvent::SoundButton(4)).unwrap();

        assert_eq!(
            action,
            Action::Toggled {
                step: 4,
                sound: 2,
                armed: true
            }
        );
        assert!(bank.played().is_empty());
        let seq = lock(dispatcher.sequencer());
        assert_eq!(seq.current_selection(), Some(2));
        assert_eq!(seq.grid().armed(4).unwrap(), vec![2]);
    }

    #[test]
    fn test_recording_never_plays_armed_sounds() {
        let (dispatcher, bank, _) = dispatcher();
        dispatcher.handle(InputEvent::SoundButton(0)).unwrap();
        dispatcher.handle(InputEvent::RecordButton).unwrap();
        for step in 0..SOUND_COUNT {
            dispatcher.handle(InputEvent::SoundButton(step)).unwrap();
        }
        bank.clear();

        for _ in 0..3 {
            for step in 0..SOUND_COUNT {
                dispatcher.handle(InputEvent::SoundButton(step)).unwrap();
            }
        }
        assert!(bank.played().is_empty());
    }

    #[test]
    fn test_transport_buttons_toggle() {
        let (dispatcher, _, indicator) = dispatcher();
        assert!(!indicator.is_lit());

        assert_eq!(dispatcher.handle(InputEvent::PlayButton).unwrap(), Action::Playing(true));
        assert_eq!(
            dispatcher.handle(InputEvent::RecordButton).unwrap(),
            Action::Recording(true)
        );
        assert!(indicator.is_lit());
        assert_eq!(
            dispatcher.handle(InputEvent::RecordButton).unwrap(),
            Action::Recording(false)
        );
        assert!(!indicator.is_lit());
        assert_eq!(dispatcher.handle(InputEvent::PlayButton).unwrap(), Action::Playing(false));

        dispatcher.handle(InputEvent::RecordButton).unwrap();
        dispatcher.release();
        assert!(!indicator.is_lit());
    }

    #[test]
    fn test_out_of_range_events_rejected() {
        let (dispatcher, bank, _) = dispatcher();
        dispatcher.handle(InputEvent::SoundButton(1)).unwrap();
        dispatcher.handle(InputEvent::RecordButton).unwrap();
        let before = lock(dispatcher.sequencer()).state().clone();

        for event in [
            InputEvent::SoundButton(SOUND_COUNT),
            InputEvent::StepButton(STEP_BUTTON_COUNT),
            InputEvent::StepButton(usize::MAX),
        ] {
            assert!(matches!(
                dispatcher.handle(event),
                Err(Error::ButtonOutOfRange(e)) if e == event
            ));
        }

        let seq = lock(dispatcher.sequencer());
        assert_eq!(seq.state(), &before);
        assert!(seq.grid().is_empty());
        assert_eq!(bank.played(), vec![1]);
    }

    #[test]
    fn test_bank_size_must_match() {
        let result = Dispatcher::new(
            Arc::new(Mutex::new(sequencer())),
            Arc::new(RecordingBank::new(SOUND_COUNT - 1)),
            Arc::new(SharedIndicator::new()),
        );
        assert!(matches!(
            result,
            Err(Error::SoundCountMismatch { found, .. }) if found == SOUND_COUNT - 1
        ));
    }

    #[test]
    fn test_parse_console_events() {
        assert_eq!("s3".parse::<InputEvent>().unwrap(), InputEvent::SoundButton(3));
        assert_eq!("step 5".parse::<InputEvent>().unwrap(), InputEvent::StepButton(5));
        assert_eq!(" P ".parse::<InputEvent>().unwrap(), InputEvent::PlayButton);
        assert_eq!("rec".parse::<InputEvent>().unwrap(), InputEvent::RecordButton);

        assert!(matches!("x1".parse::<InputEvent>(), Err(Error::UnknownCommand(_))));
        assert!(matches!("s".parse::<InputEvent>(), Err(Error::UnknownCommand(_))));
        assert!(matches!("s9".parse::<InputEvent>(), Err(Error::ButtonOutOfRange(_))));
    }
}
