/// Playback engine - step timing and sample triggers
use std::sync::mpsc::{channel, sync_channel, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::{lock, Sequencer, Step, Tempo};
use crate::audio::SampleBank;

/// How often a paused engine looks at the transport again.
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Undrained playback events beyond this are dropped.
const EVENT_QUEUE: usize = 256;

/// Elapsed time since some fixed origin.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Duration;
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven time, for tests and offline rendering.
#[derive(Debug, Default)]
pub struct ManualTime {
    now: Mutex<Duration>,
}

impl ManualTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now: Duration) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) += by;
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Decides when the sequencer advances. Deadlines are spaced by adding the
/// step interval to the previous deadline, so late polls never push later
/// steps back.
#[derive(Debug, Clone)]
pub struct StepClock {
    interval: Duration,
    next_deadline: Option<Duration>,
    last_advance: Option<Duration>,
}

impl StepClock {
    pub fn new(tempo: Tempo) -> Self {
        Self {
            interval: tempo.step_interval(),
            next_deadline: None,
            last_advance: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Deadline of the next advance, `None` while paused.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.next_deadline
    }

    /// Advances `sequencer` by one step if it is playing and the deadline has
    /// passed at `now`. While paused the deadline is dropped; on resume it
    /// picks up one interval after the last advance, or at `now` if that is
    /// already over, so paused time is never caught up.
    pub fn poll(&mut self, now: Duration, sequencer: &mut Sequencer) -> Option<Step> {
        if !sequencer.is_playing() {
            self.next_deadline = None;
            return None;
        }

        let interval = self.interval;
        let last_advance = self.last_advance;
        let deadline = *self.next_deadline.get_or_insert_with(|| match last_advance {
            Some(last) => (last + interval).max(now),
            None => now,
        });
        if now < deadline {
            return None;
        }

        self.last_advance = Some(deadline);
        self.next_deadline = Some(deadline + interval);
        Some(sequencer.advance())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    StepAdvanced(usize),
    SampleTriggered(usize),
}

/// Runs a [`StepClock`] on a background thread against a shared sequencer.
pub struct PlaybackEngine {
    sender: SyncSender<PlaybackEvent>,
    receiver: Receiver<PlaybackEvent>,
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    pub fn new() -> Self {
        let (sender, receiver) = sync_channel(EVENT_QUEUE);

        Self {
            sender,
            receiver,
            stop: None,
            worker: None,
        }
    }

    pub fn start(
        &mut self,
        sequencer: Arc<Mutex<Sequencer>>,
        bank: Arc<dyn SampleBank>,
        time: Arc<dyn TimeSource>,
    ) {
        if self.is_running() {
            return;
        }

        let (stop_tx, stop_rx) = channel();
        let events = self.sender.clone();
        let mut clock = StepClock::new(lock(&sequencer).tempo());
        debug!("Step interval {:?}", clock.interval());

        let worker = thread::spawn(move || loop {
            let step = clock.poll(time.now(), &mut lock(&sequencer));

            if let Some(step) = step {
                trace!("Step {} -> {:?}", step.index, step.sounds);
                let _ = events.try_send(PlaybackEvent::StepAdvanced(step.index));
                for sound in step.sounds {
                    bank.play(sound);
                    let _ = events.try_send(PlaybackEvent::SampleTriggered(sound));
                }
            }

            let wait = match clock.next_deadline() {
                Some(deadline) => deadline.saturating_sub(time.now()),
                None => IDLE_POLL,
            };
            match stop_rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        self.stop = Some(stop_tx);
        self.worker = Some(worker);
    }

    /// Stops the playback thread and waits for it. Must not be called while
    /// holding the sequencer lock.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Playback thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
