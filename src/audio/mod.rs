/// Sample playback: the `SampleBank` seam and a cpal-backed drum mixer
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};

/// Simultaneous voices the mixer will play; the oldest is cut when full.
pub const MAX_VOICES: usize = 12;

/// Pending triggers between the sequencer and the audio callback.
const TRIGGER_QUEUE: usize = 64;

/// Something that can play numbered sounds. `play` must return promptly and
/// never wait for the sound to finish; repeated calls overlap.
pub trait SampleBank: Send + Sync {
    fn len(&self) -> usize;

    fn play(&self, sound: usize);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Plays the same trigger on several banks, e.g. speakers and MIDI.
pub struct MultiBank {
    banks: Vec<Arc<dyn SampleBank>>,
    len: usize,
}

impl MultiBank {
    pub fn new(banks: Vec<Arc<dyn SampleBank>>) -> Result<Self> {
        let len = banks.first().map_or(0, |bank| bank.len());
        if let Some(bank) = banks.iter().find(|bank| bank.len() != len) {
            return Err(Error::SoundCountMismatch {
                what: "combined sample banks",
                expected: len,
                found: bank.len(),
            });
        }
        Ok(Self { banks, len })
    }
}

impl SampleBank for MultiBank {
    fn len(&self) -> usize {
        self.len
    }

    fn play(&self, sound: usize) {
        for bank in &self.banks {
            bank.play(sound);
        }
    }
}

/// A bank with no output at all; triggers are only logged.
pub struct SilentBank {
    len: usize,
}

impl SilentBank {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl SampleBank for SilentBank {
    fn len(&self) -> usize {
        self.len
    }

    fn play(&self, sound: usize) {
        trace!("Sound {} (silent)", sound);
    }
}

/// A decoded mono sample.
#[derive(Debug, Clone)]
pub struct Sample {
    frames: Vec<f32>,
    sample_rate: u32,
}

impl Sample {
    pub fn from_frames(frames: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate,
        }
    }

    /// Reads a WAV file, mixes it down to mono and applies `volume`.
    pub fn load(path: &Path, volume: f32) -> Result<Self> {
        let wav_err = |source| Error::Wav {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = hound::WavReader::open(path).map_err(wav_err)?;
        let spec = reader.spec();

        let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(wav_err)?,
            (hound::SampleFormat::Int, bits @ 1..=32) => {
                let scale = 1.0 / (1u64 << (bits - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 * scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(wav_err)?
            }
            (format, bits) => {
                return Err(Error::UnsupportedSample {
                    path: path.to_path_buf(),
                    detail: format!("{:?} with {} bits", format, bits),
                })
            }
        };

        let channels = usize::from(spec.channels.max(1));
        let frames = samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32 * volume)
            .collect::<Vec<_>>();

        debug!(
            "Loaded {:?}: {} frames at {} Hz",
            path,
            frames.len(),
            spec.sample_rate
        );
        Ok(Self::from_frames(frames, spec.sample_rate))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

pub fn load_samples(paths: &[PathBuf], volume: f32) -> Result<Vec<Sample>> {
    paths.iter().map(|path| Sample::load(path, volume)).collect()
}

#[derive(Debug, Clone, Copy)]
struct Voice {
    sound: usize,
    position: f64,
}

/// Audio-thread side: drains triggers and sums the running voices.
struct Mixer {
    samples: Vec<Sample>,
    voices: Vec<Voice>,
    triggers: HeapCons<usize>,
    channels: usize,
    output_rate: u32,
}

impl Mixer {
    fn new(samples: Vec<Sample>, triggers: HeapCons<usize>, channels: usize, output_rate: u32) -> Self {
        Self {
            samples,
            voices: Vec::with_capacity(MAX_VOICES),
            triggers,
            channels: channels.max(1),
            output_rate,
        }
    }

    /// Fills interleaved `out` with the next frames of every voice.
    fn render(&mut self, out: &mut [f32]) {
        while let Some(sound) = self.triggers.try_pop() {
            if sound >= self.samples.len() {
                continue;
            }
            if self.voices.len() == MAX_VOICES {
                self.voices.remove(0);
            }
            self.voices.push(Voice {
                sound,
                position: 0.0,
            });
        }

        for frame in out.chunks_mut(self.channels) {
            let mut mixed = 0.0f32;
            for voice in &mut self.voices {
                let sample = &self.samples[voice.sound];
                if let Some(&value) = sample.frames.get(voice.position as usize) {
                    mixed += value;
                }
                voice.position += f64::from(sample.sample_rate) / f64::from(self.output_rate);
            }
            frame.fill(mixed.clamp(-1.0, 1.0));
        }

        let samples = &self.samples;
        self.voices
            .retain(|voice| (voice.position as usize) < samples[voice.sound].frames.len());
    }
}

/// Sequencer side of the audio output. Triggers go through a lock-free queue,
/// so `play` never waits on the audio callback.
pub struct AudioBank {
    triggers: Mutex<HeapProd<usize>>,
    len: usize,
}

impl SampleBank for AudioBank {
    fn len(&self) -> usize {
        self.len
    }

    fn play(&self, sound: usize) {
        if sound >= self.len {
            warn!("Sound {} is not loaded", sound);
            return;
        }
        let mut triggers = self.triggers.lock().unwrap_or_else(|e| e.into_inner());
        if triggers.try_push(sound).is_err() {
            warn!("Trigger queue full, dropping sound {}", sound);
        }
    }
}

/// Audio output using cpal. Keep it alive for as long as sound should play.
pub struct AudioOutput {
    _stream: cpal::Stream,
    bank: Arc<AudioBank>,
}

impl AudioOutput {
    pub fn new(samples: Vec<Sample>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;
        let config = device
            .default_output_config()
            .map_err(|e| Error::Audio(format!("failed to get default output config: {}", e)))?;

        let len = samples.len();
        let (producer, consumer) = HeapRb::<usize>::new(TRIGGER_QUEUE).split();
        let format = config.sample_format();
        let config: cpal::StreamConfig = config.into();
        let mixer = Mixer::new(samples, consumer, usize::from(config.channels), config.sample_rate.0);

        let stream = match format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer)?,
            other => {
                return Err(Error::Audio(format!("unsupported sample format {:?}", other)))
            }
        };
        stream
            .play()
            .map_err(|e| Error::Audio(format!("failed to start stream: {}", e)))?;
        info!(
            "Audio output: {} Hz, {} channels, {} sounds",
            config.sample_rate.0, config.channels, len
        );

        Ok(Self {
            _stream: stream,
            bank: Arc::new(AudioBank {
                triggers: Mutex::new(producer),
                len,
            }),
        })
    }

    pub fn bank(&self) -> Arc<AudioBank> {
        Arc::clone(&self.bank)
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = vec![0.0; 4096];
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                let mixed = &mut scratch[..data.len()];
                mixer.render(mixed);
                for (out, &value) in data.iter_mut().zip(mixed.iter()) {
                    *out = T::from_sample(value);
                }
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| Error::Audio(format!("failed to build stream: {}", e)))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::SampleBank;
    use std::sync::Mutex;

    /// Remembers every trigger, in order.
    pub struct RecordingBank {
        len: usize,
        played: Mutex<Vec<usize>>,
    }

    impl RecordingBank {
        pub fn new(len: usize) -> Self {
            Self {
                len,
                played: Mutex::new(Vec::new()),
            }
        }

        pub fn played(&self) -> Vec<usize> {
            self.played.lock().unwrap().clone()
        }

        pub fn clear(&self) {
            self.played.lock().unwrap().clear();
        }
    }

    impl SampleBank for RecordingBank {
        fn len(&self) -> usize {
            self.len
        }

        fn play(&self, sound: usize) {
            self.played.lock().unwrap().push(sound);
        }
    }
}
