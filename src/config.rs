/// Startup configuration, optionally read from a TOML file
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::midi::DEFAULT_DRUM_NOTES;
use crate::sequencer::{Tempo, SOUND_COUNT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bpm")]
    pub bpm: f32,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub samples: SampleConfig,
    #[serde(default)]
    pub midi: MidiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleConfig {
    #[serde(default = "default_sample_paths")]
    pub paths: Vec<PathBuf>,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiConfig {
    #[serde(default)]
    pub port: Option<usize>,
    #[serde(default = "default_notes")]
    pub notes: Vec<u8>,
}

fn default_bpm() -> f32 {
    150.0
}

fn default_volume() -> f32 {
    0.95
}

fn default_notes() -> Vec<u8> {
    DEFAULT_DRUM_NOTES.to_vec()
}

fn default_sample_paths() -> Vec<PathBuf> {
    [
        "samples/606SNAR.WAV",
        "samples/CR8KBASS.WAV",
        "samples/CR8KCLAP.WAV",
        "samples/CR8KHITM.WAV",
        "samples/CR8KSNAR.WAV",
        "samples/snare.wav",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bpm: default_bpm(),
            verbose: false,
            samples: SampleConfig::default(),
            midi: MidiConfig::default(),
        }
    }
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            paths: default_sample_paths(),
            volume: default_volume(),
        }
    }
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            port: None,
            notes: default_notes(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Checks everything the engine relies on and returns the tempo.
    pub fn validate(&self) -> Result<Tempo> {
        let tempo = Tempo::from_bpm(self.bpm)?;
        let volume = self.samples.volume;
        if !(volume.is_finite() && volume >= 0.0) {
            return Err(Error::InvalidVolume(volume));
        }
        if self.samples.paths.len() != SOUND_COUNT {
            return Err(Error::SoundCountMismatch {
                what: "sample paths",
                expected: SOUND_COUNT,
                found: self.samples.paths.len(),
            });
        }
        if self.midi.notes.len() != SOUND_COUNT {
            return Err(Error::SoundCountMismatch {
                what: "MIDI notes",
                expected: SOUND_COUNT,
                found: self.midi.notes.len(),
            });
        }
        Ok(tempo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        let tempo = config.validate().unwrap();
        assert_eq!(tempo.bpm(), 150.0);
        assert_eq!(config.samples.volume, 0.95);
        assert!(!config.verbose);
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_load_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
bpm = 98.5
verbose = true

[samples]
volume = 0.5

[midi]
port = 1
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.bpm, 98.5);
        assert!(config.verbose);
        assert_eq!(config.samples.volume, 0.5);
        assert_eq!(config.samples.paths.len(), SOUND_COUNT);
        assert_eq!(config.midi.port, Some(1));
        assert_eq!(config.midi.notes, DEFAULT_DRUM_NOTES.to_vec());
    }

    #[test]
    fn test_rejects_bad_tempo() {
        for bpm in [0.0, -120.0, f32::NAN, 1e-20, 1e12] {
            let config = Config {
                bpm,
                ..Config::default()
            };
            assert!(matches!(config.validate(), Err(Error::InvalidTempo(_))));
        }
    }

    #[test]
    fn test_rejects_bad_volume() {
        for volume in [-0.5, f32::NAN, f32::INFINITY] {
            let mut config = Config::default();
            config.samples.volume = volume;
            let err = config.validate().unwrap_err();
            assert!(matches!(err, Error::InvalidVolume(_)));
            assert!(err.is_configuration());
        }

        let config = Config::parse("[samples]\nvolume = 0.0\n").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_wrong_sound_count() {
        let config = Config::parse("[samples]\npaths = [\"a.wav\", \"b.wav\"]\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(Error::SoundCountMismatch { found: 2, .. })
        ));

        let mut config = Config::default();
        config.midi.notes.push(42);
        assert!(matches!(
            config.validate(),
            Err(Error::SoundCountMismatch { found: 7, .. })
        ));
    }

    #[test]
    fn test_missing_file_and_bad_toml() {
        assert!(matches!(
            Config::load(Path::new("no/such/thrum.toml")),
            Err(Error::Io { .. })
        ));
        assert!(matches!(Config::parse("bpm = \"fast\""), Err(Error::Toml(_))));
    }
}
