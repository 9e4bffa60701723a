/// MIDI output using midir: each sound is a General MIDI drum note
use std::sync::Mutex;

use midir::{MidiOutput, MidiOutputConnection};
use tracing::{info, warn};

use crate::audio::SampleBank;
use crate::error::{Error, Result};
use crate::sequencer::SOUND_COUNT;

const CLIENT_NAME: &str = "thrum MIDI Output";

/// Channel 10, the General MIDI percussion channel.
const DRUM_CHANNEL: u8 = 9;
const VELOCITY: u8 = 100;

/// Snare, bass drum, clap, high tom, electric snare, snare.
pub const DEFAULT_DRUM_NOTES: [u8; SOUND_COUNT] = [38, 36, 39, 50, 40, 38];

pub struct MidiDrumBank {
    connection: Mutex<MidiOutputConnection>,
    notes: Vec<u8>,
}

impl MidiDrumBank {
    pub fn available_ports() -> Vec<String> {
        if let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) {
            midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect()
        } else {
            vec![]
        }
    }

    pub fn connect(port_index: usize, notes: &[u8]) -> Result<Self> {
        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| Error::Midi(format!("failed to create MIDI output: {}", e)))?;

        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| Error::Midi(format!("no MIDI port {}", port_index)))?;
        let port_name = midi_out.port_name(port).unwrap_or_default();

        let connection = midi_out
            .connect(port, "thrum")
            .map_err(|e| Error::Midi(format!("failed to connect: {}", e)))?;

        let names: Vec<String> = notes.iter().map(|&n| midi_note_name(n)).collect();
        info!("MIDI output on {:?}, drum notes {:?}", port_name, names);

        Ok(Self {
            connection: Mutex::new(connection),
            notes: notes.to_vec(),
        })
    }
}

impl SampleBank for MidiDrumBank {
    fn len(&self) -> usize {
        self.notes.len()
    }

    fn play(&self, sound: usize) {
        let Some(&note) = self.notes.get(sound) else {
            warn!("No MIDI note for sound {}", sound);
            return;
        };
        let mut conn = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        let sent = conn
            .send(&[0x90 | DRUM_CHANNEL, note, VELOCITY])
            .and_then(|()| conn.send(&[0x80 | DRUM_CHANNEL, note, 0]));
        if let Err(e) = sent {
            warn!("Failed to send MIDI note {}: {}", note, e);
        }
    }
}

pub fn midi_note_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_names() {
        assert_eq!(midi_note_name(60), "C4");
        assert_eq!(midi_note_name(36), "C2");
        assert_eq!(midi_note_name(39), "D#2");
        assert_eq!(midi_note_name(0), "C-1");
    }

    #[test]
    fn test_default_notes_are_percussion_range() {
        assert!(DEFAULT_DRUM_NOTES.iter().all(|n| (35..=81).contains(n)));
    }
}
