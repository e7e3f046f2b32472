use std::collections::{HashMap, HashSet};

use midir::{MidiOutput, MidiOutputConnection};
use tracing::{info, warn};

use super::SoundTrigger;
use crate::error::{Result, SequencerError};
use crate::events::NoteEvent;

/// General MIDI percussion channel (channel 10, zero-based 9).
pub const DRUM_CHANNEL: u8 = 9;

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;

/// Plays every onset as a drum note on an external MIDI port.
pub struct MidiTrigger {
    connection: MidiOutputConnection,
    pitches: HashMap<String, u8>,
    sounding: HashSet<u8>,
}

impl MidiTrigger {
    /// Connects to the first port whose name contains `port`, or to the
    /// first available port.
    pub fn connect(port: Option<&str>, pitches: HashMap<String, u8>) -> Result<Self> {
        let output =
            MidiOutput::new("beatwalk").map_err(|e| SequencerError::MidiOutput(e.to_string()))?;
        let ports = output.ports();

        let selected = match port {
            Some(wanted) => ports.iter().find(|p| {
                output
                    .port_name(p)
                    .map(|name| name.contains(wanted))
                    .unwrap_or(false)
            }),
            None => ports.first(),
        }
        .cloned()
        .ok_or_else(|| {
            SequencerError::MidiOutput(match port {
                Some(wanted) => format!("no output port matching '{wanted}'"),
                None => "no output ports available".into(),
            })
        })?;

        let name = output
            .port_name(&selected)
            .unwrap_or_else(|_| "unknown".into());
        let connection = output
            .connect(&selected, "beatwalk-out")
            .map_err(|e| SequencerError::MidiOutput(e.to_string()))?;
        info!(port = %name, "connected midi output");

        Ok(Self {
            connection,
            pitches,
            sounding: HashSet::new(),
        })
    }

    fn send(&mut self, message: [u8; 3]) {
        if let Err(e) = self.connection.send(&message) {
            warn!("midi send failed: {e}");
        }
    }
}

impl SoundTrigger for MidiTrigger {
    fn trigger(&mut self, track: &str, event: &NoteEvent) {
        let Some(&pitch) = self.pitches.get(track) else {
            return;
        };
        if self.sounding.remove(&pitch) {
            self.send([NOTE_OFF | DRUM_CHANNEL, pitch, 0]);
        }
        self.send([NOTE_ON | DRUM_CHANNEL, pitch, event.velocity.min(127)]);
        self.sounding.insert(pitch);
    }
}

impl Drop for MidiTrigger {
    fn drop(&mut self) {
        for pitch in std::mem::take(&mut self.sounding) {
            self.send([NOTE_OFF | DRUM_CHANNEL, pitch, 0]);
        }
    }
}
