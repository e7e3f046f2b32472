use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, SequencerError};
use crate::timing::Meter;

/// Default onset velocity for generated and reference rhythms.
pub const DEFAULT_VELOCITY: u8 = 100;

/// Default onset duration, in sixteenths.
pub const DEFAULT_DURATION: u32 = 1;

/// A single onset within a track's cycle. Timestamps and durations are in
/// sixteenth notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub timestamp: u32,
    pub duration: u32,
    pub velocity: u8,
}

impl NoteEvent {
    pub fn new(timestamp: u32, duration: u32, velocity: u8) -> Result<Self> {
        if duration == 0 {
            return Err(SequencerError::InvalidNoteEvent(format!(
                "zero duration at sixteenth {timestamp}"
            )));
        }
        if velocity > 127 {
            return Err(SequencerError::InvalidNoteEvent(format!(
                "velocity {velocity} out of range at sixteenth {timestamp}"
            )));
        }

        Ok(Self {
            timestamp,
            duration,
            velocity,
        })
    }

    /// Onset with the default duration and the given velocity. The
    /// velocity is clamped into MIDI range.
    pub fn onset(timestamp: u32, velocity: u8) -> Self {
        Self {
            timestamp,
            duration: DEFAULT_DURATION,
            velocity: velocity.min(127),
        }
    }

    /// Turns a list of onset positions into events, sorted and free of
    /// duplicate timestamps.
    pub fn from_onsets(onsets: &[u32], velocity: u8) -> Vec<Self> {
        let mut positions = onsets.to_vec();
        positions.sort_unstable();
        positions.dedup();
        positions
            .into_iter()
            .map(|timestamp| Self::onset(timestamp, velocity))
            .collect()
    }
}

/// Status reported by the scheduler to whoever drives it.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Started { bpm: f64, meter: Meter },
    TempoChanged { bpm: f64 },
    RhythmStaged { track: String, onsets: Vec<u32> },
    MeterChanged { meter: Meter, length: u32 },
    Exported { path: PathBuf },
    ExportFailed { path: PathBuf, message: String },
    UnknownTrack { name: String },
    Stopped,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Started { bpm, meter } => {
                write!(f, "playing {meter} at {bpm}bpm")
            }
            Notification::TempoChanged { bpm } => write!(f, "tempo set to {bpm}bpm"),
            Notification::RhythmStaged { track, onsets } => {
                write!(f, "new {track} rhythm from next bar: {onsets:?}")
            }
            Notification::MeterChanged { meter, length } => {
                write!(f, "switching to {meter} ({length} sixteenths) from next bar")
            }
            Notification::Exported { path } => write!(f, "exported {}", path.display()),
            Notification::ExportFailed { path, message } => {
                write!(f, "export to {} failed: {message}", path.display())
            }
            Notification::UnknownTrack { name } => write!(f, "no track named '{name}'"),
            Notification::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_duration() {
        assert!(NoteEvent::new(3, 0, 100).is_err());
    }

    #[test]
    fn rejects_velocity_above_midi_range() {
        assert!(NoteEvent::new(0, 1, 128).is_err());
        assert!(NoteEvent::new(0, 1, 127).is_ok());
    }

    #[test]
    fn onsets_are_sorted_and_deduplicated() {
        let events = NoteEvent::from_onsets(&[8, 0, 4, 8], 90);
        let stamps: Vec<u32> = events.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![0, 4, 8]);
        assert!(events.iter().all(|e| e.velocity == 90 && e.duration == 1));
    }
}
