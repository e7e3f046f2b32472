// Standard MIDI File export.
//
// Writes one cycle of every track into a single-track (format 0) file:
// tempo and time signature up front, then one drum note per onset, each a
// sixteenth long. Sixteenth offsets become ticks at a quarter of a beat
// each.

use std::path::Path;

use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track as SmfTrack, TrackEvent,
    TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};

use crate::audio::{DRUM_CHANNEL, Track};
use crate::error::Result;
use crate::timing::Meter;

/// Ticks per quarter note in exported files.
pub const TICKS_PER_QUARTER: u32 = 480;

/// Ticks per sixteenth note; also the length of every exported note.
pub const TICKS_PER_SIXTEENTH: u32 = TICKS_PER_QUARTER / 4;

struct Timed {
    tick: u32,
    // Note-offs sort before note-ons on the same tick.
    is_on: bool,
    key: u8,
    velocity: u8,
}

fn tempo_micros(bpm: f64) -> u32 {
    ((60_000_000.0 / bpm).round() as u32).clamp(1, 0x00FF_FFFF)
}

fn time_signature(meter: Meter) -> Option<MetaMessage<'static>> {
    if !meter.denominator.is_power_of_two() || meter.numerator > u8::MAX as u32 {
        return None;
    }
    Some(MetaMessage::TimeSignature(
        meter.numerator as u8,
        meter.denominator.trailing_zeros() as u8,
        24,
        8,
    ))
}

/// Builds the in-memory file. Reads the tracks only.
pub fn tracks_to_smf(tracks: &[Track], bpm: f64, meter: Meter) -> Smf<'static> {
    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER as u16)),
    ));

    let mut out: SmfTrack<'static> = vec![TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_micros(bpm)))),
    }];
    if let Some(sig) = time_signature(meter) {
        out.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(sig),
        });
    }

    let mut timed = Vec::new();
    for track in tracks {
        for event in track
            .events()
            .iter()
            .filter(|e| e.timestamp < track.length())
        {
            let tick = event.timestamp * TICKS_PER_SIXTEENTH;
            timed.push(Timed {
                tick,
                is_on: true,
                key: track.pitch(),
                velocity: event.velocity,
            });
            timed.push(Timed {
                tick: tick + TICKS_PER_SIXTEENTH,
                is_on: false,
                key: track.pitch(),
                velocity: 0,
            });
        }
    }
    timed.sort_by_key(|t| (t.tick, t.is_on));

    let channel = u4::new(DRUM_CHANNEL);
    let mut last_tick = 0;
    for t in timed {
        let message = if t.is_on {
            MidiMessage::NoteOn {
                key: u7::new(t.key.min(127)),
                vel: u7::new(t.velocity.min(127)),
            }
        } else {
            MidiMessage::NoteOff {
                key: u7::new(t.key.min(127)),
                vel: u7::new(0),
            }
        };
        out.push(TrackEvent {
            delta: u28::new(t.tick - last_tick),
            kind: TrackEventKind::Midi { channel, message },
        });
        last_tick = t.tick;
    }

    out.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(out);
    smf
}

/// Converts the tracks to MIDI and writes them to `path`.
pub fn write_midi(tracks: &[Track], bpm: f64, meter: Meter, path: &Path) -> Result<()> {
    let smf = tracks_to_smf(tracks, bpm, meter);
    smf.save(path)?;
    Ok(())
}
