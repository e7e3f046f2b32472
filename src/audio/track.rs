use super::SoundTrigger;
use crate::error::{Result, SequencerError};
use crate::events::NoteEvent;

/// One instrument's cyclic onset pattern.
///
/// Events are kept sorted by timestamp with at most one event per
/// timestamp. `cursor` always points at the next event due. Rhythm and
/// length changes are staged and only swapped in once the cycle completes,
/// so the step after the swap plays position 0 of the new rhythm.
#[derive(Debug, Clone)]
pub struct Track {
    name: String,
    pitch: u8,
    velocity: u8,
    length: u32,
    phase: u32,
    cursor: usize,
    events: Vec<NoteEvent>,
    pending_events: Option<Vec<NoteEvent>>,
    pending_length: Option<u32>,
}

fn normalize(mut events: Vec<NoteEvent>) -> Vec<NoteEvent> {
    events.sort_by_key(|e| e.timestamp);
    events.dedup_by_key(|e| e.timestamp);
    events
}

impl Track {
    /// Fails on a zero length: a track cannot loop over an empty cycle.
    pub fn new(name: impl Into<String>, length: u32, pitch: u8, velocity: u8) -> Result<Self> {
        let name = name.into();
        if length == 0 {
            return Err(SequencerError::ZeroLength(name));
        }
        Ok(Self {
            name,
            pitch,
            velocity,
            length,
            phase: length - 1,
            cursor: 0,
            events: Vec::new(),
            pending_events: None,
            pending_length: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// MIDI pitch lane used for output and export.
    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    /// Velocity given to generated onsets.
    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    /// Position last played within the cycle.
    pub fn phase(&self) -> u32 {
        self.phase
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn events(&self) -> &[NoteEvent] {
        &self.events
    }

    pub fn pending_events(&self) -> Option<&[NoteEvent]> {
        self.pending_events.as_deref()
    }

    pub fn pending_length(&self) -> Option<u32> {
        self.pending_length
    }

    pub fn has_pending(&self) -> bool {
        self.pending_events.is_some() || self.pending_length.is_some()
    }

    /// The rhythm that will be playing after the next cycle boundary.
    pub fn upcoming_events(&self) -> &[NoteEvent] {
        self.pending_events.as_deref().unwrap_or(&self.events)
    }

    /// Inserts an event. An occupied timestamp is left alone unless
    /// `replace` is set, in which case the old event is overwritten.
    /// Returns whether the track changed.
    pub fn add_note(&mut self, event: NoteEvent, replace: bool) -> bool {
        match self
            .events
            .binary_search_by_key(&event.timestamp, |e| e.timestamp)
        {
            Ok(idx) => {
                if !replace {
                    return false;
                }
                self.events[idx] = event;
            }
            Err(idx) => {
                self.events.insert(idx, event);
                self.resync_cursor();
            }
        }
        true
    }

    /// Replaces the live rhythm immediately. Only meant for tracks that
    /// are not playing yet.
    pub fn set_events(&mut self, events: Vec<NoteEvent>) {
        self.events = normalize(events);
        self.resync_cursor();
    }

    pub fn stage_rhythm(&mut self, events: Vec<NoteEvent>) {
        self.pending_events = Some(normalize(events));
    }

    pub fn stage_length(&mut self, length: u32) -> Result<()> {
        if length == 0 {
            return Err(SequencerError::ZeroLength(self.name.clone()));
        }
        self.pending_length = Some(length);
        Ok(())
    }

    fn resync_cursor(&mut self) {
        let (phase, length) = (self.phase, self.length);
        self.cursor = self
            .events
            .iter()
            .position(|e| e.timestamp > phase && e.timestamp < length)
            .unwrap_or(0);
    }

    fn apply_pending(&mut self) {
        if let Some(events) = self.pending_events.take() {
            self.events = events;
        }
        if let Some(length) = self.pending_length.take() {
            self.length = length;
        }
        self.cursor = 0;
        self.phase = self.length - 1;
    }

    /// Advances one sixteenth and fires the event due at the new phase,
    /// if any.
    pub fn step(&mut self, trigger: &mut dyn SoundTrigger) -> Option<NoteEvent> {
        self.phase = (self.phase + 1) % self.length;

        let mut fired = None;
        if let Some(event) = self.events.get(self.cursor).copied() {
            if event.timestamp == self.phase {
                trigger.trigger(&self.name, &event);
                self.cursor = (self.cursor + 1) % self.events.len();
                fired = Some(event);
            }
        }

        // Left over from a longer cycle.
        if self
            .events
            .get(self.cursor)
            .is_some_and(|e| e.timestamp >= self.length)
        {
            self.cursor = 0;
        }

        if self.phase + 1 == self.length && self.has_pending() {
            self.apply_pending();
        }

        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        fired: Vec<(String, u32)>,
    }

    impl SoundTrigger for Recorder {
        fn trigger(&mut self, track: &str, event: &NoteEvent) {
            self.fired.push((track.to_string(), event.timestamp));
        }
    }

    fn track_with(length: u32, onsets: &[u32]) -> Track {
        let mut track = Track::new("low", length, 36, 100).unwrap();
        track.set_events(NoteEvent::from_onsets(onsets, 100));
        track
    }

    fn stamps(track: &Track) -> Vec<u32> {
        track.events().iter().map(|e| e.timestamp).collect()
    }

    #[test]
    fn add_note_without_replace_is_a_no_op_on_collision() {
        let mut track = Track::new("low", 16, 36, 100).unwrap();
        assert!(track.add_note(NoteEvent::new(4, 1, 100).unwrap(), false));
        assert!(!track.add_note(NoteEvent::new(4, 2, 50).unwrap(), false));

        assert_eq!(track.events().len(), 1);
        assert_eq!(track.events()[0], NoteEvent::new(4, 1, 100).unwrap());
    }

    #[test]
    fn add_note_with_replace_overwrites() {
        let mut track = Track::new("low", 16, 36, 100).unwrap();
        track.add_note(NoteEvent::new(4, 1, 100).unwrap(), false);
        assert!(track.add_note(NoteEvent::new(4, 2, 50).unwrap(), true));

        assert_eq!(track.events().len(), 1);
        assert_eq!(track.events()[0], NoteEvent::new(4, 2, 50).unwrap());
    }

    #[test]
    fn add_note_keeps_events_sorted_and_unique() {
        let mut track = Track::new("low", 16, 36, 100).unwrap();
        for ts in [12, 0, 8, 4, 8, 0] {
            track.add_note(NoteEvent::onset(ts, 100), false);
        }
        assert_eq!(stamps(&track), vec![0, 4, 8, 12]);
    }

    #[test]
    fn first_step_plays_position_zero() {
        let mut track = track_with(4, &[0, 2]);
        let mut rec = Recorder::default();

        assert_eq!(track.step(&mut rec).map(|e| e.timestamp), Some(0));
        assert_eq!(track.phase(), 0);
        assert!(track.step(&mut rec).is_none());
        assert_eq!(track.step(&mut rec).map(|e| e.timestamp), Some(2));
    }

    #[test]
    fn a_full_cycle_fires_every_event_once_from_any_phase() {
        let onsets = [0, 3, 4, 9, 15];
        for offset in 0..16 {
            let mut track = track_with(16, &onsets);
            let mut warmup = Recorder::default();
            for _ in 0..offset {
                track.step(&mut warmup);
            }

            let cursor = track.cursor();
            let mut rec = Recorder::default();
            for _ in 0..track.length() {
                track.step(&mut rec);
            }

            assert_eq!(track.cursor(), cursor, "offset {offset}");
            let fired: Vec<u32> = rec.fired.iter().map(|(_, ts)| *ts).collect();
            let mut sorted = fired.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, onsets.to_vec(), "offset {offset}");

            // Fired order is the ascending order rotated to the start phase.
            let start = fired.iter().position(|ts| *ts == sorted[0]).unwrap();
            let mut rotated = fired[start..].to_vec();
            rotated.extend_from_slice(&fired[..start]);
            assert_eq!(rotated, sorted, "offset {offset}");
        }
    }

    #[test]
    fn zero_length_is_rejected() {
        assert!(matches!(
            Track::new("low", 0, 36, 100),
            Err(SequencerError::ZeroLength(name)) if name == "low"
        ));

        let mut track = track_with(8, &[0]);
        assert!(track.stage_length(0).is_err());
        assert!(!track.has_pending());
        assert_eq!(track.length(), 8);
    }

    #[test]
    fn empty_tracks_step_silently() {
        let mut track = Track::new("mid", 8, 38, 100).unwrap();
        let mut rec = Recorder::default();
        for _ in 0..20 {
            assert!(track.step(&mut rec).is_none());
        }
        assert!(rec.fired.is_empty());
    }

    #[test]
    fn staged_rhythm_waits_for_the_cycle_boundary() {
        let mut track = track_with(8, &[0, 4]);
        let mut rec = Recorder::default();
        for _ in 0..3 {
            track.step(&mut rec);
        }
        track.stage_rhythm(NoteEvent::from_onsets(&[2, 6], 100));

        for _ in 3..8 {
            track.step(&mut rec);
        }
        assert!(!track.has_pending());
        for _ in 0..8 {
            track.step(&mut rec);
        }

        let fired: Vec<u32> = rec.fired.iter().map(|(_, ts)| *ts).collect();
        assert_eq!(fired, vec![0, 4, 2, 6]);
    }

    #[test]
    fn length_changes_apply_only_at_phase_zero() {
        let mut track = track_with(14, &[0, 6, 9]);
        let mut rec = Recorder::default();
        for _ in 0..5 {
            track.step(&mut rec);
        }
        track.stage_length(20).unwrap();

        for _ in 5..14 {
            assert_eq!(track.length(), 14);
            track.step(&mut rec);
        }
        assert_eq!(track.length(), 20);
        track.step(&mut rec);
        assert_eq!(track.phase(), 0);
        assert!(track.phase() < track.length());
    }

    #[test]
    fn stale_events_are_skipped_after_a_shrink() {
        let mut track = track_with(20, &[0, 10, 16]);
        track.stage_length(14).unwrap();
        let mut rec = Recorder::default();
        for _ in 0..20 {
            track.step(&mut rec);
        }
        assert_eq!(track.length(), 14);

        rec.fired.clear();
        for _ in 0..28 {
            track.step(&mut rec);
        }
        let fired: Vec<u32> = rec.fired.iter().map(|(_, ts)| *ts).collect();
        assert_eq!(fired, vec![0, 10, 0, 10]);
    }

    #[test]
    fn insertion_while_playing_keeps_the_cursor_on_the_next_due_event() {
        let mut track = track_with(8, &[0, 6]);
        let mut rec = Recorder::default();
        track.step(&mut rec);
        track.step(&mut rec);
        track.add_note(NoteEvent::onset(4, 100), false);

        for _ in 2..8 {
            track.step(&mut rec);
        }
        let fired: Vec<u32> = rec.fired.iter().map(|(_, ts)| *ts).collect();
        assert_eq!(fired, vec![0, 4, 6]);
    }
}
