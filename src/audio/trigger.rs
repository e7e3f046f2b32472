use tracing::info;

use crate::events::NoteEvent;

/// The one audible side effect of the sequencer: fire the sound bound to a
/// track. Implementations must return immediately and never wait for
/// playback to finish.
pub trait SoundTrigger: Send {
    fn trigger(&mut self, track: &str, event: &NoteEvent);
}

/// Headless trigger that only logs each onset.
#[derive(Debug, Default)]
pub struct LogTrigger;

impl SoundTrigger for LogTrigger {
    fn trigger(&mut self, track: &str, event: &NoteEvent) {
        info!(
            track,
            sixteenth = event.timestamp,
            velocity = event.velocity,
            "onset"
        );
    }
}
