mod midi_out;
mod sampler;
mod track;
mod trigger;

pub use midi_out::{DRUM_CHANNEL, MidiTrigger};
pub use sampler::{SampleOutput, SampleTrigger, load_wav, start_sample_output};
pub use track::Track;
pub use trigger::{LogTrigger, SoundTrigger};
