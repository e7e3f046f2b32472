pub mod audio;
pub mod command;
pub mod engine;
pub mod error;
pub mod events;
pub mod midi;
pub mod project;
pub mod timing;
pub mod ui;

pub use command::{Command, TrackSelector};
pub use engine::{EngineHandle, Interrupter, spawn_engine};
pub use error::{Result, SequencerError};
pub use events::{NoteEvent, Notification};
pub use project::{Output, Project};
pub use timing::{MarkovChain, Meter, Scheduler, SchedulerConfig};
