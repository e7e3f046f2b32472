mod clock;
mod markov;
mod meter;
mod rhythm;
mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use markov::{
    Anchor, Edge, MarkovChain, Node, PROBABILITY_EPSILON, RandomSource, seeded_source,
};
pub use meter::Meter;
pub use rhythm::{COMPOSITE_SEPARATOR, ONSET_MARK, Rhythm, RhythmLine};
pub use scheduler::{
    MeterReference, POLL_INTERVAL, Scheduler, SchedulerConfig, TEMPO_RESYNC_EPSILON, TrackSpec,
    sixteenth_duration,
};
