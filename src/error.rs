use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SequencerError>;

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("outgoing probabilities of node '{node}' would exceed 1 ({total} + {attempted})")]
    ProbabilityOverflow {
        node: String,
        total: f64,
        attempted: f64,
    },

    #[error("invalid transition probability {0}")]
    InvalidProbability(f64),

    #[error("a node named '{0}' already exists")]
    DuplicateNode(String),

    #[error("no node named '{0}'")]
    UnknownNode(String),

    #[error("node index {index} out of range (chain has {len} nodes)")]
    NodeIndexOutOfRange { index: usize, len: usize },

    #[error("rhythm file line {line}: {message}")]
    RhythmFormat { line: usize, message: String },

    #[error("reference rhythm for {meter} has {found} subdivisions, expected {expected}")]
    RhythmLengthMismatch {
        meter: String,
        expected: u32,
        found: u32,
    },

    #[error("invalid meter {numerator}/{denominator}")]
    InvalidMeter { numerator: u32, denominator: u32 },

    #[error("invalid tempo: {0} bpm")]
    InvalidBpm(f64),

    #[error("invalid note event: {0}")]
    InvalidNoteEvent(String),

    #[error("unknown track '{0}'")]
    UnknownTrack(String),

    #[error("track '{0}' needs a cycle of at least one sixteenth")]
    ZeroLength(String),

    #[error("duplicate track '{0}'")]
    DuplicateTrack(String),

    #[error("configuration has no {0}")]
    EmptyConfig(&'static str),

    #[error("sound asset not found: {}", .0.display())]
    MissingAsset(PathBuf),

    #[error("failed to decode {}: {source}", path.display())]
    Sample {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("audio backend: {0}")]
    Audio(String),

    #[error("midi output: {0}")]
    MidiOutput(String),

    #[error("failed to parse project: {0}")]
    Config(#[from] ron::error::SpannedError),

    #[error("failed to serialize project: {0}")]
    ConfigWrite(#[from] ron::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("engine has stopped")]
    EngineStopped,
}
