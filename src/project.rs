use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SequencerError};
use crate::events::DEFAULT_VELOCITY;
use crate::timing::{Meter, MeterReference, SchedulerConfig, TrackSpec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackConfig {
    pub name: String,
    /// WAV file played by the sample output. Defaults to
    /// `assets/<name>.wav`.
    #[serde(default)]
    pub sample: Option<PathBuf>,
    pub pitch: u8,
    #[serde(default = "default_velocity")]
    pub velocity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterConfig {
    pub numerator: u32,
    pub denominator: u32,
    /// Reference rhythm the meter's chain is learned from. Defaults to
    /// `rhythms/<numerator>_<denominator>.txt`.
    #[serde(default)]
    pub reference: Option<PathBuf>,
}

/// Where onsets go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Output {
    Log,
    Samples,
    Midi { port: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub bpm: u32,
    pub seed: Option<u64>,
    pub anchor_track: String,
    pub tracks: Vec<TrackConfig>,
    pub meters: Vec<MeterConfig>,
    pub output: Output,
    pub export_on_quit: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

fn default_velocity() -> u8 {
    DEFAULT_VELOCITY
}

impl Default for Project {
    fn default() -> Self {
        Self {
            bpm: 120,
            seed: None,
            anchor_track: "low".into(),
            tracks: [("high", 42), ("mid", 38), ("low", 36)]
                .into_iter()
                .map(|(name, pitch)| TrackConfig {
                    name: name.into(),
                    sample: None,
                    pitch,
                    velocity: DEFAULT_VELOCITY,
                })
                .collect(),
            meters: [(7, 8), (5, 4)]
                .into_iter()
                .map(|(numerator, denominator)| MeterConfig {
                    numerator,
                    denominator,
                    reference: None,
                })
                .collect(),
            output: Output::Log,
            export_on_quit: None,
            log_file: None,
        }
    }
}

/// Joins relative paths onto the project directory.
pub fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl Project {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let ron_string = fs::read_to_string(path)?;
        let project: Project = ron::from_str(&ron_string)?;
        Ok(project)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bpm == 0 {
            return Err(SequencerError::InvalidBpm(0.0));
        }
        if self.tracks.is_empty() {
            return Err(SequencerError::EmptyConfig("tracks"));
        }
        if self.meters.is_empty() {
            return Err(SequencerError::EmptyConfig("meters"));
        }

        let mut names = HashSet::new();
        for track in &self.tracks {
            if !names.insert(track.name.as_str()) {
                return Err(SequencerError::DuplicateTrack(track.name.clone()));
            }
            if track.velocity > 127 {
                return Err(SequencerError::InvalidNoteEvent(format!(
                    "track '{}' velocity {} out of range",
                    track.name, track.velocity
                )));
            }
        }
        if !names.contains(self.anchor_track.as_str()) {
            return Err(SequencerError::UnknownTrack(self.anchor_track.clone()));
        }

        for meter in &self.meters {
            Meter::new(meter.numerator, meter.denominator)?;
        }
        Ok(())
    }

    pub fn track_names(&self) -> Vec<String> {
        self.tracks.iter().map(|t| t.name.clone()).collect()
    }

    pub fn pitches(&self) -> HashMap<String, u8> {
        self.tracks
            .iter()
            .map(|t| (t.name.clone(), t.pitch))
            .collect()
    }

    /// Sample file per track, resolved against `base`.
    pub fn sample_paths(&self, base: &Path) -> Vec<(String, PathBuf)> {
        self.tracks
            .iter()
            .map(|t| {
                let path = match &t.sample {
                    Some(path) => resolve(base, path),
                    None => base.join("assets").join(format!("{}.wav", t.name)),
                };
                (t.name.clone(), path)
            })
            .collect()
    }

    /// Fails on the first sample file that is missing. Only samples are
    /// checked, and only when they will be played.
    pub fn verify_assets(&self, base: &Path) -> Result<()> {
        if self.output != Output::Samples {
            return Ok(());
        }
        for (_, path) in self.sample_paths(base) {
            if !path.is_file() {
                return Err(SequencerError::MissingAsset(path));
            }
        }
        Ok(())
    }

    /// Loads every meter's reference rhythm and builds the scheduler
    /// configuration.
    pub fn scheduler_config(&self, base: &Path) -> Result<SchedulerConfig> {
        let mut meters = Vec::with_capacity(self.meters.len());
        for config in &self.meters {
            let meter = Meter::new(config.numerator, config.denominator)?;
            let path = match &config.reference {
                Some(path) => resolve(base, path),
                None => base.join("rhythms").join(meter.reference_file_name()),
            };
            if !path.is_file() {
                return Err(SequencerError::MissingAsset(path));
            }
            meters.push(MeterReference::load(meter, &path)?);
        }

        Ok(SchedulerConfig {
            bpm: self.bpm as f64,
            tracks: self
                .tracks
                .iter()
                .map(|t| TrackSpec {
                    name: t.name.clone(),
                    pitch: t.pitch,
                    velocity: t.velocity,
                })
                .collect(),
            meters,
            anchor_track: self.anchor_track.clone(),
        })
    }
}
