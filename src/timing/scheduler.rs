use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, TryRecvError};
use tracing::{debug, info, trace, warn};

use super::{Anchor, Clock, MarkovChain, Meter, RandomSource, Rhythm};
use crate::audio::{SoundTrigger, Track};
use crate::command::{Command, TrackSelector};
use crate::error::{Result, SequencerError};
use crate::events::{NoteEvent, Notification};
use crate::midi;

/// Longest the loop sleeps between two checks of the clock.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Offset added to the new origin after a tempo change, in seconds.
pub const TEMPO_RESYNC_EPSILON: f64 = 0.001;

/// Length of one sixteenth note in seconds.
pub fn sixteenth_duration(bpm: f64) -> f64 {
    15.0 / bpm
}

#[derive(Debug, Clone)]
pub struct TrackSpec {
    pub name: String,
    pub pitch: u8,
    pub velocity: u8,
}

/// A meter together with its reference rhythm and the chain learned from
/// that rhythm.
#[derive(Debug, Clone)]
pub struct MeterReference {
    pub meter: Meter,
    pub rhythm: Rhythm,
    pub chain: MarkovChain,
}

impl MeterReference {
    pub fn new(meter: Meter, rhythm: Rhythm) -> Result<Self> {
        let chain = MarkovChain::from_rhythm(&rhythm)?;
        Ok(Self {
            meter,
            rhythm,
            chain,
        })
    }

    /// Reads a reference rhythm file and learns its chain.
    pub fn load(meter: Meter, path: &Path) -> Result<Self> {
        Ok(Self {
            meter,
            rhythm: Rhythm::load(path)?,
            chain: MarkovChain::from_rhythm_file(path)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub bpm: f64,
    pub tracks: Vec<TrackSpec>,
    /// Meters in modulation order. The first one plays at start.
    pub meters: Vec<MeterReference>,
    pub anchor_track: String,
}

/// Owns the tracks, the active chain and the timing state. Everything
/// here is touched by the scheduling thread only; the outside world talks
/// to it through the command channel.
pub struct Scheduler {
    tracks: Vec<Track>,
    markov: MarkovChain,
    meters: Vec<MeterReference>,
    meter_index: usize,
    anchor_track: String,
    bpm: f64,
    sixteenth: f64,
    phase_index: u64,
    start: f64,
    running: bool,
    clock: Box<dyn Clock>,
    trigger: Box<dyn SoundTrigger>,
    rng: Box<dyn RandomSource + Send>,
    updates: Option<Sender<Notification>>,
}

fn validate_bpm(bpm: f64) -> Result<()> {
    if bpm.is_finite() && bpm > 0.0 {
        Ok(())
    } else {
        Err(SequencerError::InvalidBpm(bpm))
    }
}

impl Scheduler {
    /// Checks the configuration, learns the chain of the first meter and
    /// seeds every track with its line of that meter's reference rhythm.
    pub fn new(
        config: SchedulerConfig,
        trigger: Box<dyn SoundTrigger>,
        clock: Box<dyn Clock>,
        rng: Box<dyn RandomSource + Send>,
    ) -> Result<Self> {
        validate_bpm(config.bpm)?;
        if config.tracks.is_empty() {
            return Err(SequencerError::EmptyConfig("tracks"));
        }
        if config.meters.is_empty() {
            return Err(SequencerError::EmptyConfig("meters"));
        }

        let mut seen = HashSet::new();
        for spec in &config.tracks {
            if !seen.insert(spec.name.as_str()) {
                return Err(SequencerError::DuplicateTrack(spec.name.clone()));
            }
        }
        if !seen.contains(config.anchor_track.as_str()) {
            return Err(SequencerError::UnknownTrack(config.anchor_track));
        }

        for reference in &config.meters {
            let expected = reference.meter.subdivisions();
            if reference.rhythm.length() != expected {
                return Err(SequencerError::RhythmLengthMismatch {
                    meter: reference.meter.to_string(),
                    expected,
                    found: reference.rhythm.length(),
                });
            }
            if reference.chain.node_index(&config.anchor_track).is_none() {
                return Err(SequencerError::UnknownNode(format!(
                    "{} (anchor, in {} reference)",
                    config.anchor_track, reference.meter
                )));
            }
        }
        let markov = config.meters[0].chain.clone();

        let first = &config.meters[0];
        let length = first.meter.subdivisions();
        let tracks = config
            .tracks
            .iter()
            .map(|spec| {
                let mut track = Track::new(spec.name.clone(), length, spec.pitch, spec.velocity)?;
                if let Some(onsets) = first.rhythm.onsets(&spec.name) {
                    track.set_events(NoteEvent::from_onsets(&onsets, spec.velocity));
                }
                Ok(track)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            tracks,
            markov,
            meters: config.meters,
            meter_index: 0,
            anchor_track: config.anchor_track,
            bpm: config.bpm,
            sixteenth: sixteenth_duration(config.bpm),
            phase_index: 0,
            start: 0.0,
            running: false,
            clock,
            trigger,
            rng,
            updates: None,
        })
    }

    /// Reports status changes on `updates`.
    pub fn with_updates(mut self, updates: Sender<Notification>) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn sixteenth(&self) -> f64 {
        self.sixteenth
    }

    /// The meter currently selected. Tracks switch to its length at their
    /// next cycle boundary.
    pub fn meter(&self) -> Meter {
        self.meters[self.meter_index].meter
    }

    /// Sixteenths elapsed since the last time origin.
    pub fn phase_index(&self) -> u64 {
        self.phase_index
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn anchor_track(&self) -> &str {
        &self.anchor_track
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, name: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.name() == name)
    }

    pub fn markov(&self) -> &MarkovChain {
        &self.markov
    }

    fn track_index(&self, name: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.name() == name)
    }

    /// Only the downbeat is forced: the period is a whole cycle, so within
    /// one generated bar the walk sits on the anchor node at position 0 and
    /// moves freely everywhere else. Forcing every beat group would keep the
    /// other tracks off those positions entirely.
    fn anchor(&self) -> Anchor {
        Anchor {
            node: self.anchor_track.clone(),
            period: self.meter().subdivisions(),
        }
    }

    fn notify(&self, notification: Notification) {
        if let Some(updates) = &self.updates {
            let _ = updates.send(notification);
        }
    }

    fn now(&mut self) -> f64 {
        self.clock.now().as_secs_f64()
    }

    /// Takes the current time as origin and marks the loop running.
    pub fn start(&mut self) {
        self.start = self.now();
        self.phase_index = 0;
        self.running = true;
        info!(bpm = self.bpm, meter = %self.meter(), "scheduler started");
        self.notify(Notification::Started {
            bpm: self.bpm,
            meter: self.meter(),
        });
    }

    /// One pass of the loop: apply at most one pending command, otherwise
    /// play the next sixteenth if it is due or pause briefly. Returns
    /// whether the loop should keep going.
    pub fn iterate(&mut self, commands: &Receiver<Command>, acks: &Sender<()>) -> bool {
        match commands.try_recv() {
            Ok(command) => {
                let needs_ack = command.requires_ack();
                self.apply(command);
                if needs_ack {
                    let _ = acks.send(());
                }
                return self.running;
            }
            Err(TryRecvError::Disconnected) => {
                warn!("command channel closed, stopping");
                self.apply(Command::Quit);
                return false;
            }
            Err(TryRecvError::Empty) => {}
        }

        let elapsed = self.now() - self.start;
        if elapsed > self.phase_index as f64 * self.sixteenth {
            self.tick();
        } else {
            self.clock.pause(POLL_INTERVAL);
        }
        self.running
    }

    /// Runs until a quit command arrives or the command channel closes.
    pub fn run(&mut self, commands: &Receiver<Command>, acks: &Sender<()>) {
        self.start();
        while self.iterate(commands, acks) {}
        info!(sixteenths = self.phase_index, "scheduler stopped");
        self.notify(Notification::Stopped);
    }

    /// Advances every track by one sixteenth.
    pub fn tick(&mut self) {
        for track in self.tracks.iter_mut() {
            if let Some(event) = track.step(self.trigger.as_mut()) {
                trace!(track = track.name(), sixteenth = event.timestamp, "fired");
            }
        }
        self.phase_index += 1;
    }

    pub fn apply(&mut self, command: Command) {
        debug!(%command, "applying command");
        match command {
            Command::Quit => self.running = false,
            Command::SetBpm(bpm) => self.set_bpm(bpm as f64),
            Command::RegenerateTrack(selector) => self.regenerate(&selector),
            Command::ExportMidi(path) => self.export(&path),
            Command::ModulateMeter => self.modulate_meter(),
        }
    }

    /// Changes tempo without moving any track's position: the new grid is
    /// anchored just after now, one sixteenth in.
    fn set_bpm(&mut self, bpm: f64) {
        if validate_bpm(bpm).is_err() {
            warn!(bpm, "ignoring invalid tempo");
            return;
        }
        self.bpm = bpm;
        self.sixteenth = sixteenth_duration(bpm);
        self.start = self.now() + TEMPO_RESYNC_EPSILON;
        self.phase_index = 1;
        info!(bpm, "tempo changed");
        self.notify(Notification::TempoChanged { bpm });
    }

    fn regenerate(&mut self, selector: &TrackSelector) {
        match selector {
            TrackSelector::All => {
                let names: Vec<String> =
                    self.tracks.iter().map(|t| t.name().to_string()).collect();
                for name in names {
                    self.regenerate_track(&name);
                }
            }
            TrackSelector::Named(name) => self.regenerate_track(name),
        }
    }

    fn regenerate_track(&mut self, name: &str) {
        let Some(idx) = self.track_index(name) else {
            warn!(track = name, "regenerate: no such track");
            self.notify(Notification::UnknownTrack {
                name: name.to_string(),
            });
            return;
        };

        let length = self.meter().subdivisions();
        let anchor = self.anchor();
        let onsets =
            match self
                .markov
                .generate_rhythm(name, length, Some(&anchor), self.rng.as_mut())
            {
                Ok(onsets) => onsets,
                Err(e) => {
                    warn!(track = name, "regenerate failed: {e}");
                    return;
                }
            };

        let track = &mut self.tracks[idx];
        track.stage_rhythm(NoteEvent::from_onsets(&onsets, track.velocity()));
        debug!(track = name, ?onsets, "rhythm staged");
        self.notify(Notification::RhythmStaged {
            track: name.to_string(),
            onsets,
        });
    }

    /// Writes the current tracks out. Never touches playback state.
    fn export(&self, path: &Path) {
        match midi::write_midi(&self.tracks, self.bpm, self.meter(), path) {
            Ok(()) => {
                info!(path = %path.display(), "exported midi");
                self.notify(Notification::Exported {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => {
                warn!(path = %path.display(), "export failed: {e}");
                self.notify(Notification::ExportFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        }
    }

    /// Selects the next meter. Its chain takes over right away; tracks
    /// pick up the new length and their new rhythms at their next phase 0.
    fn modulate_meter(&mut self) {
        let old_length = self.meter().subdivisions();
        let next = (self.meter_index + 1) % self.meters.len();
        self.markov = self.meters[next].chain.clone();
        self.meter_index = next;
        let meter = self.meter();
        let new_length = meter.subdivisions();

        let others: Vec<String> = self
            .tracks
            .iter()
            .map(|t| t.name().to_string())
            .filter(|name| *name != self.anchor_track)
            .collect();
        for name in others {
            self.regenerate_track(&name);
        }
        if new_length > old_length {
            self.extend_anchor(old_length, new_length);
        }

        for track in self.tracks.iter_mut() {
            if let Err(e) = track.stage_length(new_length) {
                warn!("{e}");
            }
        }
        info!(%meter, length = new_length, "meter change staged");
        self.notify(Notification::MeterChanged {
            meter,
            length: new_length,
        });
    }

    /// Keeps the anchor track's pattern for the positions both meters
    /// share and walks the new chain over the added ones, starting from
    /// the state implied by the last shared position.
    fn extend_anchor(&mut self, old_length: u32, new_length: u32) {
        let Some(idx) = self.track_index(&self.anchor_track) else {
            return;
        };
        let anchor_name = self.anchor_track.clone();
        let velocity = self.tracks[idx].velocity();
        let mut events: Vec<NoteEvent> = self.tracks[idx]
            .upcoming_events()
            .iter()
            .filter(|e| e.timestamp < old_length)
            .copied()
            .collect();

        let ends_on_onset = events
            .last()
            .is_some_and(|e| e.timestamp + 1 == old_length);
        let last_state = if ends_on_onset { anchor_name.as_str() } else { "" };
        if self.markov.set_state(last_state).is_err() {
            self.markov.clear_state();
        }

        let anchor = self.anchor();
        match self.markov.continue_rhythm(
            &anchor_name,
            old_length..new_length,
            Some(&anchor),
            self.rng.as_mut(),
        ) {
            Ok(onsets) => {
                events.extend(onsets.iter().map(|&ts| NoteEvent::onset(ts, velocity)));
                let staged: Vec<u32> = events.iter().map(|e| e.timestamp).collect();
                self.tracks[idx].stage_rhythm(events);
                debug!(track = %anchor_name, onsets = ?staged, "anchor extended");
                self.notify(Notification::RhythmStaged {
                    track: anchor_name,
                    onsets: staged,
                });
            }
            Err(e) => warn!(track = %anchor_name, "cannot extend anchor rhythm: {e}"),
        }
    }
}

impl fmt::Display for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tracks: {}. Meter: {}. Tempo: {}bpm.",
            self.tracks.len(),
            self.meter(),
            self.bpm
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::{ManualClock, seeded_source};
    use crossbeam::channel::unbounded;
    use std::sync::{Arc, Mutex};

    type Fired = Arc<Mutex<Vec<(String, u32)>>>;

    struct Recorder(Fired);

    impl SoundTrigger for Recorder {
        fn trigger(&mut self, track: &str, event: &NoteEvent) {
            self.0
                .lock()
                .unwrap()
                .push((track.to_string(), event.timestamp));
        }
    }

    const SEVEN_EIGHT: &str = "\
low  x.....x..x....
mid  ....x......x..
high ..x.....x...x.
";

    const FIVE_FOUR: &str = "\
low  x.........x..x......
mid  ....x.......x.....x.
high ..x...x.x.x...x.x...
";

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            bpm: 120.0,
            tracks: ["high", "mid", "low"]
                .iter()
                .zip([42, 38, 36])
                .map(|(name, pitch)| TrackSpec {
                    name: name.to_string(),
                    pitch,
                    velocity: 100,
                })
                .collect(),
            meters: vec![
                MeterReference::new(Meter::new(7, 8).unwrap(), Rhythm::parse(SEVEN_EIGHT).unwrap())
                    .unwrap(),
                MeterReference::new(Meter::new(5, 4).unwrap(), Rhythm::parse(FIVE_FOUR).unwrap())
                    .unwrap(),
            ],
            anchor_track: "low".into(),
        }
    }

    struct Harness {
        scheduler: Scheduler,
        fired: Fired,
        commands: Sender<Command>,
        command_rx: Receiver<Command>,
        acks: Sender<()>,
        ack_rx: Receiver<()>,
        updates: Receiver<Notification>,
    }

    impl Harness {
        fn new() -> Self {
            let fired = Fired::default();
            let (update_tx, updates) = unbounded();
            let mut scheduler = Scheduler::new(
                config(),
                Box::new(Recorder(fired.clone())),
                Box::new(ManualClock::new()),
                Box::new(seeded_source(Some(7))),
            )
            .unwrap()
            .with_updates(update_tx);
            scheduler.start();
            let (commands, command_rx) = unbounded();
            let (acks, ack_rx) = unbounded();
            Self {
                scheduler,
                fired,
                commands,
                command_rx,
                acks,
                ack_rx,
                updates,
            }
        }

        fn iterate(&mut self) -> bool {
            self.scheduler.iterate(&self.command_rx, &self.acks)
        }

        /// Iterates until `n` more sixteenths have played; returns the
        /// number of iterations spent pausing.
        fn ticks(&mut self, n: u64) -> u64 {
            let mut pauses = 0;
            for _ in 0..n {
                let target = self.scheduler.phase_index() + 1;
                while self.scheduler.phase_index() < target {
                    self.iterate();
                    pauses += 1;
                }
                pauses -= 1;
            }
            pauses
        }

        fn send(&mut self, command: Command) {
            self.commands.send(command).unwrap();
            assert!(self.iterate());
        }

        fn fired_on(&self, track: &str) -> Vec<u32> {
            self.fired
                .lock()
                .unwrap()
                .iter()
                .filter(|(name, _)| name == track)
                .map(|(_, ts)| *ts)
                .collect()
        }

        fn phases(&self) -> Vec<u32> {
            self.scheduler.tracks().iter().map(|t| t.phase()).collect()
        }
    }

    #[test]
    fn sixteenth_shrinks_as_tempo_grows() {
        assert_eq!(sixteenth_duration(120.0), 0.125);
        assert_eq!(sixteenth_duration(60.0), 0.25);
        let mut previous = f64::INFINITY;
        for bpm in 1..=400 {
            let current = sixteenth_duration(bpm as f64);
            assert!(current < previous);
            previous = current;
        }
    }

    #[test]
    fn rejects_inconsistent_configuration() {
        let build = |config| {
            Scheduler::new(
                config,
                Box::new(crate::audio::LogTrigger),
                Box::new(ManualClock::new()),
                Box::new(seeded_source(Some(1))),
            )
        };

        let mut bad = config();
        bad.bpm = 0.0;
        assert!(matches!(build(bad), Err(SequencerError::InvalidBpm(_))));

        let mut bad = config();
        bad.anchor_track = "cowbell".into();
        assert!(matches!(build(bad), Err(SequencerError::UnknownTrack(_))));

        let mut bad = config();
        bad.tracks.push(bad.tracks[0].clone());
        assert!(matches!(build(bad), Err(SequencerError::DuplicateTrack(_))));

        let mut bad = config();
        bad.meters[1].meter = Meter::new(4, 4).unwrap();
        assert!(matches!(
            build(bad),
            Err(SequencerError::RhythmLengthMismatch {
                expected: 16,
                found: 20,
                ..
            })
        ));

        let mut bad = config();
        // Both lines always sound together, so the chain only knows "low+high".
        bad.meters[0] = MeterReference::new(
            Meter::new(4, 4).unwrap(),
            Rhythm::parse("low x.x.x.x.x.x.x.x.\nhigh x.x.x.x.x.x.x.x.").unwrap(),
        )
        .unwrap();
        assert!(matches!(build(bad), Err(SequencerError::UnknownNode(_))));

        let mut bad = config();
        bad.meters.clear();
        assert!(matches!(build(bad), Err(SequencerError::EmptyConfig(_))));
    }

    #[test]
    fn tracks_start_from_the_reference_rhythm() {
        let mut h = Harness::new();
        assert_eq!(h.scheduler.to_string(), "Tracks: 3. Meter: 7/8. Tempo: 120bpm.");
        assert!(matches!(
            h.updates.try_recv(),
            Ok(Notification::Started { .. })
        ));

        h.ticks(28);
        assert_eq!(h.fired_on("low"), vec![0, 6, 9, 0, 6, 9]);
        assert_eq!(h.fired_on("mid"), vec![4, 11, 4, 11]);
        assert_eq!(h.fired_on("high"), vec![2, 8, 12, 2, 8, 12]);
    }

    #[test]
    fn sixteenths_are_spaced_by_the_tempo() {
        let mut h = Harness::new();
        h.ticks(1);
        // 125ms at 120bpm, polled in 1ms steps.
        let pauses = h.ticks(4);
        assert!((496..=504).contains(&pauses), "{pauses}");
    }

    #[test]
    fn tempo_change_keeps_every_track_in_place() {
        let mut h = Harness::new();
        h.ticks(5);
        let before = h.phases();

        h.send(Command::SetBpm(240));
        assert!(h.ack_rx.try_recv().is_ok());
        assert_eq!(h.phases(), before);
        assert_eq!(h.scheduler.phase_index(), 1);
        assert_eq!(h.scheduler.sixteenth(), 0.0625);

        let pauses = h.ticks(1);
        assert!((60..=66).contains(&pauses), "{pauses}");
        assert_eq!(
            h.phases(),
            before.iter().map(|p| p + 1).collect::<Vec<_>>()
        );
        assert!(matches!(
            h.updates.try_iter().last(),
            Some(Notification::TempoChanged { bpm }) if bpm == 240.0
        ));
    }

    #[test]
    fn regenerated_rhythm_waits_for_the_next_cycle() {
        let mut h = Harness::new();
        h.ticks(3);
        h.send(Command::RegenerateTrack(TrackSelector::Named("mid".into())));
        assert!(h.ack_rx.try_recv().is_err());

        let mid = h.scheduler.track("mid").unwrap();
        assert!(mid.has_pending());
        let staged: Vec<u32> = mid
            .pending_events()
            .unwrap()
            .iter()
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(mid.events().len(), 2);
        // Position 0 is always forced onto the anchor.
        assert!(!staged.contains(&0));
        assert!(staged.iter().all(|&ts| ts < 14));

        h.ticks(10);
        assert!(h.scheduler.track("mid").unwrap().has_pending());
        h.ticks(1);
        let mid = h.scheduler.track("mid").unwrap();
        assert!(!mid.has_pending());
        let live: Vec<u32> = mid.events().iter().map(|e| e.timestamp).collect();
        assert_eq!(live, staged);
    }

    #[test]
    fn anchor_covers_the_downbeat_of_the_active_meter() {
        let mut h = Harness::new();
        assert_eq!(
            h.scheduler.anchor(),
            Anchor {
                node: "low".into(),
                period: 14
            }
        );

        for _ in 0..20 {
            h.send(Command::RegenerateTrack(TrackSelector::Named("low".into())));
            let low = h.scheduler.track("low").unwrap();
            let staged = low.pending_events().unwrap();
            assert_eq!(staged.first().map(|e| e.timestamp), Some(0));
        }

        h.send(Command::ModulateMeter);
        assert_eq!(h.scheduler.anchor().period, 20);
    }

    #[test]
    fn unknown_track_is_reported_and_ignored() {
        let mut h = Harness::new();
        h.send(Command::RegenerateTrack(TrackSelector::Named("cowbell".into())));
        assert!(h.scheduler.tracks().iter().all(|t| !t.has_pending()));
        assert!(h.updates.try_iter().any(|n| matches!(
            n,
            Notification::UnknownTrack { ref name } if name == "cowbell"
        )));
    }

    #[test]
    fn meter_changes_only_at_phase_zero() {
        let mut h = Harness::new();
        h.ticks(3);
        h.send(Command::ModulateMeter);
        assert!(h.ack_rx.try_recv().is_ok());
        assert_eq!(h.scheduler.meter(), Meter::new(5, 4).unwrap());

        let low = h.scheduler.track("low").unwrap();
        let staged: Vec<u32> = low
            .pending_events()
            .unwrap()
            .iter()
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(&staged[..3], &[0, 6, 9]);
        assert!(staged.iter().all(|&ts| ts < 20));
        for name in ["high", "mid"] {
            let track = h.scheduler.track(name).unwrap();
            assert_eq!(track.pending_length(), Some(20));
            assert!(track.pending_events().unwrap().iter().all(|e| e.timestamp != 0));
        }

        for _ in 3..14 {
            assert!(h.scheduler.tracks().iter().all(|t| t.length() == 14));
            h.ticks(1);
        }
        assert!(h.scheduler.tracks().iter().all(|t| t.length() == 20));
        assert!(h.scheduler.tracks().iter().all(|t| t.phase() == 19));

        h.ticks(1);
        assert!(h.scheduler.tracks().iter().all(|t| t.phase() == 0));
        assert_eq!(h.fired_on("low").last(), Some(&0));
    }

    #[test]
    fn modulating_twice_returns_to_the_first_meter() {
        let mut h = Harness::new();
        h.send(Command::ModulateMeter);
        h.send(Command::ModulateMeter);
        assert_eq!(h.ack_rx.try_iter().count(), 2);
        assert_eq!(h.scheduler.meter(), Meter::new(7, 8).unwrap());
        assert!(h
            .scheduler
            .tracks()
            .iter()
            .all(|t| t.pending_length() == Some(14)));
    }

    #[test]
    fn export_leaves_playback_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.mid");
        let mut h = Harness::new();
        h.ticks(4);
        let before: Vec<Track> = h.scheduler.tracks().to_vec();

        h.send(Command::ExportMidi(path.clone()));
        assert!(path.is_file());
        let after = h.scheduler.tracks();
        for (a, b) in before.iter().zip(after) {
            assert_eq!(a.events(), b.events());
            assert_eq!(a.phase(), b.phase());
            assert_eq!(a.cursor(), b.cursor());
        }
        assert!(h
            .updates
            .try_iter()
            .any(|n| matches!(n, Notification::Exported { .. })));

        h.send(Command::ExportMidi(dir.path().join("missing/dir/take.mid")));
        assert!(h
            .updates
            .try_iter()
            .any(|n| matches!(n, Notification::ExportFailed { .. })));
    }

    #[test]
    fn quit_and_closed_channel_stop_the_loop() {
        let mut h = Harness::new();
        h.commands.send(Command::Quit).unwrap();
        assert!(!h.iterate());
        assert!(!h.scheduler.is_running());

        let mut h = Harness::new();
        let (tx, rx) = unbounded::<Command>();
        drop(tx);
        assert!(!h.scheduler.iterate(&rx, &h.acks));
        assert!(!h.scheduler.is_running());
    }
}
