// One-shot sample playback.
//
// The scheduler thread owns a `SampleTrigger`, which only pushes small
// trigger messages into a lock-free ring buffer. The cpal stream lives on
// the host thread; its callback drains the ring, starts voices and sums
// them. Nothing on the scheduler side ever waits for the audio device.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use tracing::{error, info, warn};

use super::SoundTrigger;
use crate::error::{Result, SequencerError};
use crate::events::NoteEvent;

const TRIGGER_QUEUE_CAPACITY: usize = 256;
const MAX_VOICES: usize = 32;

/// Decodes a WAV file to mono f32 at `target_rate`.
pub fn load_wav(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    if !path.is_file() {
        return Err(SequencerError::MissingAsset(path.to_path_buf()));
    }
    let sample_err = |source| SequencerError::Sample {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = hound::WavReader::open(path).map_err(sample_err)?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(sample_err)?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|x| x as f32 / max))
                .collect::<std::result::Result<_, _>>()
                .map_err(sample_err)?
        }
    };

    let channels = spec.channels.max(1) as usize;
    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok(resample_linear(&mono, spec.sample_rate, target_rate))
}

fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || source_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = target_rate as f64 / source_rate as f64;
    let out_len = (samples.len() as f64 * ratio).ceil() as usize;

    (0..out_len)
        .map(|i| {
            let src = i as f64 / ratio;
            let idx = src.floor() as usize;
            let frac = (src - idx as f64) as f32;
            match (samples.get(idx), samples.get(idx + 1)) {
                (Some(a), Some(b)) => a * (1.0 - frac) + b * frac,
                (Some(a), None) => *a,
                _ => samples[samples.len() - 1],
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct SampleHit {
    sample: usize,
    gain: f32,
}

struct Voice {
    sample: usize,
    position: usize,
    gain: f32,
}

struct PlaybackState {
    samples: Arc<Vec<Vec<f32>>>,
    voices: Vec<Voice>,
    consumer: HeapCons<SampleHit>,
    channels: usize,
}

fn render(data: &mut [f32], state: &mut PlaybackState) {
    let PlaybackState {
        samples,
        voices,
        consumer,
        channels,
    } = state;

    while let Some(hit) = consumer.try_pop() {
        if voices.len() == MAX_VOICES {
            voices.remove(0);
        }
        voices.push(Voice {
            sample: hit.sample,
            position: 0,
            gain: hit.gain,
        });
    }

    data.fill(0.0);
    for frame in data.chunks_mut((*channels).max(1)) {
        let mut mixed = 0.0;
        for voice in voices.iter_mut() {
            if let Some(s) = samples[voice.sample].get(voice.position) {
                mixed += s * voice.gain;
                voice.position += 1;
            }
        }
        frame.fill(mixed);
    }

    voices.retain(|v| v.position < samples[v.sample].len());
}

/// Keeps the output stream alive. Must stay on the thread that created it.
pub struct SampleOutput {
    _stream: cpal::Stream,
    pub sample_rate: u32,
}

/// Scheduler-side half of the sample player.
pub struct SampleTrigger {
    producer: HeapProd<SampleHit>,
    lanes: HashMap<String, usize>,
}

impl SoundTrigger for SampleTrigger {
    fn trigger(&mut self, track: &str, event: &NoteEvent) {
        let Some(&sample) = self.lanes.get(track) else {
            return;
        };
        let hit = SampleHit {
            sample,
            gain: event.velocity as f32 / 127.0,
        };
        if self.producer.try_push(hit).is_err() {
            warn!(track, "trigger queue full, onset dropped");
        }
    }
}

/// Loads one sample per track and starts the default output device.
pub fn start_sample_output(tracks: &[(String, PathBuf)]) -> Result<(SampleOutput, SampleTrigger)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| SequencerError::Audio("no output device".into()))?;
    let config = device
        .default_output_config()
        .map_err(|e| SequencerError::Audio(e.to_string()))?;
    let stream_config: cpal::StreamConfig = config.into();
    let sample_rate = stream_config.sample_rate as u32;
    let channels = stream_config.channels as usize;

    let mut samples = Vec::with_capacity(tracks.len());
    let mut lanes = HashMap::new();
    for (idx, (name, path)) in tracks.iter().enumerate() {
        samples.push(load_wav(path, sample_rate)?);
        lanes.insert(name.clone(), idx);
    }

    let ring = HeapRb::<SampleHit>::new(TRIGGER_QUEUE_CAPACITY);
    let (producer, consumer) = ring.split();

    let mut state = PlaybackState {
        samples: Arc::new(samples),
        voices: Vec::with_capacity(MAX_VOICES),
        consumer,
        channels,
    };

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                render(data, &mut state);
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| SequencerError::Audio(e.to_string()))?;
    stream
        .play()
        .map_err(|e| SequencerError::Audio(e.to_string()))?;

    info!(channels, sample_rate, "audio output started");

    Ok((
        SampleOutput {
            _stream: stream,
            sample_rate,
        },
        SampleTrigger { producer, lanes },
    ))
}
