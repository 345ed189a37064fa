// ABOUTME: Post-processing effects chain applied to generated tracks ("brain tickles").
// ABOUTME: High-pass, chorus, compressor, and limiter over interleaved f32 samples read with hound.

use std::f32::consts::PI;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EffectsError {
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
}

/// Reads an audio file, processes it, and writes the result to a new file.
pub trait EffectsProcessor: Send + Sync {
    fn apply(&self, input: &Path, output: &Path) -> Result<(), EffectsError>;
}

/// A single stage operating in place on interleaved samples.
pub trait DspProcessor: Send {
    fn process(&mut self, samples: &mut [f32], channels: usize, sample_rate: u32);
}

pub struct DspChain {
    processors: Vec<Box<dyn DspProcessor>>,
}

impl DspChain {
    pub fn new() -> Self {
        Self {
            processors: Vec::new(),
        }
    }

    pub fn with(mut self, processor: impl DspProcessor + 'static) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn process(&mut self, samples: &mut [f32], channels: usize, sample_rate: u32) {
        for processor in &mut self.processors {
            processor.process(samples, channels, sample_rate);
        }
    }
}

impl Default for DspChain {
    fn default() -> Self {
        Self::new()
    }
}

fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

fn linear_to_db(linear: f32) -> f32 {
    20.0 * linear.max(1e-9).log10()
}

/// One-pole smoothing coefficient for a time constant in milliseconds.
fn time_coefficient(time_ms: f32, sample_rate: u32) -> f32 {
    if time_ms <= 0.0 {
        return 0.0;
    }
    (-1.0 / (time_ms * 0.001 * sample_rate as f32)).exp()
}

/// First-order high-pass filter.
pub struct HighpassFilter {
    cutoff_hz: f32,
    prev_input: Vec<f32>,
    prev_output: Vec<f32>,
}

impl HighpassFilter {
    pub fn new(cutoff_hz: f32) -> Self {
        Self {
            cutoff_hz,
            prev_input: Vec::new(),
            prev_output: Vec::new(),
        }
    }
}

impl DspProcessor for HighpassFilter {
    fn process(&mut self, samples: &mut [f32], channels: usize, sample_rate: u32) {
        self.prev_input.resize(channels, 0.0);
        self.prev_output.resize(channels, 0.0);

        let rc = 1.0 / (2.0 * PI * self.cutoff_hz);
        let dt = 1.0 / sample_rate as f32;
        let alpha = rc / (rc + dt);

        for frame in samples.chunks_mut(channels) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                let x = *sample;
                let y = alpha * (self.prev_output[ch] + x - self.prev_input[ch]);
                self.prev_input[ch] = x;
                self.prev_output[ch] = y;
                *sample = y;
            }
        }
    }
}

/// Modulated short delay mixed with the dry signal.
pub struct Chorus {
    rate_hz: f32,
    depth: f32,
    centre_delay_ms: f32,
    feedback: f32,
    mix: f32,
    lines: Vec<Vec<f32>>,
    write_pos: usize,
    phase: f32,
}

impl Chorus {
    pub fn new(rate_hz: f32, depth: f32, centre_delay_ms: f32, feedback: f32, mix: f32) -> Self {
        Self {
            rate_hz,
            depth: depth.clamp(0.0, 1.0),
            centre_delay_ms,
            feedback: feedback.clamp(-0.95, 0.95),
            mix: mix.clamp(0.0, 1.0),
            lines: Vec::new(),
            write_pos: 0,
            phase: 0.0,
        }
    }
}

impl DspProcessor for Chorus {
    fn process(&mut self, samples: &mut [f32], channels: usize, sample_rate: u32) {
        let max_delay_ms = self.centre_delay_ms * (1.0 + self.depth);
        let capacity = (max_delay_ms * 0.001 * sample_rate as f32).ceil() as usize + 2;
        if self.lines.len() != channels || self.lines.first().map(Vec::len) != Some(capacity) {
            self.lines = vec![vec![0.0; capacity]; channels];
            self.write_pos = 0;
        }

        let phase_step = 2.0 * PI * self.rate_hz / sample_rate as f32;

        for frame in samples.chunks_mut(channels) {
            let delay_ms = self.centre_delay_ms * (1.0 + self.depth * self.phase.sin());
            let delay_samples = delay_ms * 0.001 * sample_rate as f32;

            for (ch, sample) in frame.iter_mut().enumerate() {
                let line = &mut self.lines[ch];
                let read = (self.write_pos as f32 - delay_samples).rem_euclid(capacity as f32);
                let i0 = read.floor() as usize % capacity;
                let i1 = (i0 + 1) % capacity;
                let frac = read - read.floor();
                let wet = line[i0] * (1.0 - frac) + line[i1] * frac;

                let dry = *sample;
                line[self.write_pos] = dry + wet * self.feedback;
                *sample = dry * (1.0 - self.mix) + wet * self.mix;
            }

            self.write_pos = (self.write_pos + 1) % capacity;
            self.phase = (self.phase + phase_step) % (2.0 * PI);
        }
    }
}

/// Downward compressor with a peak envelope linked across channels.
pub struct Compressor {
    threshold_db: f32,
    ratio: f32,
    attack_ms: f32,
    release_ms: f32,
    envelope: f32,
}

impl Compressor {
    pub fn new(threshold_db: f32, ratio: f32, attack_ms: f32, release_ms: f32) -> Self {
        Self {
            threshold_db,
            ratio: ratio.max(1.0),
            attack_ms,
            release_ms,
            envelope: 0.0,
        }
    }
}

impl DspProcessor for Compressor {
    fn process(&mut self, samples: &mut [f32], channels: usize, sample_rate: u32) {
        let attack = time_coefficient(self.attack_ms, sample_rate);
        let release = time_coefficient(self.release_ms, sample_rate);

        for frame in samples.chunks_mut(channels) {
            let peak = frame.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
            let coeff = if peak > self.envelope { attack } else { release };
            self.envelope = coeff * self.envelope + (1.0 - coeff) * peak;

            let level_db = linear_to_db(self.envelope);
            if level_db > self.threshold_db {
                let reduction_db = (level_db - self.threshold_db) * (1.0 - 1.0 / self.ratio);
                let gain = db_to_linear(-reduction_db);
                for sample in frame.iter_mut() {
                    *sample *= gain;
                }
            }
        }
    }
}

/// Brick-wall peak limiter: gain drops instantly and recovers over `release_ms`.
pub struct Limiter {
    threshold_db: f32,
    release_ms: f32,
    gain: f32,
}

impl Limiter {
    pub fn new(threshold_db: f32, release_ms: f32) -> Self {
        Self {
            threshold_db,
            release_ms,
            gain: 1.0,
        }
    }
}

impl DspProcessor for Limiter {
    fn process(&mut self, samples: &mut [f32], channels: usize, sample_rate: u32) {
        let ceiling = db_to_linear(self.threshold_db);
        let release = time_coefficient(self.release_ms, sample_rate);

        for frame in samples.chunks_mut(channels) {
            let peak = frame.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
            let target = if peak > ceiling { ceiling / peak } else { 1.0 };

            self.gain = if target < self.gain {
                target
            } else {
                release * self.gain + (1.0 - release) * target
            };

            for sample in frame.iter_mut() {
                *sample = (*sample * self.gain).clamp(-ceiling, ceiling);
            }
        }
    }
}

/// The standard post-processing chain for bass-heavy generated tracks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TicklerChain;

impl TicklerChain {
    pub fn chain() -> DspChain {
        DspChain::new()
            // Clean up mud below 30 Hz.
            .with(HighpassFilter::new(30.0))
            .with(Chorus::new(1.0, 0.15, 7.0, 0.0, 0.3))
            .with(Compressor::new(-12.0, 3.0, 2.0, 50.0))
            .with(Limiter::new(-1.0, 100.0))
    }
}

impl EffectsProcessor for TicklerChain {
    fn apply(&self, input: &Path, output: &Path) -> Result<(), EffectsError> {
        tracing::info!("applying effects to {}", input.display());

        let (mut samples, spec) = read_wav(input)?;
        let channels = usize::from(spec.channels);
        Self::chain().process(&mut samples, channels, spec.sample_rate);
        write_wav(output, &samples, spec.channels, spec.sample_rate)
    }
}

/// Read any PCM or float WAV into interleaved f32 samples in [-1, 1].
pub fn read_wav(path: &Path) -> Result<(Vec<f32>, WavSpec), EffectsError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(EffectsError::UnsupportedFormat("zero channels".to_string()));
    }

    let samples = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(EffectsError::UnsupportedFormat(format!(
                    "{} bits per sample",
                    spec.bits_per_sample
                )));
            }
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok((samples, spec))
}

/// Write interleaved samples as 32-bit float WAV.
pub fn write_wav(
    path: &Path,
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
) -> Result<(), EffectsError> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}
