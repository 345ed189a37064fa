// ABOUTME: Test doubles for the audio collaborators.
// ABOUTME: Lets server and lifecycle tests run without network access or real DSP work.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};

use crate::effects::{EffectsError, EffectsProcessor};
use crate::generator::{GeneratorError, MusicGenerator, wav_path};

/// A generator that writes a short silent WAV instead of calling a model.
#[derive(Debug, Default)]
pub struct StubGenerator {
    fail_warm_up: bool,
    loaded: AtomicBool,
    generated: AtomicUsize,
}

impl StubGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stub whose warm-up always fails, for startup-failure tests.
    pub fn failing_warm_up() -> Self {
        Self {
            fail_warm_up: true,
            ..Self::default()
        }
    }

    /// Number of successful `generate` calls so far.
    pub fn generated(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MusicGenerator for StubGenerator {
    async fn warm_up(&self) -> Result<(), GeneratorError> {
        if self.fail_warm_up {
            return Err(GeneratorError::ModelUnavailable {
                model: "stub".to_string(),
                reason: "warm-up disabled".to_string(),
            });
        }
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn generate(
        &self,
        _prompt: &str,
        duration_secs: u32,
        output_stem: &Path,
    ) -> Result<PathBuf, GeneratorError> {
        if !self.is_loaded() {
            return Err(GeneratorError::NotLoaded);
        }

        let path = wav_path(output_stem);
        write_silence(&path, duration_secs).map_err(|e| match e {
            hound::Error::IoError(io) => GeneratorError::Io(io),
            other => GeneratorError::Io(std::io::Error::other(other.to_string())),
        })?;
        self.generated.fetch_add(1, Ordering::SeqCst);
        Ok(path)
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    fn device(&self) -> &str {
        "cpu"
    }
}

/// Effects processor that copies its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyEffects;

impl EffectsProcessor for CopyEffects {
    fn apply(&self, input: &Path, output: &Path) -> Result<(), EffectsError> {
        std::fs::copy(input, output).map_err(hound::Error::IoError)?;
        Ok(())
    }
}

/// 1 kHz mono silence, `duration_secs` long. Small enough for tests.
fn write_silence(path: &Path, duration_secs: u32) -> Result<(), hound::Error> {
    const RATE: u32 = 1_000;
    let spec = WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for _ in 0..duration_secs.saturating_mul(RATE) {
        writer.write_sample(0i16)?;
    }
    writer.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn stub_generator_writes_wav_after_warm_up() {
        let dir = TempDir::new().unwrap();
        let generator = StubGenerator::new();
        generator.warm_up().await.unwrap();

        let path = generator
            .generate("anything", 2, &dir.path().join("gen_x"))
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("gen_x.wav"));
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.duration(), 2_000);
        assert_eq!(generator.generated(), 1);
    }

    #[tokio::test]
    async fn failing_stub_rejects_warm_up() {
        let generator = StubGenerator::failing_warm_up();
        assert!(generator.warm_up().await.is_err());
        assert!(!generator.is_loaded());
    }

    #[test]
    fn copy_effects_duplicates_file() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("a.wav");
        std::fs::write(&input, b"RIFF").unwrap();

        CopyEffects.apply(&input, &dir.path().join("b.wav")).unwrap();

        assert_eq!(std::fs::read(dir.path().join("b.wav")).unwrap(), b"RIFF");
    }
}
