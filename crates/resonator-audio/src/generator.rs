// ABOUTME: Defines the MusicGenerator trait that every text-to-music backend implements.
// ABOUTME: HfMusicGenerator runs MusicGen through the Hugging Face Inference API.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;

use crate::huggingface::{HfClient, HfError, ModelState};

/// MusicGen emits roughly 50 audio tokens per second of output.
const TOKENS_PER_SECOND: u32 = 50;

/// Errors that can occur while warming up or running a generator.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("model not loaded")]
    NotLoaded,

    #[error("model {model} is unavailable: {reason}")]
    ModelUnavailable { model: String, reason: String },

    #[error("model returned {0}, expected WAV audio")]
    NotWav(String),

    #[error("inference error: {0}")]
    Inference(#[from] HfError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A text-to-music backend. The server treats it as opaque: a prompt and a
/// duration go in, an audio file comes out.
#[async_trait]
pub trait MusicGenerator: Send + Sync {
    /// Prepare the backend. Startup fails if this fails.
    async fn warm_up(&self) -> Result<(), GeneratorError>;

    /// Generate audio for `prompt` and write it to `<output_stem>.wav`,
    /// returning the written path.
    async fn generate(
        &self,
        prompt: &str,
        duration_secs: u32,
        output_stem: &Path,
    ) -> Result<PathBuf, GeneratorError>;

    fn is_loaded(&self) -> bool;

    /// Where generation runs, for the health endpoint (e.g. "cuda", "cpu", "remote").
    fn device(&self) -> &str;
}

/// Accept only a RIFF/WAVE body. Anything else would be saved under a `.wav`
/// name that the effects chain cannot read.
pub fn ensure_wav(audio: &[u8]) -> Result<(), GeneratorError> {
    if audio.len() >= 12 && &audio[0..4] == b"RIFF" && &audio[8..12] == b"WAVE" {
        return Ok(());
    }

    let detected = match audio.get(0..4) {
        Some(b"fLaC") => "FLAC audio".to_string(),
        Some(b"OggS") => "Ogg audio".to_string(),
        Some(b"ID3\x03" | b"ID3\x04") => "MP3 audio".to_string(),
        _ => format!("{} bytes of unrecognised data", audio.len()),
    };
    Err(GeneratorError::NotWav(detected))
}

/// Appends `.wav` without touching any dots already in the stem.
pub fn wav_path(output_stem: &Path) -> PathBuf {
    let mut path = OsString::from(output_stem.as_os_str());
    path.push(".wav");
    PathBuf::from(path)
}

/// MusicGen hosted on the Hugging Face Inference API.
pub struct HfMusicGenerator {
    client: HfClient,
    model: String,
    loaded: AtomicBool,
}

impl HfMusicGenerator {
    pub fn new(client: HfClient, model: String) -> Self {
        Self {
            client,
            model,
            loaded: AtomicBool::new(false),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build the JSON request body for a text-to-audio call.
    pub fn build_request_body(prompt: &str, duration_secs: u32) -> Value {
        json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": duration_secs.saturating_mul(TOKENS_PER_SECOND),
            }
        })
    }
}

#[async_trait]
impl MusicGenerator for HfMusicGenerator {
    async fn warm_up(&self) -> Result<(), GeneratorError> {
        tracing::info!("checking model {}", self.model);
        let status = self.client.model_status(&self.model).await;

        match status.status {
            ModelState::Ready | ModelState::Loading => {
                self.loaded.store(true, Ordering::Release);
                tracing::info!("model {} is {:?}", self.model, status.status);
                Ok(())
            }
            ModelState::Error => Err(GeneratorError::ModelUnavailable {
                model: self.model.clone(),
                reason: status.message.unwrap_or_else(|| "unknown error".to_string()),
            }),
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        duration_secs: u32,
        output_stem: &Path,
    ) -> Result<PathBuf, GeneratorError> {
        if !self.is_loaded() {
            return Err(GeneratorError::NotLoaded);
        }

        tracing::info!("generating {}s: {}", duration_secs, prompt);
        let body = Self::build_request_body(prompt, duration_secs);
        let response = self
            .client
            .infer_json(&self.model, &body, "audio/wav")
            .await?;
        let audio = response.bytes().await.map_err(HfError::from)?;
        ensure_wav(&audio)?;

        let path = wav_path(output_stem);
        tokio::fs::write(&path, &audio).await?;
        Ok(path)
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    fn device(&self) -> &str {
        "remote"
    }
}
