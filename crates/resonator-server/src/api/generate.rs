// ABOUTME: Text-to-music generation endpoint.
// ABOUTME: Validates the prompt and duration, runs the generator, and records the new song.

use axum::Json;
use axum::extract::State;
use resonator_core::NewSong;
use resonator_store::SongRepository;
use serde::Deserialize;
use uuid::Uuid;

use super::{AudioResponse, with_store};
use crate::api::ApiError;
use crate::app_state::SharedState;

const MAX_PROMPT_CHARS: usize = 500;

/// Request body for a generation.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Seconds of audio; falls back to the configured default.
    pub duration: Option<u32>,
}

/// POST /generate - Generate a new song and record it.
pub async fn generate_music(
    State(state): State<SharedState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<AudioResponse>, ApiError> {
    let prompt_chars = req.prompt.chars().count();
    if req.prompt.trim().is_empty() || prompt_chars > MAX_PROMPT_CHARS {
        return Err(ApiError::Validation(format!(
            "prompt must be between 1 and {} characters",
            MAX_PROMPT_CHARS
        )));
    }

    let duration = req.duration.unwrap_or(state.config.default_duration);
    if duration == 0 || duration > state.config.max_duration {
        return Err(ApiError::Validation(format!(
            "duration must be between 1 and {} seconds",
            state.config.max_duration
        )));
    }

    let stem = format!("gen_{}", Uuid::new_v4());
    let written = state
        .generator
        .generate(&req.prompt, duration, &state.output.path_of(&stem))
        .await?;

    let filename = match written.file_name().and_then(|name| name.to_str()) {
        Some(name) => name.to_string(),
        None => {
            return Err(ApiError::Io(std::io::Error::other(format!(
                "generator wrote an unusable path: {}",
                written.display()
            ))));
        }
    };

    let new_song = NewSong::new(req.prompt, i64::from(duration), filename.clone());
    if let Err(e) = with_store(&state, move |store| SongRepository::create(store, &new_song)).await
    {
        if let Err(remove_err) = tokio::fs::remove_file(&written).await {
            tracing::warn!("failed to remove unrecorded file {}: {}", filename, remove_err);
        }
        return Err(e);
    }

    tracing::info!("generated {} ({}s)", filename, duration);
    Ok(Json(AudioResponse::success(&state, filename)))
}
