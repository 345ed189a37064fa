// ABOUTME: Post-processing endpoint that runs the effects chain over a generated file.
// ABOUTME: Writes tickled_<filename> and links it to the song record when one exists.

use axum::Json;
use axum::extract::State;
use resonator_core::SongPatch;
use resonator_store::{ArtifactProbe, SongRepository};

use super::{AudioResponse, FileRequest, plain_filename, with_store};
use crate::api::ApiError;
use crate::app_state::SharedState;

/// POST /process - Apply the effects chain to an existing file.
pub async fn process_audio(
    State(state): State<SharedState>,
    Json(req): Json<FileRequest>,
) -> Result<Json<AudioResponse>, ApiError> {
    let filename = plain_filename(&req.filename)?.to_string();
    if !state.output.exists(&filename)? {
        return Err(ApiError::NotFound(format!("file not found: {}", filename)));
    }

    let processed = format!("tickled_{}", filename);
    let input = state.output.path_of(&filename);
    let output = state.output.path_of(&processed);
    let effects = state.effects.clone();
    tokio::task::spawn_blocking(move || effects.apply(&input, &output)).await??;

    let patch = SongPatch::processed(processed.clone());
    let lookup = filename.clone();
    let linked = with_store(&state, move |store| {
        match SongRepository::get_by_filename(store, &lookup)? {
            Some(song) => Ok(SongRepository::update(store, song.id, &patch)?.is_some()),
            None => Ok(false),
        }
    })
    .await?;
    if !linked {
        tracing::debug!("processed {} has no song record", filename);
    }

    tracing::info!("processed {} -> {}", filename, processed);
    Ok(Json(AudioResponse::success(&state, processed)))
}
