// ABOUTME: API module root for the resonator HTTP server.
// ABOUTME: Groups the generation, processing, song library, and Hugging Face handlers.

pub mod error;
pub mod generate;
pub mod hf;
pub mod process;
pub mod songs;

use resonator_store::{Store, StoreError, is_database_file};
use serde::{Deserialize, Serialize};

pub use error::ApiError;

use crate::app_state::SharedState;

/// Request body naming an existing artifact in the output directory.
#[derive(Debug, Deserialize)]
pub struct FileRequest {
    pub filename: String,
}

/// Response describing a single audio artifact.
#[derive(Debug, Serialize)]
pub struct AudioResponse {
    pub status: &'static str,
    pub filename: String,
    pub url: String,
}

impl AudioResponse {
    pub fn success(state: &SharedState, filename: String) -> Self {
        Self {
            status: "success",
            url: state.config.output_url(&filename),
            filename,
        }
    }
}

/// Accept only a single plain path component naming an audio artifact, so
/// request-supplied names cannot reach outside the output directory or the database.
pub fn plain_filename(name: &str) -> Result<&str, ApiError> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if !plain {
        return Err(ApiError::BadRequest(format!("invalid filename: {:?}", name)));
    }
    if is_database_file(name) {
        return Err(ApiError::BadRequest(format!("reserved filename: {:?}", name)));
    }
    Ok(name)
}

/// Run a store operation on the blocking pool with a clone of the store handle.
pub(crate) async fn with_store<T, F>(state: &SharedState, work: F) -> Result<T, ApiError>
where
    F: FnOnce(&Store) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = state.store.clone();
    let result = tokio::task::spawn_blocking(move || work(&store)).await?;
    Ok(result?)
}
