// ABOUTME: Hugging Face inference endpoints: model status, stem separation, and denoising.
// ABOUTME: Results are written to the output directory next to the source file.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, State};
use resonator_audio::{HfTask, ModelStatus};
use resonator_store::ArtifactProbe;
use serde::Serialize;

use super::{AudioResponse, FileRequest, plain_filename};
use crate::api::ApiError;
use crate::app_state::SharedState;

#[derive(Debug, Serialize)]
pub struct StemsResponse {
    pub status: &'static str,
    /// Stem name (e.g. "drums") to the filename it was written to.
    pub stems: BTreeMap<String, String>,
}

/// GET /hf/status/{task} - Loading state of the model behind a task.
pub async fn model_status(
    State(state): State<SharedState>,
    Path(task): Path<String>,
) -> Result<Json<ModelStatus>, ApiError> {
    let task = HfTask::from_name(&task).ok_or_else(|| {
        let known: Vec<&str> = HfTask::ALL.iter().map(|t| t.name()).collect();
        ApiError::BadRequest(format!(
            "unknown task {:?}; expected one of {}",
            task,
            known.join(", ")
        ))
    })?;

    Ok(Json(state.hf.model_status(task.model_id()).await))
}

/// POST /hf/separate-stems - Split a file into drums, bass, vocals, and other.
pub async fn separate_stems(
    State(state): State<SharedState>,
    Json(req): Json<FileRequest>,
) -> Result<Json<StemsResponse>, ApiError> {
    let filename = existing_file(&state, &req.filename)?;

    let stems = state
        .hf
        .separate_stems(&state.output.path_of(filename), state.output.root())
        .await?;

    Ok(Json(StemsResponse {
        status: "success",
        stems,
    }))
}

/// POST /hf/denoise - Write a denoised copy of a file.
pub async fn denoise(
    State(state): State<SharedState>,
    Json(req): Json<FileRequest>,
) -> Result<Json<AudioResponse>, ApiError> {
    let filename = existing_file(&state, &req.filename)?;

    let denoised = state
        .hf
        .denoise(&state.output.path_of(filename), state.output.root())
        .await?;

    Ok(Json(AudioResponse::success(&state, denoised)))
}

fn existing_file<'a>(state: &SharedState, name: &'a str) -> Result<&'a str, ApiError> {
    let filename = plain_filename(name)?;
    if state.output.exists(filename)? {
        Ok(filename)
    } else {
        Err(ApiError::NotFound(format!("file not found: {}", filename)))
    }
}

#[cfg(test)]
mod tests {
    use crate::app_state::test_state;
    use crate::routes::create_router;
    use axum::body::Body;
    use http::Request;
    use tower::ServiceExt;

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_file(uri: &str, filename: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::to_vec(&serde_json::json!({ "filename": filename })).unwrap(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_task_is_bad_request() {
        let (_dir, state) = test_state().await;

        let resp = create_router(state)
            .oneshot(Request::get("/hf/status/karaoke").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), 400);
        let json = json_body(resp).await;
        assert!(json["error"].as_str().unwrap().contains("demucs"));
    }

    #[tokio::test]
    async fn unreachable_api_reports_error_status() {
        let (_dir, state) = test_state().await;

        let resp = create_router(state)
            .oneshot(Request::get("/hf/status/denoise").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        let json = json_body(resp).await;
        assert_eq!(json["status"], "error");
        assert_eq!(json["model"], "speechbrain/sepformer-wham16k-enhancement");
    }

    #[tokio::test]
    async fn stems_and_denoise_require_existing_file() {
        let (_dir, state) = test_state().await;

        for uri in ["/hf/separate-stems", "/hf/denoise"] {
            let resp = create_router(state.clone())
                .oneshot(post_file(uri, "missing.wav"))
                .await
                .unwrap();
            assert_eq!(resp.status(), 404, "{}", uri);

            let resp = create_router(state.clone())
                .oneshot(post_file(uri, "../missing.wav"))
                .await
                .unwrap();
            assert_eq!(resp.status(), 400, "{}", uri);

            let resp = create_router(state.clone())
                .oneshot(post_file(uri, "resonator.db"))
                .await
                .unwrap();
            assert_eq!(resp.status(), 400, "{}", uri);
        }
    }

    #[tokio::test]
    async fn denoise_surfaces_connection_failure_as_server_error() {
        let (dir, state) = test_state().await;
        std::fs::write(dir.path().join("a.wav"), b"RIFF").unwrap();

        let resp = create_router(state)
            .oneshot(post_file("/hf/denoise", "a.wav"))
            .await
            .unwrap();

        assert_eq!(resp.status(), 500);
    }
}
