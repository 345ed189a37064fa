// ABOUTME: Route definitions for the resonator HTTP API.
// ABOUTME: Assembles the API handlers, the static output directory, and the CORS and trace layers.

use axum::Router;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Serialize;
use tower::ServiceExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::SharedState;
use crate::config::ResonatorConfig;

/// Build the complete Axum router with all routes and shared state.
pub fn create_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health))
        .route("/generate", post(api::generate::generate_music))
        .route("/process", post(api::process::process_audio))
        .route("/songs", get(api::songs::list_songs))
        .route(
            "/songs/{id}",
            get(api::songs::get_song)
                .patch(api::songs::update_song)
                .delete(api::songs::delete_song),
        )
        .route("/hf/status/{task}", get(api::hf::model_status))
        .route("/hf/separate-stems", post(api::hf::separate_stems))
        .route("/hf/denoise", post(api::hf::denoise))
        .route("/output/{*file}", get(serve_output))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &ResonatorConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.allows_any_origin() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// GET /output/{file} - Serve an audio artifact. Only plain names are served;
/// the database and its sidecar files answer 404 like any missing file.
async fn serve_output(
    State(state): State<SharedState>,
    Path(file): Path<String>,
    request: Request,
) -> Response {
    if api::plain_filename(&file).is_err() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let Ok(response) = ServeFile::new(state.output.path_of(&file))
        .oneshot(request)
        .await;
    response.into_response()
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
    device: String,
}

/// Health check handler. Reports whether the generator is ready.
async fn health(State(state): State<SharedState>) -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse {
        status: "ok",
        model_loaded: state.generator.is_loaded(),
        device: state.generator.device().to_string(),
    })
}
