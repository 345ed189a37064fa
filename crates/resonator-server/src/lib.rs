// ABOUTME: HTTP server for resonator: song library API, generation, and post-processing endpoints.
// ABOUTME: Uses Axum with shared state holding the song store and the audio collaborators.

pub mod api;
pub mod app_state;
pub mod config;
pub mod lifecycle;
pub mod routes;

pub use app_state::{AppState, SharedState};
pub use config::{ConfigError, ResonatorConfig};
pub use lifecycle::{Lifecycle, LifecycleError, LifecycleState};
pub use routes::create_router;
