// ABOUTME: Shared application state for the resonator HTTP server.
// ABOUTME: Holds the config, the song store handle, and the audio collaborators used by handlers.

use std::sync::Arc;

use resonator_audio::{EffectsProcessor, HfClient, MusicGenerator};
use resonator_store::{OutputDir, Store};

use crate::config::ResonatorConfig;

/// Shared application state accessible by all Axum handlers.
pub struct AppState {
    pub config: ResonatorConfig,
    pub store: Store,
    /// Directory holding every generated and processed artifact.
    pub output: OutputDir,
    pub generator: Arc<dyn MusicGenerator>,
    pub effects: Arc<dyn EffectsProcessor>,
    pub hf: HfClient,
}

/// Type alias for the Arc-wrapped state used with Axum's State extractor.
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Assemble state from an opened store and ready collaborators. The
    /// Hugging Face client is built from the config.
    pub fn new(
        config: ResonatorConfig,
        store: Store,
        generator: Arc<dyn MusicGenerator>,
        effects: Arc<dyn EffectsProcessor>,
    ) -> Self {
        let output = OutputDir::new(config.output_dir.clone());
        let hf = config.hf_client();
        Self {
            config,
            store,
            output,
            generator,
            effects,
            hf,
        }
    }
}

/// State backed by a temp dir, a warmed-up stub generator, and copy-only effects.
/// The Hugging Face client points at a closed local port.
#[cfg(test)]
pub(crate) async fn test_state() -> (tempfile::TempDir, SharedState) {
    use resonator_audio::testing::{CopyEffects, StubGenerator};

    let dir = tempfile::TempDir::new().unwrap();
    let output_dir = dir.path().to_string_lossy().into_owned();
    let config = ResonatorConfig::from_lookup(|key| match key {
        "OUTPUT_DIR" => Some(output_dir.clone()),
        "PUBLIC_BASE_URL" => Some("http://test.local".to_string()),
        "HF_API_URL" => Some("http://127.0.0.1:9".to_string()),
        "HF_API_TIMEOUT" => Some("1".to_string()),
        _ => None,
    })
    .unwrap();

    let store = Store::open(&config.output_dir).unwrap();
    let generator = StubGenerator::new();
    generator.warm_up().await.unwrap();

    let state = AppState::new(config, store, Arc::new(generator), Arc::new(CopyEffects));
    (dir, Arc::new(state))
}
