// ABOUTME: Process lifecycle for the resonator server: open and reconcile the store, warm up, checkpoint on exit.
// ABOUTME: Tracks Uninitialized -> Ready -> ShuttingDown -> Stopped and rejects out-of-order calls.

use std::fmt;

use resonator_audio::{GeneratorError, MusicGenerator};
use resonator_store::{OutputDir, SongRepository, Store, StoreError};
use thiserror::Error;

use crate::config::ResonatorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Ready,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Ready => "ready",
            LifecycleState::ShuttingDown => "shutting down",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: LifecycleState,
    },

    #[error("failed to open song store: {0}")]
    StoreInit(#[source] StoreError),

    #[error("failed to reconcile song records: {0}")]
    Reconcile(#[source] StoreError),

    #[error("startup task failed: {0}")]
    Background(#[from] tokio::task::JoinError),

    #[error("generator warm-up failed: {0}")]
    WarmUp(#[from] GeneratorError),
}

/// Drives startup and shutdown. One instance per process; there is no reentry
/// once `Stopped` is reached.
#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Open the store, drop records whose audio is gone, then warm up the
    /// generator. Any failure leaves the lifecycle `Stopped`.
    pub async fn start(
        &mut self,
        config: &ResonatorConfig,
        generator: &dyn MusicGenerator,
    ) -> Result<Store, LifecycleError> {
        self.expect_state(LifecycleState::Uninitialized, "start")?;
        tracing::info!("starting up, output directory {}", config.output_dir.display());

        match Self::bring_up(config, generator).await {
            Ok(store) => {
                self.state = LifecycleState::Ready;
                tracing::info!("startup complete");
                Ok(store)
            }
            Err(e) => {
                self.state = LifecycleState::Stopped;
                tracing::error!("startup failed: {}", e);
                Err(e)
            }
        }
    }

    async fn bring_up(
        config: &ResonatorConfig,
        generator: &dyn MusicGenerator,
    ) -> Result<Store, LifecycleError> {
        let output_dir = config.output_dir.clone();
        let (store, report) = tokio::task::spawn_blocking(move || {
            let store = Store::open(&output_dir).map_err(LifecycleError::StoreInit)?;
            let probe = OutputDir::new(output_dir);
            let report = SongRepository::validate_and_cleanup(&store, &probe)
                .map_err(LifecycleError::Reconcile)?;
            Ok::<_, LifecycleError>((store, report))
        })
        .await??;
        tracing::info!(
            "validated {} song records, removed {} orphaned",
            report.validated,
            report.removed
        );

        tracing::info!("warming up generator on {}", generator.device());
        generator.warm_up().await?;

        Ok(store)
    }

    /// Checkpoint the write-ahead log and stop. A failed checkpoint is logged
    /// and does not prevent reaching `Stopped`.
    pub fn shutdown(&mut self, store: &Store) -> Result<(), LifecycleError> {
        self.expect_state(LifecycleState::Ready, "shut down")?;
        self.state = LifecycleState::ShuttingDown;
        tracing::info!("shutting down");

        match store.checkpoint() {
            Ok(stats) => tracing::info!(
                "wal checkpoint complete ({} frames)",
                stats.checkpointed
            ),
            Err(e) => tracing::error!("wal checkpoint failed: {}", e),
        }

        self.state = LifecycleState::Stopped;
        tracing::info!("shutdown complete");
        Ok(())
    }

    fn expect_state(
        &self,
        expected: LifecycleState,
        action: &'static str,
    ) -> Result<(), LifecycleError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                action,
                state: self.state,
            })
        }
    }
}
