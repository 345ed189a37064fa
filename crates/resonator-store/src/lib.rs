// ABOUTME: Persistence layer for resonator, keeping song rows consistent with audio files on disk.
// ABOUTME: Provides the WAL-mode SQLite store, the song repository, and startup orphan reconciliation.

pub mod db;
pub mod probe;
pub mod songs;

pub use db::{CheckpointStats, DB_FILENAME, Store, StoreError, is_database_file};
pub use probe::{ArtifactProbe, OutputDir};
pub use songs::SongRepository;
