// ABOUTME: WAL-mode SQLite store holding one row per song.
// ABOUTME: Opens a fresh connection and transaction per unit of work and checkpoints the log on shutdown.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, Transaction};
use thiserror::Error;

/// Name of the database file inside the output directory.
pub const DB_FILENAME: &str = "resonator.db";

/// Whether `name` is the database file or one of SQLite's sidecar files next to it.
/// These share the output directory with the audio artifacts but are never artifacts.
pub fn is_database_file(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    match name.strip_prefix(DB_FILENAME) {
        Some(suffix) => matches!(suffix, "" | "-wal" | "-shm" | "-journal"),
        None => false,
    }
}

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS songs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        prompt TEXT NOT NULL CHECK (length(prompt) > 0),
        duration INTEGER NOT NULL,
        filename TEXT NOT NULL UNIQUE,
        processed_filename TEXT,
        custom_name TEXT,
        is_favorite INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_songs_created_at ON songs(created_at DESC);
    CREATE INDEX IF NOT EXISTS idx_songs_is_favorite ON songs(is_favorite);
";

/// Errors that can occur in the store and the repository built on it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a song with filename {0:?} already exists")]
    UniqueConstraintViolation(String),

    #[error("invalid song: {0}")]
    InvalidSong(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not check artifact {filename:?}: {source}")]
    ArtifactCheck {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    #[error("wal checkpoint blocked by an active reader or writer ({checkpointed} of {log_frames} frames copied)")]
    CheckpointBusy { log_frames: i64, checkpointed: i64 },
}

/// Frame counters reported by `PRAGMA wal_checkpoint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointStats {
    pub log_frames: i64,
    pub checkpointed: i64,
}

/// Handle to the on-disk song database. Holds only the file path; every operation
/// opens its own connection, so the handle is cheap to clone and share across requests.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Open or create the database inside `output_dir`, creating the directory if needed.
    /// Enables WAL journaling and creates the songs table and indexes if absent.
    pub fn open(output_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(output_dir)?;
        let store = Self {
            path: output_dir.join(DB_FILENAME),
        };

        let conn = store.connect()?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!("database initialized at {}", store.path.display());
        Ok(store)
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `work` inside a transaction on a fresh connection. Commits when `work`
    /// returns `Ok`, rolls back and returns the error otherwise. The connection is
    /// closed on every path.
    pub fn unit_of_work<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        match work(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::error!("rollback failed: {}", rollback_err);
                }
                tracing::error!("database error: {}", e);
                Err(e)
            }
        }
    }

    /// Copy every WAL frame into the main database file and truncate the log.
    pub fn checkpoint(&self) -> Result<CheckpointStats, StoreError> {
        let conn = self.connect()?;
        let (busy, log_frames, checkpointed): (i64, i64, i64) =
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;

        if busy != 0 {
            return Err(StoreError::CheckpointBusy {
                log_frames,
                checkpointed,
            });
        }

        Ok(CheckpointStats {
            log_frames,
            checkpointed,
        })
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        // Both settings are per-connection.
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
        Ok(conn)
    }
}
