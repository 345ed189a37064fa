// ABOUTME: Defines the Song record and the inputs used to create and patch it.
// ABOUTME: One Song row exists per generated audio artifact in the output directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for a single generated (and possibly post-processed) audio artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: i64,
    pub prompt: String,
    pub duration: i64,
    pub filename: String,
    pub processed_filename: Option<String>,
    pub custom_name: Option<String>,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a new song. The id and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSong {
    pub prompt: String,
    pub duration: i64,
    pub filename: String,
}

impl NewSong {
    pub fn new(prompt: impl Into<String>, duration: i64, filename: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            duration,
            filename: filename.into(),
        }
    }
}

/// A partial update. `None` means "leave unchanged"; there is no way to clear a
/// column back to NULL through a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SongPatch {
    pub custom_name: Option<String>,
    pub is_favorite: Option<bool>,
    pub processed_filename: Option<String>,
}

impl SongPatch {
    pub fn favorite(is_favorite: bool) -> Self {
        Self {
            is_favorite: Some(is_favorite),
            ..Self::default()
        }
    }

    pub fn processed(processed_filename: impl Into<String>) -> Self {
        Self {
            processed_filename: Some(processed_filename.into()),
            ..Self::default()
        }
    }

    /// True when no recognized field is set, so applying it would only read the row.
    pub fn is_empty(&self) -> bool {
        self.custom_name.is_none() && self.is_favorite.is_none() && self.processed_filename.is_none()
    }
}

/// Outcome of the startup orphan sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Rows examined.
    pub validated: usize,
    /// Rows deleted because their primary artifact was missing.
    pub removed: usize,
}
