// ABOUTME: Typed CRUD over the songs table plus the startup orphan sweep.
// ABOUTME: Every operation borrows a Store and runs as one unit of work; nothing is cached here.

use chrono::{DateTime, SecondsFormat, Utc};
use resonator_core::{NewSong, ReconcileReport, Song, SongPatch};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, ToSql, ffi, params, params_from_iter};

use crate::db::{Store, StoreError};
use crate::probe::ArtifactProbe;

const SONG_COLUMNS: &str = "id, prompt, duration, filename, processed_filename, custom_name, \
                            is_favorite, created_at, updated_at";

/// Stateless repository for song rows. Holds no connection; callers pass the store.
pub struct SongRepository;

impl SongRepository {
    /// Insert a song and return the stored row, including its assigned id.
    pub fn create(store: &Store, new_song: &NewSong) -> Result<Song, StoreError> {
        if new_song.prompt.trim().is_empty() {
            return Err(StoreError::InvalidSong("prompt must not be empty".to_string()));
        }
        if new_song.filename.is_empty() {
            return Err(StoreError::InvalidSong("filename must not be empty".to_string()));
        }

        let now = timestamp_now();
        store.unit_of_work(|tx| {
            let inserted = tx.execute(
                "INSERT INTO songs (prompt, duration, filename, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![new_song.prompt, new_song.duration, new_song.filename, now],
            );

            match inserted {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(err, _)) if is_unique_violation(&err) => {
                    return Err(StoreError::UniqueConstraintViolation(new_song.filename.clone()));
                }
                Err(e) => return Err(e.into()),
            }

            let id = tx.last_insert_rowid();
            fetch_one(tx, "id = ?1", &id)?
                .ok_or(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
        })
    }

    pub fn get_by_id(store: &Store, id: i64) -> Result<Option<Song>, StoreError> {
        store.unit_of_work(|tx| Ok(fetch_one(tx, "id = ?1", &id)?))
    }

    pub fn get_by_filename(store: &Store, filename: &str) -> Result<Option<Song>, StoreError> {
        store.unit_of_work(|tx| Ok(fetch_one(tx, "filename = ?1", &filename)?))
    }

    /// Songs newest first. Ties on `created_at` are broken by descending id.
    pub fn list(store: &Store, limit: i64, offset: i64) -> Result<Vec<Song>, StoreError> {
        store.unit_of_work(|tx| {
            let mut stmt = tx.prepare(&format!(
                "SELECT {SONG_COLUMNS} FROM songs
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?1 OFFSET ?2"
            ))?;

            let rows = stmt.query_map(params![limit, offset], song_from_row)?;

            let mut songs = Vec::new();
            for row in rows {
                songs.push(row?);
            }
            Ok(songs)
        })
    }

    pub fn count(store: &Store) -> Result<i64, StoreError> {
        store.unit_of_work(|tx| Ok(tx.query_row("SELECT COUNT(*) FROM songs", [], |row| row.get(0))?))
    }

    /// Apply the fields set in `patch` and refresh `updated_at` in the same transaction.
    /// Returns `None` if no song has this id. An empty patch only reads.
    pub fn update(store: &Store, id: i64, patch: &SongPatch) -> Result<Option<Song>, StoreError> {
        if patch.is_empty() {
            return Self::get_by_id(store, id);
        }

        let now = timestamp_now();
        let mut assignments = Vec::new();
        let mut values: Vec<&dyn ToSql> = Vec::new();

        if let Some(custom_name) = &patch.custom_name {
            assignments.push("custom_name = ?");
            values.push(custom_name);
        }
        if let Some(is_favorite) = &patch.is_favorite {
            assignments.push("is_favorite = ?");
            values.push(is_favorite);
        }
        if let Some(processed_filename) = &patch.processed_filename {
            assignments.push("processed_filename = ?");
            values.push(processed_filename);
        }
        // MAX keeps updated_at >= created_at even if the wall clock steps backwards.
        assignments.push("updated_at = MAX(created_at, ?)");
        values.push(&now);
        values.push(&id);

        let sql = format!("UPDATE songs SET {} WHERE id = ?", assignments.join(", "));

        store.unit_of_work(|tx| {
            if tx.execute(&sql, values.as_slice())? == 0 {
                return Ok(None);
            }
            Ok(fetch_one(tx, "id = ?1", &id)?)
        })
    }

    /// Remove the row. Files on disk are left to the caller.
    pub fn delete(store: &Store, id: i64) -> Result<bool, StoreError> {
        store.unit_of_work(|tx| {
            let removed = tx.execute("DELETE FROM songs WHERE id = ?1", params![id])?;
            Ok(removed > 0)
        })
    }

    /// Delete every row whose primary artifact is missing, in a single statement.
    ///
    /// Only a clean "absent" answer from the probe orphans a row. A probe error
    /// aborts the sweep, rolls back, and is returned; nothing is deleted.
    /// `processed_filename` is never checked.
    pub fn validate_and_cleanup(
        store: &Store,
        probe: &dyn ArtifactProbe,
    ) -> Result<ReconcileReport, StoreError> {
        store.unit_of_work(|tx| {
            let mut stmt = tx.prepare("SELECT id, filename FROM songs ORDER BY id")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;

            let mut validated = 0;
            let mut orphaned = Vec::new();
            for row in rows {
                let (id, filename) = row?;
                validated += 1;

                let present = probe
                    .exists(&filename)
                    .map_err(|source| StoreError::ArtifactCheck {
                        filename: filename.clone(),
                        source,
                    })?;
                if !present {
                    tracing::warn!("orphaned song record: {}", filename);
                    orphaned.push(id);
                }
            }

            if !orphaned.is_empty() {
                let placeholders = vec!["?"; orphaned.len()].join(",");
                tx.execute(
                    &format!("DELETE FROM songs WHERE id IN ({placeholders})"),
                    params_from_iter(orphaned.iter()),
                )?;
                tracing::info!("cleaned up {} orphaned records", orphaned.len());
            }

            Ok(ReconcileReport {
                validated,
                removed: orphaned.len(),
            })
        })
    }
}

fn fetch_one(conn: &Connection, predicate: &str, key: &dyn ToSql) -> rusqlite::Result<Option<Song>> {
    conn.query_row(
        &format!("SELECT {SONG_COLUMNS} FROM songs WHERE {predicate}"),
        [key],
        song_from_row,
    )
    .optional()
}

fn song_from_row(row: &Row<'_>) -> rusqlite::Result<Song> {
    Ok(Song {
        id: row.get(0)?,
        prompt: row.get(1)?,
        duration: row.get(2)?,
        filename: row.get(3)?,
        processed_filename: row.get(4)?,
        custom_name: row.get(5)?,
        is_favorite: row.get(6)?,
        created_at: timestamp_column(row, 7)?,
        updated_at: timestamp_column(row, 8)?,
    })
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Fixed-width UTC text so that lexical order in SQL equals chronological order.
fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_unique_violation(err: &ffi::Error) -> bool {
    err.code == ErrorCode::ConstraintViolation && err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DB_FILENAME;
    use crate::probe::OutputDir;
    use std::io;
    use tempfile::TempDir;

    fn open() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    fn create(store: &Store, filename: &str) -> Song {
        SongRepository::create(store, &NewSong::new("dark halftime bass", 15, filename)).unwrap()
    }

    /// Writes the artifact to disk as well as creating its row.
    fn create_with_file(dir: &TempDir, store: &Store, filename: &str) -> Song {
        std::fs::write(dir.path().join(filename), b"RIFF").unwrap();
        create(store, filename)
    }

    #[test]
    fn create_assigns_id_and_defaults() {
        let (_dir, store) = open();

        let song = create(&store, "gen_a.wav");

        assert!(song.id > 0);
        assert_eq!(song.prompt, "dark halftime bass");
        assert_eq!(song.duration, 15);
        assert_eq!(song.filename, "gen_a.wav");
        assert!(song.processed_filename.is_none());
        assert!(song.custom_name.is_none());
        assert!(!song.is_favorite);
        assert_eq!(song.created_at, song.updated_at);
    }

    #[test]
    fn create_rejects_empty_prompt() {
        let (_dir, store) = open();

        let result = SongRepository::create(&store, &NewSong::new("  ", 15, "gen_a.wav"));

        assert!(matches!(result, Err(StoreError::InvalidSong(_))));
        assert_eq!(SongRepository::count(&store).unwrap(), 0);
    }

    #[test]
    fn duplicate_filename_is_a_unique_violation() {
        let (_dir, store) = open();
        let first = create(&store, "gen_a.wav");

        let result = SongRepository::create(&store, &NewSong::new("other prompt", 30, "gen_a.wav"));

        match result {
            Err(StoreError::UniqueConstraintViolation(filename)) => assert_eq!(filename, "gen_a.wav"),
            other => panic!("expected unique violation, got {:?}", other),
        }
        let survivor = SongRepository::get_by_id(&store, first.id).unwrap().unwrap();
        assert_eq!(survivor, first);
        assert_eq!(SongRepository::count(&store).unwrap(), 1);
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let (_dir, store) = open();
        let first = create(&store, "gen_a.wav");
        assert!(SongRepository::delete(&store, first.id).unwrap());

        let second = create(&store, "gen_b.wav");

        assert!(second.id > first.id);
    }

    #[test]
    fn lookups_return_none_when_absent() {
        let (_dir, store) = open();
        let song = create(&store, "gen_a.wav");

        assert!(SongRepository::get_by_id(&store, song.id + 100).unwrap().is_none());
        assert!(SongRepository::get_by_filename(&store, "nope.wav").unwrap().is_none());
        assert_eq!(
            SongRepository::get_by_filename(&store, "gen_a.wav").unwrap(),
            Some(song)
        );
    }

    #[test]
    fn list_is_newest_first_and_offset_skips() {
        let (_dir, store) = open();
        let created: Vec<Song> = (0..5)
            .map(|i| create(&store, &format!("gen_{i}.wav")))
            .collect();

        let all = SongRepository::list(&store, 5, 0).unwrap();
        let ids: Vec<i64> = all.iter().map(|s| s.id).collect();
        let mut expected: Vec<i64> = created.iter().map(|s| s.id).collect();
        expected.reverse();
        assert_eq!(ids, expected);
        for pair in all.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }

        let page = SongRepository::list(&store, 5, 2).unwrap();
        assert_eq!(page, all[2..].to_vec());

        let window = SongRepository::list(&store, 2, 1).unwrap();
        assert_eq!(window, all[1..3].to_vec());
    }

    #[test]
    fn list_and_count_on_empty_store() {
        let (_dir, store) = open();

        assert!(SongRepository::list(&store, 100, 0).unwrap().is_empty());
        assert_eq!(SongRepository::count(&store).unwrap(), 0);
    }

    #[test]
    fn partial_update_touches_only_given_fields() {
        let (_dir, store) = open();
        let song = create(&store, "gen_a.wav");
        let named = SongRepository::update(
            &store,
            song.id,
            &SongPatch {
                custom_name: Some("Wobble".to_string()),
                processed_filename: Some("tickled_gen_a.wav".to_string()),
                ..SongPatch::default()
            },
        )
        .unwrap()
        .unwrap();

        let updated = SongRepository::update(&store, song.id, &SongPatch::favorite(true))
            .unwrap()
            .unwrap();

        assert!(updated.is_favorite);
        assert_eq!(updated.custom_name.as_deref(), Some("Wobble"));
        assert_eq!(updated.processed_filename.as_deref(), Some("tickled_gen_a.wav"));
        assert_eq!(updated.prompt, song.prompt);
        assert_eq!(updated.filename, song.filename);
        assert_eq!(updated.created_at, song.created_at);
        assert!(updated.updated_at >= named.updated_at);
        assert!(updated.updated_at >= updated.created_at);
    }

    #[test]
    fn update_advances_updated_at() {
        let (_dir, store) = open();
        let song = create(&store, "gen_a.wav");
        std::thread::sleep(std::time::Duration::from_millis(5));

        let updated = SongRepository::update(&store, song.id, &SongPatch::favorite(true))
            .unwrap()
            .unwrap();

        assert!(updated.updated_at > song.updated_at);
        assert_eq!(updated.created_at, song.created_at);

        let reread = SongRepository::get_by_id(&store, song.id).unwrap().unwrap();
        assert_eq!(reread.updated_at, updated.updated_at);
    }

    #[test]
    fn empty_patch_is_a_plain_read() {
        let (_dir, store) = open();
        let song = create(&store, "gen_a.wav");

        let read = SongRepository::update(&store, song.id, &SongPatch::default()).unwrap();

        assert_eq!(read, Some(song));
    }

    #[test]
    fn update_of_missing_id_returns_none() {
        let (_dir, store) = open();

        let result = SongRepository::update(&store, 42, &SongPatch::favorite(true)).unwrap();

        assert!(result.is_none());
    }

    #[test]
    fn delete_reports_whether_a_row_was_removed() {
        let (_dir, store) = open();
        let song = create(&store, "gen_a.wav");

        assert!(!SongRepository::delete(&store, song.id + 1).unwrap());
        assert!(SongRepository::delete(&store, song.id).unwrap());
        assert!(SongRepository::get_by_id(&store, song.id).unwrap().is_none());
        assert!(!SongRepository::delete(&store, song.id).unwrap());
    }

    #[test]
    fn cleanup_removes_row_whose_file_vanished() {
        let (dir, store) = open();
        let first = create_with_file(&dir, &store, "gen_1.wav");
        let second = create_with_file(&dir, &store, "gen_2.wav");
        let third = create_with_file(&dir, &store, "gen_3.wav");
        std::fs::remove_file(dir.path().join("gen_2.wav")).unwrap();

        let report = SongRepository::validate_and_cleanup(&store, &OutputDir::new(dir.path())).unwrap();

        assert_eq!(report, ReconcileReport { validated: 3, removed: 1 });
        assert!(SongRepository::get_by_id(&store, second.id).unwrap().is_none());
        assert!(SongRepository::get_by_id(&store, first.id).unwrap().is_some());
        assert!(SongRepository::get_by_id(&store, third.id).unwrap().is_some());
    }

    #[test]
    fn cleanup_is_idempotent() {
        let (dir, store) = open();
        create_with_file(&dir, &store, "gen_1.wav");
        create(&store, "gen_missing.wav");
        let probe = OutputDir::new(dir.path());

        let first = SongRepository::validate_and_cleanup(&store, &probe).unwrap();
        let second = SongRepository::validate_and_cleanup(&store, &probe).unwrap();

        assert_eq!(first, ReconcileReport { validated: 2, removed: 1 });
        assert_eq!(second, ReconcileReport { validated: 1, removed: 0 });
    }

    #[test]
    fn cleanup_removes_many_orphans_at_once() {
        let (dir, store) = open();
        for i in 0..20 {
            create(&store, &format!("gone_{i}.wav"));
        }
        let kept = create_with_file(&dir, &store, "kept.wav");

        let report = SongRepository::validate_and_cleanup(&store, &OutputDir::new(dir.path())).unwrap();

        assert_eq!(report, ReconcileReport { validated: 21, removed: 20 });
        let remaining = SongRepository::list(&store, 100, 0).unwrap();
        assert_eq!(remaining, vec![kept]);
    }

    #[test]
    fn cleanup_ignores_missing_processed_artifact() {
        let (dir, store) = open();
        let song = create_with_file(&dir, &store, "gen_1.wav");
        SongRepository::update(&store, song.id, &SongPatch::processed("tickled_gen_1.wav")).unwrap();

        let report = SongRepository::validate_and_cleanup(&store, &OutputDir::new(dir.path())).unwrap();

        assert_eq!(report.removed, 0);
        assert!(SongRepository::get_by_id(&store, song.id).unwrap().is_some());
    }

    #[test]
    fn cleanup_propagates_probe_errors_without_deleting() {
        let (_dir, store) = open();
        create(&store, "gen_1.wav");
        create(&store, "gen_2.wav");
        let probe = |filename: &str| -> io::Result<bool> {
            if filename == "gen_2.wav" {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
            } else {
                Ok(false)
            }
        };

        let result = SongRepository::validate_and_cleanup(&store, &probe);

        match result {
            Err(StoreError::ArtifactCheck { filename, .. }) => assert_eq!(filename, "gen_2.wav"),
            other => panic!("expected artifact check error, got {:?}", other),
        }
        assert_eq!(SongRepository::count(&store).unwrap(), 2);
    }

    #[test]
    fn committed_create_survives_crash_before_checkpoint() {
        let (dir, store) = open();
        // An open connection stops the last writer from checkpointing on close,
        // so the row exists only in the WAL when the files are copied.
        let _keeper = Connection::open(store.path()).unwrap();
        let song = create(&store, "gen_a.wav");

        let wal = dir.path().join(format!("{DB_FILENAME}-wal"));
        assert!(std::fs::metadata(&wal).unwrap().len() > 0);

        let crashed = TempDir::new().unwrap();
        std::fs::copy(store.path(), crashed.path().join(DB_FILENAME)).unwrap();
        std::fs::copy(&wal, crashed.path().join(format!("{DB_FILENAME}-wal"))).unwrap();

        let restarted = Store::open(crashed.path()).unwrap();
        let recovered = SongRepository::get_by_id(&restarted, song.id).unwrap();
        assert_eq!(recovered, Some(song));
    }
}
