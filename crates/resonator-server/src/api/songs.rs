// ABOUTME: Song library API handlers: paginated listing, lookup, partial update, and delete.
// ABOUTME: Delete removes the song's audio files before dropping the record.

use axum::Json;
use axum::extract::{Path, Query, State};
use resonator_core::{Song, SongPatch};
use resonator_store::SongRepository;
use serde::{Deserialize, Serialize};

use super::with_store;
use crate::api::ApiError;
use crate::app_state::SharedState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

/// A song plus the public URLs of its audio files.
#[derive(Debug, Serialize)]
pub struct SongResponse {
    #[serde(flatten)]
    pub song: Song,
    pub url: String,
    pub processed_url: Option<String>,
}

impl SongResponse {
    fn from_song(state: &SharedState, song: Song) -> Self {
        Self {
            url: state.config.output_url(&song.filename),
            processed_url: song
                .processed_filename
                .as_deref()
                .map(|name| state.config.output_url(name)),
            song,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SongListResponse {
    pub songs: Vec<SongResponse>,
    pub total: i64,
}

/// Fields a client may change. The processed filename is owned by /process.
#[derive(Debug, Deserialize)]
pub struct UpdateSongRequest {
    pub custom_name: Option<String>,
    pub is_favorite: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub status: &'static str,
    pub id: i64,
}

/// GET /songs - Newest songs first, with the total count.
pub async fn list_songs(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<SongListResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    let offset = params.offset.unwrap_or(0);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }
    if offset < 0 {
        return Err(ApiError::Validation("offset must be non-negative".to_string()));
    }

    let (songs, total) = with_store(&state, move |store| {
        let songs = SongRepository::list(store, limit, offset)?;
        let total = SongRepository::count(store)?;
        Ok((songs, total))
    })
    .await?;

    let songs = songs
        .into_iter()
        .map(|song| SongResponse::from_song(&state, song))
        .collect();
    Ok(Json(SongListResponse { songs, total }))
}

/// GET /songs/{id}
pub async fn get_song(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<SongResponse>, ApiError> {
    let song = with_store(&state, move |store| SongRepository::get_by_id(store, id))
        .await?
        .ok_or_else(|| song_not_found(id))?;
    Ok(Json(SongResponse::from_song(&state, song)))
}

/// PATCH /songs/{id} - Rename or (un)favorite a song.
pub async fn update_song(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateSongRequest>,
) -> Result<Json<SongResponse>, ApiError> {
    let patch = SongPatch {
        custom_name: req.custom_name,
        is_favorite: req.is_favorite,
        processed_filename: None,
    };
    let song = with_store(&state, move |store| SongRepository::update(store, id, &patch))
        .await?
        .ok_or_else(|| song_not_found(id))?;
    Ok(Json(SongResponse::from_song(&state, song)))
}

/// DELETE /songs/{id} - Remove the song's files, then its record.
pub async fn delete_song(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let song = with_store(&state, move |store| SongRepository::get_by_id(store, id))
        .await?
        .ok_or_else(|| song_not_found(id))?;

    let files = std::iter::once(song.filename.as_str()).chain(song.processed_filename.as_deref());
    for filename in files {
        match tokio::fs::remove_file(state.output.path_of(filename)).await {
            Ok(()) => tracing::info!("deleted file {}", filename),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    let deleted = with_store(&state, move |store| SongRepository::delete(store, id)).await?;
    if !deleted {
        return Err(song_not_found(id));
    }

    Ok(Json(DeleteResponse {
        status: "deleted",
        id,
    }))
}

fn song_not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("song {} not found", id))
}

#[cfg(test)]
mod tests {
    use crate::app_state::test_state;
    use crate::routes::create_router;
    use axum::body::Body;
    use http::Request;
    use resonator_core::{NewSong, SongPatch};
    use resonator_store::SongRepository;
    use tower::ServiceExt;

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn list_returns_newest_first_with_total() {
        let (_dir, state) = test_state().await;
        for name in ["a.wav", "b.wav", "c.wav"] {
            SongRepository::create(&state.store, &NewSong::new("p", 5, name)).unwrap();
        }

        let resp = create_router(state.clone())
            .oneshot(get("/songs?limit=2&offset=0"))
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        let json = json_body(resp).await;
        assert_eq!(json["total"], 3);
        let songs = json["songs"].as_array().unwrap();
        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0]["filename"], "c.wav");
        assert_eq!(songs[1]["filename"], "b.wav");
        assert_eq!(songs[0]["url"], "http://test.local/output/c.wav");
        assert!(songs[0]["processed_url"].is_null());
        assert_eq!(songs[0]["is_favorite"], false);
    }

    #[tokio::test]
    async fn list_rejects_out_of_range_pagination() {
        let (_dir, state) = test_state().await;

        for uri in ["/songs?limit=0", "/songs?limit=501", "/songs?offset=-1"] {
            let resp = create_router(state.clone()).oneshot(get(uri)).await.unwrap();
            assert_eq!(resp.status(), 422, "{} should be rejected", uri);
        }
    }

    #[tokio::test]
    async fn get_song_includes_processed_url() {
        let (_dir, state) = test_state().await;
        let song = SongRepository::create(&state.store, &NewSong::new("p", 5, "a.wav")).unwrap();
        SongRepository::update(&state.store, song.id, &SongPatch::processed("tickled_a.wav"))
            .unwrap();

        let resp = create_router(state.clone())
            .oneshot(get(&format!("/songs/{}", song.id)))
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        let json = json_body(resp).await;
        assert_eq!(json["id"], song.id);
        assert_eq!(
            json["processed_url"],
            "http://test.local/output/tickled_a.wav"
        );
    }

    #[tokio::test]
    async fn get_missing_song_is_not_found() {
        let (_dir, state) = test_state().await;

        let resp = create_router(state).oneshot(get("/songs/42")).await.unwrap();

        assert_eq!(resp.status(), 404);
        let json = json_body(resp).await;
        assert_eq!(json["error"], "song 42 not found");
    }

    #[tokio::test]
    async fn patch_updates_only_given_fields() {
        let (_dir, state) = test_state().await;
        let song = SongRepository::create(&state.store, &NewSong::new("p", 5, "a.wav")).unwrap();

        let resp = create_router(state.clone())
            .oneshot(
                Request::patch(format!("/songs/{}", song.id))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"is_favorite": true}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        let json = json_body(resp).await;
        assert_eq!(json["is_favorite"], true);
        assert!(json["custom_name"].is_null());

        let stored = SongRepository::get_by_id(&state.store, song.id).unwrap().unwrap();
        assert!(stored.is_favorite);
        assert_eq!(stored.prompt, "p");
    }

    #[tokio::test]
    async fn delete_removes_files_and_record() {
        let (dir, state) = test_state().await;
        std::fs::write(dir.path().join("a.wav"), b"x").unwrap();
        std::fs::write(dir.path().join("tickled_a.wav"), b"y").unwrap();
        let song = SongRepository::create(&state.store, &NewSong::new("p", 5, "a.wav")).unwrap();
        SongRepository::update(&state.store, song.id, &SongPatch::processed("tickled_a.wav"))
            .unwrap();

        let resp = create_router(state.clone())
            .oneshot(
                Request::delete(format!("/songs/{}", song.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        let json = json_body(resp).await;
        assert_eq!(json["status"], "deleted");
        assert_eq!(json["id"], song.id);
        assert!(!dir.path().join("a.wav").exists());
        assert!(!dir.path().join("tickled_a.wav").exists());
        assert!(SongRepository::get_by_id(&state.store, song.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_tolerates_missing_files_and_404s_unknown_ids() {
        let (_dir, state) = test_state().await;
        let song = SongRepository::create(&state.store, &NewSong::new("p", 5, "gone.wav")).unwrap();

        let first = create_router(state.clone())
            .oneshot(
                Request::delete(format!("/songs/{}", song.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(first.status(), 200);

        let second = create_router(state.clone())
            .oneshot(
                Request::delete(format!("/songs/{}", song.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), 404);
    }
}
