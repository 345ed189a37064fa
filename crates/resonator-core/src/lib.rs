// ABOUTME: Core library for resonator, containing the song domain types.
// ABOUTME: Shared by the store (persistence) and server (HTTP) crates.

pub mod song;

pub use song::{NewSong, ReconcileReport, Song, SongPatch};
