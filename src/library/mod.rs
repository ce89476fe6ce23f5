//! Local album library.
//!
//! SQLite-backed storage for the single `Album` entity plus the singleton
//! sync bookkeeping row. The sync subsystem only sees the [`AlbumStore`]
//! and [`SyncConfigStore`] traits.

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{AlbumStore, SqliteLibrary, SyncConfigStore};
pub use error::StoreError;
pub use types::{AlbumPatch, AlbumRecord, LibraryStats, NewAlbum};
