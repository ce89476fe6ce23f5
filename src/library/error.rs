//! Album library errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cannot open album library at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// Schema setup or pragma failure while opening.
    #[error("Album library migration failed: {0}")]
    Migration(#[from] rusqlite::Error),

    #[error("Album library query failed: {0}")]
    Query(String),

    /// No album row with this local id.
    #[error("Album {0} not found")]
    NotFound(i64),

    /// Ratings must be -1 (unrated) through 10.
    #[error("Rating {0} is out of range (-1 to 10)")]
    InvalidRating(i32),

    #[error("Blocking library task failed: {0}")]
    Spawn(#[from] tokio::task::JoinError),

    #[error("Album library schema version {found} is newer than this build supports ({expected})")]
    UnsupportedSchemaVersion { found: i32, expected: i32 },
}

impl StoreError {
    pub fn query(source: rusqlite::Error) -> Self {
        Self::Query(source.to_string())
    }
}
