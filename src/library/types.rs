//! Album records and the shapes used to create and modify them.

use serde::Serialize;

use super::error::StoreError;

/// Rating value meaning "not rated yet".
pub const UNRATED: i32 = -1;

/// Highest accepted rating.
pub const MAX_RATING: i32 = 10;

/// A stored album. `bandcamp_id` is the dedup key across sync runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumRecord {
    pub id: i64,
    pub bandcamp_id: String,
    pub bandcamp_band_id: String,
    pub title: String,
    pub artist: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub artwork_url: Option<String>,
    pub purchased: bool,
    pub rating: i32,
    pub comment: String,
    /// Epoch seconds.
    pub created_at: i64,
    /// Epoch seconds.
    pub updated_at: i64,
}

impl AlbumRecord {
    pub fn is_rated(&self) -> bool {
        self.rating >= 0
    }
}

/// An album as scraped from a collection or wishlist page, before it has a
/// local id or a purchased flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlbum {
    pub bandcamp_id: String,
    pub bandcamp_band_id: String,
    pub title: String,
    pub artist: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub artwork_url: Option<String>,
    pub comment: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Partial update applied by [`AlbumStore::update`](super::AlbumStore::update).
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumPatch {
    pub purchased: Option<bool>,
    pub rating: Option<i32>,
    pub comment: Option<String>,
}

impl AlbumPatch {
    pub fn mark_purchased() -> Self {
        Self {
            purchased: Some(true),
            ..Self::default()
        }
    }
}

/// Aggregate numbers over the whole library.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryStats {
    pub total: u64,
    pub purchased: u64,
    pub wishlist: u64,
    pub rated: u64,
    /// Mean of ratings >= 0, absent when nothing is rated.
    pub average_rating: Option<f64>,
}

pub(crate) fn validate_rating(rating: i32) -> Result<(), StoreError> {
    if (UNRATED..=MAX_RATING).contains(&rating) {
        Ok(())
    } else {
        Err(StoreError::InvalidRating(rating))
    }
}
