//! Wire types for Bandcamp's collection API and album pages.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::scrape::parse_upstream_date;
use crate::library::NewAlbum;

/// Which list of a fan's albums a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Collection,
    Wishlist,
}

impl EndpointKind {
    pub fn api_path(&self) -> &'static str {
        match self {
            EndpointKind::Collection => "/api/fancollection/1/collection_items",
            EndpointKind::Wishlist => "/api/fancollection/1/wishlist_items",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EndpointKind::Collection => "collection",
            EndpointKind::Wishlist => "wishlist",
        })
    }
}

/// Body POSTed to the collection endpoints.
#[derive(Debug, Serialize)]
pub(crate) struct PageRequest<'a> {
    pub count: u32,
    pub fan_id: &'a str,
    pub older_than_token: &'a str,
}

/// One page of collection or wishlist items.
///
/// `items` is required; a body without it is treated as an invalid response.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionPage {
    pub items: Vec<CollectionItem>,
    #[serde(default)]
    pub last_token: Option<String>,
}

impl CollectionPage {
    /// Cursor for the next request, if there is one.
    pub fn next_token(&self) -> Option<&str> {
        self.last_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// A raw collection item. Every field is optional upstream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionItem {
    #[serde(default, deserialize_with = "lenient_id")]
    pub album_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub band_id: Option<String>,
    #[serde(default)]
    pub album_title: Option<String>,
    #[serde(default)]
    pub band_name: Option<String>,
    #[serde(default)]
    pub item_url: Option<String>,
    #[serde(default)]
    pub item_art: Option<ItemArt>,
    #[serde(default)]
    pub added: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemArt {
    #[serde(default)]
    pub thumb_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl CollectionItem {
    /// Map to a library draft. Items without an album id (tracks, merch,
    /// deleted releases) yield `None`.
    pub fn into_new_album(self) -> Option<NewAlbum> {
        let bandcamp_id = self.album_id?;
        let (thumbnail_url, artwork_url) = match self.item_art {
            Some(art) => (art.thumb_url, art.url),
            None => (None, None),
        };
        Some(NewAlbum {
            bandcamp_id,
            bandcamp_band_id: self.band_id.unwrap_or_default(),
            title: self.album_title.unwrap_or_default(),
            artist: self.band_name.unwrap_or_default(),
            url: self.item_url.unwrap_or_default(),
            thumbnail_url,
            artwork_url,
            comment: String::new(),
            created_at: parse_upstream_date(self.added.as_deref()),
            updated_at: parse_upstream_date(self.updated.as_deref()),
        })
    }
}

/// Accept ids as numbers or strings. Null, 0, "" and "0" all mean absent.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => Some(n.to_string()).filter(|s| s != "0"),
        Some(Value::String(s)) => {
            let s = s.trim().to_string();
            (!s.is_empty() && s != "0").then_some(s)
        }
        _ => None,
    })
}

/// The JSON embedded in an album page's `data-tralbum` attribute.
#[derive(Debug, Deserialize)]
pub(crate) struct Tralbum {
    #[serde(default)]
    pub trackinfo: Vec<TrackInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrackInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub track_num: Option<i64>,
    #[serde(default)]
    pub file: Option<HashMap<String, Option<String>>>,
}

impl TrackInfo {
    pub fn into_track(self) -> Option<Track> {
        let name = self.title.filter(|t| !t.is_empty())?;
        let url = self
            .file?
            .remove("mp3-128")
            .flatten()
            .filter(|u| !u.is_empty())?;
        Some(Track {
            name,
            url,
            track_num: self.track_num.unwrap_or(0),
        })
    }
}

/// A playable track from an album page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub name: String,
    pub url: String,
    pub track_num: i64,
}
