//! HTML extraction for Bandcamp pages.
//!
//! Bandcamp embeds page state as HTML-escaped JSON inside element
//! attributes. Everything here is best-effort: a pattern that no longer
//! matches means "no data", never an error.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;

use super::types::{Track, Tralbum};

static PAGEDATA_BLOB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<div[^>]*id="pagedata"[^>]*data-blob="([^"]*)""#).unwrap()
});

static TRALBUM_DATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<script[^>]*data-tralbum="([^"]*)""#).unwrap());

/// Bandcamp's own date format, e.g. `15 Jan 2023 10:30:00 GMT`.
const BANDCAMP_DATE_FORMAT: &str = "%d %b %Y %H:%M:%S GMT";

fn attribute_json(pattern: &Regex, html: &str) -> Option<Value> {
    let raw = pattern.captures(html)?.get(1)?.as_str();
    let decoded = html_escape::decode_html_entities(raw);
    match serde_json::from_str(&decoded) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "Embedded page data is not valid JSON");
            None
        }
    }
}

/// Pull `fan_data.fan_id` out of a fan profile page.
pub fn extract_fan_id(html: &str) -> Option<String> {
    let blob = attribute_json(&PAGEDATA_BLOB, html)?;
    match blob.get("fan_data")?.get("fan_id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Tracks with a title and a streamable mp3, ordered by track number.
pub fn parse_track_listing(html: &str) -> Vec<Track> {
    let Some(data) = attribute_json(&TRALBUM_DATA, html) else {
        return Vec::new();
    };
    let tralbum: Tralbum = match serde_json::from_value(data) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(error = %e, "Unexpected tralbum shape");
            return Vec::new();
        }
    };

    let mut tracks: Vec<Track> = tralbum
        .trackinfo
        .into_iter()
        .filter_map(|info| info.into_track())
        .collect();
    tracks.sort_by_key(|t| t.track_num);
    tracks
}

/// Parse an upstream date into epoch seconds, falling back to now.
pub fn parse_upstream_date(raw: Option<&str>) -> i64 {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(parse_date)
        .unwrap_or_else(|| Utc::now().timestamp())
}

fn parse_date(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.timestamp());
    }
    NaiveDateTime::parse_from_str(s, BANDCAMP_DATE_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}
