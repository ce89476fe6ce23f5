//! HTTP access to Bandcamp's fan pages, album pages and the private
//! collection API.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;

use super::error::BandcampError;
use super::scrape;
use super::types::{CollectionPage, EndpointKind, PageRequest, Track};
use crate::retry::{retry_with_backoff, RetryAction, RetryConfig};

pub const DEFAULT_BASE_URL: &str = "https://bandcamp.com";

/// Items requested per collection page.
const PAGE_SIZE: u32 = 20;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Bound on each individual request, retries excluded.
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(15),
            retry: RetryConfig::default(),
        }
    }
}

/// Stateless Bandcamp client. Cheap to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct BandcampClient {
    http: Client,
    base_url: String,
    retry: RetryConfig,
}

fn classify(err: &BandcampError) -> RetryAction {
    if err.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

impl BandcampClient {
    pub fn new(config: ClientConfig) -> Result<Self, BandcampError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(BandcampError::Client)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a Bandcamp username to its numeric fan id.
    ///
    /// Any failure (network, status, missing page data) is logged and
    /// reported as `None`.
    pub async fn resolve_fan_id(&self, username: &str) -> Option<String> {
        let username = username.trim().trim_matches('/');
        if username.is_empty() {
            return None;
        }
        let url = format!("{}/{}", self.base_url, username);

        let html = match self.get_text(&url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(username, error = %e, "Failed to fetch fan profile page");
                return None;
            }
        };

        let fan_id = scrape::extract_fan_id(&html);
        match &fan_id {
            Some(id) => tracing::debug!(username, fan_id = %id, "Resolved fan id"),
            None => tracing::warn!(username, "No fan id found on profile page"),
        }
        fan_id
    }

    /// Fetch one page of a fan's collection or wishlist.
    pub async fn fetch_page(
        &self,
        kind: EndpointKind,
        fan_id: &str,
        older_than_token: &str,
    ) -> Result<CollectionPage, BandcampError> {
        let url = format!("{}{}", self.base_url, kind.api_path());
        let body = PageRequest {
            count: PAGE_SIZE,
            fan_id,
            older_than_token,
        };

        let text = retry_with_backoff(&self.retry, classify, || async {
            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| BandcampError::Transport {
                    url: url.clone(),
                    source: e,
                })?;
            let status = response.status();
            if !status.is_success() {
                return Err(BandcampError::HttpStatus {
                    status: status.as_u16(),
                    url: url.clone(),
                });
            }
            response.text().await.map_err(|e| BandcampError::Transport {
                url: url.clone(),
                source: e,
            })
        })
        .await?;

        serde_json::from_str(&text).map_err(|e| BandcampError::InvalidResponse {
            url,
            reason: e.to_string(),
        })
    }

    /// Playable tracks of an album page, ordered by track number. Empty on
    /// any failure.
    pub async fn fetch_track_listing(&self, album_url: &str) -> Vec<Track> {
        match self.get_text(album_url).await {
            Ok(html) => {
                let tracks = scrape::parse_track_listing(&html);
                tracing::debug!(url = album_url, count = tracks.len(), "Parsed track listing");
                tracks
            }
            Err(e) => {
                tracing::warn!(url = album_url, error = %e, "Failed to fetch album page");
                Vec::new()
            }
        }
    }

    async fn get_text(&self, url: &str) -> Result<String, BandcampError> {
        retry_with_backoff(&self.retry, classify, || async {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| BandcampError::Transport {
                    url: url.to_string(),
                    source: e,
                })?;
            let status = response.status();
            if !status.is_success() {
                return Err(BandcampError::HttpStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
            response.text().await.map_err(|e| BandcampError::Transport {
                url: url.to_string(),
                source: e,
            })
        })
        .await
    }
}
