//! Cursor pagination over a fan's collection or wishlist.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::client::BandcampClient;
use super::error::BandcampError;
use super::types::{CollectionItem, CollectionPage, EndpointKind};
use crate::library::NewAlbum;

/// Consecutive pages without a usable album before giving up.
pub const MAX_EMPTY_PAGES: u32 = 3;

/// Anything that can serve collection pages. Implemented by
/// [`BandcampClient`]; tests substitute scripted sources.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(
        &self,
        kind: EndpointKind,
        fan_id: &str,
        older_than_token: &str,
    ) -> Result<CollectionPage, BandcampError>;
}

#[async_trait]
impl PageSource for BandcampClient {
    async fn fetch_page(
        &self,
        kind: EndpointKind,
        fan_id: &str,
        older_than_token: &str,
    ) -> Result<CollectionPage, BandcampError> {
        BandcampClient::fetch_page(self, kind, fan_id, older_than_token).await
    }
}

#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// Hard ceiling on page requests per list.
    pub max_requests: u32,
    /// Pause between consecutive page requests.
    pub page_delay: Duration,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_requests: 500,
            page_delay: Duration::from_millis(300),
        }
    }
}

/// The cursor that starts a walk from the newest item.
pub fn initial_token(now_epoch: i64) -> String {
    format!("{now_epoch}.0::a::")
}

pub struct PaginatedFetcher {
    source: Arc<dyn PageSource>,
    config: PaginationConfig,
}

impl PaginatedFetcher {
    pub fn new(source: Arc<dyn PageSource>, config: PaginationConfig) -> Self {
        Self { source, config }
    }

    /// Walk every page of `kind` for `fan_id`.
    ///
    /// Never fails: a page error ends the walk and whatever was accumulated
    /// so far is returned.
    pub async fn fetch_all(&self, kind: EndpointKind, fan_id: &str) -> Vec<NewAlbum> {
        let mut albums: Vec<NewAlbum> = Vec::new();
        let mut token = initial_token(Utc::now().timestamp());
        let mut requests: u32 = 0;
        let mut empty_pages: u32 = 0;

        loop {
            if requests >= self.config.max_requests {
                tracing::warn!(
                    %kind,
                    fan_id,
                    max_requests = self.config.max_requests,
                    albums = albums.len(),
                    "Reached request ceiling, results may be incomplete"
                );
                break;
            }
            requests += 1;

            let page = match self.source.fetch_page(kind, fan_id, &token).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(%kind, fan_id, request = requests, error = %e, "Stopping pagination");
                    break;
                }
            };

            let raw_items = page.items.len();
            let next_token = page.next_token().map(str::to_owned);
            let batch: Vec<NewAlbum> = page
                .items
                .into_iter()
                .filter_map(CollectionItem::into_new_album)
                .collect();

            tracing::debug!(
                %kind,
                request = requests,
                raw_items,
                albums = batch.len(),
                "Fetched page"
            );

            if batch.is_empty() {
                empty_pages += 1;
            } else {
                empty_pages = 0;
                albums.extend(batch);
            }

            if empty_pages >= MAX_EMPTY_PAGES {
                tracing::debug!(%kind, "Too many consecutive empty pages");
                break;
            }

            let Some(next_token) = next_token else {
                break;
            };
            if raw_items == 0 {
                break;
            }
            token = next_token;

            if !self.config.page_delay.is_zero() {
                tokio::time::sleep(self.config.page_delay).await;
            }
        }

        tracing::info!(%kind, fan_id, requests, albums = albums.len(), "Finished fetching");
        albums
    }
}
