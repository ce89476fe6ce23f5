//! Bandcamp access: HTTP client, page scraping and collection pagination.

pub mod client;
pub mod error;
pub mod pagination;
pub mod scrape;
pub mod types;

pub use client::{BandcampClient, ClientConfig};
pub use error::BandcampError;
pub use pagination::{PageSource, PaginatedFetcher, PaginationConfig};
pub use types::{EndpointKind, Track};
