//! Merge fetched collection and wishlist batches into the library.
//!
//! Purchased wins: an album seen in the collection ends up purchased no
//! matter which list it appeared in first, and sync never turns a purchased
//! album back into a wishlist entry.

use std::collections::HashSet;

use crate::library::{AlbumPatch, AlbumStore, NewAlbum, StoreError};

/// Albums newly added to the library by one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileCounts {
    pub new_collection: u64,
    pub new_wishlist: u64,
}

impl ReconcileCounts {
    pub fn total(&self) -> u64 {
        self.new_collection + self.new_wishlist
    }
}

pub struct Reconciler<'a> {
    store: &'a dyn AlbumStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn AlbumStore) -> Self {
        Self { store }
    }

    pub async fn reconcile(
        &self,
        collection: &[NewAlbum],
        wishlist: &[NewAlbum],
    ) -> Result<ReconcileCounts, StoreError> {
        let mut counts = ReconcileCounts::default();
        let collection_ids: HashSet<&str> =
            collection.iter().map(|a| a.bandcamp_id.as_str()).collect();

        for album in collection {
            match self.store.find_by_bandcamp_id(&album.bandcamp_id).await? {
                None => {
                    self.store.insert(album, true).await?;
                    counts.new_collection += 1;
                }
                Some(existing) if !existing.purchased => {
                    tracing::debug!(
                        bandcamp_id = %album.bandcamp_id,
                        "Promoting wishlist album to purchased"
                    );
                    self.store
                        .update(existing.id, &AlbumPatch::mark_purchased())
                        .await?;
                }
                Some(_) => {}
            }
        }

        for album in wishlist {
            if collection_ids.contains(album.bandcamp_id.as_str()) {
                continue;
            }
            if self
                .store
                .find_by_bandcamp_id(&album.bandcamp_id)
                .await?
                .is_none()
            {
                self.store.insert(album, false).await?;
                counts.new_wishlist += 1;
            }
        }

        tracing::debug!(
            new_collection = counts.new_collection,
            new_wishlist = counts.new_wishlist,
            "Reconciled fetched albums"
        );
        Ok(counts)
    }
}
