//! One full sync run: fetch both lists, reconcile, record the outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};

use super::reconcile::{ReconcileCounts, Reconciler};
use super::status::{TaskState, TaskStatusStore, TaskUpdate};
use crate::bandcamp::{EndpointKind, PaginatedFetcher};
use crate::library::{AlbumStore, StoreError, SyncConfigStore};

pub const NEW_COLLECTION_ALBUMS: &str = "newCollectionAlbums";
pub const NEW_WISHLIST_ALBUMS: &str = "newWishlistAlbums";
pub const TOTAL_NEW_ALBUMS: &str = "totalNewAlbums";
pub const TOTAL_COLLECTION_ALBUMS: &str = "totalCollectionAlbums";
pub const TOTAL_WISHLIST_ALBUMS: &str = "totalWishlistAlbums";
pub const LAST_REFRESH: &str = "lastRefresh";

/// Everything a sync run touches.
#[derive(Clone)]
pub struct SyncDeps {
    pub fetcher: Arc<PaginatedFetcher>,
    pub albums: Arc<dyn AlbumStore>,
    pub sync_config: Arc<dyn SyncConfigStore>,
    pub statuses: Arc<dyn TaskStatusStore>,
}

/// A single sync attempt for one fan. Runs at most once; failures are
/// reported through the task status, never retried.
#[derive(Clone)]
pub struct SyncTask {
    task_id: String,
    fan_id: String,
    deps: SyncDeps,
}

impl SyncTask {
    pub fn new(task_id: String, fan_id: String, deps: SyncDeps) -> Self {
        Self {
            task_id,
            fan_id,
            deps,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Run the sync under a hard deadline and return the terminal state.
    ///
    /// The work runs in its own tokio task so a panic or the deadline is
    /// turned into a `failed` status. The active marker is released on
    /// every path.
    pub async fn run(self, timeout: Duration) -> TaskState {
        let task_id = self.task_id.clone();
        let statuses = Arc::clone(&self.deps.statuses);

        let worker = self.clone();
        let mut handle = tokio::spawn(async move { worker.execute().await });

        let outcome = match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_err)) if join_err.is_panic() => Err("sync task panicked".to_string()),
            Ok(Err(_)) => Err("sync task was cancelled".to_string()),
            Err(_) => {
                handle.abort();
                Err(format!("timed out after {}s", timeout.as_secs()))
            }
        };

        let state = match outcome {
            Ok(()) => TaskState::Completed,
            Err(message) => {
                tracing::error!(task_id = %task_id, error = %message, "Refresh failed");
                statuses.update(
                    &task_id,
                    TaskUpdate::new(TaskState::Failed, format!("Refresh failed: {message}")),
                );
                TaskState::Failed
            }
        };

        statuses.clear_active(&task_id);
        state
    }

    fn report(&self, message: &str) {
        tracing::info!(task_id = %self.task_id, "{}", message);
        self.deps
            .statuses
            .update(&self.task_id, TaskUpdate::new(TaskState::Running, message));
    }

    async fn execute(&self) {
        let fan_id = self.fan_id.as_str();
        self.report("Starting album refresh...");

        self.report("Fetching collection albums...");
        let collection = self
            .deps
            .fetcher
            .fetch_all(EndpointKind::Collection, fan_id)
            .await;

        self.report("Fetching wishlist albums...");
        let wishlist = self
            .deps
            .fetcher
            .fetch_all(EndpointKind::Wishlist, fan_id)
            .await;

        self.report("Processing albums...");
        let counts = match Reconciler::new(self.deps.albums.as_ref())
            .reconcile(&collection, &wishlist)
            .await
        {
            Ok(counts) => counts,
            Err(e) => {
                tracing::warn!(task_id = %self.task_id, error = %e, "Reconciliation failed, reporting zero new albums");
                ReconcileCounts::default()
            }
        };

        self.report("Updating configuration...");
        let now = Utc::now();
        let (total_collection, total_wishlist) = match self.finalize(now.timestamp()).await {
            Ok(totals) => totals,
            Err(e) => {
                tracing::warn!(task_id = %self.task_id, error = %e, "Library update failed, using fetched batch sizes");
                (collection.len() as u64, wishlist.len() as u64)
            }
        };

        tracing::info!(
            task_id = %self.task_id,
            fan_id,
            new_collection = counts.new_collection,
            new_wishlist = counts.new_wishlist,
            total_collection,
            total_wishlist,
            "Refresh completed"
        );

        self.deps.statuses.update(
            &self.task_id,
            TaskUpdate::new(TaskState::Completed, "Refresh completed successfully")
                .with_data(NEW_COLLECTION_ALBUMS, counts.new_collection)
                .with_data(NEW_WISHLIST_ALBUMS, counts.new_wishlist)
                .with_data(TOTAL_NEW_ALBUMS, counts.total())
                .with_data(TOTAL_COLLECTION_ALBUMS, total_collection)
                .with_data(TOTAL_WISHLIST_ALBUMS, total_wishlist)
                .with_data(
                    LAST_REFRESH,
                    now.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
        );
    }

    /// Record the refresh time and read back the library totals.
    async fn finalize(&self, refreshed_at: i64) -> Result<(u64, u64), StoreError> {
        self.deps.sync_config.set_last_refresh(refreshed_at).await?;
        self.deps.albums.count_by_purchased().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::bandcamp::pagination::tests::{page, ScriptedSource};
    use crate::bandcamp::{BandcampError, PageSource, PaginationConfig};
    use crate::bandcamp::types::CollectionPage;
    use crate::library::{
        AlbumPatch, AlbumRecord, LibraryStats, NewAlbum, SqliteLibrary,
    };
    use crate::sync::status::{MemoryTaskStatusStore, TaskStatus};
    use crate::types::AlbumFilter;

    const TIMEOUT: Duration = Duration::from_secs(600);

    pub(crate) fn deps_with(
        source: Arc<dyn PageSource>,
        albums: Arc<dyn AlbumStore>,
        sync_config: Arc<dyn SyncConfigStore>,
    ) -> (SyncDeps, Arc<MemoryTaskStatusStore>) {
        let statuses = Arc::new(MemoryTaskStatusStore::new(Duration::from_secs(3600)));
        let fetcher = PaginatedFetcher::new(
            source,
            PaginationConfig {
                max_requests: 500,
                page_delay: Duration::ZERO,
            },
        );
        let deps = SyncDeps {
            fetcher: Arc::new(fetcher),
            albums,
            sync_config,
            statuses: statuses.clone(),
        };
        (deps, statuses)
    }

    fn start(deps: &SyncDeps, statuses: &MemoryTaskStatusStore, task_id: &str) -> SyncTask {
        statuses.create(TaskStatus::pending(task_id, "42"));
        statuses.try_set_active(task_id).unwrap();
        SyncTask::new(task_id.to_string(), "42".to_string(), deps.clone())
    }

    /// Wraps a real library and fails selected operations.
    struct FlakyLibrary {
        inner: SqliteLibrary,
        fail_insert: bool,
        fail_count: bool,
        fail_set_last_refresh: bool,
    }

    impl FlakyLibrary {
        fn new() -> Self {
            Self {
                inner: SqliteLibrary::open_in_memory().unwrap(),
                fail_insert: false,
                fail_count: false,
                fail_set_last_refresh: false,
            }
        }
    }

    #[async_trait]
    impl AlbumStore for FlakyLibrary {
        async fn find_by_bandcamp_id(
            &self,
            bandcamp_id: &str,
        ) -> Result<Option<AlbumRecord>, StoreError> {
            self.inner.find_by_bandcamp_id(bandcamp_id).await
        }

        async fn insert(
            &self,
            album: &NewAlbum,
            purchased: bool,
        ) -> Result<AlbumRecord, StoreError> {
            if self.fail_insert {
                return Err(StoreError::Query("disk I/O error".into()));
            }
            self.inner.insert(album, purchased).await
        }

        async fn update(&self, id: i64, patch: &AlbumPatch) -> Result<AlbumRecord, StoreError> {
            self.inner.update(id, patch).await
        }

        async fn count_by_purchased(&self) -> Result<(u64, u64), StoreError> {
            if self.fail_count {
                return Err(StoreError::Query("database is locked".into()));
            }
            self.inner.count_by_purchased().await
        }

        async fn list(
            &self,
            filter: AlbumFilter,
            search: Option<&str>,
        ) -> Result<Vec<AlbumRecord>, StoreError> {
            self.inner.list(filter, search).await
        }

        async fn stats(&self) -> Result<LibraryStats, StoreError> {
            self.inner.stats().await
        }
    }

    #[async_trait]
    impl SyncConfigStore for FlakyLibrary {
        async fn last_refresh(&self) -> Result<i64, StoreError> {
            self.inner.last_refresh().await
        }

        async fn set_last_refresh(&self, timestamp: i64) -> Result<(), StoreError> {
            if self.fail_set_last_refresh {
                return Err(StoreError::Query("attempt to write a readonly database".into()));
            }
            self.inner.set_last_refresh(timestamp).await
        }
    }

    struct PanickingSource;

    #[async_trait]
    impl PageSource for PanickingSource {
        async fn fetch_page(
            &self,
            _kind: EndpointKind,
            _fan_id: &str,
            _older_than_token: &str,
        ) -> Result<CollectionPage, BandcampError> {
            panic!("unexpected upstream shape");
        }
    }

    /// Never answers.
    pub(crate) struct StalledSource {
        pub(crate) called: AtomicBool,
    }

    #[async_trait]
    impl PageSource for StalledSource {
        async fn fetch_page(
            &self,
            _kind: EndpointKind,
            _fan_id: &str,
            _older_than_token: &str,
        ) -> Result<CollectionPage, BandcampError> {
            self.called.store(true, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    fn scripted() -> Arc<ScriptedSource> {
        Arc::new(
            ScriptedSource::default()
                .with_pages(EndpointKind::Collection, vec![page(&[1, 2], None)])
                .with_pages(EndpointKind::Wishlist, vec![page(&[3], None)]),
        )
    }

    #[tokio::test]
    async fn test_successful_run_reports_counts() {
        let library = Arc::new(SqliteLibrary::open_in_memory().unwrap());
        let (deps, statuses) = deps_with(scripted(), library.clone(), library.clone());
        let task = start(&deps, &statuses, "t1");

        let before = Utc::now().timestamp();
        let state = task.run(TIMEOUT).await;
        assert_eq!(state, TaskState::Completed);

        let status = statuses.get("t1").unwrap();
        assert_eq!(status.status, TaskState::Completed);
        assert_eq!(status.message, "Refresh completed successfully");
        assert_eq!(status.data[NEW_COLLECTION_ALBUMS], 2);
        assert_eq!(status.data[NEW_WISHLIST_ALBUMS], 1);
        assert_eq!(status.data[TOTAL_NEW_ALBUMS], 3);
        assert_eq!(status.data[TOTAL_COLLECTION_ALBUMS], 2);
        assert_eq!(status.data[TOTAL_WISHLIST_ALBUMS], 1);
        assert!(status.data[LAST_REFRESH].is_string());

        assert!(statuses.get_active().is_none());
        assert!(library.last_refresh().await.unwrap() >= before);
    }

    #[tokio::test]
    async fn test_second_run_reports_no_new_albums() {
        let library = Arc::new(SqliteLibrary::open_in_memory().unwrap());
        let (deps, statuses) = deps_with(scripted(), library.clone(), library.clone());
        start(&deps, &statuses, "t1").run(TIMEOUT).await;

        let (deps, statuses) = deps_with(scripted(), library.clone(), library.clone());
        start(&deps, &statuses, "t2").run(TIMEOUT).await;

        let status = statuses.get("t2").unwrap();
        assert_eq!(status.data[TOTAL_NEW_ALBUMS], 0);
        assert_eq!(status.data[TOTAL_COLLECTION_ALBUMS], 2);
    }

    #[tokio::test]
    async fn test_reconcile_failure_still_completes_with_zero_counts() {
        let library = Arc::new(FlakyLibrary {
            fail_insert: true,
            ..FlakyLibrary::new()
        });
        let (deps, statuses) = deps_with(scripted(), library.clone(), library.clone());

        let state = start(&deps, &statuses, "t1").run(TIMEOUT).await;
        assert_eq!(state, TaskState::Completed);

        let status = statuses.get("t1").unwrap();
        assert_eq!(status.data[TOTAL_NEW_ALBUMS], 0);
        assert_eq!(status.data[TOTAL_COLLECTION_ALBUMS], 0);
        assert!(library.last_refresh().await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_count_failure_falls_back_to_batch_sizes() {
        let library = Arc::new(FlakyLibrary {
            fail_count: true,
            ..FlakyLibrary::new()
        });
        let (deps, statuses) = deps_with(scripted(), library.clone(), library.clone());

        start(&deps, &statuses, "t1").run(TIMEOUT).await;

        let status = statuses.get("t1").unwrap();
        assert_eq!(status.status, TaskState::Completed);
        assert_eq!(status.data[TOTAL_COLLECTION_ALBUMS], 2);
        assert_eq!(status.data[TOTAL_WISHLIST_ALBUMS], 1);
    }

    #[tokio::test]
    async fn test_last_refresh_failure_still_completes() {
        let library = Arc::new(FlakyLibrary {
            fail_set_last_refresh: true,
            ..FlakyLibrary::new()
        });
        let (deps, statuses) = deps_with(scripted(), library.clone(), library.clone());

        let state = start(&deps, &statuses, "t1").run(TIMEOUT).await;
        assert_eq!(state, TaskState::Completed);

        let status = statuses.get("t1").unwrap();
        assert_eq!(status.status, TaskState::Completed);
        assert_eq!(status.message, "Refresh completed successfully");
        assert_eq!(status.data[TOTAL_NEW_ALBUMS], 3);
        assert_eq!(status.data[TOTAL_COLLECTION_ALBUMS], 2);
        assert_eq!(status.data[TOTAL_WISHLIST_ALBUMS], 1);
        assert!(statuses.get_active().is_none());
        assert_eq!(library.last_refresh().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_panic_fails_task_and_releases_marker() {
        let library = Arc::new(SqliteLibrary::open_in_memory().unwrap());
        let (deps, statuses) =
            deps_with(Arc::new(PanickingSource), library.clone(), library.clone());

        let state = start(&deps, &statuses, "t1").run(TIMEOUT).await;
        assert_eq!(state, TaskState::Failed);
        assert_eq!(
            statuses.get("t1").unwrap().message,
            "Refresh failed: sync task panicked"
        );
        assert!(statuses.get_active().is_none());
        assert_eq!(library.last_refresh().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_task() {
        let library = Arc::new(SqliteLibrary::open_in_memory().unwrap());
        let source = Arc::new(StalledSource {
            called: AtomicBool::new(false),
        });
        let (deps, statuses) = deps_with(source.clone(), library.clone(), library.clone());

        let state = start(&deps, &statuses, "t1")
            .run(Duration::from_secs(600))
            .await;
        assert_eq!(state, TaskState::Failed);
        assert!(source.called.load(Ordering::SeqCst));

        let status = statuses.get("t1").unwrap();
        assert_eq!(status.message, "Refresh failed: timed out after 600s");
        assert!(statuses.get_active().is_none());
    }

    #[tokio::test]
    async fn test_status_pending_until_run_then_keeps_fan_id() {
        let library = Arc::new(SqliteLibrary::open_in_memory().unwrap());
        let (deps, statuses) = deps_with(scripted(), library.clone(), library.clone());
        let task = start(&deps, &statuses, "t1");
        assert_eq!(task.task_id(), "t1");

        // status starts pending until the task runs
        assert_eq!(statuses.get("t1").unwrap().status, TaskState::Pending);
        task.run(TIMEOUT).await;
        let status = statuses.get("t1").unwrap();
        assert_eq!(status.fan_id, "42");
        assert!(status.updated_at >= status.created_at);
    }
}
