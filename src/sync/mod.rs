//! Background album sync.
//!
//! [`SyncService`] is the entry point: it enforces one sync at a time,
//! records a pending [`TaskStatus`] and spawns a [`SyncTask`] on the tokio
//! runtime. Callers poll progress through the status store.

pub mod error;
pub mod reconcile;
pub mod status;
pub mod task;

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::library::StoreError;

pub use error::SyncError;
pub use status::{MemoryTaskStatusStore, TaskState, TaskStatus, TaskStatusStore};
pub use task::{SyncDeps, SyncTask};

#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// Hard deadline for a whole sync run.
    pub task_timeout: Duration,
    /// Lifetime of task statuses and the active marker.
    pub status_ttl: Duration,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(600),
            status_ttl: Duration::from_secs(3600),
        }
    }
}

/// A sync that has been accepted and spawned.
#[derive(Debug)]
pub struct TaskHandle {
    pub task_id: String,
    /// The status as first recorded (`pending`).
    pub status: TaskStatus,
    /// Resolves to the terminal state once the run finishes.
    pub join: JoinHandle<TaskState>,
}

pub struct SyncService {
    deps: SyncDeps,
    config: TaskConfig,
}

impl SyncService {
    pub fn new(deps: SyncDeps, config: TaskConfig) -> Self {
        Self { deps, config }
    }

    /// Start a sync for `fan_id` unless one is already running.
    pub fn request_sync(&self, fan_id: &str) -> Result<TaskHandle, SyncError> {
        let fan_id = fan_id.trim();
        if fan_id.is_empty() {
            return Err(SyncError::InvalidFanId);
        }

        let task_id = uuid::Uuid::new_v4().to_string();
        if let Err(active_task_id) = self.deps.statuses.try_set_active(&task_id) {
            tracing::info!(fan_id, active_task_id = %active_task_id, "Refresh already in progress");
            return Err(SyncError::AlreadyRunning { active_task_id });
        }

        let status = TaskStatus::pending(task_id.clone(), fan_id);
        self.deps.statuses.create(status.clone());

        let task = SyncTask::new(task_id.clone(), fan_id.to_string(), self.deps.clone());
        let join = tokio::spawn(task.run(self.config.task_timeout));

        tracing::info!(task_id = %task_id, fan_id, "Refresh task queued");
        Ok(TaskHandle {
            task_id,
            status,
            join,
        })
    }

    pub fn task(&self, task_id: &str) -> Option<TaskStatus> {
        self.deps.statuses.get(task_id)
    }

    pub fn active_task_id(&self) -> Option<String> {
        self.deps.statuses.get_active()
    }

    /// The status of the running task, if any.
    pub fn active_task(&self) -> Option<TaskStatus> {
        let task_id = self.active_task_id()?;
        self.deps.statuses.get(&task_id)
    }

    /// Epoch seconds of the last successful sync, 0 if never synced.
    pub async fn last_refresh(&self) -> Result<i64, StoreError> {
        self.deps.sync_config.last_refresh().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::bandcamp::pagination::tests::{page, ScriptedSource};
    use crate::bandcamp::types::CollectionPage;
    use crate::bandcamp::{BandcampError, EndpointKind, PageSource};
    use crate::library::{AlbumStore, SqliteLibrary};
    use crate::sync::task::tests::{deps_with, StalledSource};

    /// Holds every request until opened, then serves empty last pages.
    pub(crate) struct GatedSource {
        gate: Semaphore,
    }

    impl GatedSource {
        pub(crate) fn new() -> Self {
            Self {
                gate: Semaphore::new(0),
            }
        }

        pub(crate) fn open(&self) {
            self.gate.add_permits(64);
        }
    }

    #[async_trait]
    impl PageSource for GatedSource {
        async fn fetch_page(
            &self,
            _kind: EndpointKind,
            _fan_id: &str,
            _older_than_token: &str,
        ) -> Result<CollectionPage, BandcampError> {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            Ok(CollectionPage {
                items: Vec::new(),
                last_token: None,
            })
        }
    }

    pub(crate) fn service_with(source: Arc<dyn PageSource>) -> (SyncService, Arc<SqliteLibrary>) {
        let library = Arc::new(SqliteLibrary::open_in_memory().unwrap());
        let (deps, _) = deps_with(source, library.clone(), library.clone());
        (SyncService::new(deps, TaskConfig::default()), library)
    }

    #[tokio::test]
    async fn test_request_sync_runs_to_completion() {
        let source = Arc::new(
            ScriptedSource::default()
                .with_pages(EndpointKind::Collection, vec![page(&[1, 2], None)])
                .with_pages(EndpointKind::Wishlist, vec![page(&[3], None)]),
        );
        let (service, library) = service_with(source);

        let handle = service.request_sync("42").unwrap();
        assert_eq!(handle.status.status, TaskState::Pending);
        assert_eq!(handle.status.message, "Task created, waiting to start...");
        assert_eq!(handle.status.fan_id, "42");

        let state = handle.join.await.unwrap();
        assert_eq!(state, TaskState::Completed);

        let status = service.task(&handle.task_id).unwrap();
        assert_eq!(status.data["totalNewAlbums"], 3);
        assert!(service.active_task().is_none());
        assert!(service.last_refresh().await.unwrap() > 0);
        assert_eq!(library.count_by_purchased().await.unwrap(), (2, 1));
    }

    #[tokio::test]
    async fn test_concurrent_request_rejected() {
        let source = Arc::new(GatedSource::new());
        let (service, _) = service_with(source.clone());

        let first = service.request_sync("42").unwrap();
        let err = service.request_sync("42").unwrap_err();
        match err {
            SyncError::AlreadyRunning { active_task_id } => {
                assert_eq!(active_task_id, first.task_id)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            service.active_task().map(|s| s.id),
            Some(first.task_id.clone())
        );

        source.open();
        assert_eq!(first.join.await.unwrap(), TaskState::Completed);

        assert!(service.active_task().is_none());
        assert!(service.request_sync("42").is_ok());
    }

    #[tokio::test]
    async fn test_status_shows_running_step_while_fetching() {
        let source = Arc::new(GatedSource::new());
        let (service, _) = service_with(source.clone());

        let handle = service.request_sync("42").unwrap();
        let mut status = service.task(&handle.task_id).unwrap();
        for _ in 0..100 {
            if status.message == "Fetching collection albums..." {
                break;
            }
            tokio::task::yield_now().await;
            status = service.task(&handle.task_id).unwrap();
        }
        assert_eq!(status.status, TaskState::Running);
        assert_eq!(status.message, "Fetching collection albums...");
        assert_eq!(
            service.active_task().map(|s| s.status),
            Some(TaskState::Running)
        );

        source.open();
        assert_eq!(handle.join.await.unwrap(), TaskState::Completed);
        let status = service.task(&handle.task_id).unwrap();
        assert_eq!(status.status, TaskState::Completed);
        assert_eq!(status.message, "Refresh completed successfully");
    }

    #[tokio::test]
    async fn test_blank_fan_id_rejected() {
        let (service, _) = service_with(Arc::new(ScriptedSource::default()));
        assert!(matches!(
            service.request_sync("  "),
            Err(SyncError::InvalidFanId)
        ));
        assert!(service.active_task().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_task_releases_slot() {
        let source = Arc::new(StalledSource {
            called: AtomicBool::new(false),
        });
        let library = Arc::new(SqliteLibrary::open_in_memory().unwrap());
        let (deps, _) = deps_with(source, library.clone(), library);
        let service = SyncService::new(
            deps,
            TaskConfig {
                task_timeout: Duration::from_secs(5),
                ..TaskConfig::default()
            },
        );

        let handle = service.request_sync("42").unwrap();
        assert_eq!(handle.join.await.unwrap(), TaskState::Failed);
        assert_eq!(
            service.task(&handle.task_id).unwrap().status,
            TaskState::Failed
        );
        assert!(service.request_sync("42").is_ok());
    }
}
