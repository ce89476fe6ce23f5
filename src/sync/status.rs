//! Task status records and the expiring store that holds them.
//!
//! Clients poll this store while a sync runs. Entries and the "active task"
//! marker share one time-to-live; expired entries are invisible and dropped
//! lazily on access.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_active(&self) -> bool {
        matches!(self, TaskState::Pending | TaskState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress record for one sync task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub id: String,
    pub status: TaskState,
    pub message: String,
    pub fan_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Result fields; updates merge into this map.
    pub data: Map<String, Value>,
}

impl TaskStatus {
    pub fn pending(id: impl Into<String>, fan_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: TaskState::Pending,
            message: "Task created, waiting to start...".to_string(),
            fan_id: fan_id.into(),
            created_at: now,
            updated_at: now,
            data: Map::new(),
        }
    }
}

/// A change to apply to a stored [`TaskStatus`].
#[derive(Debug, Clone)]
pub struct TaskUpdate {
    pub status: TaskState,
    pub message: String,
    pub data: Map<String, Value>,
}

impl TaskUpdate {
    pub fn new(status: TaskState, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: Map::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

/// Shared store for task statuses and the single active-task marker.
pub trait TaskStatusStore: Send + Sync {
    fn create(&self, status: TaskStatus);

    fn get(&self, task_id: &str) -> Option<TaskStatus>;

    /// Apply `update`, merging its data into the existing map and refreshing
    /// the expiry. Returns the new record, or `None` if the task is unknown
    /// or expired.
    fn update(&self, task_id: &str, update: TaskUpdate) -> Option<TaskStatus>;

    /// Unconditionally mark `task_id` as the active task.
    fn set_active(&self, task_id: &str);

    /// Mark `task_id` active only if no other task holds the marker.
    /// On conflict returns the id of the task already active.
    fn try_set_active(&self, task_id: &str) -> Result<(), String>;

    fn get_active(&self) -> Option<String>;

    /// Clear the marker if it still belongs to `task_id`. Returns whether
    /// anything was cleared.
    fn clear_active(&self, task_id: &str) -> bool;
}

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process [`TaskStatusStore`].
#[derive(Debug)]
pub struct MemoryTaskStatusStore {
    ttl: Duration,
    tasks: DashMap<String, Expiring<TaskStatus>>,
    active: Mutex<Option<Expiring<String>>>,
}

impl MemoryTaskStatusStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tasks: DashMap::new(),
            active: Mutex::new(None),
        }
    }

    fn active_slot(&self) -> std::sync::MutexGuard<'_, Option<Expiring<String>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TaskStatusStore for MemoryTaskStatusStore {
    fn create(&self, status: TaskStatus) {
        self.tasks.retain(|_, entry| !entry.is_expired());
        self.tasks
            .insert(status.id.clone(), Expiring::new(status, self.ttl));
    }

    fn get(&self, task_id: &str) -> Option<TaskStatus> {
        self.tasks.remove_if(task_id, |_, entry| entry.is_expired());
        self.tasks.get(task_id).map(|entry| entry.value.clone())
    }

    fn update(&self, task_id: &str, update: TaskUpdate) -> Option<TaskStatus> {
        self.tasks.remove_if(task_id, |_, entry| entry.is_expired());
        let mut entry = self.tasks.get_mut(task_id)?;
        let status = &mut entry.value;
        status.status = update.status;
        status.message = update.message;
        status.data.extend(update.data);
        status.updated_at = Utc::now();
        let snapshot = status.clone();
        entry.expires_at = Instant::now() + self.ttl;
        Some(snapshot)
    }

    fn set_active(&self, task_id: &str) {
        *self.active_slot() = Some(Expiring::new(task_id.to_string(), self.ttl));
    }

    fn try_set_active(&self, task_id: &str) -> Result<(), String> {
        let mut slot = self.active_slot();
        if let Some(current) = slot.as_ref().filter(|m| !m.is_expired()) {
            return Err(current.value.clone());
        }
        *slot = Some(Expiring::new(task_id.to_string(), self.ttl));
        Ok(())
    }

    fn get_active(&self) -> Option<String> {
        let mut slot = self.active_slot();
        if slot.as_ref().is_some_and(Expiring::is_expired) {
            *slot = None;
        }
        slot.as_ref().map(|m| m.value.clone())
    }

    fn clear_active(&self, task_id: &str) -> bool {
        let mut slot = self.active_slot();
        if slot.as_ref().is_some_and(|m| m.value == task_id) {
            *slot = None;
            true
        } else {
            false
        }
    }
}
