//! In-memory registry of in-flight generation tasks.
//!
//! Records live only for the duration of a request. Cancellation is
//! cooperative: the orchestrator polls [`TaskRegistry::is_cancelled`]
//! between attempts. Removal is owned by [`TaskGuard`], so a record is
//! released exactly once no matter how the request ends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::WonderlandError;
use crate::orchestrator::GenerateRequest;

#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub created_at: DateTime<Utc>,
    pub cancelled: bool,
    pub request: GenerateRequest,
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, TaskRecord>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TaskRecord>> {
        // Every critical section is a single map operation, so a poisoned
        // lock never leaves the map half-updated.
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new task and return a guard that removes it on drop.
    pub fn register(self: &Arc<Self>, request: GenerateRequest) -> TaskGuard {
        let id = Uuid::new_v4().to_string();
        self.lock().insert(
            id.clone(),
            TaskRecord {
                created_at: Utc::now(),
                cancelled: false,
                request,
            },
        );
        tracing::debug!(task_id = %id, "task registered");
        TaskGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    /// False when the task is unknown (already finished or never existed).
    pub fn is_cancelled(&self, task_id: &str) -> bool {
        self.lock().get(task_id).is_some_and(|r| r.cancelled)
    }

    pub fn cancel(&self, task_id: &str) -> Result<(), WonderlandError> {
        match self.lock().get_mut(task_id) {
            Some(record) => {
                record.cancelled = true;
                tracing::info!(task_id, "task cancellation requested");
                Ok(())
            }
            None => Err(WonderlandError::TaskNotFound(task_id.to_string())),
        }
    }

    /// Idempotent. Returns whether a record was actually removed.
    pub fn remove(&self, task_id: &str) -> bool {
        self.lock().remove(task_id).is_some()
    }

    /// Snapshot of tracked ids, sorted for stable output.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Sole owner of a task record's removal.
#[derive(Debug)]
pub struct TaskGuard {
    registry: Arc<TaskRegistry>,
    id: String,
}

impl TaskGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.registry.is_cancelled(&self.id)
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.registry.remove(&self.id) {
            tracing::debug!(task_id = %self.id, "task released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerateRequest {
        GenerateRequest {
            model_name: None,
            prompt: Some("hello".to_string()),
            base_image_url: Some("https://example.com/a.jpg".to_string()),
        }
    }

    #[test]
    fn register_makes_task_visible() {
        let registry = Arc::new(TaskRegistry::new());
        let guard = registry.register(request());
        assert_eq!(registry.list(), vec![guard.id().to_string()]);
        assert!(!registry.is_cancelled(guard.id()));
        let tasks = registry.lock();
        let record = &tasks[guard.id()];
        assert!(!record.cancelled);
        assert_eq!(record.request.prompt.as_deref(), Some("hello"));
    }

    #[test]
    fn ids_are_unique() {
        let registry = Arc::new(TaskRegistry::new());
        let a = registry.register(request());
        let b = registry.register(request());
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn dropping_guard_removes_record() {
        let registry = Arc::new(TaskRegistry::new());
        let id = {
            let guard = registry.register(request());
            guard.id().to_string()
        };
        assert!(registry.list().is_empty());
        assert!(!registry.remove(&id), "second removal must be a no-op");
    }

    #[test]
    fn cancel_sets_flag() {
        let registry = Arc::new(TaskRegistry::new());
        let guard = registry.register(request());
        registry.cancel(guard.id()).unwrap();
        assert!(guard.is_cancelled());
    }

    #[test]
    fn cancel_unknown_task_is_not_found() {
        let registry = TaskRegistry::new();
        let err = registry.cancel("nope").unwrap_err();
        assert!(matches!(err, WonderlandError::TaskNotFound(id) if id == "nope"));
    }

    #[test]
    fn cancel_after_completion_is_not_found() {
        let registry = Arc::new(TaskRegistry::new());
        let guard = registry.register(request());
        let id = guard.id().to_string();
        drop(guard);
        assert!(registry.cancel(&id).is_err());
        assert!(!registry.is_cancelled(&id));
    }

    #[test]
    fn concurrent_registration_and_cancellation() {
        let registry = Arc::new(TaskRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let guard = registry.register(request());
                    registry.cancel(guard.id()).unwrap();
                    assert!(guard.is_cancelled());
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(registry.list().is_empty());
    }
}
