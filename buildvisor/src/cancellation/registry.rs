//! Registry of the live tasks of the running stage.

use crate::core::TaskId;
use crate::process::ChildTask;
use std::collections::BTreeMap;

/// What the registry remembers about a live task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveTask {
    /// The task label.
    pub label: String,
    /// The OS process id.
    pub pid: Option<u32>,
}

/// Tracks which spawned tasks are still live.
///
/// Owned by the supervisor and only touched from its control flow, so it
/// needs no lock. Tasks are registered when spawned and removed as they reach
/// a terminal status; the registry is empty between stages.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    next_id: u64,
    live: BTreeMap<TaskId, LiveTask>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next task id. Ids are never reused.
    pub fn allocate_id(&mut self) -> TaskId {
        self.next_id += 1;
        TaskId::new(self.next_id)
    }

    /// Records a task as live. Registering twice is harmless.
    pub fn register(&mut self, task: &ChildTask) {
        self.live.insert(
            task.id(),
            LiveTask {
                label: task.label().to_string(),
                pid: task.pid(),
            },
        );
    }

    /// Removes a task, returning what was recorded for it.
    pub fn deregister(&mut self, id: TaskId) -> Option<LiveTask> {
        self.live.remove(&id)
    }

    /// Returns whether the task is still registered.
    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool {
        self.live.contains_key(&id)
    }

    /// Returns the live task ids in spawn order.
    #[must_use]
    pub fn live_ids(&self) -> Vec<TaskId> {
        self.live.keys().copied().collect()
    }

    /// Looks up a live task.
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&LiveTask> {
        self.live.get(&id)
    }

    /// Returns the number of live tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns true if no task is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Forgets every live task.
    pub fn clear(&mut self) {
        self.live.clear();
    }
}
