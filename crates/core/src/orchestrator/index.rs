use std::collections::{HashMap, HashSet};

use super::TaskId;

/// Live (queued or running) tasks per user.
///
/// Used for admission counting and targeted cancellation only; queue order
/// lives in [`ReadyQueue`](super::ReadyQueue).
#[derive(Debug, Default)]
pub struct ActiveDownloadIndex {
    by_user: HashMap<i64, HashSet<TaskId>>,
}

impl ActiveDownloadIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, user_id: i64) -> usize {
        self.by_user.get(&user_id).map_or(0, HashSet::len)
    }

    pub fn insert(&mut self, user_id: i64, task_id: TaskId) -> bool {
        self.by_user.entry(user_id).or_default().insert(task_id)
    }

    /// Remove a task; users left without tasks are dropped from the index.
    pub fn remove(&mut self, user_id: i64, task_id: &TaskId) -> bool {
        let Some(tasks) = self.by_user.get_mut(&user_id) else {
            return false;
        };
        let removed = tasks.remove(task_id);
        if tasks.is_empty() {
            self.by_user.remove(&user_id);
        }
        removed
    }

    pub fn tasks(&self, user_id: i64) -> Vec<TaskId> {
        self.by_user
            .get(&user_id)
            .map(|tasks| tasks.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Users with at least one live task.
    pub fn users(&self) -> usize {
        self.by_user.len()
    }

    pub fn total(&self) -> usize {
        self.by_user.values().map(HashSet::len).sum()
    }
}
