//! Fair-share ready queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::TaskId;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    priority: usize,
    seq: u64,
    task_id: TaskId,
}

// `BinaryHeap` is a max-heap; invert so the lowest (priority, seq) pops first.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Tasks waiting for a global slot.
///
/// Lower priority values pop first; equal priorities pop in push order.
/// The priority of a task is the number of live tasks its user already had
/// when it was submitted, so every user's first task outranks anyone's second.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task_id: TaskId, priority: usize) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            priority,
            seq,
            task_id,
        });
    }

    pub fn pop(&mut self) -> Option<TaskId> {
        self.heap.pop().map(|entry| entry.task_id)
    }

    /// Remove a task that will no longer run.
    pub fn remove(&mut self, task_id: &TaskId) -> bool {
        let before = self.heap.len();
        self.heap.retain(|entry| entry.task_id != *task_id);
        self.heap.len() != before
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.heap.iter().any(|entry| entry.task_id == *task_id)
    }

    /// Take every waiting task, in pop order.
    pub fn drain(&mut self) -> Vec<TaskId> {
        let mut entries = std::mem::take(&mut self.heap).into_sorted_vec();
        // ascending by `Ord` means last-to-pop first
        entries.reverse();
        entries.into_iter().map(|entry| entry.task_id).collect()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_within_same_priority() {
        let mut queue = ReadyQueue::new();
        let ids: Vec<_> = (0..3).map(|_| TaskId::new()).collect();
        for id in &ids {
            queue.push(*id, 0);
        }
        assert_eq!(queue.pop(), Some(ids[0]));
        assert_eq!(queue.pop(), Some(ids[1]));
        assert_eq!(queue.pop(), Some(ids[2]));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_lower_priority_value_first() {
        let mut queue = ReadyQueue::new();
        let a_second = TaskId::new();
        let b_first = TaskId::new();
        let a_third = TaskId::new();
        let c_first = TaskId::new();

        queue.push(a_second, 1);
        queue.push(a_third, 2);
        queue.push(b_first, 0);
        queue.push(c_first, 0);

        assert_eq!(queue.pop(), Some(b_first));
        assert_eq!(queue.pop(), Some(c_first));
        assert_eq!(queue.pop(), Some(a_second));
        assert_eq!(queue.pop(), Some(a_third));
    }

    #[test]
    fn test_remove() {
        let mut queue = ReadyQueue::new();
        let a = TaskId::new();
        let b = TaskId::new();
        queue.push(a, 0);
        queue.push(b, 0);

        assert!(queue.remove(&a));
        assert!(!queue.remove(&a));
        assert!(!queue.contains(&a));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop(), Some(b));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_in_pop_order() {
        let mut queue = ReadyQueue::new();
        let a = TaskId::new();
        let b = TaskId::new();
        let c = TaskId::new();
        queue.push(a, 1);
        queue.push(b, 0);
        queue.push(c, 1);

        assert_eq!(queue.drain(), vec![b, a, c]);
        assert!(queue.is_empty());
    }
}
