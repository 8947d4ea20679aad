//! 共享工作队列
//!
//! 所有槽位并发取任务，取出是原子的；同时记录还有多少 WorkItem 没有终态

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::models::{Task, WorkItem};

#[derive(Default)]
struct QueueState {
    items: VecDeque<WorkItem>,
    /// 已入队但还没有终态 Task 的 WorkItem 数量（含在途）
    outstanding: usize,
    finished: Vec<Task>,
}

/// FIFO 队列，空时 `pop_next` 立即返回 None，由调用方退避
#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(items: impl IntoIterator<Item = WorkItem>) -> Self {
        let queue = Self::new();
        for item in items {
            queue.push(item);
        }
        queue
    }

    /// 加入一个新的 WorkItem
    pub fn push(&self, item: WorkItem) {
        let mut state = self.lock();
        state.outstanding += 1;
        state.items.push_back(item);
    }

    /// 失败后重新入队，排到末尾
    pub fn requeue(&self, item: WorkItem) {
        self.lock().items.push_back(item);
    }

    /// 归还一个还没开始处理的 WorkItem，保持原来的位置
    pub fn push_front(&self, item: WorkItem) {
        self.lock().items.push_front(item);
    }

    pub fn pop_next(&self) -> Option<WorkItem> {
        self.lock().items.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// 记录一个终态 Task
    pub fn finalize(&self, task: Task) {
        let mut state = self.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        state.finished.push(task);
    }

    /// 队列为空且没有在途的 WorkItem
    pub fn is_drained(&self) -> bool {
        self.lock().outstanding == 0
    }

    /// 取出所有还没被处理的 WorkItem
    pub fn drain_remaining(&self) -> Vec<WorkItem> {
        self.lock().items.drain(..).collect()
    }

    pub fn take_finished(&self) -> Vec<Task> {
        std::mem::take(&mut self.lock().finished)
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorReason;
    use crate::models::Payload;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn items(n: usize) -> Vec<WorkItem> {
        (0..n)
            .map(|i| WorkItem::new(i, Payload::new(format!("p{}", i)), "t"))
            .collect()
    }

    #[test]
    fn test_fifo_with_requeue_at_tail() {
        let queue = WorkQueue::seeded(items(3));
        let first = queue.pop_next().unwrap();
        assert_eq!(first.sequence_index, 0);

        queue.requeue(first);
        let order: Vec<usize> = std::iter::from_fn(|| queue.pop_next())
            .map(|i| i.sequence_index)
            .collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert!(queue.pop_next().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_front_keeps_position() {
        let queue = WorkQueue::seeded(items(2));
        let first = queue.pop_next().unwrap();
        queue.push_front(first);
        assert_eq!(queue.pop_next().unwrap().sequence_index, 0);
    }

    #[test]
    fn test_drained_only_after_every_item_is_final() {
        let queue = WorkQueue::seeded(items(2));
        let a = queue.pop_next().unwrap();
        let b = queue.pop_next().unwrap();
        assert!(queue.is_empty());
        assert!(!queue.is_drained());

        queue.finalize(Task::unattempted(&a, ErrorReason::Cancelled));
        assert!(!queue.is_drained());
        queue.finalize(Task::unattempted(&b, ErrorReason::Cancelled));
        assert!(queue.is_drained());
        assert_eq!(queue.take_finished().len(), 2);
    }

    #[test]
    fn test_concurrent_pop_never_duplicates() {
        let queue = Arc::new(WorkQueue::seeded(items(1000)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(item) = queue.pop_next() {
                        seen.push(item.sequence_index);
                    }
                    seen
                })
            })
            .collect();

        let mut all = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for index in handle.join().unwrap() {
                total += 1;
                all.insert(index);
            }
        }
        assert_eq!(total, 1000);
        assert_eq!(all.len(), 1000);
    }
}
