//! Pending-write queue
//!
//! Ordered buffer of records written since the last drain.
//! A drain removes exactly the items it returns, so the returned batch and
//! the remaining queue are always disjoint.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct PendingQueue<T> {
    items: VecDeque<T>,
}

impl<T> PendingQueue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    #[inline]
    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Remove and return up to `limit` items (all when `None`) from the front
    pub fn take(&mut self, limit: Option<usize>) -> Vec<T> {
        let n = limit.map_or(self.items.len(), |l| l.min(self.items.len()));
        self.items.drain(..n).collect()
    }

    /// Put items back at the front, preserving their order
    ///
    /// Used when a drained batch could not be delivered downstream.
    pub fn requeue_front(&mut self, items: Vec<T>) {
        for item in items.into_iter().rev() {
            self.items.push_front(item);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_all_then_empty() {
        let mut q = PendingQueue::new();
        q.push(1);
        q.push(2);
        assert_eq!(q.take(None), vec![1, 2]);
        assert!(q.take(None).is_empty());
    }

    #[test]
    fn test_take_with_limit_is_disjoint() {
        let mut q = PendingQueue::new();
        for i in 0..5 {
            q.push(i);
        }
        let first = q.take(Some(2));
        let rest = q.take(None);
        assert_eq!(first, vec![0, 1]);
        assert_eq!(rest, vec![2, 3, 4]);
    }

    #[test]
    fn test_limit_larger_than_queue() {
        let mut q = PendingQueue::new();
        q.push("a");
        assert_eq!(q.take(Some(10)), vec!["a"]);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_requeue_goes_to_front_in_order() {
        let mut q = PendingQueue::new();
        q.push(3);
        q.requeue_front(vec![1, 2]);
        assert_eq!(q.take(None), vec![1, 2, 3]);
    }
}
