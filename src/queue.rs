//! Bounded thread-safe queue decoupling producers from a single consumer.
//!
//! Ownership of items transfers through the queue: the heartbeat ticker
//! hands statuses to the sender, and the broadcast pump hands packets to
//! the cache drainer. `pop_timeout` carries the wait-until-and-pop
//! semantics the poll loops rely on to notice a lowered `keep_running`
//! flag.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

#[derive(Debug)]
pub struct BoundedQueue<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    capacity: usize,
}

impl<T: Send> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics when `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
        }
    }

    /// Pushes `value`, waiting for space when the queue is full.
    ///
    /// Returns `false` when the consuming side is gone.
    pub async fn push(&self, value: T) -> bool {
        self.tx.send(value).await.is_ok()
    }

    /// Pushes `value` without waiting; `false` when full or closed.
    pub fn try_push(&self, value: T) -> bool {
        self.tx.try_send(value).is_ok()
    }

    /// Pops the front item, waiting at most `wait`.
    pub async fn pop_timeout(&self, wait: Duration) -> Option<T> {
        let mut rx = self.rx.lock().await;
        timeout(wait, rx.recv()).await.ok().flatten()
    }

    /// Pops the front item without waiting.
    pub async fn try_pop(&self) -> Option<T> {
        self.rx.lock().await.try_recv().ok()
    }

    /// Approximate number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_then_pop_preserves_order() {
        let queue = BoundedQueue::new(4);
        assert!(queue.push(1).await);
        assert!(queue.push(2).await);
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)).await, Some(1));
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)).await, Some(2));
    }

    #[tokio::test]
    async fn pop_times_out_on_empty_queue() {
        let queue: BoundedQueue<u8> = BoundedQueue::new(1);
        assert_eq!(queue.pop_timeout(Duration::from_millis(5)).await, None);
    }

    #[tokio::test]
    async fn try_push_reports_a_full_queue() {
        let queue = BoundedQueue::new(1);
        assert!(queue.try_push(1));
        assert!(!queue.try_push(2));
        assert_eq!(queue.try_pop().await, Some(1));
        assert_eq!(queue.try_pop().await, None);
    }
}
