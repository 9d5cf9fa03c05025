//! FIFO queue with a resettable cancellation scope
//!
//! Both pipeline stages share the same shape: producers append without
//! blocking, one consumer loop takes items in order, and "cancel the stage"
//! means emptying the queue and cancelling whatever the consumer is doing
//! without closing the stage. Items and the scope token live under one lock
//! so a dequeued item is always paired with the scope it was dequeued in.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

struct Inner<T> {
    items: VecDeque<T>,
    scope: CancellationToken,
}

/// Single-consumer FIFO with a cancellation scope
pub struct ScopedQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    shutdown: CancellationToken,
    busy: AtomicBool,
    /// Maximum queued items; 0 is unbounded
    capacity: usize,
}

/// Why an item was not queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    Full,
    ShutDown,
}

impl<T> ScopedQueue<T> {
    /// Scopes are children of `shutdown`, so shutting down cancels in-flight work too
    pub fn new(shutdown: CancellationToken, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                scope: shutdown.child_token(),
            }),
            notify: Notify::new(),
            shutdown,
            busy: AtomicBool::new(false),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // Critical sections never panic; recover the data if one somehow did
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an item; returns the queue depth after the push
    pub fn push(&self, item: T) -> Result<usize, (T, PushError)> {
        if self.shutdown.is_cancelled() {
            return Err((item, PushError::ShutDown));
        }

        let depth = {
            let mut inner = self.lock();
            if self.capacity > 0 && inner.items.len() >= self.capacity {
                return Err((item, PushError::Full));
            }
            inner.items.push_back(item);
            inner.items.len()
        };
        self.notify.notify_one();
        Ok(depth)
    }

    /// Wait for the next item and the scope it runs under.
    ///
    /// Returns `None` once the queue is shut down.
    pub async fn next(&self) -> Option<(T, CancellationToken)> {
        loop {
            if self.shutdown.is_cancelled() {
                return None;
            }
            {
                let mut inner = self.lock();
                if let Some(item) = inner.items.pop_front() {
                    let scope = inner.scope.clone();
                    return Some((item, scope));
                }
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                _ = self.notify.notified() => {}
            }
        }
    }

    /// Empty the queue and cancel the current scope, installing a fresh one.
    ///
    /// Returns the discarded items so the caller can account for them.
    pub fn cancel_scope(&self) -> Vec<T> {
        let mut inner = self.lock();
        inner.scope.cancel();
        inner.scope = self.shutdown.child_token();
        inner.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumer is processing an item
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Mark the consumer busy until the guard drops
    pub fn busy_guard(&self) -> BusyGuard<'_> {
        self.busy.store(true, Ordering::SeqCst);
        BusyGuard { flag: &self.busy }
    }
}

/// Clears the busy flag on every exit path
pub struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = ScopedQueue::new(CancellationToken::new(), 0);
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        for expected in 0..5 {
            let (item, _) = queue.next().await.unwrap();
            assert_eq!(item, expected);
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_next_waits_for_push() {
        let queue = Arc::new(ScopedQueue::new(CancellationToken::new(), 0));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next().await.map(|(item, _)| item) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push("late").unwrap();

        assert_eq!(consumer.await.unwrap(), Some("late"));
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let queue = ScopedQueue::new(CancellationToken::new(), 2);
        assert_eq!(queue.push(1).unwrap(), 1);
        assert_eq!(queue.push(2).unwrap(), 2);
        assert_eq!(queue.push(3), Err((3, PushError::Full)));
    }

    #[tokio::test]
    async fn test_cancel_scope_drains_and_resets() {
        let queue = ScopedQueue::new(CancellationToken::new(), 0);
        queue.push("a").unwrap();
        let (_, old_scope) = queue.next().await.unwrap();
        queue.push("b").unwrap();
        queue.push("c").unwrap();

        let discarded = queue.cancel_scope();
        assert_eq!(discarded, vec!["b", "c"]);
        assert!(old_scope.is_cancelled());

        // Stage keeps working under a fresh scope
        queue.push("d").unwrap();
        let (item, scope) = queue.next().await.unwrap();
        assert_eq!(item, "d");
        assert!(!scope.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_ends_consumer_and_rejects_push() {
        let shutdown = CancellationToken::new();
        let queue = Arc::new(ScopedQueue::<u32>::new(shutdown.clone(), 0));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next().await.is_none() })
        };

        shutdown.cancel();
        assert!(consumer.await.unwrap());
        assert_eq!(queue.push(1), Err((1, PushError::ShutDown)));
    }

    #[test]
    fn test_busy_guard_resets() {
        let queue = ScopedQueue::<u32>::new(CancellationToken::new(), 0);
        {
            let _guard = queue.busy_guard();
            assert!(queue.is_busy());
        }
        assert!(!queue.is_busy());
    }
}
