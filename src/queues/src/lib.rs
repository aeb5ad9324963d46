// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A bounded blocking MPMC queue with a terminal close operation. Producers
//! block while the queue is full, consumers block while it is empty, and
//! `close` wakes every waiter. Producers and consumers wait on separate
//! condition variables so a wakeup on one side never stampedes the other.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

struct Shared<T> {
    deque: VecDeque<T>,
    closed: bool,
}

/// A bounded blocking queue. All operations take `&self`; the queue is
/// shared between threads behind an `Arc`.
pub struct BlockQueue<T> {
    shared: Mutex<Shared<T>>,
    capacity: usize,
    consumer: Condvar,
    producer: Condvar,
}

impl<T> BlockQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            shared: Mutex::new(Shared {
                deque: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            consumer: Condvar::new(),
            producer: Condvar::new(),
        }
    }

    /// Push an item, blocking while the queue is full. Items pushed after
    /// `close` are dropped.
    pub fn push_back(&self, item: T) {
        let mut shared = self.shared.lock().unwrap();
        while shared.deque.len() >= self.capacity && !shared.closed {
            shared = self.producer.wait(shared).unwrap();
        }
        if shared.closed {
            return;
        }
        shared.deque.push_back(item);
        self.consumer.notify_one();
    }

    /// Push an item without blocking. A full or closed queue hands the item
    /// back to the caller.
    pub fn try_push_back(&self, item: T) -> Result<(), T> {
        let mut shared = self.shared.lock().unwrap();
        if shared.closed || shared.deque.len() >= self.capacity {
            return Err(item);
        }
        shared.deque.push_back(item);
        self.consumer.notify_one();
        Ok(())
    }

    /// Pop the front item, blocking while the queue is empty. Returns
    /// `None` once the queue has been closed.
    pub fn pop(&self) -> Option<T> {
        let mut shared = self.shared.lock().unwrap();
        loop {
            if let Some(item) = shared.deque.pop_front() {
                self.producer.notify_one();
                return Some(item);
            }
            if shared.closed {
                return None;
            }
            shared = self.consumer.wait(shared).unwrap();
        }
    }

    /// Pop the front item, waiting at most `timeout`. Returns `None` on
    /// timeout or once the queue has been closed.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut shared = self.shared.lock().unwrap();
        loop {
            if let Some(item) = shared.deque.pop_front() {
                self.producer.notify_one();
                return Some(item);
            }
            if shared.closed {
                return None;
            }
            let (guard, result) = self.consumer.wait_timeout(shared, timeout).unwrap();
            shared = guard;
            if result.timed_out() {
                return shared.deque.pop_front();
            }
        }
    }

    /// Wake one blocked consumer.
    pub fn flush(&self) {
        self.consumer.notify_one();
    }

    /// Clear the queue, mark it closed, and wake every waiter. Further
    /// pushes are dropped and pops return `None` once drained.
    pub fn close(&self) {
        {
            let mut shared = self.shared.lock().unwrap();
            shared.deque.clear();
            shared.closed = true;
        }
        self.producer.notify_all();
        self.consumer.notify_all();
    }

    pub fn clear(&self) {
        self.shared.lock().unwrap().deque.clear();
        self.producer.notify_all();
    }

    pub fn len(&self) -> usize {
        self.shared.lock().unwrap().deque.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn push_pop_order() {
        let queue = BlockQueue::new(4);
        queue.push_back(1);
        queue.push_back(2);
        queue.push_back(3);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn try_push_respects_capacity() {
        let queue = BlockQueue::new(2);
        assert!(queue.try_push_back(1).is_ok());
        assert!(queue.try_push_back(2).is_ok());
        assert_eq!(queue.try_push_back(3), Err(3));
        assert!(queue.is_full());
    }

    #[test]
    fn pop_timeout_expires() {
        let queue: BlockQueue<u32> = BlockQueue::new(2);
        let start = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(50)), None);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    // a full queue blocks the producer until a consumer makes room
    fn producer_blocks_until_consumed() {
        let queue = Arc::new(BlockQueue::new(1));
        queue.push_back(1);

        let q = queue.clone();
        let producer = std::thread::spawn(move || {
            q.push_back(2);
        });

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.pop(), Some(1));
        producer.join().unwrap();
        assert_eq!(queue.pop(), Some(2));
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let queue: Arc<BlockQueue<u32>> = Arc::new(BlockQueue::new(1));

        let q = queue.clone();
        let consumer = std::thread::spawn(move || q.pop());

        std::thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_eq!(consumer.join().unwrap(), None);

        // pushes after close are dropped
        queue.push_back(1);
        assert!(queue.is_empty());
    }
}
