// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! An indexed min-heap of deadline timers. Each node carries an id, an
//! absolute deadline, and a callback which fires on expiry. A side map from
//! id to heap index makes adjust and cancel O(log n). Every node swap also
//! swaps the two map entries; the map and the heap are never allowed to
//! disagree.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Callback invoked when a timer fires or is cancelled through `do_work`.
pub type TimerCallback = Box<dyn FnMut() + Send>;

struct TimerNode {
    id: usize,
    deadline: Instant,
    cb: TimerCallback,
}

/// Min-heap of timers ordered by deadline, indexed by id.
#[derive(Default)]
pub struct TimerHeap {
    heap: Vec<TimerNode>,
    index: HashMap<usize, usize>,
}

impl TimerHeap {
    pub fn new() -> Self {
        Self {
            heap: Vec::with_capacity(64),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, id: usize) -> bool {
        self.index.contains_key(&id)
    }

    /// Add a timer firing after `timeout`. Adding an id which is already
    /// present updates its deadline and callback in place and restores heap
    /// order.
    pub fn add(&mut self, id: usize, timeout: Duration, cb: TimerCallback) {
        if let Some(&i) = self.index.get(&id) {
            self.heap[i].deadline = Instant::now() + timeout;
            self.heap[i].cb = cb;
            if !self.sift_down(i) {
                self.sift_up(i);
            }
        } else {
            let i = self.heap.len();
            self.index.insert(id, i);
            self.heap.push(TimerNode {
                id,
                deadline: Instant::now() + timeout,
                cb,
            });
            self.sift_up(i);
        }
    }

    /// Push the deadline of an existing timer to `now + timeout`. Both sift
    /// directions are attempted: the new deadline is usually later, but a
    /// shortened deadline must sift up to keep heap order.
    pub fn adjust(&mut self, id: usize, timeout: Duration) {
        if let Some(&i) = self.index.get(&id) {
            self.heap[i].deadline = Instant::now() + timeout;
            if !self.sift_down(i) {
                self.sift_up(i);
            }
        }
    }

    /// Invoke the callback for `id` and remove the node. Unknown ids are
    /// ignored.
    pub fn do_work(&mut self, id: usize) {
        if let Some(&i) = self.index.get(&id) {
            let mut node = self.remove(i);
            (node.cb)();
        }
    }

    /// Remove the node for `id` without invoking its callback.
    pub fn cancel(&mut self, id: usize) {
        if let Some(&i) = self.index.get(&id) {
            let _ = self.remove(i);
        }
    }

    /// Pop and invoke every node whose deadline has passed, in deadline
    /// order.
    pub fn tick(&mut self) {
        let now = Instant::now();
        while let Some(top) = self.heap.first() {
            if top.deadline > now {
                break;
            }
            let mut node = self.remove(0);
            (node.cb)();
        }
    }

    /// Remove the earliest node without invoking it.
    pub fn pop(&mut self) {
        assert!(!self.heap.is_empty());
        let _ = self.remove(0);
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.index.clear();
    }

    /// Run `tick`, then report the time until the next deadline, `None`
    /// when no timers remain. The result is clamped at zero.
    pub fn next_tick(&mut self) -> Option<Duration> {
        self.tick();
        let now = Instant::now();
        self.heap
            .first()
            .map(|node| node.deadline.saturating_duration_since(now))
    }

    fn remove(&mut self, i: usize) -> TimerNode {
        let last = self.heap.len() - 1;
        self.swap_nodes(i, last);
        let node = self.heap.pop().unwrap();
        self.index.remove(&node.id);
        if i < self.heap.len() && !self.sift_down(i) {
            self.sift_up(i);
        }
        node
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[parent].deadline <= self.heap[i].deadline {
                break;
            }
            self.swap_nodes(i, parent);
            i = parent;
        }
    }

    /// Returns true when the node moved.
    fn sift_down(&mut self, i: usize) -> bool {
        let n = self.heap.len();
        let mut index = i;
        let mut child = 2 * index + 1;
        while child < n {
            if child + 1 < n && self.heap[child + 1].deadline < self.heap[child].deadline {
                child += 1;
            }
            if self.heap[child].deadline >= self.heap[index].deadline {
                break;
            }
            self.swap_nodes(index, child);
            index = child;
            child = 2 * index + 1;
        }
        index > i
    }

    fn swap_nodes(&mut self, i: usize, j: usize) {
        if i == j {
            return;
        }
        self.heap.swap(i, j);
        self.index.insert(self.heap[i].id, i);
        self.index.insert(self.heap[j].id, j);
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        assert_eq!(self.heap.len(), self.index.len());
        for (i, node) in self.heap.iter().enumerate() {
            assert_eq!(self.index[&node.id], i);
            if i > 0 {
                let parent = (i - 1) / 2;
                assert!(self.heap[parent].deadline <= self.heap[i].deadline);
            }
        }
    }
}
