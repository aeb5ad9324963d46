// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A fixed-size pool of worker threads draining a FIFO of queued tasks.
//! Shutdown closes the queue; workers finish the tasks already queued and
//! then exit.

use crate::THREAD_PREFIX;

use crossbeam_channel::{Receiver, Sender};
use std::thread::JoinHandle;

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct Workers {
    sender: Option<Sender<Task>>,
    threads: Vec<JoinHandle<()>>,
}

impl Workers {
    /// Spawn `threads` workers.
    pub fn new(threads: usize) -> Self {
        assert!(threads > 0);
        let (sender, receiver) = crossbeam_channel::unbounded::<Task>();

        let threads = (0..threads)
            .map(|id| {
                let receiver: Receiver<Task> = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("{}_worker_{}", THREAD_PREFIX, id))
                    .spawn(move || {
                        while let Ok(task) = receiver.recv() {
                            task();
                        }
                    })
                    .expect("failed to spawn worker")
            })
            .collect();

        Self {
            sender: Some(sender),
            threads,
        }
    }

    /// Queue a task for execution. Tasks run to completion in FIFO order
    /// per worker.
    pub fn execute<F: FnOnce() + Send + 'static>(&self, task: F) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Box::new(task));
        }
    }

    /// Close the queue and join the workers after they drain it.
    pub fn shutdown(&mut self) {
        drop(self.sender.take());
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_queued_tasks() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut workers = Workers::new(4);

        for _ in 0..64 {
            let count = count.clone();
            workers.execute(move || {
                count.fetch_add(1, Ordering::Relaxed);
            });
        }

        // shutdown drains the queue before the workers exit
        workers.shutdown();
        assert_eq!(count.load(Ordering::Relaxed), 64);
    }

    #[test]
    fn tasks_after_shutdown_are_dropped() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut workers = Workers::new(1);
        workers.shutdown();

        let c = count.clone();
        workers.execute(move || {
            c.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }
}
