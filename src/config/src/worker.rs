// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use serde::{Deserialize, Serialize};

const WORKER_THREADS: usize = 6;

fn threads() -> usize {
    WORKER_THREADS
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Worker {
    #[serde(default = "threads")]
    threads: usize,
}

impl Worker {
    pub fn threads(&self) -> usize {
        self.threads
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self { threads: threads() }
    }
}

pub trait WorkerConfig {
    fn worker(&self) -> &Worker;
}
