// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use serde::{Deserialize, Serialize};

// constants to define default values
const DEBUG_LOG_OPEN: bool = true;
const DEBUG_LOG_LEVEL: usize = 1;
const DEBUG_LOG_DIR: &str = "./log";
const DEBUG_LOG_SUFFIX: &str = ".log";
const DEBUG_LOG_QUEUE_DEPTH: usize = 1024;

// helper functions for default values
fn log_open() -> bool {
    DEBUG_LOG_OPEN
}

fn log_level() -> usize {
    DEBUG_LOG_LEVEL
}

fn log_dir() -> String {
    DEBUG_LOG_DIR.to_string()
}

fn log_suffix() -> String {
    DEBUG_LOG_SUFFIX.to_string()
}

fn log_queue_depth() -> usize {
    DEBUG_LOG_QUEUE_DEPTH
}

// definitions
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Debug {
    #[serde(default = "log_open")]
    log_open: bool,
    /// 0 debug, 1 info, 2 warn, 3 error
    #[serde(default = "log_level")]
    log_level: usize,
    #[serde(default = "log_dir")]
    log_dir: String,
    #[serde(default = "log_suffix")]
    log_suffix: String,
    /// zero makes logging synchronous
    #[serde(default = "log_queue_depth")]
    log_queue_depth: usize,
}

// implementation
impl Debug {
    pub fn log_open(&self) -> bool {
        self.log_open
    }

    pub fn log_level(&self) -> usize {
        self.log_level
    }

    pub fn log_dir(&self) -> String {
        self.log_dir.clone()
    }

    pub fn log_suffix(&self) -> String {
        self.log_suffix.clone()
    }

    pub fn log_queue_depth(&self) -> usize {
        self.log_queue_depth
    }
}

// trait implementations
impl Default for Debug {
    fn default() -> Self {
        Self {
            log_open: log_open(),
            log_level: log_level(),
            log_dir: log_dir(),
            log_suffix: log_suffix(),
            log_queue_depth: log_queue_depth(),
        }
    }
}

pub trait DebugConfig {
    fn debug(&self) -> &Debug;
}
