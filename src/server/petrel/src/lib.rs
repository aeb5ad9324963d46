// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Petrel is a single-process HTTP/1.1 server which terminates many
//! concurrent connections on one event-loop thread, serves files out of a
//! resource directory via memory mapping, and handles form login and
//! registration against a relational database. This library wires the
//! subsystems together; users should prefer the binary provided by this
//! crate.

#[macro_use]
extern crate log;

use authstore::{DbPool, UserStore};
use config::{DbConfig, DebugConfig, PetrelConfig, ServerConfig, WorkerConfig};
use logger::{LogBuilder, LogHandle};
use server::{ReactorBuilder, ReactorHandle};
use std::sync::Arc;

/// This structure represents a running `Petrel` process.
pub struct Petrel {
    reactor: ReactorHandle,
    log: Option<LogHandle>,
}

impl Petrel {
    /// Bring up logging, the database pool, and the reactor from the given
    /// config. Any failure aborts startup.
    pub fn new(config: PetrelConfig) -> Result<Self, std::io::Error> {
        // initialize logging
        let log = if config.debug().log_open() {
            let log = LogBuilder::new()
                .level(config.debug().log_level())
                .dir(config.debug().log_dir())
                .suffix(config.debug().log_suffix())
                .queue_depth(config.debug().log_queue_depth())
                .build()?
                .start();
            Some(log)
        } else {
            None
        };

        info!("========== server init ==========");
        info!(
            "port: {}, timeout: {}ms, linger: {}",
            config.server().port(),
            config.server().timeout_ms(),
            config.server().linger()
        );
        info!("src dir: {}", config.server().src_dir());
        info!(
            "db pool: {}, worker threads: {}, log level: {}",
            config.db().pool_size(),
            config.worker().threads(),
            config.debug().log_level()
        );

        // open the database pool up front
        let store: Arc<dyn UserStore> = Arc::new(DbPool::connect(&config).map_err(|e| {
            error!("database init failed: {}", e);
            std::io::Error::new(std::io::ErrorKind::Other, "database init failed")
        })?);

        // assemble and launch the reactor
        let reactor = ReactorBuilder::new(&config, store)?.spawn();

        Ok(Self { reactor, log })
    }

    /// Wait for the event loop to exit. Under normal conditions this
    /// blocks indefinitely.
    pub fn wait(self) {
        self.reactor.wait();
        if let Some(log) = self.log {
            log.shutdown();
        }
    }

    /// Trigger a shutdown and block until the process has wound down.
    pub fn shutdown(self) {
        self.reactor.shutdown();
        if let Some(log) = self.log {
            log.shutdown();
        }
    }
}
