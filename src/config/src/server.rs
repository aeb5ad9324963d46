// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use std::net::{AddrParseError, SocketAddr};

use serde::{Deserialize, Serialize};

// constants to define default values
const SERVER_HOST: &str = "0.0.0.0";
const SERVER_PORT: &str = "1316";
const SERVER_TIMEOUT_MS: u64 = 60_000;
const SERVER_LINGER: bool = false;
const SERVER_BACKLOG: i32 = 6;
const SERVER_MAX_CONNECTIONS: usize = 65536;
const SERVER_SRC_DIR: &str = "./resources";
const SERVER_NEVENT: usize = 1024;

// helper functions for default values
fn host() -> String {
    SERVER_HOST.to_string()
}

fn port() -> String {
    SERVER_PORT.to_string()
}

fn timeout_ms() -> u64 {
    SERVER_TIMEOUT_MS
}

fn linger() -> bool {
    SERVER_LINGER
}

fn backlog() -> i32 {
    SERVER_BACKLOG
}

fn max_connections() -> usize {
    SERVER_MAX_CONNECTIONS
}

fn src_dir() -> String {
    SERVER_SRC_DIR.to_string()
}

fn nevent() -> usize {
    SERVER_NEVENT
}

// definitions
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Server {
    #[serde(default = "host")]
    host: String,
    #[serde(default = "port")]
    port: String,
    /// idle timeout for client connections, zero disables the idle timer
    #[serde(default = "timeout_ms")]
    timeout_ms: u64,
    #[serde(default = "linger")]
    linger: bool,
    #[serde(default = "backlog")]
    backlog: i32,
    #[serde(default = "max_connections")]
    max_connections: usize,
    /// root directory for served files
    #[serde(default = "src_dir")]
    src_dir: String,
    #[serde(default = "nevent")]
    nevent: usize,
}

// implementation
impl Server {
    pub fn host(&self) -> String {
        self.host.clone()
    }

    pub fn port(&self) -> String {
        self.port.clone()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn linger(&self) -> bool {
        self.linger
    }

    pub fn backlog(&self) -> i32 {
        self.backlog
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn src_dir(&self) -> String {
        self.src_dir.clone()
    }

    pub fn nevent(&self) -> usize {
        self.nevent
    }

    #[doc(hidden)]
    pub fn set_port(&mut self, port: String) {
        self.port = port;
    }

    #[doc(hidden)]
    pub fn set_src_dir(&mut self, src_dir: String) {
        self.src_dir = src_dir;
    }

    #[doc(hidden)]
    pub fn set_timeout_ms(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
    }
}

// trait implementations
impl Default for Server {
    fn default() -> Self {
        Self {
            host: host(),
            port: port(),
            timeout_ms: timeout_ms(),
            linger: linger(),
            backlog: backlog(),
            max_connections: max_connections(),
            src_dir: src_dir(),
            nevent: nevent(),
        }
    }
}

pub trait ServerConfig {
    fn server(&self) -> &Server;
}
