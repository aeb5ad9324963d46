// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use serde::{Deserialize, Serialize};

// constants to define default values
const DB_HOST: &str = "localhost";
const DB_PORT: u16 = 5432;
const DB_USER: &str = "root";
const DB_PASSWORD: &str = "";
const DB_NAME: &str = "webserver";
const DB_POOL_SIZE: usize = 12;

// helper functions for default values
fn host() -> String {
    DB_HOST.to_string()
}

fn port() -> u16 {
    DB_PORT
}

fn user() -> String {
    DB_USER.to_string()
}

fn password() -> String {
    DB_PASSWORD.to_string()
}

fn dbname() -> String {
    DB_NAME.to_string()
}

fn pool_size() -> usize {
    DB_POOL_SIZE
}

// definitions
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Db {
    #[serde(default = "host")]
    host: String,
    #[serde(default = "port")]
    port: u16,
    #[serde(default = "user")]
    user: String,
    #[serde(default = "password")]
    password: String,
    #[serde(default = "dbname")]
    dbname: String,
    /// number of handles opened up front
    #[serde(default = "pool_size")]
    pool_size: usize,
}

// implementation
impl Db {
    pub fn host(&self) -> String {
        self.host.clone()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> String {
        self.user.clone()
    }

    pub fn password(&self) -> String {
        self.password.clone()
    }

    pub fn dbname(&self) -> String {
        self.dbname.clone()
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}

// trait implementations
impl Default for Db {
    fn default() -> Self {
        Self {
            host: host(),
            port: port(),
            user: user(),
            password: password(),
            dbname: dbname(),
            pool_size: pool_size(),
        }
    }
}

pub trait DbConfig {
    fn db(&self) -> &Db;
}
