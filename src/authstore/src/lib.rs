// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A fixed-size pool of pre-opened database handles guarded by a counting
//! semaphore, plus the user verification queries which run on a leased
//! handle during login and registration.
//!
//! The generic `Pool` hands out `Lease`s which return the handle on drop,
//! covering early returns and panics alike. `acquire` blocks while every
//! handle is leased; the pool size is therefore the natural backpressure on
//! verification.

#[macro_use]
extern crate log;

use config::DbConfig;
use postgres::{Client, NoTls, SimpleQueryMessage};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Db(#[from] postgres::Error),
}

/// A counting-semaphore pool of interchangeable handles.
pub struct Pool<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
    size: usize,
}

impl<T> Pool<T> {
    /// Build a pool owning the given handles.
    pub fn new(items: Vec<T>) -> Self {
        let size = items.len();
        Self {
            items: Mutex::new(items.into()),
            available: Condvar::new(),
            size,
        }
    }

    /// Lease a handle, blocking while none are free.
    pub fn acquire(&self) -> Lease<'_, T> {
        let mut items = self.items.lock().unwrap();
        loop {
            if let Some(item) = items.pop_front() {
                return Lease {
                    pool: self,
                    item: Some(item),
                };
            }
            items = self.available.wait(items).unwrap();
        }
    }

    fn release(&self, item: T) {
        self.items.lock().unwrap().push_back(item);
        self.available.notify_one();
    }

    /// Number of handles currently free.
    pub fn free_count(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    /// Total number of handles owned by the pool.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Drop every free handle. Outstanding leases are returned to an empty
    /// pool and dropped with it.
    pub fn drain(&self) {
        self.items.lock().unwrap().clear();
    }
}

/// A scoped lease of a pooled handle; the handle goes back to the pool when
/// the lease drops.
pub struct Lease<'a, T> {
    pool: &'a Pool<T>,
    item: Option<T>,
}

impl<T> Deref for Lease<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item.as_ref().unwrap()
    }
}

impl<T> DerefMut for Lease<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().unwrap()
    }
}

impl<T> Drop for Lease<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}

/// User verification backend. Login compares the stored password;
/// registration inserts a new row unless the name is taken.
pub trait UserStore: Send + Sync {
    fn verify(&self, name: &str, pwd: &str, is_login: bool) -> bool;
}

/// A pool of PostgreSQL clients over the `user(username, password)` table.
pub struct DbPool {
    pool: Pool<Client>,
}

impl DbPool {
    /// Open `pool_size` connections up front. Any connection failure aborts
    /// startup.
    pub fn connect<T: DbConfig>(config: &T) -> Result<Self, Error> {
        let config = config.db();
        let params = format!(
            "host={} port={} user={} password={} dbname={}",
            config.host(),
            config.port(),
            config.user(),
            config.password(),
            config.dbname()
        );

        let mut clients = Vec::with_capacity(config.pool_size());
        for _ in 0..config.pool_size() {
            clients.push(Client::connect(&params, NoTls)?);
        }
        info!("database pool ready: {} handles", clients.len());

        Ok(Self {
            pool: Pool::new(clients),
        })
    }

    pub fn free_count(&self) -> usize {
        self.pool.free_count()
    }

    /// Close every pooled handle.
    pub fn close(&self) {
        self.pool.drain();
    }
}

impl UserStore for DbPool {
    fn verify(&self, name: &str, pwd: &str, is_login: bool) -> bool {
        if name.is_empty() || pwd.is_empty() {
            return false;
        }
        info!("verify name:{}", name);

        let mut client = self.pool.acquire();

        // WARNING: values are interpolated, not bound, and passwords are
        // stored in plaintext; see DESIGN.md before pointing this at
        // anything that matters
        let query = format!(
            "SELECT username, password FROM \"user\" WHERE username='{}' LIMIT 1",
            name
        );
        debug!("{}", query);

        let rows = match client.simple_query(&query) {
            Ok(rows) => rows,
            Err(e) => {
                error!("select failed: {}", e);
                return false;
            }
        };

        let mut stored = None;
        for message in rows {
            if let SimpleQueryMessage::Row(row) = message {
                stored = row.get(1).map(|s| s.to_string());
            }
        }

        match stored {
            Some(password) => {
                if is_login {
                    if password == pwd {
                        true
                    } else {
                        info!("pwd error!");
                        false
                    }
                } else {
                    info!("user used!");
                    false
                }
            }
            None => {
                if is_login {
                    false
                } else {
                    let insert = format!(
                        "INSERT INTO \"user\"(username, password) VALUES('{}','{}')",
                        name, pwd
                    );
                    debug!("{}", insert);
                    match client.batch_execute(&insert) {
                        Ok(_) => true,
                        Err(e) => {
                            error!("insert failed: {}", e);
                            false
                        }
                    }
                }
            }
        }
    }
}
