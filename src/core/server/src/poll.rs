// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A thin facade over the OS readiness multiplexer: register, re-register,
//! and remove event sources, and wait for events with an optional timeout.

use crate::WAKER_TOKEN;

use mio::event::Source;
use mio::{Events, Interest, Token, Waker};
use std::sync::Arc;
use std::time::Duration;

pub struct Poll {
    inner: mio::Poll,
    waker: Arc<Waker>,
}

impl Poll {
    pub fn new() -> Result<Self, std::io::Error> {
        let inner = mio::Poll::new().map_err(|e| {
            error!("{}", e);
            std::io::Error::new(std::io::ErrorKind::Other, "failed to create poll instance")
        })?;

        let waker = Arc::new(Waker::new(inner.registry(), WAKER_TOKEN)?);

        Ok(Self { inner, waker })
    }

    /// Get a copy of the `Waker` for this `Poll` instance.
    pub fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    pub fn add<S: Source + ?Sized>(
        &self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> Result<(), std::io::Error> {
        self.inner.registry().register(source, token, interest)
    }

    pub fn modify<S: Source + ?Sized>(
        &self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> Result<(), std::io::Error> {
        self.inner.registry().reregister(source, token, interest)
    }

    pub fn remove<S: Source + ?Sized>(&self, source: &mut S) -> Result<(), std::io::Error> {
        self.inner.registry().deregister(source)
    }

    pub fn wait(
        &mut self,
        events: &mut Events,
        timeout: Option<Duration>,
    ) -> Result<(), std::io::Error> {
        self.inner.poll(events, timeout)
    }
}
