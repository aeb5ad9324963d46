// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The reactor core. A single event-loop thread owns the listening socket,
//! the connection table, and the idle-timeout heap; readiness events hand
//! connections to a fixed pool of worker threads which run the
//! read/parse/respond cycle and return the connection together with the
//! interest to re-arm.
//!
//! Exclusion is by ownership: the multiplexer registration is dropped
//! before a connection is dispatched and restored only after the worker
//! returns, so a connection has exactly one owner at any time and needs no
//! lock. Every readiness-driven I/O loop drains until `WouldBlock`.

#[macro_use]
extern crate log;

use mio::Token;

mod connection;
mod poll;
mod reactor;
mod workers;

pub use connection::Connection;
pub use poll::Poll;
pub use reactor::{Reactor, ReactorBuilder, ReactorHandle, Signal};
pub use workers::Workers;

pub(crate) const LISTENER_TOKEN: Token = Token(usize::MAX - 1);
pub(crate) const WAKER_TOKEN: Token = Token(usize::MAX);

pub(crate) const THREAD_PREFIX: &str = "petrel";
