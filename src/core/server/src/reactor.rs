// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The event loop. The reactor owns the listener, the connection table,
//! and the idle-timeout heap. Readiness events dispatch connections to the
//! worker pool; workers send the connection back with the interest to
//! re-arm. One-shot semantics are emulated by deregistering a connection
//! before dispatch and re-registering it only when the worker returns, so
//! the reactor and a worker never touch the same connection concurrently.

use crate::connection::Connection;
use crate::poll::Poll;
use crate::workers::Workers;
use crate::{LISTENER_TOKEN, THREAD_PREFIX, WAKER_TOKEN};

use authstore::UserStore;
use config::{ServerConfig, WorkerConfig};
use crossbeam_channel::{Receiver, Sender};
use mio::net::TcpListener;
use mio::{Events, Interest, Token, Waker};
use slab::Slab;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use timer::TimerHeap;

/// Control messages delivered over the signal queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}

/// What a worker decided should happen to a connection it processed.
enum Next {
    Read,
    Write,
    Close,
}

struct Done {
    token: usize,
    conn: Connection,
    next: Next,
}

/// A table slot. The connection is moved out while a worker owns it.
enum Slot {
    Ready(Connection),
    Busy,
}

pub struct Reactor {
    listener: TcpListener,
    poll: Poll,
    conns: Slab<Slot>,
    timers: TimerHeap,
    workers: Workers,
    waker: Arc<Waker>,
    done_tx: Sender<Done>,
    done_rx: Receiver<Done>,
    expired_tx: Sender<usize>,
    expired_rx: Receiver<usize>,
    signal_rx: Receiver<Signal>,
    timeout: Option<Duration>,
    max_connections: usize,
    nevent: usize,
    src_dir: Arc<PathBuf>,
    store: Arc<dyn UserStore>,
    closed: bool,
}

pub struct ReactorBuilder {
    reactor: Reactor,
    signal_tx: Sender<Signal>,
}

impl ReactorBuilder {
    /// Open the listening socket and assemble the reactor. Any failure
    /// here aborts startup.
    pub fn new<T: ServerConfig + WorkerConfig>(
        config: &T,
        store: Arc<dyn UserStore>,
    ) -> Result<Self, std::io::Error> {
        let server = config.server();

        let addr = server.socket_addr().map_err(|e| {
            error!("{}", e);
            std::io::Error::new(std::io::ErrorKind::Other, "bad listen address")
        })?;

        let mut listener = listen(addr, server.backlog(), server.linger())?;

        let poll = Poll::new()?;
        poll.add(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(|e| {
                error!("{}", e);
                std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "failed to register listener with the multiplexer",
                )
            })?;

        let waker = poll.waker();
        let workers = Workers::new(config.worker().threads());

        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let (expired_tx, expired_rx) = crossbeam_channel::unbounded();
        let (signal_tx, signal_rx) = crossbeam_channel::bounded(8);

        let timeout = match server.timeout_ms() {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        info!("server listening on {}", listener.local_addr()?);

        Ok(Self {
            reactor: Reactor {
                listener,
                poll,
                conns: Slab::new(),
                timers: TimerHeap::new(),
                workers,
                waker,
                done_tx,
                done_rx,
                expired_tx,
                expired_rx,
                signal_rx,
                timeout,
                max_connections: server.max_connections(),
                nevent: server.nevent(),
                src_dir: Arc::new(PathBuf::from(server.src_dir())),
                store,
                closed: false,
            },
            signal_tx,
        })
    }

    /// The bound address; interesting when the configured port was
    /// ephemeral.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.reactor.listener.local_addr()
    }

    /// Spawn the event-loop thread and return the control handle.
    pub fn spawn(self) -> ReactorHandle {
        let mut reactor = self.reactor;
        let waker = reactor.waker.clone();
        let thread = std::thread::Builder::new()
            .name(format!("{}_reactor", THREAD_PREFIX))
            .spawn(move || reactor.run())
            .expect("failed to spawn reactor");

        ReactorHandle {
            signal_tx: self.signal_tx,
            waker,
            thread,
        }
    }
}

/// Control handle for a running reactor.
pub struct ReactorHandle {
    signal_tx: Sender<Signal>,
    waker: Arc<Waker>,
    thread: std::thread::JoinHandle<()>,
}

impl ReactorHandle {
    /// Block until the event loop exits.
    pub fn wait(self) {
        let _ = self.thread.join();
    }

    /// Stop the event loop and join it.
    pub fn shutdown(self) {
        let _ = self.signal_tx.send(Signal::Shutdown);
        let _ = self.waker.wake();
        let _ = self.thread.join();
    }
}

impl Reactor {
    /// Run the event loop until shutdown or a fatal multiplexer error.
    pub fn run(&mut self) {
        let mut events = Events::with_capacity(self.nevent);

        while !self.closed {
            // expire idle connections first so the wait below uses the
            // deadline of the next live timer
            let timeout = if self.timeout.is_some() {
                self.timers.next_tick()
            } else {
                None
            };
            self.reap_expired();

            if let Err(e) = self.poll.wait(&mut events, timeout) {
                if e.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                error!("multiplexer wait failed: {}", e);
                self.closed = true;
                break;
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept_all(),
                    WAKER_TOKEN => {}
                    Token(token) => self.session_event(token, event),
                }
            }

            self.drain_done();

            while let Ok(signal) = self.signal_rx.try_recv() {
                match signal {
                    Signal::Shutdown => {
                        info!("shutdown signal received");
                        self.closed = true;
                    }
                }
            }
        }

        self.teardown();
    }

    /// Accept until the queue drains. A connection over the limit is told
    /// so and dropped; remaining pending connections wait for the next
    /// readiness event.
    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if self.conns.len() >= self.max_connections {
                        send_busy(stream);
                        warn!("clients are full!");
                        return;
                    }
                    self.add_client(stream, addr);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("accept error: {}", e);
                    break;
                }
            }
        }
    }

    fn add_client(&mut self, stream: mio::net::TcpStream, addr: SocketAddr) {
        // disable Nagle's algorithm
        let _ = stream.set_nodelay(true);

        let entry = self.conns.vacant_entry();
        let token = entry.key();

        let mut conn = Connection::new(stream, addr, self.src_dir.clone(), self.store.clone());
        if let Err(e) = self.poll.add(&mut conn, Token(token), Interest::READABLE) {
            error!("failed to register client: {}", e);
            return;
        }
        entry.insert(Slot::Ready(conn));

        if let Some(timeout) = self.timeout {
            let expired_tx = self.expired_tx.clone();
            self.timers.add(
                token,
                timeout,
                Box::new(move || {
                    let _ = expired_tx.send(token);
                }),
            );
        }

        info!("client[{}]({}) in, connections: {}", token, addr, self.conns.len());
    }

    /// Route one readiness event for a client connection.
    fn session_event(&mut self, token: usize, event: &mio::event::Event) {
        if !self.conns.contains(token) {
            return;
        }

        if event.is_error() || event.is_read_closed() {
            self.close_ready(token);
        } else if event.is_readable() {
            self.dispatch(token, false);
        } else if event.is_writable() {
            self.dispatch(token, true);
        } else {
            error!("unexpected event: {:?}", event);
        }
    }

    /// Hand the connection to a worker. The registration is removed first
    /// so no further event can fire for it until it is re-armed.
    fn dispatch(&mut self, token: usize, writable: bool) {
        if let Some(timeout) = self.timeout {
            self.timers.adjust(token, timeout);
        }

        let slot = match self.conns.get_mut(token) {
            Some(slot) => slot,
            None => return,
        };
        let mut conn = match std::mem::replace(slot, Slot::Busy) {
            Slot::Ready(conn) => conn,
            Slot::Busy => return,
        };

        if let Err(e) = self.poll.remove(&mut conn) {
            debug!("deregister failed: {}", e);
        }

        let done_tx = self.done_tx.clone();
        let waker = self.waker.clone();
        self.workers.execute(move || {
            let next = if writable {
                on_write(&mut conn)
            } else {
                on_read(&mut conn)
            };
            let _ = done_tx.send(Done { token, conn, next });
            let _ = waker.wake();
        });
    }

    /// Apply worker outcomes: re-arm or close.
    fn drain_done(&mut self) {
        while let Ok(Done { token, conn, next }) = self.done_rx.try_recv() {
            if !self.conns.contains(token) {
                continue;
            }
            match next {
                Next::Read => self.rearm(token, conn, Interest::READABLE),
                Next::Write => self.rearm(token, conn, Interest::WRITABLE),
                Next::Close => self.close_busy(token, conn),
            }
        }
    }

    fn rearm(&mut self, token: usize, mut conn: Connection, interest: Interest) {
        if let Err(e) = self.poll.add(&mut conn, Token(token), interest) {
            error!("failed to re-arm client: {}", e);
            self.close_busy(token, conn);
            return;
        }
        self.conns[token] = Slot::Ready(conn);

        if let Some(timeout) = self.timeout {
            let expired_tx = self.expired_tx.clone();
            self.timers.add(
                token,
                timeout,
                Box::new(move || {
                    let _ = expired_tx.send(token);
                }),
            );
        }
    }

    /// Close connections whose idle timer fired. A connection currently
    /// owned by a worker is left alone; returning it re-arms the timer.
    fn reap_expired(&mut self) {
        while let Ok(token) = self.expired_rx.try_recv() {
            if let Some(Slot::Ready(_)) = self.conns.get(token) {
                debug!("client[{}] idle timeout", token);
                self.close_ready(token);
            }
        }
    }

    /// Close a connection still present in the table.
    fn close_ready(&mut self, token: usize) {
        if let Some(slot) = self.conns.get_mut(token) {
            if let Slot::Ready(mut conn) = std::mem::replace(slot, Slot::Busy) {
                if let Err(e) = self.poll.remove(&mut conn) {
                    debug!("deregister failed: {}", e);
                }
                self.finish_close(token, conn);
            }
        }
    }

    /// Close a connection a worker handed back; its registration is
    /// already gone.
    fn close_busy(&mut self, token: usize, conn: Connection) {
        self.finish_close(token, conn);
    }

    fn finish_close(&mut self, token: usize, conn: Connection) {
        self.timers.cancel(token);
        self.conns.remove(token);
        info!(
            "client[{}]({}) quit, connections: {}",
            token,
            conn.peer_addr(),
            self.conns.len()
        );
        drop(conn);
    }

    fn teardown(&mut self) {
        info!("reactor shutting down, {} connections open", self.conns.len());
        let tokens: Vec<usize> = self.conns.iter().map(|(token, _)| token).collect();
        for token in tokens {
            self.close_ready(token);
        }
        self.timers.clear();
        self.workers.shutdown();
    }
}

/// Worker side of a readable event: drain the socket, then parse and
/// build the response.
fn on_read(conn: &mut Connection) -> Next {
    match conn.read() {
        Ok(0) => return Next::Close,
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
        Err(e) => {
            debug!("read error from {}: {}", conn.peer_addr(), e);
            return Next::Close;
        }
    }

    if conn.process() {
        Next::Write
    } else {
        Next::Read
    }
}

/// Worker side of a writable event: flush, then either wait for the next
/// request or close.
fn on_write(conn: &mut Connection) -> Next {
    match conn.write() {
        Ok(()) => {
            if conn.to_write_bytes() == 0 && conn.is_keep_alive() {
                conn.reset();
                Next::Read
            } else {
                Next::Close
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Next::Write,
        Err(e) => {
            debug!("write error to {}: {}", conn.peer_addr(), e);
            Next::Close
        }
    }
}

/// Tell an over-limit client the server is busy and drop the socket.
fn send_busy(mut stream: mio::net::TcpStream) {
    if stream.write(b"Server busy!").is_err() {
        warn!("send busy notice failed");
    }
}

/// Build the listening socket: address reuse, optional linger, bounded
/// accept backlog, non-blocking.
fn listen(addr: SocketAddr, backlog: i32, linger: bool) -> Result<TcpListener, std::io::Error> {
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    if linger {
        socket.set_linger(Some(Duration::from_secs(1)))?;
    }
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;

    Ok(TcpListener::from_std(socket.into()))
}
