// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A client connection: the buffered session plus the request parser, the
//! response builder, and the cursor tracking how much of the mapped body
//! has been written.

use authstore::UserStore;
use mio::event::Source;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use protocol_http::{ParseResult, Request, Response};
use session::Session;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

pub struct Connection {
    session: Session,
    request: Request,
    response: Response,
    src_dir: Arc<PathBuf>,
    store: Arc<dyn UserStore>,
    body_sent: usize,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        src_dir: Arc<PathBuf>,
        store: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            session: Session::new(stream, addr),
            request: Request::new(),
            response: Response::new(),
            src_dir,
            store,
            body_sent: 0,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.session.peer_addr()
    }

    /// Drain the socket into the read buffer. `Ok(0)` means the peer
    /// closed; `WouldBlock` means nothing arrived before the socket
    /// drained.
    pub fn read(&mut self) -> std::io::Result<usize> {
        let mut total = 0;
        loop {
            match self.session.fill() {
                Ok(0) => return Ok(0),
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if total == 0 {
            Err(ErrorKind::WouldBlock.into())
        } else {
            Ok(total)
        }
    }

    /// Run the parser over the read buffer and, once a request is usable,
    /// build the response into the write buffer. Returns false while more
    /// bytes are needed.
    pub fn process(&mut self) -> bool {
        if self.session.read_buffer().readable_bytes() == 0 {
            return false;
        }

        match self
            .request
            .parse(self.session.read_buffer_mut(), &*self.store)
        {
            ParseResult::Partial => return false,
            ParseResult::Complete => {
                debug!("request path {}", self.request.path());
                let keep_alive = self.request.is_keep_alive();
                let path = self.request.path().to_string();
                self.response
                    .init(&self.src_dir, &path, keep_alive, Some(200));
            }
            ParseResult::Bad => {
                let path = self.request.path().to_string();
                self.response.init(&self.src_dir, &path, false, Some(400));
            }
        }

        self.response.make_response(self.session.write_buffer_mut());
        self.body_sent = 0;
        true
    }

    /// Flush the response: the buffered head rides the first vector of
    /// each gathered write, the mapped body the second. Loops until
    /// everything is out or the socket pushes back.
    pub fn write(&mut self) -> std::io::Result<()> {
        loop {
            if self.to_write_bytes() == 0 {
                return Ok(());
            }

            let head_pending = self.session.write_pending();
            let body = self
                .response
                .file()
                .map(|body| &body[self.body_sent.min(body.len())..])
                .filter(|body| !body.is_empty());

            match self.session.writev(body) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.body_sent += n - n.min(head_pending);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Bytes still owed to the peer: pending head plus unsent body.
    pub fn to_write_bytes(&self) -> usize {
        let body = self
            .response
            .file()
            .map_or(0, |body| body.len() - self.body_sent.min(body.len()));
        self.session.write_pending() + body
    }

    pub fn is_keep_alive(&self) -> bool {
        self.request.is_keep_alive()
    }

    /// Prepare for the next request on a kept-alive connection.
    pub fn reset(&mut self) {
        self.request.init();
        self.response.unmap();
        self.body_sent = 0;
    }
}

impl Source for Connection {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interest: Interest,
    ) -> std::io::Result<()> {
        self.session.register(registry, token, interest)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interest: Interest,
    ) -> std::io::Result<()> {
        self.session.reregister(registry, token, interest)
    }

    fn deregister(&mut self, registry: &Registry) -> std::io::Result<()> {
        self.session.deregister(registry)
    }
}
