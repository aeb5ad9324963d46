// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A `Session` is a non-blocking TCP stream with its read and write
//! buffers. Filling reads from the socket into the read buffer with a
//! single scatter syscall; flushing gathers the buffered response head and
//! an optional out-of-band body (such as a memory-mapped file) into one
//! `writev`.

#[macro_use]
extern crate log;

pub use mio::event::Source;
pub use mio::{Interest, Registry, Token};

use buffer::Buffer;
use mio::net::TcpStream;
use std::fmt::Debug;
use std::io::{IoSlice, Write};
use std::net::SocketAddr;
use std::os::unix::prelude::AsRawFd;

pub struct Session {
    stream: TcpStream,
    addr: SocketAddr,
    read_buffer: Buffer,
    write_buffer: Buffer,
}

impl AsRawFd for Session {
    fn as_raw_fd(&self) -> i32 {
        self.stream.as_raw_fd()
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        write!(f, "{}", self.addr)
    }
}

impl Session {
    /// Construct a new `Session` from an accepted stream and its peer
    /// address.
    pub fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        Self {
            stream,
            addr,
            read_buffer: Buffer::default(),
            write_buffer: Buffer::default(),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Read once from the stream into the read buffer. `Ok(0)` indicates
    /// the peer closed the connection; `WouldBlock` means the socket is
    /// drained.
    pub fn fill(&mut self) -> std::io::Result<usize> {
        let n = self.read_buffer.read_from(&mut self.stream)?;
        trace!("read {} bytes from {}", n, self.addr);
        Ok(n)
    }

    /// Write the buffered head and the optional body with a single
    /// gathered write. Bytes consume the head first; the caller accounts
    /// for body bytes using the returned count. `Ok(0)` on a non-empty
    /// payload means the peer is gone.
    pub fn writev(&mut self, body: Option<&[u8]>) -> std::io::Result<usize> {
        let head = self.write_buffer.peek();

        let n = match (head.is_empty(), body) {
            (false, Some(body)) => {
                let iovs = [IoSlice::new(head), IoSlice::new(body)];
                self.stream.write_vectored(&iovs)?
            }
            (false, None) => self.stream.write(head)?,
            (true, Some(body)) => self.stream.write(body)?,
            (true, None) => return Ok(0),
        };

        let consumed = n.min(self.write_buffer.readable_bytes());
        self.write_buffer.retrieve(consumed);
        trace!("wrote {} bytes to {}", n, self.addr);
        Ok(n)
    }

    /// Number of head bytes still buffered for write.
    pub fn write_pending(&self) -> usize {
        self.write_buffer.readable_bytes()
    }

    pub fn read_buffer(&self) -> &Buffer {
        &self.read_buffer
    }

    pub fn read_buffer_mut(&mut self) -> &mut Buffer {
        &mut self.read_buffer
    }

    pub fn write_buffer_mut(&mut self) -> &mut Buffer {
        &mut self.write_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn pair() -> (Session, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (stream, peer) = listener.accept().unwrap();
        stream.set_nonblocking(true).unwrap();
        (Session::new(TcpStream::from_std(stream), peer), client)
    }

    #[test]
    fn gathered_write_sends_head_then_body() {
        let (mut session, mut client) = pair();

        session.write_buffer_mut().append(b"HTTP/1.1 200 OK\r\n\r\n");
        assert_eq!(session.write_pending(), 19);

        let n = session.writev(Some(b"hello world!")).unwrap();
        assert_eq!(n, 31);
        assert_eq!(session.write_pending(), 0);

        let mut out = vec![0u8; 31];
        client.read_exact(&mut out).unwrap();
        assert_eq!(&out[..], b"HTTP/1.1 200 OK\r\n\r\nhello world!");
    }

    #[test]
    fn head_only_write() {
        let (mut session, mut client) = pair();

        session.write_buffer_mut().append(b"PONG\r\n");
        let n = session.writev(None).unwrap();
        assert_eq!(n, 6);

        let mut out = vec![0u8; 6];
        client.read_exact(&mut out).unwrap();
        assert_eq!(&out[..], b"PONG\r\n");
    }

    #[test]
    fn fill_reads_what_the_peer_sent() {
        let (mut session, mut client) = pair();
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();

        let n = loop {
            match session.fill() {
                Ok(n) => break n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
                Err(e) => panic!("{}", e),
            }
        };
        assert_eq!(n, 18);
        assert_eq!(session.read_buffer().peek(), b"GET / HTTP/1.1\r\n\r\n");
    }
}

impl Source for Session {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interest: Interest,
    ) -> std::io::Result<()> {
        self.stream.register(registry, token, interest)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interest: Interest,
    ) -> std::io::Result<()> {
        self.stream.reregister(registry, token, interest)
    }

    fn deregister(&mut self, registry: &Registry) -> std::io::Result<()> {
        self.stream.deregister(registry)
    }
}
