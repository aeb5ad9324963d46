// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A growable byte buffer backed by a contiguous region with separate read
//! and write cursors. The readable region is `[r, w)`, the writable region
//! is `[w, cap)`, and `[0, r)` is prependable space which is reclaimed by
//! sliding the readable bytes back to the origin.
//!
//! `read_from` performs a single scatter read: one vectored syscall filling
//! the writable region and a stack-allocated overflow segment, so a large
//! read does not require growing the buffer before its size is known.

pub use bytes::buf::UninitSlice;
pub use bytes::{Buf, BufMut};

use std::io::{IoSliceMut, Read, Write};

/// Size of the stack overflow segment used by `read_from`. Large enough to
/// absorb a full-sized request in one syscall without pre-growing the
/// buffer.
const EXTRA_BUF_SIZE: usize = 64 * 1024;

const DEFAULT_CAPACITY: usize = 1024;

/// A simple growable byte buffer with a read cursor and a write cursor.
pub struct Buffer {
    buf: Vec<u8>,
    read_index: usize,
    write_index: usize,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Buffer {
    /// Create a new buffer with the given initial capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            read_index: 0,
            write_index: 0,
        }
    }

    /// Number of bytes which may be read: `w - r`.
    pub fn readable_bytes(&self) -> usize {
        self.write_index - self.read_index
    }

    /// Number of bytes which may be written without growing: `cap - w`.
    pub fn writable_bytes(&self) -> usize {
        self.buf.len() - self.write_index
    }

    /// Number of bytes in front of the read cursor: `r`.
    pub fn prependable_bytes(&self) -> usize {
        self.read_index
    }

    /// Borrow the readable region.
    pub fn peek(&self) -> &[u8] {
        &self.buf[self.read_index..self.write_index]
    }

    /// Consume `len` readable bytes. Consuming everything resets both
    /// cursors to the origin.
    pub fn retrieve(&mut self, len: usize) {
        if len < self.readable_bytes() {
            self.read_index += len;
        } else {
            self.retrieve_all();
        }
    }

    /// Consume readable bytes up to `end`, an offset within the readable
    /// region as returned by searching `peek()`.
    pub fn retrieve_until(&mut self, end: usize) {
        assert!(end <= self.readable_bytes());
        self.retrieve(end);
    }

    /// Reset both cursors. The contents are not zeroed; subsequent writes
    /// overwrite them.
    pub fn retrieve_all(&mut self) {
        self.read_index = 0;
        self.write_index = 0;
    }

    /// Consume the entire readable region and return it as a string.
    pub fn retrieve_all_to_string(&mut self) -> String {
        let s = String::from_utf8_lossy(self.peek()).into_owned();
        self.retrieve_all();
        s
    }

    /// Append bytes to the buffer, growing it if needed.
    pub fn append(&mut self, data: &[u8]) {
        self.ensure_writable(data.len());
        self.buf[self.write_index..self.write_index + data.len()].copy_from_slice(data);
        self.has_written(data.len());
    }

    /// Advance the write cursor after writing directly into the writable
    /// region.
    pub fn has_written(&mut self, len: usize) {
        assert!(len <= self.writable_bytes());
        self.write_index += len;
    }

    /// Guarantee at least `len` writable bytes. When the prependable and
    /// writable space together suffices, the readable bytes slide back to
    /// the origin; otherwise the buffer grows to `w + len + 1`.
    pub fn ensure_writable(&mut self, len: usize) {
        if self.writable_bytes() >= len {
            return;
        }
        if self.writable_bytes() + self.prependable_bytes() >= len {
            let readable = self.readable_bytes();
            self.buf.copy_within(self.read_index..self.write_index, 0);
            self.read_index = 0;
            self.write_index = readable;
        } else {
            self.buf.resize(self.write_index + len + 1, 0);
        }
        assert!(self.writable_bytes() >= len);
    }

    /// Read from `src` with a single vectored call: the writable region
    /// first, then a stack overflow segment which is appended afterwards.
    /// Short reads are normal and surface through the return value; `Ok(0)`
    /// means the source reached end-of-stream.
    pub fn read_from<T: Read>(&mut self, src: &mut T) -> std::io::Result<usize> {
        let mut extra = [0u8; EXTRA_BUF_SIZE];
        let writable = self.writable_bytes();

        let n = {
            let (_, tail) = self.buf.split_at_mut(self.write_index);
            let mut iovs = [IoSliceMut::new(tail), IoSliceMut::new(&mut extra)];
            src.read_vectored(&mut iovs)?
        };

        if n <= writable {
            self.write_index += n;
        } else {
            self.write_index = self.buf.len();
            self.append(&extra[..n - writable]);
        }
        Ok(n)
    }

    /// Write the readable region to `dst` with a single plain write and
    /// consume whatever was accepted.
    pub fn write_to<T: Write>(&mut self, dst: &mut T) -> std::io::Result<usize> {
        let n = dst.write(self.peek())?;
        self.retrieve(n);
        Ok(n)
    }
}

impl Buf for Buffer {
    fn remaining(&self) -> usize {
        self.readable_bytes()
    }

    fn chunk(&self) -> &[u8] {
        self.peek()
    }

    fn advance(&mut self, cnt: usize) {
        self.retrieve(cnt);
    }
}

unsafe impl BufMut for Buffer {
    fn remaining_mut(&self) -> usize {
        self.writable_bytes()
    }

    unsafe fn advance_mut(&mut self, cnt: usize) {
        self.has_written(cnt);
    }

    fn chunk_mut(&mut self) -> &mut UninitSlice {
        let w = self.write_index;
        (&mut self.buf[w..]).into()
    }

    fn put<T: Buf>(&mut self, mut src: T)
    where
        Self: Sized,
    {
        while src.has_remaining() {
            let chunk = src.chunk();
            let len = chunk.len();
            self.put_slice(chunk);
            src.advance(len);
        }
    }

    fn put_slice(&mut self, src: &[u8]) {
        self.append(src);
    }
}
