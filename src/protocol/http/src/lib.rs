// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! HTTP/1.1 protocol support for serving static files: an incremental
//! line-oriented request parser which consumes bytes from a read buffer as
//! lines complete, and a response builder which resolves the request path
//! against a resource root and exposes the file as a memory mapping to be
//! gathered into the socket write alongside the buffered header.

#[macro_use]
extern crate log;

mod request;
mod response;

pub use request::{ParseResult, Request};
pub use response::Response;
