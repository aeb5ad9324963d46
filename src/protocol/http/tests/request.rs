// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use authstore::UserStore;
use buffer::Buffer;
use protocol_http::{ParseResult, Request};
use std::sync::Mutex;

/// Records verification calls and answers with a fixed verdict.
struct StubStore {
    accept: bool,
    calls: Mutex<Vec<(String, String, bool)>>,
}

impl StubStore {
    fn new(accept: bool) -> Self {
        Self {
            accept,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(String, String, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

impl UserStore for StubStore {
    fn verify(&self, name: &str, pwd: &str, is_login: bool) -> bool {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), pwd.to_string(), is_login));
        self.accept
    }
}

fn feed(data: &[u8]) -> (Request, ParseResult, Buffer) {
    let store = StubStore::new(true);
    let mut buff = Buffer::default();
    buff.append(data);
    let mut request = Request::new();
    let result = request.parse(&mut buff, &store);
    (request, result, buff)
}

#[test]
fn parse_get_root() {
    let (request, result, buff) = feed(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(result, ParseResult::Complete);
    assert_eq!(request.method(), "GET");
    assert_eq!(request.path(), "/index.html");
    assert_eq!(request.version(), "1.1");
    assert_eq!(request.header("Host"), Some("x"));
    assert!(!request.is_keep_alive());
    // the terminating CRLF was consumed
    assert_eq!(buff.readable_bytes(), 0);
}

#[test]
fn parse_keep_alive() {
    let (request, result, _) =
        feed(b"GET /missing HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n");
    assert_eq!(result, ParseResult::Complete);
    assert_eq!(request.path(), "/missing");
    assert!(request.is_keep_alive());
}

#[test]
fn keep_alive_needs_http_11() {
    let (request, result, _) =
        feed(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n");
    assert_eq!(result, ParseResult::Complete);
    assert!(!request.is_keep_alive());
}

#[test]
fn default_pages_get_html_suffix() {
    for (path, expected) in [
        ("/login", "/login.html"),
        ("/register", "/register.html"),
        ("/welcome", "/welcome.html"),
        ("/video", "/video.html"),
        ("/picture", "/picture.html"),
        ("/other", "/other"),
    ] {
        let data = format!("GET {} HTTP/1.1\r\nHost: x\r\n\r\n", path);
        let (request, result, _) = feed(data.as_bytes());
        assert_eq!(result, ParseResult::Complete);
        assert_eq!(request.path(), expected);
    }
}

#[test]
fn garbage_request_line_is_bad() {
    let (_, result, _) = feed(b"XYZ\r\n\r\n");
    assert_eq!(result, ParseResult::Bad);

    let (_, result, _) = feed(b"GET /index.html\r\n\r\n");
    assert_eq!(result, ParseResult::Bad);

    let (_, result, _) = feed(b"GET /index.html FTP/1.1\r\n\r\n");
    assert_eq!(result, ParseResult::Bad);
}

#[test]
// headers may span reads: the parser consumes complete lines only and
// picks up where it left off
fn headers_span_two_reads() {
    let store = StubStore::new(true);
    let mut buff = Buffer::default();
    let mut request = Request::new();

    buff.append(b"GET / HTTP/1.1\r\nHos");
    assert_eq!(request.parse(&mut buff, &store), ParseResult::Partial);
    // the partial header line stays in the buffer
    assert_eq!(buff.readable_bytes(), 3);

    buff.append(b"t: x\r\nConnection: keep-alive\r\n\r\n");
    assert_eq!(request.parse(&mut buff, &store), ParseResult::Complete);
    assert_eq!(request.header("Host"), Some("x"));
    assert!(request.is_keep_alive());
}

#[test]
fn post_login_success_rewrites_to_welcome() {
    let store = StubStore::new(true);
    let mut buff = Buffer::default();
    buff.append(
        b"POST /login.html HTTP/1.1\r\n\
          Host: x\r\n\
          Content-Type: application/x-www-form-urlencoded\r\n\
          Content-Length: 29\r\n\
          \r\n\
          username=alice&password=se+cr",
    );

    let mut request = Request::new();
    assert_eq!(request.parse(&mut buff, &store), ParseResult::Complete);
    assert_eq!(request.path(), "/welcome.html");
    assert_eq!(request.form_value("username"), Some("alice"));
    assert_eq!(request.form_value("password"), Some("se cr"));
    assert_eq!(
        store.calls(),
        vec![("alice".to_string(), "se cr".to_string(), true)]
    );
}

#[test]
fn post_register_failure_rewrites_to_error() {
    let store = StubStore::new(false);
    let mut buff = Buffer::default();
    buff.append(
        b"POST /register.html HTTP/1.1\r\n\
          Host: x\r\n\
          Content-Type: application/x-www-form-urlencoded\r\n\
          Content-Length: 25\r\n\
          \r\n\
          username=alice&password=x",
    );

    let mut request = Request::new();
    assert_eq!(request.parse(&mut buff, &store), ParseResult::Complete);
    assert_eq!(request.path(), "/error.html");
    assert_eq!(
        store.calls(),
        vec![("alice".to_string(), "x".to_string(), false)]
    );
}

#[test]
fn post_without_form_content_type_skips_verification() {
    let store = StubStore::new(true);
    let mut buff = Buffer::default();
    buff.append(
        b"POST /login.html HTTP/1.1\r\n\
          Host: x\r\n\
          Content-Type: text/plain\r\n\
          \r\n\
          whatever",
    );

    let mut request = Request::new();
    assert_eq!(request.parse(&mut buff, &store), ParseResult::Complete);
    assert_eq!(request.path(), "/login.html");
    assert!(store.calls().is_empty());
}

#[test]
fn url_decoding() {
    let store = StubStore::new(true);
    let mut buff = Buffer::default();
    buff.append(
        b"POST /login.html HTTP/1.1\r\n\
          Content-Type: application/x-www-form-urlencoded\r\n\
          \r\n\
          username=a+b%20c&password=%41%6fk",
    );

    let mut request = Request::new();
    assert_eq!(request.parse(&mut buff, &store), ParseResult::Complete);
    assert_eq!(request.form_value("username"), Some("a b c"));
    assert_eq!(request.form_value("password"), Some("Aok"));
}

#[test]
fn init_resets_for_next_request() {
    let store = StubStore::new(true);
    let mut buff = Buffer::default();
    buff.append(b"GET /login HTTP/1.1\r\nConnection: keep-alive\r\n\r\n");

    let mut request = Request::new();
    assert_eq!(request.parse(&mut buff, &store), ParseResult::Complete);
    assert_eq!(request.path(), "/login.html");

    request.init();
    buff.append(b"GET /video HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(request.parse(&mut buff, &store), ParseResult::Complete);
    assert_eq!(request.path(), "/video.html");
    assert!(!request.is_keep_alive());
}
