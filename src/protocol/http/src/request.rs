// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use authstore::UserStore;
use buffer::Buffer;
use std::collections::HashMap;

/// Paths which resolve to a default page when requested without the
/// `.html` suffix.
const DEFAULT_HTML: &[&str] = &[
    "/index",
    "/register",
    "/login",
    "/welcome",
    "/video",
    "/picture",
];

const CRLF: &[u8] = b"\r\n";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ParseState {
    RequestLine,
    Headers,
    Body,
    Finish,
}

/// Outcome of feeding the parser.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ParseResult {
    /// A usable request was parsed.
    Complete,
    /// A line has not fully arrived; feed more bytes and try again.
    Partial,
    /// The request line was malformed.
    Bad,
}

/// An incrementally parsed HTTP/1.1 request. State survives partial reads;
/// complete lines are consumed from the buffer as they are recognized.
pub struct Request {
    state: ParseState,
    method: String,
    path: String,
    version: String,
    body: String,
    headers: HashMap<String, String>,
    form: HashMap<String, String>,
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    pub fn new() -> Self {
        Self {
            state: ParseState::RequestLine,
            method: String::new(),
            path: String::new(),
            version: String::new(),
            body: String::new(),
            headers: HashMap::new(),
            form: HashMap::new(),
        }
    }

    /// Reset to the initial state for the next request on a kept-alive
    /// connection.
    pub fn init(&mut self) {
        self.state = ParseState::RequestLine;
        self.method.clear();
        self.path.clear();
        self.version.clear();
        self.body.clear();
        self.headers.clear();
        self.form.clear();
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form.get(key).map(|v| v.as_str())
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|v| v.as_str())
    }

    /// A connection is kept alive when the client asked for it and speaks
    /// HTTP/1.1.
    pub fn is_keep_alive(&self) -> bool {
        self.headers.get("Connection").map(|v| v.as_str()) == Some("keep-alive")
            && self.version == "1.1"
    }

    /// Drive the state machine over the readable bytes, consuming complete
    /// lines. Login and registration run against `store` while the body is
    /// parsed.
    pub fn parse(&mut self, buff: &mut Buffer, store: &dyn UserStore) -> ParseResult {
        while self.state != ParseState::Finish {
            match self.state {
                ParseState::RequestLine => {
                    let Some(end) = find_crlf(buff.peek()) else {
                        return ParseResult::Partial;
                    };
                    let line = String::from_utf8_lossy(&buff.peek()[..end]).into_owned();
                    if !self.parse_request_line(&line) {
                        error!("RequestLine error: {:?}", line);
                        return ParseResult::Bad;
                    }
                    buff.retrieve_until(end + 2);
                    self.parse_path();
                }
                ParseState::Headers => {
                    let Some(end) = find_crlf(buff.peek()) else {
                        return ParseResult::Partial;
                    };
                    let line = String::from_utf8_lossy(&buff.peek()[..end]).into_owned();
                    let matched = self.parse_header(&line);
                    buff.retrieve_until(end + 2);
                    if matched {
                        // only the request terminator remains: the header
                        // section is over and there is no body
                        if buff.readable_bytes() <= 2 {
                            if buff.peek() == CRLF {
                                buff.retrieve(2);
                            }
                            self.state = ParseState::Finish;
                        }
                    } else {
                        self.state = ParseState::Body;
                    }
                }
                ParseState::Body => {
                    // whatever has arrived is taken as the whole body
                    let body = buff.retrieve_all_to_string();
                    self.parse_body(body, store);
                }
                ParseState::Finish => {}
            }
        }
        debug!("[{}], [{}], [{}]", self.method, self.path, self.version);
        ParseResult::Complete
    }

    fn parse_request_line(&mut self, line: &str) -> bool {
        // ^([^ ]+) ([^ ]+) HTTP/([^ ]+)$
        let mut parts = line.splitn(3, ' ');
        let (method, path, tail) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(p), Some(t)) => (m, p, t),
            _ => return false,
        };
        let version = match tail.strip_prefix("HTTP/") {
            Some(v) => v,
            None => return false,
        };
        if method.is_empty() || path.is_empty() || version.is_empty() || version.contains(' ') {
            return false;
        }

        self.method = method.to_string();
        self.path = path.to_string();
        self.version = version.to_string();
        self.state = ParseState::Headers;
        true
    }

    fn parse_path(&mut self) {
        if self.path == "/" {
            self.path = "/index.html".to_string();
        } else if DEFAULT_HTML.contains(&self.path.as_str()) {
            self.path.push_str(".html");
        }
    }

    /// Returns false when the line is not a header, which ends the header
    /// section.
    fn parse_header(&mut self, line: &str) -> bool {
        // ^([^:]+): ?(.*)$
        let Some((key, value)) = line.split_once(':') else {
            return false;
        };
        if key.is_empty() {
            return false;
        }
        let value = value.strip_prefix(' ').unwrap_or(value);
        self.headers.insert(key.to_string(), value.to_string());
        true
    }

    fn parse_body(&mut self, body: String, store: &dyn UserStore) {
        debug!("body: {}, len: {}", body, body.len());
        self.body = body;
        self.parse_post(store);
        self.state = ParseState::Finish;
    }

    fn parse_post(&mut self, store: &dyn UserStore) {
        if self.method != "POST"
            || self.headers.get("Content-Type").map(|v| v.as_str())
                != Some("application/x-www-form-urlencoded")
        {
            return;
        }
        self.parse_form_urlencoded();

        let is_login = match self.path.as_str() {
            "/register.html" => false,
            "/login.html" => true,
            _ => return,
        };

        let name = self.form.get("username").cloned().unwrap_or_default();
        let pwd = self.form.get("password").cloned().unwrap_or_default();
        if store.verify(&name, &pwd, is_login) {
            self.path = "/welcome.html".to_string();
        } else {
            self.path = "/error.html".to_string();
        }
    }

    /// Decode `&`-separated `key=value` pairs: `+` is a space and `%HH` is
    /// a byte from two hex digits.
    fn parse_form_urlencoded(&mut self) {
        if self.body.is_empty() {
            return;
        }

        let bytes = self.body.as_bytes().to_vec();
        let mut token: Vec<u8> = Vec::new();
        let mut key: Option<String> = None;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'=' if key.is_none() => {
                    key = Some(String::from_utf8_lossy(&token).into_owned());
                    token.clear();
                }
                b'+' => token.push(b' '),
                b'%' if i + 2 < bytes.len() => {
                    token.push(conv_hex(bytes[i + 1]) * 16 + conv_hex(bytes[i + 2]));
                    i += 2;
                }
                b'&' => {
                    if let Some(key) = key.take() {
                        let value = String::from_utf8_lossy(&token).into_owned();
                        debug!("{} = {}", key, value);
                        self.form.insert(key, value);
                    }
                    token.clear();
                }
                ch => token.push(ch),
            }
            i += 1;
        }

        // trailing pair without a terminating '&'
        if let Some(key) = key {
            if !self.form.contains_key(&key) {
                let value = String::from_utf8_lossy(&token).into_owned();
                self.form.insert(key, value);
            }
        }
    }
}

fn conv_hex(ch: u8) -> u8 {
    match ch {
        b'0'..=b'9' => ch - b'0',
        b'A'..=b'F' => ch - b'A' + 10,
        b'a'..=b'f' => ch - b'a' + 10,
        _ => 0,
    }
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|pair| pair == CRLF)
}
