// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use buffer::Buffer;
use memmap2::Mmap;
use phf::{phf_map, Map};
use std::fs::File;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

static SUFFIX_TYPE: Map<&'static str, &'static str> = phf_map! {
    ".html" => "text/html",
    ".xml" => "text/xml",
    ".xhtml" => "application/xhtml+xml",
    ".txt" => "text/plain",
    ".rtf" => "application/rtf",
    ".pdf" => "application/pdf",
    ".word" => "application/nsword",
    ".png" => "image/png",
    ".gif" => "image/gif",
    ".jpg" => "image/jpeg",
    ".jpeg" => "image/jpeg",
    ".au" => "audio/basic",
    ".mpeg" => "video/mpeg",
    ".mpg" => "video/mpeg",
    ".avi" => "video/x-msvideo",
    ".gz" => "application/x-gzip",
    ".tar" => "application/x-tar",
    ".css" => "text/css",
    ".js" => "text/javascript",
};

static CODE_STATUS: Map<u16, &'static str> = phf_map! {
    200u16 => "OK",
    400u16 => "Bad Request",
    403u16 => "Forbidden",
    404u16 => "Not Found",
};

static CODE_PATH: Map<u16, &'static str> = phf_map! {
    400u16 => "/400.html",
    403u16 => "/403.html",
    404u16 => "/404.html",
};

/// Permission bit for world-readable files; anything without it is refused.
const WORLD_READABLE: u32 = 0o004;

/// Builds a response for a resolved request path: status line and headers
/// go into the write buffer, the file body is exposed as a read-only
/// memory mapping to be gathered into the socket write without copying.
pub struct Response {
    code: Option<u16>,
    keep_alive: bool,
    src_dir: PathBuf,
    path: String,
    mmap: Option<Mmap>,
    file_size: u64,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            code: None,
            keep_alive: false,
            src_dir: PathBuf::new(),
            path: String::new(),
            mmap: None,
            file_size: 0,
        }
    }

    /// Reset for a new exchange. Any previous mapping is released here.
    pub fn init(&mut self, src_dir: &Path, path: &str, keep_alive: bool, code: Option<u16>) {
        self.unmap();
        self.code = code;
        self.keep_alive = keep_alive;
        self.src_dir = src_dir.to_path_buf();
        self.path = path.to_string();
        self.file_size = 0;
    }

    pub fn code(&self) -> u16 {
        self.code.unwrap_or(200)
    }

    /// The mapped response body, when there is one.
    pub fn file(&self) -> Option<&[u8]> {
        self.mmap.as_deref()
    }

    pub fn file_len(&self) -> usize {
        self.mmap.as_ref().map_or(0, |m| m.len())
    }

    /// Release the mapping. Idempotent; also called from `init`.
    pub fn unmap(&mut self) {
        self.mmap = None;
    }

    /// Resolve the target file and append the status line and headers to
    /// `buff`. The body either becomes a memory mapping or, for error
    /// synthesis, is appended inline.
    pub fn make_response(&mut self, buff: &mut Buffer) {
        // a code pre-set to an error skips classification; the target of
        // the stat is the error page chosen below
        if matches!(self.code, None | Some(200)) {
            match std::fs::metadata(self.full_path()) {
                Err(_) => self.code = Some(404),
                Ok(meta) if meta.is_dir() => self.code = Some(404),
                Ok(meta) if meta.permissions().mode() & WORLD_READABLE == 0 => {
                    self.code = Some(403)
                }
                Ok(meta) => {
                    self.file_size = meta.len();
                    if self.code.is_none() {
                        self.code = Some(200);
                    }
                }
            }
        }
        self.error_html();
        self.add_status_line(buff);
        self.add_headers(buff);
        self.add_content(buff);
    }

    fn full_path(&self) -> PathBuf {
        PathBuf::from(format!("{}{}", self.src_dir.display(), self.path))
    }

    /// Error codes respond with the corresponding error page.
    fn error_html(&mut self) {
        let code = self.code.unwrap_or(200);
        if let Some(path) = CODE_PATH.get(&code) {
            self.path = path.to_string();
            self.file_size = std::fs::metadata(self.full_path()).map_or(0, |meta| meta.len());
        }
    }

    fn add_status_line(&mut self, buff: &mut Buffer) {
        let code = self.code.unwrap_or(200);
        let status = match CODE_STATUS.get(&code) {
            Some(status) => status,
            None => {
                self.code = Some(400);
                CODE_STATUS.get(&400).unwrap()
            }
        };
        buff.append(format!("HTTP/1.1 {} {}\r\n", self.code.unwrap(), status).as_bytes());
    }

    fn add_headers(&mut self, buff: &mut Buffer) {
        buff.append(b"Connection: ");
        if self.keep_alive {
            buff.append(b"keep-alive\r\n");
            buff.append(b"Keep-Alive: max=6, timeout=120\r\n");
        } else {
            buff.append(b"close\r\n");
        }
        buff.append(format!("Content-type: {}\r\n", self.file_type()).as_bytes());
    }

    fn add_content(&mut self, buff: &mut Buffer) {
        let path = self.full_path();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(_) => {
                self.error_content(buff, "File NotFound!");
                return;
            }
        };

        debug!("file path {}", path.display());
        if self.file_size > 0 {
            // the mapping is the response body; it rides the second iovec
            // of the socket write and stays alive until unmap
            match unsafe { Mmap::map(&file) } {
                Ok(mmap) => self.mmap = Some(mmap),
                Err(_) => {
                    self.code = Some(404);
                    self.error_content(buff, "File NotFound!");
                    return;
                }
            }
        }
        buff.append(format!("Content-length: {}\r\n\r\n", self.file_size).as_bytes());
    }

    fn file_type(&self) -> &'static str {
        match self.path.rfind('.') {
            Some(idx) => SUFFIX_TYPE
                .get(&self.path[idx..])
                .copied()
                .unwrap_or("text/plain"),
            None => "text/plain",
        }
    }

    /// Synthesize an inline error body when no error page can be served.
    pub fn error_content(&self, buff: &mut Buffer, message: &str) {
        let code = self.code.unwrap_or(400);
        let status = CODE_STATUS.get(&code).copied().unwrap_or("Bad Request");

        let mut body = String::new();
        body.push_str("<html><title>Error</title>");
        body.push_str("<body bgcolor=\"ffffff\">");
        body.push_str(&format!("{} : {}\n", code, status));
        body.push_str(&format!("<p>{}</p>", message));
        body.push_str("<hr><em>petrel</em></body></html>");

        buff.append(format!("Content-length: {}\r\n\r\n", body.len()).as_bytes());
        buff.append(body.as_bytes());
    }
}
