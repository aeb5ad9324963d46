// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use buffer::Buffer;
use protocol_http::Response;
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

fn resource_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "hello world!").unwrap();
    std::fs::write(dir.path().join("404.html"), "<html>missing</html>").unwrap();
    std::fs::write(dir.path().join("403.html"), "<html>forbidden</html>").unwrap();
    std::fs::write(dir.path().join("400.html"), "<html>bad</html>").unwrap();
    dir
}

#[test]
fn ok_response_headers_and_mapped_body() {
    let dir = resource_dir();
    let mut response = Response::new();
    let mut buff = Buffer::default();

    response.init(dir.path(), "/index.html", false, Some(200));
    response.make_response(&mut buff);

    assert_eq!(response.code(), 200);
    assert_eq!(
        buff.retrieve_all_to_string(),
        "HTTP/1.1 200 OK\r\n\
         Connection: close\r\n\
         Content-type: text/html\r\n\
         Content-length: 12\r\n\r\n"
    );
    // the body is the mapping, not part of the buffered head
    assert_eq!(response.file(), Some(&b"hello world!"[..]));
    assert_eq!(response.file_len(), 12);
}

#[test]
fn missing_file_serves_error_page_with_keep_alive() {
    let dir = resource_dir();
    let mut response = Response::new();
    let mut buff = Buffer::default();

    response.init(dir.path(), "/missing", true, Some(200));
    response.make_response(&mut buff);

    assert_eq!(response.code(), 404);
    let head = buff.retrieve_all_to_string();
    assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(head.contains("Connection: keep-alive\r\n"));
    assert!(head.contains("Keep-Alive: max=6, timeout=120\r\n"));
    assert!(head.contains("Content-length: 20\r\n"));
    assert_eq!(response.file(), Some(&b"<html>missing</html>"[..]));
}

#[test]
fn directory_is_not_found() {
    let dir = resource_dir();
    std::fs::create_dir(dir.path().join("subdir")).unwrap();
    let mut response = Response::new();
    let mut buff = Buffer::default();

    response.init(dir.path(), "/subdir", false, Some(200));
    response.make_response(&mut buff);
    assert_eq!(response.code(), 404);
}

#[test]
fn unreadable_file_is_forbidden() {
    let dir = resource_dir();
    let secret = dir.path().join("secret.html");
    std::fs::write(&secret, "top secret").unwrap();
    std::fs::set_permissions(&secret, std::fs::Permissions::from_mode(0o600)).unwrap();

    let mut response = Response::new();
    let mut buff = Buffer::default();
    response.init(dir.path(), "/secret.html", false, Some(200));
    response.make_response(&mut buff);

    assert_eq!(response.code(), 403);
    assert_eq!(response.file(), Some(&b"<html>forbidden</html>"[..]));
}

#[test]
fn preset_error_code_is_kept() {
    let dir = resource_dir();
    let mut response = Response::new();
    let mut buff = Buffer::default();

    // a parse failure initializes with 400 and an empty path; the stat of
    // the resource root must not reclassify it
    response.init(dir.path(), "", false, Some(400));
    response.make_response(&mut buff);

    assert_eq!(response.code(), 400);
    let head = buff.retrieve_all_to_string();
    assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(head.contains("Connection: close\r\n"));
    assert_eq!(response.file(), Some(&b"<html>bad</html>"[..]));
}

#[test]
fn inline_error_body_when_no_error_page() {
    let dir = tempfile::tempdir().unwrap();
    let mut response = Response::new();
    let mut buff = Buffer::default();

    response.init(dir.path(), "/nothing", false, Some(200));
    response.make_response(&mut buff);

    assert_eq!(response.code(), 404);
    assert!(response.file().is_none());
    let out = buff.retrieve_all_to_string();
    let body_at = out.find("\r\n\r\n").unwrap() + 4;
    let (head, body) = out.split_at(body_at);
    assert!(head.contains(&format!("Content-length: {}\r\n", body.len())));
    assert!(body.contains("404 : Not Found"));
    assert!(body.contains("File NotFound!"));
}

#[test]
fn mime_table() {
    let dir = resource_dir();
    for (name, content_type) in [
        ("style.css", "text/css"),
        ("app.js", "text/javascript"),
        ("photo.jpeg", "image/jpeg"),
        ("archive.tar", "application/x-tar"),
        ("notes.txt", "text/plain"),
        ("unknown.zzz", "text/plain"),
        ("no_suffix", "text/plain"),
    ] {
        std::fs::write(dir.path().join(name), "x").unwrap();
        let mut response = Response::new();
        let mut buff = Buffer::default();
        response.init(dir.path(), &format!("/{}", name), false, Some(200));
        response.make_response(&mut buff);
        let head = buff.retrieve_all_to_string();
        assert!(
            head.contains(&format!("Content-type: {}\r\n", content_type)),
            "{} should be {}",
            name,
            content_type
        );
    }
}

#[test]
fn empty_file_has_no_mapping() {
    let dir = resource_dir();
    std::fs::write(dir.path().join("empty.html"), "").unwrap();

    let mut response = Response::new();
    let mut buff = Buffer::default();
    response.init(dir.path(), "/empty.html", false, Some(200));
    response.make_response(&mut buff);

    assert_eq!(response.code(), 200);
    assert!(response.file().is_none());
    assert!(buff
        .retrieve_all_to_string()
        .contains("Content-length: 0\r\n\r\n"));
}

#[test]
fn reinit_releases_mapping() {
    let dir = resource_dir();
    let mut response = Response::new();
    let mut buff = Buffer::default();

    response.init(dir.path(), "/index.html", false, Some(200));
    response.make_response(&mut buff);
    assert!(response.file().is_some());

    response.init(dir.path(), "/index.html", false, Some(200));
    assert!(response.file().is_none());

    response.make_response(&mut buff);
    response.unmap();
    assert!(response.file().is_none());
}
