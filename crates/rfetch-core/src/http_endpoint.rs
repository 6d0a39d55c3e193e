//! Local HTTP intake endpoint.
//!
//! A small hand-rolled HTTP/1.1 server (same parsing style as the
//! range-server test harness) that lets a browser extension or other local
//! process hand a URL to the download manager without shelling out to the
//! CLI. Runs on a plain `TcpListener`, one thread per connection, no async
//! runtime.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use serde::Deserialize;
use serde_json::json;

use crate::manager::DownloadManager;
use crate::url_model::derive_filename;

/// Default port the endpoint binds to when the config doesn't override it.
pub const DEFAULT_PORT: u16 = 8765;

#[derive(Debug, Deserialize)]
struct IntakeRequest {
    url: Option<String>,
    filename: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    threads_per_proxy: Option<usize>,
}

/// Binds `0.0.0.0:port` and serves requests until the process exits. Spawns
/// one thread per accepted connection; never returns on success.
pub fn serve(manager: Arc<DownloadManager>, port: u16) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    tracing::info!("local HTTP endpoint listening on 0.0.0.0:{port}");
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!("accept failed: {err}");
                continue;
            }
        };
        let manager = Arc::clone(&manager);
        thread::spawn(move || handle_connection(stream, &manager));
    }
    Ok(())
}

/// Spawns `serve` on a background thread. Returns immediately; logs and
/// gives up (without panicking the caller) if the port can't be bound.
pub fn spawn(manager: Arc<DownloadManager>, port: u16) {
    thread::spawn(move || {
        if let Err(err) = serve(manager, port) {
            tracing::error!("local HTTP endpoint failed to start on port {port}: {err}");
        }
    });
}

struct Request {
    method: String,
    path: String,
    body: Vec<u8>,
}

fn handle_connection(mut stream: TcpStream, manager: &DownloadManager) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(5)));

    let request = match read_request(&mut stream) {
        Some(r) => r,
        None => return,
    };

    let response = route(&request, manager);
    let _ = stream.write_all(&response);
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut buf = Vec::with_capacity(8192);
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > 1_048_576 {
            return None;
        }
    };

    let header_text = std::str::from_utf8(&buf[..header_end]).ok()?;
    let mut lines = header_text.split("\r\n");
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut content_length = 0usize;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let body_start = header_end + 4;
    let mut body = buf.split_off(body_start.min(buf.len()));
    while body.len() < content_length {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Some(Request { method, path, body })
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn route(request: &Request, manager: &DownloadManager) -> Vec<u8> {
    if request.method.eq_ignore_ascii_case("OPTIONS") {
        return respond(200, "OK", &[], &cors_headers());
    }

    if request.method.eq_ignore_ascii_case("GET") && request.path == "/ping" {
        let body = json!({"status": "ok", "message": "Server is running"}).to_string();
        return respond(200, "OK", body.as_bytes(), &cors_headers());
    }

    if request.method.eq_ignore_ascii_case("POST") && request.path == "/" {
        return handle_intake(&request.body, manager);
    }

    let body = json!({"status": "error", "message": "not found"}).to_string();
    respond(404, "Not Found", body.as_bytes(), &cors_headers())
}

fn handle_intake(body: &[u8], manager: &DownloadManager) -> Vec<u8> {
    let parsed: Result<IntakeRequest, _> = serde_json::from_slice(body);
    let intake = match parsed {
        Ok(i) => i,
        Err(_) => {
            let body = json!({"status": "error", "message": "invalid JSON body"}).to_string();
            return respond(400, "Bad Request", body.as_bytes(), &cors_headers());
        }
    };

    let url = match intake.url.filter(|u| !u.is_empty()) {
        Some(u) => u,
        None => {
            let body = json!({"status": "error", "message": "missing required field: url"}).to_string();
            return respond(400, "Bad Request", body.as_bytes(), &cors_headers());
        }
    };

    let reported_filename = intake
        .filename
        .clone()
        .unwrap_or_else(|| derive_filename(&url, None));

    match manager.add_task(url, intake.filename, None, None, false, None, intake.threads_per_proxy) {
        Ok(task_id) => {
            let body = json!({
                "status": "success",
                "message": "download registered",
                "task_id": task_id,
                "filename": reported_filename,
            })
            .to_string();
            respond(200, "OK", body.as_bytes(), &cors_headers())
        }
        Err(err) => {
            let body = json!({"status": "error", "message": err.to_string()}).to_string();
            respond(500, "Internal Server Error", body.as_bytes(), &cors_headers())
        }
    }
}

fn cors_headers() -> String {
    "Access-Control-Allow-Origin: *\r\n\
     Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
     Access-Control-Allow-Headers: Content-Type\r\n"
        .to_string()
}

fn respond(status: u16, reason: &str, body: &[u8], extra_headers: &str) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n{extra_headers}\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body);
    response
}
