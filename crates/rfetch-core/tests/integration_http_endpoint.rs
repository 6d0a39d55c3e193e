//! Integration test: the local HTTP intake endpoint end to end over a real
//! TCP connection, registering a task that the Manager can then see.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use rfetch_core::http_endpoint;
use rfetch_core::manager::DownloadManager;
use tempfile::{tempdir, TempDir};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn isolated_manager() -> (Arc<DownloadManager>, TempDir, MutexGuard<'static, ()>) {
    let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let xdg_home = tempdir().unwrap();
    std::env::set_var("XDG_CONFIG_HOME", xdg_home.path());
    std::env::set_var("XDG_STATE_HOME", xdg_home.path());
    let manager = DownloadManager::load().expect("load manager");
    (manager, xdg_home, guard)
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn send_request(addr: SocketAddr, raw: &str) -> String {
    let mut attempts = 0;
    loop {
        match TcpStream::connect(addr) {
            Ok(mut stream) => {
                stream.write_all(raw.as_bytes()).unwrap();
                stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
                let mut buf = Vec::new();
                let _ = stream.read_to_end(&mut buf);
                return String::from_utf8_lossy(&buf).into_owned();
            }
            Err(_) if attempts < 50 => {
                attempts += 1;
                thread::sleep(Duration::from_millis(20));
            }
            Err(e) => panic!("failed to connect to endpoint: {e}"),
        }
    }
}

#[test]
fn ping_over_real_socket_returns_ok() {
    let (manager, _xdg_home, _guard) = isolated_manager();
    let port = free_port();
    thread::spawn({
        let manager = Arc::clone(&manager);
        move || {
            let _ = http_endpoint::serve(manager, port);
        }
    });

    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let response = send_request(addr, "GET /ping HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("\"status\":\"ok\""));
}

#[test]
fn post_registers_task_visible_to_manager() {
    let (manager, _xdg_home, _guard) = isolated_manager();
    let port = free_port();
    thread::spawn({
        let manager = Arc::clone(&manager);
        move || {
            let _ = http_endpoint::serve(manager, port);
        }
    });

    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let body = r#"{"url":"https://example.com/payload.bin"}"#;
    let request = format!(
        "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let response = send_request(addr, &request);
    assert!(response.starts_with("HTTP/1.1 200 OK"), "response: {response}");
    assert!(response.contains("\"status\":\"success\""));

    let tasks = manager.get_all_tasks();
    assert_eq!(tasks.len(), 1, "task registered through the HTTP endpoint should be visible");
}

#[test]
fn post_without_url_returns_400() {
    let (manager, _xdg_home, _guard) = isolated_manager();
    let port = free_port();
    thread::spawn({
        let manager = Arc::clone(&manager);
        move || {
            let _ = http_endpoint::serve(manager, port);
        }
    });

    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let body = "{}";
    let request = format!(
        "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let response = send_request(addr, &request);
    assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
}
