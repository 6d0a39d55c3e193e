//! Proxy liveness probing: TCP reachability through the proxy, followed by
//! an HTTP echo-IP probe, yielding a three-tier human-readable verdict.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use super::socks5::connect_via_socks5;

/// Hosts tried, in order, for the TCP reachability probe. A mix of common
/// web endpoints and raw IPs so a single blocked host doesn't fail the probe.
const TCP_PROBE_TARGETS: &[(&str, u16)] = &[
    ("www.google.com", 80),
    ("www.cloudflare.com", 80),
    ("www.microsoft.com", 80),
    ("1.1.1.1", 80),
    ("8.8.8.8", 53),
];

const ECHO_HOST: &str = "httpbin.org";
const ECHO_PORT: u16 = 80;
const ECHO_PATH: &str = "/ip";

/// Outcome of probing one proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyTestOutcome {
    /// Full HTTP round-trip succeeded through the proxy; `observed_ip` is the
    /// egress IP the echo probe reported.
    Available { elapsed: Duration, observed_ip: String },
    /// The proxy can open TCP connections but the HTTP echo probe failed.
    LimitedTcpOnly,
    /// Neither probe succeeded.
    Unavailable { reason: String },
}

impl ProxyTestOutcome {
    /// Renders the outcome as the status string stored on a `ProxyRecord`.
    pub fn status_string(&self) -> String {
        match self {
            ProxyTestOutcome::Available { elapsed, observed_ip } => {
                format!("Available {:.1}s — IP: {observed_ip}", elapsed.as_secs_f64())
            }
            ProxyTestOutcome::LimitedTcpOnly => "Limited (TCP only)".to_string(),
            ProxyTestOutcome::Unavailable { reason } => format!("Unavailable: {reason}"),
        }
    }
}

/// Probes a SOCKS5 proxy at `host:port` and returns a verdict.
///
/// First tries a plain TCP CONNECT to each of `TCP_PROBE_TARGETS` in turn;
/// the first one that succeeds confirms the proxy can relay traffic at all.
/// If that passes, a second probe does a full HTTP GET of `httpbin.org/ip`
/// through the proxy to confirm it can carry real HTTP payloads, not just
/// open a TCP pipe.
pub fn test_socks_proxy(host: &str, port: u16, timeout: Duration) -> ProxyTestOutcome {
    let started = Instant::now();

    let tcp_ok = TCP_PROBE_TARGETS
        .iter()
        .any(|(target_host, target_port)| {
            connect_via_socks5(host, port, target_host, *target_port, timeout).is_ok()
        });

    if !tcp_ok {
        return ProxyTestOutcome::Unavailable {
            reason: "could not open a TCP connection through this proxy".to_string(),
        };
    }

    match echo_probe(host, port, timeout) {
        Ok(observed_ip) => ProxyTestOutcome::Available {
            elapsed: started.elapsed(),
            observed_ip,
        },
        Err(_) => ProxyTestOutcome::LimitedTcpOnly,
    }
}

fn echo_probe(proxy_host: &str, proxy_port: u16, timeout: Duration) -> anyhow::Result<String> {
    let mut stream = connect_via_socks5(proxy_host, proxy_port, ECHO_HOST, ECHO_PORT, timeout)?;

    let request = format!(
        "GET {ECHO_PATH} HTTP/1.1\r\nHost: {ECHO_HOST}\r\nUser-Agent: Multi-Socks-Downloader/1.0\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes())?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    let response = String::from_utf8_lossy(&response);

    let body = response
        .split("\r\n\r\n")
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("no body in echo probe response"))?;

    let parsed: serde_json::Value = serde_json::from_str(body.trim())?;
    let origin = parsed
        .get("origin")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("echo probe response missing origin"))?;
    Ok(origin.to_string())
}
