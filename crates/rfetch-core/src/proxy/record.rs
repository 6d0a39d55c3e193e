//! Proxy record type.

use serde::{Deserialize, Serialize};

/// A registered SOCKS5 endpoint and its last known liveness status.
///
/// `status` is an opaque human-readable string produced by the last probe
/// (e.g. `"Available 1.2s"`, `"Limited (TCP only)"`, `"Unavailable: timed out"`,
/// or `"Untested"` before the first probe).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub id: String,
    pub display_name: String,
    pub host: String,
    pub port: u16,
    pub status: String,
}

impl ProxyRecord {
    pub fn untested(id: impl Into<String>, display_name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            host: host.into(),
            port,
            status: "Untested".to_string(),
        }
    }
}
