//! In-memory registry of configured SOCKS5 proxies, backed by the
//! persisted `socks_proxies` map in the configuration file.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::record::ProxyRecord;
use super::tester::test_socks_proxy;

/// Thread-safe collection of proxies, shared by the Download Manager and any
/// task that needs a snapshot to bind workers against.
pub struct ProxyRegistry {
    proxies: Mutex<HashMap<String, ProxyRecord>>,
}

impl ProxyRegistry {
    pub fn new(initial: HashMap<String, ProxyRecord>) -> Self {
        Self {
            proxies: Mutex::new(initial),
        }
    }

    /// Registers a new proxy, overwriting any existing entry with the same id.
    pub fn add(&self, record: ProxyRecord) {
        self.proxies.lock().unwrap().insert(record.id.clone(), record);
    }

    /// Removes a proxy by id. Returns the removed record, if any.
    pub fn delete(&self, id: &str) -> Option<ProxyRecord> {
        self.proxies.lock().unwrap().remove(id)
    }

    /// Probes a proxy's liveness and updates its stored status string.
    /// Returns an error if `id` is not registered.
    pub fn test(&self, id: &str, timeout: Duration) -> anyhow::Result<String> {
        let (host, port) = {
            let proxies = self.proxies.lock().unwrap();
            let record = proxies
                .get(id)
                .ok_or_else(|| anyhow::anyhow!("no such proxy: {id}"))?;
            (record.host.clone(), record.port)
        };

        let outcome = test_socks_proxy(&host, port, timeout);
        let status = outcome.status_string();

        if let Some(record) = self.proxies.lock().unwrap().get_mut(id) {
            record.status = status.clone();
        }
        Ok(status)
    }

    /// Returns a snapshot of every registered proxy.
    pub fn list_all(&self) -> Vec<ProxyRecord> {
        self.proxies.lock().unwrap().values().cloned().collect()
    }

    /// Returns a snapshot of proxies whose last known status starts with
    /// `"Available"`, suitable for binding to a new task.
    pub fn list_available(&self) -> Vec<ProxyRecord> {
        self.proxies
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.status.starts_with("Available"))
            .cloned()
            .collect()
    }

    /// Snapshot used to seed the configuration file's `socks_proxies` map.
    pub fn snapshot_map(&self) -> HashMap<String, ProxyRecord> {
        self.proxies.lock().unwrap().clone()
    }
}

impl Default for ProxyRegistry {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}
