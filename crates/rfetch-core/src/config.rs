//! Global configuration loaded from `~/.config/rfetch/config.toml`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::proxy::ProxyRecord;

/// Global configuration: save locations, proxy registry, and the tuning
/// knobs applied to every task unless overridden at `add_task` time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RfetchConfig {
    /// Default destination directory for new tasks.
    pub save_dir: PathBuf,
    /// Directories offered to the user as download destinations.
    pub download_dirs: Vec<PathBuf>,
    /// Registered SOCKS5 proxies, keyed by id.
    pub socks_proxies: HashMap<String, ProxyRecord>,
    /// Default worker count for a task when none is given.
    pub default_thread_count: usize,
    /// Default `segments_per_worker` hint.
    pub default_chunks_per_part: usize,
    /// Default `workers_per_proxy` hint.
    pub default_threads_per_proxy: usize,
    /// Connect timeout for HEAD/GET requests, in seconds.
    pub connection_timeout_secs: u64,
    /// Read timeout for HEAD/GET requests, in seconds.
    pub read_timeout_secs: u64,
    /// Maximum retry attempts (including the first) for a segment fetch.
    pub max_retry_count: u32,
    /// Multiplier applied to the base retry delay on each attempt.
    pub retry_backoff_factor: f64,
    /// Whether HTTP keep-alive is requested from transports that support it.
    pub keep_alive_enabled: bool,
    /// Whether dynamic chunk-size scaling (§4.2) is applied.
    pub auto_adjust_chunk_size: bool,
    /// Whether dynamic worker-count scaling (§4.2) is applied.
    pub auto_adjust_threads: bool,
    /// Minimum acceptable transfer speed, in bytes/sec. Parsed and carried
    /// on every task but never enforced; see DESIGN.md.
    pub minimum_speed_threshold: u64,
    /// Ceiling on simultaneously open worker connections across all tasks.
    pub max_total_connections: usize,
    /// Port the local HTTP intake endpoint binds to on `0.0.0.0`.
    #[serde(default = "default_http_endpoint_port")]
    pub http_endpoint_port: u16,
}

fn default_http_endpoint_port() -> u16 {
    8765
}

impl Default for RfetchConfig {
    fn default() -> Self {
        let home_downloads = dirs_or_home().join("Downloads");
        Self {
            save_dir: home_downloads.clone(),
            download_dirs: vec![home_downloads],
            socks_proxies: HashMap::new(),
            default_thread_count: 8,
            default_chunks_per_part: 10,
            default_threads_per_proxy: 4,
            connection_timeout_secs: 10,
            read_timeout_secs: 30,
            max_retry_count: 3,
            retry_backoff_factor: 2.0,
            keep_alive_enabled: true,
            auto_adjust_chunk_size: true,
            auto_adjust_threads: true,
            minimum_speed_threshold: 0,
            max_total_connections: 64,
            http_endpoint_port: 8765,
        }
    }
}

impl RfetchConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

fn dirs_or_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rfetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RfetchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = RfetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: RfetchConfig = toml::from_str(&data)?;
    Ok(cfg)
}

/// Persist `cfg` back to its canonical path (write-temp + rename).
pub fn save(cfg: &RfetchConfig) -> Result<()> {
    let path = config_path()?;
    let toml = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("toml.tmp");
    fs::write(&tmp, toml)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}
