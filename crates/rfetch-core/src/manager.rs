//! Download Manager: owns the task registry, the manager-wide connection
//! budget, configuration, and the proxy registry. This is the Job Intake
//! Port (§6) — the synchronous surface the CLI and the Local HTTP endpoint
//! both call through.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;

use crate::checkpoint::{self, TaskStatus};
use crate::config::{self, RfetchConfig};
use crate::proxy::{ProxyRecord, ProxyRegistry};
use crate::task::{Task, TaskCallbacks, TaskParams, TaskProgress};

/// Manager-wide cap on simultaneously open worker connections across every
/// running task (§5). Soft, not hard: `Task::start` always grants itself at
/// least one worker even when the budget is fully reserved, so a saturated
/// budget throttles a task rather than ever fully starving it.
pub struct ConnectionBudget {
    capacity: AtomicUsize,
    in_use: AtomicUsize,
}

impl ConnectionBudget {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: AtomicUsize::new(capacity.max(1)),
            in_use: AtomicUsize::new(0),
        }
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity.max(1), Ordering::Relaxed);
    }

    /// Reserves up to `wanted` slots, returning however many were actually
    /// granted (0..=wanted, never negative, never more than `wanted`).
    pub fn try_reserve(&self, wanted: usize) -> usize {
        loop {
            let cap = self.capacity.load(Ordering::Relaxed);
            let used = self.in_use.load(Ordering::Relaxed);
            let available = cap.saturating_sub(used);
            let grant = wanted.min(available);
            if self
                .in_use
                .compare_exchange(used, used + grant, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return grant;
            }
        }
    }

    pub fn release(&self, n: usize) {
        let _ = self
            .in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| Some(cur.saturating_sub(n)));
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }
}

struct ManagerInner {
    config: RfetchConfig,
}

/// The default event hooks installed on every task this manager creates:
/// just structured logging, since the manager learns about task state by
/// querying `Task::progress`/`Task::status` directly rather than reacting
/// to these events itself.
fn default_callbacks() -> TaskCallbacks {
    TaskCallbacks {
        on_completed: Some(Box::new(|id| {
            tracing::info!(task_id = %id, "download completed");
        })),
        on_error: Some(Box::new(|id| {
            tracing::warn!(task_id = %id, "download failed");
        })),
    }
}

pub struct DownloadManager {
    inner: Mutex<ManagerInner>,
    proxies: ProxyRegistry,
    budget: Arc<ConnectionBudget>,
    tasks: Mutex<HashMap<String, Arc<Task>>>,
    tasks_by_url: Mutex<HashMap<String, String>>,
    next_id: AtomicUsize,
}

impl DownloadManager {
    /// Loads (or initializes) the configuration file and builds an empty
    /// manager around it. Call `scan_unfinished` afterward to recover any
    /// tasks left over from a previous run.
    pub fn load() -> Result<Arc<Self>> {
        let cfg = config::load_or_init()?;
        let proxies = ProxyRegistry::new(cfg.socks_proxies.clone());
        let budget = Arc::new(ConnectionBudget::new(cfg.max_total_connections));

        Ok(Arc::new(Self {
            inner: Mutex::new(ManagerInner { config: cfg }),
            proxies,
            budget,
            tasks: Mutex::new(HashMap::new()),
            tasks_by_url: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
        }))
    }

    fn generate_task_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        format!("task-{nanos:x}-{n}")
    }

    fn persist_config(&self) -> Result<()> {
        let cfg = self.inner.lock().unwrap().config.clone();
        config::save(&cfg)
    }

    fn get_task(&self, id: &str) -> Result<Arc<Task>> {
        self.tasks
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such task: {id}"))
    }

    /// Registers a new task. Returns the existing task's id without creating
    /// a duplicate if `url` is already registered (running or not).
    #[allow(clippy::too_many_arguments)]
    pub fn add_task(
        &self,
        url: String,
        filename: Option<String>,
        worker_count: Option<usize>,
        directory: Option<PathBuf>,
        use_proxy: bool,
        segments_per_worker: Option<usize>,
        workers_per_proxy: Option<usize>,
    ) -> Result<String> {
        if let Some(existing) = self.tasks_by_url.lock().unwrap().get(&url) {
            return Ok(existing.clone());
        }

        let id = self.generate_task_id();
        let (destination_directory, connect_timeout, read_timeout, default_workers, default_spw, default_wpp) = {
            let st = self.inner.lock().unwrap();
            (
                directory.unwrap_or_else(|| st.config.save_dir.clone()),
                st.config.connection_timeout(),
                st.config.read_timeout(),
                st.config.default_thread_count,
                st.config.default_chunks_per_part,
                st.config.default_threads_per_proxy,
            )
        };

        let proxies = if use_proxy { self.proxies.list_available() } else { Vec::new() };

        let task = Task::new(TaskParams {
            id: id.clone(),
            url: url.clone(),
            destination_directory,
            filename,
            worker_count: worker_count.or(Some(default_workers)),
            segments_per_worker: segments_per_worker.or(Some(default_spw)),
            workers_per_proxy: workers_per_proxy.or(Some(default_wpp)),
            proxies,
            connect_timeout,
            read_timeout,
            budget: Arc::clone(&self.budget),
        });
        task.set_callbacks(default_callbacks());

        self.tasks.lock().unwrap().insert(id.clone(), Arc::clone(&task));
        self.tasks_by_url.lock().unwrap().insert(url, id.clone());

        Ok(id)
    }

    pub fn start_task(&self, id: &str) -> Result<()> {
        let task = self.get_task(id)?;
        task.prepare(false)?;
        task.start();
        Ok(())
    }

    pub fn pause_task(&self, id: &str) -> Result<()> {
        let task = self.get_task(id)?;
        task.pause();
        Ok(())
    }

    pub fn resume_task(&self, id: &str) -> Result<()> {
        let task = self.get_task(id)?;
        task.resume()?;
        Ok(())
    }

    /// Cancels and deregisters a task. Returns `false` if `id` is unknown.
    pub fn cancel_task(&self, id: &str) -> bool {
        let task = match self.tasks.lock().unwrap().get(id).cloned() {
            Some(t) => t,
            None => return false,
        };
        let ok = task.cancel();
        if ok {
            self.tasks.lock().unwrap().remove(id);
            self.tasks_by_url.lock().unwrap().retain(|_, v| v != id);
        }
        ok
    }

    pub fn get_task_progress(&self, id: &str) -> Result<TaskProgress> {
        Ok(self.get_task(id)?.progress())
    }

    pub fn get_all_tasks(&self) -> Vec<(String, TaskProgress)> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .map(|(id, t)| (id.clone(), t.progress()))
            .collect()
    }

    pub fn set_save_dir(&self, path: PathBuf) -> Result<()> {
        self.inner.lock().unwrap().config.save_dir = path;
        self.persist_config()
    }

    /// Port the local HTTP intake endpoint should bind to, per the loaded config.
    pub fn http_endpoint_port(&self) -> u16 {
        self.inner.lock().unwrap().config.http_endpoint_port
    }

    /// Scans every configured download directory for `*.progress` files and
    /// constructs a Task for each one not already registered under the same
    /// URL. Tasks recorded as `Downloading`/`Initialized` are auto-started;
    /// `Paused` tasks are left paused. Stray checkpoints for a task already
    /// in a terminal state are deleted rather than resurrected.
    pub fn scan_unfinished(self: &Arc<Self>) -> Result<usize> {
        let (directories, connect_timeout, read_timeout) = {
            let st = self.inner.lock().unwrap();
            let mut dirs = st.config.download_dirs.clone();
            dirs.push(st.config.save_dir.clone());
            dirs.sort();
            dirs.dedup();
            (dirs, st.config.connection_timeout(), st.config.read_timeout())
        };

        let mut recovered = 0usize;
        for dir in directories {
            let found = match checkpoint::scan_unfinished(&dir) {
                Ok(f) => f,
                Err(_) => continue,
            };
            for (path, record) in found {
                if self.tasks_by_url.lock().unwrap().contains_key(&record.url) {
                    continue;
                }
                if record.status.is_terminal() {
                    let _ = std::fs::remove_file(&path);
                    continue;
                }

                let id = self.generate_task_id();
                let proxies = record.proxy_list_snapshot.clone();
                let status = record.status;
                let task = Task::from_checkpoint(
                    id.clone(),
                    record.clone(),
                    proxies,
                    connect_timeout,
                    read_timeout,
                    Arc::clone(&self.budget),
                );
                task.set_callbacks(default_callbacks());

                self.tasks.lock().unwrap().insert(id.clone(), Arc::clone(&task));
                self.tasks_by_url.lock().unwrap().insert(record.url.clone(), id.clone());

                if matches!(status, TaskStatus::Downloading | TaskStatus::Initialized) && task.prepare(false).is_ok()
                {
                    task.start();
                }
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    pub fn add_proxy(&self, record: ProxyRecord) -> Result<()> {
        self.proxies.add(record);
        self.sync_proxies_to_config()
    }

    pub fn delete_proxy(&self, id: &str) -> Result<()> {
        self.proxies.delete(id);
        self.sync_proxies_to_config()
    }

    pub fn test_proxy(&self, id: &str) -> Result<String> {
        self.proxies.test(id, Duration::from_secs(5))
    }

    pub fn list_all_proxies(&self) -> Vec<ProxyRecord> {
        self.proxies.list_all()
    }

    pub fn list_available_proxies(&self) -> Vec<ProxyRecord> {
        self.proxies.list_available()
    }

    fn sync_proxies_to_config(&self) -> Result<()> {
        let snapshot = self.proxies.snapshot_map();
        self.inner.lock().unwrap().config.socks_proxies = snapshot;
        self.persist_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_budget_never_oversubscribes() {
        let budget = ConnectionBudget::new(4);
        assert_eq!(budget.try_reserve(3), 3);
        assert_eq!(budget.try_reserve(3), 1);
        assert_eq!(budget.try_reserve(1), 0);
        budget.release(2);
        assert_eq!(budget.try_reserve(5), 2);
    }

    #[test]
    fn connection_budget_release_never_underflows() {
        let budget = ConnectionBudget::new(4);
        budget.release(10);
        assert_eq!(budget.in_use(), 0);
        assert_eq!(budget.try_reserve(4), 4);
    }
}
