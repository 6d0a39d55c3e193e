//! Download Task: the per-download state machine (§4.6), owning its own
//! segment pool, stop signal, speed accounting, and on-disk checkpoint.
//!
//! A Task never reaches back into the Manager; it surfaces completion and
//! failure through a small callback slot the Manager installs at
//! construction (see `TaskCallbacks`), matching the "Task owns all its
//! state" design note.

mod speed;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;

use crate::checkpoint::{CheckpointRecord, TaskStatus};
use crate::fetch_head::{self, HeadResult};
use crate::manager::ConnectionBudget;
use crate::proxy::{assign_proxy_for_segment, ProxyRecord};
use crate::safe_resume::validate_for_resume;
use crate::segmenter::{apply_dynamic_scaling, plan_segments, ScalingInputs, Segment};
use crate::storage::{self, StorageWriter, StorageWriterBuilder};
use crate::transport::{fetch_segment, fetch_single_stream, FetchOutcome, Timeouts};
use crate::url_model::{derive_filename, uniquify_filename};

pub use speed::SpeedTracker;

/// Bytes of task-wide progress between checkpoint saves (§4.4 step 4: "at
/// roughly every 5 MiB").
const CHECKPOINT_INTERVAL_BYTES: u64 = 5 * 1024 * 1024;
/// Minimum size for a range-capable server to get the multi-stream treatment.
const MULTI_STREAM_THRESHOLD_BYTES: u64 = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("{0}")]
    Validation(#[from] crate::safe_resume::ValidationError),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Everything reported by `get_task_progress` in the Job Intake Port.
#[derive(Debug, Clone)]
pub struct TaskProgress {
    pub total_size: u64,
    pub downloaded_size: u64,
    pub percentage: f64,
    pub speed: f64,
    pub average_speed: f64,
    pub status: TaskStatus,
    pub error_message: Option<String>,
    pub elapsed_time: Duration,
    pub thread_count: usize,
    pub total_time: Duration,
}

type EventCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Completion/error hooks the Manager installs on a freshly constructed
/// Task. The Task never calls back into the Manager for anything else.
#[derive(Default)]
pub struct TaskCallbacks {
    pub on_completed: Option<EventCallback>,
    pub on_error: Option<EventCallback>,
}

/// Arguments to `Task::new`. `worker_count`/`segments_per_worker`/
/// `workers_per_proxy` are the caller's requested knobs; Prepare applies
/// dynamic scaling (§4.2) on top of them.
pub struct TaskParams {
    pub id: String,
    pub url: String,
    pub destination_directory: PathBuf,
    pub filename: Option<String>,
    pub worker_count: Option<usize>,
    pub segments_per_worker: Option<usize>,
    pub workers_per_proxy: Option<usize>,
    pub proxies: Vec<ProxyRecord>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub budget: Arc<ConnectionBudget>,
}

/// The mutable bookkeeping behind a Task, behind a single mutex so related
/// fields (e.g. `final_path` and `temp_path`) are never observed half-updated.
struct TaskInner {
    filename: String,
    final_path: PathBuf,
    temp_path: PathBuf,
    progress_path: PathBuf,
    total_size: u64,
    downloaded_size: u64,
    segments: Vec<Segment>,
    status: TaskStatus,
    error_message: Option<String>,
    etag: Option<String>,
    last_modified: Option<String>,
    single_stream: bool,
    worker_count: usize,
    thread_count: usize,
    total_active_time: Duration,
    last_active_start: Option<Instant>,
    bytes_since_checkpoint: u64,
    storage: Option<StorageWriter>,
    /// Worker connections currently reserved against `Task::budget`; released
    /// on pause/cancel/finalize/single-stream-latch.
    reserved_connections: usize,
}

pub struct Task {
    pub id: String,
    url: String,
    destination_directory: PathBuf,
    requested_worker_count: Option<usize>,
    requested_segments_per_worker: Option<usize>,
    requested_workers_per_proxy: usize,
    proxies: Vec<ProxyRecord>,
    connect_timeout: Duration,
    read_timeout: Duration,
    budget: Arc<ConnectionBudget>,

    inner: Mutex<TaskInner>,
    speed: Mutex<SpeedTracker>,
    stop_flag: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    next_claim: AtomicUsize,
    callbacks: Mutex<TaskCallbacks>,
}

impl Task {
    pub fn new(params: TaskParams) -> Arc<Self> {
        let TaskParams {
            id,
            url,
            destination_directory,
            filename,
            worker_count,
            segments_per_worker,
            workers_per_proxy,
            proxies,
            connect_timeout,
            read_timeout,
            budget,
        } = params;

        let filename = filename.unwrap_or_default();
        let placeholder_name = if filename.is_empty() {
            crate::url_model::DEFAULT_FILENAME
        } else {
            filename.as_str()
        };
        let final_path = destination_directory.join(placeholder_name);
        let temp_path = storage::temp_path(&final_path);
        let progress_path = CheckpointRecord::path_for(&final_path);

        Arc::new(Self {
            id,
            url,
            destination_directory,
            requested_worker_count: worker_count,
            requested_segments_per_worker: segments_per_worker,
            requested_workers_per_proxy: workers_per_proxy.unwrap_or(4).max(1),
            proxies,
            connect_timeout,
            read_timeout,
            budget,
            inner: Mutex::new(TaskInner {
                filename,
                final_path,
                temp_path,
                progress_path,
                total_size: 0,
                downloaded_size: 0,
                segments: Vec::new(),
                status: TaskStatus::Initialized,
                error_message: None,
                etag: None,
                last_modified: None,
                single_stream: false,
                worker_count: worker_count.unwrap_or(8).max(1),
                thread_count: 0,
                total_active_time: Duration::ZERO,
                last_active_start: None,
                bytes_since_checkpoint: 0,
                storage: None,
                reserved_connections: 0,
            }),
            speed: Mutex::new(SpeedTracker::new()),
            stop_flag: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
            watcher: Mutex::new(None),
            next_claim: AtomicUsize::new(0),
            callbacks: Mutex::new(TaskCallbacks::default()),
        })
    }

    /// Reconstructs a Task from a loaded checkpoint (recovery scan).
    pub fn from_checkpoint(
        id: String,
        record: CheckpointRecord,
        proxies: Vec<ProxyRecord>,
        connect_timeout: Duration,
        read_timeout: Duration,
        budget: Arc<ConnectionBudget>,
    ) -> Arc<Self> {
        let task = Self::new(TaskParams {
            id,
            url: record.url.clone(),
            destination_directory: record.destination_directory.clone(),
            filename: Some(record.filename.clone()),
            worker_count: Some(record.worker_count),
            segments_per_worker: None,
            workers_per_proxy: None,
            proxies,
            connect_timeout,
            read_timeout,
            budget,
        });
        task.apply_checkpoint(record);
        task
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> TaskStatus {
        self.inner.lock().unwrap().status
    }

    pub fn set_callbacks(&self, callbacks: TaskCallbacks) {
        *self.callbacks.lock().unwrap() = callbacks;
    }

    /// Step 1-6 of §4.6's Prepare contract. Safe to call again after a crash
    /// (loads whatever checkpoint is on disk) or before the very first start.
    pub fn prepare(&self, restart_override: bool) -> Result<(), TaskError> {
        std::fs::create_dir_all(&self.destination_directory).with_context(|| {
            format!(
                "creating destination directory {}",
                self.destination_directory.display()
            )
        })?;

        {
            let st = self.inner.lock().unwrap();
            if st.final_path.exists() {
                drop(st);
                self.inner.lock().unwrap().status = TaskStatus::Completed;
                return Ok(());
            }
        }

        let progress_path = self.inner.lock().unwrap().progress_path.clone();
        let mut loaded: Option<CheckpointRecord> = None;
        if progress_path.exists() {
            match CheckpointRecord::load(&progress_path) {
                Ok(mut record) => {
                    record.reconcile_downloaded_size();
                    if record.status == TaskStatus::Error {
                        record.status = TaskStatus::Paused;
                    }
                    loaded = Some(record);
                }
                Err(_) => {
                    let _ = std::fs::remove_file(&progress_path);
                }
            }
        }

        let head = self.probe_head();

        if let Some(record) = &loaded {
            if !restart_override {
                validate_for_resume(record, &head)?;
            }
        }

        if let Some(record) = loaded {
            self.apply_checkpoint(record);
        }

        self.resolve_filename_and_paths(&head);

        let total_size = head.content_length.unwrap_or(0);
        let multi_stream = head.accept_ranges && total_size >= MULTI_STREAM_THRESHOLD_BYTES;

        {
            let mut st = self.inner.lock().unwrap();
            st.total_size = total_size;
            if let Some(etag) = &head.etag {
                st.etag = Some(etag.clone());
            }
            if let Some(lm) = &head.last_modified {
                st.last_modified = Some(lm.clone());
            }
            if !multi_stream {
                st.single_stream = true;
            }
        }

        self.prepare_segments_and_storage(multi_stream, total_size)?;
        self.save_checkpoint().map_err(TaskError::Other)?;
        Ok(())
    }

    fn resolve_filename_and_paths(&self, head: &HeadResult) {
        let needs_filename = self.inner.lock().unwrap().filename.is_empty();
        if !needs_filename {
            return;
        }
        let derived = derive_filename(&self.url, head.content_disposition.as_deref());
        let dest = self.destination_directory.clone();
        let unique = uniquify_filename(&derived, |candidate| dest.join(candidate).exists());
        let final_path = dest.join(&unique);
        let temp_path = storage::temp_path(&final_path);
        let progress_path = CheckpointRecord::path_for(&final_path);

        let mut st = self.inner.lock().unwrap();
        st.filename = unique;
        st.final_path = final_path;
        st.temp_path = temp_path;
        st.progress_path = progress_path;
    }

    fn prepare_segments_and_storage(&self, multi_stream: bool, total_size: u64) -> Result<(), TaskError> {
        let temp_path = self.inner.lock().unwrap().temp_path.clone();

        if multi_stream {
            let has_segments = !self.inner.lock().unwrap().segments.is_empty();
            if !has_segments {
                let scaled = apply_dynamic_scaling(ScalingInputs {
                    total_size,
                    worker_count: self.requested_worker_count.unwrap_or(8),
                    segments_per_worker: self.requested_segments_per_worker.unwrap_or(10),
                });
                let total_segments = (scaled.worker_count * scaled.segments_per_worker).max(1);
                let segments = plan_segments(total_size, total_segments);
                let mut st = self.inner.lock().unwrap();
                st.worker_count = scaled.worker_count;
                st.segments = segments;
            }

            let storage = if temp_path.exists() {
                StorageWriter::open_existing(&temp_path).context("reopening temp file for resume")?
            } else {
                let mut builder = StorageWriterBuilder::create(&temp_path).context("creating temp file")?;
                builder.preallocate(total_size).context("preallocating temp file")?;
                builder.build()
            };
            self.inner.lock().unwrap().storage = Some(storage);
        } else {
            self.inner.lock().unwrap().segments.clear();
            let storage = if temp_path.exists() {
                StorageWriter::open_existing(&temp_path).context("reopening temp file for resume")?
            } else {
                StorageWriterBuilder::create(&temp_path)
                    .context("creating temp file")?
                    .build()
            };
            self.inner.lock().unwrap().storage = Some(storage);
        }
        Ok(())
    }

    /// HEAD through each proxy in turn; falls back to direct. A total
    /// failure surfaces a zero-value `HeadResult`, which Prepare reads as
    /// "unknown size" and routes into single-stream mode.
    fn probe_head(&self) -> HeadResult {
        let custom_headers: HashMap<String, String> = HashMap::new();
        for proxy in &self.proxies {
            if let Ok(head) = fetch_head::probe_via(&self.url, &custom_headers, Some((&proxy.host, proxy.port))) {
                return head;
            }
        }
        fetch_head::probe(&self.url, &custom_headers).unwrap_or(HeadResult {
            content_length: None,
            accept_ranges: false,
            etag: None,
            last_modified: None,
            content_disposition: None,
        })
    }

    fn apply_checkpoint(&self, record: CheckpointRecord) {
        let mut st = self.inner.lock().unwrap();
        st.filename = record.filename;
        st.final_path = self.destination_directory.join(&st.filename);
        st.temp_path = storage::temp_path(&st.final_path);
        st.progress_path = CheckpointRecord::path_for(&st.final_path);
        st.total_size = record.total_size;
        st.downloaded_size = record.downloaded_size;
        st.segments = record.segments;
        st.status = record.status;
        st.etag = record.etag;
        st.last_modified = record.last_modified;
        st.single_stream = record.single_stream_latched;
        st.worker_count = record.worker_count;
        st.total_active_time = Duration::from_secs(record.total_active_time_secs);
    }

    /// Clears the stop signal, spawns workers (bound to proxies if any are
    /// configured), and spawns the completion watcher. Reserves worker slots
    /// from the manager-wide `ConnectionBudget` before spawning; a task
    /// always gets at least one worker even if the budget is exhausted, so a
    /// saturated budget slows a task down rather than stalling it forever.
    pub fn start(self: &Arc<Self>) {
        self.stop_flag.store(false, Ordering::Relaxed);
        {
            let mut st = self.inner.lock().unwrap();
            st.last_active_start = Some(Instant::now());
            st.status = TaskStatus::Downloading;
            st.error_message = None;
        }
        self.next_claim.store(0, Ordering::SeqCst);

        let single_stream = self.inner.lock().unwrap().single_stream;
        let mut handles = Vec::new();
        let reserved;

        if single_stream {
            reserved = self.budget.try_reserve(1).max(1);
            let task = Arc::clone(self);
            handles.push(thread::spawn(move || task.run_single_stream_worker()));
            self.inner.lock().unwrap().thread_count = 1;
        } else if !self.proxies.is_empty() {
            // Each claimed segment picks its proxy by `segment.index % proxies.len()`
            // (§4.4's round-robin assignment rule), not by which worker thread
            // happens to claim it, so the worker count can exceed the proxy count
            // without losing the deterministic assignment.
            let workers_per_proxy = self.requested_workers_per_proxy;
            let wanted = workers_per_proxy * self.proxies.len();
            reserved = self.budget.try_reserve(wanted).max(1);
            for _ in 0..reserved {
                let task = Arc::clone(self);
                handles.push(thread::spawn(move || task.run_segment_worker()));
            }
            self.inner.lock().unwrap().thread_count = reserved;
        } else {
            let worker_count = self.inner.lock().unwrap().worker_count.max(1);
            reserved = self.budget.try_reserve(worker_count).max(1);
            for _ in 0..reserved {
                let task = Arc::clone(self);
                handles.push(thread::spawn(move || task.run_segment_worker()));
            }
            self.inner.lock().unwrap().thread_count = reserved;
        }

        self.inner.lock().unwrap().reserved_connections = reserved;
        *self.workers.lock().unwrap() = handles;

        let watcher_task = Arc::clone(self);
        let watcher = thread::spawn(move || watcher_task.completion_watcher());
        *self.watcher.lock().unwrap() = Some(watcher);
    }

    /// Releases whatever this task currently holds against the connection
    /// budget. Idempotent: a second call releases nothing.
    fn release_budget(&self) {
        let n = std::mem::take(&mut self.inner.lock().unwrap().reserved_connections);
        if n > 0 {
            self.budget.release(n);
        }
    }

    pub fn pause(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        self.join_workers();
        if let Some(w) = self.watcher.lock().unwrap().take() {
            let _ = w.join();
        }
        self.release_budget();
        self.accumulate_active_time();
        self.inner.lock().unwrap().status = TaskStatus::Paused;
        self.speed.lock().unwrap().clear_window();
        let _ = self.save_checkpoint();
    }

    /// Re-enters Start. Re-prepares first if the temp file went missing
    /// (e.g. it was never created, or the directory was cleaned up).
    pub fn resume(self: &Arc<Self>) -> Result<(), TaskError> {
        let needs_reprepare = {
            let st = self.inner.lock().unwrap();
            !st.single_stream && st.segments.is_empty()
        } || !self.inner.lock().unwrap().temp_path.exists();

        if needs_reprepare {
            self.prepare(false)?;
        }
        self.speed.lock().unwrap().clear_window();
        self.start();
        Ok(())
    }

    pub fn cancel(&self) -> bool {
        self.stop_flag.store(true, Ordering::Relaxed);
        self.join_workers();
        if let Some(w) = self.watcher.lock().unwrap().take() {
            let _ = w.join();
        }
        self.release_budget();
        self.inner.lock().unwrap().status = TaskStatus::Canceled;
        let (temp_path, progress_path) = {
            let st = self.inner.lock().unwrap();
            (st.temp_path.clone(), st.progress_path.clone())
        };
        let _ = std::fs::remove_file(&temp_path);
        let _ = std::fs::remove_file(&progress_path);
        true
    }

    pub fn progress(&self) -> TaskProgress {
        let st = self.inner.lock().unwrap();
        let status = st.status;
        let total_size = st.total_size;
        let downloaded_size = st.downloaded_size;
        let percentage = if total_size > 0 {
            (downloaded_size as f64 / total_size as f64) * 100.0
        } else {
            0.0
        };
        let total_active_time = self.effective_active_time(&st);
        let error_message = st.error_message.clone();
        drop(st);

        let speed = if status == TaskStatus::Downloading {
            self.speed.lock().unwrap().report(downloaded_size, total_active_time)
        } else {
            self.speed.lock().unwrap().zero()
        };
        let average_speed = if total_active_time.as_secs_f64() > 0.0 {
            downloaded_size as f64 / total_active_time.as_secs_f64()
        } else {
            0.0
        };

        TaskProgress {
            total_size,
            downloaded_size,
            percentage,
            speed,
            average_speed,
            status,
            error_message,
            elapsed_time: total_active_time,
            thread_count: self.inner.lock().unwrap().thread_count,
            total_time: total_active_time,
        }
    }

    fn effective_active_time(&self, st: &TaskInner) -> Duration {
        match st.last_active_start {
            Some(start) => st.total_active_time + start.elapsed(),
            None => st.total_active_time,
        }
    }

    fn accumulate_active_time(&self) {
        let mut st = self.inner.lock().unwrap();
        if let Some(start) = st.last_active_start.take() {
            st.total_active_time += start.elapsed();
        }
    }

    fn join_workers(&self) {
        let handles = std::mem::take(&mut *self.workers.lock().unwrap());
        for h in handles {
            let _ = h.join();
        }
    }

    fn claim_segment(&self) -> Option<Segment> {
        loop {
            let i = self.next_claim.fetch_add(1, Ordering::SeqCst);
            let seg = {
                let st = self.inner.lock().unwrap();
                if i >= st.segments.len() {
                    return None;
                }
                st.segments[i]
            };
            if seg.completed {
                continue;
            }
            return Some(seg);
        }
    }

    fn update_segment(&self, segment: Segment) {
        let mut st = self.inner.lock().unwrap();
        if let Some(slot) = st.segments.get_mut(segment.index) {
            *slot = segment;
        }
    }

    fn add_progress(&self, n: u64) {
        if n == 0 {
            return;
        }
        let should_checkpoint = {
            let mut st = self.inner.lock().unwrap();
            st.downloaded_size += n;
            if st.total_size > 0 && st.downloaded_size > st.total_size {
                st.downloaded_size = st.total_size;
            }
            st.bytes_since_checkpoint += n;
            if st.bytes_since_checkpoint >= CHECKPOINT_INTERVAL_BYTES {
                st.bytes_since_checkpoint = 0;
                true
            } else {
                false
            }
        };
        self.speed.lock().unwrap().maybe_sample(Instant::now(), n);
        if should_checkpoint {
            let _ = self.save_checkpoint();
        }
    }

    fn to_checkpoint_record(&self, st: &TaskInner) -> CheckpointRecord {
        CheckpointRecord {
            url: self.url.clone(),
            total_size: st.total_size,
            downloaded_size: st.downloaded_size,
            segments: st.segments.clone(),
            status: st.status,
            destination_directory: self.destination_directory.clone(),
            filename: st.filename.clone(),
            etag: st.etag.clone(),
            last_modified: st.last_modified.clone(),
            proxy_list_snapshot: self.proxies.clone(),
            worker_count: st.worker_count,
            single_stream_latched: st.single_stream,
            total_active_time_secs: self.effective_active_time(st).as_secs(),
        }
    }

    fn save_checkpoint(&self) -> anyhow::Result<()> {
        let st = self.inner.lock().unwrap();
        let record = self.to_checkpoint_record(&st);
        let path = st.progress_path.clone();
        drop(st);
        record.save(&path)
    }

    fn fail(&self, message: String) {
        {
            let mut st = self.inner.lock().unwrap();
            st.error_message = Some(message);
            st.status = TaskStatus::Error;
        }
        self.accumulate_active_time();
        let _ = self.save_checkpoint();
        self.fire_error();
    }

    fn fire_completed(&self) {
        if let Some(cb) = self.callbacks.lock().unwrap().on_completed.as_ref() {
            cb(&self.id);
        }
    }

    fn fire_error(&self) {
        if let Some(cb) = self.callbacks.lock().unwrap().on_error.as_ref() {
            cb(&self.id);
        }
    }

    fn run_segment_worker(self: Arc<Self>) {
        let storage = match self.inner.lock().unwrap().storage.clone() {
            Some(s) => s,
            None => return,
        };

        loop {
            if self.stop_flag.load(Ordering::Relaxed) {
                return;
            }
            let mut segment = match self.claim_segment() {
                Some(s) => s,
                None => return,
            };
            let index = segment.index;
            let proxy = assign_proxy_for_segment(&self.proxies, index);
            let timeouts = Timeouts {
                connect: self.connect_timeout,
                read: self.read_timeout,
            };
            let stop_flag = Arc::clone(&self.stop_flag);
            let task = Arc::clone(&self);

            let result = fetch_segment(
                &self.url,
                &mut segment,
                &storage,
                proxy,
                &stop_flag,
                timeouts,
                |n| task.add_progress(n),
            );
            self.update_segment(segment);

            match result {
                Ok(FetchOutcome::Done) => continue,
                Ok(FetchOutcome::Stopped) => return,
                Ok(FetchOutcome::RangeNotSupported) => {
                    self.latch_single_stream();
                    return;
                }
                Err(e) => {
                    self.fail(format!("segment {index} failed: {e}"));
                    return;
                }
            }
        }
    }

    fn run_single_stream_worker(self: Arc<Self>) {
        let storage = match self.inner.lock().unwrap().storage.clone() {
            Some(s) => s,
            None => return,
        };
        let start_at = self.inner.lock().unwrap().downloaded_size;
        let proxy = self.proxies.first().cloned();
        let timeouts = Timeouts {
            connect: self.connect_timeout,
            read: self.read_timeout,
        };
        let stop_flag = Arc::clone(&self.stop_flag);
        let task = Arc::clone(&self);

        let result = fetch_single_stream(
            &self.url,
            &storage,
            start_at,
            proxy.as_ref(),
            &stop_flag,
            timeouts,
            |n| task.add_progress(n),
        );

        match result {
            Ok(FetchOutcome::Done) => self.finalize(),
            Ok(FetchOutcome::Stopped) => {}
            Ok(FetchOutcome::RangeNotSupported) => {}
            Err(e) => self.fail(format!("single-stream fetch failed: {e}")),
        }
    }

    /// "Exactly one worker performs this transition" (§9 design note): the
    /// `single_stream` flag doubles as the latch mutex. The actual teardown
    /// and restart run on a dedicated thread so the worker that observed the
    /// 416 doesn't try to join its own handle.
    fn latch_single_stream(self: &Arc<Self>) {
        {
            let mut st = self.inner.lock().unwrap();
            if st.single_stream {
                return;
            }
            st.single_stream = true;
        }
        self.stop_flag.store(true, Ordering::Relaxed);

        let task = Arc::clone(self);
        thread::spawn(move || task.run_single_stream_transition());
    }

    fn run_single_stream_transition(self: Arc<Self>) {
        self.join_workers();
        self.release_budget();

        let temp_path = {
            let mut st = self.inner.lock().unwrap();
            st.segments.clear();
            st.downloaded_size = 0;
            st.temp_path.clone()
        };
        if let Ok(file) = std::fs::OpenOptions::new().write(true).open(&temp_path) {
            let _ = file.set_len(0);
        }
        self.stop_flag.store(false, Ordering::Relaxed);

        let reserved = self.budget.try_reserve(1).max(1);
        let task = Arc::clone(&self);
        let handle = thread::spawn(move || task.run_single_stream_worker());
        *self.workers.lock().unwrap() = vec![handle];
        {
            let mut st = self.inner.lock().unwrap();
            st.thread_count = 1;
            st.reserved_connections = reserved;
        }
    }

    /// Runs on its own thread for the lifetime of a Downloading task,
    /// ticking roughly every second.
    fn completion_watcher(self: Arc<Self>) {
        let mut stall_ticks = 0u32;
        let mut last_downloaded = self.inner.lock().unwrap().downloaded_size;

        loop {
            thread::sleep(Duration::from_secs(1));
            if self.stop_flag.load(Ordering::Relaxed) {
                return;
            }
            {
                let st = self.inner.lock().unwrap();
                if st.status != TaskStatus::Downloading {
                    return;
                }
            }

            let (total, downloaded, all_segments_done, single_stream) = {
                let st = self.inner.lock().unwrap();
                (
                    st.total_size,
                    st.downloaded_size,
                    !st.segments.is_empty() && st.segments.iter().all(|s| s.completed),
                    st.single_stream,
                )
            };
            let near_complete = total > 0 && downloaded + 1024 >= total;

            if (!single_stream && all_segments_done) || near_complete {
                self.finalize();
                return;
            }

            if downloaded == last_downloaded {
                stall_ticks += 1;
                if stall_ticks == 10 {
                    tracing::warn!(task_id = %self.id, "no progress for 10+ ticks");
                }
            } else {
                stall_ticks = 0;
                last_downloaded = downloaded;
            }
        }
    }

    /// Idempotent: a Task already in a terminal state is left alone.
    fn finalize(&self) {
        {
            let st = self.inner.lock().unwrap();
            if st.status.is_terminal() {
                return;
            }
        }
        self.join_workers();
        self.release_budget();
        self.accumulate_active_time();

        let (total, final_path, temp_path, progress_path) = {
            let st = self.inner.lock().unwrap();
            (st.total_size, st.final_path.clone(), st.temp_path.clone(), st.progress_path.clone())
        };
        if total > 0 {
            self.inner.lock().unwrap().downloaded_size = total;
        }

        let source = if temp_path.exists() {
            Some(temp_path)
        } else {
            self.find_fallback_temp_file(&final_path)
        };

        let result: anyhow::Result<()> = (|| {
            let source = source.context("no temp file found to finalize")?;
            if final_path.exists() {
                std::fs::remove_file(&final_path)?;
            }
            std::fs::rename(&source, &final_path)?;
            let _ = std::fs::remove_file(&progress_path);
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.inner.lock().unwrap().status = TaskStatus::Completed;
                self.fire_completed();
            }
            Err(e) => self.fail(format!("finalize failed: {e}")),
        }
    }

    /// Finalize falls back to a same-directory file whose name matches the
    /// prefix before the first `.` or `-`, for the case where `temp_path`
    /// itself is missing but a worker already wrote under a related name.
    fn find_fallback_temp_file(&self, final_path: &std::path::Path) -> Option<PathBuf> {
        let dir = final_path.parent()?;
        let name = final_path.file_name()?.to_str()?;
        let prefix = name.split(['.', '-']).next()?;
        if prefix.is_empty() {
            return None;
        }
        for entry in std::fs::read_dir(dir).ok()?.flatten() {
            let candidate = entry.file_name();
            let candidate = candidate.to_str()?;
            if candidate != name && candidate.starts_with(prefix) {
                return Some(entry.path());
            }
        }
        None
    }
}
