//! The thumbnail cache engine
//!
//! Maps image names to fresh thumbnail files. Cache misses are queued and
//! drained in FIFO order by a bounded pool of workers (one by default).
//! Concurrent requests for the same source share a single generation.
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, error, info, trace, warn};
use walkdir::WalkDir;

use crate::config::ThumbnailConfig;
use crate::error::ThumbnailError;
use crate::paths::{self, THUMBNAIL_EXTENSION};
use crate::scan::is_supported_image;
use crate::thumbnail::{is_partial, JpegThumbnailer, ThumbnailGenerator};

type Outcome = Result<PathBuf, ThumbnailError>;
type Waiter = oneshot::Sender<Outcome>;

/// A unit of pending work. The waiters live in `QueueState::outstanding`
/// so callers arriving while the job is in flight can still attach.
#[derive(Debug)]
struct Job {
    source: PathBuf,
    target: PathBuf,
}

#[derive(Default)]
struct QueueState {
    /// FIFO backlog; a source path appears here at most once
    queue: VecDeque<Job>,
    /// Sources with queued or in-flight work, and everyone waiting on them
    outstanding: HashMap<PathBuf, Vec<Waiter>>,
    /// Workers currently draining the queue
    active_workers: usize,
}

struct Inner {
    config: ThumbnailConfig,
    generator: Arc<dyn ThumbnailGenerator>,
    state: Mutex<QueueState>,
    idle: Notify,
}

/// Snapshot of the work queue for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// Jobs waiting for a worker (in-flight jobs are not counted)
    pub queue_length: usize,
    /// Whether any worker is running
    pub processing: bool,
    /// Source paths with queued or in-flight work
    pub queued_paths: Vec<PathBuf>,
}

/// What a warm-up pass did with the names it was given
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarmupReport {
    pub total: usize,
    /// Already had a fresh thumbnail
    pub skipped: usize,
    /// Handed to the queue (including ones joined onto existing work)
    pub queued: usize,
    /// Rejected by name validation
    pub invalid: usize,
}

/// Thumbnail generation and caching service.
///
/// Cheap to clone; clones share the same queue and workers. Must be used
/// from within a tokio runtime.
#[derive(Clone)]
pub struct ThumbnailService {
    inner: Arc<Inner>,
}

impl ThumbnailService {
    /// Create a service using the default JPEG generator.
    pub fn new(config: ThumbnailConfig) -> Self {
        let generator = JpegThumbnailer::from_config(&config);
        Self::with_generator(config, generator)
    }

    /// Create a service with a custom generator.
    ///
    /// The cache root is created if missing. Failure is logged and the
    /// service keeps running; generation will report the error per request.
    pub fn with_generator(config: ThumbnailConfig, generator: impl ThumbnailGenerator) -> Self {
        let config = ThumbnailConfig {
            concurrency: config.concurrency.max(1),
            progress_interval: config.progress_interval.max(1),
            ..config
        };

        if let Err(err) = std::fs::create_dir_all(&config.cache_dir) {
            error!(
                cache_dir = %config.cache_dir.display(),
                %err,
                "Failed to create thumbnail cache directory"
            );
        }

        info!(
            images = %config.images_dir.display(),
            cache = %config.cache_dir.display(),
            workers = config.concurrency,
            "Thumbnail service initialized"
        );

        Self {
            inner: Arc::new(Inner {
                config,
                generator: Arc::new(generator),
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &ThumbnailConfig {
        &self.inner.config
    }

    /// Absolute path of the original image for `name`.
    pub fn source_path(&self, name: &str) -> Result<PathBuf, ThumbnailError> {
        Ok(self.resolve(name)?.0)
    }

    /// Absolute path where the thumbnail for `name` is (or will be) stored.
    pub fn thumbnail_path(&self, name: &str) -> Result<PathBuf, ThumbnailError> {
        Ok(self.resolve(name)?.1)
    }

    fn resolve(&self, name: &str) -> Result<(PathBuf, PathBuf), ThumbnailError> {
        let relative = paths::normalize_name(name)?;
        let config = &self.inner.config;
        Ok((
            paths::source_path(&config.images_dir, &relative),
            paths::thumbnail_path(&config.cache_dir, &relative),
        ))
    }

    /// Return the path of a fresh thumbnail for `name`, generating it first
    /// if it is missing or older than the source.
    pub async fn get_thumbnail(&self, name: &str) -> Result<PathBuf, ThumbnailError> {
        let (source, target) = self.resolve(name)?;

        if paths::is_fresh(&source, &target).await {
            trace!(name, "Thumbnail cache hit");
            return Ok(target);
        }

        let receiver = self.enqueue(source, target);
        receiver.await.map_err(|_| ThumbnailError::WorkerGone)?
    }

    /// Whether a thumbnail file exists for `name`. No freshness check and
    /// no generation.
    pub async fn has_thumbnail(&self, name: &str) -> bool {
        match self.resolve(name) {
            Ok((_, target)) => tokio::fs::try_exists(&target).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Queue every stale or missing thumbnail without waiting for them.
    ///
    /// Returns once each name has been checked; generation continues in the
    /// background and progress is logged as it completes.
    pub async fn generate_all_in_background<I, S>(&self, names: I) -> WarmupReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = WarmupReport::default();
        let mut pending = Vec::new();

        for name in names {
            let name = name.as_ref();
            report.total += 1;

            let (source, target) = match self.resolve(name) {
                Ok(resolved) => resolved,
                Err(err) => {
                    warn!(name, %err, "Skipping image with invalid name");
                    report.invalid += 1;
                    continue;
                }
            };

            if paths::is_fresh(&source, &target).await {
                report.skipped += 1;
                continue;
            }

            pending.push(self.enqueue(source, target));
            report.queued += 1;
        }

        info!(
            total = report.total,
            skipped = report.skipped,
            queued = report.queued,
            "Thumbnail warm-up scheduled"
        );

        if !pending.is_empty() {
            tokio::spawn(track_warmup(pending, self.inner.config.progress_interval));
        }

        report
    }

    /// Current queue depth, worker activity and outstanding sources.
    pub fn queue_status(&self) -> QueueStatus {
        let state = self.inner.lock_state();
        let mut queued_paths: Vec<PathBuf> = state.outstanding.keys().cloned().collect();
        queued_paths.sort();

        QueueStatus {
            queue_length: state.queue.len(),
            processing: state.active_workers > 0,
            queued_paths,
        }
    }

    /// Wait until the queue is empty and every worker has stopped.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.lock_state().is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Delete every cached thumbnail and recreate an empty cache root.
    ///
    /// Queued and in-flight work is left alone, so a generation already
    /// running may write its file back right after the clear.
    pub async fn clear_cache(&self) -> Result<(), ThumbnailError> {
        let root = &self.inner.config.cache_dir;

        match tokio::fs::remove_dir_all(root).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(ThumbnailError::io(root, err)),
        }
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| ThumbnailError::dir(root, e))?;

        info!(cache = %root.display(), "Thumbnail cache cleared");
        Ok(())
    }

    /// Remove thumbnails whose source image no longer exists, along with
    /// unfinished writes left behind by a crash. Returns the number of files
    /// removed.
    ///
    /// An unfinished write belonging to a generation that is running right
    /// now is removed too; that request then fails and can be retried.
    pub async fn prune_orphans(&self) -> Result<usize, ThumbnailError> {
        let cache_root = self.inner.config.cache_dir.clone();
        let images_root = self.inner.config.images_dir.clone();

        let orphans = tokio::task::spawn_blocking(move || find_orphans(&cache_root, &images_root))
            .await
            .map_err(|_| ThumbnailError::WorkerGone)?;

        let mut removed = 0;
        for orphan in orphans {
            match tokio::fs::remove_file(&orphan).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(ThumbnailError::io(&orphan, err)),
            }
        }

        if removed > 0 {
            info!(removed, "Removed orphaned thumbnails");
        }
        Ok(removed)
    }

    /// Register interest in `source`. Joins existing work for the same
    /// source, otherwise queues a new job and starts a worker if the pool
    /// has room.
    fn enqueue(&self, source: PathBuf, target: PathBuf) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();

        let start_worker = {
            let mut state = self.inner.lock_state();
            if let Some(waiters) = state.outstanding.get_mut(&source) {
                waiters.push(tx);
                debug!(source = %source.display(), "Joined in-flight thumbnail request");
                false
            } else {
                state.outstanding.insert(source.clone(), vec![tx]);
                state.queue.push_back(Job { source, target });
                if state.active_workers < self.inner.config.concurrency {
                    state.active_workers += 1;
                    true
                } else {
                    false
                }
            }
        };

        if start_worker {
            tokio::spawn(Arc::clone(&self.inner).drain());
        }
        rx
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Worker loop. Takes jobs from the head of the queue until it is empty.
    /// A failed job only fails its own waiters.
    async fn drain(self: Arc<Self>) {
        loop {
            let job = {
                let mut state = self.lock_state();
                match state.queue.pop_front() {
                    Some(job) => job,
                    None => {
                        state.active_workers -= 1;
                        if state.is_idle() {
                            self.idle.notify_waiters();
                        }
                        return;
                    }
                }
            };

            let outcome = self.process(&job).await;

            let waiters = self
                .lock_state()
                .outstanding
                .remove(&job.source)
                .unwrap_or_default();

            match &outcome {
                Ok(path) => debug!(
                    thumbnail = %path.display(),
                    waiters = waiters.len(),
                    "Thumbnail ready"
                ),
                Err(err) => warn!(
                    source = %job.source.display(),
                    %err,
                    "Thumbnail generation failed"
                ),
            }

            for waiter in waiters {
                // Receiver gone means the caller stopped waiting
                let _ = waiter.send(outcome.clone());
            }
        }
    }

    async fn process(&self, job: &Job) -> Outcome {
        if !tokio::fs::try_exists(&job.source).await.unwrap_or(false) {
            return Err(ThumbnailError::SourceNotFound(job.source.clone()));
        }

        if let Some(parent) = job.target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ThumbnailError::dir(parent, e))?;
        }

        let started = Instant::now();
        let generator = Arc::clone(&self.generator);
        let (source, target) = (job.source.clone(), job.target.clone());

        // CPU-bound decode/resize/encode runs on the blocking pool
        tokio::task::spawn_blocking(move || generator.generate(&source, &target))
            .await
            .map_err(|err| {
                error!(source = %job.source.display(), %err, "Thumbnail task panicked");
                ThumbnailError::WorkerGone
            })??;

        debug!(
            source = %job.source.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generated thumbnail"
        );
        Ok(job.target.clone())
    }
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.active_workers == 0
    }
}

/// Follow a warm-up batch to completion, logging progress every
/// `interval` thumbnails.
async fn track_warmup(pending: Vec<oneshot::Receiver<Outcome>>, interval: usize) {
    let total = pending.len();
    let mut done = 0;
    let mut failed = 0;

    let mut pending: FuturesUnordered<_> = pending.into_iter().collect();
    while let Some(outcome) = pending.next().await {
        done += 1;
        if !matches!(outcome, Ok(Ok(_))) {
            failed += 1;
        }
        if done % interval == 0 {
            info!(done, total, "Thumbnail warm-up progress");
        }
    }

    info!(generated = done - failed, failed, "Thumbnail warm-up finished");
}

/// Thumbnails under `cache_root` with no matching source image. A source
/// matches when it sits in the mirrored directory with the same stem and a
/// supported image extension.
fn find_orphans(cache_root: &Path, images_root: &Path) -> Vec<PathBuf> {
    let mut orphans = Vec::new();

    for entry in WalkDir::new(cache_root).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if is_partial(path) {
            orphans.push(path.to_path_buf());
            continue;
        }
        if path.extension().map_or(true, |ext| ext != THUMBNAIL_EXTENSION) {
            continue;
        }

        let Ok(relative) = path.strip_prefix(cache_root) else {
            continue;
        };
        let Some(stem) = path.file_stem() else {
            continue;
        };

        let source_dir = match relative.parent() {
            Some(parent) => images_root.join(parent),
            None => images_root.to_path_buf(),
        };

        let has_source = std::fs::read_dir(&source_dir)
            .map(|entries| {
                entries.filter_map(|e| e.ok()).any(|e| {
                    let candidate = e.path();
                    candidate.file_stem() == Some(stem) && is_supported_image(&candidate)
                })
            })
            .unwrap_or(false);

        if !has_source {
            orphans.push(path.to_path_buf());
        }
    }

    orphans
}

impl std::fmt::Debug for ThumbnailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailService")
            .field("images_dir", &self.inner.config.images_dir)
            .field("cache_dir", &self.inner.config.cache_dir)
            .field("status", &self.queue_status())
            .finish()
    }
}
