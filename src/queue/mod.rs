//! Asynchronous processing job queue.
//!
//! At-least-once delivery with a bounded worker pool. Failed jobs are retried
//! with exponential backoff up to a fixed attempt budget. Terminal jobs stay
//! queryable for a retention window and are purged by a maintenance task.
//!
//! Jobs are not deduplicated by video: callers enqueue a given video once per
//! intended run, and downstream storage is upsert-based so a double run is
//! last-writer-wins safe.

use crate::error::{KapitelError, Result};
use crate::progress::ProgressSink;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Work performed for one job. The orchestrator is the production handler.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, video_id: &str, sink: Arc<dyn ProgressSink>) -> Result<()>;
}

#[async_trait]
impl JobHandler for crate::orchestrator::Orchestrator {
    async fn handle(&self, video_id: &str, sink: Arc<dyn ProgressSink>) -> Result<()> {
        self.run(video_id, sink).await
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// A queued processing job.
#[derive(Debug, Clone)]
struct Job {
    id: Uuid,
    video_id: String,
    state: JobState,
    progress: u8,
    stage: Option<String>,
    attempts: u32,
    error: Option<String>,
    /// Set by maintenance when an active job stops reporting progress.
    /// Observability only; stalled jobs are not requeued.
    stalled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

/// Handle returned by [`JobQueue::enqueue`].
#[derive(Debug, Clone, Copy)]
pub struct JobHandle {
    pub id: Uuid,
}

/// Snapshot of a job's state.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: Uuid,
    pub video_id: String,
    pub state: JobState,
    pub progress: u8,
    pub stage: Option<String>,
    pub attempts: u32,
    pub error: Option<String>,
    pub stalled: bool,
}

/// Queue tuning knobs.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Maximum processing attempts per job.
    pub max_attempts: u32,
    /// Backoff before the first retry; doubles per subsequent retry.
    pub backoff: Duration,
    /// An active job with no progress update within this window is flagged
    /// as stalled.
    pub stall_after: Duration,
    /// How long completed jobs stay queryable.
    pub retain_completed: Duration,
    /// How long failed jobs stay queryable.
    pub retain_failed: Duration,
    /// Maintenance sweep interval.
    pub maintenance_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            max_attempts: 3,
            backoff: Duration::from_secs(2),
            stall_after: Duration::from_secs(300),
            retain_completed: Duration::from_secs(24 * 3600),
            retain_failed: Duration::from_secs(7 * 24 * 3600),
            maintenance_interval: Duration::from_secs(60),
        }
    }
}

struct QueueState {
    jobs: HashMap<Uuid, Job>,
    pending: VecDeque<Uuid>,
    shutting_down: bool,
}

struct QueueInner {
    state: Mutex<QueueState>,
    work_available: Notify,
    shutdown_signal: Notify,
    config: QueueConfig,
}

impl QueueInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // A panic while holding this lock is a bug in the queue itself
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a progress update for an active job.
    fn record_progress(&self, job_id: Uuid, progress: u8, stage: &str) {
        let mut state = self.lock();
        if let Some(job) = state.jobs.get_mut(&job_id) {
            job.progress = progress.min(100);
            job.stage = Some(stage.to_string());
            job.stalled = false;
            job.updated_at = Utc::now();
        }
    }

    fn requeue(&self, job_id: Uuid) {
        let mut state = self.lock();
        if state.shutting_down {
            return;
        }
        if let Some(job) = state.jobs.get_mut(&job_id) {
            job.state = JobState::Waiting;
            job.updated_at = Utc::now();
            state.pending.push_back(job_id);
        }
        drop(state);
        self.work_available.notify_one();
    }
}

/// Progress sink that writes updates back into the job record.
struct JobProgressSink {
    inner: Arc<QueueInner>,
    job_id: Uuid,
    downstream: Arc<dyn ProgressSink>,
}

impl ProgressSink for JobProgressSink {
    fn report(&self, progress: u8, stage: &str) {
        self.inner.record_progress(self.job_id, progress, stage);
        self.downstream.report(progress, stage);
    }
}

/// The processing job queue.
pub struct JobQueue {
    inner: Arc<QueueInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    jobs: HashMap::new(),
                    pending: VecDeque::new(),
                    shutting_down: false,
                }),
                work_available: Notify::new(),
                shutdown_signal: Notify::new(),
                config,
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Add a processing job for a video.
    #[instrument(skip(self))]
    pub fn enqueue(&self, video_id: &str) -> Result<JobHandle> {
        let mut state = self.inner.lock();
        if state.shutting_down {
            return Err(KapitelError::Queue("Queue is shutting down".into()));
        }

        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            video_id: video_id.to_string(),
            state: JobState::Waiting,
            progress: 0,
            stage: None,
            attempts: 0,
            error: None,
            stalled: false,
            created_at: now,
            updated_at: now,
            finished_at: None,
        };
        let handle = JobHandle { id: job.id };

        state.pending.push_back(job.id);
        state.jobs.insert(job.id, job);
        drop(state);

        self.inner.work_available.notify_one();
        debug!("Enqueued job {} for video {}", handle.id, video_id);
        Ok(handle)
    }

    /// Latest job status for a video, if one is still retained.
    pub fn status(&self, video_id: &str) -> Option<JobStatus> {
        let state = self.inner.lock();
        state
            .jobs
            .values()
            .filter(|j| j.video_id == video_id)
            .max_by_key(|j| j.created_at)
            .map(snapshot)
    }

    /// Status of a specific job.
    pub fn status_by_id(&self, job_id: Uuid) -> Option<JobStatus> {
        self.inner.lock().jobs.get(&job_id).map(snapshot)
    }

    /// Start the worker pool and the maintenance task.
    pub fn process(&self, handler: Arc<dyn JobHandler>, sink: Arc<dyn ProgressSink>) {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());

        for worker_id in 0..self.inner.config.workers.max(1) {
            let inner = self.inner.clone();
            let handler = handler.clone();
            let sink = sink.clone();
            workers.push(tokio::spawn(async move {
                worker_loop(worker_id, inner, handler, sink).await;
            }));
        }

        let inner = self.inner.clone();
        workers.push(tokio::spawn(async move {
            maintenance_loop(inner).await;
        }));

        info!("Started {} queue workers", self.inner.config.workers.max(1));
    }

    /// Stop accepting work and wait for in-flight jobs to finish.
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.lock();
            state.shutting_down = true;
        }
        self.inner.work_available.notify_waiters();
        self.inner.shutdown_signal.notify_waiters();

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
        info!("Queue shut down");
    }

    /// Run one maintenance sweep immediately (stall flagging + retention).
    pub fn sweep(&self) {
        run_sweep(&self.inner);
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

fn snapshot(job: &Job) -> JobStatus {
    JobStatus {
        id: job.id,
        video_id: job.video_id.clone(),
        state: job.state,
        progress: job.progress,
        stage: job.stage.clone(),
        attempts: job.attempts,
        error: job.error.clone(),
        stalled: job.stalled,
    }
}

async fn worker_loop(
    worker_id: usize,
    inner: Arc<QueueInner>,
    handler: Arc<dyn JobHandler>,
    sink: Arc<dyn ProgressSink>,
) {
    loop {
        // Register for wakeups before checking state, so a notify_waiters
        // issued between the check and the await is not lost
        let notified = inner.work_available.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let claimed = {
            let mut state = inner.lock();
            if state.shutting_down {
                break;
            }
            match state.pending.pop_front() {
                Some(job_id) => {
                    match state.jobs.get_mut(&job_id) {
                        Some(job) => {
                            job.state = JobState::Active;
                            job.attempts += 1;
                            job.stalled = false;
                            job.error = None;
                            job.updated_at = Utc::now();
                            Some((job_id, job.video_id.clone(), job.attempts))
                        }
                        // Purged while pending
                        None => continue,
                    }
                }
                None => None,
            }
        };

        let Some((job_id, video_id, attempt)) = claimed else {
            notified.await;
            continue;
        };

        debug!(
            worker_id,
            %job_id,
            attempt,
            "Processing video {}",
            video_id
        );

        let job_sink: Arc<dyn ProgressSink> = Arc::new(JobProgressSink {
            inner: inner.clone(),
            job_id,
            downstream: sink.clone(),
        });

        let result = handler.handle(&video_id, job_sink).await;
        finish_attempt(&inner, job_id, attempt, result);
    }
}

/// Apply the outcome of one attempt: complete, retry with backoff, or fail.
fn finish_attempt(inner: &Arc<QueueInner>, job_id: Uuid, attempt: u32, result: Result<()>) {
    let mut state = inner.lock();
    let Some(job) = state.jobs.get_mut(&job_id) else {
        return;
    };

    match result {
        Ok(()) => {
            job.state = JobState::Completed;
            job.progress = 100;
            job.error = None;
            job.updated_at = Utc::now();
            job.finished_at = Some(Utc::now());
            info!("Job {} completed on attempt {}", job_id, attempt);
        }
        Err(e) => {
            job.error = Some(e.to_string());
            job.updated_at = Utc::now();

            if attempt >= inner.config.max_attempts {
                job.state = JobState::Failed;
                job.finished_at = Some(Utc::now());
                warn!(
                    "Job {} failed permanently after {} attempts: {}",
                    job_id, attempt, e
                );
            } else {
                // 2s, 4s, 8s... per attempt
                let delay = inner.config.backoff * 2u32.saturating_pow(attempt - 1);
                job.state = JobState::Waiting;
                warn!(
                    "Job {} attempt {} failed, retrying in {:?}: {}",
                    job_id, attempt, delay, e
                );

                let requeue_inner = inner.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    requeue_inner.requeue(job_id);
                });
            }
        }
    }
}

async fn maintenance_loop(inner: Arc<QueueInner>) {
    let mut ticker = tokio::time::interval(inner.config.maintenance_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // interval fires immediately; skip the initial tick
    ticker.tick().await;

    loop {
        let stop = inner.shutdown_signal.notified();
        tokio::pin!(stop);
        stop.as_mut().enable();

        if inner.lock().shutting_down {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => run_sweep(&inner),
            _ = stop => break,
        }
    }
}

fn run_sweep(inner: &Arc<QueueInner>) {
    let now = Utc::now();
    let stall_after = chrono::Duration::from_std(inner.config.stall_after)
        .unwrap_or_else(|_| chrono::Duration::seconds(300));
    let retain_completed = chrono::Duration::from_std(inner.config.retain_completed)
        .unwrap_or_else(|_| chrono::Duration::hours(24));
    let retain_failed = chrono::Duration::from_std(inner.config.retain_failed)
        .unwrap_or_else(|_| chrono::Duration::days(7));

    let mut state = inner.lock();

    for job in state.jobs.values_mut() {
        if job.state == JobState::Active && !job.stalled && now - job.updated_at > stall_after {
            warn!("Job {} appears stalled (no progress)", job.id);
            job.stalled = true;
        }
    }

    state.jobs.retain(|_, job| match (job.state, job.finished_at) {
        (JobState::Completed, Some(at)) => now - at <= retain_completed,
        (JobState::Failed, Some(at)) => now - at <= retain_failed,
        _ => true,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullSink;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> QueueConfig {
        QueueConfig {
            workers: 1,
            max_attempts: 3,
            backoff: Duration::from_millis(10),
            stall_after: Duration::from_secs(300),
            retain_completed: Duration::from_secs(3600),
            retain_failed: Duration::from_secs(3600),
            maintenance_interval: Duration::from_secs(3600),
        }
    }

    /// Handler that fails a fixed number of times before succeeding.
    struct FlakyHandler {
        failures: AtomicU32,
    }

    impl FlakyHandler {
        fn new(failures: u32) -> Self {
            Self {
                failures: AtomicU32::new(failures),
            }
        }
    }

    #[async_trait]
    impl JobHandler for FlakyHandler {
        async fn handle(&self, _video_id: &str, sink: Arc<dyn ProgressSink>) -> Result<()> {
            sink.report(10, "processing");
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(KapitelError::Transcription("transient".into()));
            }
            sink.report(100, "completed");
            Ok(())
        }
    }

    async fn wait_for_terminal(queue: &JobQueue, job_id: Uuid) -> JobStatus {
        for _ in 0..500 {
            if let Some(status) = queue.status_by_id(job_id) {
                if status.state.is_terminal() {
                    return status;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job never reached a terminal state");
    }

    async fn wait_for_progress(queue: &JobQueue, job_id: Uuid, progress: u8) -> JobStatus {
        for _ in 0..500 {
            if let Some(status) = queue.status_by_id(job_id) {
                if status.progress == progress {
                    return status;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("progress update never observed");
    }

    #[tokio::test]
    async fn test_job_completes_first_try() {
        let queue = JobQueue::new(fast_config());
        queue.process(Arc::new(FlakyHandler::new(0)), Arc::new(NullSink));

        let handle = queue.enqueue("v1").unwrap();
        let status = wait_for_terminal(&queue, handle.id).await;

        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.attempts, 1);
        assert_eq!(status.progress, 100);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_fail_twice_then_succeed() {
        let queue = JobQueue::new(fast_config());
        queue.process(Arc::new(FlakyHandler::new(2)), Arc::new(NullSink));

        let handle = queue.enqueue("v1").unwrap();
        let status = wait_for_terminal(&queue, handle.id).await;

        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.attempts, 3);
        assert!(status.error.is_none());
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_exhausted_attempts_fail_permanently() {
        let queue = JobQueue::new(fast_config());
        queue.process(Arc::new(FlakyHandler::new(10)), Arc::new(NullSink));

        let handle = queue.enqueue("v1").unwrap();
        let status = wait_for_terminal(&queue, handle.id).await;

        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.attempts, 3);
        assert!(status.error.is_some());
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_same_video_not_deduplicated() {
        let queue = JobQueue::new(fast_config());

        let a = queue.enqueue("v1").unwrap();
        let b = queue.enqueue("v1").unwrap();
        assert_ne!(a.id, b.id);

        // status() reports the newest job for the video
        let status = queue.status("v1").unwrap();
        assert_eq!(status.id, b.id);
    }

    #[tokio::test]
    async fn test_status_unknown_video() {
        let queue = JobQueue::new(fast_config());
        assert!(queue.status("missing").is_none());
    }

    #[tokio::test]
    async fn test_enqueue_rejected_after_shutdown() {
        let queue = JobQueue::new(fast_config());
        queue.shutdown().await;
        assert!(queue.enqueue("v1").is_err());
    }

    #[tokio::test]
    async fn test_retention_purges_terminal_jobs() {
        let mut config = fast_config();
        config.retain_completed = Duration::from_millis(0);
        let queue = JobQueue::new(config);
        queue.process(Arc::new(FlakyHandler::new(0)), Arc::new(NullSink));

        let handle = queue.enqueue("v1").unwrap();
        wait_for_terminal(&queue, handle.id).await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.sweep();
        assert!(queue.status_by_id(handle.id).is_none());
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweep_flags_stalled_job_and_progress_clears_it() {
        struct StallingHandler {
            resume: Arc<Notify>,
            finish: Arc<Notify>,
        }

        #[async_trait]
        impl JobHandler for StallingHandler {
            async fn handle(&self, _video_id: &str, sink: Arc<dyn ProgressSink>) -> Result<()> {
                sink.report(45, "chunking");
                self.resume.notified().await;
                sink.report(95, "finalizing");
                self.finish.notified().await;
                Ok(())
            }
        }

        let resume = Arc::new(Notify::new());
        let finish = Arc::new(Notify::new());
        let mut config = fast_config();
        config.stall_after = Duration::ZERO;
        let queue = JobQueue::new(config);
        queue.process(
            Arc::new(StallingHandler {
                resume: resume.clone(),
                finish: finish.clone(),
            }),
            Arc::new(NullSink),
        );

        let handle = queue.enqueue("v1").unwrap();
        wait_for_progress(&queue, handle.id, 45).await;

        // Any elapsed time exceeds a zero stall window
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.sweep();
        let status = queue.status_by_id(handle.id).unwrap();
        assert_eq!(status.state, JobState::Active);
        assert!(status.stalled);

        // The next progress report clears the flag
        resume.notify_one();
        let status = wait_for_progress(&queue, handle.id, 95).await;
        assert!(!status.stalled);

        finish.notify_one();
        wait_for_terminal(&queue, handle.id).await;
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_progress_recorded_from_handler() {
        struct SlowHandler {
            release: Arc<Notify>,
        }

        #[async_trait]
        impl JobHandler for SlowHandler {
            async fn handle(&self, _video_id: &str, sink: Arc<dyn ProgressSink>) -> Result<()> {
                sink.report(45, "chunking");
                self.release.notified().await;
                Ok(())
            }
        }

        let release = Arc::new(Notify::new());
        let queue = JobQueue::new(fast_config());
        queue.process(
            Arc::new(SlowHandler {
                release: release.clone(),
            }),
            Arc::new(NullSink),
        );

        let handle = queue.enqueue("v1").unwrap();

        // Wait until the in-flight progress shows up
        let status = wait_for_progress(&queue, handle.id, 45).await;
        assert_eq!(status.state, JobState::Active);
        assert_eq!(status.stage.as_deref(), Some("chunking"));

        release.notify_one();
        wait_for_terminal(&queue, handle.id).await;
        queue.shutdown().await;
    }
}
