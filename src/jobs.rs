//! Pollable batch-match jobs keyed by caller.
//!
//! One job per caller key. Starting a new batch replaces the caller's
//! previous job and aborts its task. Every write is checked against the
//! entry's generation, so a task that is still draining cannot write either.

use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{info, warn};

use crate::error::Result;
use crate::matcher::{Matcher, ProgressSink};
use crate::models::{BatchOutcome, JobStarted, JobState, LocalTrack, MatchJob, PollResponse};

struct JobEntry {
    generation: u64,
    job: MatchJob,
    finished_at: Option<Instant>,
    task: Option<AbortHandle>,
}

pub struct JobTracker {
    matcher: Matcher,
    jobs: Mutex<FxHashMap<String, JobEntry>>,
    next_generation: AtomicU64,
    retention: Duration,
}

/// Forwards orchestrator progress into one job entry.
struct JobProgress {
    tracker: Arc<JobTracker>,
    key: String,
    generation: u64,
}

impl ProgressSink for JobProgress {
    fn group_scored(&self, current: usize, total: usize) {
        self.tracker.update(&self.key, self.generation, |entry| {
            entry.job.state = JobState::Running;
            entry.job.current = entry.job.current.max(current.min(total));
        });
    }
}

impl JobTracker {
    pub fn new(matcher: Matcher) -> Self {
        let retention = matcher.config().jobs.retention();
        Self {
            matcher,
            jobs: Mutex::new(FxHashMap::default()),
            next_generation: AtomicU64::new(1),
            retention,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<String, JobEntry>> {
        // Entries are plain data, so a poisoned map is still consistent
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `f` to the entry for `key` only if it still belongs to `generation`.
    fn update(&self, key: &str, generation: u64, f: impl FnOnce(&mut JobEntry)) -> bool {
        let mut jobs = self.lock();
        match jobs.get_mut(key) {
            Some(entry) if entry.generation == generation => {
                f(entry);
                true
            }
            _ => false,
        }
    }

    /// Register a new job for `key` and run it in the background.
    /// Must be called from within a tokio runtime.
    pub fn start_match(self: &Arc<Self>, key: &str, tracks: Vec<LocalTrack>) -> JobStarted {
        self.evict_expired();

        let groups = self.matcher.group(&tracks);
        let total = groups.len();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let previous = self.lock().insert(
            key.to_string(),
            JobEntry {
                generation,
                job: MatchJob::pending(total),
                finished_at: None,
                task: None,
            },
        );
        if let Some(previous) = previous {
            info!("Replacing existing job for {}", key);
            if let Some(task) = previous.task {
                task.abort();
            }
        }
        info!("Job started for {}: {} tracks, {} groups", key, tracks.len(), total);

        let tracker = Arc::clone(self);
        let task_key = key.to_string();
        let handle = tokio::spawn(async move {
            let key = task_key;
            tracker.update(&key, generation, |entry| entry.job.state = JobState::Running);
            let sink = JobProgress {
                tracker: Arc::clone(&tracker),
                key: key.clone(),
                generation,
            };
            let outcome = tracker
                .matcher
                .match_groups(&groups, tracks.len(), &sink)
                .await;
            tracker.finish(&key, generation, outcome);
        });
        self.update(key, generation, |entry| {
            if !entry.job.done {
                entry.task = Some(handle.abort_handle());
            }
        });

        JobStarted { total }
    }

    fn finish(&self, key: &str, generation: u64, outcome: Result<BatchOutcome>) {
        let written = self.update(key, generation, |entry| {
            match outcome {
                Ok(outcome) => {
                    let matched = outcome.results.iter().filter(|r| r.matched).count();
                    info!(
                        "Job for {} done: {} matched of {} (threshold {:.2})",
                        key,
                        matched,
                        outcome.results.len(),
                        outcome.threshold
                    );
                    entry.job.state = JobState::Done;
                    entry.job.current = entry.job.total;
                    entry.job.results = Some(outcome.results);
                    entry.job.threshold = Some(outcome.threshold);
                }
                Err(e) => {
                    warn!("Job for {} failed: {}", key, e);
                    entry.job.state = JobState::Failed;
                    entry.job.error = Some(format!("{}: {}", e.tag(), e));
                }
            }
            entry.job.done = true;
            entry.finished_at = Some(Instant::now());
        });
        if !written {
            info!("Discarding outcome of replaced job for {}", key);
        }
    }

    /// Snapshot of the caller's job, or `exists: false`.
    pub fn poll_match(&self, key: &str) -> PollResponse {
        self.evict_expired();
        match self.lock().get(key) {
            Some(entry) => PollResponse::tracked(entry.job.clone()),
            None => PollResponse::missing(),
        }
    }

    /// Drop finished jobs older than the retention window.
    /// Returns the number of evicted jobs.
    pub fn evict_expired(&self) -> usize {
        let retention = self.retention;
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|_, entry| entry.finished_at.map_or(true, |t| t.elapsed() < retention));
        before - jobs.len()
    }

    pub fn job_count(&self) -> usize {
        self.lock().len()
    }

    /// Periodically evict expired jobs. The task ends once the tracker is
    /// dropped.
    pub fn spawn_eviction_task(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let Some(tracker) = weak.upgrade() else {
                    break;
                };
                let evicted = tracker.evict_expired();
                if evicted > 0 {
                    info!("Evicted {} expired jobs", evicted);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SearchCatalog;
    use crate::config::MatchConfig;
    use crate::error::RelinkError;
    use crate::models::CatalogCandidate;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct PerfectCatalog;

    #[async_trait]
    impl SearchCatalog for PerfectCatalog {
        fn name(&self) -> &'static str {
            "perfect"
        }

        async fn search(&self, _query: &str) -> Result<Vec<CatalogCandidate>> {
            Ok(vec![CatalogCandidate {
                id: "sp1".to_string(),
                name: "Song A".to_string(),
                artists: vec!["Artist X".to_string()],
                duration_ms: 200_000,
                external_url: String::new(),
            }])
        }
    }

    struct UnlinkedCatalog;

    #[async_trait]
    impl SearchCatalog for UnlinkedCatalog {
        fn name(&self) -> &'static str {
            "unlinked"
        }

        async fn search(&self, _query: &str) -> Result<Vec<CatalogCandidate>> {
            Err(RelinkError::NotLinked)
        }
    }

    /// Blocks every search until released.
    struct GatedCatalog(Arc<Notify>);

    #[async_trait]
    impl SearchCatalog for GatedCatalog {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn search(&self, _query: &str) -> Result<Vec<CatalogCandidate>> {
            self.0.notified().await;
            Ok(Vec::new())
        }
    }

    fn tracker(catalog: impl SearchCatalog + 'static, retention_secs: u64) -> Arc<JobTracker> {
        let mut config = MatchConfig::default();
        config.search.delay_ms = 0;
        config.jobs.retention_secs = retention_secs;
        let matcher = Matcher::new(Arc::new(catalog), Arc::new(config));
        Arc::new(JobTracker::new(matcher))
    }

    fn tracks() -> Vec<LocalTrack> {
        vec![
            LocalTrack::new("Song A (Official Video)", "Artist X", 200_000),
            LocalTrack::new("Song A (Official Video) - copy (1)", "Artist X", 200_100),
        ]
    }

    async fn wait_done(tracker: &JobTracker, key: &str) -> MatchJob {
        for _ in 0..200 {
            if let Some(job) = tracker.poll_match(key).job {
                if job.done {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {key} did not finish");
    }

    #[tokio::test]
    async fn test_unknown_key() {
        let tracker = tracker(PerfectCatalog, 300);
        let poll = tracker.poll_match("nobody");
        assert!(!poll.exists);
        assert!(poll.job.is_none());
    }

    #[tokio::test]
    async fn test_job_completes() {
        let tracker = tracker(PerfectCatalog, 300);
        let started = tracker.start_match("alice", tracks());
        assert_eq!(started.total, 1);

        let job = wait_done(&tracker, "alice").await;
        assert_eq!(job.state, JobState::Done);
        assert_eq!(job.current, job.total);
        assert_eq!(job.error, None);
        let results = job.results.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].matched);
        assert_eq!(results[0].duplicate_count, 1);
        assert!(results[1].is_duplicate);
        assert!(job.threshold.is_some());
    }

    #[tokio::test]
    async fn test_authorization_failure_is_tagged() {
        let tracker = tracker(UnlinkedCatalog, 300);
        tracker.start_match("bob", tracks());

        let job = wait_done(&tracker, "bob").await;
        assert_eq!(job.state, JobState::Failed);
        assert!(job.results.is_none());
        assert!(job.error.unwrap().starts_with("not_linked: "));
    }

    #[tokio::test]
    async fn test_empty_batch_finishes() {
        let tracker = tracker(PerfectCatalog, 300);
        assert_eq!(tracker.start_match("carol", Vec::new()).total, 0);
        let job = wait_done(&tracker, "carol").await;
        assert_eq!(job.state, JobState::Done);
        assert_eq!(job.results.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_new_batch_replaces_old() {
        let gate = Arc::new(Notify::new());
        let tracker = tracker(GatedCatalog(Arc::clone(&gate)), 300);

        tracker.start_match("dave", tracks());
        let second = vec![
            LocalTrack::new("One", "A", 0),
            LocalTrack::new("Two", "B", 0),
        ];
        assert_eq!(tracker.start_match("dave", second).total, 2);

        let poll = tracker.poll_match("dave").job.unwrap();
        assert_eq!(poll.total, 2);
        assert!(!poll.done);

        // Release searches until both tasks drain
        for _ in 0..200 {
            gate.notify_waiters();
            tokio::task::yield_now().await;
            if tracker.poll_match("dave").job.is_some_and(|j| j.done) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let job = tracker.poll_match("dave").job.unwrap();
        assert!(job.done);
        assert_eq!(job.total, 2);
        assert_eq!(job.results.unwrap().len(), 2);
    }

    /// Blocks forever and counts searches dropped before completing.
    struct HangingCatalog {
        started: Arc<AtomicUsize>,
        cancelled: Arc<AtomicUsize>,
    }

    struct CancelGuard(Arc<AtomicUsize>);

    impl Drop for CancelGuard {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SearchCatalog for HangingCatalog {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn search(&self, _query: &str) -> Result<Vec<CatalogCandidate>> {
            let _guard = CancelGuard(Arc::clone(&self.cancelled));
            self.started.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_replaced_job_task_is_aborted() {
        let started = Arc::new(AtomicUsize::new(0));
        let cancelled = Arc::new(AtomicUsize::new(0));
        let tracker = tracker(
            HangingCatalog {
                started: Arc::clone(&started),
                cancelled: Arc::clone(&cancelled),
            },
            300,
        );

        tracker.start_match("hank", tracks());
        for _ in 0..200 {
            if started.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(cancelled.load(Ordering::SeqCst), 0);

        tracker.start_match("hank", tracks());
        for _ in 0..200 {
            if cancelled.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        assert!(!tracker.poll_match("hank").job.unwrap().done);
    }

    #[tokio::test]
    async fn test_finished_jobs_are_evicted() {
        let tracker = tracker(PerfectCatalog, 0);
        tracker.start_match("erin", tracks());
        for _ in 0..200 {
            if tracker.job_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            tracker.evict_expired();
        }
        assert!(!tracker.poll_match("erin").exists);
    }

    #[tokio::test]
    async fn test_eviction_task_reaps() {
        let tracker = tracker(PerfectCatalog, 0);
        let reaper = tracker.spawn_eviction_task(Duration::from_millis(5));
        tracker.start_match("gina", tracks());
        for _ in 0..200 {
            if tracker.job_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(tracker.job_count(), 0);
        reaper.abort();
    }

    #[tokio::test]
    async fn test_stale_generation_cannot_write() {
        let tracker = tracker(PerfectCatalog, 300);
        tracker.lock().insert(
            "frank".to_string(),
            JobEntry {
                generation: 7,
                job: MatchJob::pending(3),
                finished_at: None,
                task: None,
            },
        );
        assert!(!tracker.update("frank", 6, |e| e.job.current = 3));
        assert!(tracker.update("frank", 7, |e| e.job.current = 1));
        assert_eq!(tracker.poll_match("frank").job.unwrap().current, 1);
    }
}
