//! Poll reconciler: keeps a local copy of one job's status.
//!
//! The reconciler is a two-state machine. While `Polling`, a fixed-period
//! timer fetches the job and replaces the cached snapshot wholesale on every
//! successful response. Failed polls are skipped and leave the cache as it
//! was. A terminal status, an explicit [`PollReconciler::stop`], or dropping
//! the reconciler returns it to `Idle`. The cache is eventually consistent:
//! intermediate states between two polls are never seen.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use tethercap_core::{JobId, JobSnapshot};

use crate::http::{ClientError, JobsClient};

/// Anything that can report a job's current status.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, job_id: JobId) -> Result<JobSnapshot, ClientError>;
}

#[async_trait]
impl StatusSource for JobsClient {
    async fn fetch_status(&self, job_id: JobId) -> Result<JobSnapshot, ClientError> {
        self.status(job_id).await
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub period: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    Idle,
    Polling,
}

/// Watches one job.
pub struct PollReconciler {
    job_id: JobId,
    source: Arc<dyn StatusSource>,
    config: PollConfig,
    state: Arc<watch::Sender<ReconcilerState>>,
    cache: Arc<watch::Sender<Option<JobSnapshot>>>,
    shutdown: Option<Arc<Notify>>,
    task: Option<JoinHandle<()>>,
}

impl PollReconciler {
    /// Create an idle reconciler for `job_id`.
    pub fn new(source: Arc<dyn StatusSource>, job_id: JobId, config: PollConfig) -> Self {
        let (state, _) = watch::channel(ReconcilerState::Idle);
        let (cache, _) = watch::channel(None);
        Self {
            job_id,
            source,
            config,
            state: Arc::new(state),
            cache: Arc::new(cache),
            shutdown: None,
            task: None,
        }
    }

    /// Create a reconciler and start polling right away.
    pub fn watch(source: Arc<dyn StatusSource>, job_id: JobId, config: PollConfig) -> Self {
        let mut reconciler = Self::new(source, job_id, config);
        reconciler.start();
        reconciler
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn state(&self) -> ReconcilerState {
        *self.state.borrow()
    }

    /// Last snapshot received, if any.
    pub fn snapshot(&self) -> Option<JobSnapshot> {
        self.cache.borrow().clone()
    }

    /// Receiver notified on every cache replacement.
    pub fn subscribe(&self) -> watch::Receiver<Option<JobSnapshot>> {
        self.cache.subscribe()
    }

    /// Idle -> polling. No-op while already polling.
    pub fn start(&mut self) {
        if self.state() == ReconcilerState::Polling {
            return;
        }

        let shutdown = Arc::new(Notify::new());
        self.state.send_replace(ReconcilerState::Polling);
        self.task = Some(tokio::spawn(poll_loop(
            self.job_id,
            self.source.clone(),
            self.config.period,
            self.state.clone(),
            self.cache.clone(),
            shutdown.clone(),
        )));
        self.shutdown = Some(shutdown);
        tracing::debug!(job_id = %self.job_id, "status polling started");
    }

    /// Polling -> idle. Returns once the timer has stopped.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.notify_one();
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.state.send_replace(ReconcilerState::Idle);
    }

    /// Wait until polling has ended, returning the final cached snapshot.
    pub async fn finished(&self) -> Option<JobSnapshot> {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == ReconcilerState::Idle).await;
        self.snapshot()
    }
}

impl Drop for PollReconciler {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.notify_one();
        }
    }
}

async fn poll_loop(
    job_id: JobId,
    source: Arc<dyn StatusSource>,
    period: Duration,
    state: Arc<watch::Sender<ReconcilerState>>,
    cache: Arc<watch::Sender<Option<JobSnapshot>>>,
    shutdown: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = shutdown.notified() => break,
            result = source.fetch_status(job_id) => result,
        };

        match result {
            Ok(snapshot) => {
                let terminal = snapshot.is_terminal();
                let status = snapshot.status();
                cache.send_replace(Some(snapshot));
                if terminal {
                    tracing::debug!(job_id = %job_id, status = %status, "job finished, polling stopped");
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(job_id = %job_id, error = %e, "status poll failed, keeping cached status");
            }
        }
    }

    state.send_replace(ReconcilerState::Idle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tethercap_core::{Job, JobKind, JobStatus, KindParams};
    use tokio::time::Instant;

    /// Replays scripted responses; the last one repeats forever.
    struct FakeSource {
        script: Mutex<VecDeque<Result<JobStatus, ClientError>>>,
        last: Mutex<Result<JobStatus, ClientError>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl FakeSource {
        fn new(script: Vec<Result<JobStatus, ClientError>>) -> Arc<Self> {
            let last = script
                .last()
                .cloned()
                .unwrap_or(Ok(JobStatus::Running));
            Arc::new(Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(last),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn snapshot(job_id: JobId, status: JobStatus, completed: u32) -> JobSnapshot {
        let mut job = Job::new(JobKind::Bulk, 5, 1.0, KindParams::default(), None);
        job.id = job_id;
        job.status = status;
        job.completed = completed;
        job.snapshot(Utc::now())
    }

    #[async_trait]
    impl StatusSource for FakeSource {
        async fn fetch_status(&self, job_id: JobId) -> Result<JobSnapshot, ClientError> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(Instant::now());
                calls.len() as u32
            };
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.last.lock().unwrap().clone());
            next.map(|status| snapshot(job_id, status, n))
        }
    }

    fn network_error() -> Result<JobStatus, ClientError> {
        Err(ClientError::Network("connection refused".to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_terminal_then_goes_idle() {
        let source = FakeSource::new(vec![
            Ok(JobStatus::Running),
            Ok(JobStatus::Running),
            Ok(JobStatus::Completed),
        ]);
        let job_id = JobId::new();
        let reconciler = PollReconciler::watch(source.clone(), job_id, PollConfig::default());
        assert_eq!(reconciler.state(), ReconcilerState::Polling);

        let last = reconciler.finished().await.unwrap();
        assert_eq!(last.status(), JobStatus::Completed);
        assert_eq!(last.id(), job_id);
        assert_eq!(reconciler.state(), ReconcilerState::Idle);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let calls = source.calls();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_millis(1000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_polls_keep_the_cached_snapshot() {
        let source = FakeSource::new(vec![
            Ok(JobStatus::Running),
            network_error(),
            Err(ClientError::Api {
                status: 500,
                code: "store_error".to_string(),
                message: "boom".to_string(),
            }),
            Ok(JobStatus::Cancelled),
        ]);
        let reconciler = PollReconciler::watch(source.clone(), JobId::new(), PollConfig::default());
        let mut updates = reconciler.subscribe();

        updates.changed().await.unwrap();
        assert_eq!(updates.borrow_and_update().as_ref().unwrap().job.completed, 1);

        // Two failing ticks later the first snapshot is still cached.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(source.calls().len(), 3);
        assert!(!updates.has_changed().unwrap());
        assert_eq!(reconciler.snapshot().unwrap().status(), JobStatus::Running);

        let last = reconciler.finished().await.unwrap();
        assert_eq!(last.status(), JobStatus::Cancelled);
        assert_eq!(last.job.completed, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_stop_halts_the_timer() {
        let source = FakeSource::new(vec![Ok(JobStatus::Running)]);
        let mut reconciler =
            PollReconciler::watch(source.clone(), JobId::new(), PollConfig::default());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(source.calls().len(), 4);

        reconciler.stop().await;
        assert_eq!(reconciler.state(), ReconcilerState::Idle);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.calls().len(), 4);
        assert!(reconciler.snapshot().is_some());

        // Idle -> polling again.
        reconciler.start();
        assert_eq!(reconciler.state(), ReconcilerState::Polling);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls().len(), 5);
        reconciler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_reconciler_stops_polling() {
        let source = FakeSource::new(vec![network_error()]);
        let reconciler = PollReconciler::watch(source.clone(), JobId::new(), PollConfig {
            period: Duration::from_millis(250),
        });

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(reconciler.snapshot().is_none());
        drop(reconciler);

        let before = source.calls().len();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.calls().len(), before);
    }

    #[tokio::test]
    async fn new_reconciler_is_idle() {
        let source = FakeSource::new(vec![]);
        let reconciler = PollReconciler::new(source.clone(), JobId::new(), PollConfig::default());
        assert_eq!(reconciler.state(), ReconcilerState::Idle);
        assert!(reconciler.snapshot().is_none());
        assert!(source.calls().is_empty());
    }
}
