//! Operator-facing entry point for capture jobs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tethercap_core::{
    FrameParams, JobError, JobId, JobListing, JobResult, JobSnapshot, JobStatus, StartJobRequest,
    ValidationLimits,
};

use super::runner::JobRunner;
use super::store::{InMemoryJobStore, JobStore};
use crate::camera::{Camera, CameraError, CapturedFrame};
use crate::gateway::{CameraStatus, CaptureGateway};
use crate::session::{InMemorySessionSink, SessionSink};

/// How long [`JobController::shutdown`] waits for in-flight frames.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Starts jobs and applies operator commands.
///
/// Commands only change the stored record; runners pick the change up at
/// their next frame boundary.
pub struct JobController {
    store: Arc<dyn JobStore>,
    gateway: Arc<CaptureGateway>,
    sink: Arc<dyn SessionSink>,
    runner: JobRunner,
    limits: ValidationLimits,
    runners: Mutex<HashMap<JobId, JoinHandle<()>>>,
}

impl JobController {
    pub fn new(
        store: Arc<dyn JobStore>,
        gateway: Arc<CaptureGateway>,
        sink: Arc<dyn SessionSink>,
        limits: ValidationLimits,
    ) -> Self {
        let runner = JobRunner::new(store.clone(), gateway.clone(), sink.clone());
        Self {
            store,
            gateway,
            sink,
            runner,
            limits,
            runners: Mutex::new(HashMap::new()),
        }
    }

    /// In-memory store and an open session sink in front of `camera`.
    pub fn in_memory(camera: Arc<dyn Camera>, limits: ValidationLimits) -> Self {
        Self::new(
            InMemoryJobStore::arc(),
            CaptureGateway::arc(camera),
            Arc::new(InMemorySessionSink::new()),
            limits,
        )
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Validate, record the job as pending and spawn its runner.
    pub async fn start(&self, request: StartJobRequest) -> JobResult<JobId> {
        self.check(&request).await?;

        let job = request.into_job();
        let (kind, total) = (job.kind, job.total);
        let job_id = self.store.insert(job)?;
        let control = self.store.subscribe(job_id)?;
        self.track(job_id, self.runner.spawn(job_id, control));

        info!(job_id = %job_id, kind = %kind, total, "capture job accepted");
        Ok(job_id)
    }

    /// Start several jobs that run one after another, in the given order.
    ///
    /// Every request is validated before any job is created. Each job is
    /// claimed only once the one before it is terminal, whatever its outcome.
    pub async fn start_batch(&self, requests: Vec<StartJobRequest>) -> JobResult<Vec<JobId>> {
        if requests.is_empty() {
            return Err(JobError::invalid_request("batch must contain at least one request"));
        }
        for (position, request) in requests.iter().enumerate() {
            self.check(request).await.map_err(|e| match e {
                JobError::InvalidRequest(msg) => {
                    JobError::invalid_request(format!("request {}: {msg}", position + 1))
                }
                other => other,
            })?;
        }

        let mut job_ids = Vec::with_capacity(requests.len());
        let mut previous = None;
        for request in requests {
            let job_id = self.store.insert(request.into_job())?;
            let control = self.store.subscribe(job_id)?;
            let handle = self.runner.spawn_after(job_id, control, previous.take());
            self.track(job_id, handle);
            previous = Some(self.store.subscribe(job_id)?);
            job_ids.push(job_id);
        }

        info!(jobs = job_ids.len(), "capture batch accepted");
        Ok(job_ids)
    }

    async fn check(&self, request: &StartJobRequest) -> JobResult<()> {
        request.validate(&self.limits)?;
        if let Some(session_id) = &request.target_session_id {
            if !self.sink.session_exists(session_id).await {
                return Err(JobError::invalid_request(format!(
                    "unknown session: {session_id}"
                )));
            }
        }
        Ok(())
    }

    fn track(&self, job_id: JobId, handle: JoinHandle<()>) {
        if let Ok(mut runners) = self.runners.lock() {
            runners.retain(|_, handle| !handle.is_finished());
            runners.insert(job_id, handle);
        }
    }

    pub fn status(&self, job_id: JobId) -> JobResult<JobSnapshot> {
        Ok(self.store.get(job_id)?.snapshot(Utc::now()))
    }

    pub fn list(&self) -> JobResult<JobListing> {
        let now = Utc::now();
        let snapshots = self
            .store
            .list()?
            .iter()
            .map(|job| job.snapshot(now))
            .collect();
        Ok(JobListing::from_snapshots(snapshots))
    }

    pub fn pause(&self, job_id: JobId) -> JobResult<JobSnapshot> {
        let job = self.store.modify(job_id, &mut |job| job.pause())?;
        info!(job_id = %job_id, completed = job.completed, "capture job paused");
        Ok(job.snapshot(Utc::now()))
    }

    pub fn resume(&self, job_id: JobId) -> JobResult<JobSnapshot> {
        let job = self.store.modify(job_id, &mut |job| job.resume())?;
        info!(job_id = %job_id, remaining = job.remaining(), "capture job resumed");
        Ok(job.snapshot(Utc::now()))
    }

    /// Cancel a running or paused job. Repeating the call is a no-op.
    pub fn cancel(&self, job_id: JobId) -> JobResult<JobSnapshot> {
        let now = Utc::now();
        let mut changed = false;
        let job = self.store.modify(job_id, &mut |job| {
            changed = job.cancel(now)?;
            Ok(())
        })?;
        if changed {
            info!(job_id = %job_id, completed = job.completed, "capture job cancelled");
        }
        Ok(job.snapshot(now))
    }

    /// Drop a finished job from the store.
    pub fn purge(&self, job_id: JobId) -> JobResult<()> {
        let job = self.store.purge(job_id)?;
        if let Ok(mut runners) = self.runners.lock() {
            runners.remove(&job_id);
        }
        info!(job_id = %job_id, status = %job.status, "capture job purged");
        Ok(())
    }

    /// Ad hoc capture outside any job; queues behind pending job frames.
    pub async fn capture_now(&self, params: FrameParams) -> Result<CapturedFrame, CameraError> {
        let result = self.gateway.capture(&params).await;
        match &result {
            Ok(frame) => info!(filename = %frame.filename, "ad hoc frame captured"),
            Err(e) => warn!(error = %e, error_kind = e.kind(), "ad hoc capture failed"),
        }
        result
    }

    pub fn camera_status(&self) -> CameraStatus {
        self.gateway.status()
    }

    /// Watch a job's status transitions.
    pub fn subscribe(&self, job_id: JobId) -> JobResult<watch::Receiver<JobStatus>> {
        Ok(self.store.subscribe(job_id)?)
    }

    /// Wait for the job to reach a terminal status.
    pub async fn wait(&self, job_id: JobId) -> JobResult<JobSnapshot> {
        let mut control = self.subscribe(job_id)?;
        // A closed channel means the job was purged; the status read below
        // reports that.
        let _ = control.wait_for(|status| status.is_terminal()).await;
        self.status(job_id)
    }

    /// Cancel every active job and wait up to [`SHUTDOWN_GRACE`] for the
    /// runners to stop.
    pub async fn shutdown(&self) {
        self.shutdown_within(SHUTDOWN_GRACE).await;
    }

    /// Cancel every active job and wait up to `grace` for the runners to stop.
    ///
    /// Frames already in the camera finish and are recorded. Pending jobs are
    /// left pending. Runners still busy at the deadline are aborted.
    pub async fn shutdown_within(&self, grace: Duration) {
        self.runner.close();
        let handles: Vec<(JobId, JoinHandle<()>)> = match self.runners.lock() {
            Ok(mut runners) => runners.drain().collect(),
            Err(_) => Vec::new(),
        };

        for (job_id, handle) in &handles {
            if handle.is_finished() {
                continue;
            }
            match self.cancel(*job_id) {
                Ok(_) => {}
                Err(JobError::InvalidTransition { from, .. }) => {
                    debug!(job_id = %job_id, status = %from, "job left as is on shutdown")
                }
                Err(e) => warn!(job_id = %job_id, error = %e, "could not cancel job on shutdown"),
            }
        }

        let deadline = Instant::now() + grace;
        let mut aborted = 0usize;
        for (job_id, mut handle) in handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!(job_id = %job_id, "runner still busy at shutdown deadline, aborting");
                handle.abort();
                let _ = handle.await;
                aborted += 1;
            }
        }
        info!(aborted, "job controller stopped");
    }
}
