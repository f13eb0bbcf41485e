//! Per-job runner task.
//!
//! One runner drives one job: it claims the job, then loops frame by frame
//! until the frame budget is spent, the operator cancels, or the camera
//! faults. Every suspension point (start delay, interval, pause, gateway
//! queue) is raced against the job's status channel, so a pause or cancel
//! takes effect at the next frame boundary. A frame that is already in the
//! camera is never abandoned.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use tethercap_core::{FrameParams, JobId, JobStatus, SessionId};

use super::store::{JobStore, JobStoreError};
use crate::camera::CapturedFrame;
use crate::gateway::CaptureGateway;
use crate::session::{FrameRecord, SessionSink};

/// Outcome of waiting at a frame boundary.
enum Gate {
    Proceed,
    Stop,
}

/// How a runner ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerExit {
    /// The job settled in this status.
    Stopped(JobStatus),
    /// The job was purged while the runner still held it.
    Purged,
    /// The runner was closed before it claimed the job; the job is still
    /// pending.
    Unclaimed,
}

/// Spawns and drives job runner tasks.
#[derive(Clone)]
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    gateway: Arc<CaptureGateway>,
    sink: Arc<dyn SessionSink>,
    closed: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        gateway: Arc<CaptureGateway>,
        sink: Arc<dyn SessionSink>,
    ) -> Self {
        Self {
            store,
            gateway,
            sink,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Refuse to claim any job from now on. Jobs already claimed carry on
    /// until they stop.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Run the job on its own task.
    pub fn spawn(&self, job_id: JobId, control: watch::Receiver<JobStatus>) -> JoinHandle<()> {
        self.spawn_after(job_id, control, None)
    }

    /// Run the job on its own task once `previous` (if any) reports a
    /// terminal status or goes away.
    pub fn spawn_after(
        &self,
        job_id: JobId,
        control: watch::Receiver<JobStatus>,
        previous: Option<watch::Receiver<JobStatus>>,
    ) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move {
            if let Some(mut previous) = previous {
                debug!(job_id = %job_id, "capture job queued behind its predecessor");
                let _ = previous.wait_for(|status| status.is_terminal()).await;
            }
            match runner.run(job_id, control).await {
                Ok(RunnerExit::Stopped(status)) => {
                    info!(job_id = %job_id, status = %status, "capture job finished")
                }
                Ok(RunnerExit::Purged) => {
                    debug!(job_id = %job_id, "capture job purged before its runner stopped")
                }
                Ok(RunnerExit::Unclaimed) => {
                    debug!(job_id = %job_id, "runner closed before the job started")
                }
                Err(e) => error!(job_id = %job_id, error = %e, "capture job runner failed"),
            }
        })
    }

    /// Claim a pending job and drive it until it stops.
    pub async fn run(
        &self,
        job_id: JobId,
        control: watch::Receiver<JobStatus>,
    ) -> Result<RunnerExit, JobStoreError> {
        let mut refused = false;
        let job = self.store.modify(job_id, &mut |job| {
            // Checked under the store lock so a concurrent close either sees
            // the job running or the claim refused.
            if self.closed.load(Ordering::SeqCst) {
                refused = true;
                return Ok(());
            }
            job.mark_running(Utc::now())
        })?;
        if refused {
            return Ok(RunnerExit::Unclaimed);
        }
        info!(
            job_id = %job_id,
            kind = %job.kind,
            total = job.total,
            interval_seconds = job.interval_seconds,
            "capture job started"
        );

        let first_frame_at = Instant::now() + seconds(job.kind_params.delay_before_start_seconds);
        match self.drive(job_id, control, first_frame_at).await {
            Ok(status) => Ok(RunnerExit::Stopped(status)),
            Err(JobStoreError::NotFound(_)) => Ok(RunnerExit::Purged),
            Err(e) => Err(e),
        }
    }

    /// Frame loop for a claimed job. Returns the job's status when it stops.
    async fn drive(
        &self,
        job_id: JobId,
        mut control: watch::Receiver<JobStatus>,
        mut next_frame_at: Instant,
    ) -> Result<JobStatus, JobStoreError> {
        loop {
            if let Gate::Stop = wait_runnable(&mut control, next_frame_at).await {
                break;
            }

            let slot = tokio::select! {
                slot = self.gateway.acquire() => slot,
                _ = interrupted(&mut control) => {
                    debug!(job_id = %job_id, "left the camera queue");
                    continue;
                }
            };

            // The status may have moved while we were queued.
            let job = self.store.get(job_id)?;
            if job.status.is_terminal() || job.is_exhausted() {
                break;
            }
            if job.status != JobStatus::Running {
                continue;
            }

            let frame = job.next_frame_params(Utc::now());
            debug!(job_id = %job_id, frame = frame.sequence, image = %frame.image_name, "frame started");
            let result = slot.capture(&frame).await;
            let now = Utc::now();

            let job = match result {
                Ok(captured) => {
                    let filename = captured.filename.clone();
                    let job = self.store.modify(job_id, &mut |job| {
                        job.record_success(filename.clone(), now);
                        Ok(())
                    })?;
                    drop(slot);
                    info!(
                        job_id = %job_id,
                        frame = frame.sequence,
                        filename = %captured.filename,
                        completed = job.completed,
                        total = job.total,
                        "frame captured"
                    );
                    if let Some(session_id) = &job.target_session_id {
                        self.forward(session_id, job_id, &frame, captured).await;
                    }
                    job
                }
                Err(err) if err.is_resource_fault() => {
                    let message = err.to_string();
                    self.store.modify(job_id, &mut |job| {
                        job.record_fault(message.clone(), now);
                        Ok(())
                    })?;
                    drop(slot);
                    error!(job_id = %job_id, frame = frame.sequence, error = %err, "camera fault, stopping job");
                    break;
                }
                Err(err) => {
                    let message = err.to_string();
                    let job = self.store.modify(job_id, &mut |job| {
                        job.record_failure(message.clone(), now);
                        Ok(())
                    })?;
                    drop(slot);
                    warn!(
                        job_id = %job_id,
                        frame = frame.sequence,
                        error = %err,
                        error_kind = err.kind(),
                        failed = job.failed,
                        "frame failed"
                    );
                    job
                }
            };

            if job.status.is_terminal() {
                break;
            }
            next_frame_at = Instant::now() + seconds(job.interval_seconds);
        }

        Ok(self.store.get(job_id)?.status)
    }

    async fn forward(
        &self,
        session_id: &SessionId,
        job_id: JobId,
        frame: &FrameParams,
        captured: CapturedFrame,
    ) {
        let record = FrameRecord {
            job_id,
            sequence: frame.sequence,
            filename: captured.filename,
            size_bytes: captured.size_bytes,
            captured_at: captured.timestamp,
            frame_type: frame.frame_type.clone(),
        };
        if let Err(e) = self.sink.record_frame(session_id, record).await {
            warn!(job_id = %job_id, session_id = %session_id, error = %e, "failed to record session frame");
        }
    }
}

/// Wait until the job is running and `deadline` has passed.
///
/// Pausing holds the wait; the deadline is kept, so a resume after it has
/// passed proceeds immediately.
async fn wait_runnable(control: &mut watch::Receiver<JobStatus>, deadline: Instant) -> Gate {
    loop {
        if control.has_changed().is_err() {
            return Gate::Stop;
        }
        let status = *control.borrow_and_update();
        if status.is_terminal() {
            return Gate::Stop;
        }
        if status != JobStatus::Running {
            if control.changed().await.is_err() {
                return Gate::Stop;
            }
            continue;
        }
        if Instant::now() >= deadline {
            return Gate::Proceed;
        }
        tokio::select! {
            _ = sleep_until(deadline) => {}
            changed = control.changed() => {
                if changed.is_err() {
                    return Gate::Stop;
                }
            }
        }
    }
}

/// Resolves once the job is no longer running.
async fn interrupted(control: &mut watch::Receiver<JobStatus>) {
    loop {
        if *control.borrow_and_update() != JobStatus::Running {
            return;
        }
        if control.changed().await.is_err() {
            return;
        }
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}
