//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::watch;

use tethercap_core::{Job, JobAction, JobError, JobId, JobResult, JobStatus};

/// Job store abstraction.
///
/// The store is the single authority over job records. Every mutation goes
/// through [`JobStore::modify`], which applies a transition atomically:
/// readers see either the old record or the new one, never a mix.
pub trait JobStore: Send + Sync {
    /// Insert a new job.
    fn insert(&self, job: Job) -> Result<JobId, JobStoreError>;

    /// Get a copy of a job.
    fn get(&self, job_id: JobId) -> Result<Job, JobStoreError>;

    /// Apply `f` to the job and commit the result.
    ///
    /// `f` runs on a copy; if it returns an error nothing is committed and the
    /// error comes back as [`JobStoreError::Rejected`].
    fn modify(
        &self,
        job_id: JobId,
        f: &mut dyn FnMut(&mut Job) -> JobResult<()>,
    ) -> Result<Job, JobStoreError>;

    /// Watch the job's status. The receiver is closed when the job is purged.
    fn subscribe(&self, job_id: JobId) -> Result<watch::Receiver<JobStatus>, JobStoreError>;

    /// All jobs, oldest first.
    fn list(&self) -> Result<Vec<Job>, JobStoreError>;

    /// Remove a terminal job.
    fn purge(&self, job_id: JobId) -> Result<Job, JobStoreError>;

    /// Get job statistics.
    fn stats(&self) -> Result<JobStats, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error(transparent)]
    Rejected(JobError),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<JobStoreError> for JobError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::NotFound(id) => JobError::NotFound(id),
            JobStoreError::Rejected(inner) => inner,
            other => JobError::store(other.to_string()),
        }
    }
}

/// Job statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub paused: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub error: usize,
}

impl JobStats {
    pub fn active(&self) -> usize {
        self.pending + self.running + self.paused
    }

    pub fn finished(&self) -> usize {
        self.completed + self.cancelled + self.error
    }
}

#[derive(Debug)]
struct StoredJob {
    job: Job,
    status_tx: watch::Sender<JobStatus>,
}

/// In-memory job store.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, StoredJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn poisoned<T>(err: std::sync::PoisonError<T>) -> JobStoreError {
    JobStoreError::Storage(format!("job store lock poisoned: {err}"))
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        let (status_tx, _) = watch::channel(job.status);
        jobs.insert(id, StoredJob { job, status_tx });
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        jobs.get(&job_id)
            .map(|stored| stored.job.clone())
            .ok_or(JobStoreError::NotFound(job_id))
    }

    fn modify(
        &self,
        job_id: JobId,
        f: &mut dyn FnMut(&mut Job) -> JobResult<()>,
    ) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let stored = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;

        let mut next = stored.job.clone();
        f(&mut next).map_err(JobStoreError::Rejected)?;

        let status_changed = next.status != stored.job.status;
        stored.job = next;
        if status_changed {
            stored.status_tx.send_replace(stored.job.status);
        }
        Ok(stored.job.clone())
    }

    fn subscribe(&self, job_id: JobId) -> Result<watch::Receiver<JobStatus>, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        jobs.get(&job_id)
            .map(|stored| stored.status_tx.subscribe())
            .ok_or(JobStoreError::NotFound(job_id))
    }

    fn list(&self) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut result: Vec<_> = jobs.values().map(|stored| stored.job.clone()).collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(result)
    }

    fn purge(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let stored = jobs.get(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        if !stored.job.status.is_terminal() {
            return Err(JobStoreError::Rejected(JobError::invalid_transition(
                job_id,
                stored.job.status,
                JobAction::Purge,
            )));
        }
        jobs.remove(&job_id)
            .map(|stored| stored.job)
            .ok_or(JobStoreError::NotFound(job_id))
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut stats = JobStats::default();

        for stored in jobs.values() {
            match stored.job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Paused => stats.paused += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
                JobStatus::Error => stats.error += 1,
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tethercap_core::{JobKind, KindParams};

    fn bulk(total: u32) -> Job {
        Job::new(JobKind::Bulk, total, 0.0, KindParams::default(), None)
    }

    #[test]
    fn insert_and_get() {
        let store = InMemoryJobStore::new();
        let job = bulk(3);
        let id = store.insert(job.clone()).unwrap();
        assert_eq!(store.get(id).unwrap(), job);
        assert!(matches!(store.insert(job), Err(JobStoreError::AlreadyExists(_))));
    }

    #[test]
    fn unknown_job_is_not_found() {
        let store = InMemoryJobStore::new();
        let id = JobId::new();
        assert!(matches!(store.get(id), Err(JobStoreError::NotFound(_))));
        assert!(matches!(
            store.modify(id, &mut |job| job.pause()),
            Err(JobStoreError::NotFound(_))
        ));
        assert_eq!(
            JobError::from(store.get(id).unwrap_err()),
            JobError::NotFound(id)
        );
    }

    #[test]
    fn rejected_transition_commits_nothing() {
        let store = InMemoryJobStore::new();
        let id = store.insert(bulk(3)).unwrap();

        let err = store
            .modify(id, &mut |job| {
                job.completed = 2;
                job.pause()
            })
            .unwrap_err();
        assert!(matches!(
            JobError::from(err),
            JobError::InvalidTransition { from: JobStatus::Pending, action: JobAction::Pause, .. }
        ));
        assert_eq!(store.get(id).unwrap().completed, 0);
    }

    #[test]
    fn subscribers_see_status_changes() {
        let store = InMemoryJobStore::new();
        let id = store.insert(bulk(3)).unwrap();
        let mut rx = store.subscribe(id).unwrap();
        assert_eq!(*rx.borrow_and_update(), JobStatus::Pending);

        store.modify(id, &mut |job| job.mark_running(Utc::now())).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), JobStatus::Running);

        // Counter-only updates do not wake watchers.
        store
            .modify(id, &mut |job| {
                job.record_success("a.jpg".to_string(), Utc::now());
                Ok(())
            })
            .unwrap();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn purge_only_removes_terminal_jobs() {
        let store = InMemoryJobStore::new();
        let id = store.insert(bulk(1)).unwrap();
        let rx = store.subscribe(id).unwrap();

        assert!(matches!(store.purge(id), Err(JobStoreError::Rejected(_))));

        store.modify(id, &mut |job| job.mark_running(Utc::now())).unwrap();
        store
            .modify(id, &mut |job| {
                job.record_success("a.jpg".to_string(), Utc::now());
                Ok(())
            })
            .unwrap();
        let purged = store.purge(id).unwrap();
        assert_eq!(purged.status, JobStatus::Completed);
        assert!(matches!(store.get(id), Err(JobStoreError::NotFound(_))));
        assert!(rx.has_changed().is_err());
    }

    #[test]
    fn list_and_stats() {
        let store = InMemoryJobStore::new();
        let first = store.insert(bulk(2)).unwrap();
        let second = store.insert(bulk(2)).unwrap();
        store.modify(second, &mut |job| job.mark_running(Utc::now())).unwrap();
        store.modify(second, &mut |job| job.pause()).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].created_at <= listed[1].created_at);
        assert!(listed.iter().any(|j| j.id == first));

        let stats = store.stats().unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.paused, 1);
        assert_eq!(stats.active(), 2);
        assert_eq!(stats.finished(), 0);
    }
}
