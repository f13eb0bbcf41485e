//! Session sink: where session-capture frames are recorded.
//!
//! Session persistence is owned elsewhere; runners only report frames and
//! never read session state back.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tethercap_core::{JobId, SessionId};

/// One frame attributed to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub job_id: JobId,
    pub sequence: u32,
    pub filename: String,
    pub size_bytes: Option<u64>,
    pub captured_at: DateTime<Utc>,
    pub frame_type: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionSinkError {
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
    #[error("session storage error: {0}")]
    Storage(String),
}

/// Receiver of session frames.
#[async_trait]
pub trait SessionSink: Send + Sync {
    /// Whether frames may be recorded against `session_id`.
    async fn session_exists(&self, _session_id: &SessionId) -> bool {
        true
    }

    async fn record_frame(
        &self,
        session_id: &SessionId,
        frame: FrameRecord,
    ) -> Result<(), SessionSinkError>;
}

/// In-memory sink.
///
/// An open sink (the default) accepts any session id and creates it on first
/// use. A sink built with [`InMemorySessionSink::with_sessions`] only accepts
/// the ids it was given.
#[derive(Debug, Default)]
pub struct InMemorySessionSink {
    known: Option<HashSet<SessionId>>,
    frames: RwLock<HashMap<SessionId, Vec<FrameRecord>>>,
}

impl InMemorySessionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sessions(ids: impl IntoIterator<Item = SessionId>) -> Self {
        Self {
            known: Some(ids.into_iter().collect()),
            frames: RwLock::new(HashMap::new()),
        }
    }

    /// Frames recorded for `session_id`, in arrival order.
    pub fn frames(&self, session_id: &SessionId) -> Vec<FrameRecord> {
        self.frames
            .read()
            .map(|frames| frames.get(session_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn accepts(&self, session_id: &SessionId) -> bool {
        self.known
            .as_ref()
            .map_or(true, |known| known.contains(session_id))
    }
}

#[async_trait]
impl SessionSink for InMemorySessionSink {
    async fn session_exists(&self, session_id: &SessionId) -> bool {
        self.accepts(session_id)
    }

    async fn record_frame(
        &self,
        session_id: &SessionId,
        frame: FrameRecord,
    ) -> Result<(), SessionSinkError> {
        if !self.accepts(session_id) {
            return Err(SessionSinkError::UnknownSession(session_id.clone()));
        }
        let mut frames = self
            .frames
            .write()
            .map_err(|e| SessionSinkError::Storage(e.to_string()))?;
        frames.entry(session_id.clone()).or_default().push(frame);
        Ok(())
    }
}
