//! Camera-facing value types shared by the server and the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A frame the camera wrote out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedFrame {
    pub filename: String,
    pub size_bytes: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// Camera state as reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraStatus {
    pub connected: bool,
    pub busy: bool,
    #[serde(default)]
    pub captures_started: u64,
}
