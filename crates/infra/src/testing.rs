//! Instrumented camera shared by the runner and controller tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;

use tethercap_core::FrameParams;

use crate::camera::{Camera, CameraError, CapturedFrame};

/// One `capture()` call as seen by the camera.
#[derive(Debug, Clone)]
pub(crate) struct CaptureCall {
    pub image_name: String,
    pub started: Instant,
    pub finished: Instant,
}

/// Camera with fixed latency, a scripted error sequence and an overlap
/// detector.
pub(crate) struct ScriptedCamera {
    latency: Duration,
    script: Mutex<VecDeque<Option<CameraError>>>,
    calls: Mutex<Vec<CaptureCall>>,
    in_flight: AtomicBool,
    overlapped: AtomicBool,
}

impl ScriptedCamera {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicBool::new(false),
            overlapped: AtomicBool::new(false),
        }
    }

    /// Outcomes for the next calls in order; `None` succeeds. Calls past the
    /// end of the script succeed.
    pub fn with_script(self, script: impl IntoIterator<Item = Option<CameraError>>) -> Self {
        *self.script.lock().unwrap() = script.into_iter().collect();
        self
    }

    pub fn calls(&self) -> Vec<CaptureCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Camera for ScriptedCamera {
    async fn capture(&self, params: &FrameParams) -> Result<CapturedFrame, CameraError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        let started = Instant::now();
        tokio::time::sleep(self.latency).await;
        self.in_flight.store(false, Ordering::SeqCst);

        self.calls.lock().unwrap().push(CaptureCall {
            image_name: params.image_name.clone(),
            started,
            finished: Instant::now(),
        });

        match self.script.lock().unwrap().pop_front().flatten() {
            Some(err) => Err(err),
            None => Ok(CapturedFrame {
                filename: format!("{}.cr2", params.image_name),
                size_bytes: Some(1024),
                timestamp: Utc::now(),
            }),
        }
    }

    fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        true
    }
}
