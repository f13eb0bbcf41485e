//! Camera capability consumed by the capture gateway.
//!
//! The physical driver lives outside this workspace; everything here talks to
//! it through the [`Camera`] trait. [`SimulatedCamera`] stands in for real
//! hardware in the server binary and in tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use tethercap_core::FrameParams;
pub use tethercap_core::CapturedFrame;

/// Camera failure.
///
/// Frame-level failures leave the camera usable; resource faults mean no
/// further frame can succeed without operator intervention.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera busy: {0}")]
    Busy(String),
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("camera timed out: {0}")]
    Timeout(String),
    #[error("camera I/O error: {0}")]
    Io(String),
    #[error("camera not connected: {0}")]
    NotConnected(String),
    #[error("camera USB error: {0}")]
    Usb(String),
}

impl CameraError {
    pub fn is_resource_fault(&self) -> bool {
        matches!(self, CameraError::NotConnected(_) | CameraError::Usb(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CameraError::Busy(_) => "busy",
            CameraError::Capture(_) => "capture",
            CameraError::Timeout(_) => "timeout",
            CameraError::Io(_) => "io",
            CameraError::NotConnected(_) => "not_connected",
            CameraError::Usb(_) => "usb",
        }
    }
}

/// Tethered camera driver.
///
/// Callers other than the capture gateway must never invoke `capture`
/// directly; the gateway is what keeps frames from overlapping.
#[async_trait]
pub trait Camera: Send + Sync {
    /// Take one frame. Safe to retry after an error.
    async fn capture(&self, params: &FrameParams) -> Result<CapturedFrame, CameraError>;

    /// Whether the driver itself reports an operation in progress.
    fn is_busy(&self) -> bool;

    fn is_connected(&self) -> bool;
}

/// Software camera with a fixed capture latency.
#[derive(Debug)]
pub struct SimulatedCamera {
    latency: Duration,
    connected: AtomicBool,
    busy: AtomicBool,
    frames: AtomicU64,
}

impl SimulatedCamera {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            connected: AtomicBool::new(true),
            busy: AtomicBool::new(false),
            frames: AtomicU64::new(0),
        }
    }

    /// Simulate plugging/unplugging the camera.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Frames produced so far.
    pub fn frames_captured(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

#[async_trait]
impl Camera for SimulatedCamera {
    async fn capture(&self, params: &FrameParams) -> Result<CapturedFrame, CameraError> {
        if !self.is_connected() {
            return Err(CameraError::NotConnected("simulated camera unplugged".to_string()));
        }
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(CameraError::Busy("simulated camera already capturing".to_string()));
        }

        tokio::time::sleep(self.latency).await;
        let n = self.frames.fetch_add(1, Ordering::SeqCst);
        self.busy.store(false, Ordering::SeqCst);

        Ok(CapturedFrame {
            filename: format!("{}.jpg", params.image_name),
            size_bytes: Some(6_000_000 + n % 1024),
            timestamp: Utc::now(),
        })
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(name: &str) -> FrameParams {
        FrameParams::ad_hoc(Some(name), None, None, Utc::now())
    }

    #[test]
    fn fault_classification() {
        assert!(CameraError::NotConnected("x".into()).is_resource_fault());
        assert!(CameraError::Usb("x".into()).is_resource_fault());
        assert!(!CameraError::Busy("x".into()).is_resource_fault());
        assert!(!CameraError::Capture("x".into()).is_resource_fault());
        assert!(!CameraError::Timeout("x".into()).is_resource_fault());
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_camera_names_files_after_params() {
        let camera = SimulatedCamera::new(Duration::from_millis(50));
        let frame = camera.capture(&params("m31")).await.unwrap();
        assert!(frame.filename.starts_with("m31_"));
        assert!(frame.filename.ends_with(".jpg"));
        assert_eq!(camera.frames_captured(), 1);
        assert!(!camera.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn unplugged_camera_reports_resource_fault() {
        let camera = SimulatedCamera::new(Duration::from_millis(50));
        camera.set_connected(false);
        let err = camera.capture(&params("m31")).await.unwrap_err();
        assert!(err.is_resource_fault());
        assert_eq!(camera.frames_captured(), 0);
    }
}
