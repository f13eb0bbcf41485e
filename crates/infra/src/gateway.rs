//! Capture gateway: the single exclusive slot in front of the camera.
//!
//! Every capture in the process (ad hoc, bulk, calibration, session) goes
//! through one [`CaptureGateway`]. The slot is a `tokio::sync::Mutex`, which
//! hands out the lock in FIFO order, so waiting requests are served in
//! arrival order with no priorities. The slot is released when the
//! [`CameraSlot`] guard drops: after success, after an error, while unwinding
//! a panic, or when a waiting future is dropped.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use tethercap_core::FrameParams;
pub use tethercap_core::CameraStatus;

use crate::camera::{Camera, CameraError, CapturedFrame};

/// Serializes all access to the camera.
pub struct CaptureGateway {
    camera: Arc<dyn Camera>,
    slot: Mutex<()>,
    captures_started: AtomicU64,
}

/// Exclusive possession of the camera.
pub struct CameraSlot<'a> {
    camera: &'a Arc<dyn Camera>,
    captures_started: &'a AtomicU64,
    _guard: MutexGuard<'a, ()>,
}

impl CameraSlot<'_> {
    /// Capture one frame while holding the slot.
    ///
    /// A disconnected camera is reported as a resource fault without calling
    /// the driver.
    pub async fn capture(&self, params: &FrameParams) -> Result<CapturedFrame, CameraError> {
        if !self.camera.is_connected() {
            return Err(CameraError::NotConnected(
                "camera disconnected".to_string(),
            ));
        }
        self.captures_started.fetch_add(1, Ordering::Relaxed);
        debug!(image = %params.image_name, sequence = params.sequence, "capturing frame");
        self.camera.capture(params).await
    }

    pub fn camera(&self) -> &Arc<dyn Camera> {
        self.camera
    }
}

impl CaptureGateway {
    pub fn new(camera: Arc<dyn Camera>) -> Self {
        Self {
            camera,
            slot: Mutex::new(()),
            captures_started: AtomicU64::new(0),
        }
    }

    pub fn arc(camera: Arc<dyn Camera>) -> Arc<Self> {
        Arc::new(Self::new(camera))
    }

    /// Wait (FIFO) for the slot.
    ///
    /// Dropping the returned future before it completes leaves the queue
    /// without taking the slot.
    pub async fn acquire(&self) -> CameraSlot<'_> {
        let guard = self.slot.lock().await;
        CameraSlot {
            camera: &self.camera,
            captures_started: &self.captures_started,
            _guard: guard,
        }
    }

    /// Run `f` with exclusive possession of the camera.
    pub async fn with_camera<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce(Arc<dyn Camera>) -> Fut,
        Fut: Future<Output = T>,
    {
        let _slot = self.acquire().await;
        f(self.camera.clone()).await
    }

    /// Ad hoc single capture, queued behind any frames already waiting.
    pub async fn capture(&self, params: &FrameParams) -> Result<CapturedFrame, CameraError> {
        let slot = self.acquire().await;
        slot.capture(params).await
    }

    /// Slot held by someone, or the driver reports busy.
    pub fn is_busy(&self) -> bool {
        self.slot.try_lock().is_err() || self.camera.is_busy()
    }

    pub fn status(&self) -> CameraStatus {
        CameraStatus {
            connected: self.camera.is_connected(),
            busy: self.is_busy(),
            captures_started: self.captures_started.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for CaptureGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureGateway")
            .field("busy", &self.is_busy())
            .field("captures_started", &self.captures_started.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SimulatedCamera;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Fails every capture, counting how often it was asked.
    struct FailingCamera {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Camera for FailingCamera {
        async fn capture(&self, _params: &FrameParams) -> Result<CapturedFrame, CameraError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CameraError::Capture("shutter jammed".to_string()))
        }

        fn is_busy(&self) -> bool {
            false
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn params() -> FrameParams {
        FrameParams::ad_hoc(None, None, None, Utc::now())
    }

    #[tokio::test]
    async fn slot_is_released_after_a_failed_frame() {
        let camera = Arc::new(FailingCamera {
            calls: AtomicUsize::new(0),
        });
        let gateway = CaptureGateway::new(camera.clone());

        assert!(gateway.capture(&params()).await.is_err());
        assert!(gateway.capture(&params()).await.is_err());
        assert_eq!(camera.calls.load(Ordering::SeqCst), 2);
        assert!(!gateway.is_busy());
    }

    #[tokio::test]
    async fn held_slot_reports_busy() {
        let gateway = CaptureGateway::new(Arc::new(SimulatedCamera::default()));
        let slot = gateway.acquire().await;
        assert!(gateway.is_busy());
        drop(slot);
        assert!(!gateway.is_busy());
    }

    #[tokio::test]
    async fn disconnected_camera_is_not_invoked() {
        let camera = Arc::new(SimulatedCamera::new(Duration::from_millis(1)));
        camera.set_connected(false);
        let gateway = CaptureGateway::new(camera.clone());

        let err = gateway.capture(&params()).await.unwrap_err();
        assert!(err.is_resource_fault());
        assert_eq!(camera.frames_captured(), 0);
        assert_eq!(gateway.status().captures_started, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_are_served_in_arrival_order() {
        let gateway = Arc::new(CaptureGateway::new(Arc::new(SimulatedCamera::new(
            Duration::from_millis(10),
        ))));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let first = gateway.acquire().await;
        let mut handles = Vec::new();
        for i in 0..3 {
            let gateway = gateway.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                gateway
                    .with_camera(|_camera| async move {
                        order.lock().unwrap().push(i);
                    })
                    .await;
            }));
            // Let the task enqueue before spawning the next one.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        drop(first);
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn dropped_waiter_does_not_take_the_slot() {
        let gateway = CaptureGateway::new(Arc::new(SimulatedCamera::default()));
        let held = gateway.acquire().await;
        let waited = tokio::time::timeout(Duration::from_millis(20), gateway.acquire()).await;
        assert!(waited.is_err());
        drop(held);
        let _again = gateway.acquire().await;
    }
}
