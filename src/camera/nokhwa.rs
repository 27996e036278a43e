//! Native webcam backend
//!
//! Captures frames on a background thread using the nokhwa crate and exposes
//! the latest frame to the pipeline through a triple buffer.
//!
//! Only one capture thread owns a device at a time. A thread abandoned while
//! still opening the camera keeps its claim until it exits, and the next
//! acquisition waits for it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::oneshot;

use super::{CameraBackend, CaptureRequest, Frame, VideoStream};
use crate::error::PipelineError;

/// Information about an available camera
#[derive(Clone, Debug)]
pub struct CameraInfo {
    /// Camera index
    pub index: u32,
    /// Camera name
    pub name: String,
}

/// List available cameras
pub fn list_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(camera_list) => camera_list
            .iter()
            .enumerate()
            .map(|(idx, info)| CameraInfo {
                index: idx as u32,
                name: info.human_name().to_string(),
            })
            .collect(),
        Err(e) => {
            log::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

type FrameSlots = [Arc<Mutex<Option<Frame>>>; 3];

type ReadySender = oneshot::Sender<Result<(), PipelineError>>;

/// Held by a capture thread from before it opens a camera until it exits
static CAPTURE_DEVICE: Mutex<()> = parking_lot::const_mutex(());

/// Shared state between the stream handle and its capture thread
#[derive(Clone)]
struct CaptureShared {
    frames: FrameSlots,
    latest_frame_idx: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    opened: Arc<AtomicBool>,
    frame_count: Arc<AtomicU64>,
}

impl CaptureShared {
    fn new() -> Self {
        Self {
            frames: [
                Arc::new(Mutex::new(None)),
                Arc::new(Mutex::new(None)),
                Arc::new(Mutex::new(None)),
            ],
            latest_frame_idx: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(true)),
            opened: Arc::new(AtomicBool::new(false)),
            frame_count: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// A single-track webcam stream
pub struct NokhwaStream {
    shared: CaptureShared,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl VideoStream for NokhwaStream {
    fn latest_frame(&self) -> Option<Frame> {
        let idx = self.shared.latest_frame_idx.load(Ordering::Acquire);
        let slot = (idx % 3) as usize;
        self.shared.frames[slot].lock().clone()
    }

    fn live_tracks(&self) -> usize {
        let running = self.shared.running.load(Ordering::Acquire);
        let opened = self.shared.opened.load(Ordering::Acquire);
        usize::from(running && opened)
    }

    fn stop_tracks(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        let Some(handle) = self.thread_handle.take() else {
            return;
        };

        log::debug!(
            "Stopping capture after {} frames",
            self.shared.frame_count.load(Ordering::Relaxed)
        );

        // The thread may still be opening the device; don't block a runtime worker on it
        let join = move || {
            if handle.join().is_err() {
                log::warn!("Camera capture thread panicked");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(join);
            }
            Err(_) => join(),
        }
    }
}

impl Drop for NokhwaStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

/// Webcam access through the platform's native capture API
#[derive(Clone, Copy, Debug, Default)]
pub struct NokhwaCamera;

impl CameraBackend for NokhwaCamera {
    type Stream = NokhwaStream;

    fn acquire(
        &self,
        request: &CaptureRequest,
    ) -> impl Future<Output = Result<NokhwaStream, PipelineError>> + Send + 'static {
        let request = *request;

        async move {
            let shared = CaptureShared::new();
            let (ready_tx, ready_rx) = oneshot::channel();

            let thread_shared = shared.clone();
            let thread_handle = std::thread::Builder::new()
                .name("camera-capture".to_string())
                .spawn(move || capture_thread(request, thread_shared, ready_tx))
                .map_err(|e| {
                    PipelineError::Permission(format!("Failed to spawn capture thread: {}", e))
                })?;

            // Dropping this (cancelled acquisition or error) stops the thread
            let mut stream = NokhwaStream {
                shared,
                thread_handle: Some(thread_handle),
            };

            match ready_rx.await {
                Ok(Ok(())) => Ok(stream),
                Ok(Err(err)) => {
                    stream.stop_tracks();
                    Err(err)
                }
                Err(_) => Err(PipelineError::Permission(
                    "capture thread exited before the camera opened".to_string(),
                )),
            }
        }
    }
}

/// Open the camera, falling back through progressively looser formats
fn open_camera(camera_index: u32) -> Result<Camera, PipelineError> {
    let index = CameraIndex::Index(camera_index);

    let attempts = [
        RequestedFormatType::AbsoluteHighestResolution,
        RequestedFormatType::HighestResolution(Resolution::new(640, 480)),
        RequestedFormatType::None,
    ];

    let mut last_error = None;
    for format_type in attempts {
        let requested = RequestedFormat::new::<RgbAFormat>(format_type);
        match Camera::new(index.clone(), requested) {
            Ok(camera) => return Ok(camera),
            Err(e) => {
                log::warn!("Failed to open camera {} ({:?}): {:?}", camera_index, format_type, e);
                last_error = Some(e);
            }
        }
    }

    Err(PipelineError::Permission(match last_error {
        Some(e) => format!("camera {} could not be opened: {}", camera_index, e),
        None => format!("camera {} could not be opened", camera_index),
    }))
}

/// Wait for any previous capture thread to let go of the device.
///
/// Returns `None` if this acquisition was abandoned while waiting.
fn claim_device(shared: &CaptureShared, ready: &ReadySender) -> Option<MutexGuard<'static, ()>> {
    let claim = CAPTURE_DEVICE.lock();
    if ready.is_closed() || !shared.running.load(Ordering::Acquire) {
        return None;
    }
    Some(claim)
}

/// Camera capture thread
fn capture_thread(request: CaptureRequest, shared: CaptureShared, ready: ReadySender) {
    log::info!("Starting camera capture thread (camera {})", request.camera_index);

    let Some(_claim) = claim_device(&shared, &ready) else {
        log::debug!("Camera request abandoned before the device was free");
        return;
    };

    let mut camera = match open_camera(request.camera_index) {
        Ok(camera) => camera,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(PipelineError::Permission(format!(
            "Failed to open camera stream: {}",
            e
        ))));
        return;
    }

    log::info!(
        "Camera opened: {} ({}x{})",
        camera.info().human_name(),
        camera.resolution().width(),
        camera.resolution().height()
    );

    shared.opened.store(true, Ordering::Release);
    if ready.send(Ok(())).is_err() {
        // Nobody is waiting for this stream any more
        shared.running.store(false, Ordering::Release);
    }

    let mut write_idx: u64 = 0;

    while shared.running.load(Ordering::Acquire) {
        match camera.frame() {
            Ok(buffer) => match buffer.decode_image::<RgbAFormat>() {
                Ok(image) => {
                    let frame_number = shared.frame_count.fetch_add(1, Ordering::Relaxed);
                    let frame = Frame {
                        data: Arc::from(image.into_raw()),
                        width: buffer.resolution().width(),
                        height: buffer.resolution().height(),
                        frame_number,
                    };

                    let slot = (write_idx % 3) as usize;
                    *shared.frames[slot].lock() = Some(frame);
                    shared.latest_frame_idx.store(write_idx, Ordering::Release);
                    write_idx = write_idx.wrapping_add(1);
                }
                Err(e) => {
                    log::warn!("Failed to decode frame: {:?}", e);
                }
            },
            Err(e) => {
                log::warn!("Failed to capture frame: {:?}", e);
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        log::warn!("Failed to stop camera stream: {:?}", e);
    }
    shared.opened.store(false, Ordering::Release);
    log::info!("Camera capture thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stream_with(shared: CaptureShared) -> NokhwaStream {
        NokhwaStream {
            shared,
            thread_handle: None,
        }
    }

    #[test]
    fn test_latest_frame_reads_newest_slot() {
        let shared = CaptureShared::new();
        let stream = stream_with(shared.clone());
        assert!(stream.latest_frame().is_none());

        for n in 0..4u64 {
            let slot = (n % 3) as usize;
            *shared.frames[slot].lock() = Some(Frame {
                data: Arc::from(vec![0u8; 16]),
                width: 2,
                height: 2,
                frame_number: n,
            });
            shared.latest_frame_idx.store(n, Ordering::Release);
        }

        assert_eq!(stream.latest_frame().map(|f| f.frame_number), Some(3));
    }

    #[test]
    fn test_device_claim_waits_for_previous_owner() {
        let previous = CAPTURE_DEVICE.lock();

        let (claimed_tx, claimed_rx) = crossbeam_channel::bounded(1);
        let waiter = std::thread::spawn(move || {
            let shared = CaptureShared::new();
            let (ready, _ready_rx) = oneshot::channel();
            let claimed = claim_device(&shared, &ready).is_some();
            let _ = claimed_tx.send(claimed);
        });

        assert!(claimed_rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(previous);
        assert_eq!(claimed_rx.recv_timeout(Duration::from_secs(5)), Ok(true));
        waiter.join().unwrap();
    }

    #[test]
    fn test_abandoned_request_gives_up_claim() {
        let shared = CaptureShared::new();
        let (ready, ready_rx) = oneshot::channel();
        drop(ready_rx);
        assert!(claim_device(&shared, &ready).is_none());

        let (ready, _ready_rx) = oneshot::channel();
        shared.running.store(false, Ordering::Release);
        assert!(claim_device(&shared, &ready).is_none());

        // Neither attempt kept the device
        assert!(CAPTURE_DEVICE.try_lock_for(Duration::from_secs(5)).is_some());
    }

    #[test]
    fn test_track_count_follows_lifecycle() {
        let shared = CaptureShared::new();
        let mut stream = stream_with(shared.clone());
        assert_eq!(stream.live_tracks(), 0);

        shared.opened.store(true, Ordering::Release);
        assert_eq!(stream.live_tracks(), 1);

        stream.stop_tracks();
        stream.stop_tracks();
        assert_eq!(stream.live_tracks(), 0);
    }
}
