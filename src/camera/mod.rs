//! Camera acquisition
//!
//! - `CameraBackend` opens a device and yields a `VideoStream` of live tracks.
//! - `CameraSource` owns the stream for one session. Acquisition runs as a
//!   spawned task so it never blocks model creation, and `release()` is safe
//!   while acquisition is still pending.
//! - `VideoSink` stands in for the preview element: it exposes the current
//!   frame and its native dimensions, and raises "has data" once.

pub mod nokhwa;

use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::PipelineError;
use crate::geometry::FrameDims;

/// Decoded RGBA frame.
#[derive(Clone)]
pub struct Frame {
    /// RGBA pixel data, row-major
    pub data: Arc<[u8]>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture sequence number
    pub frame_number: u64,
}

impl Frame {
    pub fn dims(&self) -> FrameDims {
        FrameDims::new(self.width, self.height)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("frame_number", &self.frame_number)
            .finish()
    }
}

/// What the session asks the camera for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Camera index (0 for default)
    pub camera_index: u32,
    /// Requested frame width
    pub width: u32,
    /// Requested frame height
    pub height: u32,
}

/// A live capture stream made of independently stoppable tracks.
pub trait VideoStream: Send + 'static {
    /// Latest decoded frame, `None` until the first frame arrives.
    fn latest_frame(&self) -> Option<Frame>;

    /// Number of tracks still capturing.
    fn live_tracks(&self) -> usize;

    /// Stop every track.
    fn stop_tracks(&mut self);
}

/// Grants or denies access to a capture device.
pub trait CameraBackend {
    type Stream: VideoStream;

    /// Open a stream. May wait indefinitely on a permission prompt.
    ///
    /// Denial and missing devices resolve to `PipelineError::Permission`.
    fn acquire(
        &self,
        request: &CaptureRequest,
    ) -> impl Future<Output = Result<Self::Stream, PipelineError>> + Send + 'static;
}

/// Owns a stream and stops its tracks exactly once, at the latest on drop.
///
/// A stream that resolves after its session has been released is dropped
/// unclaimed, which stops it here.
pub struct TrackGuard<S: VideoStream> {
    stream: S,
    stopped: bool,
}

impl<S: VideoStream> TrackGuard<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            stopped: false,
        }
    }

    pub fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.stream.stop_tracks();
        }
    }
}

impl<S: VideoStream> Deref for TrackGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.stream
    }
}

impl<S: VideoStream> Drop for TrackGuard<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

type Acquired<S> = Result<TrackGuard<S>, PipelineError>;

enum CameraState<S: VideoStream> {
    Idle,
    Pending {
        result: oneshot::Receiver<Acquired<S>>,
        task: JoinHandle<()>,
    },
    Live(TrackGuard<S>),
    Unavailable,
    Released,
}

/// Camera lifecycle for one session.
pub struct CameraSource<S: VideoStream> {
    state: CameraState<S>,
}

impl<S: VideoStream> Default for CameraSource<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: VideoStream> CameraSource<S> {
    pub fn new() -> Self {
        Self {
            state: CameraState::Idle,
        }
    }

    /// Begin acquisition on the current tokio runtime.
    ///
    /// Only valid from `Idle`; later calls are ignored.
    pub fn acquire<B>(&mut self, backend: &B, request: &CaptureRequest)
    where
        B: CameraBackend<Stream = S>,
    {
        if !matches!(self.state, CameraState::Idle) {
            log::warn!("Camera acquisition already started, ignoring");
            return;
        }

        log::info!(
            "Requesting camera {} ({}x{})",
            request.camera_index,
            request.width,
            request.height
        );

        let pending = backend.acquire(request);
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            // If the receiver is gone the guard comes back in the error and is dropped
            let _ = tx.send(pending.await.map(TrackGuard::new));
        });

        self.state = CameraState::Pending { result: rx, task };
    }

    /// Collect a finished acquisition.
    ///
    /// Returns `Some` exactly once per acquisition, when it resolves.
    pub fn poll(&mut self) -> Option<Result<FrameDims, PipelineError>> {
        let CameraState::Pending { result, .. } = &mut self.state else {
            return None;
        };

        let outcome = match result.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => Err(PipelineError::Permission(
                "camera request was abandoned".to_string(),
            )),
        };

        match outcome {
            Ok(guard) => {
                let dims = guard.latest_frame().map(|f| f.dims()).unwrap_or_default();
                log::info!("Camera stream live ({} track(s))", guard.live_tracks());
                self.state = CameraState::Live(guard);
                Some(Ok(dims))
            }
            Err(err) => {
                log::warn!("Camera acquisition failed: {}", err);
                self.state = CameraState::Unavailable;
                Some(Err(err))
            }
        }
    }

    /// The live stream, if acquisition succeeded and it has not been released.
    pub fn stream(&self) -> Option<&S> {
        match &self.state {
            CameraState::Live(guard) => Some(&**guard),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, CameraState::Pending { .. })
    }

    pub fn is_live(&self) -> bool {
        matches!(self.state, CameraState::Live(_))
    }

    /// Stop all tracks and forget the stream. Safe from any state.
    pub fn release(&mut self) {
        match std::mem::replace(&mut self.state, CameraState::Released) {
            CameraState::Pending { result, task } => {
                log::info!("Cancelling pending camera request");
                task.abort();
                drop(result);
            }
            CameraState::Live(mut guard) => {
                guard.stop();
                log::info!("Camera tracks stopped");
            }
            CameraState::Idle | CameraState::Unavailable | CameraState::Released => {}
        }
    }
}

impl<S: VideoStream> Drop for CameraSource<S> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Stand-in for the preview element the stream is attached to.
#[derive(Debug, Default)]
pub struct VideoSink {
    bound: bool,
    has_data: bool,
    current: Option<Frame>,
}

impl VideoSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the sink to a live stream.
    pub fn bind(&mut self) {
        self.bound = true;
    }

    /// Pull the newest frame from the stream.
    ///
    /// Returns `true` the first time a frame arrives (the "has data" signal).
    pub fn refresh<S: VideoStream>(&mut self, stream: Option<&S>) -> bool {
        if !self.bound {
            return false;
        }
        let Some(stream) = stream else {
            return false;
        };
        if let Some(frame) = stream.latest_frame() {
            self.current = Some(frame);
        }
        if self.current.is_some() && !self.has_data {
            self.has_data = true;
            return true;
        }
        false
    }

    pub fn has_data(&self) -> bool {
        self.has_data
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    /// Native dimensions of the current frame, zero before data arrives.
    pub fn native_dims(&self) -> FrameDims {
        self.current.as_ref().map(Frame::dims).unwrap_or_default()
    }

    /// Detach from the stream and drop the last frame.
    pub fn clear(&mut self) {
        self.bound = false;
        self.has_data = false;
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{settle, FakeCamera};

    fn request() -> CaptureRequest {
        CaptureRequest {
            camera_index: 0,
            width: 640,
            height: 480,
        }
    }

    #[tokio::test]
    async fn test_acquire_then_release() {
        let camera = FakeCamera::granting(FrameDims::new(640, 480));
        let mut source = CameraSource::new();
        source.acquire(&camera, &request());
        assert!(source.is_pending());

        settle().await;
        assert_eq!(source.poll(), Some(Ok(FrameDims::new(640, 480))));
        assert!(source.is_live());
        assert_eq!(camera.probe.live_streams(), 1);

        source.release();
        source.release();
        assert_eq!(camera.probe.live_streams(), 0);
        assert_eq!(camera.probe.stops(), 1);
    }

    #[tokio::test]
    async fn test_release_while_pending_never_leaks() {
        let camera = FakeCamera::gated(FrameDims::new(640, 480));
        let mut source = CameraSource::new();
        source.acquire(&camera, &request());
        settle().await;
        assert_eq!(source.poll(), None);

        source.release();
        camera.probe.open_gate();
        settle().await;
        assert_eq!(camera.probe.live_streams(), 0);
        assert!(source.stream().is_none());
    }

    #[tokio::test]
    async fn test_resolved_but_unclaimed_stream_is_stopped() {
        let camera = FakeCamera::granting(FrameDims::new(640, 480));
        let mut source = CameraSource::new();
        source.acquire(&camera, &request());
        settle().await;
        // Resolved into the channel but never polled
        assert_eq!(camera.probe.live_streams(), 1);

        source.release();
        assert_eq!(camera.probe.live_streams(), 0);
    }

    #[tokio::test]
    async fn test_denied_is_reported_not_thrown() {
        let camera = FakeCamera::denying();
        let mut source = CameraSource::new();
        source.acquire(&camera, &request());
        settle().await;
        assert!(matches!(source.poll(), Some(Err(PipelineError::Permission(_)))));
        assert_eq!(source.poll(), None);
        assert!(source.stream().is_none());
        source.release();
    }

    #[tokio::test]
    async fn test_sink_has_data_fires_once() {
        let camera = FakeCamera::granting(FrameDims::new(320, 240));
        let mut source = CameraSource::new();
        source.acquire(&camera, &request());
        settle().await;
        source.poll();

        let mut sink = VideoSink::new();
        assert!(!sink.refresh(source.stream()));
        sink.bind();
        assert!(sink.refresh(source.stream()));
        assert!(!sink.refresh(source.stream()));
        assert_eq!(sink.native_dims(), FrameDims::new(320, 240));

        camera.probe.set_dims(FrameDims::new(240, 320));
        sink.refresh(source.stream());
        assert_eq!(sink.native_dims(), FrameDims::new(240, 320));

        sink.clear();
        assert!(!sink.has_data());
        assert!(sink.native_dims().is_empty());
    }
}
