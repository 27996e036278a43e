//! Test doubles for camera and model backends
//!
//! Each fake shares a probe with the test so it can count live tracks and open
//! handles, record timestamps, and hold acquisition pending behind a gate.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::camera::{CameraBackend, CaptureRequest, Frame, VideoSink, VideoStream};
use crate::config::ModelConfig;
use crate::error::PipelineError;
use crate::geometry::FrameDims;
use crate::model::{ModelBackend, ModelHandle};
use crate::result::InferenceResult;
use crate::variant::Variant;

/// Let spawned tasks run to their next suspension point.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn bump_max(max: &AtomicUsize, value: usize) {
    max.fetch_max(value, Ordering::SeqCst);
}

/// Gate that holds acquisition pending until opened.
///
/// A waiter takes the single permit and hands it straight back, so once open
/// every waiter passes.
struct Gate(Semaphore);

impl Gate {
    fn new(open: bool) -> Self {
        Self(Semaphore::new(usize::from(open)))
    }

    fn open(&self) {
        if self.0.available_permits() == 0 {
            self.0.add_permits(1);
        }
    }

    async fn wait(&self) {
        let _permit = self.0.acquire().await;
    }
}

pub struct CameraProbe {
    live: AtomicUsize,
    max_live: AtomicUsize,
    stops: AtomicUsize,
    deny: bool,
    gate: Gate,
    dims: Mutex<FrameDims>,
}

impl CameraProbe {
    fn new(dims: FrameDims, deny: bool, gated: bool) -> Self {
        Self {
            live: AtomicUsize::new(0),
            max_live: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            deny,
            gate: Gate::new(!gated),
            dims: Mutex::new(dims),
        }
    }

    /// Streams acquired and not yet stopped.
    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live_streams(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn open_gate(&self) {
        self.gate.open();
    }

    /// Change the size of frames delivered from now on.
    pub fn set_dims(&self, dims: FrameDims) {
        *self.dims.lock() = dims;
    }
}

#[derive(Clone)]
pub struct FakeCamera {
    pub probe: Arc<CameraProbe>,
}

impl FakeCamera {
    pub fn granting(dims: FrameDims) -> Self {
        Self {
            probe: Arc::new(CameraProbe::new(dims, false, false)),
        }
    }

    /// Grants access only after `probe.open_gate()`.
    pub fn gated(dims: FrameDims) -> Self {
        Self {
            probe: Arc::new(CameraProbe::new(dims, false, true)),
        }
    }

    pub fn denying() -> Self {
        Self {
            probe: Arc::new(CameraProbe::new(FrameDims::default(), true, false)),
        }
    }
}

impl CameraBackend for FakeCamera {
    type Stream = FakeStream;

    fn acquire(
        &self,
        _request: &CaptureRequest,
    ) -> impl Future<Output = Result<FakeStream, PipelineError>> + Send + 'static {
        let probe = self.probe.clone();
        async move {
            probe.gate.wait().await;
            if probe.deny {
                return Err(PipelineError::Permission("Permission denied".to_string()));
            }
            let live = probe.live.fetch_add(1, Ordering::SeqCst) + 1;
            bump_max(&probe.max_live, live);
            Ok(FakeStream::new(probe))
        }
    }
}

pub struct FakeStream {
    probe: Arc<CameraProbe>,
    stopped: bool,
    frames: AtomicU64,
}

impl FakeStream {
    fn new(probe: Arc<CameraProbe>) -> Self {
        Self {
            probe,
            stopped: false,
            frames: AtomicU64::new(0),
        }
    }
}

impl VideoStream for FakeStream {
    fn latest_frame(&self) -> Option<Frame> {
        if self.stopped {
            return None;
        }
        let dims = *self.probe.dims.lock();
        Some(Frame {
            data: Arc::from(Vec::new()),
            width: dims.width,
            height: dims.height,
            frame_number: self.frames.fetch_add(1, Ordering::Relaxed),
        })
    }

    fn live_tracks(&self) -> usize {
        usize::from(!self.stopped)
    }

    fn stop_tracks(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.probe.live.fetch_sub(1, Ordering::SeqCst);
            self.probe.stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A bound sink holding one frame of the given size.
pub fn sink_with_frame(dims: FrameDims) -> VideoSink {
    let stream = FakeStream::new(Arc::new(CameraProbe::new(dims, false, false)));
    let mut sink = VideoSink::new();
    sink.bind();
    sink.refresh(Some(&stream));
    sink
}

pub struct ModelProbe {
    open: AtomicUsize,
    max_open: AtomicUsize,
    created: AtomicUsize,
    closes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    timestamps: Mutex<Vec<f64>>,
    scripted: Mutex<VecDeque<Result<InferenceResult, PipelineError>>>,
    failure: Option<String>,
    gate: Gate,
}

impl ModelProbe {
    fn new(failure: Option<String>, gated: bool) -> Self {
        Self {
            open: AtomicUsize::new(0),
            max_open: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            timestamps: Mutex::new(Vec::new()),
            scripted: Mutex::new(VecDeque::new()),
            failure,
            gate: Gate::new(!gated),
        }
    }

    /// Handles created and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn max_open_handles(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every timestamp passed to `infer`, in call order.
    pub fn timestamps(&self) -> Vec<f64> {
        self.timestamps.lock().clone()
    }

    /// Queue the outcome of the next `infer` call. Unscripted calls return
    /// the variant's empty result.
    pub fn script(&self, outcome: Result<InferenceResult, PipelineError>) {
        self.scripted.lock().push_back(outcome);
    }

    pub fn open_gate(&self) {
        self.gate.open();
    }
}

#[derive(Clone)]
pub struct FakeModel {
    pub probe: Arc<ModelProbe>,
}

impl Default for FakeModel {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeModel {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(ModelProbe::new(None, false)),
        }
    }

    /// Creation completes only after `probe.open_gate()`.
    pub fn gated() -> Self {
        Self {
            probe: Arc::new(ModelProbe::new(None, true)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            probe: Arc::new(ModelProbe::new(Some(message.to_string()), false)),
        }
    }
}

impl ModelBackend for FakeModel {
    type Handle = FakeHandle;

    fn create(
        &self,
        variant: Variant,
        _config: &ModelConfig,
    ) -> impl Future<Output = Result<FakeHandle, PipelineError>> + Send + 'static {
        let probe = self.probe.clone();
        async move {
            probe.gate.wait().await;
            if let Some(message) = &probe.failure {
                return Err(PipelineError::Init(message.clone()));
            }
            probe.created.fetch_add(1, Ordering::SeqCst);
            let open = probe.open.fetch_add(1, Ordering::SeqCst) + 1;
            bump_max(&probe.max_open, open);
            Ok(FakeHandle {
                probe,
                variant,
                closed: false,
            })
        }
    }
}

pub struct FakeHandle {
    probe: Arc<ModelProbe>,
    variant: Variant,
    closed: bool,
}

impl ModelHandle for FakeHandle {
    fn variant(&self) -> Variant {
        self.variant
    }

    fn infer(
        &mut self,
        _frame: &Frame,
        timestamp_ms: f64,
    ) -> impl Future<Output = Result<InferenceResult, PipelineError>> + Send {
        let probe = self.probe.clone();
        let variant = self.variant;
        let closed = self.closed;

        async move {
            if closed {
                return Err(PipelineError::Closed);
            }
            probe.timestamps.lock().push(timestamp_ms);
            let in_flight = probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            bump_max(&probe.max_in_flight, in_flight);

            tokio::task::yield_now().await;

            probe.in_flight.fetch_sub(1, Ordering::SeqCst);
            probe
                .scripted
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(InferenceResult::empty(variant)))
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.probe.open.fetch_sub(1, Ordering::SeqCst);
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
