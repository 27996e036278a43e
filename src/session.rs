//! Pipeline session
//!
//! A session owns one camera, one model handle, the video sink and the
//! scheduler for a single selected variant. It is driven entirely from the
//! display refresh callback; nothing runs in the background except resource
//! acquisition.

use crossbeam_channel::Sender;

use crate::camera::{CameraBackend, CameraSource, VideoSink, VideoStream};
use crate::config::PipelineConfig;
use crate::controller::PipelineEvent;
use crate::error::PipelineError;
use crate::model::{ModelBackend, ModelHandle, ModelSlot};
use crate::render::{OverlayRenderer, Surface};
use crate::result::InferenceResult;
use crate::scheduler::{Admission, Completion, FrameScheduler, SchedulerStats};
use crate::variant::Variant;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Camera and model are being acquired
    Initializing,
    /// Model is open, waiting for video
    Ready,
    /// Inference loop is running
    Running,
    /// The model was closed under the running loop; inert until `stop()`
    Halted,
    Closing,
    Closed,
    /// A camera or model failure made the session inert until `stop()`
    Failed,
}

/// Result of one refresh callback.
#[derive(Debug)]
pub enum FrameOutcome {
    /// No session, or it is failed or closed
    Inactive,
    /// Waiting on the model or the first frame
    Waiting,
    /// Tick skipped, retried next refresh
    Skipped,
    /// A result was drawn to the surface
    Rendered(InferenceResult),
    /// The frame loop stopped on this tick
    Stopped,
}

pub struct Session<S: VideoStream, H: ModelHandle> {
    variant: Variant,
    state: SessionState,
    camera: CameraSource<S>,
    model: ModelSlot<H>,
    sink: VideoSink,
    scheduler: FrameScheduler,
    renderer: OverlayRenderer,
    events: Sender<PipelineEvent>,
}

impl<S: VideoStream, H: ModelHandle> Session<S, H> {
    pub fn new(variant: Variant, events: Sender<PipelineEvent>) -> Self {
        Self {
            variant,
            state: SessionState::Idle,
            camera: CameraSource::new(),
            model: ModelSlot::new(),
            sink: VideoSink::new(),
            scheduler: FrameScheduler::new(),
            renderer: OverlayRenderer::new(),
            events,
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub fn sink(&self) -> &VideoSink {
        &self.sink
    }

    fn emit(&self, event: PipelineEvent) {
        // The host may have gone away; events are best effort
        let _ = self.events.send(event);
    }

    /// Begin camera acquisition and model creation concurrently.
    ///
    /// Must be called from within a tokio runtime. Only valid from `Idle`.
    pub fn start<C, M>(&mut self, camera: &C, models: &M, config: &PipelineConfig)
    where
        C: CameraBackend<Stream = S>,
        M: ModelBackend<Handle = H>,
    {
        if self.state != SessionState::Idle {
            log::warn!("Session for {} already started", self.variant);
            return;
        }

        log::info!("Starting {} session", self.variant.title());
        self.state = SessionState::Initializing;
        self.emit(PipelineEvent::Loading {
            variant: self.variant,
            message: self.variant.loading_message().to_string(),
        });

        self.camera.acquire(camera, &config.capture_request());
        self.model.begin(models, self.variant, config.model_config(self.variant));
    }

    /// Collect acquisitions that resolved since the last callback and pull the
    /// newest video frame.
    pub fn poll_resources(&mut self) {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            return;
        }

        match self.camera.poll() {
            Some(Ok(dims)) => {
                self.sink.bind();
                self.emit(PipelineEvent::CameraReady {
                    width: dims.width,
                    height: dims.height,
                });
            }
            Some(Err(err)) => self.fail(err),
            None => {}
        }

        match self.model.poll() {
            Some(Ok(variant)) if self.state == SessionState::Initializing => {
                self.state = SessionState::Ready;
                self.emit(PipelineEvent::Ready(variant));
                self.emit(PipelineEvent::LoadingCleared);
            }
            Some(Ok(_)) => log::debug!("Model opened on a failed session, holding until stop"),
            Some(Err(err)) => self.fail(err),
            None => {}
        }

        if self.sink.refresh(self.camera.stream()) {
            let dims = self.sink.native_dims();
            log::info!("Video has data ({}x{})", dims.width, dims.height);
        }
    }

    /// One display refresh: poll resources, then at most one inference and
    /// render.
    pub async fn on_animation_frame<F>(&mut self, timestamp_ms: f64, surface: &mut F) -> FrameOutcome
    where
        F: Surface + ?Sized,
    {
        self.poll_resources();

        if !matches!(
            self.state,
            SessionState::Initializing | SessionState::Ready | SessionState::Running
        ) {
            return FrameOutcome::Inactive;
        }

        let frame = match self.scheduler.admit(timestamp_ms, &self.sink, self.model.is_open()) {
            Admission::Stopped => return FrameOutcome::Inactive,
            Admission::Waiting => return FrameOutcome::Waiting,
            Admission::Skip => return FrameOutcome::Skipped,
            Admission::Infer(frame) => frame,
        };

        let Some(handle) = self.model.handle_mut() else {
            return FrameOutcome::Waiting;
        };
        if self.state == SessionState::Ready {
            log::info!("{} running", self.variant.title());
            self.state = SessionState::Running;
        }

        let outcome = handle.infer(&frame, timestamp_ms).await;

        match self.scheduler.complete(outcome) {
            Completion::Render(result) => {
                self.sink.refresh(self.camera.stream());
                self.renderer.render(&result, self.sink.native_dims(), surface);
                FrameOutcome::Rendered(result)
            }
            Completion::Skip => FrameOutcome::Skipped,
            Completion::Stop => {
                log::debug!("{} frame loop halted", self.variant.title());
                self.state = SessionState::Halted;
                FrameOutcome::Stopped
            }
        }
    }

    /// Make the session inert after a terminal error.
    ///
    /// Resources already acquired stay owned (the preview keeps playing) until
    /// `close()`.
    pub fn fail(&mut self, err: PipelineError) {
        if matches!(
            self.state,
            SessionState::Failed | SessionState::Halted | SessionState::Closing | SessionState::Closed
        ) {
            log::warn!("Ignoring {} error on inactive session: {}", err.kind(), err);
            return;
        }

        log::error!("{} session failed: {}", self.variant.title(), err);
        self.scheduler.stop();
        self.state = SessionState::Failed;
        self.emit(PipelineEvent::Error {
            kind: err.kind(),
            message: err.to_string(),
        });
        self.emit(PipelineEvent::LoadingCleared);
    }

    /// Tear down: stop the scheduler, close the model, release the camera,
    /// clear the sink. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        self.state = SessionState::Closing;
        self.scheduler.stop();
        self.model.close();
        self.camera.release();
        self.sink.clear();
        self.state = SessionState::Closed;

        log::info!("{} session closed", self.variant.title());
        self.emit(PipelineEvent::Closed(self.variant));
    }
}

impl<S: VideoStream, H: ModelHandle> Drop for Session<S, H> {
    fn drop(&mut self) {
        self.close();
    }
}
