//! Pipeline controller
//!
//! Composes camera, model, scheduler and renderer into one session per
//! selected variant. Switching variants tears the old session down completely
//! before the new one acquires anything, so there is never more than one
//! camera stream or model handle.

use std::future::Future;
use std::ops::ControlFlow;

use crossbeam_channel::Sender;

use crate::camera::CameraBackend;
use crate::config::PipelineConfig;
use crate::model::ModelBackend;
use crate::render::Surface;
use crate::scheduler::RefreshClock;
use crate::session::Session;
use crate::variant::Variant;

pub use crate::session::{FrameOutcome, SessionState};

/// Notifications for the host UI.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Show the loading indicator
    Loading { variant: Variant, message: String },
    /// Camera stream is live
    CameraReady { width: u32, height: u32 },
    /// Model is open
    Ready(Variant),
    /// Hide the loading indicator
    LoadingCleared,
    /// Terminal failure; the session is inert
    Error { kind: &'static str, message: String },
    /// Session torn down
    Closed(Variant),
}

/// Owns the active session and its backends.
pub struct PipelineController<C: CameraBackend, M: ModelBackend> {
    camera: C,
    models: M,
    config: PipelineConfig,
    events: Sender<PipelineEvent>,
    session: Option<Session<C::Stream, M::Handle>>,
}

impl<C: CameraBackend, M: ModelBackend> PipelineController<C, M> {
    pub fn new(camera: C, models: M, config: PipelineConfig, events: Sender<PipelineEvent>) -> Self {
        Self {
            camera,
            models,
            config,
            events,
            session: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start a session for `variant`, stopping any current one first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, variant: Variant) {
        self.stop();

        let mut session = Session::new(variant, self.events.clone());
        session.start(&self.camera, &self.models, &self.config);
        self.session = Some(session);
    }

    /// Tear down the current session. Idempotent and safe from any state.
    pub fn stop(&mut self) {
        if let Some(session) = &mut self.session {
            session.close();
        }
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(Session::state)
            .unwrap_or(SessionState::Idle)
    }

    pub fn session(&self) -> Option<&Session<C::Stream, M::Handle>> {
        self.session.as_ref()
    }

    /// Display refresh callback.
    pub async fn on_animation_frame<F>(&mut self, timestamp_ms: f64, surface: &mut F) -> FrameOutcome
    where
        F: Surface + ?Sized,
    {
        match &mut self.session {
            Some(session) => session.on_animation_frame(timestamp_ms, surface).await,
            None => FrameOutcome::Inactive,
        }
    }

    /// Drive refresh callbacks from `clock` until `shutdown` resolves or
    /// `after_frame` breaks, then stop.
    pub async fn run<K, F, D>(
        &mut self,
        clock: &mut K,
        surface: &mut F,
        shutdown: D,
        mut after_frame: impl FnMut(&FrameOutcome, &F) -> ControlFlow<()>,
    ) where
        K: RefreshClock,
        F: Surface,
        D: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let step = async {
                let timestamp = clock.next_frame().await;
                self.on_animation_frame(timestamp, surface).await
            };

            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                outcome = step => Some(outcome),
            };

            match outcome {
                Some(outcome) => {
                    if after_frame(&outcome, surface).is_break() {
                        break;
                    }
                }
                None => {
                    log::info!("Shutdown requested");
                    break;
                }
            }
        }

        self.stop();
    }
}

impl<C: CameraBackend, M: ModelBackend> Drop for PipelineController<C, M> {
    fn drop(&mut self) {
        self.stop();
    }
}
