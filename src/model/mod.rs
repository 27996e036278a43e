//! Perception model handles
//!
//! - `ModelBackend` creates a handle for one variant. Creation may be slow and
//!   runs as a spawned task so it never holds up camera acquisition.
//! - `ModelHandle` runs inference on one frame at a time and is closed exactly
//!   once.
//! - `ModelSlot` owns the handle for a session, including while creation is
//!   still pending.

pub mod onnx;

use std::future::Future;
use std::ops::{Deref, DerefMut};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::camera::Frame;
use crate::config::{ModelConfig, RunningMode};
use crate::error::PipelineError;
use crate::result::InferenceResult;
use crate::variant::Variant;

/// An open perception model.
pub trait ModelHandle: Send + 'static {
    /// Variant this handle was created for.
    fn variant(&self) -> Variant;

    /// Run inference on one frame.
    ///
    /// Timestamps must strictly increase over the handle's lifetime. After
    /// `close` this fails with `PipelineError::Closed`.
    fn infer(
        &mut self,
        frame: &Frame,
        timestamp_ms: f64,
    ) -> impl Future<Output = Result<InferenceResult, PipelineError>> + Send;

    /// Release the model. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Creates model handles.
pub trait ModelBackend {
    type Handle: ModelHandle;

    /// Load a model. Failures resolve to `PipelineError::Init`.
    fn create(
        &self,
        variant: Variant,
        config: &ModelConfig,
    ) -> impl Future<Output = Result<Self::Handle, PipelineError>> + Send + 'static;
}

/// Owns a handle and closes it exactly once, at the latest on drop.
pub struct ModelGuard<H: ModelHandle> {
    handle: H,
    closed: bool,
}

impl<H: ModelHandle> ModelGuard<H> {
    pub fn new(handle: H) -> Self {
        Self {
            handle,
            closed: false,
        }
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.handle.close();
        }
    }
}

impl<H: ModelHandle> Deref for ModelGuard<H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.handle
    }
}

impl<H: ModelHandle> DerefMut for ModelGuard<H> {
    fn deref_mut(&mut self) -> &mut H {
        &mut self.handle
    }
}

impl<H: ModelHandle> Drop for ModelGuard<H> {
    fn drop(&mut self) {
        self.close();
    }
}

type Created<H> = Result<ModelGuard<H>, PipelineError>;

enum SlotState<H: ModelHandle> {
    Empty,
    Pending {
        result: oneshot::Receiver<Created<H>>,
        task: Option<JoinHandle<()>>,
    },
    Open(ModelGuard<H>),
    Failed,
    Closed,
}

/// Model lifecycle for one session.
pub struct ModelSlot<H: ModelHandle> {
    state: SlotState<H>,
}

impl<H: ModelHandle> Default for ModelSlot<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ModelHandle> ModelSlot<H> {
    pub fn new() -> Self {
        Self {
            state: SlotState::Empty,
        }
    }

    /// Begin model creation on the current tokio runtime.
    ///
    /// Only valid from `Empty`; later calls are ignored. Image running mode is
    /// rejected up front since live sessions feed timestamped video frames.
    pub fn begin<B>(&mut self, backend: &B, variant: Variant, config: &ModelConfig)
    where
        B: ModelBackend<Handle = H>,
    {
        if !matches!(self.state, SlotState::Empty) {
            log::warn!("Model creation already started, ignoring");
            return;
        }

        log::info!("{}", variant.loading_message());

        let (tx, rx) = oneshot::channel();

        if config.running_mode != RunningMode::Video {
            let _ = tx.send(Err(PipelineError::Init(format!(
                "{} requires video running mode",
                variant.title()
            ))));
            self.state = SlotState::Pending {
                result: rx,
                task: None,
            };
            return;
        }

        let pending = backend.create(variant, config);
        let task = tokio::spawn(async move {
            let _ = tx.send(pending.await.map(ModelGuard::new));
        });

        self.state = SlotState::Pending {
            result: rx,
            task: Some(task),
        };
    }

    /// Collect a finished creation.
    ///
    /// Returns `Some` exactly once per creation, when it resolves.
    pub fn poll(&mut self) -> Option<Result<Variant, PipelineError>> {
        let SlotState::Pending { result, .. } = &mut self.state else {
            return None;
        };

        let outcome = match result.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => Err(PipelineError::Init(
                "model creation was abandoned".to_string(),
            )),
        };

        match outcome {
            Ok(guard) => {
                let variant = guard.variant();
                log::info!("Model ready: {}", variant.title());
                self.state = SlotState::Open(guard);
                Some(Ok(variant))
            }
            Err(err) => {
                log::error!("Model creation failed: {}", err);
                self.state = SlotState::Failed;
                Some(Err(err))
            }
        }
    }

    /// The open handle, if creation succeeded and it has not been closed.
    pub fn handle_mut(&mut self) -> Option<&mut H> {
        match &mut self.state {
            SlotState::Open(guard) => Some(&mut **guard),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SlotState::Open(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, SlotState::Pending { .. })
    }

    /// Close the handle, or abandon a pending creation. Safe from any state.
    ///
    /// A handle that resolves after this point is closed on arrival.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.state, SlotState::Closed) {
            SlotState::Pending { result, task } => {
                log::info!("Cancelling pending model creation");
                if let Some(task) = task {
                    task.abort();
                }
                drop(result);
            }
            SlotState::Open(mut guard) => {
                guard.close();
                log::info!("Model closed: {}", guard.variant().title());
            }
            SlotState::Empty | SlotState::Failed | SlotState::Closed => {}
        }
    }
}

impl<H: ModelHandle> Drop for ModelSlot<H> {
    fn drop(&mut self) {
        self.close();
    }
}
