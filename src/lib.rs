//! Live Perception - camera preview annotated by a pluggable perception model
//!
//! One parametrized pipeline drives four model variants (object detection,
//! image classification, hand gesture recognition, face landmarks). A session
//! acquires a camera stream and a model handle concurrently, runs a self-paced
//! per-frame inference loop, and renders each result as an overlay that lines
//! up with a mirrored video preview.

pub mod camera;
pub mod config;
pub mod controller;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod model;
pub mod render;
pub mod result;
pub mod scheduler;
pub mod session;
pub mod topology;
pub mod variant;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ModelConfig, PipelineConfig};
pub use controller::{PipelineController, PipelineEvent};
pub use error::PipelineError;
pub use result::InferenceResult;
pub use session::SessionState;
pub use variant::Variant;
