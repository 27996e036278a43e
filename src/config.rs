//! Pipeline configuration
//!
//! Defaults reproduce the stock app: default camera, 60 Hz refresh, an object
//! detector score threshold of 0.5, two tracked hands and one tracked face, all
//! models in video running mode. A JSON file can override any field.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::camera::CaptureRequest;
use crate::error::ConfigError;
use crate::variant::Variant;

/// How the backend treats successive frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningMode {
    /// Stateful tracking across frames; timestamps must strictly increase.
    #[default]
    Video,
    /// Stateless single-image mode. Not supported by the live pipeline.
    Image,
}

/// Model options for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Running mode, fixed to video for live sessions.
    pub running_mode: RunningMode,
    /// Minimum detection score kept by the object detector.
    pub score_threshold: f32,
    /// Minimum presence score for a hand or face to be reported.
    pub presence_threshold: f32,
    /// Maximum number of hands tracked by the gesture recognizer.
    pub max_hands: usize,
    /// Maximum number of faces tracked by the face landmarker.
    pub max_faces: usize,
    /// Explicit model file, overriding the model directory lookup.
    pub model_asset: Option<PathBuf>,
    /// Newline-separated label file, one label per class index.
    pub labels: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            running_mode: RunningMode::Video,
            score_threshold: 0.5,
            presence_threshold: 0.5,
            max_hands: 2,
            max_faces: 1,
            model_asset: None,
            labels: None,
        }
    }
}

/// Per-variant model options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub object_detection: ModelConfig,
    pub image_classification: ModelConfig,
    pub hand_gesture_recognition: ModelConfig,
    pub face_landmark_detection: ModelConfig,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Camera index (0 for default).
    pub camera_index: u32,
    /// Requested capture width (the camera may choose another).
    pub capture_width: u32,
    /// Requested capture height.
    pub capture_height: u32,
    /// Display refresh rate driving the frame loop.
    pub refresh_hz: u32,
    /// Directory holding `<variant-id>.onnx` files.
    pub model_dir: Option<PathBuf>,
    /// Per-variant model options.
    pub models: ModelSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            capture_width: 1280,
            capture_height: 720,
            refresh_hz: 60,
            model_dir: None,
            models: ModelSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Model options for a variant.
    pub fn model_config(&self, variant: Variant) -> &ModelConfig {
        match variant {
            Variant::ObjectDetection => &self.models.object_detection,
            Variant::ImageClassification => &self.models.image_classification,
            Variant::HandGestureRecognition => &self.models.hand_gesture_recognition,
            Variant::FaceLandmarkDetection => &self.models.face_landmark_detection,
        }
    }

    /// Camera request derived from this configuration.
    pub fn capture_request(&self) -> CaptureRequest {
        CaptureRequest {
            camera_index: self.camera_index,
            width: self.capture_width,
            height: self.capture_height,
        }
    }
}
