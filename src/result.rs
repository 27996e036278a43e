//! Typed inference output
//!
//! One case per variant. The renderer matches on it exhaustively, so a new
//! capability cannot be added without also deciding how it is drawn.

use serde::{Deserialize, Serialize};

use crate::geometry::{Landmark, Rect};
use crate::variant::Variant;

/// A label with its confidence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub label: String,
    pub score: f32,
}

impl Category {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// One detected object. The box is in frame pixels, unmirrored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bounding_box: Rect,
    pub category: Category,
}

/// Result of a single inference call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum InferenceResult {
    /// Object boxes; empty when nothing was detected this frame.
    Detections(Vec<Detection>),
    /// Top category, `None` when the model returned no categories.
    Classification(Option<Category>),
    /// Hand landmark sets (21 normalized points each) and the best gesture.
    GestureSet {
        hands: Vec<Vec<Landmark>>,
        gesture: Option<Category>,
    },
    /// Face landmark sets (468 or more normalized points each).
    FaceMesh(Vec<Vec<Landmark>>),
}

impl InferenceResult {
    /// Variant whose model produces this shape.
    pub fn variant(&self) -> Variant {
        match self {
            InferenceResult::Detections(_) => Variant::ObjectDetection,
            InferenceResult::Classification(_) => Variant::ImageClassification,
            InferenceResult::GestureSet { .. } => Variant::HandGestureRecognition,
            InferenceResult::FaceMesh(_) => Variant::FaceLandmarkDetection,
        }
    }

    /// An empty result draws nothing (the overlay is still cleared).
    pub fn is_empty(&self) -> bool {
        match self {
            InferenceResult::Detections(detections) => detections.is_empty(),
            InferenceResult::Classification(top) => top.is_none(),
            InferenceResult::GestureSet { hands, gesture } => hands.is_empty() && gesture.is_none(),
            InferenceResult::FaceMesh(faces) => faces.is_empty(),
        }
    }

    /// The empty result for a variant.
    pub fn empty(variant: Variant) -> Self {
        match variant {
            Variant::ObjectDetection => InferenceResult::Detections(Vec::new()),
            Variant::ImageClassification => InferenceResult::Classification(None),
            Variant::HandGestureRecognition => InferenceResult::GestureSet {
                hands: Vec::new(),
                gesture: None,
            },
            Variant::FaceLandmarkDetection => InferenceResult::FaceMesh(Vec::new()),
        }
    }
}
