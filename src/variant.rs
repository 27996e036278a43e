//! Pipeline variant selector
//!
//! The host menu picks exactly one variant when a session starts. Each variant
//! fixes the model capability and the overlay recipe used to draw its output.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which perception capability a session runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// Boxes with labels (ObjectDetector)
    ObjectDetection,
    /// Single top label (ImageClassifier)
    ImageClassification,
    /// Hand skeletons plus a gesture label (GestureRecognizer)
    HandGestureRecognition,
    /// Face mesh geometry (FaceLandmarker)
    FaceLandmarkDetection,
}

impl Variant {
    /// All variants in menu order.
    pub const ALL: [Variant; 4] = [
        Variant::ObjectDetection,
        Variant::ImageClassification,
        Variant::HandGestureRecognition,
        Variant::FaceLandmarkDetection,
    ];

    /// Menu id, e.g. `object-detection`.
    pub fn id(&self) -> &'static str {
        match self {
            Variant::ObjectDetection => "object-detection",
            Variant::ImageClassification => "image-classification",
            Variant::HandGestureRecognition => "hand-gesture-recognition",
            Variant::FaceLandmarkDetection => "face-landmark-detection",
        }
    }

    /// Human-readable title shown above the preview.
    pub fn title(&self) -> &'static str {
        match self {
            Variant::ObjectDetection => "Object Detection",
            Variant::ImageClassification => "Image Classification",
            Variant::HandGestureRecognition => "Hand Gesture Recognition",
            Variant::FaceLandmarkDetection => "Face Landmark Detection",
        }
    }

    /// Name of the model capability backing this variant.
    pub fn capability(&self) -> &'static str {
        match self {
            Variant::ObjectDetection => "ObjectDetector",
            Variant::ImageClassification => "ImageClassifier",
            Variant::HandGestureRecognition => "GestureRecognizer",
            Variant::FaceLandmarkDetection => "FaceLandmarker",
        }
    }

    /// Text shown while the model is loading.
    pub fn loading_message(&self) -> &'static str {
        match self {
            Variant::ObjectDetection => "Loading Object Detection Model...",
            Variant::ImageClassification => "Loading Image Classifier...",
            Variant::HandGestureRecognition => "Loading Model...",
            Variant::FaceLandmarkDetection => "Loading Face Model...",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Returned when a menu id does not name a known variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown variant {0:?} (expected one of: object-detection, image-classification, hand-gesture-recognition, face-landmark-detection)")]
pub struct ParseVariantError(pub String);

impl FromStr for Variant {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variant::ALL
            .into_iter()
            .find(|variant| variant.id() == s)
            .ok_or_else(|| ParseVariantError(s.to_string()))
    }
}
