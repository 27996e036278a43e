//! ONNX Runtime backend
//!
//! Loads `<variant-id>.onnx` from a model directory and decodes the raw output
//! tensors into `InferenceResult`s. Output layouts per variant:
//!
//! - object detection: rows of `[x, y, w, h, score, class]` in model input pixels
//! - image classification: class logits
//! - hand gesture recognition: `max_hands * 21 * 3` landmarks in input pixels,
//!   then optional per-hand presence scores and per-hand gesture logits
//! - face landmarks: `[faces, N, 3]` landmarks in input pixels (N >= 468),
//!   then optional per-face presence scores. Flat outputs are split evenly
//!   across the presence scores.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use ndarray::Array4;
use parking_lot::Mutex;

use super::{ModelBackend, ModelHandle};
use crate::camera::Frame;
use crate::config::ModelConfig;
use crate::error::PipelineError;
use crate::geometry::{FrameDims, Landmark, Rect};
use crate::result::{Category, Detection, InferenceResult};
use crate::topology::{FACE_LANDMARKS, HAND_LANDMARKS};
use crate::variant::Variant;

/// Square input resolution each model expects.
fn input_size(variant: Variant) -> u32 {
    match variant {
        Variant::ObjectDetection => 320,
        Variant::ImageClassification => 224,
        Variant::HandGestureRecognition => 224,
        Variant::FaceLandmarkDetection => 192,
    }
}

static ORT_INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialize ONNX Runtime once per process
fn init_ort() -> Result<(), PipelineError> {
    ORT_INIT
        .get_or_init(|| {
            ort::init()
                .with_name("LivePerception")
                .commit()
                .map(|_| ())
                .map_err(|e| format!("Failed to initialize ORT: {}", e))
        })
        .clone()
        .map_err(PipelineError::Init)
}

/// Find the models directory
///
/// Tries the explicit directory, then `models/` next to the executable and up
/// to two levels above it (for `target/debug` builds), then `./models`.
pub fn find_model_dir(explicit: Option<&Path>) -> Result<PathBuf, PipelineError> {
    if let Some(dir) = explicit {
        if dir.is_dir() {
            return Ok(dir.to_path_buf());
        }
        return Err(PipelineError::Init(format!(
            "Model directory not found: {:?}",
            dir
        )));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        for ancestor in exe_path.ancestors().skip(1).take(3) {
            let model_dir = ancestor.join("models");
            if model_dir.is_dir() {
                return Ok(model_dir);
            }
        }
    }

    let cwd = std::env::current_dir().map_err(|e| PipelineError::Init(e.to_string()))?;
    let model_dir = cwd.join("models");
    if model_dir.is_dir() {
        return Ok(model_dir);
    }

    Err(PipelineError::Init(
        "Models directory not found. Create a 'models' directory with ONNX models.".to_string(),
    ))
}

/// Resolve the model file for a variant.
fn model_path(
    variant: Variant,
    config: &ModelConfig,
    model_dir: Option<&Path>,
) -> Result<PathBuf, PipelineError> {
    let path = match &config.model_asset {
        Some(asset) => asset.clone(),
        None => find_model_dir(model_dir)?.join(format!("{}.onnx", variant.id())),
    };
    if !path.exists() {
        return Err(PipelineError::Init(format!("Model not found: {:?}", path)));
    }
    Ok(path)
}

/// Read a newline-separated label file. Blank lines are kept as empty labels
/// so that line numbers stay aligned with class indices.
pub fn load_labels(path: &Path) -> Result<Vec<String>, PipelineError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| PipelineError::Init(format!("Failed to read labels {:?}: {}", path, e)))?;
    Ok(text.lines().map(|line| line.trim().to_string()).collect())
}

/// ONNX Runtime model backend.
#[derive(Clone, Debug, Default)]
pub struct OnnxBackend {
    model_dir: Option<PathBuf>,
}

impl OnnxBackend {
    pub fn new(model_dir: Option<PathBuf>) -> Self {
        Self { model_dir }
    }
}

impl ModelBackend for OnnxBackend {
    type Handle = OnnxHandle;

    fn create(
        &self,
        variant: Variant,
        config: &ModelConfig,
    ) -> impl Future<Output = Result<OnnxHandle, PipelineError>> + Send + 'static {
        let config = config.clone();
        let model_dir = self.model_dir.clone();

        async move {
            tokio::task::spawn_blocking(move || load_handle(variant, config, model_dir))
                .await
                .map_err(|e| PipelineError::Init(format!("Model loader panicked: {}", e)))?
        }
    }
}

fn load_handle(
    variant: Variant,
    config: ModelConfig,
    model_dir: Option<PathBuf>,
) -> Result<OnnxHandle, PipelineError> {
    let path = model_path(variant, &config, model_dir.as_deref())?;
    init_ort()?;

    let session = ort::session::Session::builder()
        .map_err(|e| PipelineError::Init(format!("Failed to create session builder: {}", e)))?
        .with_intra_threads(2)
        .map_err(|e| PipelineError::Init(format!("Failed to set threads: {}", e)))?
        .commit_from_file(&path)
        .map_err(|e| PipelineError::Init(format!("Failed to load model {:?}: {}", path, e)))?;

    let labels = match &config.labels {
        Some(labels) => load_labels(labels)?,
        None => Vec::new(),
    };

    log::info!("Loaded {} model from {:?}", variant.title(), path);

    Ok(OnnxHandle {
        session: Some(Arc::new(Mutex::new(session))),
        decoder: Arc::new(Decoder {
            variant,
            config,
            labels,
            input: input_size(variant),
        }),
        last_timestamp: None,
    })
}

/// An open ONNX Runtime session for one variant.
pub struct OnnxHandle {
    session: Option<Arc<Mutex<ort::session::Session>>>,
    decoder: Arc<Decoder>,
    last_timestamp: Option<f64>,
}

impl ModelHandle for OnnxHandle {
    fn variant(&self) -> Variant {
        self.decoder.variant
    }

    fn infer(
        &mut self,
        frame: &Frame,
        timestamp_ms: f64,
    ) -> impl Future<Output = Result<InferenceResult, PipelineError>> + Send {
        let checked = self.check_input(frame, timestamp_ms);
        let decoder = self.decoder.clone();
        let frame = frame.clone();

        async move {
            let session = checked?;
            tokio::task::spawn_blocking(move || run_session(&session, &frame, &decoder))
                .await
                .map_err(|e| PipelineError::Inference(format!("Inference task failed: {}", e)))?
        }
    }

    fn close(&mut self) {
        if self.session.take().is_some() {
            log::debug!("Released ONNX session for {}", self.decoder.variant.title());
        }
    }
}

impl OnnxHandle {
    /// Validate one `infer` call before any work is queued.
    ///
    /// The timestamp is recorded only when it is accepted.
    fn check_input(
        &mut self,
        frame: &Frame,
        timestamp_ms: f64,
    ) -> Result<Arc<Mutex<ort::session::Session>>, PipelineError> {
        let session = self.session.clone().ok_or(PipelineError::Closed)?;
        self.advance_timestamp(timestamp_ms)?;

        if frame.dims().is_empty() {
            return Err(PipelineError::Frame {
                width: frame.width,
                height: frame.height,
            });
        }
        Ok(session)
    }

    fn advance_timestamp(&mut self, timestamp_ms: f64) -> Result<(), PipelineError> {
        if let Some(last) = self.last_timestamp {
            if timestamp_ms <= last {
                return Err(PipelineError::Inference(format!(
                    "timestamp {} is not after the previous one ({})",
                    timestamp_ms, last
                )));
            }
        }
        self.last_timestamp = Some(timestamp_ms);
        Ok(())
    }
}

/// Run the session on one frame and decode every output tensor
fn run_session(
    session: &Mutex<ort::session::Session>,
    frame: &Frame,
    decoder: &Decoder,
) -> Result<InferenceResult, PipelineError> {
    let size = decoder.input;
    let input = preprocess_frame_nhwc(frame, size, size);

    let input_array = Array4::from_shape_vec((1, size as usize, size as usize, 3), input)
        .map_err(|e| PipelineError::Inference(format!("Failed to create input array: {}", e)))?;

    let input_tensor = ort::value::Tensor::from_array(input_array)
        .map_err(|e| PipelineError::Inference(format!("Failed to create tensor: {}", e)))?;

    let mut session = session.lock();
    let outputs = session
        .run(ort::inputs![input_tensor])
        .map_err(|e| PipelineError::Inference(e.to_string()))?;

    let mut tensors = Vec::new();
    for output in outputs.iter() {
        let (shape, data) = output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Inference(format!("Failed to extract output: {}", e)))?;
        tensors.push(OutputTensor {
            shape: shape.iter().map(|&dim| dim.max(0) as usize).collect(),
            data: data.to_vec(),
        });
    }

    decoder.decode(&tensors, frame.dims())
}

/// Preprocess frame to NHWC format (height, width, channels), RGB in [0, 1]
pub fn preprocess_frame_nhwc(frame: &Frame, target_width: u32, target_height: u32) -> Vec<f32> {
    let mut output = vec![0.0f32; (target_width * target_height * 3) as usize];

    let x_ratio = frame.width as f32 / target_width as f32;
    let y_ratio = frame.height as f32 / target_height as f32;

    for y in 0..target_height {
        for x in 0..target_width {
            let src_x = (x as f32 * x_ratio) as u32;
            let src_y = (y as f32 * y_ratio) as u32;
            let src_idx = ((src_y * frame.width + src_x) * 4) as usize;

            if src_idx + 2 < frame.data.len() {
                let out_idx = ((y * target_width + x) * 3) as usize;
                output[out_idx] = frame.data[src_idx] as f32 / 255.0;
                output[out_idx + 1] = frame.data[src_idx + 1] as f32 / 255.0;
                output[out_idx + 2] = frame.data[src_idx + 2] as f32 / 255.0;
            }
        }
    }

    output
}

/// One model output copied out of the session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl OutputTensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }
}

/// Turns raw output tensors into a typed result for one variant.
#[derive(Debug)]
pub struct Decoder {
    pub variant: Variant,
    pub config: ModelConfig,
    pub labels: Vec<String>,
    /// Square model input size in pixels
    pub input: u32,
}

impl Decoder {
    pub fn decode(&self, tensors: &[OutputTensor], frame: FrameDims) -> Result<InferenceResult, PipelineError> {
        let first = tensors
            .first()
            .ok_or_else(|| PipelineError::Inference("Model produced no outputs".to_string()))?;
        let optional = |idx: usize| tensors.get(idx).map(|t| t.data.as_slice()).unwrap_or(&[]);

        match self.variant {
            Variant::ObjectDetection => Ok(InferenceResult::Detections(self.detections(&first.data, frame))),
            Variant::ImageClassification => {
                Ok(InferenceResult::Classification(self.top_category(&first.data)))
            }
            Variant::HandGestureRecognition => Ok(self.gestures(&first.data, optional(1), optional(2))),
            Variant::FaceLandmarkDetection => self
                .faces(&first.data, &first.shape, optional(1))
                .map(InferenceResult::FaceMesh),
        }
    }

    fn label(&self, index: usize) -> String {
        match self.labels.get(index) {
            Some(label) if !label.is_empty() => label.clone(),
            _ => index.to_string(),
        }
    }

    /// Detector rows rescaled from model input pixels to frame pixels,
    /// highest score first.
    pub fn detections(&self, rows: &[f32], frame: FrameDims) -> Vec<Detection> {
        let sx = frame.width as f32 / self.input as f32;
        let sy = frame.height as f32 / self.input as f32;

        let mut detections: Vec<Detection> = rows
            .chunks_exact(6)
            .filter(|row| row[4] >= self.config.score_threshold)
            .map(|row| Detection {
                bounding_box: Rect::new(row[0] * sx, row[1] * sy, row[2] * sx, row[3] * sy),
                category: Category::new(self.label(row[5].max(0.0) as usize), row[4]),
            })
            .collect();

        detections.sort_by(|a, b| b.category.score.total_cmp(&a.category.score));
        detections
    }

    /// Softmax over logits, best class. `None` for an empty output.
    pub fn top_category(&self, logits: &[f32]) -> Option<Category> {
        let probs = softmax(logits);
        probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, &score)| Category::new(self.label(idx), score))
    }

    /// Hands above the presence threshold. The gesture is the top category of
    /// the first kept hand.
    pub fn gestures(&self, landmarks: &[f32], presence: &[f32], logits: &[f32]) -> InferenceResult {
        let per_hand = HAND_LANDMARKS * 3;
        let slots = self.config.max_hands.min(landmarks.len() / per_hand);
        let gestures_per_hand = if self.config.max_hands > 0 {
            logits.len() / self.config.max_hands
        } else {
            0
        };

        let mut hands = Vec::new();
        let mut gesture: Option<Category> = None;

        for slot in 0..slots {
            let score = presence.get(slot).copied().unwrap_or(1.0);
            if score < self.config.presence_threshold {
                continue;
            }
            let points = &landmarks[slot * per_hand..(slot + 1) * per_hand];
            hands.push(self.normalize(points));

            if hands.len() == 1 && gestures_per_hand > 0 {
                let start = slot * gestures_per_hand;
                gesture = self.top_category(&logits[start..start + gestures_per_hand]);
            }
        }

        InferenceResult::GestureSet { hands, gesture }
    }

    /// Face meshes above the presence threshold, at most `max_faces`.
    ///
    /// The point count comes from a trailing `[.., N, 3]` shape. A flat output
    /// is split evenly across the presence scores, or read as one face.
    pub fn faces(
        &self,
        landmarks: &[f32],
        shape: &[usize],
        presence: &[f32],
    ) -> Result<Vec<Vec<Landmark>>, PipelineError> {
        let points_per_face = match shape {
            [.., points, 3] => *points,
            _ => landmarks.len() / 3 / presence.len().max(1),
        };
        if points_per_face < FACE_LANDMARKS {
            return Err(PipelineError::Inference(format!(
                "Face mesh has {} points, expected at least {}",
                points_per_face, FACE_LANDMARKS
            )));
        }

        let slots = self.config.max_faces.min(landmarks.len() / (points_per_face * 3));
        let mut faces = Vec::new();
        for slot in 0..slots {
            let score = presence.get(slot).copied().unwrap_or(1.0);
            if score < self.config.presence_threshold {
                continue;
            }
            let start = slot * points_per_face * 3;
            faces.push(self.normalize(&landmarks[start..start + points_per_face * 3]));
        }
        Ok(faces)
    }

    /// `[x, y, z]` triples in input pixels to normalized landmarks
    fn normalize(&self, points: &[f32]) -> Vec<Landmark> {
        let size = self.input as f32;
        points
            .chunks_exact(3)
            .map(|p| Landmark::new(p[0] / size, p[1] / size, p[2] / size))
            .collect()
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder(variant: Variant) -> Decoder {
        Decoder {
            variant,
            config: ModelConfig::default(),
            labels: vec!["person".into(), "cup".into(), "".into()],
            input: 100,
        }
    }

    #[test]
    fn test_detections_rescaled_and_filtered() {
        let d = decoder(Variant::ObjectDetection);
        let rows = [
            10.0, 10.0, 20.0, 10.0, 0.82, 1.0, // kept
            0.0, 0.0, 5.0, 5.0, 0.30, 0.0, // below threshold
            50.0, 50.0, 10.0, 10.0, 0.90, 2.0, // blank label
        ];
        let detections = d.detections(&rows, FrameDims::new(200, 100));
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].category, Category::new("2", 0.90));
        assert_eq!(detections[1].bounding_box, Rect::new(20.0, 10.0, 40.0, 10.0));
        assert_eq!(detections[1].category.label, "cup");
    }

    #[test]
    fn test_top_category() {
        let d = decoder(Variant::ImageClassification);
        let top = d.top_category(&[0.1, 3.0, 0.2]).unwrap();
        assert_eq!(top.label, "cup");
        assert!(top.score > 0.5 && top.score <= 1.0);
        assert_eq!(d.top_category(&[]), None);
    }

    #[test]
    fn test_gestures_respect_presence() {
        let mut d = decoder(Variant::HandGestureRecognition);
        d.labels = vec!["None".into(), "Thumb_Up".into()];
        let mut landmarks = vec![50.0f32; 2 * HAND_LANDMARKS * 3];
        landmarks[0] = 25.0;
        let presence = [0.9, 0.1];
        let logits = [0.0, 4.0, 4.0, 0.0];

        let InferenceResult::GestureSet { hands, gesture } = d.gestures(&landmarks, &presence, &logits) else {
            panic!("expected a gesture set");
        };
        assert_eq!(hands.len(), 1);
        assert_eq!(hands[0].len(), HAND_LANDMARKS);
        assert_eq!(hands[0][0], Landmark::new(0.25, 0.5, 0.5));
        assert_eq!(gesture.map(|g| g.label), Some("Thumb_Up".to_string()));
    }

    #[test]
    fn test_gesture_comes_from_first_hand() {
        let mut d = decoder(Variant::HandGestureRecognition);
        d.labels = vec!["None".into(), "Thumb_Up".into()];
        let landmarks = vec![50.0f32; 2 * HAND_LANDMARKS * 3];
        // Second hand is more confident but the first hand's gesture wins
        let logits = [1.0, 0.0, 0.0, 6.0];

        let InferenceResult::GestureSet { hands, gesture } = d.gestures(&landmarks, &[0.9, 0.9], &logits) else {
            panic!("expected a gesture set");
        };
        assert_eq!(hands.len(), 2);
        assert_eq!(gesture.map(|g| g.label), Some("None".to_string()));
    }

    #[test]
    fn test_no_hands_means_no_gesture() {
        let d = decoder(Variant::HandGestureRecognition);
        let result = d.gestures(&[], &[], &[1.0, 2.0]);
        assert!(result.is_empty());
    }

    #[test]
    fn test_face_mesh_size_checked() {
        let d = decoder(Variant::FaceLandmarkDetection);
        assert!(d.faces(&vec![0.0; 10 * 3], &[1, 30], &[]).is_err());
        assert!(d.faces(&vec![0.0; 10 * 3], &[1, 10, 3], &[]).is_err());

        let faces = d.faces(&vec![50.0; 478 * 3], &[1, 1434], &[0.99]).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].len(), 478);
    }

    #[test]
    fn test_single_face_output_under_larger_cap() {
        let mut d = decoder(Variant::FaceLandmarkDetection);
        d.config.max_faces = 2;

        let faces = d.faces(&vec![96.0; 478 * 3], &[1, 478, 3], &[0.99]).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].len(), 478);
        assert_eq!(faces[0][0], Landmark::new(0.96, 0.96, 0.96));

        let result = d
            .decode(
                &[OutputTensor::new(vec![1, 478, 3], vec![96.0; 478 * 3])],
                FrameDims::new(640, 480),
            )
            .unwrap();
        assert!(matches!(result, InferenceResult::FaceMesh(faces) if faces.len() == 1));
    }

    #[test]
    fn test_face_slots_capped_by_config() {
        let d = decoder(Variant::FaceLandmarkDetection);
        let faces = d.faces(&vec![50.0; 2 * 468 * 3], &[2, 468, 3], &[0.9, 0.9]).unwrap();
        assert_eq!(faces.len(), 1);
    }

    fn closed_handle() -> OnnxHandle {
        OnnxHandle {
            session: None,
            decoder: Arc::new(decoder(Variant::ObjectDetection)),
            last_timestamp: None,
        }
    }

    fn frame(width: u32, height: u32) -> Frame {
        Frame {
            data: Arc::from(vec![0u8; (width * height * 4) as usize]),
            width,
            height,
            frame_number: 0,
        }
    }

    #[tokio::test]
    async fn test_infer_after_close_is_closed_error() {
        let mut handle = closed_handle();
        handle.close();
        let err = handle.infer(&frame(4, 4), 10.0).await.unwrap_err();
        assert_eq!(err, PipelineError::Closed);
        assert_eq!(handle.last_timestamp, None);
    }

    #[test]
    fn test_out_of_order_timestamp_is_rejected() {
        let mut handle = closed_handle();
        handle.advance_timestamp(100.0).unwrap();

        for ts in [50.0, 100.0] {
            assert!(matches!(
                handle.advance_timestamp(ts),
                Err(PipelineError::Inference(_))
            ));
            assert_eq!(handle.last_timestamp, Some(100.0));
        }

        handle.advance_timestamp(116.0).unwrap();
        assert_eq!(handle.last_timestamp, Some(116.0));
    }

    #[test]
    fn test_decode_requires_output() {
        let d = decoder(Variant::ObjectDetection);
        assert!(matches!(
            d.decode(&[], FrameDims::new(10, 10)),
            Err(PipelineError::Inference(_))
        ));
    }

    #[test]
    fn test_preprocess_nhwc() {
        let frame = Frame {
            data: Arc::from(vec![255u8, 0, 0, 255, 0, 255, 0, 255]),
            width: 2,
            height: 1,
            frame_number: 0,
        };
        let out = preprocess_frame_nhwc(&frame, 2, 1);
        assert_eq!(out, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_missing_model_is_init_error() {
        let config = ModelConfig {
            model_asset: Some(PathBuf::from("/nonexistent/model.onnx")),
            ..Default::default()
        };
        let err = model_path(Variant::ObjectDetection, &config, None).unwrap_err();
        assert!(err.is_terminal());
    }
}
