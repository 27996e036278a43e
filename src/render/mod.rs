//! Overlay rendering
//!
//! `OverlayRenderer` draws an `InferenceResult` onto any `Surface`. Landmark
//! geometry is drawn in mirrored space so it lines up with the mirrored video
//! preview; boxes and all text are drawn unmirrored.

mod display_list;

pub use display_list::{DisplayList, DrawCommand};

use crate::geometry::{FrameDims, Landmark, Point, Rect};
use crate::result::{Category, Detection, InferenceResult};
use crate::topology::{overlay_spec, Connections, OverlaySpec, PointStyle, Stroke, TextStyle};

/// A 2D drawing context with a canvas-style transform stack.
pub trait Surface {
    /// Set the backing size in pixels. Resets the transform and drops all drawing.
    fn resize(&mut self, dims: FrameDims);
    /// Erase everything drawn since the last resize.
    fn clear(&mut self);
    fn save(&mut self);
    fn restore(&mut self);
    fn scale(&mut self, sx: f32, sy: f32);
    fn translate(&mut self, tx: f32, ty: f32);
    fn stroke_line(&mut self, from: Point, to: Point, stroke: &Stroke);
    fn fill_circle(&mut self, center: Point, style: &PointStyle);
    fn stroke_rect(&mut self, rect: Rect, stroke: &Stroke);
    fn fill_text(&mut self, text: &str, at: Point, style: &TextStyle);
}

/// Draw one line per edge. Edges referencing a missing point are skipped.
pub fn draw_connectors<S: Surface + ?Sized>(surface: &mut S, points: &[Point], connections: &Connections) {
    for &(a, b) in connections.edges {
        if let (Some(&from), Some(&to)) = (points.get(a), points.get(b)) {
            surface.stroke_line(from, to, &connections.stroke);
        }
    }
}

/// Draw a filled marker on every point.
pub fn draw_points<S: Surface + ?Sized>(surface: &mut S, points: &[Point], style: &PointStyle) {
    for &point in points {
        surface.fill_circle(point, style);
    }
}

/// Label drawn above a detection box.
pub fn detection_label(category: &Category) -> String {
    format!("{} {:.2}", category.label, category.score)
}

/// Label drawn for a classification.
pub fn classification_label(category: &Category) -> String {
    format!("{} ({:.2})", category.label, category.score)
}

/// Label drawn for a recognized gesture.
pub fn gesture_label(category: &Category) -> String {
    format!("Gesture: {}", category.label)
}

/// Renders inference results as overlays.
#[derive(Debug, Default, Clone, Copy)]
pub struct OverlayRenderer;

impl OverlayRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Resize and clear the surface to match the frame, then draw the result.
    pub fn render<S: Surface + ?Sized>(&self, result: &InferenceResult, dims: FrameDims, surface: &mut S) {
        surface.resize(dims);
        surface.clear();

        let spec = overlay_spec(result.variant());

        match result {
            InferenceResult::Detections(detections) => {
                for detection in detections {
                    self.draw_detection(surface, detection, spec);
                }
            }
            InferenceResult::Classification(top) => {
                if let Some(category) = top {
                    surface.fill_text(&classification_label(category), spec.text_origin, &spec.text);
                }
            }
            InferenceResult::GestureSet { hands, gesture } => {
                self.draw_landmark_sets(surface, hands, dims, spec);
                if let Some(category) = gesture {
                    surface.fill_text(&gesture_label(category), spec.text_origin, &spec.text);
                }
            }
            InferenceResult::FaceMesh(faces) => {
                self.draw_landmark_sets(surface, faces, dims, spec);
            }
        }
    }

    fn draw_detection<S: Surface + ?Sized>(&self, surface: &mut S, detection: &Detection, spec: &OverlaySpec) {
        let rect = detection.bounding_box;
        if let Some(stroke) = &spec.boxes {
            surface.stroke_rect(rect, stroke);
        }
        let anchor = Point::new(rect.x, rect.y - spec.label_offset);
        surface.fill_text(&detection_label(&detection.category), anchor, &spec.text);
    }

    fn draw_landmark_sets<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        sets: &[Vec<Landmark>],
        dims: FrameDims,
        spec: &OverlaySpec,
    ) {
        if sets.is_empty() {
            return;
        }

        surface.save();
        if spec.mirrored {
            surface.scale(-1.0, 1.0);
            surface.translate(-(dims.width as f32), 0.0);
        }

        for landmarks in sets {
            let points: Vec<Point> = landmarks.iter().map(|lm| lm.to_pixel(dims)).collect();
            for connections in spec.connections {
                draw_connectors(surface, &points, connections);
            }
            if let Some(style) = &spec.points {
                draw_points(surface, &points, style);
            }
        }

        surface.restore();
    }
}
