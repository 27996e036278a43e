//! Recording surface
//!
//! Stores draw calls in device pixels, with the current transform already
//! applied, so a host UI can replay them on its own canvas.

use serde::{Deserialize, Serialize};

use super::Surface;
use crate::geometry::{FrameDims, Point, Rect, Transform};
use crate::topology::{Color, PointStyle, Stroke, TextStyle};

/// One recorded draw call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    Resize { width: u32, height: u32 },
    Clear,
    Line { from: Point, to: Point, stroke: Stroke },
    Circle { center: Point, radius: f32, color: Color },
    Rect { rect: Rect, stroke: Stroke },
    Text { text: String, at: Point, style: TextStyle },
}

/// A `Surface` that records instead of rasterizing.
#[derive(Debug, Default)]
pub struct DisplayList {
    dims: FrameDims,
    transform: Transform,
    stack: Vec<Transform>,
    commands: Vec<DrawCommand>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dims(&self) -> FrameDims {
        self.dims
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// JSON array of the recorded commands.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.commands)
    }
}

impl Surface for DisplayList {
    fn resize(&mut self, dims: FrameDims) {
        self.dims = dims;
        self.transform = Transform::IDENTITY;
        self.stack.clear();
        self.commands.clear();
        self.commands.push(DrawCommand::Resize {
            width: dims.width,
            height: dims.height,
        });
    }

    fn clear(&mut self) {
        self.commands.retain(|c| matches!(c, DrawCommand::Resize { .. }));
        self.commands.push(DrawCommand::Clear);
    }

    fn save(&mut self) {
        self.stack.push(self.transform);
    }

    fn restore(&mut self) {
        if let Some(transform) = self.stack.pop() {
            self.transform = transform;
        }
    }

    fn scale(&mut self, sx: f32, sy: f32) {
        self.transform = self.transform.scale(sx, sy);
    }

    fn translate(&mut self, tx: f32, ty: f32) {
        self.transform = self.transform.translate(tx, ty);
    }

    fn stroke_line(&mut self, from: Point, to: Point, stroke: &Stroke) {
        self.commands.push(DrawCommand::Line {
            from: self.transform.apply(from),
            to: self.transform.apply(to),
            stroke: *stroke,
        });
    }

    fn fill_circle(&mut self, center: Point, style: &PointStyle) {
        self.commands.push(DrawCommand::Circle {
            center: self.transform.apply(center),
            radius: style.radius,
            color: style.color,
        });
    }

    fn stroke_rect(&mut self, rect: Rect, stroke: &Stroke) {
        self.commands.push(DrawCommand::Rect {
            rect: self.transform.apply_rect(rect),
            stroke: *stroke,
        });
    }

    fn fill_text(&mut self, text: &str, at: Point, style: &TextStyle) {
        self.commands.push(DrawCommand::Text {
            text: text.to_string(),
            at: self.transform.apply(at),
            style: *style,
        });
    }
}
