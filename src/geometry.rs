//! Overlay geometry
//!
//! Pixel-space points and rectangles, normalized landmarks, frame dimensions,
//! and the 2D affine transform used by drawing surfaces.

use serde::{Deserialize, Serialize};

/// Point in canvas pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in canvas pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Native dimensions of a video frame (and of the canvas drawn over it).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDims {
    pub width: u32,
    pub height: u32,
}

impl FrameDims {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A frame with a zero side has not delivered data yet.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Landmark in normalized image coordinates (x, y in [0, 1], z relative depth).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Denormalize onto a canvas of the given size.
    pub fn to_pixel(&self, dims: FrameDims) -> Point {
        Point::new(self.x * dims.width as f32, self.y * dims.height as f32)
    }
}

/// 2D affine transform with the same layout as a canvas matrix:
///
/// ```text
/// | a c e |
/// | b d f |
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// `self * other`: `other` applies to points first.
    pub fn multiply(&self, other: &Transform) -> Transform {
        Transform {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    /// Append a scale, like `ctx.scale(sx, sy)`.
    pub fn scale(&self, sx: f32, sy: f32) -> Transform {
        self.multiply(&Transform {
            a: sx,
            d: sy,
            ..Transform::IDENTITY
        })
    }

    /// Append a translation, like `ctx.translate(tx, ty)`.
    pub fn translate(&self, tx: f32, ty: f32) -> Transform {
        self.multiply(&Transform {
            e: tx,
            f: ty,
            ..Transform::IDENTITY
        })
    }

    pub fn apply(&self, point: Point) -> Point {
        Point::new(
            self.a * point.x + self.c * point.y + self.e,
            self.b * point.x + self.d * point.y + self.f,
        )
    }

    /// Map a rectangle and return its axis-aligned bounds.
    pub fn apply_rect(&self, rect: Rect) -> Rect {
        let p0 = self.apply(Point::new(rect.x, rect.y));
        let p1 = self.apply(Point::new(rect.x + rect.width, rect.y + rect.height));
        let x = p0.x.min(p1.x);
        let y = p0.y.min(p1.y);
        Rect::new(x, y, (p1.x - p0.x).abs(), (p1.y - p0.y).abs())
    }

    /// Horizontal flip about the canvas centre, so that x maps to `width - x`.
    pub fn mirror_x(width: f32) -> Transform {
        Transform::IDENTITY.scale(-1.0, 1.0).translate(-width, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_maps_x_to_width_minus_x() {
        let mirror = Transform::mirror_x(640.0);
        let p = mirror.apply(Point::new(128.0, 50.0));
        assert_eq!(p, Point::new(512.0, 50.0));
    }

    #[test]
    fn test_landmark_to_pixel() {
        let lm = Landmark::new(0.25, 0.5, 0.0);
        assert_eq!(lm.to_pixel(FrameDims::new(640, 480)), Point::new(160.0, 240.0));
    }

    #[test]
    fn test_apply_rect_normalizes_mirrored_bounds() {
        let mirror = Transform::mirror_x(100.0);
        let r = mirror.apply_rect(Rect::new(10.0, 5.0, 20.0, 10.0));
        assert_eq!(r, Rect::new(70.0, 5.0, 20.0, 10.0));
    }

    #[test]
    fn test_frame_dims_empty() {
        assert!(FrameDims::new(0, 480).is_empty());
        assert!(FrameDims::default().is_empty());
        assert!(!FrameDims::new(1, 1).is_empty());
    }
}
