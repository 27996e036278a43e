//! Landmark topologies and per-variant draw recipes
//!
//! Pure data: which landmark indices are joined by a line, and which colors,
//! widths and text styles each variant draws with. Nothing here is mutated at
//! runtime.

use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::variant::Variant;

/// Landmarks per detected hand.
pub const HAND_LANDMARKS: usize = 21;

/// Minimum landmarks per face mesh (iris models add 10 more).
pub const FACE_LANDMARKS: usize = 468;

/// A pair of landmark indices joined by a line.
pub type Edge = (usize, usize);

/// RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const WHITE: Color = Color::rgb(0xFF, 0xFF, 0xFF);
    pub const GREEN: Color = Color::rgb(0x00, 0xFF, 0x00);
    pub const CYAN: Color = Color::rgb(0x00, 0xFF, 0xFF);

    /// `#rrggbb` notation.
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Line style.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub color: Color,
    pub width: f32,
}

/// Filled circle style for landmark markers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointStyle {
    pub color: Color,
    pub radius: f32,
}

/// Text style for labels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub color: Color,
    pub size_px: f32,
}

/// One named anatomical region and the stroke it is drawn with.
#[derive(Debug)]
pub struct Connections {
    pub name: &'static str,
    pub edges: &'static [Edge],
    pub stroke: Stroke,
}

/// Static draw recipe for one variant.
#[derive(Debug)]
pub struct OverlaySpec {
    /// Geometry is drawn under a horizontal flip so it tracks the mirrored video.
    pub mirrored: bool,
    /// Regions drawn in order, each with its own stroke.
    pub connections: &'static [Connections],
    /// Marker drawn on every landmark after the connections.
    pub points: Option<PointStyle>,
    /// Outline for bounding boxes.
    pub boxes: Option<Stroke>,
    /// Label text, always drawn unmirrored.
    pub text: TextStyle,
    /// Anchor for frame-level labels (classification, gesture).
    pub text_origin: Point,
    /// Gap between a box's top edge and its label baseline.
    pub label_offset: f32,
}

pub const HAND_CONNECTIONS: &[Edge] = &[
    // Thumb
    (1, 2), (2, 3), (3, 4),
    // Index
    (5, 6), (6, 7), (7, 8),
    // Middle
    (9, 10), (10, 11), (11, 12),
    // Ring
    (13, 14), (14, 15), (15, 16),
    // Pinky
    (17, 18), (18, 19), (19, 20),
    // Palm
    (0, 1), (0, 5), (5, 9), (9, 13), (13, 17), (17, 0),
];

pub const FACE_OVAL: &[Edge] = &[
    (10, 338), (338, 297), (297, 332), (332, 284), (284, 251),
    (251, 389), (389, 356), (356, 454), (454, 323), (323, 361),
    (361, 288), (288, 397), (397, 365), (365, 379), (379, 378),
    (378, 400), (400, 377), (377, 152), (152, 148), (148, 176),
    (176, 149), (149, 150), (150, 136), (136, 172), (172, 58),
    (58, 132), (132, 93), (93, 234), (234, 127), (127, 162),
    (162, 21), (21, 54), (54, 103), (103, 67), (67, 109),
    (109, 10),
];

pub const LIPS: &[Edge] = &[
    (61, 146), (146, 91), (91, 181), (181, 84), (84, 17), (17, 314),
    (314, 405), (405, 321), (321, 375), (375, 291), (61, 185),
    (185, 40), (40, 39), (39, 37), (37, 0), (0, 267),
    (267, 269), (269, 270), (270, 409), (409, 291),
];

pub const LEFT_EYE: &[Edge] = &[
    (33, 7), (7, 163), (163, 144), (144, 145), (145, 153),
    (153, 154), (154, 155), (155, 133), (33, 246), (246, 161),
    (161, 160), (160, 159), (159, 158), (158, 157), (157, 173),
    (173, 133),
];

pub const RIGHT_EYE: &[Edge] = &[
    (263, 249), (249, 390), (390, 373), (373, 374), (374, 380),
    (380, 381), (381, 382), (382, 362), (263, 466), (466, 388),
    (388, 387), (387, 386), (386, 385), (385, 384), (384, 398),
    (398, 362),
];

pub const LEFT_EYEBROW: &[Edge] = &[(46, 53), (53, 52), (52, 65), (65, 55), (55, 107)];

pub const RIGHT_EYEBROW: &[Edge] = &[(276, 283), (283, 282), (282, 295), (295, 285), (285, 336)];

pub const LEFT_IRIS: &[Edge] = &[(474, 475), (475, 476), (476, 477), (477, 474)];

pub const RIGHT_IRIS: &[Edge] = &[(469, 470), (470, 471), (471, 472), (472, 469)];

const LANDMARK_BLUE: Color = Color::rgb(0x4C, 0xC9, 0xF0);
const LIPS_PINK: Color = Color::rgb(0xFF, 0x74, 0xA4);
const BROW_YELLOW: Color = Color::rgb(0xFF, 0xD9, 0x66);
const EYE_CYAN: Color = Color::rgb(0x00, 0xE5, 0xFF);

const fn face_stroke(color: Color) -> Stroke {
    Stroke { color, width: 2.0 }
}

const HAND_REGIONS: &[Connections] = &[Connections {
    name: "hand",
    edges: HAND_CONNECTIONS,
    stroke: Stroke {
        color: Color::WHITE,
        width: 3.0,
    },
}];

const FACE_REGIONS: &[Connections] = &[
    Connections { name: "face_oval", edges: FACE_OVAL, stroke: face_stroke(Color::WHITE) },
    Connections { name: "lips", edges: LIPS, stroke: face_stroke(LIPS_PINK) },
    Connections { name: "left_eyebrow", edges: LEFT_EYEBROW, stroke: face_stroke(BROW_YELLOW) },
    Connections { name: "right_eyebrow", edges: RIGHT_EYEBROW, stroke: face_stroke(BROW_YELLOW) },
    Connections { name: "left_eye", edges: LEFT_EYE, stroke: face_stroke(EYE_CYAN) },
    Connections { name: "right_eye", edges: RIGHT_EYE, stroke: face_stroke(EYE_CYAN) },
    Connections { name: "left_iris", edges: LEFT_IRIS, stroke: face_stroke(Color::GREEN) },
    Connections { name: "right_iris", edges: RIGHT_IRIS, stroke: face_stroke(Color::GREEN) },
];

static OBJECT_DETECTION: OverlaySpec = OverlaySpec {
    mirrored: false,
    connections: &[],
    points: None,
    boxes: Some(Stroke {
        color: Color::GREEN,
        width: 2.0,
    }),
    text: TextStyle {
        color: Color::GREEN,
        size_px: 14.0,
    },
    text_origin: Point::new(0.0, 0.0),
    label_offset: 6.0,
};

static IMAGE_CLASSIFICATION: OverlaySpec = OverlaySpec {
    mirrored: false,
    connections: &[],
    points: None,
    boxes: None,
    text: TextStyle {
        color: Color::GREEN,
        size_px: 24.0,
    },
    text_origin: Point::new(20.0, 40.0),
    label_offset: 0.0,
};

static HAND_GESTURE: OverlaySpec = OverlaySpec {
    mirrored: true,
    connections: HAND_REGIONS,
    points: Some(PointStyle {
        color: LANDMARK_BLUE,
        radius: 5.0,
    }),
    boxes: None,
    text: TextStyle {
        color: Color::CYAN,
        size_px: 28.0,
    },
    text_origin: Point::new(20.0, 40.0),
    label_offset: 0.0,
};

static FACE_LANDMARK: OverlaySpec = OverlaySpec {
    mirrored: true,
    connections: FACE_REGIONS,
    points: Some(PointStyle {
        color: LANDMARK_BLUE,
        radius: 2.0,
    }),
    boxes: None,
    text: TextStyle {
        color: Color::WHITE,
        size_px: 24.0,
    },
    text_origin: Point::new(20.0, 40.0),
    label_offset: 0.0,
};

/// Draw recipe for a variant.
pub fn overlay_spec(variant: Variant) -> &'static OverlaySpec {
    match variant {
        Variant::ObjectDetection => &OBJECT_DETECTION,
        Variant::ImageClassification => &IMAGE_CLASSIFICATION,
        Variant::HandGestureRecognition => &HAND_GESTURE,
        Variant::FaceLandmarkDetection => &FACE_LANDMARK,
    }
}
