//! Drawing landmark skeletons and status text onto camera frames.

use crate::holistic::HolisticResult;
use crate::image::{draw, Color, Image};
use crate::landmark::Landmarks;
use crate::{body, face, hand};

/// Landmarks with a visibility below this value are not drawn.
const VISIBILITY_THRESHOLD: f32 = 0.5;

/// Styling of a landmark set: the color and size of points and connecting lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawingSpec {
    pub color: Color,
    /// Stroke width of connection lines.
    pub thickness: u32,
    /// Radius of landmark points.
    pub circle_radius: u32,
}

impl DrawingSpec {
    pub const fn new(color: Color, thickness: u32, circle_radius: u32) -> Self {
        Self {
            color,
            thickness,
            circle_radius,
        }
    }
}

/// Styles for every landmark set of a [`HolisticResult`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub pose: DrawingSpec,
    pub hand: DrawingSpec,
    pub face: DrawingSpec,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            pose: DrawingSpec::new(Color::from_rgb8(204, 0, 0), 2, 2),
            hand: DrawingSpec::new(Color::from_rgb8(204, 153, 255), 2, 2),
            face: DrawingSpec::new(Color::from_rgb8(255, 178, 102), 1, 1),
        }
    }
}

/// Draws a set of normalized landmarks onto `image`, along with the given connections.
///
/// Landmarks (and connections touching landmarks) whose visibility is below 0.5 are skipped.
/// Connections referring to landmarks that don't exist are ignored.
pub fn draw_landmarks(
    image: &mut Image,
    landmarks: &Landmarks,
    connections: impl IntoIterator<Item = (usize, usize)>,
    spec: DrawingSpec,
) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let points = landmarks
        .iter()
        .map(|lm| {
            let visible = lm.visibility().map_or(true, |v| v >= VISIBILITY_THRESHOLD);
            visible.then(|| ((lm.x() * w).round() as i32, (lm.y() * h).round() as i32))
        })
        .collect::<Vec<_>>();

    for (a, b) in connections {
        if let (Some(Some((ax, ay))), Some(Some((bx, by)))) = (points.get(a), points.get(b)) {
            draw::line(image, *ax, *ay, *bx, *by)
                .color(spec.color)
                .stroke_width(spec.thickness);
        }
    }

    for &(x, y) in points.iter().flatten() {
        draw::circle(image, x, y, spec.circle_radius * 2 + 1)
            .color(spec.color)
            .stroke_width(spec.thickness.max(1));
    }
}

/// Draws all landmark sets in `result` onto `image`.
///
/// The face is drawn first so that the body and hands are drawn over it.
pub fn draw_holistic(image: &mut Image, result: &HolisticResult, style: &OverlayStyle) {
    if let Some(face) = &result.face {
        draw_landmarks(image, face, face::landmark::oval_connections(), style.face);
    }
    if let Some(pose) = &result.pose {
        draw_landmarks(image, pose, body::landmark::connections(), style.pose);
    }
    for hand in [&result.left_hand, &result.right_hand].into_iter().flatten() {
        draw_landmarks(image, hand, hand::landmark::connections(), style.hand);
    }
}

/// A line of status text at a fixed position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextSpec {
    /// Left edge of the text, in pixels.
    pub x: i32,
    /// Y coordinate of the text baseline, in pixels.
    pub y: i32,
    pub color: Color,
}

impl TextSpec {
    pub const FPS: Self = Self {
        x: 10,
        y: 30,
        color: Color::CYAN,
    };

    pub const FINGERS: Self = Self {
        x: 10,
        y: 70,
        color: Color::MAGENTA,
    };
}

pub fn draw_text(image: &mut Image, text: &str, spec: TextSpec) {
    draw::text(image, spec.x, spec.y, text)
        .align_left()
        .align_baseline()
        .color(spec.color)
        .weight(2);
}

/// Formats the frame rate for display, truncated to a whole number.
pub fn fps_label(fps: f32) -> String {
    format!("FPS: {}", fps as u32)
}

pub fn fingers_label(count: u32) -> String {
    format!("Fingers: {count}")
}
