//! Stroke payload carried by drawings and sync messages.

use kurbo::{BezPath, Point, Rect};
use peniko::Color;
use serde::{Deserialize, Serialize};

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InkColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl InkColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }
}

impl Default for InkColor {
    fn default() -> Self {
        Self::black()
    }
}

impl From<Color> for InkColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<InkColor> for Color {
    fn from(color: InkColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Tool that laid down the ink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InkKind {
    #[default]
    Pen,
    Pencil,
    Marker,
}

/// Visual style of a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InkStyle {
    pub kind: InkKind,
    pub color: InkColor,
    pub width: f64,
}

impl Default for InkStyle {
    fn default() -> Self {
        Self {
            kind: InkKind::Pen,
            color: InkColor::black(),
            width: 2.0,
        }
    }
}

/// One continuous pen/touch input, immutable once committed.
///
/// Strokes have no identity of their own: a drawing only cares about where a
/// stroke sits in its sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    points: Vec<Point>,
    style: InkStyle,
}

impl Stroke {
    /// Create a stroke with the default pen style.
    pub fn from_points(points: Vec<Point>) -> Self {
        Self::with_style(points, InkStyle::default())
    }

    /// Create a stroke with an explicit style.
    ///
    /// Points with a non-finite coordinate are dropped, and a width that is
    /// not a positive finite number falls back to the default width. JSON has
    /// no encoding for NaN or infinity.
    pub fn with_style(mut points: Vec<Point>, mut style: InkStyle) -> Self {
        let sampled = points.len();
        points.retain(|p| p.is_finite());
        if points.len() != sampled {
            log::warn!("Dropped {} non-finite stroke point(s)", sampled - points.len());
        }

        if !(style.width.is_finite() && style.width > 0.0) {
            log::warn!("Invalid stroke width {}, using default", style.width);
            style.width = InkStyle::default().width;
        }

        Self { points, style }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn style(&self) -> &InkStyle {
        &self.style
    }

    /// Number of sampled points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Axis-aligned bounds of the sampled points, `Rect::ZERO` when empty.
    pub fn bounds(&self) -> Rect {
        let Some(first) = self.points.first() else {
            return Rect::ZERO;
        };

        self.points
            .iter()
            .skip(1)
            .fold(Rect::from_points(*first, *first), |acc, p| {
                acc.union_pt(*p)
            })
    }

    /// Polyline through the sampled points, for renderers.
    pub fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let mut points = self.points.iter();

        if let Some(first) = points.next() {
            path.move_to(*first);
            for point in points {
                path.line_to(*point);
            }
        }

        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let stroke = Stroke::from_points(vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 50.0),
            Point::new(50.0, 100.0),
        ]);

        let bounds = stroke.bounds();
        assert!((bounds.x0).abs() < f64::EPSILON);
        assert!((bounds.y0).abs() < f64::EPSILON);
        assert!((bounds.x1 - 100.0).abs() < f64::EPSILON);
        assert!((bounds.y1 - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_bounds() {
        let stroke = Stroke::from_points(Vec::new());
        assert!(stroke.is_empty());
        assert_eq!(stroke.bounds(), Rect::ZERO);
    }

    #[test]
    fn test_equality_includes_style() {
        let points = vec![Point::new(1.0, 2.0), Point::new(3.0, 4.0)];
        let pen = Stroke::from_points(points.clone());
        let marker = Stroke::with_style(
            points,
            InkStyle {
                kind: InkKind::Marker,
                ..InkStyle::default()
            },
        );

        assert_ne!(pen, marker);
        assert_eq!(pen, pen.clone());
    }

    #[test]
    fn test_non_finite_input_is_sanitized() {
        let stroke = Stroke::with_style(
            vec![
                Point::new(1.0, 2.0),
                Point::new(f64::NAN, 0.0),
                Point::new(0.0, f64::INFINITY),
                Point::new(3.0, 4.0),
            ],
            InkStyle {
                width: f64::NAN,
                ..InkStyle::default()
            },
        );

        assert_eq!(stroke.points(), &[Point::new(1.0, 2.0), Point::new(3.0, 4.0)]);
        assert_eq!(stroke.style().width, InkStyle::default().width);

        for width in [0.0, -1.0, f64::NEG_INFINITY] {
            let stroke = Stroke::with_style(Vec::new(), InkStyle { width, ..InkStyle::default() });
            assert_eq!(stroke.style().width, InkStyle::default().width);
        }
    }

    #[test]
    fn test_color_conversion() {
        let ink = InkColor::new(10, 20, 30, 255);
        let color: Color = ink.into();
        assert_eq!(InkColor::from(color), ink);
    }

    #[test]
    fn test_path_has_segment_per_point() {
        let stroke = Stroke::from_points(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
        ]);
        assert_eq!(stroke.to_path().elements().len(), 3);
    }
}
