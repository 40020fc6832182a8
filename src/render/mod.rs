//! Renderers - pure functions from a `VisualSpec` to a drawing plus its own
//! correctness certificate.
//!
//! Every renderer draws into a [`Scene`], a structured primitive list that both
//! the SVG serializer and the PDF exporter consume. Alongside the drawing it
//! publishes two quantity maps: `expected`, derived only from the input
//! parameters, and `rendered`, counted from what was actually drawn. The
//! self-check compares them without ever parsing graphics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ParameterError;
use crate::models::VisualSpec;
use crate::registry::{
    ModelRegistry, ARRAYS, BASE_TEN_REGROUPING, FRACTION_SHAPES, FRACTION_STRIPS, NUMBER_LINE,
};

pub mod arrays;
pub mod base_ten;
pub mod fraction_shapes;
pub mod fraction_strips;
pub mod number_line;
pub mod params;
pub mod scene;
pub mod svg;

pub use params::Params;
pub use scene::Scene;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default)]
    pub stroke_width: f64,
    #[serde(default)]
    pub dashed: bool,
}

impl Style {
    pub fn filled(fill: &str, stroke: &str) -> Self {
        Self {
            fill: Some(fill.to_string()),
            stroke: Some(stroke.to_string()),
            stroke_width: 1.0,
            dashed: false,
        }
    }

    pub fn fill_only(fill: &str) -> Self {
        Self {
            fill: Some(fill.to_string()),
            stroke: None,
            stroke_width: 0.0,
            dashed: false,
        }
    }

    pub fn stroked(stroke: &str, width: f64) -> Self {
        Self {
            fill: None,
            stroke: Some(stroke.to_string()),
            stroke_width: width,
            dashed: false,
        }
    }

    pub fn dashed(mut self) -> Self {
        self.dashed = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    Start,
    Middle,
    End,
}

/// One drawing instruction in renderer coordinates (origin top-left, y down).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Primitive {
    Rect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        #[serde(default)]
        rx: f64,
        style: Style,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        style: Style,
    },
    Circle {
        cx: f64,
        cy: f64,
        r: f64,
        style: Style,
    },
    /// Pie wedge; angles in degrees clockwise from 12 o'clock.
    Sector {
        cx: f64,
        cy: f64,
        r: f64,
        start_deg: f64,
        end_deg: f64,
        style: Style,
    },
    /// Quadratic curve from (x1, y1) through control (cx, cy) with a head at (x2, y2).
    Arrow {
        x1: f64,
        y1: f64,
        cx: f64,
        cy: f64,
        x2: f64,
        y2: f64,
        style: Style,
    },
    Text {
        x: f64,
        y: f64,
        text: String,
        size: f64,
        anchor: Anchor,
        fill: String,
        #[serde(default)]
        bold: bool,
    },
}

/// Point on a circle; `deg` clockwise from 12 o'clock, y grows downward.
pub fn polar_to_cartesian(cx: f64, cy: f64, r: f64, deg: f64) -> (f64, f64) {
    let rad = deg.to_radians();
    (cx + r * rad.sin(), cy - r * rad.cos())
}

pub const ARROW_HEAD_LEN: f64 = 7.0;

/// The two barb end points of an arrow head arriving at (x2, y2) from (cx, cy).
pub fn arrow_head(cx: f64, cy: f64, x2: f64, y2: f64) -> [(f64, f64); 2] {
    let angle = (y2 - cy).atan2(x2 - cx);
    let spread = 0.45;
    [
        (
            x2 - ARROW_HEAD_LEN * (angle - spread).cos(),
            y2 - ARROW_HEAD_LEN * (angle - spread).sin(),
        ),
        (
            x2 - ARROW_HEAD_LEN * (angle + spread).cos(),
            y2 - ARROW_HEAD_LEN * (angle + spread).sin(),
        ),
    ]
}

/// Axis-aligned box around one primitive or text label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(rename = "type")]
    pub kind: String,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BoundingBox {
    pub fn new(kind: &str, x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            kind: kind.to_string(),
            x,
            y,
            w,
            h,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// True when the shared area is wider and taller than `epsilon`.
    pub fn intersects(&self, other: &BoundingBox, epsilon: f64) -> bool {
        let overlap_w = self.right().min(other.right()) - self.x.max(other.x);
        let overlap_h = self.bottom().min(other.bottom()) - self.y.max(other.y);
        overlap_w > epsilon && overlap_h > epsilon
    }
}

/// A semantic quantity: a single count, per-part counts, or a value sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Count(i64),
    Counts(Vec<i64>),
    Values(Vec<f64>),
}

impl Quantity {
    pub fn as_values(&self) -> Vec<f64> {
        match self {
            Self::Count(n) => vec![*n as f64],
            Self::Counts(v) => v.iter().map(|n| *n as f64).collect(),
            Self::Values(v) => v.clone(),
        }
    }

    /// Numeric equality within `tolerance`, regardless of representation.
    pub fn matches(&self, other: &Quantity, tolerance: f64) -> bool {
        let (a, b) = (self.as_values(), other.as_values());
        let scalar = |q: &Quantity| matches!(q, Quantity::Count(_));
        scalar(self) == scalar(other)
            && a.len() == b.len()
            && a.iter().zip(&b).all(|(x, y)| (x - y).abs() <= tolerance)
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n}"),
            other => {
                let parts: Vec<String> = other.as_values().iter().map(|v| scene::fmt_num(*v)).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderMetadata {
    pub model_id: String,
    pub expected: BTreeMap<String, Quantity>,
    pub rendered: BTreeMap<String, Quantity>,
    pub bounding_boxes: Vec<BoundingBox>,
    pub label_boxes: Vec<BoundingBox>,
}

/// Output of one renderer call.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderResult {
    pub svg: String,
    pub width: f64,
    pub height: f64,
    pub metadata: RenderMetadata,
    pub primitives: Vec<Primitive>,
}

/// The `.meta.json` sidecar: everything but the SVG text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderArtifact {
    pub width: f64,
    pub height: f64,
    pub metadata: RenderMetadata,
    pub primitives: Vec<Primitive>,
}

impl RenderResult {
    pub fn artifact(&self) -> RenderArtifact {
        RenderArtifact {
            width: self.width,
            height: self.height,
            metadata: self.metadata.clone(),
            primitives: self.primitives.clone(),
        }
    }
}

/// Render one spec. Pure: no I/O, no shared state.
pub fn render(spec: &VisualSpec, registry: &ModelRegistry) -> Result<RenderResult, ParameterError> {
    registry.check_spec(spec)?;
    let params = Params::new(&spec.model_id, &spec.params);

    match spec.model_id.as_str() {
        BASE_TEN_REGROUPING => base_ten::render(&params),
        NUMBER_LINE => number_line::render(&params),
        ARRAYS => arrays::render(&params),
        FRACTION_STRIPS => fraction_strips::render(&params),
        FRACTION_SHAPES => fraction_shapes::render(&params),
        other => Err(ParameterError::invalid(other, "model is registered but has no renderer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_boxes_do_not_intersect() {
        let a = BoundingBox::new("segment", 0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new("segment", 10.0, 0.0, 10.0, 10.0);
        let c = BoundingBox::new("segment", 9.0, 2.0, 10.0, 10.0);
        assert!(!a.intersects(&b, 0.5));
        assert!(a.intersects(&c, 0.5));
        assert!(!a.intersects(&c, 1.5));
    }

    #[test]
    fn quantities_compare_numerically() {
        assert!(Quantity::Counts(vec![1, 2]).matches(&Quantity::Values(vec![1.0, 2.0]), 1e-9));
        assert!(!Quantity::Count(2).matches(&Quantity::Counts(vec![2]), 1e-9));
        assert!(!Quantity::Values(vec![1.0]).matches(&Quantity::Values(vec![1.0, 2.0]), 1e-9));
    }

    #[test]
    fn quantity_json_round_trips_by_shape() {
        let q: Quantity = serde_json::from_str("[5, 0, 2]").unwrap();
        assert_eq!(q, Quantity::Counts(vec![5, 0, 2]));
        let q: Quantity = serde_json::from_str("[2.5, 3.0]").unwrap();
        assert_eq!(q, Quantity::Values(vec![2.5, 3.0]));
        let q: Quantity = serde_json::from_str("20").unwrap();
        assert_eq!(q, Quantity::Count(20));
    }

    #[test]
    fn polar_zero_degrees_points_up() {
        let (x, y) = polar_to_cartesian(50.0, 50.0, 10.0, 0.0);
        assert!((x - 50.0).abs() < 1e-9 && (y - 40.0).abs() < 1e-9);
        let (x, y) = polar_to_cartesian(50.0, 50.0, 10.0, 90.0);
        assert!((x - 60.0).abs() < 1e-9 && (y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_is_rejected_before_drawing() {
        let registry = ModelRegistry::builtin();
        let spec = VisualSpec::new("TALLY_CHART", serde_json::json!({}));
        assert!(matches!(render(&spec, &registry), Err(ParameterError::UnknownModel(_))));
    }
}
