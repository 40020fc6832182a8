//! Fraction shapes: circles cut into sectors, rectangles and squares cut into
//! equal-width columns.

use super::fraction_strips::{check_numerators, expected_parts, measured_parts};
use super::params::Params;
use super::scene::{quantities, Scene, INK, MARGIN, PAPER, SHADE};
use super::{Anchor, RenderResult, Style};
use crate::error::ParameterError;

const PER_ROW: i64 = 3;
const SHAPE_GAP: f64 = 24.0;
const LABEL_H: f64 = 26.0;
const CIRCLE_R: f64 = 55.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Circle,
    Rectangle,
    Square,
}

impl Shape {
    fn size(self) -> (f64, f64) {
        match self {
            Self::Circle => (2.0 * CIRCLE_R, 2.0 * CIRCLE_R),
            Self::Rectangle => (140.0, 70.0),
            Self::Square => (100.0, 100.0),
        }
    }
}

fn draw_circle(scene: &mut Scene, x: f64, y: f64, d: i64, shaded: i64) {
    let (cx, cy) = (x + CIRCLE_R, y + CIRCLE_R);
    if d == 1 {
        let fill = if shaded > 0 { SHADE } else { PAPER };
        scene.circle("sector", cx, cy, CIRCLE_R, Style::filled(fill, INK));
    } else {
        let sweep = 360.0 / d as f64;
        for k in 0..d {
            let fill = if k < shaded { SHADE } else { PAPER };
            let start = k as f64 * sweep;
            scene.sector("sector", cx, cy, CIRCLE_R, start, start + sweep, Style::filled(fill, INK));
        }
    }
    scene.circle("shape_border", cx, cy, CIRCLE_R, Style::stroked(INK, 2.0));
}

fn draw_columns(scene: &mut Scene, x: f64, y: f64, w: f64, h: f64, d: i64, shaded: i64) {
    let seg_w = w / d as f64;
    for k in 0..d {
        let fill = if k < shaded { SHADE } else { PAPER };
        scene.rect("segment", x + k as f64 * seg_w, y, seg_w, h, Style::filled(fill, INK));
    }
    scene.rect("shape_border", x, y, w, h, Style::stroked(INK, 2.0));
}

pub fn render(params: &Params<'_>) -> Result<RenderResult, ParameterError> {
    let shape = match params.str_or("shape", "circle")? {
        "circle" => Shape::Circle,
        "rectangle" => Shape::Rectangle,
        "square" => Shape::Square,
        other => return Err(params.invalid(format!("unsupported shape '{other}'"))),
    };
    let count = params.int("shape_count")?;
    let d = params.int("denominator")?;
    let numerators = check_numerators(params, count, d)?;
    let show_labels = params.flag("show_labels", true)?;

    let (w, h) = shape.size();
    let label_h = if show_labels { LABEL_H } else { 0.0 };
    let cols = count.min(PER_ROW);
    let rows = (count + PER_ROW - 1) / PER_ROW;
    let cell_h = h + label_h;
    let mut scene = Scene::new(
        2.0 * MARGIN + cols as f64 * (w + SHAPE_GAP) - SHAPE_GAP,
        2.0 * MARGIN + rows as f64 * (cell_h + SHAPE_GAP) - SHAPE_GAP,
    );

    for (i, n) in numerators.iter().enumerate() {
        let x = MARGIN + (i as i64 % PER_ROW) as f64 * (w + SHAPE_GAP);
        let y = MARGIN + (i as i64 / PER_ROW) as f64 * (cell_h + SHAPE_GAP);
        scene.set_group(format!("shape{i}"));
        match shape {
            Shape::Circle => draw_circle(&mut scene, x, y, d, *n),
            Shape::Rectangle | Shape::Square => draw_columns(&mut scene, x, y, w, h, d, *n),
        }
        scene.clear_group();
        if show_labels {
            scene.text("fraction_label", x + w / 2.0, y + h + 19.0, &format!("{n}/{d}"), 14.0, Anchor::Middle);
        }
    }

    let tag = if shape == Shape::Circle { "sector" } else { "segment" };
    let rendered = quantities(measured_parts(&scene, tag, "shape", count));
    let expected = quantities(expected_parts(&numerators, count, d));
    Ok(scene.finish(params.model(), expected, rendered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VisualSpec;
    use crate::registry::{ModelRegistry, FRACTION_SHAPES};
    use crate::render::{self, Primitive, Quantity};
    use serde_json::json;

    fn draw(params: serde_json::Value) -> Result<RenderResult, ParameterError> {
        render::render(&VisualSpec::new(FRACTION_SHAPES, params), &ModelRegistry::builtin())
    }

    #[test]
    fn circles_are_cut_into_sectors() {
        let result = draw(json!({"shape_count": 4, "denominator": 6, "numerators": [1, 2, 6, 0]})).unwrap();
        let meta = &result.metadata;
        assert_eq!(meta.expected["shaded_parts"], Quantity::Count(9));
        assert_eq!(meta.rendered["total_parts"], Quantity::Count(24));
        assert_eq!(meta.expected, meta.rendered);
        let sectors = result.primitives.iter().filter(|p| matches!(p, Primitive::Sector { .. })).count();
        assert_eq!(sectors, 24);
    }

    #[test]
    fn whole_circle_uses_one_primitive() {
        let result = draw(json!({"shape_count": 1, "denominator": 1, "numerators": [1]})).unwrap();
        assert_eq!(result.metadata.rendered["total_parts"], Quantity::Count(1));
        assert_eq!(result.metadata.expected, result.metadata.rendered);
    }

    #[test]
    fn rectangles_use_column_segments() {
        let result = draw(json!({"shape": "rectangle", "shape_count": 2, "denominator": 5, "numerators": [2, 5]})).unwrap();
        let meta = &result.metadata;
        assert_eq!(meta.rendered["shaded_per_whole"], Quantity::Counts(vec![2, 5]));
        assert_eq!(meta.expected, meta.rendered);
    }

    #[test]
    fn negative_numerator_is_rejected() {
        assert!(matches!(
            draw(json!({"shape": "square", "shape_count": 1, "denominator": 3, "numerators": [-1]})),
            Err(ParameterError::NumeratorOutOfRange { .. })
        ));
    }
}
