//! Fraction strips: one bar per whole, split into equal segments.

use super::params::Params;
use super::scene::{quantities, Scene, INK, MARGIN, PAPER, SHADE};
use super::{Anchor, Quantity, RenderResult, Style};
use crate::error::ParameterError;

const BAR_W: f64 = 420.0;
const BAR_H: f64 = 40.0;
const BAR_GAP: f64 = 16.0;
const LABEL_W: f64 = 56.0;

/// Shared numerator checks for strips and shapes; runs before any drawing.
pub(crate) fn check_numerators(
    params: &Params<'_>,
    count: i64,
    denominator: i64,
) -> Result<Vec<i64>, ParameterError> {
    let numerators = params.int_list("numerators")?;
    if numerators.len() as i64 != count {
        return Err(ParameterError::LengthMismatch {
            model: params.model().to_string(),
            param: "numerators".to_string(),
            expected: count as usize,
            actual: numerators.len(),
        });
    }
    if let Some((index, &numerator)) = numerators.iter().enumerate().find(|(_, n)| **n < 0 || **n > denominator) {
        return Err(ParameterError::NumeratorOutOfRange {
            model: params.model().to_string(),
            index,
            numerator,
            denominator,
        });
    }
    Ok(numerators)
}

/// `shaded_parts`, `total_parts` and `shaded_per_whole`, measured from `tag`
/// primitives grouped by `prefix{i}`.
pub(crate) fn measured_parts(scene: &Scene, tag: &str, prefix: &str, count: i64) -> [(&'static str, Quantity); 3] {
    let per_whole: Vec<i64> = (0..count)
        .map(|i| scene.count_filled(Some(format!("{prefix}{i}").as_str()), tag, SHADE))
        .collect();
    [
        ("shaded_parts", Quantity::Count(scene.count_filled(None, tag, SHADE))),
        ("total_parts", Quantity::Count(scene.count(None, tag))),
        ("shaded_per_whole", Quantity::Counts(per_whole)),
    ]
}

pub(crate) fn expected_parts(numerators: &[i64], count: i64, denominator: i64) -> [(&'static str, Quantity); 3] {
    [
        ("shaded_parts", Quantity::Count(numerators.iter().sum())),
        ("total_parts", Quantity::Count(count * denominator)),
        ("shaded_per_whole", Quantity::Counts(numerators.to_vec())),
    ]
}

pub fn render(params: &Params<'_>) -> Result<RenderResult, ParameterError> {
    let wholes = params.int("whole_count")?;
    let d = params.int("denominator")?;
    let numerators = check_numerators(params, wholes, d)?;
    let show_labels = params.flag("show_labels", true)?;

    let label_w = if show_labels { LABEL_W } else { 0.0 };
    let height = 2.0 * MARGIN + wholes as f64 * (BAR_H + BAR_GAP) - BAR_GAP;
    let mut scene = Scene::new(2.0 * MARGIN + BAR_W + label_w, height);

    let seg_w = BAR_W / d as f64;
    for (i, n) in numerators.iter().enumerate() {
        let y = MARGIN + i as f64 * (BAR_H + BAR_GAP);
        scene.set_group(format!("whole{i}"));
        for k in 0..d {
            let fill = if k < *n { SHADE } else { PAPER };
            scene.rect("segment", MARGIN + k as f64 * seg_w, y, seg_w, BAR_H, Style::filled(fill, INK));
        }
        scene.clear_group();
        if show_labels {
            let x = MARGIN + BAR_W + label_w / 2.0;
            scene.text("fraction_label", x, y + BAR_H / 2.0 + 5.0, &format!("{n}/{d}"), 14.0, Anchor::Middle);
        }
    }

    let rendered = quantities(measured_parts(&scene, "segment", "whole", wholes));
    let expected = quantities(expected_parts(&numerators, wholes, d));
    Ok(scene.finish(params.model(), expected, rendered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VisualSpec;
    use crate::registry::{ModelRegistry, FRACTION_STRIPS};
    use crate::render;
    use serde_json::json;

    fn draw(params: serde_json::Value) -> Result<super::RenderResult, ParameterError> {
        render::render(&VisualSpec::new(FRACTION_STRIPS, params), &ModelRegistry::builtin())
    }

    #[test]
    fn shades_numerator_segments_per_bar() {
        let result = draw(json!({"whole_count": 2, "denominator": 4, "numerators": [3, 2]})).unwrap();
        let meta = &result.metadata;
        assert_eq!(meta.expected["shaded_parts"], Quantity::Count(5));
        assert_eq!(meta.rendered["total_parts"], Quantity::Count(8));
        assert_eq!(meta.rendered["shaded_per_whole"], Quantity::Counts(vec![3, 2]));
        assert_eq!(meta.expected, meta.rendered);
        assert!(result.svg.contains(">3/4</text>"));
    }

    #[test]
    fn numerator_above_denominator_fails_before_drawing() {
        let err = draw(json!({"whole_count": 2, "denominator": 4, "numerators": [5, 2]})).unwrap_err();
        assert_eq!(
            err,
            ParameterError::NumeratorOutOfRange {
                model: FRACTION_STRIPS.to_string(),
                index: 0,
                numerator: 5,
                denominator: 4,
            }
        );
    }

    #[test]
    fn numerator_count_must_match_wholes() {
        assert!(matches!(
            draw(json!({"whole_count": 3, "denominator": 4, "numerators": [1, 2]})),
            Err(ParameterError::LengthMismatch { expected: 3, actual: 2, .. })
        ));
    }
}
