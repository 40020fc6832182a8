//! Number line in three flavours, picked from the parameters present:
//! `denominator` selects fraction mode, `jumps` selects jump mode, anything
//! else is a rounding line over an integer range.

use super::params::Params;
use super::scene::{fmt_num, quantities, text_width, Scene, ACCENT, HIGHLIGHT, INK, SHADE};
use super::{Anchor, Quantity, RenderResult, Style};
use crate::error::ParameterError;
use crate::registry::NUMBER_LINE;

const WIDTH: f64 = 600.0;
const HEIGHT: f64 = 170.0;
const LEFT: f64 = 40.0;
const RIGHT: f64 = 560.0;
const LINE_Y: f64 = 120.0;
const TICK_HALF: f64 = 8.0;
const LABEL_SIZE: f64 = 11.0;
const LABEL_DROP: f64 = 26.0;
const POINT_R: f64 = 6.0;
const JUMP_LIFT: f64 = 30.0;

const MAX_TICKS: usize = 200;
const MAX_FRACTION_TICKS: i64 = 49;
const MAX_JUMP_TICKS: usize = 40;
const NICE_STEPS: [f64; 12] = [1.0, 2.0, 5.0, 10.0, 20.0, 25.0, 50.0, 100.0, 200.0, 250.0, 500.0, 1000.0];
const AUTO_TICKS: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Rounding,
    Fraction,
    Jump,
}

impl Mode {
    pub fn detect(params: &Params<'_>) -> Self {
        if params.has("denominator") {
            Self::Fraction
        } else if params.has("jumps") {
            Self::Jump
        } else {
            Self::Rounding
        }
    }
}

/// Round to six decimals so expected and measured values compare exactly.
fn snap(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}

struct Axis {
    min: f64,
    max: f64,
    line_y: f64,
}

impl Axis {
    fn x(&self, v: f64) -> f64 {
        LEFT + (v - self.min) / (self.max - self.min) * (RIGHT - LEFT)
    }

    fn value(&self, x: f64) -> f64 {
        self.min + (x - LEFT) / (RIGHT - LEFT) * (self.max - self.min)
    }

    fn contains(&self, v: f64) -> bool {
        v >= self.min - 1e-9 && v <= self.max + 1e-9
    }

    /// Values of every `tag` primitive, read back from its drawn x position.
    fn measured(&self, scene: &Scene, tag: &str) -> Quantity {
        Quantity::Values(scene.centers(tag).into_iter().map(|(x, _)| snap(self.value(x))).collect())
    }
}

enum TickLabels {
    /// Every k-th tick, k chosen so labels never collide.
    Thinned,
    Endpoints,
}

fn range(params: &Params<'_>, default: Option<(i64, i64)>) -> Result<(f64, f64), ParameterError> {
    let (min, max) = match default {
        Some((lo, hi)) => (params.int_or("min", lo)?, params.int_or("max", hi)?),
        None => (params.int("min")?, params.int("max")?),
    };
    if max <= min {
        return Err(params.invalid(format!("max {max} must be greater than min {min}")));
    }
    Ok((min as f64, max as f64))
}

fn nice_step(span: f64) -> f64 {
    NICE_STEPS
        .iter()
        .copied()
        .find(|s| span / s <= AUTO_TICKS)
        .unwrap_or(NICE_STEPS[NICE_STEPS.len() - 1])
}

fn tick_values(params: &Params<'_>, min: f64, max: f64, step: f64, limit: usize) -> Result<Vec<f64>, ParameterError> {
    if step <= 0.0 {
        return Err(params.invalid("tick step must be positive"));
    }
    let n = ((max - min) / step + 1e-9).floor() as usize;
    if n + 1 > limit {
        return Err(params.invalid(format!("{} ticks exceed the limit of {limit}", n + 1)));
    }
    Ok((0..=n).map(|k| min + k as f64 * step).collect())
}

fn draw_axis(scene: &mut Scene, axis: &Axis, ticks: &[f64], labels: TickLabels) {
    let y = axis.line_y;
    scene.line("axis", LEFT, y, RIGHT, y, Style::stroked(INK, 2.0));
    for t in ticks {
        let x = axis.x(*t);
        scene.line("tick", x, y - TICK_HALF, x, y + TICK_HALF, Style::stroked(INK, 1.0));
    }

    let labelled: Vec<f64> = match labels {
        TickLabels::Endpoints => vec![axis.min, axis.max],
        TickLabels::Thinned => {
            let widest = ticks
                .iter()
                .map(|t| text_width(&fmt_num(*t), LABEL_SIZE))
                .fold(0.0, f64::max);
            let spacing = match ticks {
                [a, b, ..] => axis.x(*b) - axis.x(*a),
                _ => RIGHT - LEFT,
            };
            let every = ((widest + 4.0) / spacing).ceil().max(1.0) as usize;
            ticks.iter().step_by(every).copied().collect()
        }
    };
    for v in labelled {
        scene.text("tick_label", axis.x(v), y + LABEL_DROP, &fmt_num(v), LABEL_SIZE, Anchor::Middle);
    }
}

fn render_rounding(params: &Params<'_>) -> Result<RenderResult, ParameterError> {
    let (min, max) = range(params, None)?;
    let step = params.opt_num("tick_step")?.unwrap_or_else(|| nice_step(max - min));
    let ticks = tick_values(params, min, max, step, MAX_TICKS)?;
    let axis = Axis { min, max, line_y: LINE_Y };

    let highlight = params.opt_num("highlight")?;
    let target = params.opt_num("target")?;
    for (name, value) in [("highlight", highlight), ("target", target)] {
        if let Some(v) = value.filter(|v| !axis.contains(*v)) {
            return Err(params.invalid(format!("{name} {} outside [{min}, {max}]", fmt_num(v))));
        }
    }

    let mut scene = Scene::new(WIDTH, HEIGHT);
    draw_axis(&mut scene, &axis, &ticks, TickLabels::Thinned);
    if let Some(t) = target {
        let x = axis.x(t);
        scene.rect("target", x - 6.0, LINE_Y - 34.0, 12.0, 12.0, Style::filled(HIGHLIGHT, ACCENT));
    }
    if let Some(h) = highlight {
        scene.circle("point", axis.x(h), LINE_Y, POINT_R, Style::filled(ACCENT, INK));
    }

    let expected = quantities([
        ("tick_count", Quantity::Count(ticks.len() as i64)),
        ("points", Quantity::Values(highlight.into_iter().map(snap).collect())),
        ("targets", Quantity::Values(target.into_iter().map(snap).collect())),
    ]);
    let rendered = quantities([
        ("tick_count", Quantity::Count(scene.count(None, "tick"))),
        ("points", axis.measured(&scene, "point")),
        ("targets", axis.measured(&scene, "target")),
    ]);
    Ok(scene.finish(NUMBER_LINE, expected, rendered))
}

fn render_fraction(params: &Params<'_>) -> Result<RenderResult, ParameterError> {
    let (min, max) = range(params, Some((0, 1)))?;
    let d = params.int("denominator")?;
    let segments = (max - min) as i64 * d;
    if segments + 1 > MAX_FRACTION_TICKS {
        return Err(params.invalid(format!(
            "{} ticks exceed the limit of {MAX_FRACTION_TICKS}",
            segments + 1
        )));
    }
    let ticks: Vec<f64> = (0..=segments).map(|k| min + k as f64 / d as f64).collect();
    let axis = Axis { min, max, line_y: LINE_Y };

    let point = match params.object("point")? {
        None => None,
        Some(obj) => {
            let part = |key: &str| obj.get(key).and_then(|v| v.as_i64());
            let (num, den) = match (part("num"), part("den")) {
                (Some(n), Some(d)) if d > 0 => (n, d),
                _ => return Err(params.invalid("point needs integer 'num' and positive 'den'")),
            };
            let value = num as f64 / den as f64;
            if !axis.contains(value) {
                return Err(params.invalid(format!("point {num}/{den} outside [{min}, {max}]")));
            }
            Some((num, den, value))
        }
    };

    let mut scene = Scene::new(WIDTH, HEIGHT);
    draw_axis(&mut scene, &axis, &ticks, TickLabels::Endpoints);
    if let Some((num, den, value)) = point {
        let x = axis.x(value);
        scene.circle("point", x, LINE_Y, POINT_R, Style::filled(SHADE, INK));
        scene.text("point_label", x, LINE_Y - 16.0, &format!("{num}/{den}"), 13.0, Anchor::Middle);
    }

    let expected = quantities([
        ("tick_count", Quantity::Count(segments + 1)),
        ("labeled_ticks", Quantity::Count(2)),
        ("points", Quantity::Values(point.into_iter().map(|p| snap(p.2)).collect())),
    ]);
    let rendered = quantities([
        ("tick_count", Quantity::Count(scene.count(None, "tick"))),
        ("labeled_ticks", Quantity::Count(scene.count_labels("tick_label"))),
        ("points", axis.measured(&scene, "point")),
    ]);
    Ok(scene.finish(NUMBER_LINE, expected, rendered))
}

/// Marker radius and stacking level for each landing so markers never overlap.
fn landing_layout(xs: &[f64]) -> (f64, Vec<usize>) {
    let mut min_gap = f64::INFINITY;
    for (i, a) in xs.iter().enumerate() {
        for b in &xs[i + 1..] {
            let gap = (a - b).abs();
            if gap > 1e-6 {
                min_gap = min_gap.min(gap);
            }
        }
    }
    let r = (min_gap / 2.0 - 0.5).clamp(2.0, POINT_R);

    let mut placed: Vec<(f64, usize)> = Vec::with_capacity(xs.len());
    for &x in xs {
        let mut level = 0;
        while placed.iter().any(|(px, l)| *l == level && (px - x).abs() < 2.0 * r + 1.0) {
            level += 1;
        }
        placed.push((x, level));
    }
    (r, placed.into_iter().map(|(_, l)| l).collect())
}

fn jump_label(j: f64) -> String {
    if j > 0.0 {
        format!("+{}", fmt_num(j))
    } else {
        format!("−{}", fmt_num(-j))
    }
}

fn render_jump(params: &Params<'_>) -> Result<RenderResult, ParameterError> {
    let (min, max) = range(params, None)?;
    let jumps = params.num_list("jumps")?;
    if jumps.is_empty() || jumps.iter().any(|j| *j == 0.0) {
        return Err(params.invalid("jumps must be a non-empty list of non-zero values"));
    }
    let start = params.opt_num("start")?.unwrap_or(max);
    let probe = Axis { min, max, line_y: LINE_Y };
    if !probe.contains(start) {
        return Err(params.invalid(format!("start {} outside [{min}, {max}]", fmt_num(start))));
    }

    let mut landings = Vec::with_capacity(jumps.len());
    let mut at = start;
    for j in &jumps {
        at += j;
        if !probe.contains(at) {
            return Err(params.invalid(format!("jump {} lands at {} outside [{min}, {max}]", fmt_num(*j), fmt_num(at))));
        }
        landings.push(at);
    }

    let step = match params.opt_num("tick_step")? {
        Some(s) => s,
        None => {
            let mut s = jumps.iter().map(|j| j.abs()).fold(f64::INFINITY, f64::min);
            while (max - min) / s + 1.0 > MAX_JUMP_TICKS as f64 {
                s *= 2.0;
            }
            s
        }
    };
    let ticks = tick_values(params, min, max, step, MAX_TICKS)?;

    let xs: Vec<f64> = landings.iter().map(|v| probe.x(*v)).collect();
    let (r, levels) = landing_layout(&xs);
    let lift_px = 2.0 * r + 2.0;
    let extra = levels.iter().copied().max().unwrap_or(0) as f64 * lift_px;
    let axis = Axis { min, max, line_y: LINE_Y + extra };

    let mut scene = Scene::new(WIDTH, HEIGHT + extra);
    draw_axis(&mut scene, &axis, &ticks, TickLabels::Thinned);
    let y = axis.line_y;
    scene.circle("start", axis.x(start), y, 4.0, Style::fill_only(INK));

    let mut from = start;
    for (j, to) in jumps.iter().zip(&landings) {
        let (x1, x2) = (axis.x(from), axis.x(*to));
        scene.arrow(x1, y - 4.0, x2, y - 4.0, JUMP_LIFT, Style::stroked(ACCENT, 1.5));
        let apex = y - 4.0 - JUMP_LIFT / 2.0;
        scene.text("jump_label", (x1 + x2) / 2.0, apex - 3.0, &jump_label(*j), 11.0, Anchor::Middle);
        from = *to;
    }
    for (x, level) in xs.iter().zip(&levels) {
        scene.circle("landing", *x, y - *level as f64 * lift_px, r, Style::filled(SHADE, INK));
    }

    let expected = quantities([
        ("tick_count", Quantity::Count(ticks.len() as i64)),
        ("jump_count", Quantity::Count(jumps.len() as i64)),
        ("points", Quantity::Values(landings.iter().map(|v| snap(*v)).collect())),
    ]);
    let rendered = quantities([
        ("tick_count", Quantity::Count(scene.count(None, "tick"))),
        ("jump_count", Quantity::Count(scene.count(None, "arrow"))),
        ("points", axis.measured(&scene, "landing")),
    ]);
    Ok(scene.finish(NUMBER_LINE, expected, rendered))
}

pub fn render(params: &Params<'_>) -> Result<RenderResult, ParameterError> {
    match Mode::detect(params) {
        Mode::Rounding => render_rounding(params),
        Mode::Fraction => render_fraction(params),
        Mode::Jump => render_jump(params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VisualSpec;
    use crate::registry::ModelRegistry;
    use crate::render;
    use serde_json::json;

    fn draw(params: serde_json::Value) -> Result<RenderResult, ParameterError> {
        render::render(&VisualSpec::new(NUMBER_LINE, params), &ModelRegistry::builtin())
    }

    #[test]
    fn rounding_line_places_highlight_and_target() {
        let result = draw(json!({"min": 300, "max": 400, "highlight": 347, "target": 350})).unwrap();
        let meta = &result.metadata;
        assert_eq!(meta.expected["tick_count"], Quantity::Count(21));
        assert_eq!(meta.expected["points"], Quantity::Values(vec![347.0]));
        assert_eq!(meta.expected, meta.rendered);
    }

    #[test]
    fn fraction_line_labels_only_endpoints() {
        let result = draw(json!({"denominator": 4, "point": {"num": 3, "den": 4}})).unwrap();
        let meta = &result.metadata;
        assert_eq!(meta.expected["tick_count"], Quantity::Count(5));
        assert_eq!(meta.rendered["labeled_ticks"], Quantity::Count(2));
        assert_eq!(meta.expected["points"], Quantity::Values(vec![0.75]));
        assert_eq!(meta.expected, meta.rendered);
        assert!(result.svg.contains(">3/4</text>"));
    }

    #[test]
    fn jumps_start_from_the_right_end() {
        let result = draw(json!({"min": 0, "max": 20, "jumps": [-5, -5, 3]})).unwrap();
        let meta = &result.metadata;
        assert_eq!(meta.expected["points"], Quantity::Values(vec![15.0, 10.0, 13.0]));
        assert_eq!(meta.expected["jump_count"], Quantity::Count(3));
        assert_eq!(meta.expected, meta.rendered);
        assert!(result.svg.contains(">−5</text>"));
    }

    #[test]
    fn repeated_landings_stack_without_overlap() {
        let result = draw(json!({"min": 0, "max": 10, "jumps": [-2, 2, -2, 2]})).unwrap();
        let landings: Vec<_> = result.metadata.bounding_boxes.iter().filter(|b| b.kind == "landing").collect();
        assert_eq!(landings.len(), 4);
        for (i, a) in landings.iter().enumerate() {
            for b in &landings[i + 1..] {
                assert!(!a.intersects(b, 0.5));
            }
        }
        assert_eq!(result.metadata.expected, result.metadata.rendered);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(
            draw(json!({"min": 0, "max": 10, "highlight": 12})),
            Err(ParameterError::Invalid { .. })
        ));
        assert!(matches!(
            draw(json!({"min": 0, "max": 10, "jumps": [-6, -6]})),
            Err(ParameterError::Invalid { .. })
        ));
        assert!(matches!(
            draw(json!({"min": 5, "max": 5})),
            Err(ParameterError::Invalid { .. })
        ));
        assert!(matches!(draw(json!({"highlight": 3})), Err(ParameterError::Missing { .. })));
    }
}
