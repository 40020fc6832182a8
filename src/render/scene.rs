//! Scene - primitive list with bounding-box bookkeeping
//!
//! Every draw call records the primitive, a typed bounding box and the group
//! it was drawn in, so renderers can count what they actually emitted.

use std::collections::BTreeMap;

use super::{
    svg, Anchor, BoundingBox, Primitive, Quantity, RenderMetadata, RenderResult, Style,
};

pub const INK: &str = "#1f2937";
pub const MUTED: &str = "#9ca3af";
pub const PAPER: &str = "#ffffff";
pub const SHADE: &str = "#60a5fa";
pub const ACCENT: &str = "#f97316";
pub const HIGHLIGHT: &str = "#fef3c7";
pub const HUNDRED: &str = "#fbbf24";
pub const TEN: &str = "#34d399";
pub const ONE: &str = "#60a5fa";
pub const DIMMED: &str = "#e5e7eb";

pub const MARGIN: f64 = 20.0;

/// Average glyph advance as a fraction of the font size.
const GLYPH_ADVANCE: f64 = 0.6;

/// Format a coordinate or value: integers bare, otherwise at most two decimals.
pub fn fmt_num(v: f64) -> String {
    if (v - v.round()).abs() < 1e-9 {
        format!("{}", v.round() as i64)
    } else {
        let s = format!("{:.2}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

pub fn text_width(text: &str, size: f64) -> f64 {
    text.chars().count() as f64 * size * GLYPH_ADVANCE
}

#[derive(Debug, Clone)]
struct Drawn {
    bbox: BoundingBox,
    group: Option<String>,
    fill: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Scene {
    width: f64,
    height: f64,
    primitives: Vec<Primitive>,
    drawn: Vec<Drawn>,
    labels: Vec<BoundingBox>,
    group: Option<String>,
}

impl Scene {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            primitives: vec![],
            drawn: vec![],
            labels: vec![],
            group: None,
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    /// Subsequent primitives are counted under `group`.
    pub fn set_group(&mut self, group: impl Into<String>) {
        self.group = Some(group.into());
    }

    pub fn clear_group(&mut self) {
        self.group = None;
    }

    fn record(&mut self, primitive: Primitive, bbox: BoundingBox, fill: Option<String>) {
        self.primitives.push(primitive);
        self.drawn.push(Drawn {
            bbox,
            group: self.group.clone(),
            fill,
        });
    }

    pub fn rect(&mut self, tag: &str, x: f64, y: f64, w: f64, h: f64, style: Style) {
        let fill = style.fill.clone();
        self.record(
            Primitive::Rect { x, y, w, h, rx: 0.0, style },
            BoundingBox::new(tag, x, y, w, h),
            fill,
        );
    }

    pub fn rounded_rect(&mut self, tag: &str, x: f64, y: f64, w: f64, h: f64, rx: f64, style: Style) {
        let fill = style.fill.clone();
        self.record(
            Primitive::Rect { x, y, w, h, rx, style },
            BoundingBox::new(tag, x, y, w, h),
            fill,
        );
    }

    pub fn line(&mut self, tag: &str, x1: f64, y1: f64, x2: f64, y2: f64, style: Style) {
        let bbox = BoundingBox::new(tag, x1.min(x2), y1.min(y2), (x2 - x1).abs(), (y2 - y1).abs());
        self.record(Primitive::Line { x1, y1, x2, y2, style }, bbox, None);
    }

    pub fn circle(&mut self, tag: &str, cx: f64, cy: f64, r: f64, style: Style) {
        let fill = style.fill.clone();
        self.record(
            Primitive::Circle { cx, cy, r, style },
            BoundingBox::new(tag, cx - r, cy - r, 2.0 * r, 2.0 * r),
            fill,
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn sector(&mut self, tag: &str, cx: f64, cy: f64, r: f64, start_deg: f64, end_deg: f64, style: Style) {
        let fill = style.fill.clone();
        self.record(
            Primitive::Sector { cx, cy, r, start_deg, end_deg, style },
            BoundingBox::new(tag, cx - r, cy - r, 2.0 * r, 2.0 * r),
            fill,
        );
    }

    /// Curved arrow bulging `lift` pixels above the higher end point.
    pub fn arrow(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, lift: f64, style: Style) {
        let cx = (x1 + x2) / 2.0;
        let cy = y1.min(y2) - lift;
        let apex = y1.min(y2) - lift / 2.0;
        let bbox = BoundingBox::new("arrow", x1.min(x2), apex, (x2 - x1).abs(), y1.max(y2) - apex);
        self.record(Primitive::Arrow { x1, y1, cx, cy, x2, y2, style }, bbox, None);
    }

    /// Text label with an estimated box; `y` is the baseline.
    pub fn text(&mut self, tag: &str, x: f64, y: f64, text: &str, size: f64, anchor: Anchor) {
        self.text_styled(tag, x, y, text, size, anchor, INK, false);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn text_styled(
        &mut self,
        tag: &str,
        x: f64,
        y: f64,
        text: &str,
        size: f64,
        anchor: Anchor,
        fill: &str,
        bold: bool,
    ) {
        let w = text_width(text, size);
        let left = match anchor {
            Anchor::Start => x,
            Anchor::Middle => x - w / 2.0,
            Anchor::End => x - w,
        };
        self.labels.push(BoundingBox::new(tag, left, y - 0.8 * size, w, size));
        self.primitives.push(Primitive::Text {
            x,
            y,
            text: text.to_string(),
            size,
            anchor,
            fill: fill.to_string(),
            bold,
        });
    }

    fn in_group(d: &Drawn, group: Option<&str>) -> bool {
        group.map_or(true, |g| d.group.as_deref() == Some(g))
    }

    /// Primitives of type `tag`, optionally restricted to one group.
    pub fn count(&self, group: Option<&str>, tag: &str) -> i64 {
        self.drawn
            .iter()
            .filter(|d| d.bbox.kind == tag && Self::in_group(d, group))
            .count() as i64
    }

    /// Primitives of type `tag` filled with `fill`.
    pub fn count_filled(&self, group: Option<&str>, tag: &str, fill: &str) -> i64 {
        self.drawn
            .iter()
            .filter(|d| d.bbox.kind == tag && Self::in_group(d, group) && d.fill.as_deref() == Some(fill))
            .count() as i64
    }

    pub fn count_labels(&self, tag: &str) -> i64 {
        self.labels.iter().filter(|l| l.kind == tag).count() as i64
    }

    /// Box centers of every primitive of type `tag`, in drawing order.
    pub fn centers(&self, tag: &str) -> Vec<(f64, f64)> {
        self.drawn
            .iter()
            .filter(|d| d.bbox.kind == tag)
            .map(|d| d.bbox.center())
            .collect()
    }

    /// Distinct groups containing at least one `tag` primitive, in first-drawn order.
    pub fn groups_with(&self, tag: &str) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        for d in self.drawn.iter().filter(|d| d.bbox.kind == tag) {
            if let Some(g) = &d.group {
                if !groups.contains(g) {
                    groups.push(g.clone());
                }
            }
        }
        groups
    }

    /// Serialize and attach the quantity maps.
    pub fn finish(
        self,
        model_id: &str,
        expected: BTreeMap<String, Quantity>,
        rendered: BTreeMap<String, Quantity>,
    ) -> RenderResult {
        let svg = svg::to_svg(self.width, self.height, &self.primitives);
        RenderResult {
            svg,
            width: self.width,
            height: self.height,
            metadata: RenderMetadata {
                model_id: model_id.to_string(),
                expected,
                rendered,
                bounding_boxes: self.drawn.into_iter().map(|d| d.bbox).collect(),
                label_boxes: self.labels,
            },
            primitives: self.primitives,
        }
    }
}

/// Shorthand for building quantity maps.
pub fn quantities<const N: usize>(entries: [(&str, Quantity); N]) -> BTreeMap<String, Quantity> {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_num_trims() {
        assert_eq!(fmt_num(3.0), "3");
        assert_eq!(fmt_num(-2.0), "-2");
        assert_eq!(fmt_num(0.5), "0.5");
        assert_eq!(fmt_num(1.0 / 3.0), "0.33");
    }

    #[test]
    fn counts_respect_groups_and_fill() {
        let mut scene = Scene::new(100.0, 100.0);
        scene.set_group("whole0");
        scene.rect("segment", 0.0, 0.0, 10.0, 10.0, Style::filled(SHADE, INK));
        scene.rect("segment", 10.0, 0.0, 10.0, 10.0, Style::filled(PAPER, INK));
        scene.set_group("whole1");
        scene.rect("segment", 0.0, 20.0, 10.0, 10.0, Style::filled(SHADE, INK));
        scene.clear_group();
        scene.text("title", 50.0, 90.0, "1/2", 10.0, Anchor::Middle);

        assert_eq!(scene.count(None, "segment"), 3);
        assert_eq!(scene.count(Some("whole0"), "segment"), 2);
        assert_eq!(scene.count_filled(Some("whole0"), "segment", SHADE), 1);
        assert_eq!(scene.count_filled(None, "segment", SHADE), 2);
        assert_eq!(scene.count_labels("title"), 1);
        assert_eq!(scene.groups_with("segment"), vec!["whole0", "whole1"]);

        let result = scene.finish("TEST", BTreeMap::new(), BTreeMap::new());
        assert_eq!(result.metadata.bounding_boxes.len(), 3);
        let label = &result.metadata.label_boxes[0];
        assert!((label.x - (50.0 - 9.0)).abs() < 1e-9);
        assert!((label.y - 82.0).abs() < 1e-9);
    }
}
