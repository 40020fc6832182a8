//! Arrays (rows x cols grid) and equal groups.

use std::collections::BTreeSet;

use super::params::Params;
use super::scene::{quantities, text_width, Scene, HIGHLIGHT, INK, MARGIN, MUTED, SHADE};
use super::{Anchor, Quantity, RenderResult, Style};
use crate::error::ParameterError;
use crate::registry::ARRAYS;

const CELL: f64 = 36.0;
const ITEM_R: f64 = 12.0;
const LABEL_PAD: f64 = 24.0;
const EQUATION_H: f64 = 32.0;
const EQUATION_SIZE: f64 = 14.0;

const GROUP_CELL: f64 = 28.0;
const GROUP_ITEM_R: f64 = 10.0;
const GROUP_PAD: f64 = 8.0;
const GROUP_GAP: f64 = 16.0;
const ITEMS_PER_LINE: i64 = 6;

fn distinct(values: impl Iterator<Item = f64>) -> i64 {
    values.map(|v| (v * 100.0).round() as i64).collect::<BTreeSet<_>>().len() as i64
}

fn render_array(params: &Params<'_>) -> Result<RenderResult, ParameterError> {
    let rows = params.int("rows")?;
    let cols = params.int("cols")?;
    let show_labels = params.flag("show_labels", false)?;
    let show_equation = params.flag("show_equation", false)?;
    let highlight_row = params.opt_int("highlight_row")?;
    let highlight_col = params.opt_int("highlight_col")?;
    if let Some(r) = highlight_row.filter(|r| *r > rows) {
        return Err(params.invalid(format!("highlight_row {r} exceeds rows {rows}")));
    }
    if let Some(c) = highlight_col.filter(|c| *c > cols) {
        return Err(params.invalid(format!("highlight_col {c} exceeds cols {cols}")));
    }

    let pad = if show_labels { LABEL_PAD } else { 0.0 };
    let (left, top) = (MARGIN + pad, MARGIN + pad);
    let (grid_w, grid_h) = (cols as f64 * CELL, rows as f64 * CELL);
    let equation = format!("{rows} × {cols} = {}", rows * cols);
    let (eq_w, eq_h) = if show_equation {
        (text_width(&equation, EQUATION_SIZE), EQUATION_H)
    } else {
        (0.0, 0.0)
    };
    let width = (left + grid_w).max(MARGIN + eq_w) + MARGIN;
    let mut scene = Scene::new(width, top + grid_h + eq_h + MARGIN);

    if let Some(r) = highlight_row {
        scene.rect("row_highlight", left, top + (r - 1) as f64 * CELL, grid_w, CELL, Style::fill_only(HIGHLIGHT));
    }
    if let Some(c) = highlight_col {
        scene.rect("col_highlight", left + (c - 1) as f64 * CELL, top, CELL, grid_h, Style::fill_only(HIGHLIGHT));
    }

    for r in 0..rows {
        for c in 0..cols {
            let cx = left + c as f64 * CELL + CELL / 2.0;
            let cy = top + r as f64 * CELL + CELL / 2.0;
            scene.circle("item", cx, cy, ITEM_R, Style::filled(SHADE, INK));
        }
    }

    if show_labels {
        for r in 0..rows {
            let y = top + r as f64 * CELL + CELL / 2.0 + 4.0;
            scene.text("index_label", left - 8.0, y, &(r + 1).to_string(), 11.0, Anchor::End);
        }
        for c in 0..cols {
            let x = left + c as f64 * CELL + CELL / 2.0;
            scene.text("index_label", x, top - 8.0, &(c + 1).to_string(), 11.0, Anchor::Middle);
        }
    }
    if show_equation {
        scene.text("equation", MARGIN, top + grid_h + 24.0, &equation, EQUATION_SIZE, Anchor::Start);
    }

    let centers = scene.centers("item");
    let expected = quantities([
        ("total_items", Quantity::Count(rows * cols)),
        ("rows", Quantity::Count(rows)),
        ("cols", Quantity::Count(cols)),
    ]);
    let rendered = quantities([
        ("total_items", Quantity::Count(scene.count(None, "item"))),
        ("rows", Quantity::Count(distinct(centers.iter().map(|c| c.1)))),
        ("cols", Quantity::Count(distinct(centers.iter().map(|c| c.0)))),
    ]);
    Ok(scene.finish(ARRAYS, expected, rendered))
}

fn render_groups(params: &Params<'_>) -> Result<RenderResult, ParameterError> {
    let groups = params.int("groups")?;
    let per_group = params.int("items_per_group")?;
    let show_borders = params.flag("show_borders", true)?;
    let show_equation = params.flag("show_equation", false)?;
    let per_row = match params.str_or("layout", "rows")? {
        "grid" => params.int_or("groups_per_row", (groups as f64).sqrt().ceil() as i64)?,
        _ => 1,
    };

    let lines = (per_group + ITEMS_PER_LINE - 1) / ITEMS_PER_LINE;
    let box_w = per_group.min(ITEMS_PER_LINE) as f64 * GROUP_CELL + 2.0 * GROUP_PAD;
    let box_h = lines as f64 * GROUP_CELL + 2.0 * GROUP_PAD;
    let grid_cols = per_row.min(groups);
    let grid_rows = (groups + per_row - 1) / per_row;
    let content_w = grid_cols as f64 * (box_w + GROUP_GAP) - GROUP_GAP;
    let content_h = grid_rows as f64 * (box_h + GROUP_GAP) - GROUP_GAP;
    let equation = format!("{groups} × {per_group} = {}", groups * per_group);
    let (eq_w, eq_h) = if show_equation {
        (text_width(&equation, EQUATION_SIZE), EQUATION_H)
    } else {
        (0.0, 0.0)
    };
    let mut scene = Scene::new(content_w.max(eq_w) + 2.0 * MARGIN, content_h + eq_h + 2.0 * MARGIN);

    for g in 0..groups {
        let x0 = MARGIN + (g % per_row) as f64 * (box_w + GROUP_GAP);
        let y0 = MARGIN + (g / per_row) as f64 * (box_h + GROUP_GAP);
        scene.set_group(format!("group{}", g + 1));
        if show_borders {
            scene.rounded_rect("group_border", x0, y0, box_w, box_h, 6.0, Style::stroked(MUTED, 1.5).dashed());
        }
        for k in 0..per_group {
            let cx = x0 + GROUP_PAD + (k % ITEMS_PER_LINE) as f64 * GROUP_CELL + GROUP_CELL / 2.0;
            let cy = y0 + GROUP_PAD + (k / ITEMS_PER_LINE) as f64 * GROUP_CELL + GROUP_CELL / 2.0;
            scene.circle("item", cx, cy, GROUP_ITEM_R, Style::filled(SHADE, INK));
        }
    }
    scene.clear_group();

    if show_equation {
        scene.text("equation", MARGIN, MARGIN + content_h + 24.0, &equation, EQUATION_SIZE, Anchor::Start);
    }

    let drawn_groups = scene.groups_with("item");
    let sizes: Vec<i64> = drawn_groups.iter().map(|g| scene.count(Some(g.as_str()), "item")).collect();
    let expected = quantities([
        ("total_items", Quantity::Count(groups * per_group)),
        ("groups", Quantity::Count(groups)),
        ("group_sizes", Quantity::Counts(vec![per_group; groups as usize])),
    ]);
    let rendered = quantities([
        ("total_items", Quantity::Count(scene.count(None, "item"))),
        ("groups", Quantity::Count(drawn_groups.len() as i64)),
        ("group_sizes", Quantity::Counts(sizes)),
    ]);
    Ok(scene.finish(ARRAYS, expected, rendered))
}

pub fn render(params: &Params<'_>) -> Result<RenderResult, ParameterError> {
    if params.has("groups") || params.has("items_per_group") {
        render_groups(params)
    } else {
        render_array(params)
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
        render::render(&VisualSpec::new(ARRAYS, params), &ModelRegistry::builtin())
    }

    #[test]
    fn four_by_five_items_do_not_overlap() {
        let result = draw(json!({"rows": 4, "cols": 5, "show_labels": true, "show_equation": true})).unwrap();
        let items: Vec<_> = result.metadata.bounding_boxes.iter().filter(|b| b.kind == "item").collect();
        assert_eq!(items.len(), 20);
        for (i, a) in items.iter().enumerate() {
            for b in &items[i + 1..] {
                assert!(!a.intersects(b, 0.5));
            }
        }
        assert_eq!(result.metadata.expected, result.metadata.rendered);
        assert!(result.svg.contains("4 × 5 = 20"));
    }

    #[test]
    fn highlight_bands_sit_under_items() {
        let result = draw(json!({"rows": 3, "cols": 3, "highlight_row": 2, "highlight_col": 3})).unwrap();
        let kinds: Vec<&str> = result.metadata.bounding_boxes.iter().map(|b| b.kind.as_str()).collect();
        assert_eq!(&kinds[..2], &["row_highlight", "col_highlight"]);
        assert!(matches!(
            draw(json!({"rows": 3, "cols": 3, "highlight_row": 4})),
            Err(ParameterError::Invalid { .. })
        ));
    }

    #[test]
    fn equal_groups_in_a_grid() {
        let result = draw(json!({"groups": 5, "items_per_group": 7, "layout": "grid"})).unwrap();
        let meta = &result.metadata;
        assert_eq!(meta.expected["total_items"], Quantity::Count(35));
        assert_eq!(meta.rendered["group_sizes"], Quantity::Counts(vec![7; 5]));
        assert_eq!(meta.expected, meta.rendered);
        let borders = meta.bounding_boxes.iter().filter(|b| b.kind == "group_border").count();
        assert_eq!(borders, 5);
    }

    #[test]
    fn groups_need_both_counts() {
        assert!(matches!(draw(json!({"groups": 3})), Err(ParameterError::Missing { .. })));
    }
}
