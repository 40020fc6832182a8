//! Base-ten blocks with regrouping.
//!
//! Panels stack top to bottom: the minuend, the crossed-out subtrahend and,
//! when regroup steps are given, the blocks after regrouping with one curved
//! arrow per step that actually moved a block.

use std::collections::BTreeMap;

use super::params::Params;
use super::scene::{quantities, Scene, DIMMED, HUNDRED, INK, MARGIN, MUTED, ONE, TEN};
use super::{Anchor, Quantity, RenderResult, Style};
use crate::error::ParameterError;
use crate::registry::BASE_TEN_REGROUPING;

const PANEL_PAD: f64 = 12.0;
const PANEL_GAP: f64 = 16.0;
const TITLE_H: f64 = 28.0;
const COLUMN_GAP: f64 = 30.0;
const MIN_BLOCK_AREA: f64 = 10.0;
const ARROW_LIFT: f64 = 16.0;
const ARROW_SPACING: f64 = 22.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Place {
    Hundreds,
    Tens,
    Ones,
}

impl Place {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "hundreds" => Some(Self::Hundreds),
            "tens" => Some(Self::Tens),
            "ones" => Some(Self::Ones),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Hundreds => 0,
            Self::Tens => 1,
            Self::Ones => 2,
        }
    }
}

/// Block counts per place value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blocks([i64; 3]);

impl Blocks {
    pub fn decompose(n: i64) -> Self {
        Self([n / 100, (n % 100) / 10, n % 10])
    }

    pub fn hundreds(&self) -> i64 {
        self.0[0]
    }

    pub fn tens(&self) -> i64 {
        self.0[1]
    }

    pub fn ones(&self) -> i64 {
        self.0[2]
    }

    /// Trade one block of `step.from` for ten of `step.to`. No-op when the
    /// source place is empty; returns whether anything moved.
    pub fn apply(&mut self, step: RegroupStep) -> bool {
        let (from, to) = (step.from.index(), step.to.index());
        if self.0[from] == 0 {
            return false;
        }
        self.0[from] -= 1;
        self.0[to] += 10;
        true
    }

    fn quantity(&self) -> Quantity {
        Quantity::Counts(self.0.to_vec())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegroupStep {
    pub from: Place,
    pub to: Place,
}

impl RegroupStep {
    fn label(&self) -> &'static str {
        match self.from {
            Place::Hundreds => "1 hundred → 10 tens",
            _ => "1 ten → 10 ones",
        }
    }
}

fn parse_steps(params: &Params<'_>) -> Result<Vec<RegroupStep>, ParameterError> {
    let mut steps = vec![];
    for (i, obj) in params.objects("regroup_steps")?.into_iter().enumerate() {
        let place = |key: &str| obj.get(key).and_then(|v| v.as_str()).and_then(Place::parse);
        let step = match (place("from"), place("to")) {
            (Some(Place::Hundreds), Some(Place::Tens)) => RegroupStep {
                from: Place::Hundreds,
                to: Place::Tens,
            },
            (Some(Place::Tens), Some(Place::Ones)) => RegroupStep {
                from: Place::Tens,
                to: Place::Ones,
            },
            _ => {
                return Err(params.invalid(format!(
                    "regroup step {i} must be hundreds->tens or tens->ones"
                )))
            }
        };
        steps.push(step);
    }
    Ok(steps)
}

/// One place-value column: block size and wrapping.
struct Column {
    tag: &'static str,
    per_row: i64,
    w: f64,
    h: f64,
    gap: f64,
    fill: &'static str,
}

const COLUMNS: [Column; 3] = [
    Column { tag: "hundred", per_row: 3, w: 40.0, h: 40.0, gap: 6.0, fill: HUNDRED },
    Column { tag: "ten", per_row: 10, w: 10.0, h: 60.0, gap: 4.0, fill: TEN },
    Column { tag: "one", per_row: 10, w: 10.0, h: 10.0, gap: 4.0, fill: ONE },
];

impl Column {
    fn width(&self) -> f64 {
        self.per_row as f64 * self.w + (self.per_row - 1) as f64 * self.gap
    }

    fn height(&self, n: i64) -> f64 {
        if n <= 0 {
            return 0.0;
        }
        let rows = (n + self.per_row - 1) / self.per_row;
        rows as f64 * self.h + (rows - 1) as f64 * self.gap
    }
}

fn column_x(i: usize) -> f64 {
    MARGIN + PANEL_PAD + COLUMNS[..i].iter().map(|c| c.width() + COLUMN_GAP).sum::<f64>()
}

fn panel_width() -> f64 {
    2.0 * PANEL_PAD + COLUMNS.iter().map(Column::width).sum::<f64>() + 2.0 * COLUMN_GAP
}

fn blocks_height(blocks: &Blocks) -> f64 {
    COLUMNS
        .iter()
        .zip(blocks.0)
        .map(|(c, n)| c.height(n))
        .fold(MIN_BLOCK_AREA, f64::max)
}

fn arrow_band(arrows: usize) -> f64 {
    if arrows == 0 {
        0.0
    } else {
        28.0 + ARROW_SPACING / 2.0 * arrows as f64
    }
}

/// Draw one framed panel starting at `top`; returns its height.
fn draw_panel(scene: &mut Scene, group: &str, title: &str, blocks: &Blocks, top: f64, band: f64, crossed: bool) -> f64 {
    let height = TITLE_H + band + blocks_height(blocks) + PANEL_PAD;
    scene.clear_group();
    scene.rect("panel", MARGIN, top, panel_width(), height, Style::stroked(MUTED, 1.0));
    scene.text_styled("panel_title", MARGIN + PANEL_PAD, top + 19.0, title, 13.0, Anchor::Start, INK, true);

    scene.set_group(group);
    let blocks_top = top + TITLE_H + band;
    for (i, (col, n)) in COLUMNS.iter().zip(blocks.0).enumerate() {
        let x0 = column_x(i);
        for k in 0..n {
            let x = x0 + (k % col.per_row) as f64 * (col.w + col.gap);
            let y = blocks_top + (k / col.per_row) as f64 * (col.h + col.gap);
            if crossed {
                scene.rect(col.tag, x, y, col.w, col.h, Style::filled(DIMMED, MUTED));
                scene.line("cross_out", x, y, x + col.w, y + col.h, Style::stroked(MUTED, 1.0));
            } else {
                scene.rect(col.tag, x, y, col.w, col.h, Style::filled(col.fill, INK));
            }
        }
    }
    scene.clear_group();
    height
}

pub fn render(params: &Params<'_>) -> Result<RenderResult, ParameterError> {
    let minuend = params.int("minuend")?;
    let subtrahend = params.int("subtrahend")?;
    if subtrahend > minuend {
        return Err(params.invalid(format!(
            "subtrahend {subtrahend} is larger than minuend {minuend}"
        )));
    }
    let steps = parse_steps(params)?;

    let top_blocks = Blocks::decompose(minuend);
    let sub_blocks = Blocks::decompose(subtrahend);

    let mut after = top_blocks;
    let applied: Vec<RegroupStep> = steps.iter().copied().filter(|s| after.apply(*s)).collect();

    let mut scene = Scene::new(panel_width() + 2.0 * MARGIN, 0.0);
    let mut y = MARGIN;
    y += draw_panel(&mut scene, "minuend", &format!("Start with {minuend}"), &top_blocks, y, 0.0, false) + PANEL_GAP;
    y += draw_panel(&mut scene, "subtrahend", &format!("Take away {subtrahend}"), &sub_blocks, y, 0.0, true);

    if !steps.is_empty() {
        y += PANEL_GAP;
        let band = arrow_band(applied.len());
        let height = draw_panel(&mut scene, "after", "After regrouping", &after, y, band, false);

        scene.set_group("after");
        let base_y = y + TITLE_H + band - 4.0;
        let center = |p: Place| column_x(p.index()) + COLUMNS[p.index()].width() / 2.0;
        for (i, step) in applied.iter().enumerate() {
            let lift = ARROW_LIFT + ARROW_SPACING * i as f64;
            let (x1, x2) = (center(step.from), center(step.to));
            scene.arrow(x1, base_y, x2, base_y, lift, Style::stroked(INK, 1.5));
            let apex = base_y - lift / 2.0;
            scene.text("arrow_label", (x1 + x2) / 2.0, apex - 3.0, step.label(), 10.0, Anchor::Middle);
        }
        scene.clear_group();
        y += height;
    }
    let width = scene.width();
    scene.resize(width, y + MARGIN);

    let rendered_blocks = |scene: &Scene, group: &str| {
        Quantity::Counts(COLUMNS.iter().map(|c| scene.count(Some(group), c.tag)).collect())
    };

    let mut expected: BTreeMap<String, Quantity> = quantities([
        ("minuend_blocks", top_blocks.quantity()),
        ("subtrahend_blocks", sub_blocks.quantity()),
    ]);
    let mut rendered = quantities([
        ("minuend_blocks", rendered_blocks(&scene, "minuend")),
        ("subtrahend_blocks", rendered_blocks(&scene, "subtrahend")),
    ]);
    if !steps.is_empty() {
        expected.insert("after_blocks".into(), after.quantity());
        expected.insert("regroups_applied".into(), Quantity::Count(applied.len() as i64));
        rendered.insert("after_blocks".into(), rendered_blocks(&scene, "after"));
        rendered.insert("regroups_applied".into(), Quantity::Count(scene.count(Some("after"), "arrow")));
    }

    Ok(scene.finish(BASE_TEN_REGROUPING, expected, rendered))
}
