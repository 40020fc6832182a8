//! Document Exporter - worksheet PDF from validated output plus rendered artifacts
//!
//! Graphics are redrawn from the structured primitive list stored in each
//! `.meta.json` sidecar, so the PDF and the SVG come from the same
//! instructions. Layout is a single column flowing top to bottom; a question
//! moves to a fresh page when its estimated height does not fit.

use std::path::{Path, PathBuf};

use pdf_writer::{Content, Name, Pdf, Rect, Ref, Str};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, WorksheetError};
use crate::manifest::{load_artifact, write_atomic, RenderManifest};
use crate::models::{OutputQuestion, WorksheetOutput, WorksheetPlan};
use crate::page::PageSpec;
use crate::render::{arrow_head, polar_to_cartesian, Anchor, Primitive, RenderArtifact, Style};

const LINE_FACTOR: f32 = 1.4;
/// Average Helvetica advance as a fraction of the font size.
const AVG_ADVANCE: f32 = 0.52;
const TITLE_SIZE: f32 = 18.0;
const HEADING_SIZE: f32 = 15.0;
const OPTION_INDENT: f32 = 18.0;
const GRAPHIC_GAP: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static [u8] {
        match self {
            Self::Regular => b"F1",
            Self::Bold => b"F2",
        }
    }
}

/// Encode for the standard 14 fonts under WinAnsiEncoding.
fn to_winansi(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            ' '..='~' => out.push(ch as u8),
            '×' => out.push(0xD7),
            '÷' => out.push(0xF7),
            '−' | '–' | '—' => out.push(b'-'),
            '→' => out.extend_from_slice(b"->"),
            '\u{A0}'..='\u{FF}' => out.push(ch as u32 as u8),
            _ => out.push(b'?'),
        }
    }
    out
}

/// Glyphs actually shown once `text` is encoded.
fn glyph_count(text: &str) -> usize {
    to_winansi(text).len()
}

fn text_width(text: &str, size: f32) -> f32 {
    glyph_count(text) as f32 * size * AVG_ADVANCE
}

/// Greedy word wrap by estimated width. Words longer than a line stand alone.
fn wrap(text: &str, max_width: f32, size: f32) -> Vec<String> {
    let max_chars = ((max_width / (size * AVG_ADVANCE)) as usize).max(1);
    let mut lines = vec![];
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let needed = glyph_count(&line) + glyph_count(word) + usize::from(!line.is_empty());
            if !line.is_empty() && needed > max_chars {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        lines.push(line);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// `#rrggbb` to PDF RGB components.
fn parse_color(hex: &str) -> Option<(f32, f32, f32)> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok().map(|v| v as f32 / 255.0);
    Some((channel(0)?, channel(2)?, channel(4)?))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Maps renderer coordinates (y down) onto the page (y up).
#[derive(Debug, Clone, Copy)]
struct Placement {
    left: f32,
    top: f32,
    scale: f32,
}

impl Placement {
    fn pt(&self, x: f64, y: f64) -> (f32, f32) {
        (self.left + x as f32 * self.scale, self.top - y as f32 * self.scale)
    }

    fn len(&self, v: f64) -> f32 {
        v as f32 * self.scale
    }
}

/// Set colors, width and dash for `style`; returns (fill, stroke) presence.
fn apply_style(content: &mut Content, style: &Style, place: &Placement) -> (bool, bool) {
    let fill = style.fill.as_deref().and_then(parse_color);
    let stroke = style.stroke.as_deref().and_then(parse_color);
    if let Some((r, g, b)) = fill {
        content.set_fill_rgb(r, g, b);
    }
    if let Some((r, g, b)) = stroke {
        content.set_stroke_rgb(r, g, b);
        content.set_line_width(place.len(style.stroke_width).max(0.25));
        if style.dashed {
            content.set_dash_pattern([4.0 * place.scale, 3.0 * place.scale], 0.0);
        }
    }
    (fill.is_some(), stroke.is_some() && style.stroke_width > 0.0)
}

fn paint(content: &mut Content, fill: bool, stroke: bool) {
    match (fill, stroke) {
        (true, true) => content.fill_nonzero_and_stroke(),
        (true, false) => content.fill_nonzero(),
        (false, true) => content.stroke(),
        (false, false) => content.end_path(),
    };
}

/// Append cubic segments approximating a clockwise arc, angles in degrees
/// from 12 o'clock. Assumes the current point is already at the arc start.
fn arc_to(content: &mut Content, place: &Placement, cx: f64, cy: f64, r: f64, start_deg: f64, end_deg: f64) {
    let sweep = end_deg - start_deg;
    let segments = (sweep.abs() / 90.0).ceil().max(1.0) as usize;
    let step = sweep / segments as f64;
    for i in 0..segments {
        let a0 = (start_deg + i as f64 * step).to_radians();
        let a1 = (start_deg + (i + 1) as f64 * step).to_radians();
        let k = 4.0 / 3.0 * ((a1 - a0) / 4.0).tan() * r;
        let (x0, y0) = (cx + r * a0.sin(), cy - r * a0.cos());
        let (x3, y3) = (cx + r * a1.sin(), cy - r * a1.cos());
        let c1 = place.pt(x0 + k * a0.cos(), y0 + k * a0.sin());
        let c2 = place.pt(x3 - k * a1.cos(), y3 - k * a1.sin());
        let end = place.pt(x3, y3);
        content.cubic_to(c1.0, c1.1, c2.0, c2.1, end.0, end.1);
    }
}

fn draw_primitive(content: &mut Content, primitive: &Primitive, place: &Placement) {
    content.save_state();
    match primitive {
        // Corner radii are dropped; print output keeps square corners.
        Primitive::Rect { x, y, w, h, style, .. } => {
            let (fill, stroke) = apply_style(content, style, place);
            let (px, py) = place.pt(*x, y + h);
            content.rect(px, py, place.len(*w), place.len(*h));
            paint(content, fill, stroke);
        }
        Primitive::Line { x1, y1, x2, y2, style } => {
            let (_, stroke) = apply_style(content, style, place);
            let (a, b) = (place.pt(*x1, *y1), place.pt(*x2, *y2));
            content.move_to(a.0, a.1);
            content.line_to(b.0, b.1);
            paint(content, false, stroke);
        }
        Primitive::Circle { cx, cy, r, style } => {
            let (fill, stroke) = apply_style(content, style, place);
            let start = place.pt(*cx, cy - r);
            content.move_to(start.0, start.1);
            arc_to(content, place, *cx, *cy, *r, 0.0, 360.0);
            content.close_path();
            paint(content, fill, stroke);
        }
        Primitive::Sector { cx, cy, r, start_deg, end_deg, style } => {
            let (fill, stroke) = apply_style(content, style, place);
            let center = place.pt(*cx, *cy);
            let (sx, sy) = polar_to_cartesian(*cx, *cy, *r, *start_deg);
            let start = place.pt(sx, sy);
            content.move_to(center.0, center.1);
            content.line_to(start.0, start.1);
            arc_to(content, place, *cx, *cy, *r, *start_deg, *end_deg);
            content.close_path();
            paint(content, fill, stroke);
        }
        Primitive::Arrow { x1, y1, cx, cy, x2, y2, style } => {
            let line = Style { fill: None, ..style.clone() };
            let (_, stroke) = apply_style(content, &line, place);
            // Quadratic control point raised to cubic form.
            let q1 = (x1 + 2.0 / 3.0 * (cx - x1), y1 + 2.0 / 3.0 * (cy - y1));
            let q2 = (x2 + 2.0 / 3.0 * (cx - x2), y2 + 2.0 / 3.0 * (cy - y2));
            let (a, c1, c2, b) = (place.pt(*x1, *y1), place.pt(q1.0, q1.1), place.pt(q2.0, q2.1), place.pt(*x2, *y2));
            content.move_to(a.0, a.1);
            content.cubic_to(c1.0, c1.1, c2.0, c2.1, b.0, b.1);
            let [h1, h2] = arrow_head(*cx, *cy, *x2, *y2);
            let (h1, h2) = (place.pt(h1.0, h1.1), place.pt(h2.0, h2.1));
            content.move_to(h1.0, h1.1);
            content.line_to(b.0, b.1);
            content.line_to(h2.0, h2.1);
            paint(content, false, stroke);
        }
        Primitive::Text { x, y, text, size, anchor, fill, bold } => {
            let size = place.len(*size);
            let (px, py) = place.pt(*x, *y);
            let px = match anchor {
                Anchor::Start => px,
                Anchor::Middle => px - text_width(text, size) / 2.0,
                Anchor::End => px - text_width(text, size),
            };
            if let Some((r, g, b)) = parse_color(fill) {
                content.set_fill_rgb(r, g, b);
            }
            let font = if *bold { Font::Bold } else { Font::Regular };
            content
                .begin_text()
                .set_font(Name(font.resource()), size)
                .next_line(px, py)
                .show(Str(&to_winansi(text)))
                .end_text();
        }
    }
    content.restore_state();
}

/// Vertical space taken by a graphic of `height`, gaps included.
fn graphic_extent(height: f32) -> f32 {
    GRAPHIC_GAP / 2.0 + height + GRAPHIC_GAP
}

/// Flowing page layout: a cursor moving down the current page.
struct Layout<'a> {
    page: &'a PageSpec,
    done: Vec<Content>,
    current: Content,
    y: f32,
}

impl<'a> Layout<'a> {
    fn new(page: &'a PageSpec) -> Self {
        Self {
            page,
            done: vec![],
            current: Content::new(),
            y: page.height() - page.margin,
        }
    }

    fn top(&self) -> f32 {
        self.page.height() - self.page.margin
    }

    fn remaining(&self) -> f32 {
        self.y - self.page.margin
    }

    fn new_page(&mut self) {
        let finished = std::mem::replace(&mut self.current, Content::new());
        self.done.push(finished);
        self.y = self.top();
    }

    /// Break the page unless `height` fits. A fresh page never breaks again,
    /// so oversized blocks overflow instead of looping.
    fn ensure(&mut self, height: f32) {
        if height > self.remaining() && self.y < self.top() {
            self.new_page();
        }
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    fn line(&mut self, text: &str, size: f32, font: Font, indent: f32) {
        let baseline = self.y - size;
        self.current.set_fill_rgb(0.0, 0.0, 0.0);
        self.current
            .begin_text()
            .set_font(Name(font.resource()), size)
            .next_line(self.page.margin + indent, baseline)
            .show(Str(&to_winansi(text)))
            .end_text();
        self.y -= size * LINE_FACTOR;
    }

    fn graphic(&mut self, artifact: &RenderArtifact, height: f32, scale: f32) {
        let place = Placement {
            left: self.page.margin,
            top: self.y - GRAPHIC_GAP / 2.0,
            scale,
        };
        for primitive in &artifact.primitives {
            draw_primitive(&mut self.current, primitive, &place);
        }
        self.y -= graphic_extent(height);
    }

    /// Close the last page and stamp `Page i of n` footers.
    fn finish(mut self) -> Vec<Content> {
        let last = std::mem::replace(&mut self.current, Content::new());
        self.done.push(last);
        let total = self.done.len();
        let size = self.page.font_size - 2.0;
        let y = self.page.margin / 2.0;
        for (i, content) in self.done.iter_mut().enumerate() {
            let footer = format!("Page {} of {}", i + 1, total);
            let x = (self.page.width() - text_width(&footer, size)) / 2.0;
            content.set_fill_rgb(0.4, 0.4, 0.4);
            content
                .begin_text()
                .set_font(Name(Font::Regular.resource()), size)
                .next_line(x, y)
                .show(Str(&to_winansi(&footer)))
                .end_text();
        }
        self.done
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub pages: usize,
    pub questions: usize,
    pub answer_key: bool,
}

pub struct DocumentExporter {
    page: PageSpec,
}

impl DocumentExporter {
    pub fn new(page: PageSpec) -> Self {
        Self { page }
    }

    /// Questions in plan order when a plan is given, otherwise output order.
    fn ordered<'o>(output: &'o WorksheetOutput, plan: Option<&WorksheetPlan>) -> Vec<&'o OutputQuestion> {
        match plan {
            Some(plan) => plan.questions.iter().filter_map(|e| output.question(&e.q_id)).collect(),
            None => output.questions.iter().collect(),
        }
    }

    /// Scale factor and scaled height that fit `artifact` on the page.
    fn fit(&self, artifact: &RenderArtifact) -> (f32, f32) {
        let (w, h) = (artifact.width as f32, artifact.height as f32);
        if w <= 0.0 || h <= 0.0 {
            return (1.0, 0.0);
        }
        let scale = (self.page.content_width() / w).min(self.page.max_graphic_height / h).min(1.0);
        (scale, h * scale)
    }

    fn question_block(&self, layout: &mut Layout<'_>, number: usize, question: &OutputQuestion, graphic: Option<&RenderArtifact>) {
        let size = self.page.font_size;
        let line_h = size * LINE_FACTOR;
        let text = wrap(
            &format!("{number}. {}", question.question_text),
            self.page.content_width(),
            size,
        );
        let options: Vec<Vec<String>> = question
            .options
            .iter()
            .zip(["A", "B", "C", "D", "E", "F"])
            .map(|(option, letter)| {
                wrap(&format!("{letter}) {option}"), self.page.content_width() - OPTION_INDENT, size)
            })
            .collect();
        let option_lines: usize = options.iter().map(Vec::len).sum();
        let fitted = graphic.map(|a| (a, self.fit(a)));
        let graphic_h = fitted.map(|(_, (_, h))| graphic_extent(h)).unwrap_or(0.0);

        let estimate = (text.len() + option_lines) as f32 * line_h + graphic_h + line_h;
        layout.ensure(estimate);

        for line in &text {
            layout.line(line, size, Font::Regular, 0.0);
        }
        if let Some((artifact, (scale, height))) = fitted {
            layout.graphic(artifact, height, scale);
        }
        for line in options.iter().flatten() {
            layout.line(line, size, Font::Regular, OPTION_INDENT);
        }
        layout.gap(line_h);
    }

    fn answer_block(&self, layout: &mut Layout<'_>, number: usize, question: &OutputQuestion) {
        let size = self.page.font_size;
        let small = size - 1.0;
        let mut answer = format!("{number}. {}", question.answer);
        if let Some(value) = &question.answer_value {
            answer.push_str(&format!(" ({})", value_text(value)));
        }
        let explanation = question
            .explanation
            .as_deref()
            .map(|e| wrap(e, self.page.content_width() - OPTION_INDENT, small))
            .unwrap_or_default();

        let estimate = size * LINE_FACTOR + explanation.len() as f32 * small * LINE_FACTOR + size / 2.0;
        layout.ensure(estimate);
        layout.line(&answer, size, Font::Bold, 0.0);
        for line in &explanation {
            layout.line(line, small, Font::Regular, OPTION_INDENT);
        }
        layout.gap(size / 2.0);
    }

    /// Build the PDF bytes. Returns the document and its page count.
    pub fn render_pdf(
        &self,
        output: &WorksheetOutput,
        manifest: &RenderManifest,
        manifest_dir: &Path,
        plan: Option<&WorksheetPlan>,
    ) -> Result<(Vec<u8>, usize)> {
        let questions = Self::ordered(output, plan);
        let mut layout = Layout::new(&self.page);

        let title = output.title.as_deref().unwrap_or("Worksheet");
        layout.line(title, TITLE_SIZE, Font::Bold, 0.0);
        layout.line("Name: ____________________    Date: ____________", self.page.font_size, Font::Regular, 0.0);
        layout.gap(self.page.line_height());

        for (i, question) in questions.iter().enumerate() {
            let artifact = match manifest.entry(&question.q_id) {
                Some(entry) => Some(load_artifact(&entry.meta_file(manifest_dir))?),
                None => None,
            };
            debug!(q_id = %question.q_id, graphic = artifact.is_some(), "Laying out question");
            self.question_block(&mut layout, i + 1, question, artifact.as_ref());
        }

        if self.page.answer_key {
            layout.new_page();
            layout.line("Answer Key", HEADING_SIZE, Font::Bold, 0.0);
            layout.gap(self.page.line_height() / 2.0);
            for (i, question) in questions.iter().enumerate() {
                self.answer_block(&mut layout, i + 1, question);
            }
        }

        let contents = layout.finish();
        let pages = contents.len();
        Ok((self.assemble(contents), pages))
    }

    fn assemble(&self, contents: Vec<Content>) -> Vec<u8> {
        let mut pdf = Pdf::new();
        let mut next_id = 1i32;
        let mut alloc = || {
            let r = Ref::new(next_id);
            next_id += 1;
            r
        };
        let catalog_id = alloc();
        let pages_id = alloc();
        let regular_id = alloc();
        let bold_id = alloc();
        let page_ids: Vec<Ref> = contents.iter().map(|_| alloc()).collect();
        let content_ids: Vec<Ref> = contents.iter().map(|_| alloc()).collect();

        pdf.type1_font(regular_id)
            .base_font(Name(b"Helvetica"))
            .encoding_predefined(Name(b"WinAnsiEncoding"));
        pdf.type1_font(bold_id)
            .base_font(Name(b"Helvetica-Bold"))
            .encoding_predefined(Name(b"WinAnsiEncoding"));

        pdf.catalog(catalog_id).pages(pages_id);
        pdf.pages(pages_id)
            .kids(page_ids.iter().copied())
            .count(page_ids.len() as i32);

        for (i, content) in contents.into_iter().enumerate() {
            {
                let mut page = pdf.page(page_ids[i]);
                page.media_box(Rect::new(0.0, 0.0, self.page.width(), self.page.height()))
                    .parent(pages_id)
                    .contents(content_ids[i]);
                let mut resources = page.resources();
                let mut fonts = resources.fonts();
                fonts.pair(Name(Font::Regular.resource()), regular_id);
                fonts.pair(Name(Font::Bold.resource()), bold_id);
            }
            let raw = content.finish();
            pdf.stream(content_ids[i], raw.as_slice());
        }

        pdf.finish()
    }

    /// Write the worksheet PDF to `path`.
    pub fn export(
        &self,
        output: &WorksheetOutput,
        manifest: &RenderManifest,
        manifest_dir: &Path,
        plan: Option<&WorksheetPlan>,
        path: &Path,
    ) -> Result<ExportSummary> {
        self.page
            .validate()
            .map_err(|e| WorksheetError::Export(format!("page settings: {e}")))?;
        let (bytes, pages) = self.render_pdf(output, manifest, manifest_dir, plan)?;
        write_atomic(path, &bytes)?;

        let questions = Self::ordered(output, plan).len();
        info!(path = %path.display(), pages, questions, "Exported worksheet");
        Ok(ExportSummary {
            path: path.to_path_buf(),
            pages,
            questions,
            answer_key: self.page.answer_key,
        })
    }
}
