//! SVG serialization of a primitive list.

use std::fmt::Write;

use super::scene::{fmt_num, PAPER};
use super::{arrow_head, polar_to_cartesian, Anchor, Primitive, Style};

const FONT_FAMILY: &str = "Helvetica, Arial, sans-serif";

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn style_attrs(style: &Style) -> String {
    let mut attrs = format!(" fill=\"{}\"", style.fill.as_deref().unwrap_or("none"));
    if let Some(stroke) = &style.stroke {
        let _ = write!(attrs, " stroke=\"{}\" stroke-width=\"{}\"", stroke, fmt_num(style.stroke_width));
        if style.dashed {
            attrs.push_str(" stroke-dasharray=\"4 3\"");
        }
    }
    attrs
}

/// Serialize to a standalone SVG document. Output is deterministic.
pub fn to_svg(width: f64, height: f64, primitives: &[Primitive]) -> String {
    let (w, h) = (fmt_num(width), fmt_num(height));
    let mut out = String::new();
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#
    );
    let _ = writeln!(out, r#"  <rect x="0" y="0" width="{w}" height="{h}" fill="{PAPER}"/>"#);

    for p in primitives {
        match p {
            Primitive::Rect { x, y, w, h, rx, style } => {
                let corner = if *rx > 0.0 { format!(" rx=\"{}\"", fmt_num(*rx)) } else { String::new() };
                let _ = writeln!(
                    out,
                    r#"  <rect x="{}" y="{}" width="{}" height="{}"{}{}/>"#,
                    fmt_num(*x),
                    fmt_num(*y),
                    fmt_num(*w),
                    fmt_num(*h),
                    corner,
                    style_attrs(style)
                );
            }
            Primitive::Line { x1, y1, x2, y2, style } => {
                let _ = writeln!(
                    out,
                    r#"  <line x1="{}" y1="{}" x2="{}" y2="{}"{}/>"#,
                    fmt_num(*x1),
                    fmt_num(*y1),
                    fmt_num(*x2),
                    fmt_num(*y2),
                    style_attrs(style)
                );
            }
            Primitive::Circle { cx, cy, r, style } => {
                let _ = writeln!(
                    out,
                    r#"  <circle cx="{}" cy="{}" r="{}"{}/>"#,
                    fmt_num(*cx),
                    fmt_num(*cy),
                    fmt_num(*r),
                    style_attrs(style)
                );
            }
            Primitive::Sector { cx, cy, r, start_deg, end_deg, style } => {
                let (sx, sy) = polar_to_cartesian(*cx, *cy, *r, *start_deg);
                let (ex, ey) = polar_to_cartesian(*cx, *cy, *r, *end_deg);
                let large_arc = if end_deg - start_deg > 180.0 { 1 } else { 0 };
                let _ = writeln!(
                    out,
                    r#"  <path d="M {} {} L {} {} A {} {} 0 {} 1 {} {} Z"{}/>"#,
                    fmt_num(*cx),
                    fmt_num(*cy),
                    fmt_num(sx),
                    fmt_num(sy),
                    fmt_num(*r),
                    fmt_num(*r),
                    large_arc,
                    fmt_num(ex),
                    fmt_num(ey),
                    style_attrs(style)
                );
            }
            Primitive::Arrow { x1, y1, cx, cy, x2, y2, style } => {
                let [(hx1, hy1), (hx2, hy2)] = arrow_head(*cx, *cy, *x2, *y2);
                let line = Style { fill: None, ..style.clone() };
                let _ = writeln!(
                    out,
                    r#"  <path d="M {} {} Q {} {} {} {}"{}/>"#,
                    fmt_num(*x1),
                    fmt_num(*y1),
                    fmt_num(*cx),
                    fmt_num(*cy),
                    fmt_num(*x2),
                    fmt_num(*y2),
                    style_attrs(&line)
                );
                let _ = writeln!(
                    out,
                    r#"  <path d="M {} {} L {} {} L {} {}"{}/>"#,
                    fmt_num(hx1),
                    fmt_num(hy1),
                    fmt_num(*x2),
                    fmt_num(*y2),
                    fmt_num(hx2),
                    fmt_num(hy2),
                    style_attrs(&line)
                );
            }
            Primitive::Text { x, y, text, size, anchor, fill, bold } => {
                let anchor = match anchor {
                    Anchor::Start => "start",
                    Anchor::Middle => "middle",
                    Anchor::End => "end",
                };
                let weight = if *bold { " font-weight=\"bold\"" } else { "" };
                let _ = writeln!(
                    out,
                    r#"  <text x="{}" y="{}" font-family="{}" font-size="{}" text-anchor="{}" fill="{}"{}>{}</text>"#,
                    fmt_num(*x),
                    fmt_num(*y),
                    FONT_FAMILY,
                    fmt_num(*size),
                    anchor,
                    fill,
                    weight,
                    escape(text)
                );
            }
        }
    }

    out.push_str("</svg>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::scene::{INK, SHADE};

    #[test]
    fn serializes_each_primitive_kind() {
        let prims = vec![
            Primitive::Rect { x: 1.0, y: 2.0, w: 3.0, h: 4.5, rx: 0.0, style: Style::filled(SHADE, INK) },
            Primitive::Line { x1: 0.0, y1: 0.0, x2: 10.0, y2: 0.0, style: Style::stroked(INK, 2.0).dashed() },
            Primitive::Sector {
                cx: 50.0,
                cy: 50.0,
                r: 10.0,
                start_deg: 0.0,
                end_deg: 270.0,
                style: Style::filled(SHADE, INK),
            },
            Primitive::Text {
                x: 5.0,
                y: 5.0,
                text: "3 < 4 & 5".to_string(),
                size: 12.0,
                anchor: Anchor::Middle,
                fill: INK.to_string(),
                bold: true,
            },
        ];
        let svg = to_svg(100.0, 80.0, &prims);
        assert!(svg.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"100\" height=\"80\""));
        assert!(svg.contains(r##"<rect x="1" y="2" width="3" height="4.5" fill="#60a5fa" stroke="#1f2937" stroke-width="1"/>"##));
        assert!(svg.contains("stroke-dasharray=\"4 3\""));
        assert!(svg.contains("A 10 10 0 1 1 40 50 Z"));
        assert!(svg.contains(">3 &lt; 4 &amp; 5</text>"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }
}
