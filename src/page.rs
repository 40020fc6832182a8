//! Page Geometry
//!
//! Physical layout of the exported worksheet document. All values in PDF points.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    #[default]
    Letter,
    A4,
}

impl PageSize {
    /// (width, height) in points.
    pub fn dimensions(self) -> (f32, f32) {
        match self {
            Self::Letter => (612.0, 792.0),
            Self::A4 => (595.0, 842.0),
        }
    }
}

/// Page specification for the document exporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSpec {
    #[serde(default)]
    pub page_size: PageSize,
    #[serde(default = "default_margin")]
    pub margin: f32,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    /// Graphics are scaled down to at most this height.
    #[serde(default = "default_max_graphic_height")]
    pub max_graphic_height: f32,
    #[serde(default = "default_true")]
    pub answer_key: bool,
}

fn default_margin() -> f32 { 54.0 }
fn default_font_size() -> f32 { 11.0 }
fn default_max_graphic_height() -> f32 { 260.0 }
fn default_true() -> bool { true }

impl Default for PageSpec {
    fn default() -> Self {
        Self {
            page_size: PageSize::Letter,
            margin: default_margin(),
            font_size: default_font_size(),
            max_graphic_height: default_max_graphic_height(),
            answer_key: true,
        }
    }
}

impl PageSpec {
    pub fn validate(&self) -> Result<(), &'static str> {
        let (w, h) = self.page_size.dimensions();
        if self.margin < 0.0 || self.margin * 2.0 >= w.min(h) / 2.0 {
            return Err("Margin must be non-negative and leave at least half the page");
        }
        if !(6.0..=24.0).contains(&self.font_size) {
            return Err("Font size must be between 6 and 24 points");
        }
        if self.max_graphic_height < 36.0 || self.max_graphic_height > h - 2.0 * self.margin {
            return Err("Graphic height must fit inside the printable area");
        }
        Ok(())
    }

    pub fn width(&self) -> f32 {
        self.page_size.dimensions().0
    }

    pub fn height(&self) -> f32 {
        self.page_size.dimensions().1
    }

    pub fn content_width(&self) -> f32 {
        self.width() - 2.0 * self.margin
    }

    pub fn line_height(&self) -> f32 {
        self.font_size * 1.4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spec_is_valid() {
        assert!(PageSpec::default().validate().is_ok());
        assert_eq!(PageSpec::default().content_width(), 612.0 - 108.0);
    }

    #[test]
    fn user_values_are_checked() {
        let a4 = PageSpec { page_size: PageSize::A4, margin: 40.0, font_size: 12.0, ..PageSpec::default() };
        assert!(a4.validate().is_ok());
        let wide = PageSpec { margin: 200.0, ..PageSpec::default() };
        assert!(wide.validate().is_err());
        let large = PageSpec { font_size: 40.0, ..PageSpec::default() };
        assert!(large.validate().is_err());
    }
}
