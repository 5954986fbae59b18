//! Legend strip: sample name header, then one row per phase with a colour
//! swatch, the phase name and a right-aligned percentage.
//!
//! The numeric column is sized once from [`WIDEST_PERCENT_TEXT`] so rows never
//! reflow whatever their values.
use crate::error::{CompositeError, Result};
use crate::geometry::{CanvasLayout, SampleGeometry};
use crate::phases::{PhaseEntry, PhaseTable};
use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

/// Rows below this share (in percent) are hidden unless low values are shown.
pub const LOW_VALUE_PERCENT: f64 = 0.01;

/// Longest percentage label that can be produced; used for column layout.
pub const WIDEST_PERCENT_TEXT: &str = "<0.01";

const HEADER_TOP_PX: i32 = 5;
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

static DEJAVU_SANS_MONO: &[u8] = include_bytes!("../assets/fonts/DejaVuSansMono.ttf");

pub fn percent_text(value: f64) -> String {
    if value < LOW_VALUE_PERCENT {
        return WIDEST_PERCENT_TEXT.to_string();
    }
    format!("{value:.2}")
}

pub fn percent_of(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * count as f64 / total as f64
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LegendStyle {
    pub header_size: f32,
    pub body_size: f32,
}

impl Default for LegendStyle {
    fn default() -> Self {
        Self {
            header_size: 36.0,
            body_size: 24.0,
        }
    }
}

impl LegendStyle {
    pub fn header_line_height(&self) -> u32 {
        (self.header_size * 1.3).ceil() as u32
    }

    /// Top of the first phase row.
    pub fn first_row_y(&self) -> u32 {
        (self.header_line_height() as f32 * 1.5).ceil() as u32
    }

    /// Row advance; also the swatch side.
    pub fn row_height(&self) -> u32 {
        (self.body_size * 1.3).ceil() as u32
    }

    /// Offset of the phase name from the legend start.
    pub fn text_inset(&self) -> u32 {
        2 * self.row_height() - self.body_size as u32
    }

    pub fn column_gap(&self) -> u32 {
        self.row_height() - self.body_size as u32
    }
}

/// Font used for all legend text.
#[derive(Clone, Debug)]
pub struct LegendFont {
    font: FontRef<'static>,
}

impl LegendFont {
    /// The bundled DejaVu Sans Mono.
    pub fn embedded() -> Result<Self> {
        Self::from_static(DEJAVU_SANS_MONO)
    }

    pub fn from_static(bytes: &'static [u8]) -> Result<Self> {
        let font = FontRef::try_from_slice(bytes).map_err(|e| CompositeError::InvalidFont(e.to_string()))?;
        Ok(Self { font })
    }

    pub fn text_width(&self, size: f32, text: &str) -> u32 {
        text_size(PxScale::from(size), &self.font, text).0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LegendRow {
    pub id: u32,
    pub name: String,
    pub color: Rgb<u8>,
    pub percent: f64,
    pub label: String,
}

/// Turns ranked phases into legend rows, keeping their order.
pub fn legend_rows(ranked: &[PhaseEntry], classified_pixel_count: u64, show_low_val: bool) -> Vec<LegendRow> {
    ranked
        .iter()
        .filter_map(|entry| {
            let percent = percent_of(entry.pixel_count, classified_pixel_count);
            if !show_low_val && percent < LOW_VALUE_PERCENT {
                return None;
            }
            Some(LegendRow {
                id: entry.id,
                name: entry.name.clone(),
                color: entry.color,
                percent,
                label: percent_text(percent),
            })
        })
        .collect()
}

/// Pixel positions of one legend row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowPlacement {
    pub y: i32,
    pub swatch_x: i32,
    pub swatch_side: u32,
    pub name_x: i32,
    pub percent_x: i32,
}

pub struct LegendRenderer<'f> {
    font: &'f LegendFont,
    style: LegendStyle,
}

impl<'f> LegendRenderer<'f> {
    pub fn new(font: &'f LegendFont, style: LegendStyle) -> Self {
        Self { font, style }
    }

    pub fn style(&self) -> &LegendStyle {
        &self.style
    }

    /// Canvas layout for a sample, sized from every phase name the table may
    /// list so it can be fixed before compositing starts.
    pub fn layout(&self, geometry: &SampleGeometry, table: &PhaseTable) -> CanvasLayout {
        let body = self.style.body_size;
        let widest_name = table
            .entries()
            .iter()
            .map(|e| self.font.text_width(body, &e.name))
            .max()
            .unwrap_or(0);
        let numeric = self.font.text_width(body, WIDEST_PERCENT_TEXT);
        let columns = self.style.text_inset() + widest_name + self.style.column_gap() + numeric;
        CanvasLayout::new(geometry, columns as usize, self.style.column_gap() as usize)
    }

    pub fn place_rows(&self, layout: &CanvasLayout, rows: &[LegendRow]) -> Vec<RowPlacement> {
        let x0 = layout.legend_start_x as i32;
        let row_height = self.style.row_height();
        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                let width = self.font.text_width(self.style.body_size, &row.label) as i32;
                RowPlacement {
                    y: (self.style.first_row_y() + i as u32 * row_height) as i32,
                    swatch_x: x0,
                    swatch_side: row_height,
                    name_x: x0 + self.style.text_inset() as i32,
                    percent_x: layout.percent_right_x as i32 - width,
                }
            })
            .collect()
    }

    /// Draws the header and rows onto `canvas`. Anything past the canvas
    /// height is clipped.
    pub fn draw(&self, canvas: &mut RgbImage, layout: &CanvasLayout, sample_name: &str, rows: &[LegendRow]) {
        let header = PxScale::from(self.style.header_size);
        let body = PxScale::from(self.style.body_size);
        draw_text_mut(
            canvas,
            TEXT_COLOR,
            layout.legend_start_x as i32,
            HEADER_TOP_PX,
            header,
            &self.font.font,
            sample_name,
        );
        for (row, place) in rows.iter().zip(self.place_rows(layout, rows)) {
            let swatch = Rect::at(place.swatch_x, place.y).of_size(place.swatch_side, place.swatch_side);
            draw_filled_rect_mut(canvas, swatch, row.color);
            draw_text_mut(canvas, TEXT_COLOR, place.name_x, place.y, body, &self.font.font, &row.name);
            draw_text_mut(canvas, TEXT_COLOR, place.percent_x, place.y, body, &self.font.font, &row.label);
        }
    }
}
