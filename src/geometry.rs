//! Physical-to-pixel geometry for one sample.
//!
//! The instrument reports each field as an offset in microns from the sample
//! centre. Its +x points to the image left while +y points down, so only the X
//! component is negated on the way into canvas space. Offsets are floored so
//! rounding drift never accumulates across neighbouring fields.
use crate::error::{CompositeError, Result};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gap between the mosaic and the legend strip, in pixels.
pub const LEGEND_MARGIN_PX: usize = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleShape {
    Rectangle,
    Circle,
}

impl SampleShape {
    /// Parses the instrument's shape label. No default is assumed.
    pub fn parse(sample: &str, label: &str) -> Result<Self> {
        match label {
            "Rectangle" => Ok(SampleShape::Rectangle),
            "Circle" => Ok(SampleShape::Circle),
            other => Err(CompositeError::UnsupportedShape {
                sample: sample.to_string(),
                shape: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SampleShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleShape::Rectangle => f.write_str("Rectangle"),
            SampleShape::Circle => f.write_str("Circle"),
        }
    }
}

/// Physical sample extent in microns. Rectangles use width/height, circles
/// use the diameter.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SampleDimensions {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub diameter: Option<f64>,
}

/// Declared pixel size of every field tile of a sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileDims {
    pub width: usize,
    pub height: usize,
}

impl TileDims {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

/// Resolved pixel geometry of a sample mosaic (legend excluded).
#[derive(Clone, Debug, PartialEq)]
pub struct SampleGeometry {
    pub shape: SampleShape,
    pub field_width: usize,
    pub field_height: usize,
    pub tile: TileDims,
    /// Microns per pixel.
    pub pixel_spacing: f64,
}

impl SampleGeometry {
    pub fn resolve(
        sample: &str,
        shape: SampleShape,
        dims: &SampleDimensions,
        view_field_um: f64,
        tile: TileDims,
    ) -> Result<Self> {
        let invalid = |reason: String| CompositeError::InvalidGeometry {
            sample: sample.to_string(),
            reason,
        };
        if !(view_field_um.is_finite() && view_field_um > 0.0) {
            return Err(invalid(format!("view field must be positive, got {view_field_um}")));
        }
        if tile.width == 0 || tile.height == 0 {
            return Err(invalid(format!(
                "tile dimensions must be non-zero, got {}x{}",
                tile.width, tile.height
            )));
        }
        let require = |value: Option<f64>, name: &str| -> Result<f64> {
            match value {
                Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
                Some(v) => Err(invalid(format!("{shape} {name} must be non-negative, got {v}"))),
                None => Err(invalid(format!("{shape} sample is missing its {name}"))),
            }
        };

        let to_px = |um: f64, tile_px: usize| (um / view_field_um * tile_px as f64) as usize;
        let (field_width, field_height) = match shape {
            SampleShape::Rectangle => {
                let width_um = require(dims.width, "width")?;
                let height_um = require(dims.height, "height")?;
                (to_px(width_um, tile.width), to_px(height_um, tile.height))
            }
            SampleShape::Circle => {
                let diameter_px = to_px(require(dims.diameter, "diameter")?, tile.width);
                (diameter_px, diameter_px)
            }
        };

        Ok(Self {
            shape,
            field_width,
            field_height,
            tile,
            pixel_spacing: view_field_um / tile.width as f64,
        })
    }

    /// Top-left canvas position of a tile whose centre sits `physical_um`
    /// microns from the sample centre.
    pub fn field_offset(&self, physical_um: Vector2<f64>) -> Vector2<i64> {
        let mirrored = Vector2::new(-physical_um.x, physical_um.y) / self.pixel_spacing;
        let origin = Vector2::new(
            self.field_width as f64 / 2.0,
            self.field_height as f64 / 2.0,
        );
        let half_tile = Vector2::new(self.tile.width as f64 / 2.0, self.tile.height as f64 / 2.0);
        (mirrored + origin - half_tile).map(|v| v.floor() as i64)
    }
}

/// Horizontal layout of the output canvas: the mosaic on the left, the
/// legend strip on the right of `field_width`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanvasLayout {
    pub field_width: usize,
    pub field_height: usize,
    pub legend_start_x: usize,
    /// Right edge of the percentage column.
    pub percent_right_x: usize,
    pub canvas_width: usize,
}

impl CanvasLayout {
    /// `columns_width` spans from the legend start to the percentage column's
    /// right edge; `right_padding` is added after it.
    pub fn new(geometry: &SampleGeometry, columns_width: usize, right_padding: usize) -> Self {
        let legend_start_x = geometry.field_width + LEGEND_MARGIN_PX;
        let percent_right_x = legend_start_x + columns_width;
        Self {
            field_width: geometry.field_width,
            field_height: geometry.field_height,
            legend_start_x,
            percent_right_x,
            canvas_width: percent_right_x + right_padding,
        }
    }

    pub fn legend_width(&self) -> usize {
        self.canvas_width - self.field_width
    }

    pub fn canvas_height(&self) -> usize {
        self.field_height
    }
}
