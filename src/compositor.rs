//! Field compositor: copies classified, unmasked tile pixels onto the sample
//! canvases and keeps the phase histograms in step.
//!
//! Per tile pixel `(x, y)` with phase id `p` and mask value `m`:
//!
//! - `p == 0 && m != 0` counts as unknown (diagnostic only);
//! - the pixel is eligible when `m != 0` and (`p != 0` or unclassified
//!   phases are kept);
//! - an eligible pixel whose id is missing from the phase table counts
//!   against the field's error budget; past [`ERROR_BUDGET`] the sample is
//!   aborted;
//! - otherwise the phase colour, the backscatter value and the phase id are
//!   written at `(x, y) + offset` and both histograms are incremented.
//!
//! Fields are expected not to overlap on the canvas. A pixel that would land
//! outside the canvas is a hard error.
use crate::config::CompositorOptions;
use crate::error::{CompositeError, Result};
use crate::geometry::{CanvasLayout, TileDims};
use crate::image::{FieldTiles, Gray16Canvas, IdGrid, RgbCanvas, TileLoadResult};
use crate::manifest::FieldDescriptor;
use crate::phases::{FieldHistogram, PhaseTable};
use image::Rgb;
use log::{debug, error, warn};
use std::path::Path;

/// Pixels per field whose phase id may be missing from the table before the
/// sample is abandoned.
pub const ERROR_BUDGET: u64 = 25;

/// Share of a tile, in percent, that may be unknown before a warning is logged.
pub const UNKNOWN_WARN_PERCENT: usize = 15;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Output rasters of one sample. The RGB canvas spans mosaic and legend; the
/// optional backscatter canvas and id grid cover the mosaic area only.
#[derive(Clone, Debug)]
pub struct CanvasSet {
    pub mosaic_width: usize,
    pub mosaic_height: usize,
    pub classification: RgbCanvas,
    pub bse: Option<Gray16Canvas>,
    pub id_grid: Option<IdGrid>,
}

impl CanvasSet {
    pub fn allocate(layout: &CanvasLayout, with_bse: bool, with_id_grid: bool) -> Self {
        let (w, h) = (layout.field_width, layout.field_height);
        Self {
            mosaic_width: w,
            mosaic_height: h,
            classification: RgbCanvas::filled(layout.canvas_width, layout.canvas_height(), WHITE),
            bse: with_bse.then(|| Gray16Canvas::filled(w, h, u16::MAX)),
            id_grid: with_id_grid.then(|| IdGrid::new(h, w)),
        }
    }
}

/// Inclusive canvas bounds of every classified pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl BoundingBox {
    fn point(x: usize, y: usize) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    #[inline]
    fn expand(&mut self, x: usize, y: usize) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> usize {
        self.max_y - self.min_y + 1
    }
}

/// Diagnostics for one composited field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldReport {
    pub name: String,
    pub classified_pixels: u64,
    pub unknown_pixels: u64,
    /// Eligible pixels whose phase id was missing from the table.
    pub unmatched_pixels: u64,
    pub high_unknown: bool,
    pub bse_written: bool,
    /// `(phase id, pixels)` for this field, most frequent first.
    pub phase_counts: Vec<(u32, u64)>,
}

#[derive(Clone, Debug, Default)]
pub struct SampleResult {
    pub classified_pixel_count: u64,
    pub error_count: u64,
    pub bounds: Option<BoundingBox>,
    pub fields: Vec<FieldReport>,
    pub skipped_fields: Vec<String>,
}

pub struct FieldCompositor<'a> {
    sample: &'a str,
    phases_path: &'a Path,
    options: &'a CompositorOptions,
    tile: TileDims,
    table: PhaseTable,
    canvases: CanvasSet,
    histogram: FieldHistogram,
    result: SampleResult,
    mismatch_reported: bool,
}

impl<'a> FieldCompositor<'a> {
    pub fn new(
        sample: &'a str,
        phases_path: &'a Path,
        options: &'a CompositorOptions,
        tile: TileDims,
        table: PhaseTable,
        canvases: CanvasSet,
    ) -> Self {
        let histogram = table.baseline();
        Self {
            sample,
            phases_path,
            options,
            tile,
            table,
            canvases,
            histogram,
            result: SampleResult::default(),
            mismatch_reported: false,
        }
    }

    /// Composites one field. A field whose classification or mask tile could
    /// not be loaded is logged and skipped (`Ok(None)`).
    pub fn composite(
        &mut self,
        field: &FieldDescriptor,
        load: TileLoadResult,
    ) -> Result<Option<FieldReport>> {
        match load {
            TileLoadResult::Loaded(tiles) => self.composite_tiles(field, &tiles).map(Some),
            TileLoadResult::Failed(errors) => {
                for err in &errors {
                    error!("Sample {}, field {}: {err}", self.sample, field.name);
                }
                self.result.skipped_fields.push(field.name.clone());
                Ok(None)
            }
        }
    }

    pub fn composite_tiles(&mut self, field: &FieldDescriptor, tiles: &FieldTiles) -> Result<FieldReport> {
        if let Some(err) = &tiles.bse_error {
            error!("Sample {}, field {}: {err}", self.sample, field.name);
        }
        let bse_tile = tiles.bse.as_ref().filter(|_| self.canvases.bse.is_some());
        let exclude_unclassified = self.options.exclude_unclassified;
        let (ox, oy) = (field.pixel_offset.x, field.pixel_offset.y);

        self.histogram.reset();
        let mut unknown = 0u64;
        let mut unmatched = 0u64;
        let mut classified = 0u64;

        for y in 0..self.tile.height {
            for x in 0..self.tile.width {
                let phase_id = tiles.classification.get(x, y);
                let masked = tiles.mask.get(x, y) != 0;
                if phase_id == 0 && masked {
                    unknown += 1;
                }
                if !masked || (phase_id == 0 && exclude_unclassified) {
                    continue;
                }

                let Some(slot) = self.table.lookup(u32::from(phase_id)) else {
                    unmatched += 1;
                    self.report_mismatch(field, phase_id);
                    if unmatched > ERROR_BUDGET {
                        return Err(CompositeError::PhaseTableExhausted {
                            sample: self.sample.to_string(),
                            field: field.name.clone(),
                            phase_id: u32::from(phase_id),
                            limit: ERROR_BUDGET,
                            phases_path: self.phases_path.to_path_buf(),
                        });
                    }
                    continue;
                };

                let (cx, cy) = self.canvas_coord(field, ox + x as i64, oy + y as i64)?;
                let color = self.table.entry(slot).color;
                self.canvases.classification.set(cx, cy, color);
                if let (Some(canvas), Some(bse)) = (self.canvases.bse.as_mut(), bse_tile) {
                    canvas.set(cx, cy, bse.get(x, y));
                }
                if let Some(grid) = self.canvases.id_grid.as_mut() {
                    grid.set(cy, cx, i32::from(phase_id));
                }
                self.table.record_pixel(slot);
                self.histogram.record(slot);
                match &mut self.result.bounds {
                    Some(bounds) => bounds.expand(cx, cy),
                    None => self.result.bounds = Some(BoundingBox::point(cx, cy)),
                }
                classified += 1;
            }
        }

        self.result.classified_pixel_count += classified;
        self.result.error_count += unmatched;
        if unmatched > 0 {
            warn!(
                "Skipped {unmatched} pixels of sample {} field {} with unknown phase ids",
                self.sample, field.name
            );
        }

        let unknown_limit = (self.tile.area() * UNKNOWN_WARN_PERCENT / 100) as u64;
        let high_unknown = unknown > unknown_limit;
        if high_unknown {
            warn!(
                "Sample {} field {} is more than {UNKNOWN_WARN_PERCENT}% unclassified ({unknown} of {} pixels)",
                self.sample,
                field.name,
                self.tile.area()
            );
        }

        let phase_counts = self.histogram.ranked(&self.table);
        debug!(
            "Sample {} field {} at ({ox}, {oy}): {classified} classified, top phases {:?}",
            self.sample,
            field.name,
            &phase_counts[..phase_counts.len().min(5)]
        );

        let report = FieldReport {
            name: field.name.clone(),
            classified_pixels: classified,
            unknown_pixels: unknown,
            unmatched_pixels: unmatched,
            high_unknown,
            bse_written: bse_tile.is_some(),
            phase_counts,
        };
        self.result.fields.push(report.clone());
        Ok(report)
    }

    fn report_mismatch(&mut self, field: &FieldDescriptor, phase_id: u16) {
        if self.mismatch_reported {
            return;
        }
        self.mismatch_reported = true;
        warn!(
            "Phase id {phase_id} is missing from {} (sample {}, field {}); reported once per sample",
            self.phases_path.display(),
            self.sample,
            field.name
        );
    }

    fn canvas_coord(&self, field: &FieldDescriptor, x: i64, y: i64) -> Result<(usize, usize)> {
        let (w, h) = (self.canvases.mosaic_width, self.canvases.mosaic_height);
        if x < 0 || y < 0 || x as usize >= w || y as usize >= h {
            return Err(CompositeError::OutOfCanvas {
                sample: self.sample.to_string(),
                field: field.name.clone(),
                tile: field.tiles.classification.clone(),
                x,
                y,
                width: w,
                height: h,
            });
        }
        Ok((x as usize, y as usize))
    }

    pub fn table(&self) -> &PhaseTable {
        &self.table
    }

    pub fn result(&self) -> &SampleResult {
        &self.result
    }

    pub fn finish(self) -> (PhaseTable, CanvasSet, SampleResult) {
        (self.table, self.canvases, self.result)
    }
}
