//! Sample aggregator: composites every field of one sample and flushes its
//! outputs.
//!
//! The mosaic `<sample>.png` is the completion marker. It is written last, so a
//! sample whose mosaic exists is skipped outright, while optional outputs left
//! by an interrupted run are kept and not regenerated.
use crate::compositor::{BoundingBox, CanvasSet, FieldCompositor, SampleResult};
use crate::config::CompositorOptions;
use crate::error::{CompositeError, Result};
use crate::image::io::{save_png_atomic, write_id_grid_csv_gz};
use crate::image::load_field_tiles;
use crate::legend::{legend_rows, LegendFont, LegendRenderer, LegendStyle};
use crate::manifest::{FieldDescriptor, SampleManifest};
use crate::phases::{load_phase_table, PhaseEntry};
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Thumbnails fit in a square of this side.
pub const THUMBNAIL_MAX_PX: u32 = 300;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPaths {
    pub mosaic: PathBuf,
    pub thumbnail: PathBuf,
    pub bse: PathBuf,
    pub id_grid: PathBuf,
}

impl OutputPaths {
    pub fn for_sample(output_root: &Path, sample_name: &str) -> Self {
        Self {
            mosaic: output_root.join(format!("{sample_name}.png")),
            thumbnail: output_root.join(format!("{sample_name}.thumbnail.png")),
            bse: output_root.join(format!("{sample_name}_bse.png")),
            id_grid: output_root.join(format!("{sample_name}.csv.gz")),
        }
    }
}

/// What a completed sample produced.
#[derive(Clone, Debug)]
pub struct SampleSummary {
    pub sample_name: String,
    pub classified_pixel_count: u64,
    /// Phases present in the mosaic, ranked as in the legend.
    pub phases: Vec<PhaseEntry>,
    pub result: SampleResult,
    pub wrote_thumbnail: bool,
    pub wrote_bse: bool,
    pub wrote_id_grid: bool,
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub enum SampleStatus {
    Done(Box<SampleSummary>),
    /// The mosaic already existed.
    Skipped,
}

pub struct SampleAggregator<'a> {
    output_root: &'a Path,
    options: &'a CompositorOptions,
    font: &'a LegendFont,
    cancel: &'a AtomicBool,
    field_hook: Option<&'a dyn Fn(&FieldDescriptor)>,
}

/// Optional outputs still to be produced for a sample.
struct Pending {
    thumbnail: bool,
    bse: bool,
    id_grid: bool,
}

impl<'a> SampleAggregator<'a> {
    pub fn new(
        output_root: &'a Path,
        options: &'a CompositorOptions,
        font: &'a LegendFont,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            output_root,
            options,
            font,
            cancel,
            field_hook: None,
        }
    }

    /// Calls `hook` after each field has been composited.
    pub fn with_field_hook(mut self, hook: &'a dyn Fn(&FieldDescriptor)) -> Self {
        self.field_hook = Some(hook);
        self
    }

    pub fn run(&self, sample: &SampleManifest) -> Result<SampleStatus> {
        let start = Instant::now();
        let name = sample.sample_name.as_str();
        let paths = OutputPaths::for_sample(self.output_root, name);
        if paths.mosaic.exists() {
            info!("Skipping {name} because {} already exists", paths.mosaic.display());
            return Ok(SampleStatus::Skipped);
        }
        debug!("Sample: {name} started processing");
        let pending = self.pending_outputs(name, &paths);

        let geometry = sample.geometry()?;
        let table = load_phase_table(name, &sample.phase_table_source, self.options.exclude_unclassified)?;
        let renderer = LegendRenderer::new(self.font, LegendStyle::default());
        let layout = renderer.layout(&geometry, &table);
        debug!(
            "Sample {name}: {} x {} px mosaic, {} px legend, {} phases",
            geometry.field_width,
            geometry.field_height,
            layout.legend_width(),
            table.len()
        );

        let fields = sample.field_descriptors(&geometry);
        if fields.is_empty() {
            warn!("Sample {name} ({}) does not have any fields", sample.sample_id);
        }

        let canvases = CanvasSet::allocate(&layout, pending.bse, pending.id_grid);
        let mut compositor = FieldCompositor::new(
            name,
            &sample.phase_table_source,
            self.options,
            geometry.tile,
            table,
            canvases,
        );
        for field in &fields {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(CompositeError::Cancelled {
                    sample: name.to_string(),
                });
            }
            let load = load_field_tiles(&field.tiles, geometry.tile, pending.bse);
            compositor.composite(field, load)?;
            if let Some(hook) = self.field_hook {
                hook(field);
            }
        }
        let (table, canvases, result) = compositor.finish();
        if !result.skipped_fields.is_empty() {
            warn!(
                "Sample {name} is missing {} of {} fields: {}",
                result.skipped_fields.len(),
                fields.len(),
                result.skipped_fields.join(", ")
            );
        }
        debug_assert_eq!(table.classified_total(), result.classified_pixel_count);

        let ranked = table.into_ranked();
        let rows = legend_rows(&ranked, result.classified_pixel_count, self.options.show_low_val);
        let CanvasSet {
            classification,
            bse,
            id_grid,
            ..
        } = canvases;
        let mut mosaic = classification.into_rgb_image();
        renderer.draw(&mut mosaic, &layout, name, &rows);

        if self.cancel.load(Ordering::Relaxed) {
            return Err(CompositeError::Cancelled {
                sample: name.to_string(),
            });
        }

        let mut wrote_thumbnail = false;
        if pending.thumbnail {
            match result.bounds {
                Some(bounds) => {
                    save_png_atomic(&DynamicImage::ImageRgb8(thumbnail(&mosaic, bounds)), &paths.thumbnail)?;
                    debug!("Sample: {name} thumbnail saved to {}", paths.thumbnail.display());
                    wrote_thumbnail = true;
                }
                None => warn!("Sample {name} has no classified pixels; no thumbnail written"),
            }
        }
        let wrote_bse = match bse {
            Some(canvas) => {
                save_png_atomic(&DynamicImage::ImageLuma16(canvas.into_gray16_image()), &paths.bse)?;
                debug!("Sample: {name} BSE image saved to {}", paths.bse.display());
                true
            }
            None => false,
        };
        let wrote_id_grid = match id_grid {
            Some(grid) => {
                write_id_grid_csv_gz(&grid, &paths.id_grid)?;
                debug!(
                    "Sample: {name} {}x{} id array saved to {}",
                    grid.rows(),
                    grid.cols(),
                    paths.id_grid.display()
                );
                true
            }
            None => false,
        };
        save_png_atomic(&DynamicImage::ImageRgb8(mosaic), &paths.mosaic)?;
        debug!("Sample: {name} image saved to {}", paths.mosaic.display());

        let elapsed = start.elapsed();
        info!(
            "Sample: {name} completed processing in {:.1} Seconds",
            elapsed.as_secs_f64()
        );
        Ok(SampleStatus::Done(Box::new(SampleSummary {
            sample_name: name.to_string(),
            classified_pixel_count: result.classified_pixel_count,
            phases: ranked,
            result,
            wrote_thumbnail,
            wrote_bse,
            wrote_id_grid,
            elapsed,
        })))
    }

    fn pending_outputs(&self, name: &str, paths: &OutputPaths) -> Pending {
        let keep = |wanted: bool, path: &Path, what: &str| {
            if wanted && path.exists() {
                info!("Not generating {what} for sample {name} because {} already exists", path.display());
                return false;
            }
            wanted
        };
        Pending {
            thumbnail: keep(self.options.create_thumbnail, &paths.thumbnail, "thumbnail"),
            bse: keep(self.options.generate_bse, &paths.bse, "bse png"),
            id_grid: keep(self.options.generate_id_array, &paths.id_grid, "id array"),
        }
    }
}

/// Crops the mosaic to the classified area and shrinks it to fit
/// [`THUMBNAIL_MAX_PX`]. Small crops are not enlarged.
pub fn thumbnail(mosaic: &RgbImage, bounds: BoundingBox) -> RgbImage {
    let crop = image::imageops::crop_imm(
        mosaic,
        bounds.min_x as u32,
        bounds.min_y as u32,
        bounds.width() as u32,
        bounds.height() as u32,
    )
    .to_image();
    let (w, h) = thumbnail_dims(crop.width(), crop.height());
    if (w, h) == crop.dimensions() {
        return crop;
    }
    image::imageops::resize(&crop, w, h, FilterType::Lanczos3)
}

fn thumbnail_dims(width: u32, height: u32) -> (u32, u32) {
    if width <= THUMBNAIL_MAX_PX && height <= THUMBNAIL_MAX_PX {
        return (width, height);
    }
    let scale = f64::min(
        THUMBNAIL_MAX_PX as f64 / width as f64,
        THUMBNAIL_MAX_PX as f64 / height as f64,
    );
    let fit = |v: u32| ((v as f64 * scale).round() as u32).clamp(1, THUMBNAIL_MAX_PX);
    (fit(width), fit(height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma, Rgb};
    use serde_json::json;
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    /// One-phase sample, 8x4 px, with a 4x4 field per `(name, x_um)`.
    fn project(fields: &[(&str, f64)]) -> (TempDir, SampleManifest) {
        let dir = tempfile::tempdir().unwrap();
        let phases = dir.path().join("phases.json");
        fs::write(&phases, r##"[{"id": 1, "name": "Quartz", "color": "#ff0000"}]"##).unwrap();
        for (name, _) in fields {
            let field_dir = dir.path().join(name);
            fs::create_dir_all(&field_dir).unwrap();
            GrayImage::from_pixel(4, 4, Luma([1])).save(field_dir.join("phases.tif")).unwrap();
            GrayImage::from_pixel(4, 4, Luma([255])).save(field_dir.join("mask.png")).unwrap();
            ImageBuffer::<Luma<u16>, Vec<u16>>::from_pixel(4, 4, Luma([500]))
                .save(field_dir.join("bse.png"))
                .unwrap();
        }
        let fields: Vec<serde_json::Value> = fields
            .iter()
            .map(|(name, x)| json!({"name": name, "x_um": x, "y_um": 0.0}))
            .collect();
        let sample = serde_json::from_value(json!({
            "sample_id": "s1",
            "sample_name": "core",
            "phase_table_source": phases,
            "tile_root": dir.path(),
            "fields": fields,
            "shape": "Rectangle",
            "dimensions_um": {"width": 8.0, "height": 4.0},
            "view_field_um": 4.0,
            "tile_width_px": 4,
            "tile_height_px": 4
        }))
        .unwrap();
        (dir, sample)
    }

    fn assert_no_outputs(paths: &OutputPaths) {
        for path in [&paths.mosaic, &paths.thumbnail, &paths.bse, &paths.id_grid] {
            assert!(!path.exists(), "{} was written", path.display());
        }
    }

    #[test]
    fn completes_and_reports_each_field() {
        let (dir, sample) = project(&[("a", 2.0), ("b", -2.0)]);
        let out = dir.path().join("out");
        let options = CompositorOptions::default();
        let font = LegendFont::embedded().unwrap();
        let cancel = AtomicBool::new(false);
        let seen = Cell::new(0);
        let hook = |_: &FieldDescriptor| seen.set(seen.get() + 1);

        let status = SampleAggregator::new(&out, &options, &font, &cancel)
            .with_field_hook(&hook)
            .run(&sample)
            .unwrap();
        assert_eq!(seen.get(), 2);
        match status {
            SampleStatus::Done(summary) => assert_eq!(summary.classified_pixel_count, 32),
            SampleStatus::Skipped => panic!("nothing existed yet"),
        }
        assert!(OutputPaths::for_sample(&out, "core").mosaic.exists());
    }

    #[test]
    fn cancel_between_fields_writes_nothing() {
        let (dir, sample) = project(&[("a", 2.0), ("b", -2.0)]);
        let out = dir.path().join("out");
        let options = CompositorOptions {
            create_thumbnail: true,
            ..CompositorOptions::default()
        };
        let font = LegendFont::embedded().unwrap();
        let cancel = AtomicBool::new(false);
        let seen = Cell::new(0);
        let hook = |_: &FieldDescriptor| {
            seen.set(seen.get() + 1);
            cancel.store(true, Ordering::SeqCst);
        };

        let err = SampleAggregator::new(&out, &options, &font, &cancel)
            .with_field_hook(&hook)
            .run(&sample)
            .unwrap_err();
        assert!(matches!(err, CompositeError::Cancelled { .. }));
        assert_eq!(seen.get(), 1);
        assert_no_outputs(&OutputPaths::for_sample(&out, "core"));
    }

    #[test]
    fn cancel_after_last_field_stops_before_flushing() {
        let (dir, sample) = project(&[("a", 2.0)]);
        let out = dir.path().join("out");
        let options = CompositorOptions {
            create_thumbnail: true,
            ..CompositorOptions::default()
        };
        let font = LegendFont::embedded().unwrap();
        let cancel = AtomicBool::new(false);
        let hook = |_: &FieldDescriptor| cancel.store(true, Ordering::SeqCst);

        let err = SampleAggregator::new(&out, &options, &font, &cancel)
            .with_field_hook(&hook)
            .run(&sample)
            .unwrap_err();
        assert!(matches!(err, CompositeError::Cancelled { .. }));
        assert_no_outputs(&OutputPaths::for_sample(&out, "core"));
    }

    #[test]
    fn output_names_follow_the_sample() {
        let p = OutputPaths::for_sample(Path::new("out"), "Core 12");
        assert_eq!(p.mosaic, Path::new("out/Core 12.png"));
        assert_eq!(p.thumbnail, Path::new("out/Core 12.thumbnail.png"));
        assert_eq!(p.bse, Path::new("out/Core 12_bse.png"));
        assert_eq!(p.id_grid, Path::new("out/Core 12.csv.gz"));
    }

    #[test]
    fn thumbnails_shrink_to_fit_and_keep_aspect() {
        assert_eq!(thumbnail_dims(120, 80), (120, 80));
        assert_eq!(thumbnail_dims(600, 300), (300, 150));
        assert_eq!(thumbnail_dims(300, 1200), (75, 300));
        assert_eq!(thumbnail_dims(3000, 1), (300, 1));
    }

    #[test]
    fn thumbnail_crops_to_inclusive_bounds() {
        let mut mosaic = RgbImage::from_pixel(50, 40, Rgb([255, 255, 255]));
        for y in 10..=19 {
            for x in 5..=24 {
                mosaic.put_pixel(x, y, Rgb([1, 2, 3]));
            }
        }
        let bounds = BoundingBox {
            min_x: 5,
            min_y: 10,
            max_x: 24,
            max_y: 19,
        };
        let thumb = thumbnail(&mosaic, bounds);
        assert_eq!(thumb.dimensions(), (20, 10));
        assert!(thumb.pixels().all(|p| *p == Rgb([1, 2, 3])));
    }
}
