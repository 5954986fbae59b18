//! On-disk projects for end-to-end runs: phase metadata, field tiles and a
//! manifest, all under one temporary directory.
#![allow(dead_code)]

use image::{GrayImage, ImageBuffer, Luma};
use sample_compositor::CompositorOptions;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const RED: [u8; 3] = [255, 0, 0];
pub const GREEN: [u8; 3] = [0, 255, 0];
pub const WHITE: [u8; 3] = [255, 255, 255];

pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            dir: tempfile::tempdir().expect("temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn output_root(&self) -> PathBuf {
        self.root().join("out")
    }

    /// Quartz (1, red), Feldspar (2, green) and the unclassified phase (0).
    pub fn write_default_phases(&self, file: &str) -> PathBuf {
        self.write_phases(
            file,
            json!([
                {"id": 0, "name": "[Unclassified]", "color": "#000000"},
                {"id": 1, "name": "Quartz", "color": "#ff0000", "mass": 60.08},
                {"id": 2, "name": "Feldspar", "color": "#00ff00"}
            ]),
        )
    }

    pub fn write_phases(&self, file: &str, phases: Value) -> PathBuf {
        let path = self.root().join(file);
        fs::write(&path, phases.to_string()).expect("write phases");
        path
    }

    /// Writes `phases.tif`, `mask.png` and optionally `bse.png` for one field.
    pub fn write_field(
        &self,
        sample: &str,
        field: &str,
        (w, h): (u32, u32),
        class: impl Fn(u32, u32) -> u16,
        mask: impl Fn(u32, u32) -> bool,
        bse: Option<&dyn Fn(u32, u32) -> u16>,
    ) {
        let dir = self.root().join("tiles").join(sample).join(field);
        fs::create_dir_all(&dir).expect("field dir");
        ImageBuffer::<Luma<u16>, Vec<u16>>::from_fn(w, h, |x, y| Luma([class(x, y)]))
            .save(dir.join("phases.tif"))
            .expect("classification tile");
        GrayImage::from_fn(w, h, |x, y| Luma([if mask(x, y) { 255 } else { 0 }]))
            .save(dir.join("mask.png"))
            .expect("mask tile");
        if let Some(bse) = bse {
            ImageBuffer::<Luma<u16>, Vec<u16>>::from_fn(w, h, |x, y| Luma([bse(x, y)]))
                .save(dir.join("bse.png"))
                .expect("bse tile");
        }
    }

    pub fn write_manifest(&self, samples: Vec<Value>) -> PathBuf {
        let path = self.root().join("samples.json");
        fs::write(&path, json!({ "samples": samples }).to_string()).expect("write manifest");
        path
    }
}

/// Rectangle sample whose tiles live under `tiles/<name>/<field>/`.
pub fn rectangle_sample(
    name: &str,
    phases_file: &str,
    (width_um, height_um): (f64, f64),
    view_field_um: f64,
    (tile_w, tile_h): (u32, u32),
    fields: &[(&str, f64, f64)],
) -> Value {
    let fields: Vec<Value> = fields
        .iter()
        .map(|(field, x, y)| json!({"name": field, "x_um": x, "y_um": y}))
        .collect();
    json!({
        "sample_id": format!("id-{name}"),
        "sample_name": name,
        "phase_table_source": phases_file,
        "tile_root": format!("tiles/{name}"),
        "fields": fields,
        "shape": "Rectangle",
        "dimensions_um": {"width": width_um, "height": height_um},
        "view_field_um": view_field_um,
        "tile_width_px": tile_w,
        "tile_height_px": tile_h
    })
}

/// A 20x10 px sample built from two 10x10 fields at x = +5 um (left half)
/// and x = -5 um (right half).
pub fn two_field_sample(name: &str, phases_file: &str) -> Value {
    rectangle_sample(
        name,
        phases_file,
        (20.0, 10.0),
        10.0,
        (10, 10),
        &[("left", 5.0, 0.0), ("right", -5.0, 0.0)],
    )
}

/// Left field all Quartz; right field Feldspar in its left half and
/// unclassified elsewhere. Every pixel is masked in.
pub fn write_two_fields(project: &Project, sample: &str) {
    let bse = |x: u32, y: u32| (1000 + 10 * y + x) as u16;
    project.write_field(sample, "left", (10, 10), |_, _| 1, |_, _| true, Some(&bse));
    project.write_field(
        sample,
        "right",
        (10, 10),
        |x, _| if x < 5 { 2 } else { 0 },
        |_, _| true,
        Some(&bse),
    );
}

pub fn options() -> CompositorOptions {
    CompositorOptions {
        create_thumbnail: true,
        ..CompositorOptions::default()
    }
}
