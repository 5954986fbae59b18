//! Sample manifest handed over by the metadata loader.
//!
//! Survey XML is parsed elsewhere; this crate only consumes the resulting
//! JSON description of each sample, its fields and its phase metadata file.
//! Relative paths are resolved against the manifest's directory.
use crate::error::Result;
use crate::geometry::{SampleDimensions, SampleGeometry, SampleShape, TileDims};
use crate::image::TilePaths;
use nalgebra::Vector2;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Deserialize)]
pub struct FieldRecord {
    pub name: String,
    /// Offset of the tile centre from the sample centre, microns.
    pub x_um: f64,
    pub y_um: f64,
    #[serde(default)]
    pub classification: Option<PathBuf>,
    #[serde(default)]
    pub mask: Option<PathBuf>,
    #[serde(default)]
    pub bse: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SampleManifest {
    pub sample_id: String,
    pub sample_name: String,
    pub phase_table_source: PathBuf,
    /// Directory holding one sub-directory of tiles per field.
    #[serde(default)]
    pub tile_root: Option<PathBuf>,
    #[serde(default)]
    pub fields: Vec<FieldRecord>,
    pub shape: String,
    #[serde(default)]
    pub dimensions_um: SampleDimensions,
    pub view_field_um: f64,
    pub tile_width_px: usize,
    pub tile_height_px: usize,
}

/// A field placed on the sample canvas.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub pixel_offset: Vector2<i64>,
    pub tiles: TilePaths,
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    samples: Vec<SampleManifest>,
}

impl SampleManifest {
    pub fn tile_dims(&self) -> TileDims {
        TileDims::new(self.tile_width_px, self.tile_height_px)
    }

    pub fn geometry(&self) -> Result<SampleGeometry> {
        let shape = SampleShape::parse(&self.sample_name, &self.shape)?;
        SampleGeometry::resolve(
            &self.sample_name,
            shape,
            &self.dimensions_um,
            self.view_field_um,
            self.tile_dims(),
        )
    }

    /// Places every field, in manifest order.
    pub fn field_descriptors(&self, geometry: &SampleGeometry) -> Vec<FieldDescriptor> {
        self.fields
            .iter()
            .map(|field| {
                let dir = match &self.tile_root {
                    Some(root) => root.join(&field.name),
                    None => PathBuf::from(&field.name),
                };
                let defaults = TilePaths::in_dir(&dir);
                FieldDescriptor {
                    name: field.name.clone(),
                    pixel_offset: geometry.field_offset(Vector2::new(field.x_um, field.y_um)),
                    tiles: TilePaths {
                        classification: field.classification.clone().unwrap_or(defaults.classification),
                        mask: field.mask.clone().unwrap_or(defaults.mask),
                        bse: field.bse.clone().unwrap_or(defaults.bse),
                    },
                }
            })
            .collect()
    }

    fn rebase(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        rebase(&mut self.phase_table_source);
        match &mut self.tile_root {
            Some(root) => rebase(root),
            None => self.tile_root = Some(base.to_path_buf()),
        }
        for field in &mut self.fields {
            for path in [&mut field.classification, &mut field.mask, &mut field.bse]
                .into_iter()
                .flatten()
            {
                rebase(path);
            }
        }
    }
}

pub fn load_manifest(path: &Path) -> std::result::Result<Vec<SampleManifest>, String> {
    let data = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read manifest {}: {e}", path.display()))?;
    let file: ManifestFile = serde_json::from_str(&data)
        .map_err(|e| format!("Failed to parse manifest {}: {e}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    Ok(file
        .samples
        .into_iter()
        .map(|mut sample| {
            sample.rebase(base);
            sample
        })
        .collect())
}
