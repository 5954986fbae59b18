//! Loading of per-field tiles.
//!
//! A field needs a classification tile and a mask tile; the backscatter tile
//! is optional. Failures are returned as data so the compositor can skip the
//! field and carry on with the rest of the sample.
use super::raster::Raster;
use crate::geometry::TileDims;
use image::DynamicImage;
use std::fmt;
use std::path::{Path, PathBuf};

pub const CLASSIFICATION_FILE: &str = "phases.tif";
pub const MASK_FILE: &str = "mask.png";
pub const BSE_FILE: &str = "bse.png";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TilePaths {
    pub classification: PathBuf,
    pub mask: PathBuf,
    pub bse: PathBuf,
}

impl TilePaths {
    /// Conventional layout: `<dir>/phases.tif`, `<dir>/mask.png`, `<dir>/bse.png`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            classification: dir.join(CLASSIFICATION_FILE),
            mask: dir.join(MASK_FILE),
            bse: dir.join(BSE_FILE),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileKind {
    Classification,
    Mask,
    Bse,
}

impl fmt::Display for TileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TileKind::Classification => "classification",
            TileKind::Mask => "mask",
            TileKind::Bse => "bse",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TileError {
    pub kind: TileKind,
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for TileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} tile {}: {}", self.kind, self.path.display(), self.reason)
    }
}

/// Decoded tiles of one field, all at the declared tile size.
#[derive(Clone, Debug)]
pub struct FieldTiles {
    pub classification: Raster<u16>,
    pub mask: Raster<u8>,
    pub bse: Option<Raster<u16>>,
    /// Set when a backscatter tile was requested but could not be used.
    pub bse_error: Option<TileError>,
}

#[derive(Clone, Debug)]
pub enum TileLoadResult {
    Loaded(FieldTiles),
    /// Classification and/or mask unusable; the field contributes nothing.
    Failed(Vec<TileError>),
}

pub fn load_field_tiles(paths: &TilePaths, dims: TileDims, want_bse: bool) -> TileLoadResult {
    let classification = load_tile(TileKind::Classification, &paths.classification, dims, raw_u16);
    let mask = load_tile(TileKind::Mask, &paths.mask, dims, mask_flags);

    let (classification, mask) = match (classification, mask) {
        (Ok(c), Ok(m)) => (c, m),
        (c, m) => {
            let errors = [c.err(), m.err()].into_iter().flatten().collect();
            return TileLoadResult::Failed(errors);
        }
    };

    let (bse, bse_error) = if want_bse {
        match load_tile(TileKind::Bse, &paths.bse, dims, raw_u16) {
            Ok(b) => (Some(b), None),
            Err(e) => (None, Some(e)),
        }
    } else {
        (None, None)
    };

    TileLoadResult::Loaded(FieldTiles {
        classification,
        mask,
        bse,
        bse_error,
    })
}

fn load_tile<P, F>(kind: TileKind, path: &Path, dims: TileDims, decode: F) -> Result<Raster<P>, TileError>
where
    P: Copy,
    F: FnOnce(DynamicImage) -> Option<Raster<P>>,
{
    let fail = |reason: String| TileError {
        kind,
        path: path.to_path_buf(),
        reason,
    };
    let img = image::open(path).map_err(|e| fail(e.to_string()))?;
    let (w, h) = (img.width() as usize, img.height() as usize);
    if (w, h) != (dims.width, dims.height) {
        return Err(fail(format!(
            "expected {}x{} pixels, found {w}x{h}",
            dims.width, dims.height
        )));
    }
    decode(img).ok_or_else(|| fail("decoded buffer has unexpected length".to_string()))
}

/// Keeps stored sample values as-is; 8-bit sources are widened, not rescaled.
fn raw_u16(img: DynamicImage) -> Option<Raster<u16>> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let data: Vec<u16> = match img {
        DynamicImage::ImageLuma16(buf) => buf.into_raw(),
        DynamicImage::ImageLuma8(buf) => buf.into_raw().into_iter().map(u16::from).collect(),
        wide @ (DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_)) => wide.into_luma16().into_raw(),
        other => other.into_luma8().into_raw().into_iter().map(u16::from).collect(),
    };
    Raster::from_vec(w, h, data)
}

/// Reduces a mask to 0/1, testing non-zero at the stored sample width.
fn mask_flags(img: DynamicImage) -> Option<Raster<u8>> {
    let raw = raw_u16(img)?;
    let (w, h) = raw.dims();
    let flags = raw.into_vec().into_iter().map(|v| u8::from(v != 0)).collect();
    Raster::from_vec(w, h, flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma};

    fn write_gray8(path: &Path, w: u32, h: u32, f: impl Fn(u32, u32) -> u8) {
        GrayImage::from_fn(w, h, |x, y| Luma([f(x, y)])).save(path).unwrap();
    }

    #[test]
    fn loads_conventional_tile_set() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TilePaths::in_dir(dir.path());
        write_gray8(&paths.classification, 4, 3, |x, _| x as u8);
        write_gray8(&paths.mask, 4, 3, |_, y| (y > 0) as u8 * 255);
        ImageBuffer::<Luma<u16>, Vec<u16>>::from_fn(4, 3, |_, _| Luma([40_000]))
            .save(&paths.bse)
            .unwrap();

        match load_field_tiles(&paths, TileDims::new(4, 3), true) {
            TileLoadResult::Loaded(tiles) => {
                assert_eq!(tiles.classification.get(3, 0), 3);
                assert_eq!(tiles.mask.get(0, 0), 0);
                assert_eq!(tiles.mask.get(0, 2), 1);
                assert_eq!(tiles.bse.as_ref().map(|b| b.get(1, 1)), Some(40_000));
                assert!(tiles.bse_error.is_none());
            }
            TileLoadResult::Failed(errs) => panic!("unexpected failure: {errs:?}"),
        }
    }

    #[test]
    fn missing_mask_fails_the_field() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TilePaths::in_dir(dir.path());
        write_gray8(&paths.classification, 2, 2, |_, _| 1);

        match load_field_tiles(&paths, TileDims::new(2, 2), false) {
            TileLoadResult::Failed(errs) => {
                assert_eq!(errs.len(), 1);
                assert_eq!(errs[0].kind, TileKind::Mask);
            }
            TileLoadResult::Loaded(_) => panic!("mask is missing"),
        }
    }

    #[test]
    fn missing_bse_keeps_the_field() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TilePaths::in_dir(dir.path());
        write_gray8(&paths.classification, 2, 2, |_, _| 1);
        write_gray8(&paths.mask, 2, 2, |_, _| 1);

        match load_field_tiles(&paths, TileDims::new(2, 2), true) {
            TileLoadResult::Loaded(tiles) => {
                assert!(tiles.bse.is_none());
                assert_eq!(tiles.bse_error.map(|e| e.kind), Some(TileKind::Bse));
            }
            TileLoadResult::Failed(errs) => panic!("unexpected failure: {errs:?}"),
        }
    }

    #[test]
    fn wrong_tile_size_fails_the_field() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TilePaths::in_dir(dir.path());
        write_gray8(&paths.classification, 3, 2, |_, _| 1);
        write_gray8(&paths.mask, 2, 2, |_, _| 1);

        match load_field_tiles(&paths, TileDims::new(2, 2), false) {
            TileLoadResult::Failed(errs) => {
                assert_eq!(errs[0].kind, TileKind::Classification);
                assert!(errs[0].reason.contains("expected 2x2"));
            }
            TileLoadResult::Loaded(_) => panic!("dimensions differ"),
        }
    }

    #[test]
    fn sixteen_bit_binary_mask_keeps_its_ones() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TilePaths::in_dir(dir.path());
        let write16 = |path: &Path, f: fn(u32, u32) -> u16| {
            ImageBuffer::<Luma<u16>, Vec<u16>>::from_fn(2, 2, |x, y| Luma([f(x, y)]))
                .save(path)
                .unwrap();
        };
        write16(&paths.classification, |_, _| 1);
        write16(&paths.mask, |x, _| if x == 0 { 1 } else { 0 });

        match load_field_tiles(&paths, TileDims::new(2, 2), false) {
            TileLoadResult::Loaded(tiles) => {
                assert_eq!(tiles.mask.get(0, 0), 1);
                assert_eq!(tiles.mask.get(0, 1), 1);
                assert_eq!(tiles.mask.get(1, 0), 0);
                assert_eq!(tiles.classification.get(1, 1), 1);
            }
            TileLoadResult::Failed(errs) => panic!("unexpected failure: {errs:?}"),
        }
    }
}
