//! Output writers.
//!
//! - `save_png_atomic`: encode a `DynamicImage` as PNG next to its final path,
//!   then rename it into place.
//! - `write_id_grid_csv_gz`: gzip-compressed CSV of phase ids, one line per row.
//!
//! A crash or interrupt mid-write leaves only a `*.partial` sibling, never a
//! truncated file under the final name.
use super::raster::IdGrid;
use crate::error::{CompositeError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use image::{DynamicImage, ImageFormat};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub fn save_png_atomic(image: &DynamicImage, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let partial = partial_path(path);
    image
        .save_with_format(&partial, ImageFormat::Png)
        .map_err(|e| {
            let _ = fs::remove_file(&partial);
            CompositeError::image(path, e)
        })?;
    commit(&partial, path)
}

pub fn write_id_grid_csv_gz(grid: &IdGrid, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let partial = partial_path(path);
    write_csv_gz(grid, &partial).map_err(|e| {
        let _ = fs::remove_file(&partial);
        CompositeError::io(path, e)
    })?;
    commit(&partial, path)
}

fn write_csv_gz(grid: &IdGrid, path: &Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut line = String::new();
    for row in grid.view().rows() {
        line.clear();
        for (i, id) in row.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push_str(&id.to_string());
        }
        line.push('\n');
        encoder.write_all(line.as_bytes())?;
    }
    encoder.finish()?.flush()
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}

fn commit(partial: &Path, path: &Path) -> Result<()> {
    fs::rename(partial, path).map_err(|e| {
        let _ = fs::remove_file(partial);
        CompositeError::io(path, e)
    })
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| CompositeError::io(parent, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use image::{Rgb, RgbImage};
    use std::io::Read;

    #[test]
    fn id_grid_round_trips_as_csv_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("s.csv.gz");
        let mut grid = IdGrid::new(2, 3);
        grid.set(0, 1, 4);
        grid.set(1, 2, 17);
        write_id_grid_csv_gz(&grid, &path).unwrap();

        let mut text = String::new();
        GzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "-1,4,-1\n-1,-1,17\n");
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn png_lands_only_at_final_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.png");
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, Rgb([9, 8, 7])));
        save_png_atomic(&img, &path).unwrap();

        let back = image::open(&path).unwrap().into_rgb8();
        assert_eq!(back.dimensions(), (3, 2));
        assert_eq!(back.get_pixel(2, 1), &Rgb([9, 8, 7]));
        assert!(!partial_path(&path).exists());
    }
}
