//! Owned dense rasters used for tiles and output canvases.
//!
//! Storage is row-major with `stride == width`. Each canvas is owned by the
//! worker compositing its sample and dropped once the outputs are flushed.
use image::{ImageBuffer, Luma, Rgb, RgbImage};

#[derive(Clone, Debug, PartialEq)]
pub struct Raster<P> {
    width: usize,
    height: usize,
    stride: usize,
    data: Vec<P>,
}

/// Mosaic canvas, one RGB triple per pixel.
pub type RgbCanvas = Raster<Rgb<u8>>;
/// 16-bit backscatter intensity canvas.
pub type Gray16Canvas = Raster<u16>;

impl<P: Copy> Raster<P> {
    /// Raster of `width × height` filled with `value`.
    pub fn filled(width: usize, height: usize, value: P) -> Self {
        Self {
            width,
            height,
            stride: width,
            data: vec![value; width * height],
        }
    }

    /// Wraps row-major pixels. Returns `None` when the length does not match.
    pub fn from_vec(width: usize, height: usize, data: Vec<P>) -> Option<Self> {
        (data.len() == width * height).then_some(Self {
            width,
            height,
            stride: width,
            data,
        })
    }

    #[inline]
    fn idx(&self, x: usize, y: usize) -> usize {
        y * self.stride + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> P {
        self.data[self.idx(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: P) {
        let i = self.idx(x, y);
        self.data[i] = value;
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[P] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    /// Rows top to bottom.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[P]> + '_ {
        (0..self.height).map(move |y| self.row(y))
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn into_vec(self) -> Vec<P> {
        self.data
    }
}

impl RgbCanvas {
    /// Hands the pixels to `image` for drawing and encoding.
    pub fn into_rgb_image(self) -> RgbImage {
        let (w, h) = (self.width as u32, self.height as u32);
        let bytes: Vec<u8> = self.data.into_iter().flat_map(|px| px.0).collect();
        RgbImage::from_raw(w, h, bytes).unwrap_or_else(|| RgbImage::new(w, h))
    }
}

impl Gray16Canvas {
    pub fn into_gray16_image(self) -> ImageBuffer<Luma<u16>, Vec<u16>> {
        let (w, h) = (self.width as u32, self.height as u32);
        ImageBuffer::from_raw(w, h, self.data).unwrap_or_else(|| ImageBuffer::new(w, h))
    }
}

/// Grid of raw phase ids addressed `(row, col)`, numeric-array style.
///
/// Unwritten cells hold [`IdGrid::EMPTY`].
#[derive(Clone, Debug, PartialEq)]
pub struct IdGrid {
    cells: Raster<i32>,
}

impl IdGrid {
    pub const EMPTY: i32 = -1;

    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            cells: Raster::filled(cols, rows, Self::EMPTY),
        }
    }

    pub fn rows(&self) -> usize {
        self.cells.height()
    }

    pub fn cols(&self) -> usize {
        self.cells.width()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> i32 {
        self.cells.get(col, row)
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, id: i32) {
        self.cells.set(col, row, id);
    }

    pub fn view(&self) -> &Raster<i32> {
        &self.cells
    }
}
