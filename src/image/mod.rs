pub mod io;
pub mod raster;
pub mod tiles;

pub use self::raster::{Gray16Canvas, IdGrid, Raster, RgbCanvas};
pub use self::tiles::{load_field_tiles, FieldTiles, TileError, TileKind, TileLoadResult, TilePaths};
