//! Error taxonomy shared by the compositing pipeline.
//!
//! Configuration errors abort a whole run, everything else is scoped to one
//! sample. Per-field tile failures never surface here: they are reported as a
//! [`TileLoadResult`](crate::image::tiles::TileLoadResult) and recovered by the
//! compositor.
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CompositeError>;

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("sample {sample}: unsupported sample shape {shape:?}")]
    UnsupportedShape { sample: String, shape: String },

    #[error("sample {sample}: invalid geometry: {reason}")]
    InvalidGeometry { sample: String, reason: String },

    #[error("sample {sample}: phase metadata file {} was not found", path.display())]
    PhaseMetadataMissing { sample: String, path: PathBuf },

    #[error("invalid phase metadata in {}: {reason}", path.display())]
    PhaseMetadata { path: PathBuf, reason: String },

    #[error(
        "sample {sample}: field {field} exceeded {limit} pixels with phase ids missing from {} (last id {phase_id})",
        phases_path.display()
    )]
    PhaseTableExhausted {
        sample: String,
        field: String,
        phase_id: u32,
        limit: u64,
        phases_path: PathBuf,
    },

    #[error(
        "sample {sample}: field {field} ({}) places pixel ({x}, {y}) outside the {width}x{height} canvas",
        tile.display()
    )]
    OutOfCanvas {
        sample: String,
        field: String,
        tile: PathBuf,
        x: i64,
        y: i64,
        width: usize,
        height: usize,
    },

    #[error("sample {sample}: cancelled")]
    Cancelled { sample: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("image error on {}: {source}", path.display())]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("legend font could not be loaded: {0}")]
    InvalidFont(String),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

impl CompositeError {
    /// Errors that make the whole run meaningless rather than a single sample.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CompositeError::UnsupportedShape { .. }
                | CompositeError::InvalidGeometry { .. }
                | CompositeError::InvalidFont(_)
                | CompositeError::WorkerPool(_)
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CompositeError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        CompositeError::Image {
            path: path.into(),
            source,
        }
    }
}
