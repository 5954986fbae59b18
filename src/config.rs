//! Run configuration.
//!
//! A run is described by a small JSON file:
//!
//! ```json
//! {
//!   "manifest": "project/samples.json",
//!   "output_root": "out",
//!   "workers": 4,
//!   "options": { "create_thumbnail": true, "generate_bse": false }
//! }
//! ```
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Switches recognised by the compositor. Fixed for the duration of a run.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CompositorOptions {
    /// Drop the unclassified/background phase from compositing and the legend.
    pub exclude_unclassified: bool,
    /// Keep legend rows below 0.01 %.
    pub show_low_val: bool,
    pub create_thumbnail: bool,
    pub generate_id_array: bool,
    pub generate_bse: bool,
}

impl Default for CompositorOptions {
    fn default() -> Self {
        Self {
            exclude_unclassified: true,
            show_low_val: true,
            create_thumbnail: false,
            generate_id_array: true,
            generate_bse: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RunConfig {
    pub manifest: PathBuf,
    pub output_root: PathBuf,
    /// Worker threads; defaults to the available parallelism.
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub options: CompositorOptions,
}

impl RunConfig {
    pub fn worker_count(&self) -> usize {
        self.workers
            .filter(|&n| n > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
    }
}

pub fn load_config(path: &Path) -> Result<RunConfig, String> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    let config: RunConfig = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))?;
    Ok(config)
}
