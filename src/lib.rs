#![doc = include_str!("../README.md")]

// Pipeline stages, in data-flow order.
pub mod geometry;
pub mod phases;
pub mod compositor;
pub mod legend;
pub mod aggregator;
pub mod scheduler;

// Inputs, outputs and shared plumbing.
pub mod config;
pub mod error;
pub mod image;
pub mod manifest;

// --- High-level re-exports -------------------------------------------------

pub use crate::aggregator::{OutputPaths, SampleAggregator, SampleStatus, SampleSummary};
pub use crate::config::{load_config, CompositorOptions, RunConfig};
pub use crate::error::{CompositeError, Result};
pub use crate::manifest::{load_manifest, SampleManifest};
pub use crate::scheduler::{RunSummary, SampleOutcome, SampleScheduler, SampleState};

// --- Prelude ---------------------------------------------------------------

/// Everything needed to drive a run from code.
///
/// ```no_run
/// use sample_compositor::prelude::*;
/// use std::path::Path;
///
/// # fn main() -> std::result::Result<(), String> {
/// let config = load_config(Path::new("run.json"))?;
/// let samples = load_manifest(&config.manifest)?;
/// let scheduler = SampleScheduler::new(
///     config.output_root.clone(),
///     config.options.clone(),
///     config.worker_count(),
/// )
/// .map_err(|e| e.to_string())?;
/// let summary = scheduler.run(&samples).map_err(|e| e.to_string())?;
/// println!("done={}", summary.count(SampleState::Done));
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::{
        load_config, load_manifest, CompositeError, CompositorOptions, RunConfig, RunSummary,
        SampleManifest, SampleScheduler, SampleState,
    };
}
