//! Sample scheduler: runs the aggregator for every sample on a bounded worker
//! pool.
//!
//! Each sample is one task and owns its phase table and canvases outright, so
//! workers share nothing but the read-only options, the legend font and the
//! cancellation flag. Samples fail independently. Only configuration errors,
//! found by checking every sample's geometry before dispatch, abort the run.
use crate::aggregator::{SampleAggregator, SampleStatus, SampleSummary};
use crate::config::CompositorOptions;
use crate::error::{CompositeError, Result};
use crate::legend::LegendFont;
use crate::manifest::SampleManifest;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// How a sample left the run. A sample is pending until a worker picks it up
/// and running until its aggregator returns; only the end state is recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleState {
    Done,
    Skipped,
    Failed,
    Cancelled,
}

#[derive(Debug)]
pub struct SampleOutcome {
    pub sample_name: String,
    pub state: SampleState,
    pub summary: Option<Box<SampleSummary>>,
    pub error: Option<CompositeError>,
}

impl SampleOutcome {
    fn from_result(sample_name: &str, result: Result<SampleStatus>) -> Self {
        let (state, summary, error) = match result {
            Ok(SampleStatus::Done(summary)) => (SampleState::Done, Some(summary), None),
            Ok(SampleStatus::Skipped) => (SampleState::Skipped, None, None),
            Err(err @ CompositeError::Cancelled { .. }) => (SampleState::Cancelled, None, Some(err)),
            Err(err) => (SampleState::Failed, None, Some(err)),
        };
        Self {
            sample_name: sample_name.to_string(),
            state,
            summary,
            error,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<SampleOutcome>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn count(&self, state: SampleState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    pub fn outcome(&self, sample_name: &str) -> Option<&SampleOutcome> {
        self.outcomes.iter().find(|o| o.sample_name == sample_name)
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o.state, SampleState::Done | SampleState::Skipped))
    }
}

pub struct SampleScheduler {
    output_root: PathBuf,
    options: CompositorOptions,
    workers: usize,
    font: LegendFont,
    cancel: Arc<AtomicBool>,
}

impl SampleScheduler {
    pub fn new(output_root: PathBuf, options: CompositorOptions, workers: usize) -> Result<Self> {
        Ok(Self {
            output_root,
            options,
            workers: workers.max(1),
            font: LegendFont::embedded()?,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag observed before each sample and between fields. Setting it stops
    /// dispatch; samples already flushed keep their outputs.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn run(&self, samples: &[SampleManifest]) -> Result<RunSummary> {
        let start = Instant::now();
        for sample in samples {
            sample.geometry()?;
        }
        info!(
            "Compositing {} samples into {} with {} workers",
            samples.len(),
            self.output_root.display(),
            self.workers
        );

        let outcomes = self.dispatch(samples)?;
        let summary = RunSummary {
            outcomes,
            elapsed: start.elapsed(),
        };
        if self.cancel.load(Ordering::SeqCst) {
            warn!("Run interrupted; {} samples cancelled", summary.count(SampleState::Cancelled));
        }
        info!(
            "Done: {}, skipped: {}, failed: {}, cancelled: {}",
            summary.count(SampleState::Done),
            summary.count(SampleState::Skipped),
            summary.count(SampleState::Failed),
            summary.count(SampleState::Cancelled)
        );
        info!("Finished compositing in {}", format_elapsed(summary.elapsed));
        Ok(summary)
    }

    #[cfg(feature = "parallel")]
    fn dispatch(&self, samples: &[SampleManifest]) -> Result<Vec<SampleOutcome>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("compositor-{i}"))
            .build()
            .map_err(|e| CompositeError::WorkerPool(e.to_string()))?;
        Ok(pool.install(|| {
            samples
                .par_iter()
                .with_max_len(1)
                .map(|sample| self.run_sample(sample))
                .collect()
        }))
    }

    #[cfg(not(feature = "parallel"))]
    fn dispatch(&self, samples: &[SampleManifest]) -> Result<Vec<SampleOutcome>> {
        Ok(samples.iter().map(|sample| self.run_sample(sample)).collect())
    }

    fn run_sample(&self, sample: &SampleManifest) -> SampleOutcome {
        let name = sample.sample_name.as_str();
        if self.cancel.load(Ordering::SeqCst) {
            return SampleOutcome::from_result(
                name,
                Err(CompositeError::Cancelled {
                    sample: name.to_string(),
                }),
            );
        }
        let aggregator = SampleAggregator::new(&self.output_root, &self.options, &self.font, &self.cancel);
        let outcome = SampleOutcome::from_result(name, aggregator.run(sample));
        match (&outcome.state, &outcome.error) {
            (SampleState::Cancelled, _) => info!("Sample {name} cancelled"),
            (_, Some(err)) => error!("Sample {name} failed: {err}"),
            _ => {}
        }
        outcome
    }
}

/// `HH:MM:SS.ss`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let hours = (secs / 3600.0).floor();
    let minutes = ((secs - hours * 3600.0) / 60.0).floor();
    let seconds = secs - hours * 3600.0 - minutes * 60.0;
    format!("{:02}:{:02}:{:05.2}", hours as u64, minutes as u64, seconds)
}
