use sample_compositor::scheduler::format_elapsed;
use sample_compositor::{load_config, load_manifest, SampleScheduler, SampleState};
use std::env;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let config_path = env::args().nth(1).ok_or_else(usage)?;
    let config = load_config(Path::new(&config_path))?;
    let samples = load_manifest(&config.manifest)?;

    let scheduler = SampleScheduler::new(
        config.output_root.clone(),
        config.options.clone(),
        config.worker_count(),
    )
    .map_err(|e| e.to_string())?;
    register_interrupts(scheduler.cancellation_flag())?;

    let summary = scheduler.run(&samples).map_err(|e| e.to_string())?;
    for outcome in &summary.outcomes {
        let detail = match (&outcome.summary, &outcome.error) {
            (Some(done), _) => format!(
                "{} classified px, {} phases, {:.1}s",
                done.classified_pixel_count,
                done.phases.len(),
                done.elapsed.as_secs_f64()
            ),
            (None, Some(err)) => err.to_string(),
            (None, None) => String::new(),
        };
        println!("{:<24} {:<9} {detail}", outcome.sample_name, state_label(outcome.state));
    }
    println!(
        "done={} skipped={} failed={} cancelled={} elapsed={}",
        summary.count(SampleState::Done),
        summary.count(SampleState::Skipped),
        summary.count(SampleState::Failed),
        summary.count(SampleState::Cancelled),
        format_elapsed(summary.elapsed)
    );
    if !summary.all_succeeded() {
        eprintln!("Some samples did not complete; rerun to retry them");
    }
    Ok(())
}

/// First SIGINT or SIGTERM raises the cancellation flag; a second SIGINT
/// exits at once.
#[cfg(unix)]
fn register_interrupts(flag: Arc<AtomicBool>) -> Result<(), String> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::flag;

    let fail = |e: std::io::Error| format!("Failed to register signal handler: {e}");
    flag::register_conditional_shutdown(SIGINT, 130, Arc::clone(&flag)).map_err(fail)?;
    flag::register(SIGINT, Arc::clone(&flag)).map_err(fail)?;
    flag::register(SIGTERM, flag).map_err(fail)?;
    Ok(())
}

#[cfg(not(unix))]
fn register_interrupts(_flag: Arc<AtomicBool>) -> Result<(), String> {
    Ok(())
}

fn state_label(state: SampleState) -> &'static str {
    match state {
        SampleState::Done => "done",
        SampleState::Skipped => "skipped",
        SampleState::Failed => "failed",
        SampleState::Cancelled => "cancelled",
    }
}

fn usage() -> String {
    "Usage: sample_compositor <run.json>".to_string()
}
