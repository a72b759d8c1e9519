use crate::skiplog::SkipLog;
use crate::transcode::{process_file, ConversionOptions, Transcoder, UnitOutcome};
use anyhow::{Context, Result};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use log::{error, info};
use rayon::prelude::*;
use std::path::PathBuf;

const PROGRESS_BAR_CHARS: &str = "=>-";
const PROGRESS_BAR_TEMPLATE: &str =
    "[{elapsed_precise}] {bar:60.cyan/blue} {pos}/{len} {percent}% {msg}";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BatchResult {
    /// Files actually converted.
    pub processed: usize,
    /// Files left untouched (skip log, already conforming, 4K/HDR).
    pub skipped: usize,
    /// Units whose external tool or finalize step failed.
    pub failed: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct BatchOptions {
    /// Worker count. 1 runs the sequential mode; 0 spawns one worker per
    /// file, reproducing the original unbounded fan-out. Anything above 1 is
    /// a bounded pool.
    pub concurrency: usize,
    /// Continue past per-file failures instead of aborting the batch. The
    /// concurrent modes always keep going; in-flight work is never aborted.
    pub keep_going: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            keep_going: false,
        }
    }
}

/// Run the decide-and-execute pipeline over an already-filtered, sorted file
/// list and report per-unit outcomes in aggregate.
pub fn run(
    files: &[PathBuf],
    batch: &BatchOptions,
    options: &ConversionOptions,
    transcoder: &dyn Transcoder,
    skiplog: Option<&SkipLog>,
) -> Result<BatchResult> {
    if files.is_empty() {
        info!("No candidate files found");
        return Ok(BatchResult::default());
    }
    info!(
        "Processing {} files with concurrency {}",
        files.len(),
        describe_concurrency(batch.concurrency)
    );

    let result = if batch.concurrency == 1 {
        run_sequential(files, batch, options, transcoder, skiplog)?
    } else {
        run_pooled(files, batch, options, transcoder, skiplog)?
    };

    info!(
        "Batch complete: {} converted, {} skipped, {} failed",
        result.processed, result.skipped, result.failed
    );
    Ok(result)
}

fn run_sequential(
    files: &[PathBuf],
    batch: &BatchOptions,
    options: &ConversionOptions,
    transcoder: &dyn Transcoder,
    skiplog: Option<&SkipLog>,
) -> Result<BatchResult> {
    let bar = progress_bar(files.len() as u64);
    let mut result = BatchResult::default();

    for file in files {
        bar.set_message(
            file.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        match process_file(file, options, transcoder, skiplog) {
            Ok(UnitOutcome::Converted { .. }) => result.processed += 1,
            Ok(UnitOutcome::Skipped { .. }) => result.skipped += 1,
            Err(err) if batch.keep_going => {
                error!("Failed to process '{}': {:#}", file.display(), err);
                result.failed += 1;
            }
            Err(err) => {
                // Fail-fast: surface the unit's error (and its external exit
                // code) as the batch's own.
                bar.abandon();
                return Err(err)
                    .with_context(|| format!("Aborting batch at '{}'", file.display()));
            }
        }
        bar.inc(1);
    }
    bar.finish_with_message("done");
    Ok(result)
}

fn run_pooled(
    files: &[PathBuf],
    batch: &BatchOptions,
    options: &ConversionOptions,
    transcoder: &dyn Transcoder,
    skiplog: Option<&SkipLog>,
) -> Result<BatchResult> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(pool_threads(batch.concurrency, files.len()))
        .build()
        .context("Failed to build conversion worker pool")?;

    let bar = progress_bar(files.len() as u64);
    let result = pool.install(|| {
        files
            .par_iter()
            .progress_with(bar)
            .map(|file| match process_file(file, options, transcoder, skiplog) {
                Ok(UnitOutcome::Converted { .. }) => BatchResult {
                    processed: 1,
                    ..BatchResult::default()
                },
                Ok(UnitOutcome::Skipped { .. }) => BatchResult {
                    skipped: 1,
                    ..BatchResult::default()
                },
                Err(err) => {
                    error!("Failed to process '{}': {:#}", file.display(), err);
                    BatchResult {
                        failed: 1,
                        ..BatchResult::default()
                    }
                }
            })
            .reduce(BatchResult::default, combine)
    });
    Ok(result)
}

fn combine(a: BatchResult, b: BatchResult) -> BatchResult {
    BatchResult {
        processed: a.processed + b.processed,
        skipped: a.skipped + b.skipped,
        failed: a.failed + b.failed,
    }
}

/// 0 means one worker per file. That reproduces the original scripts'
/// unbounded background fan-out and is just as unkind to the CPU and disks;
/// it exists as a documented escape hatch, not a recommendation.
fn pool_threads(concurrency: usize, file_count: usize) -> usize {
    if concurrency == 0 {
        file_count.max(1)
    } else {
        concurrency
    }
}

fn describe_concurrency(concurrency: usize) -> String {
    match concurrency {
        0 => "unlimited".to_string(),
        n => n.to_string(),
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    let style = ProgressStyle::with_template(PROGRESS_BAR_TEMPLATE)
        .expect("static progress template")
        .progress_chars(PROGRESS_BAR_CHARS);
    ProgressBar::new(len).with_style(style)
}
