/*
Multi-file UCP runs on a fixed-size worker pool.
Jobs share nothing mutable; each one reports its own success or failure.
Jobs have no timeout, a job that never returns keeps `run_batch` waiting.
 */

use crate::{
    config::Settings,
    error::{Result, Stage, UrbanError},
    geo::projection::UtmTable,
    io::is_footprint_file,
    landscape::{LandscapeMetric, LandscapeRun},
    progress::ProgressSink,
    ucp::{
        pipeline::{file_stem, run_ucp_file},
        OutputLayout, UcpMetric,
    },
};
use polars::prelude::*;
use rayon::prelude::*;
use std::{
    any::Any,
    fs,
    panic::{catch_unwind, AssertUnwindSafe},
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Landscape metrics computed for every footprint file against one classified raster.
#[derive(Debug, Clone)]
pub struct LandscapeRequest {
    pub classified: PathBuf,
    pub metrics: Vec<LandscapeMetric>,
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub metrics: Vec<UcpMetric>,
    pub landscape: Option<LandscapeRequest>,
}

/// Building-driven landscape pass of one file.
#[derive(Debug, Clone)]
pub struct LandscapeJob {
    pub classified: PathBuf,
    pub metrics: Vec<LandscapeMetric>,
    pub output_dir: PathBuf,
}

/// Everything one worker needs for one footprint file.
#[derive(Debug, Clone)]
pub struct Job {
    pub input_path: PathBuf,
    pub output_folders: OutputLayout,
    pub requested_metrics: Vec<UcpMetric>,
    pub landscape: Option<LandscapeJob>,
}

impl Job {
    pub fn run(&self, settings: &Settings, table: &UtmTable, scratch: &Path) -> Result<Vec<PathBuf>> {
        let mut outputs = run_ucp_file(
            &self.input_path,
            &self.output_folders,
            &self.requested_metrics,
            &settings.ucp,
            table,
            scratch,
        )?;
        if let Some(landscape) = &self.landscape {
            let run = LandscapeRun {
                classified: &landscape.classified,
                output_dir: &landscape.output_dir,
                metrics: &landscape.metrics,
                cfg: &settings.landscape,
                table,
            };
            outputs.extend(run.by_buildings(&self.input_path)?);
        }
        Ok(outputs)
    }
}

#[derive(Debug, Clone)]
pub struct JobSuccess {
    pub input: PathBuf,
    pub outputs: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct JobFailure {
    pub input: PathBuf,
    /// step that failed, when the job got far enough to tag it
    pub stage: Option<Stage>,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub succeeded: Vec<JobSuccess>,
    pub failed: Vec<JobFailure>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// One row per input: `input`, `status` and `error` (null on success).
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut rows: Vec<(String, &str, Option<String>)> = self
            .succeeded
            .iter()
            .map(|s| (s.input.display().to_string(), "ok", None))
            .chain(
                self.failed
                    .iter()
                    .map(|f| (f.input.display().to_string(), "failed", Some(f.error.clone()))),
            )
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        let inputs: Vec<String> = rows.iter().map(|r| r.0.clone()).collect();
        let status: Vec<&str> = rows.iter().map(|r| r.1).collect();
        let errors: Vec<Option<String>> = rows.into_iter().map(|r| r.2).collect();
        DataFrame::new(vec![
            Column::new("input".into(), inputs),
            Column::new("status".into(), status),
            Column::new("error".into(), errors),
        ])
    }
}

enum JobOutcome {
    Done(JobSuccess),
    Failed(JobFailure),
}

/// Footprint files below `source`, sorted.
pub fn discover_footprints(source: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            UrbanError::io(path, e.into())
        })?;
        if entry.file_type().is_file() && is_footprint_file(entry.path()) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("worker panicked"))
}

/// Run one job body, turning errors and panics into a failure record.
fn isolate<F>(input: &Path, body: F) -> JobOutcome
where
    F: FnOnce() -> Result<Vec<PathBuf>>,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(outputs)) => JobOutcome::Done(JobSuccess {
            input: input.to_path_buf(),
            outputs,
        }),
        Ok(Err(e)) => JobOutcome::Failed(JobFailure {
            input: input.to_path_buf(),
            stage: e.stage(),
            error: e.to_string(),
        }),
        Err(payload) => JobOutcome::Failed(JobFailure {
            input: input.to_path_buf(),
            stage: None,
            error: format!("panic: {}", panic_message(payload.as_ref())),
        }),
    }
}

fn build_jobs(request: &BatchRequest, inputs: Vec<PathBuf>, layout: &OutputLayout) -> Vec<Job> {
    inputs
        .into_iter()
        .map(|input_path| {
            let landscape = request.landscape.as_ref().map(|l| LandscapeJob {
                classified: l.classified.clone(),
                metrics: l.metrics.clone(),
                output_dir: request.destination.join(format!("{}_2D", file_stem(&input_path))),
            });
            Job {
                input_path,
                output_folders: layout.clone(),
                requested_metrics: request.metrics.clone(),
                landscape,
            }
        })
        .collect()
}

/// Compute UCP rasters (and optionally landscape metrics) for every footprint file under
/// `request.source`. A failing file never stops the others.
pub fn run_batch(request: &BatchRequest, settings: &Settings, progress: &dyn ProgressSink) -> Result<BatchReport> {
    settings.ucp.validate()?;
    settings.landscape.validate()?;
    let workers = settings.batch.worker_count()?;

    let inputs = discover_footprints(&request.source)?;
    if inputs.is_empty() {
        tracing::warn!("no footprint files found under {}", request.source.display());
    }
    let layout = OutputLayout::per_metric(&request.destination, &request.metrics)?;
    let jobs = build_jobs(request, inputs, &layout);

    let scratch = settings.batch.scratch_for(&request.destination);
    let created_scratch = !scratch.exists();
    fs::create_dir_all(&scratch).map_err(|e| UrbanError::io(&scratch, e))?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| UrbanError::InvalidParameter {
            name: "workers",
            value: workers.to_string(),
            reason: e.to_string(),
        })?;
    let table = UtmTable::new();

    tracing::info!("processing {} files with {workers} workers", jobs.len());
    progress.set(30, "workers started");
    let outcomes: Vec<JobOutcome> = pool.install(|| {
        jobs.par_iter()
            .map(|job| isolate(&job.input_path, || job.run(settings, &table, &scratch)))
            .collect()
    });
    progress.set(90, "workers finished");

    // only after every worker has joined
    if created_scratch {
        if let Err(e) = fs::remove_dir_all(&scratch) {
            tracing::warn!("cannot remove scratch folder {}: {e}", scratch.display());
        }
    }

    let mut report = BatchReport::default();
    for outcome in outcomes {
        match outcome {
            JobOutcome::Done(success) => report.succeeded.push(success),
            JobOutcome::Failed(failure) => {
                tracing::warn!("{} failed: {}", failure.input.display(), failure.error);
                report.failed.push(failure);
            }
        }
    }
    tracing::info!("{} files done, {} failed", report.succeeded.len(), report.failed.len());
    progress.set(100, "done");
    Ok(report)
}
