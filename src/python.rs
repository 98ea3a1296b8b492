/* Python entry points; the heavy lifting runs with the GIL released */

use crate::{
    config::{LandscapeConfig, Settings, UcpConfig},
    error::UrbanError,
    geo::projection::UtmTable,
    io::read_vector,
    landscape::{self, engine::boundary_polygons, parse_landscape_metrics, LandscapeRun},
    orchestrator::{run_batch, BatchRequest},
    progress::LogProgress,
    ucp::{parse_metrics, run_ucp_file, OutputLayout},
};
use geo_types::Geometry;
use numpy::PyReadonlyArray2;
use pyo3::{
    exceptions::{PyIOError, PyValueError},
    prelude::*,
};
use pyo3_polars::PyDataFrame;
use std::{fs, path::PathBuf};

fn to_pyerr(e: UrbanError) -> PyErr {
    match e {
        UrbanError::Io { .. } => PyIOError::new_err(e.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

fn landscape_config(grid_size: f64, pattern_nodata: Option<i64>) -> PyResult<LandscapeConfig> {
    let cfg = LandscapeConfig {
        grid_size,
        pattern_nodata,
        ..Default::default()
    };
    cfg.validate().map_err(to_pyerr)?;
    Ok(cfg)
}

#[pyfunction]
#[pyo3(signature = (source, destination, metrics, workers = "6"))]
fn ucp_batch(py: Python<'_>, source: PathBuf, destination: PathBuf, metrics: Vec<String>, workers: &str) -> PyResult<PyDataFrame> {
    let metrics = parse_metrics(&metrics).map_err(to_pyerr)?;
    let mut settings = Settings::default();
    settings.batch.workers = workers.to_string();
    let request = BatchRequest {
        source,
        destination,
        metrics,
        landscape: None,
    };

    let report = py
        .allow_threads(|| run_batch(&request, &settings, &LogProgress))
        .map_err(to_pyerr)?;
    let frame = report.to_dataframe().map_err(|e| to_pyerr(e.into()))?;
    Ok(PyDataFrame(frame))
}

#[pyfunction]
#[pyo3(signature = (path, destination, metrics, height_field = "Height"))]
fn ucp_file(py: Python<'_>, path: PathBuf, destination: PathBuf, metrics: Vec<String>, height_field: &str) -> PyResult<Vec<PathBuf>> {
    let metrics = parse_metrics(&metrics).map_err(to_pyerr)?;
    let cfg = UcpConfig {
        height_field: height_field.to_string(),
        ..Default::default()
    };

    py.allow_threads(|| {
        fs::create_dir_all(&destination).map_err(|e| UrbanError::io(&destination, e))?;
        let scratch = Settings::default().batch.scratch_for(&destination);
        let layout = OutputLayout::Flat(destination.clone());
        let result = run_ucp_file(&path, &layout, &metrics, &cfg, &UtmTable::new(), &scratch);
        let _ = fs::remove_dir_all(&scratch);
        result
    })
    .map_err(to_pyerr)
}

#[pyfunction]
#[pyo3(signature = (boundary, classified, output_dir, metrics, grid_size = 1.0 / 120.0, pattern_nodata = None))]
fn landscape_by_vector(
    py: Python<'_>,
    boundary: PathBuf,
    classified: PathBuf,
    output_dir: PathBuf,
    metrics: Vec<String>,
    grid_size: f64,
    pattern_nodata: Option<i64>,
) -> PyResult<Vec<PathBuf>> {
    let metrics = parse_landscape_metrics(&metrics).map_err(to_pyerr)?;
    let cfg = landscape_config(grid_size, pattern_nodata)?;
    py.allow_threads(|| {
        let table = UtmTable::new();
        let run = LandscapeRun {
            classified: &classified,
            output_dir: &output_dir,
            metrics: &metrics,
            cfg: &cfg,
            table: &table,
        };
        run.by_vector(&boundary)
    })
    .map_err(to_pyerr)
}

#[pyfunction]
#[pyo3(signature = (reference, classified, output_dir, metrics, boundary = None, pattern_nodata = None))]
fn landscape_by_raster(
    py: Python<'_>,
    reference: PathBuf,
    classified: PathBuf,
    output_dir: PathBuf,
    metrics: Vec<String>,
    boundary: Option<PathBuf>,
    pattern_nodata: Option<i64>,
) -> PyResult<Vec<PathBuf>> {
    let metrics = parse_landscape_metrics(&metrics).map_err(to_pyerr)?;
    let cfg = landscape_config(LandscapeConfig::default().grid_size, pattern_nodata)?;
    py.allow_threads(|| {
        let mask = match &boundary {
            Some(path) => {
                let layer = read_vector(path)?;
                Some(vec![Geometry::MultiPolygon(boundary_polygons(&layer, path)?)])
            }
            None => None,
        };
        let table = UtmTable::new();
        let run = LandscapeRun {
            classified: &classified,
            output_dir: &output_dir,
            metrics: &metrics,
            cfg: &cfg,
            table: &table,
        };
        run.by_raster(&reference, mask.as_deref())
    })
    .map_err(to_pyerr)
}

#[pyfunction]
#[pyo3(signature = (footprints, classified, output_dir, metrics, grid_size = 1.0 / 120.0, pattern_nodata = None))]
fn landscape_by_buildings(
    py: Python<'_>,
    footprints: PathBuf,
    classified: PathBuf,
    output_dir: PathBuf,
    metrics: Vec<String>,
    grid_size: f64,
    pattern_nodata: Option<i64>,
) -> PyResult<Vec<PathBuf>> {
    let metrics = parse_landscape_metrics(&metrics).map_err(to_pyerr)?;
    let cfg = landscape_config(grid_size, pattern_nodata)?;
    py.allow_threads(|| {
        let table = UtmTable::new();
        let run = LandscapeRun {
            classified: &classified,
            output_dir: &output_dir,
            metrics: &metrics,
            cfg: &cfg,
            table: &table,
        };
        run.by_buildings(&footprints)
    })
    .map_err(to_pyerr)
}

/// Aggregation index of `class_val` in an integer array, NaN when the class is absent.
#[pyfunction]
#[pyo3(signature = (array, class_val, nodata = None))]
fn aggregation_index(array: PyReadonlyArray2<'_, i64>, class_val: i64, nodata: Option<i64>) -> f64 {
    if nodata == Some(class_val) {
        return f64::NAN;
    }
    landscape::aggregation_index(array.as_array(), class_val)
}

#[pymodule]
fn urbanscape(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(ucp_batch, m)?)?;
    m.add_function(wrap_pyfunction!(ucp_file, m)?)?;
    m.add_function(wrap_pyfunction!(landscape_by_vector, m)?)?;
    m.add_function(wrap_pyfunction!(landscape_by_raster, m)?)?;
    m.add_function(wrap_pyfunction!(landscape_by_buildings, m)?)?;
    m.add_function(wrap_pyfunction!(aggregation_index, m)?)?;
    Ok(())
}
