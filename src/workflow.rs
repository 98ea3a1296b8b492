/* Single region of interest: UCP rasters first, then landscape metrics on their grid */

use crate::{
    config::Settings,
    error::{Result, Stage, StageContext, UrbanError},
    geo::projection::UtmTable,
    io::read_vector,
    landscape::{engine::boundary_polygons, LandscapeMetric, LandscapeRun},
    progress::ProgressSink,
    ucp::{pipeline::file_stem, run_region_ucp, UcpMetric},
};
use geo_types::Geometry;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone)]
pub struct RegionRequest {
    /// polygon file of the region of interest
    pub roi: PathBuf,
    pub buildings: Option<PathBuf>,
    pub land_cover: Option<PathBuf>,
    pub destination: PathBuf,
    pub ucp_metrics: Vec<UcpMetric>,
    pub landscape_metrics: Vec<LandscapeMetric>,
}

#[derive(Debug, Clone, Default)]
pub struct RegionOutputs {
    pub ucp: Vec<PathBuf>,
    pub landscape: Vec<PathBuf>,
}

fn required<'a>(value: Option<&'a Path>, name: &'static str) -> Result<&'a Path> {
    value.ok_or_else(|| UrbanError::InvalidParameter {
        name,
        value: String::from("none"),
        reason: String::from("needed by the requested metrics"),
    })
}

pub fn run_region(request: &RegionRequest, settings: &Settings, progress: &dyn ProgressSink) -> Result<RegionOutputs> {
    let roi = request.roi.as_path();
    let layer = read_vector(roi).at_stage(Stage::Load, roi)?;
    let region = [Geometry::MultiPolygon(boundary_polygons(&layer, roi).at_stage(Stage::Load, roi)?)];
    let table = UtmTable::new();
    let mut outputs = RegionOutputs::default();

    if !request.ucp_metrics.is_empty() {
        settings.ucp.validate()?;
        let footprints = required(request.buildings.as_deref(), "buildings")?;
        let scratch = settings.batch.scratch_for(&request.destination);
        let created_scratch = !scratch.exists();
        fs::create_dir_all(&scratch).map_err(|e| UrbanError::io(&scratch, e))?;

        let result = run_region_ucp(
            footprints,
            &region,
            &request.destination,
            &request.ucp_metrics,
            &settings.ucp,
            &table,
            &scratch,
        );
        if created_scratch {
            if let Err(e) = fs::remove_dir_all(&scratch) {
                tracing::warn!("cannot remove scratch folder {}: {e}", scratch.display());
            }
        }
        outputs.ucp = result?;
    }
    progress.set(90, "urban canopy parameters written");

    if !request.landscape_metrics.is_empty() {
        settings.landscape.validate()?;
        let land_cover = required(request.land_cover.as_deref(), "land_cover")?;
        let output_dir = request.destination.join(format!("{}_2D", file_stem(roi)));
        let run = LandscapeRun {
            classified: land_cover,
            output_dir: &output_dir,
            metrics: &request.landscape_metrics,
            cfg: &settings.landscape,
            table: &table,
        };
        outputs.landscape = match outputs.ucp.first() {
            Some(reference) => run.by_raster(reference, Some(&region))?,
            None => run.by_vector(roi)?,
        };
    }
    progress.set(100, "region done");
    Ok(outputs)
}
