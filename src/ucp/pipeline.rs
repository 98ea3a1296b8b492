/* Per-file UCP run: load, aggregate, write staged rasters, mask, then promote */

use super::{aggregate::aggregate, grid::UcpGrid, metric::UcpMetric};
use crate::{
    buildings::{buildings_from_layer, load_buildings, select_buildings_in_region, BuildingSet},
    config::UcpConfig,
    encoding::arrays::GeoRaster,
    error::{Result, Stage, StageContext, UrbanError},
    geo::projection::UtmTable,
    io::{mask_file_in_place, promote_file, read_vector, write_raster},
};
use geo_types::Geometry;
use std::{
    collections::{hash_map::DefaultHasher, BTreeMap},
    fs,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
};

/// Where finished rasters go.
#[derive(Debug, Clone)]
pub enum OutputLayout {
    /// one folder per metric, as in batch runs
    PerMetric(BTreeMap<UcpMetric, PathBuf>),
    /// everything in one folder
    Flat(PathBuf),
}

impl OutputLayout {
    /// Create `{destination}/{metric}` for every metric.
    pub fn per_metric(destination: &Path, metrics: &[UcpMetric]) -> Result<Self> {
        let mut folders = BTreeMap::new();
        for metric in metrics {
            let folder = destination.join(metric.id());
            fs::create_dir_all(&folder).map_err(|e| UrbanError::io(&folder, e))?;
            folders.insert(*metric, folder);
        }
        Ok(OutputLayout::PerMetric(folders))
    }

    pub fn folder(&self, metric: UcpMetric) -> Option<&Path> {
        match self {
            OutputLayout::PerMetric(folders) => folders.get(&metric).map(PathBuf::as_path),
            OutputLayout::Flat(folder) => Some(folder),
        }
    }
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("buildings"))
}

/// `{stem}_{minLon}_{maxLat}_{suffix}.tif`
pub fn output_name(stem: &str, grid: &UcpGrid, metric: UcpMetric) -> String {
    format!("{stem}{}{}.tif", grid.corner_tag(), metric.suffix())
}

/// Private staging folder of one input inside the scratch directory.
fn staging_dir(scratch: &Path, input: &Path) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    scratch.join(format!("{}-{:016x}", file_stem(input), hasher.finish()))
}

/// Everything a single UCP computation needs besides its buildings.
pub struct UcpRun<'a> {
    pub input: &'a Path,
    pub metrics: &'a [UcpMetric],
    pub layout: &'a OutputLayout,
    /// polygons the outputs are masked and cropped to
    pub mask: &'a [Geometry<f64>],
    pub cfg: &'a UcpConfig,
    pub table: &'a UtmTable,
    pub scratch: &'a Path,
}

impl UcpRun<'_> {
    /// Aggregate `buildings` and write one raster per metric. Outputs only reach their
    /// final paths once every metric has been written and masked.
    pub fn execute(&self, buildings: &BuildingSet) -> Result<Vec<PathBuf>> {
        let staging = staging_dir(self.scratch, self.input);
        let result = self.stage_and_promote(buildings, &staging);
        if staging.exists() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                tracing::warn!("cannot remove staging folder {}: {e}", staging.display());
            }
        }
        result
    }

    fn stage_and_promote(&self, buildings: &BuildingSet, staging: &Path) -> Result<Vec<PathBuf>> {
        let input = self.input;
        let grid = UcpGrid::from_centroids(&buildings.centroid, self.cfg.cells_per_degree)
            .ok_or_else(|| UrbanError::EmptyInput {
                path: input.to_path_buf(),
            })
            .at_stage(Stage::Load, input)?;

        let stats = aggregate(buildings, &grid, &self.cfg.height_bins, self.table).at_stage(Stage::Aggregate, input)?;

        fs::create_dir_all(staging)
            .map_err(|e| UrbanError::io(staging, e))
            .at_stage(Stage::Write, input)?;

        let stem = file_stem(input);
        let info = grid.raster_info();
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(self.metrics.len());
        for &metric in self.metrics {
            let Some(folder) = self.layout.folder(metric) else {
                continue;
            };
            let name = output_name(&stem, &grid, metric);
            let raster = GeoRaster::new(metric.reduce(&stats), info.clone(), Some(f64::NAN))
                .with_band_names(metric.band_names(&self.cfg.height_bins));
            let path = staging.join(&name);
            write_raster(&path, &raster).at_stage(Stage::Write, input)?;
            staged.push((path, folder.join(name)));
        }

        for (path, _) in &staged {
            mask_file_in_place(path, self.mask).at_stage(Stage::Mask, input)?;
        }

        let mut outputs = Vec::with_capacity(staged.len());
        for (path, destination) in staged {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| UrbanError::io(parent, e))
                    .at_stage(Stage::Write, input)?;
            }
            promote_file(&path, &destination).at_stage(Stage::Write, input)?;
            outputs.push(destination);
        }

        tracing::info!("{}: wrote {} UCP rasters", input.display(), outputs.len());
        Ok(outputs)
    }
}

/// Batch unit: every building of one file, masked to the bounding rectangle of its footprints.
pub fn run_ucp_file(
    input: &Path,
    layout: &OutputLayout,
    metrics: &[UcpMetric],
    cfg: &UcpConfig,
    table: &UtmTable,
    scratch: &Path,
) -> Result<Vec<PathBuf>> {
    let buildings = load_buildings(input, cfg, table).at_stage(Stage::Load, input)?;
    let bounds = buildings
        .footprint_bounds
        .ok_or_else(|| UrbanError::EmptyInput {
            path: input.to_path_buf(),
        })
        .at_stage(Stage::Load, input)?;

    let mask = [Geometry::Rect(bounds)];
    let run = UcpRun {
        input,
        metrics,
        layout,
        mask: &mask,
        cfg,
        table,
        scratch,
    };
    run.execute(&buildings)
}

/// Single-region unit: the footprints touching `region`, written to `destination`
/// and masked to the region.
pub fn run_region_ucp(
    footprints: &Path,
    region: &[Geometry<f64>],
    destination: &Path,
    metrics: &[UcpMetric],
    cfg: &UcpConfig,
    table: &UtmTable,
    scratch: &Path,
) -> Result<Vec<PathBuf>> {
    let layer = read_vector(footprints).at_stage(Stage::Load, footprints)?;
    let selected = select_buildings_in_region(&layer, region);
    let buildings = buildings_from_layer(&selected, footprints, cfg, table).at_stage(Stage::Load, footprints)?;

    fs::create_dir_all(destination)
        .map_err(|e| UrbanError::io(destination, e))
        .at_stage(Stage::Write, footprints)?;
    let layout = OutputLayout::Flat(destination.to_path_buf());

    let run = UcpRun {
        input: footprints,
        metrics,
        layout: &layout,
        mask: region,
        cfg,
        table,
        scratch,
    };
    run.execute(&buildings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buildings::fixtures::{metric_rect, write_footprint_file},
        io::read_raster,
    };

    fn write_footprints(dir: &Path, name: &str) -> PathBuf {
        // the footprints straddle the centre of cell (113.0042, 22.0042)
        let path = dir.join(name);
        write_footprint_file(
            &path,
            &[(metric_rect(113.0035, 22.0035, 10.0, 10.0), 10.0), (metric_rect(113.0045, 22.0045, 10.0, 15.0), 20.0)],
        );
        path
    }

    #[test]
    fn batch_file_lands_in_metric_folders() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_footprints(dir.path(), "city.geojson");
        let destination = dir.path().join("out");
        let scratch = dir.path().join("scratch");
        let metrics = [UcpMetric::Count, UcpMetric::Sum, UcpMetric::Dh];
        let layout = OutputLayout::per_metric(&destination, &metrics).unwrap();

        let outputs = run_ucp_file(&input, &layout, &metrics, &UcpConfig::default(), &UtmTable::new(), &scratch).unwrap();

        assert_eq!(
            outputs,
            vec![
                destination.join("count").join("city_113_23_count.tif"),
                destination.join("sum").join("city_113_23_sumHei.tif"),
                destination.join("dh").join("city_113_23_dh.tif"),
            ]
        );
        // cropped to the footprints' bounding rectangle: one cell
        let count = read_raster(&outputs[0]).unwrap();
        assert_eq!(count.data.shape(), &[1, 1, 1]);
        assert_eq!(count.data[[0, 0, 0]], 2.0);
        assert_eq!(read_raster(&outputs[2]).unwrap().nbands(), 15);
        // nothing left behind in the staging area
        assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[test]
    fn failed_load_names_the_stage_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.geojson");
        fs::write(&input, "{ definitely not geojson").unwrap();
        let destination = dir.path().join("out");
        let layout = OutputLayout::per_metric(&destination, &[UcpMetric::Count]).unwrap();

        let err = run_ucp_file(
            &input,
            &layout,
            &[UcpMetric::Count],
            &UcpConfig::default(),
            &UtmTable::new(),
            &dir.path().join("scratch"),
        )
        .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Load));
        assert_eq!(fs::read_dir(destination.join("count")).unwrap().count(), 0);
    }
}
