/* Cell-by-cell landscape metrics over a classified raster, driven by a boundary, a reference grid or building footprints */

use super::{
    aggregation::aggregation_index,
    metric::{CellMetrics, LandscapeMetric},
    patterns::{class_pattern, PixelSize},
};
use crate::{
    config::LandscapeConfig,
    encoding::{arrays::GeoRaster, writers::{DenseArrayWriter, MaskWriter}},
    error::{Result, Stage, StageContext, UrbanError},
    geo::{projection::UtmTable, raster::RasterInfo, validate::footprint_parts},
    io::{mask_file_in_place, promote_file, read_raster, read_vector, write_raster, VectorLayer},
    rasterization::{burn_geometry::Burn, masking::mask_to_geometries, pixel_functions::last_values},
};
use geo::{Area, BooleanOps, BoundingRect, ConvexHull, Intersects};
use geo_types::{coord, Geometry, MultiPolygon, Polygon, Rect};
use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Marks pixels that are missing, negative or outside the cell.
pub const INVALID_PIXEL: i64 = i64::MIN;

// float error tolerated when snapping window edges to the pixel grid
const SNAP_EPS: f64 = 1e-6;

const GEOGRAPHIC_EPSG: [u32; 4] = [4326, 4490, 4269, 4258];

/// How the grid cells are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandscapeMode {
    Vector,
    Raster,
    Buildings,
}

impl LandscapeMode {
    /// Class ignored by the pattern metrics when the configuration sets none.
    pub fn default_pattern_nodata(self) -> i64 {
        match self {
            LandscapeMode::Vector => 3,
            LandscapeMode::Raster | LandscapeMode::Buildings => 0,
        }
    }
}

/// Metrics of one cell from its pixel codes, [`INVALID_PIXEL`] (or any negative code)
/// where there is no observation.
pub fn evaluate_cell(pixels: ArrayView2<i64>, pixel: PixelSize, cfg: &LandscapeConfig, pattern_nodata: i64) -> CellMetrics {
    if !pixels.iter().any(|v| *v >= 0) {
        return CellMetrics::unobserved();
    }
    let target = pixels.iter().filter(|v| **v == cfg.target_class).count();
    if target == 0 {
        return CellMetrics::absent();
    }
    let background = pixels.iter().filter(|v| **v == cfg.background_class).count();
    let pattern = class_pattern(pixels, cfg.target_class, pattern_nodata, cfg.connectivity, pixel);

    CellMetrics {
        ai: aggregation_index(pixels, cfg.target_class),
        largest_patch_index: pattern.largest_patch_index,
        proportion_of_landscape: 100.0 * target as f64 / (target + background) as f64,
        patch_density: pattern.patch_density,
        edge_density: pattern.edge_density,
        landscape_shape_index: pattern.landscape_shape_index,
    }
}

#[inline]
fn pixel_code(raster: &GeoRaster, value: f64) -> i64 {
    if !value.is_finite() || raster.is_nodata(value) || value < 0.0 {
        INVALID_PIXEL
    } else {
        value as i64
    }
}

/// First band of a classified raster as class codes.
pub fn class_codes(raster: &GeoRaster) -> Array2<i64> {
    raster.band(0).mapv(|v| pixel_code(raster, v))
}

pub fn is_geographic(info: &RasterInfo) -> bool {
    match info.epsg {
        Some(code) => GEOGRAPHIC_EPSG.contains(&code),
        None => info.xmin >= -180.0 && info.xmax <= 180.0 && info.ymin >= -90.0 && info.ymax <= 90.0,
    }
}

/// Ground size of a pixel of `info` centred near (x, y). Geographic grids are measured
/// in the UTM zone of that point.
pub fn pixel_size_at(info: &RasterInfo, x: f64, y: f64, table: &UtmTable) -> PixelSize {
    if !is_geographic(info) {
        return PixelSize {
            width: info.xres,
            height: info.yres,
        };
    }
    let proj = table.for_point(x, y);
    let (hx, hy) = (info.xres / 2.0, info.yres / 2.0);
    let (w0x, w0y) = proj.forward(x - hx, y);
    let (w1x, w1y) = proj.forward(x + hx, y);
    let (h0x, h0y) = proj.forward(x, y - hy);
    let (h1x, h1y) = proj.forward(x, y + hy);
    PixelSize {
        width: (w1x - w0x).hypot(w1y - w0y),
        height: (h1x - h0x).hypot(h1y - h0y),
    }
}

fn snap_floor(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP_EPS { r } else { v.floor() }
}

fn snap_ceil(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP_EPS { r } else { v.ceil() }
}

/// Window of `info` covering `rect`, or `None` unless it lies entirely inside the raster.
pub fn contained_window(info: &RasterInfo, rect: &Rect<f64>) -> Option<(usize, usize, usize, usize)> {
    let (c0, r0) = info.world_to_pixel(rect.min().x, rect.max().y);
    let (c1, r1) = info.world_to_pixel(rect.max().x, rect.min().y);
    let (c0, r0, c1, r1) = (snap_floor(c0), snap_floor(r0), snap_ceil(c1), snap_ceil(r1));
    if c0 < 0.0 || r0 < 0.0 || c1 > info.ncols as f64 || r1 > info.nrows as f64 || c1 <= c0 || r1 <= r0 {
        return None;
    }
    Some((r0 as usize, c0 as usize, (r1 - r0) as usize, (c1 - c0) as usize))
}

fn steps(extent: f64, size: f64) -> usize {
    let n = extent / size;
    let r = n.round();
    let n = if (n - r).abs() < SNAP_EPS { r } else { n.ceil() };
    (n as usize).max(1)
}

/// Square tiles of side `size` anchored at the lower-left corner of the boundary, clipped to it.
/// Tiles that only touch the boundary are dropped.
pub fn boundary_tiles(boundary: &MultiPolygon<f64>, size: f64) -> Vec<MultiPolygon<f64>> {
    let Some(bounds) = boundary.bounding_rect() else {
        return Vec::new();
    };
    let (nx, ny) = (steps(bounds.width(), size), steps(bounds.height(), size));
    let origin = bounds.min();

    (0..nx * ny)
        .into_par_iter()
        .filter_map(|idx| {
            let (i, j) = (idx / ny, idx % ny);
            let x0 = origin.x + i as f64 * size;
            let y0 = origin.y + j as f64 * size;
            let tile = Rect::new(coord! { x: x0, y: y0 }, coord! { x: x0 + size, y: y0 + size }).to_polygon();
            if !boundary.intersects(&tile) {
                return None;
            }
            let clip = boundary.intersection(&MultiPolygon(vec![tile]));
            (clip.unsigned_area() > 0.0).then_some(clip)
        })
        .collect()
}

/// Areal parts of every feature of a layer, merged into one boundary.
pub fn boundary_polygons(layer: &VectorLayer, path: &Path) -> Result<MultiPolygon<f64>> {
    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    for geometry in layer.features.iter().filter_map(|f| f.geometry.as_ref()) {
        match footprint_parts(geometry) {
            Ok(parts) => polygons.extend(parts.into_iter().cloned()),
            Err(e) => tracing::warn!("{}: {e}, feature ignored", path.display()),
        }
    }
    if polygons.is_empty() {
        return Err(UrbanError::EmptyInput {
            path: path.to_path_buf(),
        });
    }
    Ok(MultiPolygon(polygons))
}

fn crs_name(epsg: Option<u32>) -> String {
    epsg.map_or_else(|| String::from("undefined"), |code| format!("EPSG:{code}"))
}

fn same_crs(left: Option<u32>, right: Option<u32>) -> Result<()> {
    if left == right {
        return Ok(());
    }
    Err(UrbanError::CrsMismatch {
        left: crs_name(left),
        right: crs_name(right),
    })
}

/// One landscape computation against a classified raster.
pub struct LandscapeRun<'a> {
    pub classified: &'a Path,
    pub output_dir: &'a Path,
    pub metrics: &'a [LandscapeMetric],
    pub cfg: &'a LandscapeConfig,
    pub table: &'a UtmTable,
}

impl LandscapeRun<'_> {
    fn pattern_nodata(&self, mode: LandscapeMode) -> i64 {
        self.cfg.pattern_nodata.unwrap_or(mode.default_pattern_nodata())
    }

    /// Tile a boundary file and mask the outputs to it.
    pub fn by_vector(&self, boundary: &Path) -> Result<Vec<PathBuf>> {
        let layer = read_vector(boundary).at_stage(Stage::Load, boundary)?;
        let polygons = boundary_polygons(&layer, boundary).at_stage(Stage::Load, boundary)?;
        self.run_tiles(&polygons, layer.epsg, true, LandscapeMode::Vector)
    }

    /// Tile the convex hull of a footprint file. Outputs are left unmasked.
    pub fn by_buildings(&self, footprints: &Path) -> Result<Vec<PathBuf>> {
        let layer = read_vector(footprints).at_stage(Stage::Load, footprints)?;
        let hull = boundary_polygons(&layer, footprints)
            .at_stage(Stage::Load, footprints)?
            .convex_hull();
        self.run_tiles(&MultiPolygon(vec![hull]), layer.epsg, false, LandscapeMode::Buildings)
    }

    /// One cell per pixel of `reference`; outputs share its grid and are masked to `mask` when given.
    pub fn by_raster(&self, reference: &Path, mask: Option<&[Geometry<f64>]>) -> Result<Vec<PathBuf>> {
        let grid = read_raster(reference).at_stage(Stage::Load, reference)?;
        let classified = read_raster(self.classified).at_stage(Stage::Load, self.classified)?;
        same_crs(grid.info.epsg, classified.info.epsg).at_stage(Stage::Load, reference)?;

        let info = grid.info;
        let nodata = self.pattern_nodata(LandscapeMode::Raster);
        let band = classified.band(0);
        let cells: Vec<CellMetrics> = (0..info.nrows * info.ncols)
            .into_par_iter()
            .map(|idx| {
                let (row, col) = (idx / info.ncols, idx % info.ncols);
                let rect = info.pixel_bounds(row, col);
                let Some((row0, col0, nrows, ncols)) = contained_window(&classified.info, &rect) else {
                    return CellMetrics::unobserved();
                };
                let pixels = Array2::from_shape_fn((nrows, ncols), |(r, c)| {
                    pixel_code(&classified, band[[row0 + r, col0 + c]])
                });
                let (x, y) = info.pixel_center(row, col);
                let pixel = pixel_size_at(&classified.info, x, y, self.table);
                evaluate_cell(pixels.view(), pixel, self.cfg, nodata)
            })
            .collect();
        tracing::info!("{}: evaluated {} reference cells", self.classified.display(), cells.len());

        let bands = self
            .metrics
            .iter()
            .map(|&metric| {
                let band = Array2::from_shape_fn((info.nrows, info.ncols), |(r, c)| cells[r * info.ncols + c].get(metric));
                (metric, band)
            })
            .collect();
        self.write_outputs(&info, bands, mask)
    }

    fn run_tiles(&self, boundary: &MultiPolygon<f64>, epsg: Option<u32>, mask_outputs: bool, mode: LandscapeMode) -> Result<Vec<PathBuf>> {
        let classified = read_raster(self.classified).at_stage(Stage::Load, self.classified)?;
        same_crs(epsg, classified.info.epsg).at_stage(Stage::Load, self.classified)?;

        let boundary_geom = [Geometry::MultiPolygon(boundary.clone())];
        let masked = mask_to_geometries(&classified, &boundary_geom, true)
            .ok_or_else(|| UrbanError::raster(self.classified, "boundary does not overlap the classified raster"))
            .at_stage(Stage::Landscape, self.classified)?;

        let nodata = self.pattern_nodata(mode);
        let tiles = boundary_tiles(boundary, self.cfg.grid_size);
        let cells: Vec<(MultiPolygon<f64>, CellMetrics)> = tiles
            .into_par_iter()
            .map(|clip| {
                let metrics = self.tile_metrics(&masked, &clip, nodata);
                (clip, metrics)
            })
            .collect();
        tracing::info!("{}: evaluated {} boundary tiles", self.classified.display(), cells.len());

        let bands = self
            .metrics
            .iter()
            .map(|&metric| {
                let mut raster = masked.info.build_raster(1, f64::NAN);
                let mut writer = DenseArrayWriter::new(raster.index_axis_mut(Axis(0), 0), last_values::<f64>);
                for (clip, metrics) in &cells {
                    clip.burn(&masked.info, metrics.get(metric), &mut writer, f64::NAN);
                }
                (metric, raster.index_axis_move(Axis(0), 0))
            })
            .collect();

        let mask = mask_outputs.then_some(&boundary_geom[..]);
        self.write_outputs(&masked.info, bands, mask)
    }

    fn tile_metrics(&self, raster: &GeoRaster, clip: &MultiPolygon<f64>, nodata: i64) -> CellMetrics {
        let Some(rect) = clip.bounding_rect() else {
            return CellMetrics::unobserved();
        };
        let Some((row0, col0, nrows, ncols)) = raster.info.window_of(&rect) else {
            return CellMetrics::unobserved();
        };
        let window = raster.info.sub_window(row0, col0, nrows, ncols);
        let mut inside = MaskWriter::new(nrows, ncols);
        Burn::<f64, _>::burn(clip, &window, 1.0, &mut inside, 0.0);

        let band = raster.band(0);
        let pixels = Array2::from_shape_fn((nrows, ncols), |(r, c)| {
            if inside.contains(r, c) {
                pixel_code(raster, band[[row0 + r, col0 + c]])
            } else {
                INVALID_PIXEL
            }
        });
        let center = rect.center();
        let pixel = pixel_size_at(&raster.info, center.x, center.y, self.table);
        evaluate_cell(pixels.view(), pixel, self.cfg, nodata)
    }

    /// Write `{metric}.tif` for every band. Every band is written and masked to a staged file
    /// first; nothing reaches its final name unless all of them succeeded.
    fn write_outputs(
        &self,
        info: &RasterInfo,
        bands: Vec<(LandscapeMetric, Array2<f64>)>,
        mask: Option<&[Geometry<f64>]>,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(self.output_dir)
            .map_err(|e| UrbanError::io(self.output_dir, e))
            .at_stage(Stage::Write, self.classified)?;

        let staged: Vec<(PathBuf, PathBuf)> = bands
            .iter()
            .map(|(metric, _)| {
                (
                    self.output_dir.join(format!(".{}.partial.tif", metric.id())),
                    self.output_dir.join(metric.file_name()),
                )
            })
            .collect();

        if let Err(e) = self.stage_bands(info, bands, &staged, mask) {
            for (path, _) in &staged {
                if path.is_file() {
                    let _ = fs::remove_file(path);
                }
            }
            return Err(e);
        }

        let mut outputs = Vec::with_capacity(staged.len());
        for (path, destination) in staged {
            promote_file(&path, &destination).at_stage(Stage::Write, self.classified)?;
            outputs.push(destination);
        }
        tracing::info!("wrote {} landscape rasters to {}", outputs.len(), self.output_dir.display());
        Ok(outputs)
    }

    fn stage_bands(
        &self,
        info: &RasterInfo,
        bands: Vec<(LandscapeMetric, Array2<f64>)>,
        staged: &[(PathBuf, PathBuf)],
        mask: Option<&[Geometry<f64>]>,
    ) -> Result<()> {
        for ((metric, band), (path, _)) in bands.into_iter().zip(staged) {
            let raster = GeoRaster::from_band(band, info.clone(), Some(f64::NAN)).with_band_names(vec![metric.id().to_string()]);
            write_raster(path, &raster).at_stage(Stage::Write, self.classified)?;
        }
        if let Some(geoms) = mask {
            for (path, _) in staged {
                mask_file_in_place(path, geoms).at_stage(Stage::Mask, self.classified)?;
            }
        }
        Ok(())
    }
}
