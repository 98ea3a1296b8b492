/* Backend dispatch for raster and vector files */

pub mod geojson_io;
pub mod native;

#[cfg(feature = "gdal")]
pub mod gdal_io;

use crate::{
    encoding::arrays::GeoRaster,
    error::{Result, UrbanError},
    rasterization::masking::mask_to_geometries,
};
use geo_types::Geometry;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// One vector record: optional geometry plus its attribute table row.
#[derive(Debug, Clone)]
pub struct VectorFeature {
    pub geometry: Option<Geometry<f64>>,
    pub properties: Map<String, Value>,
}

impl VectorFeature {
    pub fn numeric(&self, field: &str) -> Option<f64> {
        self.properties.get(field).and_then(geojson_io::numeric_value)
    }
}

#[derive(Debug, Clone)]
pub struct VectorLayer {
    pub features: Vec<VectorFeature>,
    /// EPSG code when the layer CRS has one
    pub epsg: Option<u32>,
}

impl VectorLayer {
    pub fn geometries(&self) -> Vec<Geometry<f64>> {
        self.features.iter().filter_map(|f| f.geometry.clone()).collect()
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Vector formats the batch discovery picks up.
pub fn is_footprint_file(path: &Path) -> bool {
    match extension(path).as_str() {
        "geojson" => true,
        "shp" | "gpkg" => cfg!(feature = "gdal"),
        _ => false,
    }
}

pub fn read_vector(path: &Path) -> Result<VectorLayer> {
    match extension(path).as_str() {
        "geojson" | "json" => geojson_io::read_geojson(path),
        #[cfg(feature = "gdal")]
        _ => gdal_io::read_vector(path),
        #[cfg(not(feature = "gdal"))]
        _ => Err(UrbanError::BackendUnavailable("GDAL vector")),
    }
}

#[cfg(feature = "gdal")]
pub fn read_raster(path: &Path) -> Result<GeoRaster> {
    gdal_io::read_raster(path)
}

#[cfg(not(feature = "gdal"))]
pub fn read_raster(path: &Path) -> Result<GeoRaster> {
    match extension(path).as_str() {
        "tif" | "tiff" => native::read_geotiff(path),
        _ => Err(UrbanError::BackendUnavailable("GDAL raster")),
    }
}

#[cfg(feature = "gdal")]
pub fn write_raster(path: &Path, raster: &GeoRaster) -> Result<()> {
    gdal_io::write_raster(path, raster)
}

#[cfg(not(feature = "gdal"))]
pub fn write_raster(path: &Path, raster: &GeoRaster) -> Result<()> {
    native::write_geotiff(path, raster)
}

/// Move a finished file into place, copying when a rename cannot cross devices.
pub fn promote_file(staged: &Path, destination: &Path) -> Result<()> {
    if std::fs::rename(staged, destination).is_ok() {
        return Ok(());
    }
    std::fs::copy(staged, destination).map_err(|e| UrbanError::io(destination, e))?;
    std::fs::remove_file(staged).map_err(|e| UrbanError::io(staged, e))
}

fn sibling_temp(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.masking"))
}

/// Replace a raster file by its version masked and cropped to `geoms`.
pub fn mask_file_in_place(path: &Path, geoms: &[Geometry<f64>]) -> Result<()> {
    let raster = read_raster(path)?;
    let masked = mask_to_geometries(&raster, geoms, true)
        .ok_or_else(|| UrbanError::raster(path, "mask geometries do not overlap the raster"))?;

    let temp = sibling_temp(path);
    if let Err(e) = write_raster(&temp, &masked) {
        let _ = std::fs::remove_file(&temp);
        return Err(e);
    }
    promote_file(&temp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::raster::RasterInfo;
    use geo_types::{coord, Rect};
    use ndarray::Array2;

    #[test]
    fn discovery_extensions() {
        assert!(is_footprint_file(Path::new("a/b/City.GeoJSON")));
        assert!(!is_footprint_file(Path::new("a/b/readme.txt")));
        assert_eq!(is_footprint_file(Path::new("x.shp")), cfg!(feature = "gdal"));
    }

    #[test]
    fn masking_in_place_crops_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.tif");
        let info = RasterInfo::from_extent(0.0, 0.0, 4.0, 4.0, 1.0, 1.0, Some(4326));
        let raster = GeoRaster::from_band(Array2::from_elem((4, 4), 3.0), info, None);
        write_raster(&path, &raster).unwrap();

        let rect = Geometry::Rect(Rect::new(coord! { x: 1.0, y: 1.0 }, coord! { x: 3.0, y: 3.0 }));
        mask_file_in_place(&path, &[rect]).unwrap();

        let back = read_raster(&path).unwrap();
        assert_eq!(back.data.shape(), &[1, 2, 2]);
        assert!(back.data.iter().all(|v| *v == 3.0));
        assert!(!sibling_temp(&path).exists());
    }
}
