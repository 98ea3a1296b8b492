/* Raster and vector access through GDAL for shapefiles, geopackages and any GDAL raster */

use super::{VectorFeature, VectorLayer};
use crate::{
    encoding::arrays::GeoRaster,
    error::{Result, UrbanError},
    geo::raster::RasterInfo,
};
use gdal::{
    raster::Buffer,
    spatial_ref::SpatialRef,
    vector::{FieldValue, LayerAccess},
    Dataset, DriverManager, Metadata,
};
use ndarray::{Array2, Array3, Axis};
use serde_json::{Map, Value};
use std::path::Path;

fn epsg_of(srs: &SpatialRef) -> Option<u32> {
    srs.auth_code().ok().and_then(|code| u32::try_from(code).ok())
}

pub fn read_raster(path: &Path) -> Result<GeoRaster> {
    let ds = Dataset::open(path)?;
    let (cols, rows) = ds.raster_size();
    let gt = ds.geo_transform()?;
    let epsg = ds.spatial_ref().ok().as_ref().and_then(epsg_of);
    let info = RasterInfo::from_geo_transform(&gt, cols, rows, epsg);
    let south_up = gt[5] > 0.0;

    let count = ds.raster_count() as usize;
    if count == 0 {
        return Err(UrbanError::raster(path, "dataset has no bands"));
    }

    let mut data = Array3::<f64>::zeros((count, rows, cols));
    let mut nodata = None;
    let mut names = Vec::with_capacity(count);
    for (idx, mut slot) in data.axis_iter_mut(Axis(0)).enumerate() {
        let band = ds.rasterband(idx + 1)?;
        if idx == 0 {
            nodata = band.no_data_value();
        }
        let description = band.description().unwrap_or_default();
        names.push(if description.is_empty() {
            format!("band_{}", idx + 1)
        } else {
            description
        });

        let buffer = band.read_as::<f64>((0, 0), (cols, rows), (cols, rows), None)?;
        let values = Array2::from_shape_vec((rows, cols), buffer.data().to_vec())
            .map_err(|e| UrbanError::raster(path, e))?;
        slot.assign(&values);
    }

    // rows go north to south in memory
    if south_up {
        data.invert_axis(Axis(1));
    }

    Ok(GeoRaster::new(data, info, nodata).with_band_names(names))
}

pub fn write_raster(path: &Path, raster: &GeoRaster) -> Result<()> {
    let info = &raster.info;
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut ds = driver.create_with_band_type::<f64, _>(path, info.ncols, info.nrows, raster.nbands())?;
    ds.set_geo_transform(&info.geo_transform())?;
    if let Some(epsg) = info.epsg {
        ds.set_spatial_ref(&SpatialRef::from_epsg(epsg)?)?;
    }

    for (idx, band_data) in raster.data.axis_iter(Axis(0)).enumerate() {
        let mut band = ds.rasterband(idx + 1)?;
        band.set_no_data_value(raster.nodata)?;
        if let Some(name) = raster.band_names.get(idx) {
            band.set_description(name)?;
        }
        let values: Vec<f64> = band_data.iter().copied().collect();
        let mut buffer = Buffer::new((info.ncols, info.nrows), values);
        band.write((0, 0), (info.ncols, info.nrows), &mut buffer)?;
    }
    Ok(())
}

fn field_to_json(value: FieldValue) -> Value {
    match value {
        FieldValue::IntegerValue(v) => Value::from(v),
        FieldValue::Integer64Value(v) => Value::from(v),
        FieldValue::RealValue(v) => Value::from(v),
        FieldValue::StringValue(v) => Value::from(v),
        _ => Value::Null,
    }
}

pub fn read_vector(path: &Path) -> Result<VectorLayer> {
    let ds = Dataset::open(path)?;
    let mut layer = ds.layer(0)?;
    let srs = layer.spatial_ref().ok_or_else(|| UrbanError::MissingCrs {
        path: path.to_path_buf(),
    })?;
    let epsg = epsg_of(&srs);

    let mut features = Vec::new();
    for feature in layer.features() {
        let geometry = match feature.geometry() {
            Some(geom) => Some(geom.to_geo().map_err(|e| UrbanError::vector(path, e))?),
            None => None,
        };
        let mut properties = Map::new();
        for (name, value) in feature.fields() {
            properties.insert(name, value.map(field_to_json).unwrap_or(Value::Null));
        }
        features.push(VectorFeature { geometry, properties });
    }

    tracing::debug!("read {} features from {}", features.len(), path.display());
    Ok(VectorLayer { features, epsg })
}
