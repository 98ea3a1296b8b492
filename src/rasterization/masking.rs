/* Mask rasters to polygons: pixels whose centers fall outside become nodata */

use crate::{
    encoding::{arrays::GeoRaster, writers::MaskWriter},
    geo::raster::RasterInfo,
    rasterization::burn_geometry::Burn,
};
use geo::BoundingRect;
use geo_types::{Geometry, Rect, coord};
use ndarray::Axis;

/// Pixels of `raster_info` covered by any of `geoms`.
pub fn geometry_mask(geoms: &[Geometry], raster_info: &RasterInfo) -> MaskWriter {
    let mut mask = MaskWriter::new(raster_info.nrows, raster_info.ncols);
    for geom in geoms {
        Burn::<f64, _>::burn(geom, raster_info, 1.0, &mut mask, 0.0);
    }
    mask
}

// https://github.com/georust/geo/blob/main/geo/src/algorithm/bounding_rect.rs#L186
pub fn bounding_rect(geoms: &[Geometry]) -> Option<Rect> {
    geoms.iter().fold(None, |acc, next| match (acc, next.bounding_rect()) {
        (None, None) => None,
        (Some(r), None) | (None, Some(r)) => Some(r),
        (Some(r1), Some(r2)) => Some(Rect::new(
            coord! { x: r1.min().x.min(r2.min().x), y: r1.min().y.min(r2.min().y) },
            coord! { x: r1.max().x.max(r2.max().x), y: r1.max().y.max(r2.max().y) },
        )),
    })
}

/// Set every pixel outside `geoms` to nodata; with `crop`, first cut the raster to the
/// pixel window covering the geometries. Rasters without nodata get NaN as nodata.
/// Returns `None` when cropping leaves nothing.
pub fn mask_to_geometries(raster: &GeoRaster, geoms: &[Geometry], crop: bool) -> Option<GeoRaster> {
    let mut out = if crop {
        let bounds = bounding_rect(geoms)?;
        let (row0, col0, nrows, ncols) = raster.info.window_of(&bounds)?;
        raster.crop(row0, col0, nrows, ncols)
    } else {
        raster.clone()
    };

    let fill = out.fill_value();
    out.nodata = Some(fill);

    let mask = geometry_mask(geoms, &out.info);
    for mut band in out.data.axis_iter_mut(Axis(0)) {
        for ((row, col), value) in band.indexed_iter_mut() {
            if !mask.contains(row, col) {
                *value = fill;
            }
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;
    use ndarray::Array2;

    #[test]
    fn mask_with_crop_cuts_to_window() {
        let info = RasterInfo::from_extent(0.0, 0.0, 10.0, 10.0, 1.0, 1.0, Some(4326));
        let raster = GeoRaster::from_band(Array2::from_elem((10, 10), 7.0), info, None);
        let rect = Rect::new(coord! { x: 2.0, y: 2.0 }, coord! { x: 5.0, y: 4.0 });

        let masked = mask_to_geometries(&raster, &[Geometry::Rect(rect)], true).unwrap();
        assert_eq!(masked.data.shape(), &[1, 2, 3]);
        assert!(masked.data.iter().all(|v| *v == 7.0));
        assert!(masked.nodata.unwrap().is_nan());
    }

    #[test]
    fn mask_without_crop_keeps_shape() {
        let info = RasterInfo::from_extent(0.0, 0.0, 4.0, 4.0, 1.0, 1.0, None);
        let raster = GeoRaster::from_band(Array2::from_elem((4, 4), 1.0), info, Some(-9999.0));
        let tri = Geometry::Polygon(geo_types::polygon![
            (x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 0.0, y: 4.0)
        ]);

        let masked = mask_to_geometries(&raster, &[tri], false).unwrap();
        assert_eq!(masked.data.shape(), &[1, 4, 4]);
        // lower-left triangle keeps its values
        assert_eq!(masked.data[[0, 3, 0]], 1.0);
        assert_eq!(masked.data[[0, 0, 3]], -9999.0);
    }
}
