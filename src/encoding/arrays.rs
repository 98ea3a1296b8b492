/* In-memory georeferenced raster shared by the readers, writers and engines */

use crate::geo::raster::RasterInfo;
use ndarray::{s, Array2, Array3, ArrayView2, Axis};

#[derive(Debug, Clone)]
pub struct GeoRaster {
    pub data: Array3<f64>,
    pub band_names: Vec<String>,
    pub info: RasterInfo,
    pub nodata: Option<f64>,
}

impl GeoRaster {
    pub fn new(data: Array3<f64>, info: RasterInfo, nodata: Option<f64>) -> Self {
        let band_names = (1..=data.len_of(Axis(0))).map(|i| format!("band_{i}")).collect();
        Self {
            data,
            band_names,
            info,
            nodata,
        }
    }

    pub fn from_band(band: Array2<f64>, info: RasterInfo, nodata: Option<f64>) -> Self {
        Self::new(band.insert_axis(Axis(0)), info, nodata)
    }

    pub fn with_band_names(mut self, names: Vec<String>) -> Self {
        if names.len() == self.nbands() {
            self.band_names = names;
        }
        self
    }

    #[inline]
    pub fn nbands(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn band(&self, idx: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), idx)
    }

    /// Value written where data is missing. NaN when the raster declares none.
    #[inline]
    pub fn fill_value(&self) -> f64 {
        self.nodata.unwrap_or(f64::NAN)
    }

    #[inline]
    pub fn is_nodata(&self, value: f64) -> bool {
        value.is_nan() || self.nodata.is_some_and(|nd| value == nd)
    }

    /// Copy of the pixel window `(row0, col0, nrows, ncols)` with an aligned grid.
    pub fn crop(&self, row0: usize, col0: usize, nrows: usize, ncols: usize) -> GeoRaster {
        let data = self
            .data
            .slice(s![.., row0..row0 + nrows, col0..col0 + ncols])
            .to_owned();
        GeoRaster {
            data,
            band_names: self.band_names.clone(),
            info: self.info.sub_window(row0, col0, nrows, ncols),
            nodata: self.nodata,
        }
    }
}
