/* Structure to contain information on a north-up raster grid */

use geo_types::{Rect, coord};
use ndarray::Array3;
use num_traits::Num;

#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
    pub ncols: usize,
    pub nrows: usize,
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    pub xres: f64,
    pub yres: f64,
    pub epsg: Option<u32>,
}

impl RasterInfo {
    // shape is derived from extent and resolution
    pub fn from_extent(xmin: f64, ymin: f64, xmax: f64, ymax: f64, xres: f64, yres: f64, epsg: Option<u32>) -> Self {
        let mut info = RasterInfo {
            ncols: 0,
            nrows: 0,
            xmin,
            xmax,
            ymin,
            ymax,
            xres,
            yres,
            epsg,
        };
        info.assign_shape();
        info
    }

    /// Build from a GDAL-style geotransform. A positive `gt[5]` (south-up) is normalised away.
    pub fn from_geo_transform(gt: &[f64; 6], ncols: usize, nrows: usize, epsg: Option<u32>) -> Self {
        let xres = gt[1].abs();
        let yres = gt[5].abs();
        let (ymin, ymax) = if gt[5] < 0.0 {
            (gt[3] - nrows as f64 * yres, gt[3])
        } else {
            (gt[3], gt[3] + nrows as f64 * yres)
        };
        RasterInfo {
            ncols,
            nrows,
            xmin: gt[0],
            xmax: gt[0] + ncols as f64 * xres,
            ymin,
            ymax,
            xres,
            yres,
            epsg,
        }
    }

    pub fn geo_transform(&self) -> [f64; 6] {
        [self.xmin, self.xres, 0.0, self.ymax, 0.0, -self.yres]
    }

    #[inline]
    fn assign_shape(&mut self) {
        self.nrows = (0.5 + (self.ymax - self.ymin) / self.yres) as usize;
        self.ncols = (0.5 + (self.xmax - self.xmin) / self.xres) as usize;
        // snap max bounds to the pixel grid
        self.xmax = self.xmin + self.ncols as f64 * self.xres;
        self.ymin = self.ymax - self.nrows as f64 * self.yres;
    }

    pub fn build_raster<T>(&self, bands: usize, background: T) -> Array3<T>
    where
        T: Num + Copy,
    {
        Array3::from_elem((bands, self.nrows, self.ncols), background)
    }

    // world rectangle covered by one pixel
    pub fn pixel_bounds(&self, row: usize, col: usize) -> Rect<f64> {
        let x0 = self.xmin + col as f64 * self.xres;
        let y1 = self.ymax - row as f64 * self.yres;
        Rect::new(coord! { x: x0, y: y1 - self.yres }, coord! { x: x0 + self.xres, y: y1 })
    }

    #[inline]
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.xmin + (col as f64 + 0.5) * self.xres,
            self.ymax - (row as f64 + 0.5) * self.yres,
        )
    }

    /// Fractional (col, row) of a world coordinate.
    #[inline]
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.xmin) / self.xres, (self.ymax - y) / self.yres)
    }

    /// Pixel window `(row0, col0, nrows, ncols)` covering `rect`, clamped to the raster.
    /// Returns `None` when the rectangle misses the raster.
    pub fn window_of(&self, rect: &Rect<f64>) -> Option<(usize, usize, usize, usize)> {
        let (c0, r0) = self.world_to_pixel(rect.min().x, rect.max().y);
        let (c1, r1) = self.world_to_pixel(rect.max().x, rect.min().y);

        let col0 = c0.floor().max(0.0);
        let row0 = r0.floor().max(0.0);
        let col1 = c1.ceil().min(self.ncols as f64);
        let row1 = r1.ceil().min(self.nrows as f64);

        if col1 <= col0 || row1 <= row0 {
            return None;
        }
        Some((
            row0 as usize,
            col0 as usize,
            (row1 - row0) as usize,
            (col1 - col0) as usize,
        ))
    }

    /// Grid describing a sub-window of this raster.
    pub fn sub_window(&self, row0: usize, col0: usize, nrows: usize, ncols: usize) -> RasterInfo {
        let xmin = self.xmin + col0 as f64 * self.xres;
        let ymax = self.ymax - row0 as f64 * self.yres;
        RasterInfo {
            ncols,
            nrows,
            xmin,
            xmax: xmin + ncols as f64 * self.xres,
            ymin: ymax - nrows as f64 * self.yres,
            ymax,
            xres: self.xres,
            yres: self.yres,
            epsg: self.epsg,
        }
    }
}
