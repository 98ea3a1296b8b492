/* Integer-degree lat/lon binning grid of one footprint file */

use crate::geo::{projection::UtmTable, raster::RasterInfo};
use geo::Area;
use geo_types::{Coord, LineString, Polygon};
use ndarray::{Array2, Axis};
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct UcpGrid {
    pub min_lon: i64,
    pub max_lon: i64,
    pub min_lat: i64,
    pub max_lat: i64,
    pub cells_per_degree: u32,
    /// ascending bin edges
    pub lon_edges: Vec<f64>,
    pub lat_edges: Vec<f64>,
}

fn linspace(start: i64, stop: i64, cells_per_degree: u32) -> Vec<f64> {
    let steps = ((stop - start) as usize) * cells_per_degree as usize;
    let (start, stop) = (start as f64, stop as f64);
    let step = (stop - start) / steps as f64;
    (0..=steps)
        .map(|i| if i == steps { stop } else { start + i as f64 * step })
        .collect()
}

/// Histogram bin of `v` over ascending `edges`: half-open except the last bin,
/// which includes its upper edge. Values outside the edges have no bin.
pub fn bin_index(edges: &[f64], v: f64) -> Option<usize> {
    let last = *edges.last()?;
    if edges.len() < 2 || v.is_nan() || v < edges[0] || v > last {
        return None;
    }
    if v == last {
        return Some(edges.len() - 2);
    }
    Some(edges.partition_point(|e| *e <= v) - 1)
}

impl UcpGrid {
    /// Grid spanning floor(min)..ceil(max) of the centroids, in whole degrees.
    pub fn from_centroids(centroids: &[Coord<f64>], cells_per_degree: u32) -> Option<Self> {
        let first = centroids.first()?;
        let (mut lon_lo, mut lon_hi, mut lat_lo, mut lat_hi) = (first.x, first.x, first.y, first.y);
        for c in centroids {
            lon_lo = lon_lo.min(c.x);
            lon_hi = lon_hi.max(c.x);
            lat_lo = lat_lo.min(c.y);
            lat_hi = lat_hi.max(c.y);
        }

        let min_lon = lon_lo.floor() as i64;
        let min_lat = lat_lo.floor() as i64;
        // keep at least one degree when everything sits on an integer meridian or parallel
        let max_lon = (lon_hi.ceil() as i64).max(min_lon + 1);
        let max_lat = (lat_hi.ceil() as i64).max(min_lat + 1);

        Some(Self {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
            cells_per_degree,
            lon_edges: linspace(min_lon, max_lon, cells_per_degree),
            lat_edges: linspace(min_lat, max_lat, cells_per_degree),
        })
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.lat_edges.len() - 1
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.lon_edges.len() - 1
    }

    #[inline]
    pub fn resolution(&self) -> f64 {
        1.0 / f64::from(self.cells_per_degree)
    }

    /// North-up pixel grid of the outputs.
    pub fn raster_info(&self) -> RasterInfo {
        let res = self.resolution();
        let gt = [self.min_lon as f64, res, 0.0, self.max_lat as f64, 0.0, -res];
        RasterInfo::from_geo_transform(&gt, self.ncols(), self.nrows(), Some(4326))
    }

    /// Output (row, col) of a lon/lat point; rows count down from the north edge.
    pub fn cell_of(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        let lat_bin = bin_index(&self.lat_edges, lat)?;
        let lon_bin = bin_index(&self.lon_edges, lon)?;
        Some((self.nrows() - 1 - lat_bin, lon_bin))
    }

    /// `_{minLon}_{maxLat}_` tag placed between the file stem and the metric suffix.
    pub fn corner_tag(&self) -> String {
        format!("_{}_{}_", self.min_lon, self.max_lat)
    }

    /// Ground area (m²) of each cell: its four corners projected in the UTM zone of
    /// the cell centre, then the planar polygon area.
    pub fn cell_areas(&self, table: &UtmTable) -> Array2<f64> {
        let (nrows, ncols) = (self.nrows(), self.ncols());
        let mut areas = Array2::<f64>::zeros((nrows, ncols));

        areas
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, mut line)| {
                let lat_bin = nrows - 1 - row;
                let (lat0, lat1) = (self.lat_edges[lat_bin], self.lat_edges[lat_bin + 1]);
                for (col, cell) in line.iter_mut().enumerate() {
                    let (lon0, lon1) = (self.lon_edges[col], self.lon_edges[col + 1]);
                    let projection = table.for_point((lon0 + lon1) / 2.0, (lat0 + lat1) / 2.0);
                    let corners: Vec<Coord<f64>> = [(lon0, lat0), (lon0, lat1), (lon1, lat1), (lon1, lat0)]
                        .into_iter()
                        .map(|(x, y)| projection.forward_coord(Coord { x, y }))
                        .collect();
                    *cell = Polygon::new(LineString::from(corners), vec![]).unsigned_area();
                }
            });
        areas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo_types::coord;

    #[test]
    fn histogram_bins_close_the_last_edge() {
        let edges = [0.0, 5.0, 10.0];
        assert_eq!(bin_index(&edges, 0.0), Some(0));
        assert_eq!(bin_index(&edges, 4.999), Some(0));
        assert_eq!(bin_index(&edges, 5.0), Some(1));
        assert_eq!(bin_index(&edges, 10.0), Some(1));
        assert_eq!(bin_index(&edges, 10.5), None);
        assert_eq!(bin_index(&edges, -0.1), None);
        assert_eq!(bin_index(&edges, f64::NAN), None);
    }

    #[test]
    fn grid_covers_whole_degrees() {
        let centroids = [coord! { x: 113.2, y: 22.4 }, coord! { x: 114.7, y: 22.6 }];
        let grid = UcpGrid::from_centroids(&centroids, 120).unwrap();
        assert_eq!((grid.min_lon, grid.max_lon, grid.min_lat, grid.max_lat), (113, 115, 22, 23));
        assert_eq!(grid.ncols(), 240);
        assert_eq!(grid.nrows(), 120);
        assert_eq!(grid.corner_tag(), "_113_23_");

        let info = grid.raster_info();
        assert_eq!((info.ncols, info.nrows), (240, 120));
        assert_relative_eq!(info.ymax, 23.0);
    }

    #[test]
    fn degenerate_extent_is_widened() {
        let grid = UcpGrid::from_centroids(&[coord! { x: 113.0, y: 22.0 }], 4).unwrap();
        assert_eq!((grid.max_lon, grid.max_lat), (114, 23));
        // sits on the south-west corner, i.e. the last output row
        assert_eq!(grid.cell_of(113.0, 22.0), Some((3, 0)));
        assert!(UcpGrid::from_centroids(&[], 120).is_none());
    }

    #[test]
    fn cell_areas_shrink_towards_the_pole() {
        let grid = UcpGrid::from_centroids(&[coord! { x: 113.5, y: 60.5 }], 2).unwrap();
        let areas = grid.cell_areas(&UtmTable::new());
        // northern row is smaller
        assert!(areas[[0, 0]] < areas[[1, 0]]);
        // half a degree is about 55.7 km north-south and 27.7 km east-west at 60.25°N
        assert_relative_eq!(areas[[1, 0]], 55_708.0 * 27_689.0, max_relative = 0.01);
    }
}
