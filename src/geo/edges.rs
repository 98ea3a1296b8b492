/* Polygon edges in pixel space for scanline filling */

use crate::geo::raster::RasterInfo;
use geo_types::{LineString, Rect};

pub struct PolyEdge {
    pub ystart: usize,
    pub yend: usize,
    x0: f64,
    y0: f64,
    dxdy: f64,           // slope
    pub x_at_yline: f64, // x intersection with y line
}

impl PolyEdge {
    fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        // make sure we go from top to bottom
        let (x_top, y_top, x_bot, y_bot) = if y0 < y1 { (x0, y0, x1, y1) } else { (x1, y1, x0, y0) };

        // first and last y lines whose centers the edge crosses
        let ystart = (y_top - 0.5).ceil().max(0.0) as usize;
        let yend = (y_bot - 0.5).ceil().max(0.0) as usize;

        Self {
            ystart,
            yend,
            x0: x_top,
            y0: y_top,
            dxdy: (x_bot - x_top) / (y_bot - y_top),
            x_at_yline: f64::NAN,
        }
    }

    #[inline]
    pub fn intersect_at(&self, yline: usize) -> f64 {
        let center_y = yline as f64 + 0.5;
        self.x0 + (center_y - self.y0) * self.dxdy
    }
}

pub fn extract_ring(edges: &mut Vec<PolyEdge>, ring: &LineString<f64>, raster_info: &RasterInfo) {
    let rows = raster_info.nrows as f64;
    for segment in ring.lines() {
        // world-to-pixel conversion
        let (x0, y0) = raster_info.world_to_pixel(segment.start.x, segment.start.y);
        let (x1, y1) = raster_info.world_to_pixel(segment.end.x, segment.end.y);

        // skip horizontal
        if (y0 - y1).abs() < f64::EPSILON {
            continue;
        }
        // only keep if inside the raster
        if y0.min(y1) < rows && y0.max(y1) >= 0.0 {
            edges.push(PolyEdge::new(x0, y0, x1, y1));
        }
    }
}

pub fn extract_rect(edges: &mut Vec<PolyEdge>, rect: &Rect<f64>, raster_info: &RasterInfo) {
    extract_ring(edges, rect.to_polygon().exterior(), raster_info);
}
