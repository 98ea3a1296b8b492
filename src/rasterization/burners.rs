/* Scanline fill of polygon edges, pixel centers decide membership like GDAL */

use crate::{
    encoding::writers::PixelWriter,
    geo::{edges::PolyEdge, raster::RasterInfo},
};
use num_traits::Num;
use std::cmp::Ordering;

pub fn burn_polygon<T, W>(mut polyedges: Vec<PolyEdge>, raster_info: &RasterInfo, field_value: T, writer: &mut W, background: T)
where
    T: Num + Copy,
    W: PixelWriter<T>,
{
    // sort edges by y coordinate
    polyedges.sort_by(|a, b| a.ystart.cmp(&b.ystart));

    // start with first y line
    let Some(first) = polyedges.first() else {
        return;
    };
    let mut yline = first.ystart;

    let mut active_edges: Vec<PolyEdge> = Vec::new();

    // rasterize loop
    let ncols = raster_info.ncols as f64;
    while yline < raster_info.nrows && (!active_edges.is_empty() || !polyedges.is_empty()) {
        // transfer current edges to active edges
        let split_idx = polyedges.partition_point(|edge| edge.ystart <= yline);
        active_edges.extend(polyedges.drain(..split_idx));

        // remove finished edges
        active_edges.retain(|edge| edge.yend > yline);
        if active_edges.is_empty() {
            yline += 1;
            continue;
        }

        // cache x intersection with y line
        for edge in active_edges.iter_mut() {
            edge.x_at_yline = edge.intersect_at(yline);
        }
        active_edges.sort_by(|a, b| a.x_at_yline.partial_cmp(&b.x_at_yline).unwrap_or(Ordering::Equal));

        // fill pixels between pairs of crossings
        for chunk in active_edges.chunks_exact(2) {
            let xstart = (chunk[0].x_at_yline + 0.5).floor().clamp(0.0, ncols) as usize;
            let xend = (chunk[1].x_at_yline + 0.5).floor().clamp(0.0, ncols) as usize;

            for xpix in xstart..xend {
                writer.write(yline, xpix, field_value, background);
            }
        }

        yline += 1;
    }
}
