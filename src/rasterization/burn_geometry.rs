/* Rasterize a single areal geometry */

use crate::{
    encoding::writers::PixelWriter,
    geo::{
        edges::{extract_rect, extract_ring, PolyEdge},
        raster::RasterInfo,
    },
    rasterization::burners::burn_polygon,
};
use geo_types::{Geometry, GeometryCollection, MultiPolygon, Polygon, Rect};
use num_traits::Num;

pub trait Burn<T, W>
where
    T: Num + Copy,
    W: PixelWriter<T>,
{
    fn burn(&self, raster_info: &RasterInfo, field_value: T, writer: &mut W, background: T);
}

fn polygon_edges(edges: &mut Vec<PolyEdge>, polygon: &Polygon, raster_info: &RasterInfo) {
    extract_ring(edges, polygon.exterior(), raster_info);
    for hole in polygon.interiors() {
        extract_ring(edges, hole, raster_info);
    }
}

impl<T, W> Burn<T, W> for Geometry
where
    T: Num + Copy,
    W: PixelWriter<T>,
{
    fn burn(&self, raster_info: &RasterInfo, field_value: T, writer: &mut W, background: T) {
        match self {
            Geometry::Polygon(geom) => geom.burn(raster_info, field_value, writer, background),
            Geometry::MultiPolygon(geom) => geom.burn(raster_info, field_value, writer, background),
            Geometry::Rect(geom) => geom.burn(raster_info, field_value, writer, background),
            Geometry::GeometryCollection(geom) => geom.burn(raster_info, field_value, writer, background),
            _ => (), // not areal
        }
    }
}

impl<T, W> Burn<T, W> for GeometryCollection
where
    T: Num + Copy,
    W: PixelWriter<T>,
{
    fn burn(&self, raster_info: &RasterInfo, field_value: T, writer: &mut W, background: T) {
        for geom in self {
            geom.burn(raster_info, field_value, writer, background)
        }
    }
}

impl<T, W> Burn<T, W> for Polygon
where
    T: Num + Copy,
    W: PixelWriter<T>,
{
    fn burn(&self, raster_info: &RasterInfo, field_value: T, writer: &mut W, background: T) {
        let mut polyedges = Vec::new();
        polygon_edges(&mut polyedges, self, raster_info);
        burn_polygon(polyedges, raster_info, field_value, writer, background);
    }
}

impl<T, W> Burn<T, W> for MultiPolygon
where
    T: Num + Copy,
    W: PixelWriter<T>,
{
    fn burn(&self, raster_info: &RasterInfo, field_value: T, writer: &mut W, background: T) {
        // one edge table for all members so overlapping parts follow even-odd
        let mut polyedges = Vec::new();
        for polygon in self {
            polygon_edges(&mut polyedges, polygon, raster_info);
        }
        burn_polygon(polyedges, raster_info, field_value, writer, background);
    }
}

impl<T, W> Burn<T, W> for Rect
where
    T: Num + Copy,
    W: PixelWriter<T>,
{
    fn burn(&self, raster_info: &RasterInfo, field_value: T, writer: &mut W, background: T) {
        let mut polyedges = Vec::new();
        extract_rect(&mut polyedges, self, raster_info);
        burn_polygon(polyedges, raster_info, field_value, writer, background);
    }
}
