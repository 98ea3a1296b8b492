/* Check supported geometries and split them into areal parts */

use crate::error::{Result, UrbanError};
use geo_types::{Geometry, Polygon};

pub fn geometry_type_name(geom: &Geometry) -> &'static str {
    match geom {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Polygons of a footprint geometry; each part of a multipolygon stands alone.
pub fn footprint_parts(geom: &Geometry) -> Result<Vec<&Polygon>> {
    match geom {
        Geometry::Polygon(polygon) => Ok(vec![polygon]),
        Geometry::MultiPolygon(multi) => Ok(multi.0.iter().collect()),
        other => Err(UrbanError::UnsupportedGeometry(geometry_type_name(other).to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{point, polygon, MultiPolygon};

    #[test]
    fn multipolygon_parts_are_independent() {
        let a = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        let b = polygon![(x: 5.0, y: 5.0), (x: 6.0, y: 5.0), (x: 6.0, y: 6.0)];
        let geom = Geometry::MultiPolygon(MultiPolygon(vec![a, b]));
        assert_eq!(footprint_parts(&geom).unwrap().len(), 2);
    }

    #[test]
    fn points_are_unsupported() {
        let geom = Geometry::Point(point!(x: 1.0, y: 2.0));
        match footprint_parts(&geom) {
            Err(UrbanError::UnsupportedGeometry(name)) => assert_eq!(name, "Point"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
