/* Load building footprints and derive per-building metric attributes */

use crate::{
    config::UcpConfig,
    error::{Result, UrbanError},
    geo::{
        geodesic::{directional_lengths, DirectionalLengths},
        projection::UtmTable,
        validate::{footprint_parts, geometry_type_name},
    },
    io::{read_vector, VectorLayer},
    rasterization::masking::bounding_rect,
};
use geo::{Area, Centroid, EuclideanLength, Intersects};
use geo_types::{Coord, Geometry, LineString, Polygon, Rect};
use rayon::prelude::*;
use std::path::Path;

/// Attributes of one footprint kept for aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct Building {
    /// planar area (m²)
    pub area: f64,
    /// planar perimeter (m)
    pub perimeter: f64,
    pub height: f64,
    /// lon/lat
    pub centroid: Coord<f64>,
    /// [lf0, lf90, lf45, lf135]
    pub directional: DirectionalLengths,
}

/// Buildings of one footprint file as parallel columns.
#[derive(Debug, Clone, Default)]
pub struct BuildingSet {
    pub area: Vec<f64>,
    pub height: Vec<f64>,
    pub centroid: Vec<Coord<f64>>,
    pub perimeter: Vec<f64>,
    pub directional: Vec<DirectionalLengths>,
    /// bounds of every footprint in the file, kept or not
    pub footprint_bounds: Option<Rect<f64>>,
}

impl BuildingSet {
    pub fn len(&self) -> usize {
        self.area.len()
    }

    pub fn is_empty(&self) -> bool {
        self.area.is_empty()
    }

    fn push(&mut self, b: Building) {
        self.area.push(b.area);
        self.height.push(b.height);
        self.centroid.push(b.centroid);
        self.perimeter.push(b.perimeter);
        self.directional.push(b.directional);
    }

    pub fn iter(&self) -> impl Iterator<Item = Building> + '_ {
        (0..self.len()).map(|i| Building {
            area: self.area[i],
            perimeter: self.perimeter[i],
            height: self.height[i],
            centroid: self.centroid[i],
            directional: self.directional[i],
        })
    }
}

/// Project one footprint polygon in the UTM zone of its first vertex and measure it.
/// Holes are ignored. Returns `None` when the area is outside `(min_area, max_area)`.
pub fn process_footprint(polygon: &Polygon<f64>, height: f64, cfg: &UcpConfig, table: &UtmTable) -> Option<Building> {
    let mut vertices: Vec<Coord<f64>> = polygon.exterior().0.clone();
    if vertices.len() > 1 && vertices.first() == vertices.last() {
        vertices.pop();
    }
    let first = *vertices.first()?;
    let projection = table.for_point(first.x, first.y);

    let projected: Vec<Coord<f64>> = vertices.iter().map(|c| projection.forward_coord(*c)).collect();
    let shape = Polygon::new(LineString::from(projected), vec![]);
    let area = shape.unsigned_area();
    if area <= cfg.min_area || area >= cfg.max_area {
        return None;
    }

    let centroid = projection.inverse_coord(shape.centroid()?.0);
    Some(Building {
        area,
        perimeter: shape.exterior().euclidean_length(),
        height,
        centroid,
        directional: directional_lengths(&vertices),
    })
}

enum FeatureOutcome {
    Kept(Vec<Building>),
    Skipped,
    Unsupported(&'static str),
}

fn process_feature(geometry: Option<&Geometry<f64>>, height: Option<f64>, cfg: &UcpConfig, table: &UtmTable) -> FeatureOutcome {
    let (Some(geometry), Some(height)) = (geometry, height) else {
        return FeatureOutcome::Skipped;
    };
    if height.is_nan() || height < cfg.min_height {
        return FeatureOutcome::Skipped;
    }
    match footprint_parts(geometry) {
        Ok(parts) => FeatureOutcome::Kept(
            parts
                .into_iter()
                .filter_map(|polygon| process_footprint(polygon, height, cfg, table))
                .collect(),
        ),
        Err(_) => FeatureOutcome::Unsupported(geometry_type_name(geometry)),
    }
}

/// Measure every usable footprint of a layer. The layer must be in WGS84 lon/lat.
pub fn buildings_from_layer(layer: &VectorLayer, path: &Path, cfg: &UcpConfig, table: &UtmTable) -> Result<BuildingSet> {
    if let Some(epsg) = layer.epsg.filter(|code| *code != 4326) {
        return Err(UrbanError::CrsMismatch {
            left: format!("{} (EPSG:{epsg})", path.display()),
            right: String::from("EPSG:4326"),
        });
    }

    let outcomes: Vec<FeatureOutcome> = layer
        .features
        .par_iter()
        .map(|feature| process_feature(feature.geometry.as_ref(), feature.numeric(&cfg.height_field), cfg, table))
        .collect();

    let mut set = BuildingSet {
        footprint_bounds: bounding_rect(&layer.geometries()),
        ..Default::default()
    };
    let mut skipped = 0usize;
    for outcome in outcomes {
        match outcome {
            FeatureOutcome::Kept(buildings) => buildings.into_iter().for_each(|b| set.push(b)),
            FeatureOutcome::Skipped => skipped += 1,
            FeatureOutcome::Unsupported(kind) => {
                tracing::warn!("{}: unsupported geometry type {kind}, feature skipped", path.display());
                skipped += 1;
            }
        }
    }

    tracing::info!(
        "loaded {} buildings from {} ({} features skipped)",
        set.len(),
        path.display(),
        skipped
    );
    Ok(set)
}

/// Read a footprint file and keep the buildings that pass the filters.
pub fn load_buildings(path: &Path, cfg: &UcpConfig, table: &UtmTable) -> Result<BuildingSet> {
    let layer = read_vector(path)?;
    buildings_from_layer(&layer, path, cfg, table)
}

/// Keep the footprints that touch any of the region polygons.
pub fn select_buildings_in_region(layer: &VectorLayer, region: &[Geometry<f64>]) -> VectorLayer {
    let features = layer
        .features
        .iter()
        .filter(|f| {
            f.geometry
                .as_ref()
                .is_some_and(|g| region.iter().any(|r| r.intersects(g)))
        })
        .cloned()
        .collect();
    VectorLayer {
        features,
        epsg: layer.epsg,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use geo_types::{Coord, Polygon};
    use serde_json::json;
    use std::path::Path;

    const M_PER_DEG_LAT: f64 = 110_574.0;

    /// Axis-aligned lon/lat rectangle of roughly `w` x `h` metres at (lon, lat).
    pub fn metric_rect(lon: f64, lat: f64, w: f64, h: f64) -> Polygon<f64> {
        let dx = w / (111_320.0 * lat.to_radians().cos());
        let dy = h / M_PER_DEG_LAT;
        Polygon::new(
            vec![
                Coord { x: lon, y: lat },
                Coord { x: lon + dx, y: lat },
                Coord { x: lon + dx, y: lat + dy },
                Coord { x: lon, y: lat + dy },
                Coord { x: lon, y: lat },
            ]
            .into(),
            vec![],
        )
    }

    /// Write a GeoJSON footprint file with one `Height` per polygon.
    pub fn write_footprint_file(path: &Path, footprints: &[(Polygon<f64>, f64)]) {
        let features: Vec<_> = footprints
            .iter()
            .map(|(poly, height)| {
                let geometry = geojson::Geometry::new(geojson::Value::from(poly));
                json!({"type": "Feature", "properties": {"Height": height}, "geometry": geometry})
            })
            .collect();
        let doc = json!({"type": "FeatureCollection", "features": features});
        std::fs::write(path, doc.to_string()).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::{fixtures::metric_rect, *};
    use crate::io::VectorFeature;
    use approx::assert_relative_eq;
    use geo_types::{point, MultiPolygon};
    use serde_json::{json, Map, Value};

    fn feature(geometry: Geometry<f64>, height: Value) -> VectorFeature {
        let mut properties = Map::new();
        properties.insert(String::from("Height"), height);
        VectorFeature {
            geometry: Some(geometry),
            properties,
        }
    }

    #[test]
    fn measures_a_ten_metre_square() {
        let table = UtmTable::new();
        let cfg = UcpConfig::default();
        let b = process_footprint(&metric_rect(113.0, 22.0, 10.0, 10.0), 12.0, &cfg, &table).unwrap();

        assert_relative_eq!(b.area, 100.0, max_relative = 0.01);
        assert_relative_eq!(b.perimeter, 40.0, max_relative = 0.01);
        assert!(b.centroid.x > 113.0 && b.centroid.x < 113.0001);
        assert!(b.centroid.y > 22.0 && b.centroid.y < 22.0001);
        assert_relative_eq!(b.directional[0], 10.0, max_relative = 0.02);
    }

    #[test]
    fn perimeter_of_an_oblong_footprint() {
        let table = UtmTable::new();
        let b = process_footprint(&metric_rect(113.2, 22.5, 10.0, 15.0), 8.0, &UcpConfig::default(), &table).unwrap();
        assert_relative_eq!(b.area, 150.0, max_relative = 0.01);
        assert_relative_eq!(b.perimeter, 50.0, max_relative = 0.01);
    }

    #[test]
    fn loaded_buildings_respect_filters() {
        let table = UtmTable::new();
        let cfg = UcpConfig::default();
        let layer = VectorLayer {
            features: vec![
                feature(Geometry::Polygon(metric_rect(113.0, 22.0, 10.0, 10.0)), json!(10.0)),
                // too low
                feature(Geometry::Polygon(metric_rect(113.001, 22.0, 10.0, 10.0)), json!(0.5)),
                // too small
                feature(Geometry::Polygon(metric_rect(113.002, 22.0, 2.0, 2.0)), json!(10.0)),
                // too large
                feature(Geometry::Polygon(metric_rect(113.01, 22.0, 700.0, 700.0)), json!(10.0)),
                // unsupported
                feature(Geometry::Point(point!(x: 113.0, y: 22.0)), json!(10.0)),
                // two independent parts
                feature(
                    Geometry::MultiPolygon(MultiPolygon(vec![
                        metric_rect(113.003, 22.0, 8.0, 8.0),
                        metric_rect(113.004, 22.0, 9.0, 9.0),
                    ])),
                    json!(6.0),
                ),
                VectorFeature {
                    geometry: None,
                    properties: Map::new(),
                },
            ],
            epsg: Some(4326),
        };

        let set = buildings_from_layer(&layer, Path::new("mem.geojson"), &cfg, &table).unwrap();
        assert_eq!(set.len(), 3);
        for b in set.iter() {
            assert!(b.area > 5.0 && b.area < 400_000.0);
            assert!(b.height >= 1.0);
        }
        assert_eq!(set.height, vec![10.0, 6.0, 6.0]);
        assert!(set.footprint_bounds.is_some());
    }

    #[test]
    fn projected_layers_are_rejected() {
        let layer = VectorLayer {
            features: vec![],
            epsg: Some(32650),
        };
        let err = buildings_from_layer(&layer, Path::new("utm.shp"), &UcpConfig::default(), &UtmTable::new());
        assert!(matches!(err, Err(UrbanError::CrsMismatch { .. })));
    }

    #[test]
    fn region_selection_uses_intersection() {
        let inside = feature(Geometry::Polygon(metric_rect(113.0, 22.0, 10.0, 10.0)), json!(3));
        let outside = feature(Geometry::Polygon(metric_rect(114.0, 22.0, 10.0, 10.0)), json!(3));
        let layer = VectorLayer {
            features: vec![inside, outside],
            epsg: Some(4326),
        };
        let roi = Geometry::Polygon(metric_rect(112.999, 21.999, 500.0, 500.0));

        let selected = select_buildings_in_region(&layer, &[roi]);
        assert_eq!(selected.features.len(), 1);
    }
}
