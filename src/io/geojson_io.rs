/* Read GeoJSON feature files into geo-types geometries with their attributes */

use super::{VectorFeature, VectorLayer};
use crate::error::{Result, UrbanError};
use geojson::{Feature, GeoJson, JsonObject, JsonValue};
use geo_types::Geometry;
use std::path::Path;

/// EPSG code of a legacy `crs` member, e.g. `urn:ogc:def:crs:EPSG::32650`.
/// Files without one are WGS84 longitude/latitude.
fn legacy_crs(foreign: Option<&JsonObject>) -> Option<u32> {
    let name = foreign?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;

    if name.ends_with("CRS84") {
        return Some(4326);
    }
    let digits: String = name
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

pub fn read_geojson(path: &Path) -> Result<VectorLayer> {
    let content = std::fs::read_to_string(path).map_err(|e| UrbanError::io(path, e))?;
    let geojson: GeoJson = content
        .parse()
        .map_err(|e: geojson::Error| UrbanError::vector(path, e))?;

    let (features, epsg) = match geojson {
        GeoJson::FeatureCollection(fc) => {
            let epsg = legacy_crs(fc.foreign_members.as_ref()).unwrap_or(4326);
            (fc.features, epsg)
        }
        GeoJson::Feature(f) => (vec![f], 4326),
        GeoJson::Geometry(g) => (
            vec![Feature {
                bbox: None,
                geometry: Some(g),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            4326,
        ),
    };

    let mut out = Vec::with_capacity(features.len());
    for feature in features {
        let geometry = match feature.geometry {
            Some(g) => Some(Geometry::<f64>::try_from(g).map_err(|e| UrbanError::vector(path, e))?),
            None => None,
        };
        out.push(VectorFeature {
            geometry,
            properties: feature.properties.unwrap_or_default(),
        });
    }

    tracing::debug!("read {} features from {}", out.len(), path.display());

    Ok(VectorLayer {
        features: out,
        epsg: Some(epsg),
    })
}

/// Numeric attribute value; numeric strings are accepted too.
pub(crate) fn numeric_value(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
