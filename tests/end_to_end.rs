/* Whole-pipeline runs through the public API on synthetic GeoJSON footprints */

use approx::assert_relative_eq;
use geo_types::{Coord, Polygon};
use serde_json::json;
use std::{
    fs,
    path::{Path, PathBuf},
};
use urbanscape::{
    config::{Settings, UcpConfig},
    geo::projection::UtmTable,
    io::read_raster,
    orchestrator::{run_batch, BatchRequest},
    progress::NoProgress,
    ucp::{run_ucp_file, OutputLayout, UcpMetric},
    Stage,
};

/// Axis-aligned footprint of roughly `w` x `h` metres with its south-west corner at (lon, lat).
fn footprint(lon: f64, lat: f64, w: f64, h: f64) -> Polygon<f64> {
    let dx = w / (111_320.0 * lat.to_radians().cos());
    let dy = h / 110_574.0;
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

fn write_footprints(path: &Path, footprints: &[(Polygon<f64>, f64)]) {
    let features: Vec<_> = footprints
        .iter()
        .map(|(poly, height)| {
            let geometry = geojson::Geometry::new(geojson::Value::from(poly));
            json!({"type": "Feature", "properties": {"Height": height}, "geometry": geometry})
        })
        .collect();
    let doc = json!({"type": "FeatureCollection", "features": features});
    fs::write(path, doc.to_string()).unwrap();
}

/// 10 m and 20 m tall buildings of 100 m² and 150 m² sharing the cell centred on (113.0042, 22.0042).
fn two_buildings() -> Vec<(Polygon<f64>, f64)> {
    vec![
        (footprint(113.0035, 22.0035, 10.0, 10.0), 10.0),
        (footprint(113.0045, 22.0045, 10.0, 15.0), 20.0),
    ]
}

fn single_file(input: &Path, destination: &Path, metrics: &[UcpMetric]) -> Vec<PathBuf> {
    fs::create_dir_all(destination).unwrap();
    let layout = OutputLayout::Flat(destination.to_path_buf());
    run_ucp_file(
        input,
        &layout,
        metrics,
        &UcpConfig::default(),
        &UtmTable::new(),
        &destination.join(".scratch"),
    )
    .unwrap()
}

#[test]
fn two_buildings_in_one_cell() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("city.geojson");
    write_footprints(&input, &two_buildings());
    let destination = dir.path().join("out");

    let metrics = [UcpMetric::Count, UcpMetric::Sum, UcpMetric::MeanHeight, UcpMetric::Area];
    let outputs = single_file(&input, &destination, &metrics);
    let names: Vec<_> = outputs
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        ["city_113_23_count.tif", "city_113_23_sumHei.tif", "city_113_23_mh.tif", "city_113_23_area.tif"]
    );

    let value = |path: &PathBuf| {
        let raster = read_raster(path).unwrap();
        assert_eq!(raster.data.shape(), &[1, 1, 1]);
        raster.data[[0, 0, 0]]
    };
    assert_eq!(value(&outputs[0]), 2.0);
    assert_eq!(value(&outputs[1]), 30.0);
    assert_relative_eq!(value(&outputs[2]), 15.0);
    assert_relative_eq!(value(&outputs[3]), 250.0, max_relative = 0.01);
}

#[test]
fn cells_without_buildings_are_zero_or_nan() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("city.geojson");
    let mut buildings = two_buildings();
    // one 5 m building straddling the centre of the cell to the north-east
    buildings.push((footprint(113.0124, 22.0124, 20.0, 20.0), 5.0));
    write_footprints(&input, &buildings);

    let outputs = single_file(&input, &dir.path().join("out"), &[UcpMetric::Count, UcpMetric::MeanHeight]);

    let count = read_raster(&outputs[0]).unwrap();
    assert_eq!(count.data.shape(), &[1, 2, 2]);
    assert_eq!(count.data[[0, 0, 0]], 0.0);
    assert_eq!(count.data[[0, 0, 1]], 1.0);
    assert_eq!(count.data[[0, 1, 0]], 2.0);
    assert_eq!(count.data[[0, 1, 1]], 0.0);

    let mh = read_raster(&outputs[1]).unwrap();
    assert!(mh.data[[0, 0, 0]].is_nan());
    assert_relative_eq!(mh.data[[0, 0, 1]], 5.0);
    assert_relative_eq!(mh.data[[0, 1, 0]], 15.0);
    assert!(mh.data[[0, 1, 1]].is_nan());
}

#[test]
fn malformed_file_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source");
    fs::create_dir_all(source.join("nested")).unwrap();
    write_footprints(&source.join("alpha.geojson"), &two_buildings());
    write_footprints(&source.join("nested").join("beta.geojson"), &two_buildings());
    fs::write(source.join("gamma.geojson"), "{\"type\": \"FeatureCollection\", \"features\": [").unwrap();

    let destination = dir.path().join("out");
    let mut settings = Settings::default();
    settings.batch.workers = String::from("2");
    let request = BatchRequest {
        source,
        destination: destination.clone(),
        metrics: vec![UcpMetric::Count, UcpMetric::Volume],
        landscape: None,
    };
    let report = run_batch(&request, &settings, &NoProgress).unwrap();

    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].input.ends_with("gamma.geojson"));
    assert_eq!(report.failed[0].stage, Some(Stage::Load));

    for folder in ["count", "volume"] {
        let mut files: Vec<_> = fs::read_dir(destination.join(folder))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files.len(), 2, "{folder}");
        assert!(files.iter().all(|f| !f.starts_with("gamma")));
    }
}
