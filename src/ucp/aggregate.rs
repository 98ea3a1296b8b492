/* Reduce the buildings of one file to per-cell aggregates with a polars group-by */

use super::grid::{bin_index, UcpGrid};
use crate::{buildings::BuildingSet, error::Result, geo::projection::UtmTable, prelude::ColumnValues};
use ndarray::{Array2, Array3};
use polars::prelude::*;

/// Per-cell aggregates on the north-up output grid.
#[derive(Debug, Clone)]
pub struct CellStats {
    pub count: Array2<f64>,
    /// Σ height
    pub sum: Array2<f64>,
    /// Σ plan area
    pub area: Array2<f64>,
    /// Σ area·height
    pub volume: Array2<f64>,
    /// mean and population std of height, NaN where empty
    pub mean: Array2<f64>,
    pub std: Array2<f64>,
    /// Σ (area + perimeter·height)
    pub wall: Array2<f64>,
    /// Σ directional length·height, ordered [lf0, lf90, lf45, lf135]
    pub frontal: [Array2<f64>; 4],
    /// ground area of each cell (m²)
    pub cell_area: Array2<f64>,
    /// building counts per height class, one band per class
    pub dh: Array3<f64>,
}

const FRONTAL_COLUMNS: [&str; 4] = ["lf0", "lf90", "lf45", "lf135"];

fn building_frame(buildings: &BuildingSet, grid: &UcpGrid) -> PolarsResult<DataFrame> {
    let mut rows: Vec<u32> = Vec::with_capacity(buildings.len());
    let mut cols: Vec<u32> = Vec::with_capacity(buildings.len());
    let mut height = Vec::with_capacity(buildings.len());
    let mut area = Vec::with_capacity(buildings.len());
    let mut volume = Vec::with_capacity(buildings.len());
    let mut wall = Vec::with_capacity(buildings.len());
    let mut frontal: [Vec<f64>; 4] = Default::default();

    for b in buildings.iter() {
        let Some((row, col)) = grid.cell_of(b.centroid.x, b.centroid.y) else {
            continue;
        };
        rows.push(row as u32);
        cols.push(col as u32);
        height.push(b.height);
        area.push(b.area);
        volume.push(b.area * b.height);
        wall.push(b.area + b.perimeter * b.height);
        for (column, length) in frontal.iter_mut().zip(b.directional) {
            column.push(length * b.height);
        }
    }

    let mut columns = vec![
        Column::new("row".into(), rows),
        Column::new("col".into(), cols),
        Column::new("height".into(), height),
        Column::new("area".into(), area),
        Column::new("volume".into(), volume),
        Column::new("wall".into(), wall),
    ];
    for (name, values) in FRONTAL_COLUMNS.into_iter().zip(frontal) {
        columns.push(Column::new(name.into(), values));
    }
    DataFrame::new(columns)
}

pub fn aggregate(buildings: &BuildingSet, grid: &UcpGrid, height_bins: &[f64], table: &UtmTable) -> Result<CellStats> {
    let shape = (grid.nrows(), grid.ncols());
    let frame = building_frame(buildings, grid)?;

    let mut aggs = vec![
        len().cast(DataType::Float64).alias("count"),
        col("height").sum().alias("sum"),
        col("height").mean().alias("mean"),
        col("height").std(0).alias("std"),
        col("area").sum(),
        col("volume").sum(),
        col("wall").sum(),
    ];
    aggs.extend(FRONTAL_COLUMNS.iter().map(|name| col(*name).sum()));

    let grouped = frame
        .lazy()
        .group_by([col("row"), col("col")])
        .agg(aggs)
        .collect()?;

    let cells: Vec<(usize, usize)> = u32::column_values(&grouped, "row")?
        .into_iter()
        .zip(u32::column_values(&grouped, "col")?)
        .map(|(r, c)| (r.unwrap_or_default() as usize, c.unwrap_or_default() as usize))
        .collect();

    let scatter = |name: &str, background: f64| -> Result<Array2<f64>> {
        let mut band = Array2::from_elem(shape, background);
        for (&(r, c), value) in cells.iter().zip(f64::column_values(&grouped, name)?) {
            if let Some(v) = value {
                band[[r, c]] = v;
            }
        }
        Ok(band)
    };

    let stats = CellStats {
        count: scatter("count", 0.0)?,
        sum: scatter("sum", 0.0)?,
        area: scatter("area", 0.0)?,
        volume: scatter("volume", 0.0)?,
        mean: scatter("mean", f64::NAN)?,
        std: scatter("std", f64::NAN)?,
        wall: scatter("wall", 0.0)?,
        frontal: [
            scatter(FRONTAL_COLUMNS[0], 0.0)?,
            scatter(FRONTAL_COLUMNS[1], 0.0)?,
            scatter(FRONTAL_COLUMNS[2], 0.0)?,
            scatter(FRONTAL_COLUMNS[3], 0.0)?,
        ],
        cell_area: grid.cell_areas(table),
        dh: height_distribution(buildings, grid, height_bins),
    };

    tracing::debug!("aggregated {} buildings into {} cells", buildings.len(), cells.len());
    Ok(stats)
}

/// Count buildings per (height class, row, col).
fn height_distribution(buildings: &BuildingSet, grid: &UcpGrid, height_bins: &[f64]) -> Array3<f64> {
    let nbins = height_bins.len().saturating_sub(1);
    let mut dh = Array3::<f64>::zeros((nbins, grid.nrows(), grid.ncols()));
    for b in buildings.iter() {
        let (Some(class), Some((row, col))) = (bin_index(height_bins, b.height), grid.cell_of(b.centroid.x, b.centroid.y)) else {
            continue;
        };
        dh[[class, row, col]] += 1.0;
    }
    dh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::UcpConfig, ucp::metric::UcpMetric};
    use approx::assert_relative_eq;
    use geo_types::coord;

    fn two_buildings() -> BuildingSet {
        BuildingSet {
            area: vec![100.0, 150.0],
            height: vec![10.0, 20.0],
            centroid: vec![coord! { x: 113.001, y: 22.001 }, coord! { x: 113.002, y: 22.002 }],
            perimeter: vec![40.0, 50.0],
            directional: vec![[10.0, 10.0, 14.0, 14.0], [15.0, 10.0, 18.0, 18.0]],
            footprint_bounds: None,
        }
    }

    #[test]
    fn two_buildings_share_one_cell() {
        let buildings = two_buildings();
        let grid = UcpGrid::from_centroids(&buildings.centroid, 120).unwrap();
        let cfg = UcpConfig::default();
        let stats = aggregate(&buildings, &grid, &cfg.height_bins, &UtmTable::new()).unwrap();

        // south-west corner cell
        let cell = [119, 0];
        assert_eq!(stats.count[cell], 2.0);
        assert_eq!(stats.sum[cell], 30.0);
        assert_eq!(stats.mean[cell], 15.0);
        assert_eq!(stats.std[cell], 5.0);
        assert_eq!(stats.area[cell], 250.0);
        assert_eq!(stats.volume[cell], 100.0 * 10.0 + 150.0 * 20.0);
        assert_eq!(stats.wall[cell], (100.0 + 40.0 * 10.0) + (150.0 + 50.0 * 20.0));
        assert_eq!(stats.frontal[0][cell], 10.0 * 10.0 + 15.0 * 20.0);

        // every other cell is empty
        assert_eq!(stats.count.sum(), 2.0);
        assert_eq!(stats.sum[[0, 0]], 0.0);
        assert!(stats.mean[[0, 0]].is_nan());
        assert!(stats.std[[119, 1]].is_nan());

        // heights 10 and 20 land in classes [10, 15) and [20, 25)
        assert_eq!(stats.dh[[2, 119, 0]], 1.0);
        assert_eq!(stats.dh[[4, 119, 0]], 1.0);
        assert_eq!(stats.dh.sum(), 2.0);
    }

    #[test]
    fn ratios_use_the_cell_ground_area() {
        let buildings = two_buildings();
        let grid = UcpGrid::from_centroids(&buildings.centroid, 120).unwrap();
        let stats = aggregate(&buildings, &grid, &UcpConfig::default().height_bins, &UtmTable::new()).unwrap();
        let cell = [119, 0];

        let lp = UcpMetric::Lp.reduce(&stats);
        assert_relative_eq!(lp[[0, 119, 0]], 250.0 / stats.cell_area[cell]);
        // a 1/120 degree cell at 22°N is close to 0.8 km²
        assert!(stats.cell_area[cell] > 0.78e6 && stats.cell_area[cell] < 0.82e6);

        let haw = UcpMetric::Haw.reduce(&stats);
        assert_relative_eq!(haw[[0, 119, 0]], 4000.0 / 250.0);
        assert!(haw[[0, 0, 0]].is_nan());

        let lp_empty = lp[[0, 0, 0]];
        assert_eq!(lp_empty, 0.0);
        assert_eq!(UcpMetric::Dh.reduce(&stats).shape(), &[15, 120, 120]);
    }
}
