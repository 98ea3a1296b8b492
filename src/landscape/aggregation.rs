/* Aggregation index: observed like-adjacencies over the maximum a compact patch could have */

use ndarray::ArrayView2;
use std::collections::BTreeMap;

/// Like-adjacencies of `class`, each undirected pair counted once through the right and
/// down neighbours. Pixels beyond the array edge never match.
pub fn shared_edges(arr: ArrayView2<i64>, class: i64) -> u64 {
    let (nrows, ncols) = arr.dim();
    let mut count = 0;
    for ((row, col), value) in arr.indexed_iter() {
        if *value != class {
            continue;
        }
        if col + 1 < ncols && arr[[row, col + 1]] == class {
            count += 1;
        }
        if row + 1 < nrows && arr[[row + 1, col]] == class {
            count += 1;
        }
    }
    count
}

/// Maximum like-adjacencies of `area` cells packed as a near-square.
pub fn max_shared_edges(area: u64) -> u64 {
    if area == 0 {
        return 0;
    }
    let mut n = (area as f64).sqrt().floor() as u64;
    // guard against rounding in the square root
    while n * n > area {
        n -= 1;
    }
    while (n + 1) * (n + 1) <= area {
        n += 1;
    }
    let m = area - n * n;
    let base = 2 * n * (n - 1);
    if m == 0 {
        base
    } else if m <= n {
        base + 2 * m - 1
    } else {
        base + 2 * m - 2
    }
}

/// Aggregation index (0-100) of `class`. NaN when the class is absent; a single cell,
/// which has no possible adjacency, scores 0.
pub fn aggregation_index(arr: ArrayView2<i64>, class: i64) -> f64 {
    let area = arr.iter().filter(|v| **v == class).count() as u64;
    if area == 0 {
        return f64::NAN;
    }
    let max_edges = max_shared_edges(area);
    if max_edges == 0 {
        return 0.0;
    }
    100.0 * shared_edges(arr, class) as f64 / max_edges as f64
}

/// Aggregation index of every class present, skipping `nodata` and negative codes.
pub fn aggregation_index_by_class(arr: ArrayView2<i64>, nodata: Option<i64>) -> BTreeMap<i64, f64> {
    let mut classes: Vec<i64> = arr
        .iter()
        .copied()
        .filter(|v| *v >= 0 && Some(*v) != nodata)
        .collect();
    classes.sort_unstable();
    classes.dedup();
    classes
        .into_iter()
        .map(|class| (class, aggregation_index(arr, class)))
        .collect()
}
