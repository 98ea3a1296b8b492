/*
Class-level pattern metrics of a classified window.
Negative codes are outside the landscape, so is the configured no-data class.
 */

use crate::config::Connectivity;
use ndarray::{Array2, ArrayView2};
use std::collections::VecDeque;

const FOUR: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
const EIGHT: [(isize, isize); 8] = [(-1, -1), (-1, 0), (-1, 1), (0, -1), (0, 1), (1, -1), (1, 0), (1, 1)];

impl Connectivity {
    fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &FOUR,
            Connectivity::Eight => &EIGHT,
        }
    }
}

/// Ground size of one pixel in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSize {
    pub width: f64,
    pub height: f64,
}

impl PixelSize {
    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassPattern {
    pub largest_patch_index: f64,
    pub patch_density: f64,
    pub edge_density: f64,
    pub landscape_shape_index: f64,
}

impl ClassPattern {
    pub const NAN: ClassPattern = ClassPattern {
        largest_patch_index: f64::NAN,
        patch_density: f64::NAN,
        edge_density: f64::NAN,
        landscape_shape_index: f64::NAN,
    };
}

/// Label the patches of `class`. Labels start at 1, 0 marks other pixels.
/// Returns the label image and the pixel count of each patch.
pub fn label_patches(arr: ArrayView2<i64>, class: i64, connectivity: Connectivity) -> (Array2<u32>, Vec<usize>) {
    let (nrows, ncols) = arr.dim();
    let mut labels = Array2::<u32>::zeros((nrows, ncols));
    let mut sizes = Vec::new();
    let mut queue = VecDeque::new();

    for ((row, col), value) in arr.indexed_iter() {
        if *value != class || labels[[row, col]] != 0 {
            continue;
        }
        let label = sizes.len() as u32 + 1;
        labels[[row, col]] = label;
        queue.push_back((row, col));
        let mut size = 0;

        while let Some((r, c)) = queue.pop_front() {
            size += 1;
            for &(dr, dc) in connectivity.offsets() {
                let (Some(nr), Some(nc)) = (r.checked_add_signed(dr), c.checked_add_signed(dc)) else {
                    continue;
                };
                if nr < nrows && nc < ncols && arr[[nr, nc]] == class && labels[[nr, nc]] == 0 {
                    labels[[nr, nc]] = label;
                    queue.push_back((nr, nc));
                }
            }
        }
        sizes.push(size);
    }
    (labels, sizes)
}

/// Class edge as (cell sides, length in metres). Every side of a class pixel facing
/// anything else counts, including the window border.
pub fn class_edges(arr: ArrayView2<i64>, class: i64, pixel: PixelSize) -> (usize, f64) {
    let (nrows, ncols) = arr.dim();
    let differs = |r: Option<usize>, c: Option<usize>| match (r, c) {
        (Some(r), Some(c)) if r < nrows && c < ncols => arr[[r, c]] != class,
        _ => true,
    };

    let mut horizontal = 0;
    let mut vertical = 0;
    for ((row, col), value) in arr.indexed_iter() {
        if *value != class {
            continue;
        }
        // top and bottom sides run along the pixel width
        horizontal += usize::from(differs(row.checked_sub(1), Some(col)));
        horizontal += usize::from(differs(Some(row + 1), Some(col)));
        vertical += usize::from(differs(Some(row), col.checked_sub(1)));
        vertical += usize::from(differs(Some(row), Some(col + 1)));
    }
    let length = horizontal as f64 * pixel.width + vertical as f64 * pixel.height;
    (horizontal + vertical, length)
}

/// Smallest perimeter, in cell sides, of `area` cells.
pub fn min_edges(area: usize) -> usize {
    let mut n = (area as f64).sqrt().floor() as usize;
    while n * n > area {
        n -= 1;
    }
    while (n + 1) * (n + 1) <= area {
        n += 1;
    }
    if area == n * n {
        4 * n
    } else if area <= n * (n + 1) {
        4 * n + 2
    } else {
        4 * n + 4
    }
}

pub fn class_pattern(
    arr: ArrayView2<i64>,
    class: i64,
    nodata: i64,
    connectivity: Connectivity,
    pixel: PixelSize,
) -> ClassPattern {
    let landscape_cells = arr.iter().filter(|v| **v >= 0 && **v != nodata).count();
    if landscape_cells == 0 || class == nodata {
        return ClassPattern::NAN;
    }
    let landscape_area = landscape_cells as f64 * pixel.area();

    let (_, sizes) = label_patches(arr, class, connectivity);
    let class_cells: usize = sizes.iter().sum();
    let largest = sizes.iter().copied().max().unwrap_or(0);
    let (sides, length) = class_edges(arr, class, pixel);

    ClassPattern {
        largest_patch_index: 100.0 * largest as f64 / landscape_cells as f64,
        // patches per 100 ha
        patch_density: sizes.len() as f64 / landscape_area * 1.0e6,
        // metres per ha
        edge_density: length / landscape_area * 1.0e4,
        landscape_shape_index: if class_cells == 0 {
            f64::NAN
        } else {
            sides as f64 / min_edges(class_cells) as f64
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    const TEN_METRES: PixelSize = PixelSize {
        width: 10.0,
        height: 10.0,
    };

    #[test]
    fn connectivity_decides_diagonal_patches() {
        let arr = array![[1, 0], [0, 1]];
        assert_eq!(label_patches(arr.view(), 1, Connectivity::Eight).1, vec![2]);
        assert_eq!(label_patches(arr.view(), 1, Connectivity::Four).1, vec![1, 1]);
    }

    #[test]
    fn labels_cover_each_patch() {
        let arr = array![[1, 1, 0], [0, 0, 0], [1, 0, 1]];
        let (labels, sizes) = label_patches(arr.view(), 1, Connectivity::Four);
        assert_eq!(sizes, vec![2, 1, 1]);
        assert_eq!(labels[[0, 1]], 1);
        assert_eq!(labels[[2, 2]], 3);
        assert_eq!(labels[[1, 1]], 0);
    }

    #[test]
    fn min_edge_branches() {
        assert_eq!(min_edges(1), 4);
        assert_eq!(min_edges(4), 8);
        assert_eq!(min_edges(5), 10);
        assert_eq!(min_edges(6), 10);
        assert_eq!(min_edges(7), 12);
    }

    #[test]
    fn hand_computed_window() {
        // two patches: an L of three cells and a single corner cell
        let arr = array![[1, 1, 0], [1, 0, 0], [0, 0, 1]];
        let pattern = class_pattern(arr.view(), 1, 3, Connectivity::Eight, TEN_METRES);

        assert_relative_eq!(pattern.largest_patch_index, 100.0 * 3.0 / 9.0);
        // 2 patches over 900 m²
        assert_relative_eq!(pattern.patch_density, 2.0 / 900.0 * 1.0e6);
        // 12 sides of 10 m
        assert_relative_eq!(pattern.edge_density, 120.0 / 900.0 * 1.0e4);
        assert_relative_eq!(pattern.landscape_shape_index, 12.0 / 8.0);
    }

    #[test]
    fn nodata_class_shrinks_the_landscape() {
        let arr = array![[1, 1], [3, 3]];
        let pattern = class_pattern(arr.view(), 1, 3, Connectivity::Eight, TEN_METRES);
        assert_relative_eq!(pattern.largest_patch_index, 100.0);
        // the rectangle has 6 sides against a 2-cell minimum of 6
        assert_relative_eq!(pattern.landscape_shape_index, 1.0);

        let empty = class_pattern(array![[3, -1]].view(), 1, 3, Connectivity::Eight, TEN_METRES);
        assert!(empty.largest_patch_index.is_nan());
    }

    #[test]
    fn edge_lengths_follow_pixel_shape() {
        let arr = array![[1]];
        let pixel = PixelSize {
            width: 2.0,
            height: 5.0,
        };
        assert_eq!(class_edges(arr.view(), 1, pixel), (4, 2.0 * 2.0 + 2.0 * 5.0));
    }
}
