/* Directional projected lengths of a footprint from geodesic vertex pairs */

use geo::{Bearing, Distance, Geodesic};
use geo_types::{Coord, Point};

/// Maximum projected length per direction, ordered [lf0, lf90, lf45, lf135].
pub type DirectionalLengths = [f64; 4];

/// For every unordered pair of vertices, take the WGS84 geodesic distance `d` and
/// forward azimuth `az`, and keep the per-direction maximum of
/// `|d·sin az|`, `|d·cos az|`, `|d·sin(az-45°)|`, `|d·cos(az-45°)|`.
/// Fewer than two vertices yield zeros.
pub fn directional_lengths(vertices: &[Coord<f64>]) -> DirectionalLengths {
    let mut maxima = [0.0_f64; 4];

    for (i, a) in vertices.iter().enumerate() {
        let pa = Point::from(*a);
        for b in &vertices[i + 1..] {
            let pb = Point::from(*b);
            let distance = Geodesic::distance(pa, pb);
            if distance == 0.0 {
                continue;
            }
            let azimuth = Geodesic::bearing(pa, pb).rem_euclid(360.0);

            let (sin_az, cos_az) = azimuth.to_radians().sin_cos();
            let (sin_diag, cos_diag) = (azimuth - 45.0).to_radians().sin_cos();

            let projected = [
                (distance * sin_az).abs(),
                (distance * cos_az).abs(),
                (distance * sin_diag).abs(),
                (distance * cos_diag).abs(),
            ];
            for (slot, value) in maxima.iter_mut().zip(projected) {
                *slot = slot.max(value);
            }
        }
    }

    maxima
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo_types::coord;

    #[test]
    fn degenerate_inputs_yield_zeros() {
        assert_eq!(directional_lengths(&[]), [0.0; 4]);
        assert_eq!(directional_lengths(&[coord! { x: 113.0, y: 22.0 }]), [0.0; 4]);
    }

    #[test]
    fn east_west_segment_projects_on_first_axis() {
        let a = coord! { x: 113.0, y: 22.0 };
        let b = coord! { x: 113.001, y: 22.0 };
        let lengths = directional_lengths(&[a, b]);
        let d = Geodesic::distance(Point::from(a), Point::from(b));

        assert_relative_eq!(lengths[0], d, max_relative = 1e-6);
        assert!(lengths[1] < 1e-3 * d);
        // 45 degrees off both diagonals
        assert_relative_eq!(lengths[2], d * std::f64::consts::FRAC_1_SQRT_2, max_relative = 1e-4);
        assert_relative_eq!(lengths[3], d * std::f64::consts::FRAC_1_SQRT_2, max_relative = 1e-4);
    }

    #[test]
    fn square_keeps_largest_pair() {
        // roughly 10 m square; the diagonal dominates the 45 degree arm
        let dx = 10.0 / (111_320.0 * 22.0_f64.to_radians().cos());
        let dy = 10.0 / 110_574.0;
        let square = [
            coord! { x: 113.0, y: 22.0 },
            coord! { x: 113.0 + dx, y: 22.0 },
            coord! { x: 113.0 + dx, y: 22.0 + dy },
            coord! { x: 113.0, y: 22.0 + dy },
        ];
        let lengths = directional_lengths(&square);
        assert!(lengths[0] > 9.9 && lengths[0] < 10.1, "{lengths:?}");
        assert!(lengths[1] > 9.9 && lengths[1] < 10.1, "{lengths:?}");
        assert!(lengths[2] > 14.0 && lengths[2] < 14.3, "{lengths:?}");
    }
}
