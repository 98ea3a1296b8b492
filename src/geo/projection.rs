/*
UTM projection on the WGS84 ellipsoid.
Transverse Mercator after Karney (2011), 6th order Krüger series evaluated with Clenshaw sums.
Only the 120 UTM zone/hemisphere pairs of WGS84 are needed, so this stays in Rust instead of
going through PROJ: the default build (GeoJSON + native GeoTIFF) links no C libraries, and the
series is accurate to well below a millimetre inside a zone.
 */

use geo_types::Coord;
use num_complex::Complex64;
use std::f64::consts::FRAC_PI_2;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const UTM_K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;
const ORDER: usize = 6;

// alpha (forward) and beta (inverse) series; last entry is the divisor
const ALPHA_COEFFS: [&[f64]; ORDER] = [
    &[31564.0, -66675.0, 34440.0, 47250.0, -100800.0, 75600.0, 151200.0],
    &[-1983433.0, 863232.0, 748608.0, -1161216.0, 524160.0, 1935360.0],
    &[670412.0, 406647.0, -533952.0, 184464.0, 725760.0],
    &[6601661.0, -7732800.0, 2230245.0, 7257600.0],
    &[-13675556.0, 3438171.0, 7983360.0],
    &[212378941.0, 319334400.0],
];

const BETA_COEFFS: [&[f64]; ORDER] = [
    &[384796.0, -382725.0, -6720.0, 932400.0, -1612800.0, 1209600.0, 2419200.0],
    &[-1118711.0, 1695744.0, -1174656.0, 258048.0, 80640.0, 3870720.0],
    &[22276.0, -16929.0, -15984.0, 12852.0, 362880.0],
    &[-830251.0, -158400.0, 197865.0, 7257600.0],
    &[-435388.0, 453717.0, 15966720.0],
    &[20648693.0, 638668800.0],
];

// rectifying radius factor in n², divisor last
const B1_COEFFS: [f64; 4] = [1.0, 4.0, 64.0, 256.0];
const B1_DIVISOR: f64 = 256.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hemisphere {
    North,
    South,
}

impl Hemisphere {
    #[inline]
    pub fn of_latitude(lat: f64) -> Self {
        if lat < 0.0 { Hemisphere::South } else { Hemisphere::North }
    }
}

/// UTM zone 1..=60 of a longitude. Longitudes at or past 180° fold into zone 60.
#[inline]
pub fn utm_zone(lon: f64) -> u8 {
    let zone = ((lon + 180.0) / 6.0).floor() as i64 + 1;
    zone.clamp(1, 60) as u8
}

#[inline]
fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().fold(0.0, |acc, &c| acc * x + c)
}

#[inline]
fn eatanhe(x: f64, es: f64) -> f64 {
    es * (es * x).atanh()
}

// tan(phi) -> tan(conformal latitude)
#[inline]
fn taupf(tau: f64, es: f64) -> f64 {
    let tau1 = tau.hypot(1.0);
    let sig = eatanhe(tau / tau1, es).sinh();
    sig.hypot(1.0) * tau - sig * tau1
}

// tan(conformal latitude) -> tan(phi), Newton iteration
fn tauf(taup: f64, es: f64) -> f64 {
    const MAX_ITER: usize = 8;
    let e2m = 1.0 - es * es;
    let tol = f64::EPSILON.sqrt() * 0.1 * taup.abs().max(1.0);

    let mut tau = taup / e2m.sqrt();
    for _ in 0..MAX_ITER {
        let taupa = taupf(tau, es);
        let dtau = (taup - taupa) * (1.0 + e2m * tau * tau) / (e2m * tau.hypot(1.0) * taupa.hypot(1.0));
        tau += dtau;
        if dtau.abs() < tol {
            break;
        }
    }
    tau
}

/// Forward and inverse transverse Mercator for one UTM zone and hemisphere.
#[derive(Debug, Clone)]
pub struct UtmProjection {
    zone: u8,
    hemisphere: Hemisphere,
    central_meridian: f64,
    false_northing: f64,
    es: f64,
    a1: f64,
    alp: [f64; ORDER],
    bet: [f64; ORDER],
}

impl UtmProjection {
    pub fn new(zone: u8, hemisphere: Hemisphere) -> Self {
        let zone = zone.clamp(1, 60);
        let f = WGS84_F;
        let e2 = f * (2.0 - f);
        let n = f / (2.0 - f);

        let b1 = polyval(&B1_COEFFS, n * n) / (B1_DIVISOR * (1.0 + n));

        let mut alp = [0.0; ORDER];
        let mut bet = [0.0; ORDER];
        let mut d = n;
        for l in 0..ORDER {
            let a = ALPHA_COEFFS[l];
            let b = BETA_COEFFS[l];
            let m = a.len() - 1;
            alp[l] = d * polyval(&a[..m], n) / a[m];
            bet[l] = d * polyval(&b[..m], n) / b[m];
            d *= n;
        }

        Self {
            zone,
            hemisphere,
            central_meridian: f64::from(zone) * 6.0 - 183.0,
            false_northing: match hemisphere {
                Hemisphere::North => 0.0,
                Hemisphere::South => FALSE_NORTHING_SOUTH,
            },
            es: e2.sqrt(),
            a1: b1 * WGS84_A,
            alp,
            bet,
        }
    }

    pub fn zone(&self) -> u8 {
        self.zone
    }

    pub fn hemisphere(&self) -> Hemisphere {
        self.hemisphere
    }

    /// Geographic degrees to projected metres (easting, northing).
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let mut dlon = lon - self.central_meridian;
        dlon = (dlon + 180.0).rem_euclid(360.0) - 180.0;

        let latsign = if lat.is_sign_negative() { -1.0 } else { 1.0 };
        let lonsign = if dlon.is_sign_negative() { -1.0 } else { 1.0 };
        let lat = lat.abs().min(90.0);
        let dlon = dlon.abs();

        let (slam, clam) = dlon.to_radians().sin_cos();
        let (xip, etap) = if lat == 90.0 {
            (FRAC_PI_2, 0.0)
        } else {
            let taup = taupf(lat.to_radians().tan(), self.es);
            (taup.atan2(clam), (slam / taup.hypot(clam)).asinh())
        };

        // Clenshaw summation of the alpha series
        let (s0, c0) = (2.0 * xip).sin_cos();
        let (sh0, ch0) = ((2.0 * etap).sinh(), (2.0 * etap).cosh());
        let a = Complex64::new(2.0 * c0 * ch0, -2.0 * s0 * sh0);

        let mut y0 = Complex64::new(0.0, 0.0);
        let mut y1 = Complex64::new(0.0, 0.0);
        for j in (0..ORDER).rev() {
            let tmp = y0;
            y0 = a * y0 - y1 + self.alp[j];
            y1 = tmp;
        }
        let zeta = Complex64::new(xip, etap) + Complex64::new(s0 * ch0, c0 * sh0) * y0;

        let northing = self.a1 * UTM_K0 * zeta.re * latsign + self.false_northing;
        let easting = self.a1 * UTM_K0 * zeta.im * lonsign + FALSE_EASTING;
        (easting, northing)
    }

    /// Projected metres back to geographic degrees (lon, lat).
    pub fn inverse(&self, easting: f64, northing: f64) -> (f64, f64) {
        let xi = (northing - self.false_northing) / (self.a1 * UTM_K0);
        let eta = (easting - FALSE_EASTING) / (self.a1 * UTM_K0);

        let xisign = if xi.is_sign_negative() { -1.0 } else { 1.0 };
        let etasign = if eta.is_sign_negative() { -1.0 } else { 1.0 };
        let xi = xi.abs();
        let eta = eta.abs();

        // Clenshaw summation of the beta series
        let (s0, c0) = (2.0 * xi).sin_cos();
        let (sh0, ch0) = ((2.0 * eta).sinh(), (2.0 * eta).cosh());
        let a = Complex64::new(2.0 * c0 * ch0, -2.0 * s0 * sh0);

        let mut y0 = Complex64::new(0.0, 0.0);
        let mut y1 = Complex64::new(0.0, 0.0);
        for j in (0..ORDER).rev() {
            let tmp = y0;
            y0 = a * y0 - y1 - self.bet[j];
            y1 = tmp;
        }
        let zeta = Complex64::new(xi, eta) + Complex64::new(s0 * ch0, c0 * sh0) * y0;
        let (xip, etap) = (zeta.re, zeta.im);

        let s = etap.sinh();
        let c = xip.cos().max(0.0);
        let r = s.hypot(c);

        let (lon, lat) = if r == 0.0 {
            (0.0, 90.0)
        } else {
            let tau = tauf(xip.sin() / r, self.es);
            (s.atan2(c).to_degrees(), tau.atan().to_degrees())
        };

        let lon = (lon * etasign + self.central_meridian + 180.0).rem_euclid(360.0) - 180.0;
        (lon, lat * xisign)
    }

    pub fn forward_coord(&self, c: Coord<f64>) -> Coord<f64> {
        let (x, y) = self.forward(c.x, c.y);
        Coord { x, y }
    }

    pub fn inverse_coord(&self, c: Coord<f64>) -> Coord<f64> {
        let (x, y) = self.inverse(c.x, c.y);
        Coord { x, y }
    }
}

/// Every (zone, hemisphere) projection, built once per run and shared by reference.
#[derive(Debug, Clone)]
pub struct UtmTable {
    projections: Vec<UtmProjection>,
}

impl UtmTable {
    pub fn new() -> Self {
        let projections = (1..=60u8)
            .flat_map(|zone| {
                [
                    UtmProjection::new(zone, Hemisphere::North),
                    UtmProjection::new(zone, Hemisphere::South),
                ]
            })
            .collect();
        Self { projections }
    }

    #[inline]
    pub fn get(&self, zone: u8, hemisphere: Hemisphere) -> &UtmProjection {
        let offset = match hemisphere {
            Hemisphere::North => 0,
            Hemisphere::South => 1,
        };
        &self.projections[(usize::from(zone.clamp(1, 60)) - 1) * 2 + offset]
    }

    /// Projection suited to a reference point.
    #[inline]
    pub fn for_point(&self, lon: f64, lat: f64) -> &UtmProjection {
        self.get(utm_zone(lon), Hemisphere::of_latitude(lat))
    }

    pub fn len(&self) -> usize {
        self.projections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }
}

impl Default for UtmTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn zones_follow_six_degree_bands() {
        assert_eq!(utm_zone(-180.0), 1);
        assert_eq!(utm_zone(-177.0), 1);
        assert_eq!(utm_zone(113.0), 50);
        assert_eq!(utm_zone(117.0), 50);
        assert_eq!(utm_zone(120.0), 51);
        assert_eq!(utm_zone(180.0), 60);
        assert_eq!(Hemisphere::of_latitude(-0.1), Hemisphere::South);
        assert_eq!(Hemisphere::of_latitude(0.0), Hemisphere::North);
    }

    #[test]
    fn table_holds_all_zone_hemisphere_pairs() {
        let table = UtmTable::new();
        assert_eq!(table.len(), 120);
        let proj = table.get(33, Hemisphere::South);
        assert_eq!(proj.zone(), 33);
        assert_eq!(proj.hemisphere(), Hemisphere::South);
        assert_eq!(table.for_point(113.2, 22.5).zone(), 50);
    }

    #[test]
    fn central_meridian_maps_to_false_easting() {
        let proj = UtmProjection::new(51, Hemisphere::North);
        let (x, _) = proj.forward(123.0, 40.0);
        assert_abs_diff_eq!(x, 500_000.0, epsilon = 1e-6);
    }

    #[test]
    fn matches_reference_coordinates() {
        // EPSG:32651 values computed with PROJ
        let proj = UtmProjection::new(51, Hemisphere::North);
        let cases = [
            (121.880356, 29.887703, 391_888.063_726_413, 3_306_868.456_385_104),
            (121.430427, 28.637151, 346_582.410_843_301_1, 3_168_793.409_367_069),
            (122.625275, 30.246954, 463_948.333_307_260_7, 3_346_209.757_229_396),
        ];
        for (lon, lat, ex, ey) in cases {
            let (x, y) = proj.forward(lon, lat);
            assert_abs_diff_eq!(x, ex, epsilon = 1e-3);
            assert_abs_diff_eq!(y, ey, epsilon = 1e-3);
        }
    }

    #[test]
    fn forward_inverse_round_trip() {
        let table = UtmTable::new();
        let points = [
            (113.0, 22.0),
            (113.004, 22.003),
            (-73.98, 40.75),
            (151.2, -33.87),
            (-0.12, 51.5),
            (18.42, -33.92),
            (-179.9, -16.5),
            (2.9, 0.0),
            (126.0, 84.0),
        ];
        for (lon, lat) in points {
            let proj = table.for_point(lon, lat);
            let (x, y) = proj.forward(lon, lat);
            let (lon2, lat2) = proj.inverse(x, y);
            assert_abs_diff_eq!(lon, lon2, epsilon = 1e-9);
            assert_abs_diff_eq!(lat, lat2, epsilon = 1e-9);
        }
    }

    #[test]
    fn southern_hemisphere_uses_false_northing() {
        let proj = UtmProjection::new(56, Hemisphere::South);
        let (_, y) = proj.forward(153.0, -0.000001);
        assert!(y < FALSE_NORTHING_SOUTH && y > FALSE_NORTHING_SOUTH - 1.0);
    }
}
