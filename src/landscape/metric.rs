/* Landscape metric vocabulary and the per-cell result record */

use crate::error::UrbanError;
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LandscapeMetric {
    AggregationIndex,
    LargestPatchIndex,
    ProportionOfLandscape,
    PatchDensity,
    EdgeDensity,
    LandscapeShapeIndex,
}

impl LandscapeMetric {
    pub const ALL: [LandscapeMetric; 6] = [
        LandscapeMetric::AggregationIndex,
        LandscapeMetric::LargestPatchIndex,
        LandscapeMetric::ProportionOfLandscape,
        LandscapeMetric::PatchDensity,
        LandscapeMetric::EdgeDensity,
        LandscapeMetric::LandscapeShapeIndex,
    ];

    /// Identifier, also the output file stem.
    pub fn id(self) -> &'static str {
        match self {
            LandscapeMetric::AggregationIndex => "ai",
            LandscapeMetric::LargestPatchIndex => "largest_patch_index",
            LandscapeMetric::ProportionOfLandscape => "proportion_of_landscape",
            LandscapeMetric::PatchDensity => "patch_density",
            LandscapeMetric::EdgeDensity => "edge_density",
            LandscapeMetric::LandscapeShapeIndex => "landscape_shape_index",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.tif", self.id())
    }
}

impl fmt::Display for LandscapeMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for LandscapeMetric {
    type Err = UrbanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        LandscapeMetric::ALL
            .into_iter()
            .find(|metric| metric.id() == key)
            .ok_or_else(|| UrbanError::UnknownMetric(s.to_string()))
    }
}

pub fn parse_landscape_metrics<S: AsRef<str>>(names: &[S]) -> Result<Vec<LandscapeMetric>, UrbanError> {
    let mut metrics: Vec<LandscapeMetric> = Vec::with_capacity(names.len());
    for name in names {
        let metric: LandscapeMetric = name.as_ref().parse()?;
        if !metrics.contains(&metric) {
            metrics.push(metric);
        }
    }
    Ok(metrics)
}

/// The six metrics of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMetrics {
    pub ai: f64,
    pub largest_patch_index: f64,
    pub proportion_of_landscape: f64,
    pub patch_density: f64,
    pub edge_density: f64,
    pub landscape_shape_index: f64,
}

impl CellMetrics {
    /// No valid pixel was observed.
    pub const fn unobserved() -> Self {
        Self::splat(f64::NAN)
    }

    /// Valid pixels exist but none of the target class.
    pub const fn absent() -> Self {
        Self::splat(0.0)
    }

    const fn splat(value: f64) -> Self {
        Self {
            ai: value,
            largest_patch_index: value,
            proportion_of_landscape: value,
            patch_density: value,
            edge_density: value,
            landscape_shape_index: value,
        }
    }

    pub fn get(&self, metric: LandscapeMetric) -> f64 {
        match metric {
            LandscapeMetric::AggregationIndex => self.ai,
            LandscapeMetric::LargestPatchIndex => self.largest_patch_index,
            LandscapeMetric::ProportionOfLandscape => self.proportion_of_landscape,
            LandscapeMetric::PatchDensity => self.patch_density,
            LandscapeMetric::EdgeDensity => self.edge_density,
            LandscapeMetric::LandscapeShapeIndex => self.landscape_shape_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for metric in LandscapeMetric::ALL {
            assert_eq!(metric.id().parse::<LandscapeMetric>().unwrap(), metric);
        }
        assert_eq!(LandscapeMetric::PatchDensity.file_name(), "patch_density.tif");
        assert!("lpi".parse::<LandscapeMetric>().is_err());
    }

    #[test]
    fn unobserved_and_absent_differ() {
        let nan = CellMetrics::unobserved();
        let zero = CellMetrics::absent();
        for metric in LandscapeMetric::ALL {
            assert!(nan.get(metric).is_nan());
            assert_eq!(zero.get(metric), 0.0);
        }
        assert_eq!(
            parse_landscape_metrics(&["AI", "ai", "edge_density"]).unwrap(),
            vec![LandscapeMetric::AggregationIndex, LandscapeMetric::EdgeDensity]
        );
    }
}
