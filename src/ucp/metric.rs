/* Closed vocabulary of urban canopy parameters and their reduction from cell aggregates */

use super::aggregate::CellStats;
use crate::error::UrbanError;
use ndarray::{Array2, Array3, Axis};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UcpMetric {
    Count,
    Sum,
    Area,
    Volume,
    MeanHeight,
    StdHeight,
    /// area-weighted mean height
    Haw,
    /// surface to plan area ratio
    Lb,
    /// plan area fraction
    Lp,
    Lf0,
    Lf45,
    Lf90,
    Lf135,
    /// height distribution cube
    Dh,
}

impl UcpMetric {
    pub const ALL: [UcpMetric; 14] = [
        UcpMetric::Count,
        UcpMetric::Sum,
        UcpMetric::Area,
        UcpMetric::Volume,
        UcpMetric::MeanHeight,
        UcpMetric::StdHeight,
        UcpMetric::Haw,
        UcpMetric::Lb,
        UcpMetric::Lp,
        UcpMetric::Lf0,
        UcpMetric::Lf45,
        UcpMetric::Lf90,
        UcpMetric::Lf135,
        UcpMetric::Dh,
    ];

    /// Identifier used on the command line and for output folders.
    pub fn id(self) -> &'static str {
        match self {
            UcpMetric::Count => "count",
            UcpMetric::Sum => "sum",
            UcpMetric::Area => "area",
            UcpMetric::Volume => "volume",
            UcpMetric::MeanHeight => "mh",
            UcpMetric::StdHeight => "stdh",
            UcpMetric::Haw => "haw",
            UcpMetric::Lb => "lb",
            UcpMetric::Lp => "lp",
            UcpMetric::Lf0 => "lf0",
            UcpMetric::Lf45 => "lf45",
            UcpMetric::Lf90 => "lf90",
            UcpMetric::Lf135 => "lf135",
            UcpMetric::Dh => "dh",
        }
    }

    /// Trailing part of the output file name.
    pub fn suffix(self) -> &'static str {
        match self {
            UcpMetric::Sum => "sumHei",
            other => other.id(),
        }
    }

    /// Turn the per-cell aggregates into the output bands of this metric.
    pub fn reduce(self, stats: &CellStats) -> Array3<f64> {
        let per_area = |numerator: &Array2<f64>| numerator / &stats.cell_area;
        let band = match self {
            UcpMetric::Count => stats.count.clone(),
            UcpMetric::Sum => stats.sum.clone(),
            UcpMetric::Area => stats.area.clone(),
            UcpMetric::Volume => stats.volume.clone(),
            UcpMetric::MeanHeight => stats.mean.clone(),
            UcpMetric::StdHeight => stats.std.clone(),
            // 0/0 in empty cells is NaN
            UcpMetric::Haw => &stats.volume / &stats.area,
            UcpMetric::Lb => per_area(&stats.wall),
            UcpMetric::Lp => per_area(&stats.area),
            UcpMetric::Lf0 => per_area(&stats.frontal[0]),
            UcpMetric::Lf90 => per_area(&stats.frontal[1]),
            UcpMetric::Lf45 => per_area(&stats.frontal[2]),
            UcpMetric::Lf135 => per_area(&stats.frontal[3]),
            UcpMetric::Dh => return stats.dh.clone(),
        };
        band.insert_axis(Axis(0))
    }

    /// Band names written with the raster.
    pub fn band_names(self, height_bins: &[f64]) -> Vec<String> {
        match self {
            UcpMetric::Dh => height_bins
                .windows(2)
                .map(|w| format!("dh_{}_{}", w[0], w[1]))
                .collect(),
            other => vec![other.id().to_string()],
        }
    }
}

impl fmt::Display for UcpMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for UcpMetric {
    type Err = UrbanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        // Greek spellings of the lambda parameters
        let key = key.strip_prefix('λ').map(|rest| format!("l{rest}")).unwrap_or(key);
        let metric = match key.as_str() {
            "count" => UcpMetric::Count,
            "sum" | "sumhei" => UcpMetric::Sum,
            "area" => UcpMetric::Area,
            "volume" => UcpMetric::Volume,
            "mh" => UcpMetric::MeanHeight,
            "stdh" => UcpMetric::StdHeight,
            "haw" => UcpMetric::Haw,
            "lb" => UcpMetric::Lb,
            "lp" => UcpMetric::Lp,
            "lf0" => UcpMetric::Lf0,
            "lf45" => UcpMetric::Lf45,
            "lf90" => UcpMetric::Lf90,
            "lf135" => UcpMetric::Lf135,
            "dh" => UcpMetric::Dh,
            _ => return Err(UrbanError::UnknownMetric(s.to_string())),
        };
        Ok(metric)
    }
}

/// Parse a list of identifiers, dropping duplicates while keeping order.
pub fn parse_metrics<S: AsRef<str>>(names: &[S]) -> Result<Vec<UcpMetric>, UrbanError> {
    let mut metrics: Vec<UcpMetric> = Vec::with_capacity(names.len());
    for name in names {
        let metric: UcpMetric = name.as_ref().parse()?;
        if !metrics.contains(&metric) {
            metrics.push(metric);
        }
    }
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids_suffixes_and_aliases() {
        for metric in UcpMetric::ALL {
            assert_eq!(metric.id().parse::<UcpMetric>().unwrap(), metric);
            assert_eq!(metric.suffix().parse::<UcpMetric>().unwrap(), metric);
        }
        assert_eq!("λb".parse::<UcpMetric>().unwrap(), UcpMetric::Lb);
        assert_eq!("λf135".parse::<UcpMetric>().unwrap(), UcpMetric::Lf135);
        assert_eq!(" MH ".parse::<UcpMetric>().unwrap(), UcpMetric::MeanHeight);
        assert_eq!(UcpMetric::Sum.suffix(), "sumHei");
    }

    #[test]
    fn unknown_metric_is_reported() {
        match "lf30".parse::<UcpMetric>() {
            Err(UrbanError::UnknownMetric(name)) => assert_eq!(name, "lf30"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn metric_lists_are_deduplicated() {
        let metrics = parse_metrics(&["count", "mh", "COUNT", "λp"]).unwrap();
        assert_eq!(metrics, vec![UcpMetric::Count, UcpMetric::MeanHeight, UcpMetric::Lp]);
    }

    #[test]
    fn dh_band_names_follow_edges() {
        let names = UcpMetric::Dh.band_names(&[0.0, 5.0, 400.0]);
        assert_eq!(names, vec!["dh_0_5", "dh_5_400"]);
    }
}
