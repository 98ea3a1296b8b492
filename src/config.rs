/* Run configuration for the UCP and landscape engines and the batch orchestrator */

use crate::error::{Result, UrbanError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_WORKERS: &str = "6";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UcpConfig {
    /// attribute holding the building height
    pub height_field: String,
    pub min_height: f64,
    /// footprints must satisfy min_area < area < max_area (m²)
    pub min_area: f64,
    pub max_area: f64,
    /// grid cells per degree of latitude/longitude
    pub cells_per_degree: u32,
    /// height class edges for the dh cube
    pub height_bins: Vec<f64>,
}

impl Default for UcpConfig {
    fn default() -> Self {
        Self {
            height_field: String::from("Height"),
            min_height: 1.0,
            min_area: 5.0,
            max_area: 400_000.0,
            cells_per_degree: 120,
            height_bins: vec![
                0.0, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0, 45.0, 50.0, 55.0, 60.0, 65.0, 70.0, 400.0,
            ],
        }
    }
}

impl UcpConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cells_per_degree == 0 {
            return Err(UrbanError::InvalidParameter {
                name: "cells_per_degree",
                value: self.cells_per_degree.to_string(),
                reason: String::from("must be positive"),
            });
        }
        if self.height_bins.len() < 2 || self.height_bins.windows(2).any(|w| w[0] >= w[1]) {
            return Err(UrbanError::InvalidParameter {
                name: "height_bins",
                value: format!("{:?}", self.height_bins),
                reason: String::from("need at least two strictly increasing edges"),
            });
        }
        if self.min_area >= self.max_area {
            return Err(UrbanError::InvalidParameter {
                name: "min_area",
                value: self.min_area.to_string(),
                reason: format!("must be below max_area ({})", self.max_area),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Four,
    #[default]
    Eight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LandscapeConfig {
    /// tile side length in boundary units (degrees for WGS84 boundaries)
    pub grid_size: f64,
    pub target_class: i64,
    pub background_class: i64,
    /// class value ignored by the pattern metrics; None picks the per-mode default
    pub pattern_nodata: Option<i64>,
    pub connectivity: Connectivity,
}

impl Default for LandscapeConfig {
    fn default() -> Self {
        Self {
            grid_size: 1.0 / 120.0,
            target_class: 1,
            background_class: 0,
            pattern_nodata: None,
            connectivity: Connectivity::Eight,
        }
    }
}

impl LandscapeConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.grid_size.is_finite() && self.grid_size > 0.0) {
            return Err(UrbanError::InvalidParameter {
                name: "grid_size",
                value: self.grid_size.to_string(),
                reason: String::from("must be a positive number"),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// worker count as typed by the user; "0" means one per logical CPU
    pub workers: String,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: String::from(DEFAULT_WORKERS),
            scratch_dir: None,
        }
    }
}

impl BatchConfig {
    pub fn worker_count(&self) -> Result<usize> {
        let trimmed = self.workers.trim();
        let raw = if trimmed.is_empty() { DEFAULT_WORKERS } else { trimmed };
        let parsed: usize = raw.parse().map_err(|_| UrbanError::InvalidParameter {
            name: "workers",
            value: self.workers.clone(),
            reason: String::from("expected a non-negative integer"),
        })?;

        Ok(if parsed == 0 { num_cpus::get() } else { parsed })
    }

    pub fn scratch_for(&self, destination: &Path) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| destination.join(".urbanscape-scratch"))
    }
}

/// Combined file layout accepted by `--config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ucp: UcpConfig,
    pub landscape: LandscapeConfig,
    pub batch: BatchConfig,
}

impl Settings {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| UrbanError::io(path, e))?;
        let settings: Settings = serde_json::from_str(&text)?;
        settings.ucp.validate()?;
        settings.landscape.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_parses_strings() {
        let mut cfg = BatchConfig::default();
        assert_eq!(cfg.worker_count().unwrap(), 6);

        cfg.workers = String::from(" 3 ");
        assert_eq!(cfg.worker_count().unwrap(), 3);

        cfg.workers = String::from("0");
        assert_eq!(cfg.worker_count().unwrap(), num_cpus::get());

        cfg.workers = String::from("six");
        assert!(matches!(
            cfg.worker_count(),
            Err(UrbanError::InvalidParameter { name: "workers", .. })
        ));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"ucp": {"height_field": "pred_Heigh"}}"#).unwrap();
        assert_eq!(settings.ucp.height_field, "pred_Heigh");
        assert_eq!(settings.ucp.cells_per_degree, 120);
        assert_eq!(settings.ucp.height_bins.len(), 16);
        assert_eq!(settings.landscape.connectivity, Connectivity::Eight);
        assert_eq!(settings.batch.workers, "6");
    }

    #[test]
    fn rejects_unsorted_height_bins() {
        let cfg = UcpConfig {
            height_bins: vec![0.0, 10.0, 5.0],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
