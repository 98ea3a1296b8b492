/* Error types shared by the loaders, engines and writers */

use polars::prelude::PolarsError;
use std::{fmt, path::PathBuf};
use thiserror::Error;

/// Pipeline step that was running when a single-region computation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Aggregate,
    Write,
    Mask,
    Landscape,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Aggregate => "aggregate",
            Stage::Write => "write",
            Stage::Mask => "mask",
            Stage::Landscape => "landscape",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum UrbanError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read vector data from {path}: {message}")]
    Vector { path: PathBuf, message: String },

    #[error("cannot process raster {path}: {message}")]
    Raster { path: PathBuf, message: String },

    #[error("{path} has no coordinate reference system")]
    MissingCrs { path: PathBuf },

    #[error("coordinate reference systems differ: {left} vs {right}")]
    CrsMismatch { left: String, right: String },

    #[error("unsupported geometry type: {0}")]
    UnsupportedGeometry(String),

    #[error("unknown metric identifier: {0}")]
    UnknownMetric(String),

    #[error("no usable records in {path}")]
    EmptyInput { path: PathBuf },

    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} support is not compiled in")]
    BackendUnavailable(&'static str),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("GDAL error: {0}")]
    #[cfg(feature = "gdal")]
    Gdal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{stage} step failed for {path}: {source}")]
    Stage {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: Box<UrbanError>,
    },
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for UrbanError {
    fn from(e: gdal::errors::GdalError) -> Self {
        UrbanError::Gdal(e.to_string())
    }
}

impl UrbanError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UrbanError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn raster(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        UrbanError::Raster {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn vector(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        UrbanError::Vector {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Stage the error failed in, if it was tagged by a pipeline.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            UrbanError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Tag errors with the pipeline step and input they belong to.
pub trait StageContext<T> {
    fn at_stage(self, stage: Stage, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> StageContext<T> for Result<T> {
    fn at_stage(self, stage: Stage, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| match source {
            // keep the innermost stage
            tagged @ UrbanError::Stage { .. } => tagged,
            other => UrbanError::Stage {
                stage,
                path: path.into(),
                source: Box::new(other),
            },
        })
    }
}

pub type Result<T> = std::result::Result<T, UrbanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_context_keeps_innermost_stage() {
        let failed: Result<()> = Err(UrbanError::EmptyInput {
            path: PathBuf::from("a.geojson"),
        });
        let tagged = failed.at_stage(Stage::Load, "a.geojson");
        let retagged = tagged.at_stage(Stage::Write, "a.geojson");

        let err = retagged.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Load));
        assert!(err.to_string().starts_with("load step failed"));
    }
}
