/* Landscape-pattern engine */

pub mod aggregation;
pub mod engine;
pub mod metric;
pub mod patterns;

pub use aggregation::{aggregation_index, aggregation_index_by_class};
pub use engine::{LandscapeMode, LandscapeRun};
pub use metric::{parse_landscape_metrics, CellMetrics, LandscapeMetric};
