/* Urban canopy parameter engine */

pub mod aggregate;
pub mod grid;
pub mod metric;
pub mod pipeline;

pub use metric::{parse_metrics, UcpMetric};
pub use pipeline::{run_region_ucp, run_ucp_file, OutputLayout};
