/* Urban canopy parameters and landscape-pattern metrics from building footprints and land cover */

mod allocator;

pub mod geo {
    pub mod edges;
    pub mod geodesic;
    pub mod projection;
    pub mod raster;
    pub mod validate;
}
pub mod encoding {
    pub mod arrays;
    pub mod writers;
}
pub mod rasterization {
    pub mod burn_geometry;
    pub mod burners;
    pub mod masking;
    pub mod pixel_functions;
}
pub mod buildings;
pub mod config;
pub mod error;
pub mod io;
pub mod landscape;
pub mod orchestrator;
pub mod prelude;
pub mod progress;
pub mod ucp;
pub mod workflow;

#[cfg(feature = "python")]
mod python;

pub use error::{Result, Stage, UrbanError};
