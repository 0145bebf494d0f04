//! Pipeline stages and the data they exchange: query construction, coverage
//! selection, band requirements and resolution, download orchestration,
//! mosaicking, clipping and spectral indices. These are the building blocks
//! driven by the high-level `api` module.
pub mod bands;
pub mod clip;
pub mod coverage;
pub mod download;
pub mod model;
pub mod mosaic;
pub mod params;
pub mod processing;
pub mod progress;
pub mod query;
pub mod resolver;
