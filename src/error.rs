//! Crate-level error type and `Result` alias for stable, structured error handling.
//! Converts underlying I/O, GDAL, HTTP and AOI errors, and provides semantic
//! variants for the fatal and per-band failure classes of the pipeline.
use std::path::PathBuf;

use thiserror::Error;

use crate::types::Band;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] crate::io::GdalError),

    #[error("HTTP error: {0}")]
    Http(#[from] crate::io::HttpError),

    #[error("AOI error: {0}")]
    Aoi(#[from] crate::io::AoiError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("No AOI source file found in {0}")]
    AoiNotFound(PathBuf),

    #[error("Mosaic for band {band} failed: {reason}")]
    MosaicBuild { band: Band, reason: String },

    #[error("Clip for band {band} failed: {reason}")]
    Clip { band: Band, reason: String },

    #[error("Index error: {0}")]
    Index(String),

    #[error("No band could be mosaicked and clipped")]
    NoBandsProcessed,

    #[error("Run cancelled")]
    Cancelled,

    #[error("External error: {0}")]
    External(String),
}

impl Error {
    pub fn external<E: std::fmt::Display>(e: E) -> Self {
        Error::External(e.to_string())
    }
}
