//! I/O layer: catalog search, provider session and transfers, AOI sources,
//! GDAL-backed rasters and the output `writers`.
pub mod aoi;
pub use aoi::{AoiError, discover_aoi_source, load_aoi};

pub mod catalog;
pub use catalog::CatalogClient;

pub mod gdal;
pub use gdal::{GdalError, RasterInfo, RasterReader, SampleType};

pub mod http;
pub use http::{AssetFetcher, AssetProbe, CatalogTransport, HttpError};

pub mod session;
pub use session::{Credentials, Session, SessionConfig};

pub mod writers;
