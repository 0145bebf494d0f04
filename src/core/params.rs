use std::path::PathBuf;

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Collection, Platform, SpectralIndex, WindowPolicy};

/// Inclusive acquisition date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// RFC 3339 interval covering both whole days
    pub fn to_interval(&self) -> String {
        format!(
            "{}T00:00:00.000Z/{}T23:59:59.999Z",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// WRS-2 grid cell used by the path/row search mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    pub path: u32,
    pub row: u32,
}

/// Brightness-temperature constants for thermal band B10
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LstConstants {
    pub k1: f64,
    pub k2: f64,
    /// Multiplier converting DN to radiance
    pub dn_scale: f64,
}

impl Default for LstConstants {
    fn default() -> Self {
        Self {
            k1: 774.8853,
            k2: 1321.0789,
            dn_scale: 0.1,
        }
    }
}

/// Pipeline parameters suitable for preset files and CLI overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    pub date_range: DateRange,
    /// Second date range processed into the `comparative/` workspace
    pub comparative: Option<DateRange>,
    /// Percent, 0..=100
    pub max_cloud_cover: f64,
    pub platforms: Vec<Platform>,
    pub collections: Vec<Collection>,
    pub page_size: u32,
    /// Path/row search instead of AOI intersection
    pub grid: Option<GridCell>,
    /// AOI file; discovered in the workspace source folder when unset
    pub aoi_path: Option<PathBuf>,
    pub catalog_url: String,
    /// Root of the provider's data host, used to synthesize asset URLs
    pub data_host: String,
    pub login_url: String,
    pub logout_url: String,
    /// Fraction of AOI area, 0..=1
    pub min_coverage: f64,
    pub window_days: i64,
    pub window_policy: WindowPolicy,
    pub indices: Vec<SpectralIndex>,
    /// Sentinel written outside the AOI in clipped rasters
    pub nodata: f64,
    pub lst: LstConstants,
    pub probe_timeout_secs: u64,
    pub transfer_timeout_secs: u64,
    pub retries: u32,
    /// Parallel workers for the mosaic/clip stage
    pub workers: usize,
    /// Skip search and download, process band files already on disk
    pub reuse_downloads: bool,
}

impl PipelineParams {
    /// Parameters for the comparative run, if one is configured
    pub fn comparative_params(&self) -> Option<PipelineParams> {
        self.comparative.map(|range| PipelineParams {
            date_range: range,
            comparative: None,
            ..self.clone()
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.date_range.is_valid() {
            return Err(format!(
                "start date {} is after end date {}",
                self.date_range.start, self.date_range.end
            ));
        }
        if let Some(c) = self.comparative {
            if !c.is_valid() {
                return Err(format!(
                    "comparative start date {} is after end date {}",
                    c.start, c.end
                ));
            }
        }
        if !(0.0..=100.0).contains(&self.max_cloud_cover) {
            return Err(format!(
                "max cloud cover must be within 0..=100, got {}",
                self.max_cloud_cover
            ));
        }
        if !(0.0..=1.0).contains(&self.min_coverage) {
            return Err(format!(
                "min coverage must be a fraction within 0..=1, got {}",
                self.min_coverage
            ));
        }
        if self.window_days < 0 {
            return Err("window days must not be negative".into());
        }
        if self.indices.is_empty() {
            return Err("at least one spectral index is required".into());
        }
        if self.page_size == 0 {
            return Err("page size must be positive".into());
        }
        Ok(())
    }
}

impl Default for PipelineParams {
    fn default() -> Self {
        let end = Utc::now().date_naive();
        Self {
            date_range: DateRange::new(end - Duration::days(90), end),
            comparative: None,
            max_cloud_cover: 20.0,
            platforms: vec![Platform::Landsat8],
            collections: vec![Collection::SR],
            page_size: 100,
            grid: None,
            aoi_path: None,
            catalog_url: "https://landsatlook.usgs.gov/stac-server/search".into(),
            data_host: "https://landsatlook.usgs.gov/data".into(),
            login_url: "https://ers.cr.usgs.gov/login".into(),
            logout_url: "https://ers.cr.usgs.gov/logout".into(),
            min_coverage: 0.0,
            window_days: 120,
            window_policy: WindowPolicy::Stop,
            indices: vec![SpectralIndex::Ndvi],
            nodata: 0.0,
            lst: LstConstants::default(),
            probe_timeout_secs: 10,
            transfer_timeout_secs: 300,
            retries: 3,
            workers: 4,
            reuse_downloads: false,
        }
    }
}
