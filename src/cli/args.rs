use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

use landsatpro::types::{Platform, SpectralIndex, WindowPolicy};

#[derive(Parser, Debug)]
#[command(name = "landsatpro", version, about = "Landsat AOI acquisition and spectral index CLI")]
pub struct CliArgs {
    /// Workspace root (temp/, exports/ and comparative/ live here)
    #[arg(short, long, default_value = ".")]
    pub workspace: PathBuf,

    /// JSON parameter preset; flags below override its values
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// First acquisition date (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last acquisition date (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// First date of the comparative period
    #[arg(long, requires = "compare_end")]
    pub compare_start: Option<NaiveDate>,

    /// Last date of the comparative period
    #[arg(long, requires = "compare_start")]
    pub compare_end: Option<NaiveDate>,

    /// Maximum scene cloud cover in percent
    #[arg(long)]
    pub max_cloud: Option<f64>,

    /// Platforms to search (repeatable)
    #[arg(long = "platform", value_enum)]
    pub platforms: Vec<Platform>,

    /// Spectral indices to compute (repeatable)
    #[arg(short = 'x', long = "index", value_enum)]
    pub indices: Vec<SpectralIndex>,

    /// AOI file (GeoJSON or shapefile); defaults to the newest file in temp/source
    #[arg(long)]
    pub aoi: Option<PathBuf>,

    /// WRS-2 path, searches by grid cell instead of AOI intersection
    #[arg(long, requires = "row")]
    pub path: Option<u32>,

    /// WRS-2 row
    #[arg(long, requires = "path")]
    pub row: Option<u32>,

    /// Minimum fraction (0..1) of the AOI a scene must cover
    #[arg(long)]
    pub min_coverage: Option<f64>,

    /// Maximum spread of acquisition dates among selected scenes
    #[arg(long)]
    pub window_days: Option<i64>,

    /// What to do with a scene outside the acquisition window
    #[arg(long, value_enum)]
    pub window_policy: Option<WindowPolicy>,

    /// Nodata value written outside the AOI in clipped bands
    #[arg(long)]
    pub nodata: Option<f64>,

    /// Parallel workers for mosaicking and clipping
    #[arg(long)]
    pub workers: Option<usize>,

    /// Catalog search endpoint
    #[arg(long)]
    pub catalog_url: Option<String>,

    /// Process band files already in temp/downloads instead of searching
    #[arg(long, default_value_t = false)]
    pub reuse_downloads: bool,

    /// Provider account name
    #[arg(long, env = "USGS_USERNAME")]
    pub username: Option<String>,

    /// Provider account password
    #[arg(long, env = "USGS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Enable logging
    #[arg(long, default_value_t = false)]
    pub log: bool,
}
