//! Data model shared by the pipeline stages: AOI, catalog scenes, scene
//! groups and the per-band artifacts produced downstream.
use std::path::PathBuf;

use chrono::NaiveDate;
use geo::{BoundingRect, MultiPolygon, Polygon, Rect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{Band, Collection};

/// Coordinate reference system, kept as the definition GDAL understands
/// (`EPSG:xxxx` or WKT).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crs(String);

impl Crs {
    pub fn new<S: Into<String>>(definition: S) -> Self {
        Crs(definition.into())
    }

    pub fn wgs84() -> Self {
        Crs("EPSG:4326".to_string())
    }

    pub fn definition(&self) -> &str {
        &self.0
    }

    /// True for the usual spellings of geographic WGS84
    pub fn is_wgs84(&self) -> bool {
        let d = self.0.trim().to_ascii_uppercase();
        d == "EPSG:4326" || d.ends_with("CRS84") || d.ends_with("EPSG::4326")
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Area of interest: polygonal geometry plus the CRS it is expressed in.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaOfInterest {
    pub geometry: MultiPolygon<f64>,
    pub crs: Crs,
}

impl AreaOfInterest {
    pub fn new(geometry: MultiPolygon<f64>, crs: Crs) -> Self {
        Self { geometry, crs }
    }

    pub fn from_polygon(polygon: Polygon<f64>, crs: Crs) -> Self {
        Self::new(MultiPolygon::new(vec![polygon]), crs)
    }

    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }
}

/// Identity of an acquisition: one WRS-2 cell on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SceneKey {
    pub path: u32,
    pub row: u32,
    pub date: NaiveDate,
}

impl SceneKey {
    /// Directory name used under the downloads folder
    pub fn dir_name(&self) -> String {
        format!(
            "scene_{:03}_{:03}_{}",
            self.path,
            self.row,
            self.date.format("%Y%m%d")
        )
    }

    /// Parses names produced by [`SceneKey::dir_name`].
    pub fn from_dir_name(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("scene_")?;
        let mut parts = rest.split('_');
        let path = parts.next()?.parse().ok()?;
        let row = parts.next()?.parse().ok()?;
        let date = NaiveDate::parse_from_str(parts.next()?, "%Y%m%d").ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(SceneKey { path, row, date })
    }
}

impl std::fmt::Display for SceneKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}/{:03} {}", self.path, self.row, self.date)
    }
}

/// One catalog item as returned by the search service.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneFeature {
    pub id: String,
    pub collection: Collection,
    pub path: u32,
    pub row: u32,
    pub date: NaiveDate,
    /// Percent, 0..=100
    pub cloud_cover: f64,
    /// Footprint in EPSG:4326
    pub footprint: MultiPolygon<f64>,
    /// Asset key -> href
    pub assets: BTreeMap<String, String>,
    pub platform: Option<String>,
}

impl SceneFeature {
    pub fn key(&self) -> SceneKey {
        SceneKey {
            path: self.path,
            row: self.row,
            date: self.date,
        }
    }

    pub fn grid_cell(&self) -> (u32, u32) {
        (self.path, self.row)
    }

    /// Product identifier without the `_SR`/`_ST` collection suffix
    pub fn product_id(&self) -> &str {
        self.id
            .strip_suffix("_SR")
            .or_else(|| self.id.strip_suffix("_ST"))
            .unwrap_or(&self.id)
    }
}

/// Scenes that share a [`SceneKey`], across collections.
#[derive(Debug, Clone)]
pub struct SceneGroup {
    pub key: SceneKey,
    pub scenes: Vec<SceneFeature>,
}

/// A band file that landed on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadedBandFile {
    pub band: Band,
    pub collection: Collection,
    pub scene_key: SceneKey,
    pub path: PathBuf,
    pub cloud_cover: f64,
}

/// A source raster referenced by a mosaic, in priority order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosaicSource {
    pub path: PathBuf,
    pub cloud_cover: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandMosaic {
    pub band: Band,
    /// Ascending by cloud cover; the first entry wins where sources overlap
    pub ordered_sources: Vec<MosaicSource>,
    pub output_path: PathBuf,
    /// True when the external merge tool produced the output
    pub used_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipResult {
    pub band: Band,
    pub clipped_path: PathBuf,
    /// Clipped to the mosaic bounds because the AOI did not intersect it
    pub degraded: bool,
    /// Non-nodata pixels inside the clip geometry
    pub valid_pixels: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_key_dir_name_round_trip() {
        let key = SceneKey {
            path: 7,
            row: 57,
            date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
        };
        assert_eq!(key.dir_name(), "scene_007_057_20240309");
        assert_eq!(SceneKey::from_dir_name(&key.dir_name()), Some(key));
        assert_eq!(SceneKey::from_dir_name("scene_7_57"), None);
        assert_eq!(SceneKey::from_dir_name("mosaic_B4"), None);
    }

    #[test]
    fn product_id_strips_collection_suffix() {
        let scene = SceneFeature {
            id: "LC08_L2SP_007057_20240309_20240316_02_T1_SR".into(),
            collection: Collection::SR,
            path: 7,
            row: 57,
            date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            cloud_cover: 3.0,
            footprint: MultiPolygon::new(vec![]),
            assets: BTreeMap::new(),
            platform: None,
        };
        assert_eq!(scene.product_id(), "LC08_L2SP_007057_20240309_20240316_02_T1");
    }

    #[test]
    fn crs_wgs84_spellings() {
        assert!(Crs::wgs84().is_wgs84());
        assert!(Crs::new("urn:ogc:def:crs:OGC:1.3:CRS84").is_wgs84());
        assert!(Crs::new("urn:ogc:def:crs:EPSG::4326").is_wgs84());
        assert!(!Crs::new("EPSG:32618").is_wgs84());
    }
}
