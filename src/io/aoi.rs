//! Loading the area of interest from GeoJSON or shapefile sources.
use std::fs;
use std::path::{Path, PathBuf};

use gdal::errors::GdalError as GdalCrateError;
use gdal::vector::LayerAccess;
use gdal::Dataset;
use geo::MultiPolygon;
use geojson::GeoJson;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::model::{AreaOfInterest, Crs};
use crate::io::gdal::crs_from_spatial_ref;

#[derive(Debug, Error)]
pub enum AoiError {
    #[error("No AOI file (*.geojson, *.shp) in {0}")]
    NotFound(PathBuf),
    #[error("Unsupported AOI format: {0}")]
    UnsupportedFormat(String),
    #[error("No polygon geometry in {0}")]
    NoPolygon(String),
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extensions picked up by discovery; `load_aoi` also accepts `.json`
const AOI_EXTENSIONS: [&str; 2] = ["geojson", "shp"];

fn has_aoi_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AOI_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Most recently modified AOI file in `dir`
pub fn discover_aoi_source(dir: &Path) -> Result<PathBuf, AoiError> {
    if !dir.is_dir() {
        return Err(AoiError::NotFound(dir.to_path_buf()));
    }
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || !has_aoi_extension(&path) {
            continue;
        }
        let modified = fs::metadata(&path)?.modified()?;
        if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }
    newest
        .map(|(_, p)| p)
        .ok_or_else(|| AoiError::NotFound(dir.to_path_buf()))
}

/// Loads the first polygonal feature of a GeoJSON or shapefile source
pub fn load_aoi(path: &Path) -> Result<AreaOfInterest, AoiError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let aoi = match ext.as_str() {
        "geojson" | "json" => parse_geojson_str(&fs::read_to_string(path)?),
        "shp" => load_shapefile(path),
        other => Err(AoiError::UnsupportedFormat(other.to_string())),
    }
    .map_err(|e| match e {
        AoiError::NoPolygon(_) => AoiError::NoPolygon(path.display().to_string()),
        other => other,
    })?;
    info!("Loaded AOI from {:?} ({})", path, aoi.crs);
    Ok(aoi)
}

/// Parses a GeoJSON document (collection, feature or bare geometry).
/// CRS comes from the legacy `crs` member and defaults to EPSG:4326.
pub fn parse_geojson_str(text: &str) -> Result<AreaOfInterest, AoiError> {
    let gj: GeoJson = text.parse()?;
    let (geometry, crs_member) = match gj {
        GeoJson::FeatureCollection(fc) => {
            let crs = fc.foreign_members.as_ref().and_then(|m| m.get("crs").cloned());
            let geometry = fc.features.into_iter().find_map(|f| f.geometry);
            (geometry, crs)
        }
        GeoJson::Feature(f) => {
            let crs = f.foreign_members.as_ref().and_then(|m| m.get("crs").cloned());
            (f.geometry, crs)
        }
        GeoJson::Geometry(g) => {
            let crs = g.foreign_members.as_ref().and_then(|m| m.get("crs").cloned());
            (Some(g), crs)
        }
    };
    let geometry = geometry.ok_or_else(|| AoiError::NoPolygon("GeoJSON".into()))?;
    let polygons = to_multipolygon(geo::Geometry::<f64>::try_from(geometry)?)
        .ok_or_else(|| AoiError::NoPolygon("GeoJSON".into()))?;
    let crs = crs_member
        .as_ref()
        .and_then(crs_from_geojson_member)
        .unwrap_or_else(Crs::wgs84);
    Ok(AreaOfInterest::new(polygons, crs))
}

fn to_multipolygon(geometry: geo::Geometry<f64>) -> Option<MultiPolygon<f64>> {
    let polygons = match geometry {
        geo::Geometry::Polygon(p) => vec![p],
        geo::Geometry::MultiPolygon(mp) => mp.0,
        geo::Geometry::GeometryCollection(gc) => gc
            .0
            .into_iter()
            .filter_map(to_multipolygon)
            .flat_map(|mp| mp.0)
            .collect(),
        _ => Vec::new(),
    };
    (!polygons.is_empty()).then(|| MultiPolygon::new(polygons))
}

/// `{"type":"name","properties":{"name":"urn:ogc:def:crs:EPSG::32618"}}` -> `EPSG:32618`
fn crs_from_geojson_member(member: &Value) -> Option<Crs> {
    let name = member.get("properties")?.get("name")?.as_str()?;
    if name.to_ascii_uppercase().ends_with("CRS84") {
        return Some(Crs::wgs84());
    }
    let code = name.rsplit(':').next().filter(|c| c.chars().all(|ch| ch.is_ascii_digit()));
    match code {
        Some(code) if name.to_ascii_uppercase().contains("EPSG") => {
            Some(Crs::new(format!("EPSG:{}", code)))
        }
        _ => Some(Crs::new(name)),
    }
}

fn load_shapefile(path: &Path) -> Result<AreaOfInterest, AoiError> {
    let dataset = Dataset::open(path)?;
    let mut layer = dataset.layer(0)?;
    let crs = layer
        .spatial_ref()
        .map(|srs| crs_from_spatial_ref(&srs))
        .unwrap_or_else(Crs::wgs84);
    for feature in layer.features() {
        let Some(geometry) = feature.geometry() else {
            continue;
        };
        let json = geometry.json()?;
        if let GeoJson::Geometry(g) = json.parse::<GeoJson>()? {
            if let Some(polygons) = to_multipolygon(geo::Geometry::<f64>::try_from(g)?) {
                return Ok(AreaOfInterest::new(polygons, crs));
            }
        }
        debug!("Skipping non-polygonal feature in {:?}", path);
    }
    Err(AoiError::NoPolygon(path.display().to_string()))
}
