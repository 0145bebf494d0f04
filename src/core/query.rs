//! Catalog search request construction.
//!
//! Two mutually exclusive modes: AOI intersection (geometry in EPSG:4326)
//! and WRS-2 path/row. Either mode carries the date interval, cloud ceiling,
//! platform set and collection set.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::model::AreaOfInterest;
use crate::core::params::{DateRange, GridCell, PipelineParams};
use crate::error::{Error, Result};
use crate::types::{Collection, Platform};

/// Landsat collection categories accepted by the search
pub const COLLECTION_CATEGORIES: [&str; 3] = ["T1", "T2", "RT"];

/// Body of a STAC item search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intersects: Option<geojson::Geometry>,
    pub collections: Vec<String>,
    pub query: BTreeMap<String, Value>,
    pub datetime: String,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub struct QueryBuilder<'a> {
    aoi: Option<&'a AreaOfInterest>,
    grid: Option<GridCell>,
    range: DateRange,
    max_cloud_cover: f64,
    platforms: Vec<Platform>,
    collections: Vec<Collection>,
    page_size: u32,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(range: DateRange) -> Self {
        Self {
            aoi: None,
            grid: None,
            range,
            max_cloud_cover: 100.0,
            platforms: vec![Platform::Landsat8],
            collections: vec![Collection::SR],
            page_size: 100,
        }
    }

    pub fn from_params(params: &PipelineParams) -> Self {
        Self {
            aoi: None,
            grid: params.grid,
            range: params.date_range,
            max_cloud_cover: params.max_cloud_cover,
            platforms: params.platforms.clone(),
            collections: params.collections.clone(),
            page_size: params.page_size,
        }
    }

    pub fn aoi(mut self, aoi: &'a AreaOfInterest) -> Self {
        self.aoi = Some(aoi);
        self
    }

    pub fn grid(mut self, grid: Option<GridCell>) -> Self {
        self.grid = grid;
        self
    }

    pub fn max_cloud_cover(mut self, percent: f64) -> Self {
        self.max_cloud_cover = percent;
        self
    }

    pub fn platforms(mut self, platforms: Vec<Platform>) -> Self {
        self.platforms = platforms;
        self
    }

    /// Adds a collection if it is not already part of the search
    pub fn with_collection(mut self, collection: Collection) -> Self {
        if !self.collections.contains(&collection) {
            self.collections.push(collection);
        }
        self
    }

    pub fn page_size(mut self, limit: u32) -> Self {
        self.page_size = limit;
        self
    }

    /// Builds the first-page request. Grid mode wins when a grid cell is set.
    pub fn build(&self) -> Result<SearchRequest> {
        if !self.range.is_valid() {
            return Err(Error::Configuration(format!(
                "start date {} is after end date {}",
                self.range.start, self.range.end
            )));
        }
        if self.platforms.is_empty() {
            return Err(Error::Configuration("no platform selected".into()));
        }
        if self.collections.is_empty() {
            return Err(Error::Configuration("no collection selected".into()));
        }

        let mut query = BTreeMap::new();
        query.insert(
            "eo:cloud_cover".to_string(),
            json!({ "lte": self.max_cloud_cover }),
        );
        query.insert(
            "platform".to_string(),
            json!({ "in": self.platforms.iter().map(|p| p.stac_name()).collect::<Vec<_>>() }),
        );
        query.insert(
            "landsat:collection_category".to_string(),
            json!({ "in": COLLECTION_CATEGORIES }),
        );

        let intersects = match (self.grid, self.aoi) {
            (Some(cell), _) => {
                query.insert(
                    "landsat:wrs_path".to_string(),
                    json!({ "eq": format!("{:03}", cell.path) }),
                );
                query.insert(
                    "landsat:wrs_row".to_string(),
                    json!({ "eq": format!("{:03}", cell.row) }),
                );
                None
            }
            (None, Some(aoi)) => {
                if !aoi.crs.is_wgs84() {
                    return Err(Error::Configuration(format!(
                        "search geometry must be in EPSG:4326, got {}",
                        aoi.crs
                    )));
                }
                if aoi.geometry.0.is_empty() {
                    return Err(Error::Configuration("AOI geometry is empty".into()));
                }
                Some(search_geometry(aoi))
            }
            (None, None) => {
                return Err(Error::Configuration(
                    "either an AOI or a path/row grid cell is required".into(),
                ));
            }
        };

        Ok(SearchRequest {
            intersects,
            collections: self
                .collections
                .iter()
                .map(|c| c.stac_id().to_string())
                .collect(),
            query,
            datetime: self.range.to_interval(),
            page: 1,
            limit: self.page_size,
        })
    }
}

fn search_geometry(aoi: &AreaOfInterest) -> geojson::Geometry {
    let value = match aoi.geometry.0.as_slice() {
        [single] => geojson::Value::from(single),
        _ => geojson::Value::from(&aoi.geometry),
    };
    geojson::Geometry::new(value)
}
