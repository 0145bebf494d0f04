//! STAC search client: pagination over the item-search endpoint and decoding
//! of Landsat items into [`SceneFeature`]s.
use std::collections::BTreeMap;

use chrono::NaiveDate;
use geo::{MultiPolygon, Polygon, Rect};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::model::SceneFeature;
use crate::core::query::SearchRequest;
use crate::error::{Error, Result};
use crate::io::http::CatalogTransport;
use crate::types::Collection;

/// Upper bound on followed pages, guards against a server that never stops
/// returning `next` links.
const MAX_PAGES: u32 = 500;

pub struct CatalogClient<'a> {
    transport: &'a dyn CatalogTransport,
    url: String,
    max_pages: u32,
}

impl<'a> CatalogClient<'a> {
    pub fn new(transport: &'a dyn CatalogTransport, url: &str) -> Self {
        Self {
            transport,
            url: url.to_string(),
            max_pages: MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Runs the search and follows pagination until the server stops
    /// returning links. A zero or missing `context.matched` ends the search.
    /// Running into the page limit with more pages announced is an error
    /// rather than a silently truncated result.
    pub fn search_all(&self, request: &SearchRequest) -> Result<Vec<SceneFeature>> {
        let mut request = request.clone();
        let mut scenes = Vec::new();
        let mut skipped = 0usize;

        let mut exhausted = false;
        for _ in 0..self.max_pages {
            let body = serde_json::to_value(&request)?;
            let response = self.transport.post_json(&self.url, &body)?;

            if let Some(message) = response.get("message").and_then(Value::as_str) {
                return Err(Error::Catalog(message.to_string()));
            }

            let context = response.get("context");
            let matched = context
                .and_then(|c| c.get("matched"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if matched == 0 {
                debug!("Catalog page {} matched nothing", request.page);
                exhausted = true;
                break;
            }

            let features = response
                .get("features")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let page_len = features.len();
            for feature in &features {
                match parse_feature(feature) {
                    Some(scene) => scenes.push(scene),
                    None => skipped += 1,
                }
            }

            let has_links = response
                .get("links")
                .and_then(Value::as_array)
                .map(|l| !l.is_empty())
                .unwrap_or(false);
            if !has_links || page_len == 0 {
                exhausted = true;
                break;
            }
            request.page += 1;
            if let Some(limit) = context
                .and_then(|c| c.get("limit"))
                .and_then(Value::as_u64)
                .filter(|l| *l > 0)
            {
                request.limit = limit as u32;
            }
        }

        if !exhausted {
            warn!("Catalog still announced pages after {} requests", self.max_pages);
            return Err(Error::Catalog(format!(
                "result truncated at the {} page limit ({} scenes so far)",
                self.max_pages,
                scenes.len()
            )));
        }

        if skipped > 0 {
            warn!("Skipped {} catalog items that could not be decoded", skipped);
        }
        info!("Catalog returned {} scenes", scenes.len());
        Ok(scenes)
    }
}

fn prop_str<'v>(props: &'v Value, key: &str) -> Option<&'v str> {
    props.get(key).and_then(Value::as_str)
}

fn prop_u32(props: &Value, key: &str) -> Option<u32> {
    match props.get(key)? {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64().map(|v| v as u32),
        _ => None,
    }
}

/// Decodes one STAC item. Items without an id, grid cell, date or any
/// usable footprint are rejected.
pub fn parse_feature(item: &Value) -> Option<SceneFeature> {
    let id = item.get("id")?.as_str()?.to_string();
    let props = item.get("properties")?;

    let collection = item
        .get("collection")
        .and_then(Value::as_str)
        .and_then(Collection::from_stac_id)
        .or_else(|| Collection::from_stac_id(&id))?;

    let path = prop_u32(props, "landsat:wrs_path")?;
    let row = prop_u32(props, "landsat:wrs_row")?;
    let datetime = prop_str(props, "datetime")?;
    let date = NaiveDate::parse_from_str(datetime.get(..10)?, "%Y-%m-%d").ok()?;
    let cloud_cover = props
        .get("eo:cloud_cover")
        .and_then(Value::as_f64)
        .unwrap_or(100.0);

    let footprint = item
        .get("geometry")
        .and_then(footprint_from_geometry)
        .or_else(|| footprint_from_bounds(props))?;

    let assets = item
        .get("assets")
        .and_then(Value::as_object)
        .map(|assets| {
            assets
                .iter()
                .filter_map(|(key, asset)| {
                    asset
                        .get("href")
                        .and_then(Value::as_str)
                        .map(|href| (key.clone(), href.to_string()))
                })
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();

    Some(SceneFeature {
        id,
        collection,
        path,
        row,
        date,
        cloud_cover,
        footprint,
        assets,
        platform: prop_str(props, "platform").map(str::to_string),
    })
}

fn footprint_from_geometry(geometry: &Value) -> Option<MultiPolygon<f64>> {
    if geometry.is_null() {
        return None;
    }
    let geometry: geojson::Geometry = serde_json::from_value(geometry.clone()).ok()?;
    match geo::Geometry::<f64>::try_from(geometry).ok()? {
        geo::Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p])),
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        _ => None,
    }
}

fn footprint_from_bounds(props: &Value) -> Option<MultiPolygon<f64>> {
    let get = |k: &str| props.get(k).and_then(Value::as_f64);
    let north = get("landsat:bounds_north")?;
    let south = get("landsat:bounds_south")?;
    let east = get("landsat:bounds_east")?;
    let west = get("landsat:bounds_west")?;
    let rect = Rect::new((west, south), (east, north));
    let polygon: Polygon<f64> = rect.to_polygon();
    Some(MultiPolygon::new(vec![polygon]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::http::mock::MockHttp;
    use crate::core::params::DateRange;
    use crate::core::query::QueryBuilder;
    use crate::core::params::GridCell;
    use geo::Area;
    use serde_json::json;

    fn item(id: &str, cloud: f64) -> Value {
        json!({
            "id": id,
            "collection": "landsat-c2l2-sr",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]]
            },
            "properties": {
                "datetime": "2024-02-10T15:12:01.123Z",
                "eo:cloud_cover": cloud,
                "landsat:wrs_path": "007",
                "landsat:wrs_row": "057",
                "platform": "LANDSAT_8"
            },
            "assets": {
                "red": { "href": format!("https://h/{}_SR_B4.TIF", id) },
                "thumbnail": { "title": "no href" }
            }
        })
    }

    fn request() -> SearchRequest {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        );
        QueryBuilder::new(range)
            .grid(Some(GridCell { path: 7, row: 57 }))
            .page_size(2)
            .build()
            .unwrap()
    }

    #[test]
    fn follows_pages_until_links_are_empty() {
        let http = MockHttp::default();
        *http.catalog_pages.lock().unwrap() = vec![
            json!({ "features": [item("A", 5.0), item("B", 7.0)], "context": { "matched": 3, "limit": 2 }, "links": [{ "rel": "next" }] }),
            json!({ "features": [item("C", 9.0)], "context": { "matched": 3, "limit": 2 }, "links": [] }),
        ];
        let client = CatalogClient::new(&http, "https://catalog/search");
        let scenes = client.search_all(&request()).unwrap();
        assert_eq!(scenes.len(), 3);
        let requests = http.catalog_requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0]["page"], 1);
        assert_eq!(requests[1]["page"], 2);
    }

    #[test]
    fn page_limit_with_more_pages_is_a_catalog_error() {
        let http = MockHttp::default();
        let page = json!({ "features": [item("A", 5.0)], "context": { "matched": 9, "limit": 1 }, "links": [{ "rel": "next" }] });
        *http.catalog_pages.lock().unwrap() = vec![page.clone(), page.clone(), page];
        let err = CatalogClient::new(&http, "u")
            .with_max_pages(2)
            .search_all(&request())
            .unwrap_err();
        assert!(matches!(err, Error::Catalog(m) if m.contains("truncated")));
        assert_eq!(http.catalog_requests.lock().unwrap().len(), 2);
    }

    #[test]
    fn zero_matches_yields_empty_list() {
        let http = MockHttp::default();
        *http.catalog_pages.lock().unwrap() =
            vec![json!({ "features": [], "context": { "matched": 0 } })];
        let scenes = CatalogClient::new(&http, "u").search_all(&request()).unwrap();
        assert!(scenes.is_empty());
    }

    #[test]
    fn service_message_is_a_catalog_error() {
        let http = MockHttp::default();
        *http.catalog_pages.lock().unwrap() = vec![json!({ "message": "bad query" })];
        let err = CatalogClient::new(&http, "u").search_all(&request()).unwrap_err();
        assert!(matches!(err, Error::Catalog(m) if m == "bad query"));
    }

    #[test]
    fn parses_item_fields() {
        let scene = parse_feature(&item("LC08_L2SP_007057_20240210_20240220_02_T1_SR", 12.5)).unwrap();
        assert_eq!(scene.collection, Collection::SR);
        assert_eq!((scene.path, scene.row), (7, 57));
        assert_eq!(scene.date, NaiveDate::from_ymd_opt(2024, 2, 10).unwrap());
        assert_eq!(scene.cloud_cover, 12.5);
        assert_eq!(scene.assets.len(), 1);
        assert!((scene.footprint.unsigned_area() - 1.0).abs() < 1e-12);
        assert_eq!(scene.platform.as_deref(), Some("LANDSAT_8"));
    }

    #[test]
    fn footprint_falls_back_to_bounds_and_cloud_defaults_to_100() {
        let mut value = item("X_ST", 0.0);
        value["geometry"] = Value::Null;
        value["collection"] = json!("landsat-c2l2-st");
        let props = value["properties"].as_object_mut().unwrap();
        props.remove("eo:cloud_cover");
        props.insert("landsat:bounds_north".into(), json!(2.0));
        props.insert("landsat:bounds_south".into(), json!(0.0));
        props.insert("landsat:bounds_east".into(), json!(3.0));
        props.insert("landsat:bounds_west".into(), json!(1.0));
        let scene = parse_feature(&value).unwrap();
        assert_eq!(scene.collection, Collection::ST);
        assert_eq!(scene.cloud_cover, 100.0);
        assert!((scene.footprint.unsigned_area() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn item_without_footprint_is_rejected() {
        let mut value = item("Y", 1.0);
        value["geometry"] = Value::Null;
        assert!(parse_feature(&value).is_none());
    }
}
