//! End-to-end runs against an in-memory provider serving synthetic GeoTIFFs.
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use ndarray::Array2;
use serde_json::{Value, json};

use landsatpro::api::{PipelineRun, Services, Workspace, run_pipeline};
use landsatpro::core::params::{DateRange, PipelineParams};
use landsatpro::core::processing::IndexOutcome;
use landsatpro::core::progress::{CancelToken, ProgressEvent, Stage};
use landsatpro::io::gdal::SampleType;
use landsatpro::io::http::{AssetFetcher, AssetProbe, CatalogTransport, HttpError};
use landsatpro::io::writers::tiff::{GeoReference, write_geotiff_as};
use landsatpro::types::{Band, SpectralIndex};
use landsatpro::{Error, RunReport};

const HOST: &str = "https://data.test/scenes";

#[derive(Default)]
struct Provider {
    pages: Mutex<Vec<Value>>,
    files: HashMap<String, Vec<u8>>,
    probes: Mutex<Vec<String>>,
    fetches: Mutex<Vec<String>>,
}

impl Provider {
    fn fetched(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

impl CatalogTransport for Provider {
    fn post_json(&self, _url: &str, _body: &Value) -> Result<Value, HttpError> {
        let mut pages = self.pages.lock().unwrap();
        if pages.is_empty() {
            Ok(json!({ "features": [], "context": { "matched": 0 } }))
        } else {
            Ok(pages.remove(0))
        }
    }
}

impl AssetProbe for Provider {
    fn exists(&self, url: &str) -> Result<bool, HttpError> {
        self.probes.lock().unwrap().push(url.to_string());
        Ok(self.files.contains_key(url))
    }
}

impl AssetFetcher for Provider {
    fn fetch(
        &self,
        url: &str,
        sink: &mut dyn Write,
        _cancel: &CancelToken,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<u64, HttpError> {
        self.fetches.lock().unwrap().push(url.to_string());
        let bytes = self.files.get(url).ok_or_else(|| HttpError::Status {
            status: 404,
            url: url.to_string(),
        })?;
        sink.write_all(bytes)?;
        progress(bytes.len() as u64, Some(bytes.len() as u64));
        Ok(bytes.len() as u64)
    }
}

/// UTM 18N tile of 12 km around (-75.0, 4.0)
fn band_tiff(scratch: &Path, name: &str, value: impl Fn(usize, usize) -> f64) -> Vec<u8> {
    let path = scratch.join(name);
    let data = Array2::from_shape_fn((400, 400), |(r, c)| value(r, c));
    let georef = GeoReference {
        geotransform: [495_000.0, 30.0, 0.0, 450_000.0, 0.0, -30.0],
        projection: "EPSG:32618".into(),
        nodata: Some(0.0),
    };
    drop(write_geotiff_as(&path, &data, SampleType::U16, &georef).unwrap());
    fs::read(&path).unwrap()
}

fn product(date: &str) -> String {
    format!("LC08_L2SP_007057_{}_20240320_02_T1", date.replace('-', ""))
}

fn sr_item(date: &str, cloud: f64) -> Value {
    let product = product(date);
    json!({
        "id": format!("{}_SR", product),
        "collection": "landsat-c2l2-sr",
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[-75.1, 3.9], [-74.9, 3.9], [-74.9, 4.1], [-75.1, 4.1], [-75.1, 3.9]]]
        },
        "properties": {
            "datetime": format!("{}T15:20:00Z", date),
            "eo:cloud_cover": cloud,
            "landsat:wrs_path": "007",
            "landsat:wrs_row": "057",
            "platform": "LANDSAT_8"
        },
        "assets": {
            "red": { "href": format!("{}/{}/{}_SR_B4.TIF", HOST, product, product) },
            "nir08": { "href": format!("{}/{}/{}_SR_B5.TIF", HOST, product, product) }
        }
    })
}

fn page(items: Vec<Value>) -> Value {
    json!({
        "features": items,
        "context": { "matched": items.len(), "returned": items.len() },
        "links": []
    })
}

fn serve_scene(provider: &mut Provider, scratch: &Path, date: &str, red: f64, nir: f64) {
    let product = product(date);
    provider.files.insert(
        format!("{}/{}/{}_SR_B4.TIF", HOST, product, product),
        band_tiff(scratch, &format!("{}_B4.tif", date), |_, _| red),
    );
    provider.files.insert(
        format!("{}/{}/{}_SR_B5.TIF", HOST, product, product),
        band_tiff(scratch, &format!("{}_B5.tif", date), |r, _| nir + (r % 7) as f64 * 10.0),
    );
}

fn workspace_with_aoi(root: &Path) -> Workspace {
    let ws = Workspace::new(root);
    ws.ensure().unwrap();
    let aoi = json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[-75.02, 4.0], [-74.98, 4.0], [-74.98, 4.04], [-75.02, 4.04], [-75.02, 4.0]]]
            }
        }]
    });
    fs::write(ws.source_dir().join("aoi.geojson"), aoi.to_string()).unwrap();
    ws
}

fn params(indices: Vec<SpectralIndex>) -> PipelineParams {
    PipelineParams {
        date_range: DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 4, 30).unwrap(),
        ),
        data_host: "https://data.test/landsat".into(),
        indices,
        workers: 2,
        ..PipelineParams::default()
    }
}

fn run(provider: &Provider, ws: Workspace, params: PipelineParams) -> landsatpro::Result<RunReport> {
    let services = Services {
        catalog: provider,
        probe: provider,
        fetcher: provider,
    };
    let events: Mutex<Vec<ProgressEvent>> = Mutex::new(Vec::new());
    let sink = |e: ProgressEvent| events.lock().unwrap().push(e);
    let report = run_pipeline(&PipelineRun::new(ws, params, services).with_progress(&sink));
    let stages: Vec<Stage> = events.lock().unwrap().iter().map(|e| e.stage).collect();
    if report.is_ok() {
        assert_eq!(stages.last(), Some(&Stage::Done));
    }
    report
}

#[test]
fn single_contained_scene_yields_ndvi() {
    let tmp = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let mut provider = Provider::default();
    serve_scene(&mut provider, scratch.path(), "2024-03-09", 1000.0, 3000.0);
    provider.pages.lock().unwrap().push(page(vec![sr_item("2024-03-09", 10.0)]));

    let ws = workspace_with_aoi(tmp.path());
    let report = run(&provider, ws.clone(), params(vec![SpectralIndex::Ndvi])).unwrap();

    let downloads = report.downloads.as_ref().unwrap();
    assert_eq!(downloads.groups.len(), 1);
    assert!(downloads.is_complete());
    // Both bands came straight from the asset table
    assert!(provider.probes.lock().unwrap().is_empty());

    assert_eq!(report.mosaics.len(), 2);
    assert!(report.mosaics.iter().all(|m| m.ordered_sources.len() == 1));
    assert_eq!(report.clips.len(), 2);
    assert!(report.clips.iter().all(|c| c.valid_pixels > 0 && !c.degraded));

    let (index, export) = report.indices.computed().next().unwrap();
    assert_eq!(*index, SpectralIndex::Ndvi);
    let stats = export.stats.unwrap();
    assert!(-1.0 <= stats.min && stats.min <= stats.max && stats.max <= 1.0);
    assert!((stats.mean - 0.5).abs() < 0.01);
    assert!(export.raster_path.starts_with(ws.indices_dir()));

    let log: Value = serde_json::from_str(&fs::read_to_string(ws.processing_log_path()).unwrap()).unwrap();
    assert!(log["clips"]["B4"].is_string());
    assert!(log["mosaics"]["B5"].is_string());
    assert!(ws.mosaic_dir().join("mosaic_B4.tif").exists());
    assert!(ws.clip_dir().join("clip_B5.tif").exists());
    assert!(ws.indices_dir().join("indices_log.json").exists());
}

#[test]
fn least_cloudy_scene_of_a_cell_is_the_only_one_used() {
    let tmp = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let mut provider = Provider::default();
    serve_scene(&mut provider, scratch.path(), "2024-02-06", 900.0, 2500.0);
    serve_scene(&mut provider, scratch.path(), "2024-03-09", 1000.0, 3000.0);
    provider.pages.lock().unwrap().push(page(vec![
        sr_item("2024-02-06", 60.0),
        sr_item("2024-03-09", 5.0),
    ]));

    let report = run(&provider, workspace_with_aoi(tmp.path()), params(vec![SpectralIndex::Ndvi])).unwrap();

    assert_eq!(report.candidates, 2);
    assert_eq!(report.selection.scenes.len(), 1);
    assert_eq!(report.selection.scenes[0].scene.cloud_cover, 5.0);
    assert!(provider.fetched().iter().all(|u| u.contains("20240309")));
    assert_eq!(report.downloads.as_ref().unwrap().groups.len(), 1);
}

#[test]
fn missing_thermal_band_leaves_other_indices_intact() {
    let tmp = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let mut provider = Provider::default();
    serve_scene(&mut provider, scratch.path(), "2024-03-09", 1000.0, 3000.0);
    provider.pages.lock().unwrap().push(page(vec![sr_item("2024-03-09", 10.0)]));

    let report = run(
        &provider,
        workspace_with_aoi(tmp.path()),
        params(vec![SpectralIndex::Ndvi, SpectralIndex::Lst]),
    )
    .unwrap();

    let downloads = report.downloads.as_ref().unwrap();
    for group in &downloads.groups {
        assert_eq!(group.missing.iter().map(|m| m.band).collect::<Vec<_>>(), vec![Band::B10]);
    }
    assert_eq!(report.log.missing_bands.values().next().unwrap(), &vec![Band::B10]);
    assert!(matches!(
        report.indices.outcomes[&SpectralIndex::Lst],
        IndexOutcome::Unavailable { .. }
    ));
    assert!(matches!(
        report.indices.outcomes[&SpectralIndex::Ndvi],
        IndexOutcome::Computed(_)
    ));
    assert!(report.is_partial());
}

#[test]
fn empty_catalog_means_no_bands_processed() {
    let tmp = tempfile::tempdir().unwrap();
    let provider = Provider::default();
    let err = run(&provider, workspace_with_aoi(tmp.path()), params(vec![SpectralIndex::Ndvi])).unwrap_err();
    assert!(matches!(err, Error::NoBandsProcessed));
}

#[test]
fn reused_downloads_skip_the_catalog() {
    let tmp = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let ws = workspace_with_aoi(tmp.path());
    let scene_dir = ws.downloads_dir().join("scene_007_057_20240309");
    fs::create_dir_all(&scene_dir).unwrap();
    for (band, value) in [("B4", 1000.0), ("B5", 3000.0)] {
        let bytes = band_tiff(scratch.path(), &format!("{}.tif", band), |_, _| value);
        fs::write(scene_dir.join(format!("{}_SR_{}.TIF", product("2024-03-09"), band)), bytes).unwrap();
    }

    let provider = Provider::default();
    let params = PipelineParams {
        reuse_downloads: true,
        ..params(vec![SpectralIndex::Ndvi])
    };
    let report = run(&provider, ws, params).unwrap();
    assert!(report.downloads.is_none());
    assert!(provider.fetched().is_empty());
    assert_eq!(report.clips.len(), 2);
    assert_eq!(report.indices.computed().count(), 1);
}
