//! Per-acquisition download orchestration.
//!
//! Selected scenes are grouped by (path, row, date). Within a group each
//! required band is fetched from the first candidate that yields it:
//!
//! 1. a group scene published in the band's collection,
//! 2. a catalog sibling with the same key in that collection,
//! 3. a group scene from the other collection, resolved for the band's collection.
//!
//! Missing bands are recorded and the rest of the group is kept.
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::bands::{BandRequirement, collection_for_band};
use crate::core::model::{DownloadedBandFile, SceneFeature, SceneGroup, SceneKey};
use crate::core::progress::{CancelToken, LogSink, ProgressEvent, ProgressSink, Stage};
use crate::core::resolver::{BandResolver, ResolveFailure};
use crate::error::{Error, Result};
use crate::io::http::{AssetFetcher, AssetProbe, HttpError, download_to_file, url_file_name};
use crate::types::{Band, Collection};

static BAND_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:_(?P<coll>SR|ST))?_B(?P<n>\d{1,2})\.tiff?$").expect("Valid regex")
});

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandMiss {
    pub band: Band,
    pub collection: Collection,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupOutcome {
    pub key: SceneKey,
    pub dir: PathBuf,
    pub cloud_cover: f64,
    pub files: Vec<DownloadedBandFile>,
    pub missing: Vec<BandMiss>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadReport {
    pub groups: Vec<GroupOutcome>,
}

impl DownloadReport {
    pub fn files(&self) -> impl Iterator<Item = &DownloadedBandFile> {
        self.groups.iter().flat_map(|g| g.files.iter())
    }

    pub fn files_by_band(&self) -> BTreeMap<Band, Vec<DownloadedBandFile>> {
        group_by_band(self.files().cloned())
    }

    /// Scene directory name -> bands that could not be fetched
    pub fn missing_report(&self) -> BTreeMap<String, Vec<Band>> {
        self.groups
            .iter()
            .filter(|g| !g.missing.is_empty())
            .map(|g| (g.key.dir_name(), g.missing.iter().map(|m| m.band).collect()))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.groups.iter().all(|g| g.missing.is_empty())
    }
}

pub fn group_by_band<I: IntoIterator<Item = DownloadedBandFile>>(
    files: I,
) -> BTreeMap<Band, Vec<DownloadedBandFile>> {
    let mut by_band: BTreeMap<Band, Vec<DownloadedBandFile>> = BTreeMap::new();
    for f in files {
        by_band.entry(f.band).or_default().push(f);
    }
    by_band
}

enum AttemptError {
    Unresolved(ResolveFailure),
    Transfer(HttpError),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Unresolved(e) => write!(f, "{}", e),
            AttemptError::Transfer(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Default)]
struct GroupState {
    files: Vec<DownloadedBandFile>,
    reasons: BTreeMap<Band, String>,
    terminal: HashSet<Band>,
}

pub struct DownloadOrchestrator<'a> {
    resolver: &'a BandResolver,
    probe: &'a dyn AssetProbe,
    fetcher: &'a dyn AssetFetcher,
    downloads_dir: PathBuf,
    progress: &'a dyn ProgressSink,
    cancel: CancelToken,
}

impl<'a> DownloadOrchestrator<'a> {
    pub fn new(
        resolver: &'a BandResolver,
        probe: &'a dyn AssetProbe,
        fetcher: &'a dyn AssetFetcher,
        downloads_dir: &Path,
    ) -> Self {
        Self {
            resolver,
            probe,
            fetcher,
            downloads_dir: downloads_dir.to_path_buf(),
            progress: &LogSink,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Groups scenes by (path, row, date), in key order
    pub fn group_scenes(scenes: &[SceneFeature]) -> Vec<SceneGroup> {
        let mut groups: BTreeMap<SceneKey, Vec<SceneFeature>> = BTreeMap::new();
        for scene in scenes {
            groups.entry(scene.key()).or_default().push(scene.clone());
        }
        groups
            .into_iter()
            .map(|(key, scenes)| SceneGroup { key, scenes })
            .collect()
    }

    /// Downloads `requirement` for every group of `selected`. `pool` is the
    /// full catalog result, searched for cross-collection siblings.
    pub fn run(
        &self,
        selected: &[SceneFeature],
        pool: &[SceneFeature],
        requirement: &BandRequirement,
    ) -> Result<DownloadReport> {
        let groups = Self::group_scenes(selected);
        let mut report = DownloadReport::default();
        for (i, group) in groups.iter().enumerate() {
            self.check_cancel()?;
            self.progress.emit(
                ProgressEvent::new(
                    Stage::Download,
                    format!("group {}/{}: {}", i + 1, groups.len(), group.key),
                )
                .percent(100.0 * i as f32 / groups.len() as f32),
            );
            let outcome = self.process_group(group, pool, requirement)?;
            if !outcome.missing.is_empty() {
                warn!(
                    "{}: missing bands {:?}",
                    group.key,
                    outcome.missing.iter().map(|m| m.band).collect::<Vec<_>>()
                );
            }
            report.groups.push(outcome);
        }
        info!(
            "Downloaded {} band files across {} groups",
            report.files().count(),
            report.groups.len()
        );
        Ok(report)
    }

    fn check_cancel(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn process_group(
        &self,
        group: &SceneGroup,
        pool: &[SceneFeature],
        requirement: &BandRequirement,
    ) -> Result<GroupOutcome> {
        let dir = self.downloads_dir.join(group.key.dir_name());
        fs::create_dir_all(&dir)?;
        let cloud_cover = self.group_cloud_cover(group, &dir)?;

        let mut scenes: Vec<&SceneFeature> = group.scenes.iter().collect();
        if requirement.is_mixed() {
            scenes.sort_by_key(|s| s.collection != Collection::ST);
        }

        let mut state = GroupState::default();
        let mut pending: BTreeMap<Band, Collection> = requirement.iter().collect();

        // Scenes of the band's own collection
        for scene in &scenes {
            let wanted: Vec<(Band, Collection)> = pending
                .iter()
                .filter(|(_, c)| **c == scene.collection)
                .map(|(b, c)| (*b, *c))
                .collect();
            for (band, collection) in wanted {
                if state.terminal.contains(&band) {
                    continue;
                }
                if self.try_candidate(&mut state, group, scene, band, collection, &dir, cloud_cover)? {
                    pending.remove(&band);
                }
            }
        }

        // Catalog siblings, then the group's other-collection scenes
        let remaining: Vec<(Band, Collection)> = pending.iter().map(|(b, c)| (*b, *c)).collect();
        for (band, collection) in remaining {
            let siblings = pool.iter().filter(|s| {
                s.key() == group.key
                    && s.collection == collection
                    && !group.scenes.iter().any(|g| g.id == s.id)
            });
            let borrowed = scenes
                .iter()
                .copied()
                .filter(|s| s.collection != collection);
            for candidate in siblings.chain(borrowed) {
                if state.terminal.contains(&band) {
                    break;
                }
                if self.try_candidate(&mut state, group, candidate, band, collection, &dir, cloud_cover)? {
                    pending.remove(&band);
                    break;
                }
            }
        }

        let missing = pending
            .into_iter()
            .map(|(band, collection)| BandMiss {
                band,
                collection,
                reason: state
                    .reasons
                    .remove(&band)
                    .unwrap_or_else(|| format!("no {} scene in group", collection)),
            })
            .collect();

        Ok(GroupOutcome {
            key: group.key,
            dir,
            cloud_cover,
            files: state.files,
            missing,
        })
    }

    /// One download attempt; `Ok(false)` records why the candidate failed.
    #[allow(clippy::too_many_arguments)]
    fn try_candidate(
        &self,
        state: &mut GroupState,
        group: &SceneGroup,
        scene: &SceneFeature,
        band: Band,
        collection: Collection,
        dir: &Path,
        cloud_cover: f64,
    ) -> Result<bool> {
        self.check_cancel()?;
        match self.attempt(scene, band, collection, dir, cloud_cover) {
            Ok(file) => {
                state.files.push(file);
                Ok(true)
            }
            Err(AttemptError::Transfer(HttpError::Cancelled)) => Err(Error::Cancelled),
            Err(e) => {
                if let AttemptError::Transfer(t) = &e {
                    if t.is_permanent() {
                        state.terminal.insert(band);
                    }
                }
                debug!("{} {} from {}: {}", group.key, band, scene.id, e);
                state.reasons.insert(band, e.to_string());
                Ok(false)
            }
        }
    }

    fn attempt(
        &self,
        scene: &SceneFeature,
        band: Band,
        collection: Collection,
        dir: &Path,
        cloud_cover: f64,
    ) -> std::result::Result<DownloadedBandFile, AttemptError> {
        let asset = self
            .resolver
            .resolve(scene, band, collection, self.probe)
            .map_err(AttemptError::Unresolved)?;
        let dest = dir.join(band_file_name(&asset.url, scene, band, collection));

        // Always refetched; a file left by an earlier run is replaced on rename
        {
            let mut last_decile = -1i32;
            let progress = self.progress;
            let scene_id = scene.id.clone();
            download_to_file(
                self.fetcher,
                &asset.url,
                &dest,
                &self.cancel,
                &mut |done, total| {
                    let Some(total) = total.filter(|t| *t > 0) else {
                        return;
                    };
                    let percent = 100.0 * done as f32 / total as f32;
                    let decile = (percent / 10.0) as i32;
                    if decile > last_decile {
                        last_decile = decile;
                        progress.emit(
                            ProgressEvent::new(Stage::Download, "transferring")
                                .scene(scene_id.clone())
                                .band(band)
                                .percent(percent),
                        );
                    }
                },
            )
            .map_err(AttemptError::Transfer)?;
            info!("Downloaded {} {} via {:?}: {:?}", scene.id, band, asset.strategy, dest);
        }

        Ok(DownloadedBandFile {
            band,
            collection,
            scene_key: scene.key(),
            path: dest,
            cloud_cover,
        })
    }

    /// Cloud cover from the product's MTL.json, falling back to the catalog
    fn group_cloud_cover(&self, group: &SceneGroup, dir: &Path) -> Result<f64> {
        let catalog = group
            .scenes
            .iter()
            .map(|s| s.cloud_cover)
            .reduce(f64::min)
            .unwrap_or(100.0);

        let Some(href) = group.scenes.iter().find_map(metadata_href) else {
            return Ok(catalog);
        };
        let dest = dir.join(url_file_name(href).unwrap_or("MTL.json"));
        match download_to_file(self.fetcher, href, &dest, &self.cancel, &mut |_, _| {}) {
            Ok(_) => Ok(read_mtl_cloud_cover(&dest).unwrap_or(catalog)),
            Err(HttpError::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                warn!("{}: metadata unavailable ({}), using catalog cloud cover", group.key, e);
                Ok(catalog)
            }
        }
    }
}

fn metadata_href(scene: &SceneFeature) -> Option<&str> {
    scene
        .assets
        .iter()
        .find(|(key, href)| {
            let key = key.to_ascii_lowercase();
            (key == "mtl.json" || key.contains("mtl")) && href.to_ascii_lowercase().ends_with(".json")
        })
        .map(|(_, href)| href.as_str())
}

/// File name for a band; keeps the URL's name when it carries the band token
fn band_file_name(url: &str, scene: &SceneFeature, band: Band, collection: Collection) -> String {
    match url_file_name(url) {
        Some(name) if parse_band_file_name(name).map(|(b, _)| b) == Some(band) => name.to_string(),
        _ => format!("{}_{}_{}.TIF", scene.product_id(), collection, band),
    }
}

/// `..._SR_B4.TIF` -> `(B4, SR)`; collection inferred from the band when absent
pub fn parse_band_file_name(name: &str) -> Option<(Band, Collection)> {
    let caps = BAND_FILE_RE.captures(name)?;
    let band = caps["n"].parse::<u8>().ok().and_then(Band::from_number)?;
    let collection = caps
        .name("coll")
        .and_then(|c| Collection::from_token(c.as_str()))
        .unwrap_or_else(|| collection_for_band(band));
    Some((band, collection))
}

/// `LANDSAT_METADATA_FILE.IMAGE_ATTRIBUTES.CLOUD_COVER`, as number or string
pub fn read_mtl_cloud_cover(path: &Path) -> Option<f64> {
    let text = fs::read_to_string(path).ok()?;
    let json: Value = serde_json::from_str(&text).ok()?;
    match &json["LANDSAT_METADATA_FILE"]["IMAGE_ATTRIBUTES"]["CLOUD_COVER"] {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Band files already under `downloads_dir`, one `scene_*` directory per group
pub fn scan_downloads(downloads_dir: &Path) -> Result<Vec<DownloadedBandFile>> {
    let mut files = Vec::new();
    if !downloads_dir.is_dir() {
        return Ok(files);
    }
    for entry in fs::read_dir(downloads_dir)? {
        let dir = entry?.path();
        let Some(key) = dir
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(SceneKey::from_dir_name)
        else {
            continue;
        };
        if !dir.is_dir() {
            continue;
        }
        let mut band_paths = Vec::new();
        let mut cloud_cover = 100.0;
        for item in fs::read_dir(&dir)? {
            let path = item?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with("MTL.json") {
                if let Some(c) = read_mtl_cloud_cover(&path) {
                    cloud_cover = c;
                }
            } else if let Some((band, collection)) = parse_band_file_name(name) {
                band_paths.push((band, collection, path));
            }
        }
        files.extend(band_paths.into_iter().map(|(band, collection, path)| DownloadedBandFile {
            band,
            collection,
            scene_key: key,
            path,
            cloud_cover,
        }));
    }
    files.sort_by(|a, b| (a.band, &a.path).cmp(&(b.band, &b.path)));
    info!("Found {} band files in {:?}", files.len(), downloads_dir);
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::http::mock::MockHttp;
    use crate::types::SpectralIndex;
    use chrono::NaiveDate;
    use geo::MultiPolygon;

    const HOST: &str = "https://data.example/data";

    fn scene(id: &str, collection: Collection, day: u32, cloud: f64, assets: &[(&str, String)]) -> SceneFeature {
        SceneFeature {
            id: id.into(),
            collection,
            path: 7,
            row: 57,
            date: NaiveDate::from_ymd_opt(2024, 2, day).unwrap(),
            cloud_cover: cloud,
            footprint: MultiPolygon::new(vec![]),
            assets: assets.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            platform: None,
        }
    }

    fn url(name: &str) -> String {
        format!("https://h/p/{}", name)
    }

    fn sr_scene(day: u32) -> SceneFeature {
        scene(
            &format!("P{}_SR", day),
            Collection::SR,
            day,
            12.0,
            &[("red", url(&format!("P{}_SR_B4.TIF", day))), ("nir08", url(&format!("P{}_SR_B5.TIF", day)))],
        )
    }

    fn st_scene(day: u32) -> SceneFeature {
        scene(
            &format!("P{}_ST", day),
            Collection::ST,
            day,
            12.0,
            &[("lwir11", url(&format!("P{}_ST_B10.TIF", day)))],
        )
    }

    fn resolver() -> BandResolver {
        BandResolver::new(HOST)
    }

    #[test]
    fn groups_are_keyed_by_cell_and_date() {
        let groups = DownloadOrchestrator::group_scenes(&[sr_scene(3), st_scene(3), sr_scene(1)]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key.date.format("%d").to_string(), "01");
        assert_eq!(groups[1].scenes.len(), 2);
    }

    #[test]
    fn single_collection_group_downloads_all_bands() {
        let dir = tempfile::tempdir().unwrap();
        let http = MockHttp::default()
            .with_file(&url("P1_SR_B4.TIF"), b"red")
            .with_file(&url("P1_SR_B5.TIF"), b"nir");
        let r = resolver();
        let report = DownloadOrchestrator::new(&r, &http, &http, dir.path())
            .run(&[sr_scene(1)], &[sr_scene(1)], &BandRequirement::from_indices(&[SpectralIndex::Ndvi]))
            .unwrap();
        assert!(report.is_complete());
        let by_band = report.files_by_band();
        assert_eq!(by_band.len(), 2);
        let red = &by_band[&Band::B4][0];
        assert_eq!(fs::read(&red.path).unwrap(), b"red");
        assert!(red.path.starts_with(dir.path().join("scene_007_057_20240201")));
        assert_eq!(red.cloud_cover, 12.0);
    }

    #[test]
    fn mixed_group_fetches_thermal_first() {
        let dir = tempfile::tempdir().unwrap();
        let http = MockHttp::default()
            .with_file(&url("P1_SR_B4.TIF"), b"red")
            .with_file(&url("P1_SR_B5.TIF"), b"nir")
            .with_file(&url("P1_ST_B10.TIF"), b"thermal");
        let r = resolver();
        let req = BandRequirement::from_indices(&[SpectralIndex::Ndvi, SpectralIndex::Lst]);
        let report = DownloadOrchestrator::new(&r, &http, &http, dir.path())
            .run(&[sr_scene(1), st_scene(1)], &[], &req)
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(http.fetched()[0], url("P1_ST_B10.TIF"));
        assert_eq!(report.files().count(), 3);
    }

    #[test]
    fn thermal_band_comes_from_catalog_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let http = MockHttp::default()
            .with_file(&url("P1_SR_B4.TIF"), b"red")
            .with_file(&url("P1_SR_B5.TIF"), b"nir")
            .with_file(&url("P1_ST_B10.TIF"), b"thermal");
        let r = resolver();
        let req = BandRequirement::from_indices(&[SpectralIndex::Ndvi, SpectralIndex::Lst]);
        let report = DownloadOrchestrator::new(&r, &http, &http, dir.path())
            .run(&[sr_scene(1)], &[sr_scene(1), st_scene(1), st_scene(2)], &req)
            .unwrap();
        let thermal = &report.files_by_band()[&Band::B10][0];
        assert_eq!(thermal.collection, Collection::ST);
        assert!(thermal.path.ends_with("P1_ST_B10.TIF"));
    }

    #[test]
    fn thermal_band_can_be_borrowed_through_sibling_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let http = MockHttp::default()
            .with_file(&url("P1_SR_B4.TIF"), b"red")
            .with_file(&url("P1_SR_B5.TIF"), b"nir")
            .with_file(&url("P1_ST_B10.TIF"), b"thermal");
        let r = resolver();
        let req = BandRequirement::from_indices(&[SpectralIndex::Lst]);
        let report = DownloadOrchestrator::new(&r, &http, &http, dir.path())
            .run(&[sr_scene(1)], &[], &req)
            .unwrap();
        assert!(report.is_complete());
        assert!(http.probe_count() >= 1);
    }

    #[test]
    fn missing_band_is_reported_and_group_kept() {
        let dir = tempfile::tempdir().unwrap();
        let http = MockHttp::default()
            .with_file(&url("P1_SR_B4.TIF"), b"red")
            .with_file(&url("P1_SR_B5.TIF"), b"nir");
        let r = resolver();
        let req = BandRequirement::from_indices(&[SpectralIndex::Ndvi, SpectralIndex::Lst]);
        let report = DownloadOrchestrator::new(&r, &http, &http, dir.path())
            .run(&[sr_scene(1)], &[], &req)
            .unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.files().count(), 2);
        let missing = report.missing_report();
        assert_eq!(missing["scene_007_057_20240201"], vec![Band::B10]);
    }

    #[test]
    fn client_error_is_terminal_for_the_band() {
        let dir = tempfile::tempdir().unwrap();
        let http = MockHttp::default()
            .with_failure(&url("P1_SR_B4.TIF"), 403)
            .with_file(&url("P1_SR_B5.TIF"), b"nir");
        let mut other = sr_scene(1);
        other.id = "P1b_SR".into();
        let r = resolver();
        let req = BandRequirement::from_bands([Band::B4, Band::B5]);
        let report = DownloadOrchestrator::new(&r, &http, &http, dir.path())
            .run(&[sr_scene(1)], &[sr_scene(1), other], &req)
            .unwrap();
        let group = &report.groups[0];
        assert_eq!(group.missing.len(), 1);
        assert!(group.missing[0].reason.contains("403"));
        let b4_fetches = http.fetched().iter().filter(|u| u.ends_with("B4.TIF")).count();
        assert_eq!(b4_fetches, 1);
    }

    #[test]
    fn cancellation_stops_between_bands_and_keeps_finished_files() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        let mut http = MockHttp::default()
            .with_file(&url("P1_SR_B4.TIF"), b"red")
            .with_file(&url("P1_SR_B5.TIF"), b"nir");
        http.cancel_after = Some((url("P1_SR_B4.TIF"), cancel.clone()));
        let r = resolver();
        let err = DownloadOrchestrator::new(&r, &http, &http, dir.path())
            .with_cancel(cancel)
            .run(&[sr_scene(1)], &[], &BandRequirement::from_bands([Band::B4, Band::B5]))
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        let group_dir = dir.path().join("scene_007_057_20240201");
        assert!(group_dir.join("P1_SR_B4.TIF").exists());
        assert!(!group_dir.join("P1_SR_B5.TIF").exists());
        let leftovers = fs::read_dir(&group_dir)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().to_string_lossy().ends_with(".part"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn metadata_cloud_cover_overrides_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = sr_scene(1);
        s.assets.insert("MTL.json".into(), url("P1_MTL.json"));
        let mtl = br#"{"LANDSAT_METADATA_FILE":{"IMAGE_ATTRIBUTES":{"CLOUD_COVER":"3.25"}}}"#;
        let http = MockHttp::default()
            .with_file(&url("P1_SR_B4.TIF"), b"red")
            .with_file(&url("P1_MTL.json"), mtl);
        let r = resolver();
        let report = DownloadOrchestrator::new(&r, &http, &http, dir.path())
            .run(&[s], &[], &BandRequirement::from_bands([Band::B4]))
            .unwrap();
        assert_eq!(report.groups[0].cloud_cover, 3.25);
        assert_eq!(report.files().next().unwrap().cloud_cover, 3.25);
    }

    #[test]
    fn files_from_an_earlier_run_are_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let group_dir = dir.path().join("scene_007_057_20240201");
        fs::create_dir_all(&group_dir).unwrap();
        fs::write(group_dir.join("P1_SR_B4.TIF"), b"stale").unwrap();
        fs::write(
            group_dir.join("P1_MTL.json"),
            r#"{"LANDSAT_METADATA_FILE":{"IMAGE_ATTRIBUTES":{"CLOUD_COVER":90}}}"#,
        )
        .unwrap();

        let mut s = sr_scene(1);
        s.assets.insert("MTL.json".into(), url("P1_MTL.json"));
        let mtl = br#"{"LANDSAT_METADATA_FILE":{"IMAGE_ATTRIBUTES":{"CLOUD_COVER":4}}}"#;
        let http = MockHttp::default()
            .with_file(&url("P1_SR_B4.TIF"), b"fresh")
            .with_file(&url("P1_MTL.json"), mtl);
        let r = resolver();
        let report = DownloadOrchestrator::new(&r, &http, &http, dir.path())
            .run(&[s], &[], &BandRequirement::from_bands([Band::B4]))
            .unwrap();

        assert!(http.fetched().contains(&url("P1_SR_B4.TIF")));
        assert!(http.fetched().contains(&url("P1_MTL.json")));
        assert_eq!(fs::read(group_dir.join("P1_SR_B4.TIF")).unwrap(), b"fresh");
        assert_eq!(report.groups[0].cloud_cover, 4.0);
    }

    #[test]
    fn scan_finds_band_files_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let g = dir.path().join("scene_007_057_20240201");
        fs::create_dir_all(&g).unwrap();
        fs::write(g.join("X_SR_B4.TIF"), b"a").unwrap();
        fs::write(g.join("X_ST_B10.TIF"), b"b").unwrap();
        fs::write(g.join("X_QA_PIXEL.TIF"), b"c").unwrap();
        fs::write(
            g.join("X_MTL.json"),
            r#"{"LANDSAT_METADATA_FILE":{"IMAGE_ATTRIBUTES":{"CLOUD_COVER":7.5}}}"#,
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("unrelated")).unwrap();

        let files = scan_downloads(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].band, Band::B4);
        assert_eq!(files[1].collection, Collection::ST);
        assert!(files.iter().all(|f| f.cloud_cover == 7.5));
    }

    #[test]
    fn band_file_names() {
        assert_eq!(parse_band_file_name("L_SR_B4.TIF"), Some((Band::B4, Collection::SR)));
        assert_eq!(parse_band_file_name("L_B10.tif"), Some((Band::B10, Collection::ST)));
        assert_eq!(parse_band_file_name("L_B1.TIF.part"), None);
        assert_eq!(parse_band_file_name("L_QA_PIXEL.TIF"), None);
    }
}
