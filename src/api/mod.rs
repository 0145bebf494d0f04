//! High-level library API: the workspace layout and the end-to-end run from
//! AOI to spectral indices. Prefer these entrypoints over driving the `core`
//! stages by hand when integrating landsatpro.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::core::bands::BandRequirement;
use crate::core::clip::ClipEngine;
use crate::core::coverage::{CoverageOptions, CoverageSelection, CoverageSelector};
use crate::core::download::{DownloadOrchestrator, DownloadReport, group_by_band, scan_downloads};
use crate::core::model::{AreaOfInterest, BandMosaic, ClipResult, Crs, DownloadedBandFile, SceneFeature};
use crate::core::mosaic::MosaicBuilder;
use crate::core::params::PipelineParams;
use crate::core::processing::{IndexCalculator, IndexReport};
use crate::core::progress::{CancelToken, LogSink, ProgressEvent, ProgressSink, Stage};
use crate::core::query::QueryBuilder;
use crate::core::resolver::BandResolver;
use crate::error::{Error, Result};
use crate::io::aoi::{AoiError, discover_aoi_source, load_aoi};
use crate::io::catalog::CatalogClient;
use crate::io::gdal::reproject_aoi;
use crate::io::http::{AssetFetcher, AssetProbe, CatalogTransport};
use crate::io::session::Session;
use crate::io::writers::metadata::write_json_log;
use crate::types::{Band, Collection};

/// On-disk layout of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder scanned for AOI files
    pub fn source_dir(&self) -> PathBuf {
        self.root.join("temp").join("source")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("temp").join("downloads")
    }

    pub fn mosaic_dir(&self) -> PathBuf {
        self.root.join("temp").join("processed").join("mosaic")
    }

    pub fn clip_dir(&self) -> PathBuf {
        self.root.join("temp").join("processed").join("clip")
    }

    pub fn indices_dir(&self) -> PathBuf {
        self.root.join("exports").join("indices")
    }

    pub fn processing_log_path(&self) -> PathBuf {
        self.root.join("exports").join("processing_log.json")
    }

    /// Nested workspace for the comparative period
    pub fn comparative(&self) -> Workspace {
        Workspace::new(&self.root.join("comparative"))
    }

    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.source_dir(),
            self.downloads_dir(),
            self.mosaic_dir(),
            self.clip_dir(),
            self.indices_dir(),
        ] {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// Remote collaborators of a run. One [`Session`] usually plays all three roles.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub catalog: &'a dyn CatalogTransport,
    pub probe: &'a dyn AssetProbe,
    pub fetcher: &'a dyn AssetFetcher,
}

impl<'a> Services<'a> {
    pub fn from_session(session: &'a Session) -> Self {
        Self {
            catalog: session,
            probe: session,
            fetcher: session,
        }
    }
}

pub struct PipelineRun<'a> {
    pub workspace: Workspace,
    pub params: PipelineParams,
    pub services: Services<'a>,
    pub progress: &'a dyn ProgressSink,
    pub cancel: CancelToken,
}

impl<'a> PipelineRun<'a> {
    pub fn new(workspace: Workspace, params: PipelineParams, services: Services<'a>) -> Self {
        Self {
            workspace,
            params,
            services,
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

    /// The same run over the comparative date range, in `comparative/`
    pub fn comparative(&self, aoi_source: Option<&Path>) -> Option<PipelineRun<'a>> {
        let mut params = self.params.comparative_params()?;
        if params.aoi_path.is_none() {
            params.aoi_path = aoi_source.map(Path::to_path_buf);
        }
        Some(PipelineRun {
            workspace: self.workspace.comparative(),
            params,
            services: self.services,
            progress: self.progress,
            cancel: self.cancel.clone(),
        })
    }

    fn emit(&self, stage: Stage, message: String) {
        self.progress.emit(ProgressEvent::new(stage, message));
    }

    fn check_cancel(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Contents of `exports/processing_log.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingLog {
    pub mosaics: BTreeMap<Band, PathBuf>,
    pub clips: BTreeMap<Band, PathBuf>,
    /// Scene directory name -> bands that could not be fetched
    pub missing_bands: BTreeMap<String, Vec<Band>>,
    pub degraded_clips: Vec<Band>,
    pub failed_bands: BTreeMap<Band, String>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub aoi_source: Option<PathBuf>,
    pub aoi: AreaOfInterest,
    /// Catalog hits before coverage selection; zero when downloads were reused
    pub candidates: usize,
    pub selection: CoverageSelection,
    pub downloads: Option<DownloadReport>,
    pub mosaics: Vec<BandMosaic>,
    pub clips: Vec<ClipResult>,
    pub log: ProcessingLog,
    pub indices: IndexReport,
}

impl RunReport {
    /// True when some band or index is missing from an otherwise successful run
    pub fn is_partial(&self) -> bool {
        !self.log.missing_bands.is_empty()
            || !self.log.failed_bands.is_empty()
            || !self.log.degraded_clips.is_empty()
            || self.indices.computed().count() < self.indices.outcomes.len()
    }
}

/// Loads a JSON parameter preset; absent fields take their defaults
pub fn load_params(path: &Path) -> Result<PipelineParams> {
    let text = fs::read_to_string(path)?;
    let params: PipelineParams = serde_json::from_str(&text)?;
    Ok(params)
}

/// AOI from the configured path, else the newest file in the source folder.
/// `None` only in grid mode, where the AOI is taken from the catalog.
fn resolve_aoi(run: &PipelineRun) -> Result<Option<(PathBuf, AreaOfInterest)>> {
    if let Some(path) = &run.params.aoi_path {
        return Ok(Some((path.clone(), load_aoi(path)?)));
    }
    let source_dir = run.workspace.source_dir();
    match discover_aoi_source(&source_dir) {
        Ok(path) => {
            let aoi = load_aoi(&path)?;
            Ok(Some((path, aoi)))
        }
        Err(AoiError::NotFound(_)) if run.params.grid.is_some() && !run.params.reuse_downloads => Ok(None),
        Err(AoiError::NotFound(_)) => Err(Error::AoiNotFound(source_dir)),
        Err(e) => Err(e.into()),
    }
}

fn search(run: &PipelineRun, aoi: Option<&AreaOfInterest>, requirement: &BandRequirement) -> Result<Vec<SceneFeature>> {
    let mut builder = QueryBuilder::from_params(&run.params);
    if let Some(aoi) = aoi {
        builder = builder.aoi(aoi);
    }
    for collection in Collection::ALL {
        if requirement.needs(collection) {
            builder = builder.with_collection(collection);
        }
    }
    let request = builder.build()?;
    run.emit(Stage::Search, format!("searching {}", run.params.catalog_url));
    let client = CatalogClient::new(run.services.catalog, &run.params.catalog_url);
    let features = client.search_all(&request)?;
    run.emit(Stage::Search, format!("{} candidate scenes", features.len()));
    Ok(features)
}

fn footprint_aoi(candidates: &[SceneFeature]) -> Option<AreaOfInterest> {
    candidates
        .iter()
        .min_by(|a, b| a.cloud_cover.total_cmp(&b.cloud_cover))
        .map(|s| AreaOfInterest::new(s.footprint.clone(), Crs::wgs84()))
}

/// Required bands absent from each reused scene directory
fn missing_from_files(files: &[DownloadedBandFile], requirement: &BandRequirement) -> BTreeMap<String, Vec<Band>> {
    let mut present: BTreeMap<String, Vec<Band>> = BTreeMap::new();
    for f in files {
        present.entry(f.scene_key.dir_name()).or_default().push(f.band);
    }
    present
        .into_iter()
        .filter_map(|(dir, bands)| {
            let missing: Vec<Band> = requirement.bands().into_iter().filter(|b| !bands.contains(b)).collect();
            (!missing.is_empty()).then_some((dir, missing))
        })
        .collect()
}

struct BandProduct {
    band: Band,
    mosaic: Option<BandMosaic>,
    clip: Option<ClipResult>,
    error: Option<String>,
}

/// What the parallel mosaic/clip stage shares between bands
struct BandStage<'a> {
    mosaic_dir: PathBuf,
    clip_dir: PathBuf,
    nodata: f64,
    aoi: &'a AreaOfInterest,
    progress: &'a dyn ProgressSink,
    cancel: &'a CancelToken,
}

impl BandStage<'_> {
    fn process(&self, band: Band, files: &[DownloadedBandFile]) -> BandProduct {
        let mut product = BandProduct {
            band,
            mosaic: None,
            clip: None,
            error: None,
        };
        if self.cancel.is_cancelled() {
            product.error = Some(Error::Cancelled.to_string());
            return product;
        }
        self.progress.emit(
            ProgressEvent::new(Stage::Mosaic, format!("mosaicking {} from {} files", band, files.len()))
                .band(band),
        );
        let mosaic = match MosaicBuilder::new(&self.mosaic_dir).build(band, files) {
            Ok(m) => m,
            Err(e) => {
                warn!("{}", e);
                product.error = Some(e.to_string());
                return product;
            }
        };
        self.progress
            .emit(ProgressEvent::new(Stage::Clip, format!("clipping {}", band)).band(band));
        match ClipEngine::new(&self.clip_dir, self.nodata).clip(band, &mosaic.output_path, self.aoi) {
            Ok(c) => product.clip = Some(c),
            Err(e) => {
                warn!("{}", e);
                product.error = Some(e.to_string());
            }
        }
        product.mosaic = Some(mosaic);
        product
    }
}

/// Runs search, selection, download, mosaic, clip and indices for one period.
///
/// Per-band failures are recorded in the report; the run fails when no band
/// could be clipped, when the AOI cannot be found, or when the catalog errors.
pub fn run_pipeline(run: &PipelineRun) -> Result<RunReport> {
    let params = &run.params;
    params.validate().map_err(Error::Configuration)?;
    run.workspace.ensure()?;
    run.emit(Stage::Query, format!("workspace {:?}", run.workspace.root()));

    let resolved = resolve_aoi(run)?;
    let aoi_source = resolved.as_ref().map(|(p, _)| p.clone());
    let mut aoi = resolved
        .map(|(_, aoi)| reproject_aoi(&aoi, &Crs::wgs84()))
        .transpose()?;
    let requirement = BandRequirement::from_indices(&params.indices);
    info!("Required bands: {:?}", requirement.bands());

    let mut candidates = 0;
    let mut selection = CoverageSelection::default();
    let mut downloads = None;
    let mut log = ProcessingLog::default();

    let files: Vec<DownloadedBandFile> = if params.reuse_downloads {
        let files: Vec<DownloadedBandFile> = scan_downloads(&run.workspace.downloads_dir())?
            .into_iter()
            .filter(|f| requirement.collection_for(f.band).is_some())
            .collect();
        log.missing_bands = missing_from_files(&files, &requirement);
        files
    } else {
        let pool = search(run, aoi.as_ref(), &requirement)?;
        candidates = pool.len();
        if aoi.is_none() {
            aoi = footprint_aoi(&pool);
            if aoi.is_some() {
                info!("Using the least cloudy scene footprint as the AOI");
            }
        }
        let area = aoi.as_ref().ok_or_else(|| Error::AoiNotFound(run.workspace.source_dir()))?;
        run.check_cancel()?;

        selection = CoverageSelector::new(CoverageOptions::from(params)).select(area, &pool);
        run.emit(
            Stage::Coverage,
            format!(
                "selected {} of {} scenes, coverage {:.1}%",
                selection.scenes.len(),
                pool.len(),
                selection.total_fraction * 100.0
            ),
        );

        let resolver = BandResolver::new(&params.data_host);
        let report = DownloadOrchestrator::new(
            &resolver,
            run.services.probe,
            run.services.fetcher,
            &run.workspace.downloads_dir(),
        )
        .with_progress(run.progress)
        .with_cancel(run.cancel.clone())
        .run(&selection.features(), &pool, &requirement)?;
        log.missing_bands = report.missing_report();
        let files = report.files().cloned().collect();
        downloads = Some(report);
        files
    };
    let aoi = aoi.ok_or_else(|| Error::AoiNotFound(run.workspace.source_dir()))?;
    run.check_cancel()?;

    let by_band = group_by_band(files);
    let stage = BandStage {
        mosaic_dir: run.workspace.mosaic_dir(),
        clip_dir: run.workspace.clip_dir(),
        nodata: params.nodata,
        aoi: &aoi,
        progress: run.progress,
        cancel: &run.cancel,
    };
    let workers = rayon::ThreadPoolBuilder::new()
        .num_threads(params.workers.max(1))
        .build()
        .map_err(Error::external)?;
    let products: Vec<BandProduct> = workers.install(|| {
        by_band
            .par_iter()
            .map(|(band, files)| stage.process(*band, files))
            .collect()
    });
    run.check_cancel()?;

    let mut mosaics = Vec::new();
    let mut clips = Vec::new();
    for product in products {
        if let Some(m) = product.mosaic {
            log.mosaics.insert(product.band, m.output_path.clone());
            mosaics.push(m);
        }
        if let Some(c) = product.clip {
            if c.degraded {
                log.degraded_clips.push(product.band);
            }
            log.clips.insert(product.band, c.clipped_path.clone());
            clips.push(c);
        }
        if let Some(e) = product.error {
            log.failed_bands.insert(product.band, e);
        }
    }
    write_json_log(&run.workspace.processing_log_path(), &log)?;

    if clips.is_empty() {
        return Err(Error::NoBandsProcessed);
    }

    run.emit(Stage::Indices, format!("computing {:?}", params.indices));
    let indices = IndexCalculator::new(&run.workspace.indices_dir(), params.nodata, params.lst)
        .run(&log.clips, &params.indices)?;

    run.emit(
        Stage::Done,
        format!(
            "{} bands clipped, {} indices computed",
            clips.len(),
            indices.computed().count()
        ),
    );
    Ok(RunReport {
        aoi_source,
        aoi,
        candidates,
        selection,
        downloads,
        mosaics,
        clips,
        log,
        indices,
    })
}

/// Runs the main period, then the comparative period when one is configured
pub fn run_with_comparative(run: &PipelineRun) -> Result<(RunReport, Option<RunReport>)> {
    let primary = run_pipeline(run)?;
    let comparative = match run.comparative(primary.aoi_source.as_deref()) {
        Some(next) => {
            info!("Comparative period into {:?}", next.workspace.root());
            Some(run_pipeline(&next)?)
        }
        None => None,
    };
    Ok((primary, comparative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::http::mock::MockHttp;

    #[test]
    fn workspace_layout() {
        let ws = Workspace::new(Path::new("/w"));
        assert_eq!(ws.source_dir(), Path::new("/w/temp/source"));
        assert_eq!(ws.mosaic_dir(), Path::new("/w/temp/processed/mosaic"));
        assert_eq!(ws.processing_log_path(), Path::new("/w/exports/processing_log.json"));
        assert_eq!(ws.comparative().indices_dir(), Path::new("/w/comparative/exports/indices"));
    }

    #[test]
    fn missing_aoi_is_fatal_outside_grid_mode() {
        let dir = tempfile::tempdir().unwrap();
        let http = MockHttp::default();
        let services = Services {
            catalog: &http,
            probe: &http,
            fetcher: &http,
        };
        let run = PipelineRun::new(Workspace::new(dir.path()), PipelineParams::default(), services);
        let err = run_pipeline(&run).unwrap_err();
        assert!(matches!(err, Error::AoiNotFound(_)));
    }

    #[test]
    fn invalid_params_are_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let http = MockHttp::default();
        let services = Services {
            catalog: &http,
            probe: &http,
            fetcher: &http,
        };
        let params = PipelineParams {
            max_cloud_cover: 150.0,
            ..PipelineParams::default()
        };
        let run = PipelineRun::new(Workspace::new(dir.path()), params, services);
        assert!(matches!(run_pipeline(&run), Err(Error::Configuration(_))));
    }

    #[test]
    fn comparative_run_inherits_aoi_source() {
        let http = MockHttp::default();
        let services = Services {
            catalog: &http,
            probe: &http,
            fetcher: &http,
        };
        let mut params = PipelineParams::default();
        assert!(PipelineRun::new(Workspace::new(Path::new("/w")), params.clone(), services)
            .comparative(None)
            .is_none());

        params.comparative = Some(params.date_range);
        let run = PipelineRun::new(Workspace::new(Path::new("/w")), params, services);
        let next = run.comparative(Some(Path::new("/w/temp/source/aoi.geojson"))).unwrap();
        assert_eq!(next.workspace.root(), Path::new("/w/comparative"));
        assert_eq!(next.params.aoi_path.as_deref(), Some(Path::new("/w/temp/source/aoi.geojson")));
        assert!(next.params.comparative.is_none());
    }

    #[test]
    fn reused_directories_report_missing_bands() {
        use crate::core::model::SceneKey;
        use chrono::NaiveDate;
        let key = SceneKey {
            path: 7,
            row: 57,
            date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
        };
        let files = vec![DownloadedBandFile {
            band: Band::B4,
            collection: Collection::SR,
            scene_key: key,
            path: "x_SR_B4.TIF".into(),
            cloud_cover: 3.0,
        }];
        let missing = missing_from_files(&files, &BandRequirement::from_bands([Band::B4, Band::B5]));
        assert_eq!(missing[&key.dir_name()], vec![Band::B5]);
    }

    #[test]
    fn preset_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preset.json");
        fs::write(&path, r#"{ "max_cloud_cover": 35.0, "indices": ["Ndvi", "Lst"] }"#).unwrap();
        let params = load_params(&path).unwrap();
        assert_eq!(params.max_cloud_cover, 35.0);
        assert_eq!(params.indices.len(), 2);
        assert_eq!(params.window_days, 120);
    }
}
