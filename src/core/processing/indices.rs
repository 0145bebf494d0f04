//! Spectral index computation over clipped bands.
//!
//! Each requested index either computes (raster, preview and statistics), is
//! reported unavailable when a required band was never clipped, or fails on
//! its own without affecting the other indices of the batch.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::model::IndexStats;
use crate::core::params::LstConstants;
use crate::core::processing::ops;
use crate::error::{Error, Result};
use crate::io::gdal::{RasterReader, SampleType};
use crate::io::writers::metadata::{provenance_items, write_json_log};
use crate::io::writers::png::{Palette, write_preview_png};
use crate::io::writers::tiff::{GeoReference, embed_metadata, write_geotiff_as};
use crate::io::writers::worldfile::{write_prj_file, write_world_file};
use crate::types::{Band, SpectralIndex};

/// Nodata value of the Float32 index rasters
pub const INDEX_NODATA: f64 = -9999.0;

/// Band arrays loaded from clips, all sharing one georeference
pub struct BandStack {
    pub arrays: BTreeMap<Band, Array2<f64>>,
    pub georef: GeoReference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexExport {
    pub raster_path: PathBuf,
    pub preview_path: Option<PathBuf>,
    /// `None` when no pixel of the index is finite
    pub stats: Option<IndexStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexOutcome {
    Computed(IndexExport),
    Unavailable { missing: Vec<Band> },
    Failed { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexReport {
    pub outcomes: BTreeMap<SpectralIndex, IndexOutcome>,
}

impl IndexReport {
    pub fn computed(&self) -> impl Iterator<Item = (&SpectralIndex, &IndexExport)> {
        self.outcomes.iter().filter_map(|(i, o)| match o {
            IndexOutcome::Computed(e) => Some((i, e)),
            _ => None,
        })
    }

    pub fn unavailable(&self) -> Vec<SpectralIndex> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, IndexOutcome::Unavailable { .. }))
            .map(|(i, _)| *i)
            .collect()
    }
}

/// Bands `index` needs that are absent from `available`
pub fn missing_bands(index: SpectralIndex, available: &[Band]) -> Vec<Band> {
    index
        .required_bands()
        .iter()
        .filter(|b| !available.contains(b))
        .copied()
        .collect()
}

/// Evaluate one index over already-masked band arrays.
pub fn compute_index(
    index: SpectralIndex,
    bands: &BTreeMap<Band, Array2<f64>>,
    lst: &LstConstants,
) -> Result<Array2<f64>> {
    let get = |band: Band| {
        bands
            .get(&band)
            .ok_or_else(|| Error::Index(format!("{} requires band {}", index, band)))
    };
    let required = index
        .required_bands()
        .iter()
        .map(|b| get(*b))
        .collect::<Result<Vec<_>>>()?;
    let shape = required[0].dim();
    if let Some(other) = required.iter().find(|a| a.dim() != shape) {
        return Err(Error::Index(format!(
            "{} inputs differ in shape: {:?} vs {:?}",
            index,
            shape,
            other.dim()
        )));
    }

    let out = match index {
        SpectralIndex::Ndvi => ops::normalized_diff(get(Band::B5)?, get(Band::B4)?),
        SpectralIndex::Ndwi => ops::normalized_diff(get(Band::B3)?, get(Band::B5)?),
        SpectralIndex::Ndsi => ops::normalized_diff(get(Band::B3)?, get(Band::B6)?),
        SpectralIndex::Bsi => ops::bare_soil(
            get(Band::B2)?,
            get(Band::B4)?,
            get(Band::B5)?,
            get(Band::B6)?,
        ),
        SpectralIndex::Lst => ops::land_surface_temperature(get(Band::B10)?, lst),
    };
    Ok(out)
}

pub struct IndexCalculator {
    output_dir: PathBuf,
    nodata: f64,
    lst: LstConstants,
    previews: bool,
}

impl IndexCalculator {
    pub fn new(output_dir: &Path, nodata: f64, lst: LstConstants) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            nodata,
            lst,
            previews: true,
        }
    }

    pub fn without_previews(mut self) -> Self {
        self.previews = false;
        self
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join("indices_log.json")
    }

    /// Read clips as f64 arrays with both the pipeline sentinel and any
    /// file nodata turned into NaN. The georeference of the first band is kept.
    pub fn load_stack(&self, clips: &BTreeMap<Band, PathBuf>, bands: &[Band]) -> Result<BandStack> {
        let mut arrays = BTreeMap::new();
        let mut georef = None;
        for band in bands {
            let path = clips
                .get(band)
                .ok_or_else(|| Error::Index(format!("no clip for band {}", band)))?;
            let reader = RasterReader::open(path)?;
            let mut data = ops::mask_nodata(&reader.read_band(1)?, self.nodata);
            if let Some(file_nodata) = reader.info.nodata.filter(|v| *v != self.nodata) {
                data = ops::mask_nodata(&data, file_nodata);
            }
            if georef.is_none() {
                georef = Some(GeoReference {
                    geotransform: reader.info.geotransform,
                    projection: reader.info.projection.clone(),
                    nodata: Some(INDEX_NODATA),
                });
            }
            arrays.insert(*band, data);
        }
        let georef = georef.ok_or_else(|| Error::Index("no bands to load".into()))?;
        Ok(BandStack { arrays, georef })
    }

    fn export(&self, index: SpectralIndex, data: &Array2<f64>, stack: &BandStack, clips: &BTreeMap<Band, PathBuf>) -> Result<IndexExport> {
        fs::create_dir_all(&self.output_dir)?;
        let raster_path = self.output_dir.join(format!("{}.tif", index.name()));
        let mut ds = write_geotiff_as(&raster_path, data, SampleType::F32, &stack.georef)?;
        let sources: Vec<&Path> = index
            .required_bands()
            .iter()
            .filter_map(|b| clips.get(b).map(PathBuf::as_path))
            .collect();
        embed_metadata(&mut ds, &provenance_items("index", index.name(), &sources))?;

        let preview_path = if self.previews {
            let png = raster_path.with_extension("png");
            write_preview_png(&png, data, Palette::for_index(index), index.display_range())
                .map_err(Error::external)?;
            write_world_file(&png, stack.georef.geotransform)?;
            if !stack.georef.projection.is_empty() {
                write_prj_file(&png, &stack.georef.projection)?;
            }
            Some(png)
        } else {
            None
        };

        Ok(IndexExport {
            raster_path,
            preview_path,
            stats: ops::finite_stats(data),
        })
    }

    fn run_one(&self, index: SpectralIndex, clips: &BTreeMap<Band, PathBuf>) -> Result<IndexExport> {
        let stack = self.load_stack(clips, index.required_bands())?;
        let data = compute_index(index, &stack.arrays, &self.lst)?;
        self.export(index, &data, &stack, clips)
    }

    /// Compute every requested index from `clips` and write `indices_log.json`
    pub fn run(&self, clips: &BTreeMap<Band, PathBuf>, indices: &[SpectralIndex]) -> Result<IndexReport> {
        let available: Vec<Band> = clips.keys().copied().collect();
        let mut report = IndexReport::default();
        for &index in indices {
            let missing = missing_bands(index, &available);
            let outcome = if !missing.is_empty() {
                warn!("{} unavailable, missing bands {:?}", index, missing);
                IndexOutcome::Unavailable { missing }
            } else {
                match self.run_one(index, clips) {
                    Ok(export) => {
                        info!("Computed {}: {:?}", index, export.raster_path);
                        IndexOutcome::Computed(export)
                    }
                    Err(e) => {
                        warn!("{} failed: {}", index, e);
                        IndexOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                }
            };
            report.outcomes.insert(index, outcome);
        }
        write_json_log(&self.log_path(), &report)?;
        Ok(report)
    }
}
