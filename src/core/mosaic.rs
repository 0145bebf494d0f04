//! Per-band mosaicking with cloud-priority overlap resolution.
//!
//! Sources are ordered from least to most cloudy. A virtual raster is built
//! at the finest source resolution and translated to a compressed GeoTIFF.
//! GDAL paints VRT sources in list order, so the list handed to it is the
//! reverse of the priority order: the least cloudy source is painted last.
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use gdal::programs::raster::{BuildVRTOptions, build_vrt};
use gdal::{Dataset, DriverManager};
use tracing::{info, warn};

use crate::core::model::{BandMosaic, DownloadedBandFile, MosaicSource};
use crate::error::{Error, Result};
use crate::io::gdal::{GdalError, SampleType};
use crate::io::writers::metadata::provenance_items;
use crate::io::writers::tiff::{compressed_options, embed_metadata};
use crate::types::Band;

const VRT_ARGS: [&str; 3] = ["-resolution", "highest", "-allow_projection_difference"];

pub struct MosaicBuilder {
    output_dir: PathBuf,
    scratch_dir: PathBuf,
    external_fallback: bool,
}

impl MosaicBuilder {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            scratch_dir: output_dir.join("vrt"),
            external_fallback: true,
        }
    }

    /// Disables the `gdalbuildvrt`/`gdal_translate` fallback
    pub fn without_external_fallback(mut self) -> Self {
        self.external_fallback = false;
        self
    }

    pub fn output_path(&self, band: Band) -> PathBuf {
        self.output_dir.join(format!("mosaic_{}.tif", band))
    }

    /// Stable ascending sort by cloud cover; equal covers keep input order
    pub fn order_sources(files: &[DownloadedBandFile]) -> Vec<MosaicSource> {
        let mut sources: Vec<MosaicSource> = files
            .iter()
            .map(|f| MosaicSource {
                path: f.path.clone(),
                cloud_cover: f.cloud_cover,
            })
            .collect();
        sources.sort_by(|a, b| a.cloud_cover.total_cmp(&b.cloud_cover));
        sources
    }

    pub fn build(&self, band: Band, files: &[DownloadedBandFile]) -> Result<BandMosaic> {
        let files: Vec<DownloadedBandFile> = files
            .iter()
            .filter(|f| {
                let keep = f.band == band;
                if !keep {
                    warn!("Ignoring {:?} in the {} mosaic", f.path, band);
                }
                keep
            })
            .cloned()
            .collect();
        if files.is_empty() {
            return Err(Error::MosaicBuild {
                band,
                reason: "no source files".into(),
            });
        }

        let ordered = Self::order_sources(&files);
        fs::create_dir_all(&self.output_dir)?;
        fs::create_dir_all(&self.scratch_dir)?;
        let vrt_path = self.scratch_dir.join(format!("mosaic_{}.vrt", band));
        let output_path = self.output_path(band);

        let used_fallback = match build_in_process(band, &ordered, &vrt_path, &output_path) {
            Ok(()) => false,
            Err(e) if self.external_fallback => {
                warn!("{} mosaic via GDAL bindings failed ({}), trying external tools", band, e);
                // Input list for gdalbuildvrt, removed when dropped
                let list = tempfile::Builder::new()
                    .prefix(&format!("mosaic_{}_", band))
                    .suffix(".txt")
                    .tempfile_in(&self.scratch_dir)?;
                build_external(&ordered, list.path(), &vrt_path, &output_path).map_err(|e| {
                    Error::MosaicBuild {
                        band,
                        reason: e.to_string(),
                    }
                })?;
                true
            }
            Err(e) => {
                return Err(Error::MosaicBuild {
                    band,
                    reason: e.to_string(),
                });
            }
        };
        let _ = fs::remove_file(&vrt_path);

        if !output_path.exists() {
            return Err(Error::MosaicBuild {
                band,
                reason: format!("{:?} was not produced", output_path),
            });
        }
        info!(
            "Mosaic {} from {} sources: {:?}",
            band,
            ordered.len(),
            output_path
        );
        Ok(BandMosaic {
            band,
            ordered_sources: ordered,
            output_path,
            used_fallback,
        })
    }
}

fn build_in_process(
    band: Band,
    ordered: &[MosaicSource],
    vrt_path: &Path,
    output_path: &Path,
) -> std::result::Result<(), GdalError> {
    let datasets = ordered
        .iter()
        .rev()
        .map(|s| Dataset::open(&s.path))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let options = BuildVRTOptions::new(VRT_ARGS)?;
    let vrt = build_vrt(Some(vrt_path), &datasets, Some(options))?;
    let sample = SampleType::from_gdal(vrt.rasterband(1)?.band_type());
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut out = vrt.create_copy(&driver, output_path, &compressed_options(sample)?)?;
    let sources: Vec<&Path> = ordered.iter().map(|s| s.path.as_path()).collect();
    embed_metadata(&mut out, &provenance_items("mosaic", &band.code(), &sources))?;
    Ok(())
}

fn run_tool(tool: &str, args: &[&std::ffi::OsStr]) -> std::result::Result<(), GdalError> {
    let output = Command::new(tool)
        .args(args)
        .output()
        .map_err(|e| GdalError::ExternalTool {
            tool: tool.to_string(),
            reason: format!("exec error: {}", e),
        })?;
    if !output.status.success() {
        return Err(GdalError::ExternalTool {
            tool: tool.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

fn build_external(
    ordered: &[MosaicSource],
    list_path: &Path,
    vrt_path: &Path,
    output_path: &Path,
) -> std::result::Result<(), GdalError> {
    let listing: Vec<String> = ordered
        .iter()
        .rev()
        .map(|s| s.path.to_string_lossy().into_owned())
        .collect();
    fs::write(list_path, listing.join("\n"))?;

    let mut vrt_args: Vec<&std::ffi::OsStr> = VRT_ARGS.iter().map(|a| a.as_ref()).collect();
    vrt_args.push("-input_file_list".as_ref());
    vrt_args.push(list_path.as_os_str());
    vrt_args.push(vrt_path.as_os_str());
    run_tool("gdalbuildvrt", &vrt_args)?;

    let translate_args: Vec<&std::ffi::OsStr> = vec![
        "-co".as_ref(),
        "COMPRESS=DEFLATE".as_ref(),
        "-co".as_ref(),
        "PREDICTOR=2".as_ref(),
        "-co".as_ref(),
        "TILED=YES".as_ref(),
        vrt_path.as_os_str(),
        output_path.as_os_str(),
    ];
    let result = run_tool("gdal_translate", &translate_args);
    if result.is_err() {
        let _ = fs::remove_file(output_path);
    }
    result
}
