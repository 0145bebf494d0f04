//! Clip per-band mosaics to the AOI.
//!
//! The AOI is brought into the mosaic's CRS, the raster window covering its
//! bounding box is read, and every pixel the geometry touches is kept
//! (all-touched rule). Pixels outside the geometry take the nodata sentinel.
//! When the AOI misses the mosaic entirely the clip degrades to the mosaic's
//! own extent instead of failing.
use std::fs;
use std::path::{Path, PathBuf};

use geo::{BoundingRect, Intersects, MultiPolygon, Rect};
use ndarray::{Array2, Zip};
use tracing::{info, warn};

use crate::core::model::{AreaOfInterest, ClipResult};
use crate::error::{Error, Result};
use crate::io::gdal::{RasterReader, reproject_geometry};
use crate::io::writers::metadata::provenance_items;
use crate::io::writers::tiff::{GeoReference, embed_metadata, write_geotiff_as};
use crate::types::Band;

// Keeps pixels that merely share an edge with the geometry out of the mask
const EDGE_EPSILON: f64 = 1e-9;

/// Pixel window `(col, row, cols, rows)` covering `rect`, clamped to the raster
fn pixel_window(gt: &[f64; 6], size: (usize, usize), rect: &Rect<f64>) -> Option<(usize, usize, usize, usize)> {
    let to_col = |x: f64| (x - gt[0]) / gt[1];
    let to_row = |y: f64| (y - gt[3]) / gt[5];
    let (c_a, c_b) = (to_col(rect.min().x), to_col(rect.max().x));
    let (r_a, r_b) = (to_row(rect.min().y), to_row(rect.max().y));
    let clamp = |v: f64, max: usize| v.max(0.0).min(max as f64) as usize;
    let col0 = clamp(c_a.min(c_b).floor(), size.0);
    let col1 = clamp(c_a.max(c_b).ceil(), size.0);
    let row0 = clamp(r_a.min(r_b).floor(), size.1);
    let row1 = clamp(r_a.max(r_b).ceil(), size.1);
    if col1 <= col0 || row1 <= row0 {
        return None;
    }
    Some((col0, row0, col1 - col0, row1 - row0))
}

/// All-touched mask for a window whose top-left pixel sits at `origin`
fn touched_mask(geometry: &MultiPolygon<f64>, gt: &[f64; 6], origin: (usize, usize), shape: (usize, usize)) -> Array2<bool> {
    let mut mask = Array2::from_elem(shape, false);
    Zip::indexed(&mut mask).par_for_each(|(r, c), keep| {
        let x0 = gt[0] + (origin.0 + c) as f64 * gt[1];
        let y0 = gt[3] + (origin.1 + r) as f64 * gt[5];
        let x1 = x0 + gt[1];
        let y1 = y0 + gt[5];
        let dx = (x1 - x0).abs() * EDGE_EPSILON;
        let dy = (y1 - y0).abs() * EDGE_EPSILON;
        let pixel = Rect::new(
            (x0.min(x1) + dx, y0.min(y1) + dy),
            (x0.max(x1) - dx, y0.max(y1) - dy),
        );
        *keep = geometry.intersects(&pixel);
    });
    mask
}

pub struct ClipEngine {
    output_dir: PathBuf,
    nodata: f64,
}

impl ClipEngine {
    pub fn new(output_dir: &Path, nodata: f64) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            nodata,
        }
    }

    pub fn output_path(&self, band: Band) -> PathBuf {
        self.output_dir.join(format!("clip_{}.tif", band))
    }

    pub fn clip(&self, band: Band, mosaic: &Path, aoi: &AreaOfInterest) -> Result<ClipResult> {
        self.clip_inner(band, mosaic, aoi).map_err(|e| match e {
            Error::Clip { .. } => e,
            other => Error::Clip {
                band,
                reason: other.to_string(),
            },
        })
    }

    fn clip_inner(&self, band: Band, mosaic: &Path, aoi: &AreaOfInterest) -> Result<ClipResult> {
        let reader = RasterReader::open(mosaic)?;
        let raster_crs = reader.crs();
        let bounds = reader.bounds();
        let geometry = reproject_geometry(&aoi.geometry, &aoi.crs, &raster_crs)?;

        let (clip_geometry, degraded) = if geometry.intersects(&bounds) {
            (geometry, false)
        } else {
            warn!(
                "AOI does not intersect the {} mosaic {:?}; clipping to the mosaic extent",
                band, mosaic
            );
            (MultiPolygon::new(vec![bounds.to_polygon()]), true)
        };
        let clip_rect = clip_geometry.bounding_rect().ok_or_else(|| Error::Clip {
            band,
            reason: "empty AOI geometry".into(),
        })?;

        let gt = reader.info.geotransform;
        let size = (reader.info.size_x, reader.info.size_y);
        let (col, row, cols, rows) = pixel_window(&gt, size, &clip_rect).ok_or_else(|| Error::Clip {
            band,
            reason: "clip window is empty".into(),
        })?;

        let mut data = reader.read_window(1, (col, row), (cols, rows))?;
        let mask = if degraded {
            Array2::from_elem((rows, cols), true)
        } else {
            touched_mask(&clip_geometry, &gt, (col, row), (rows, cols))
        };

        // Source nodata inside the AOI is rewritten to the sentinel too
        let source_nodata = reader.info.nodata;
        let mut valid_pixels = 0usize;
        Zip::from(&mut data).and(&mask).for_each(|v, &keep| {
            if !keep || source_nodata == Some(*v) {
                *v = self.nodata;
            } else if *v != self.nodata {
                valid_pixels += 1;
            }
        });

        let sample_type = reader.info.sample_type.widened_for(self.nodata);
        if sample_type != reader.info.sample_type {
            warn!(
                "Nodata {} does not fit {:?}; writing the {} clip as {:?}",
                self.nodata, reader.info.sample_type, band, sample_type
            );
        }

        let mut window_gt = gt;
        window_gt[0] = gt[0] + col as f64 * gt[1] + row as f64 * gt[2];
        window_gt[3] = gt[3] + col as f64 * gt[4] + row as f64 * gt[5];
        let georef = GeoReference {
            geotransform: window_gt,
            projection: reader.info.projection.clone(),
            nodata: Some(self.nodata),
        };

        fs::create_dir_all(&self.output_dir)?;
        let clipped_path = self.output_path(band);
        let mut ds = write_geotiff_as(&clipped_path, &data, sample_type, &georef)?;
        embed_metadata(&mut ds, &provenance_items("clip", &band.code(), &[mosaic]))?;

        info!(
            "Clipped {} to {}x{} pixels ({} valid): {:?}",
            band, cols, rows, valid_pixels, clipped_path
        );
        Ok(ClipResult {
            band,
            clipped_path,
            degraded,
            valid_pixels,
        })
    }
}
