#![doc = r#"
LANDSATPRO: cloud-minimized Landsat composites and spectral indices for an area of interest.

This crate searches a STAC catalog for Landsat Collection 2 Level-2 scenes over an AOI,
selects the least cloudy scene per WRS-2 cell within an acquisition window, downloads the
bands the requested indices need, mosaics each band with cloud-priority overlap, clips it
to the AOI and exports NDVI, NDWI, NDSI, BSI and LST rasters with previews and statistics.
It powers the landsatpro CLI and can be embedded in your own Rust applications.

Requirements
------------
- GDAL development headers and runtime available on your system.
- `gdalbuildvrt` and `gdal_translate` on `PATH` for the mosaic fallback (optional).
- Rust 2024 edition toolchain.

Quick start: run the whole pipeline
-----------------------------------
```rust,no_run
use std::path::Path;
use landsatpro::{PipelineParams, PipelineRun, Services, Session, SessionConfig, SpectralIndex, Workspace};

fn main() -> landsatpro::Result<()> {
    let params = PipelineParams {
        indices: vec![SpectralIndex::Ndvi, SpectralIndex::Lst],
        aoi_path: Some("/data/aoi.geojson".into()),
        ..PipelineParams::default()
    };
    let session = Session::anonymous(SessionConfig::from(&params))?;
    let run = PipelineRun::new(
        Workspace::new(Path::new("/work")),
        params,
        Services::from_session(&session),
    );
    let report = landsatpro::run_pipeline(&run)?;
    for (index, export) in report.indices.computed() {
        println!("{index}: {:?}", export.stats);
    }
    Ok(())
}
```

Individual stages
-----------------
Each stage is usable on its own, for example mosaicking band files you already have and
clipping the result:

```rust,no_run
use std::path::Path;
use landsatpro::core::clip::ClipEngine;
use landsatpro::core::download::scan_downloads;
use landsatpro::core::mosaic::MosaicBuilder;
use landsatpro::io::load_aoi;
use landsatpro::types::Band;

fn main() -> landsatpro::Result<()> {
    let files = scan_downloads(Path::new("/work/temp/downloads"))?;
    let mosaic = MosaicBuilder::new(Path::new("/work/mosaic")).build(Band::B4, &files)?;
    let aoi = load_aoi(Path::new("/data/aoi.geojson"))?;
    let clip = ClipEngine::new(Path::new("/work/clip"), 0.0).clip(Band::B4, &mosaic.output_path, &aoi)?;
    println!("{} valid pixels in {:?}", clip.valid_pixels, clip.clipped_path);
    Ok(())
}
```

Error handling
--------------
All public functions return `landsatpro::Result<T>`; match on `landsatpro::Error` to handle
specific cases. Per-band failures never surface as errors; they are listed in the run report.

```rust,no_run
use landsatpro::{Error, PipelineRun, run_pipeline};

fn report(run: &PipelineRun) {
    match run_pipeline(run) {
        Ok(r) if r.is_partial() => eprintln!("partial: {:?}", r.log.missing_bands),
        Ok(_) => {}
        Err(Error::AoiNotFound(dir)) => eprintln!("put an AOI file into {dir:?}"),
        Err(Error::NoBandsProcessed) => eprintln!("nothing could be mosaicked"),
        Err(other) => eprintln!("error: {other}"),
    }
}
```

Useful modules
--------------
- [`api`]: workspace layout and the end-to-end run.
- [`core`]: pipeline stages: query, coverage, bands, resolver, download, mosaic, clip, indices.
- [`io`]: catalog client, provider session, AOI readers, GDAL helpers and writers.
- [`types`]: bands, collections, platforms and spectral indices.
- [`error`]: crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

// Curated public API surface
// Types
pub use crate::core::model::{AreaOfInterest, BandMosaic, ClipResult, Crs, DownloadedBandFile, IndexStats, SceneFeature};
pub use crate::core::params::{DateRange, GridCell, PipelineParams};
pub use crate::core::progress::{CancelToken, ProgressEvent, ProgressSink, Stage};
pub use error::{Error, Result};
pub use types::{Band, Collection, Platform, SpectralIndex, WindowPolicy};

// Transport
pub use io::{Credentials, Session, SessionConfig};

// High-level API re-exports
pub use api::{
    PipelineRun, ProcessingLog, RunReport, Services, Workspace, load_params, run_pipeline,
    run_with_comparative,
};
