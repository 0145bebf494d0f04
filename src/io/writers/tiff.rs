use gdal::raster::{Buffer, GdalType, RasterCreationOptions};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::Array2;
use std::path::Path;

use crate::io::gdal::{GdalError, SampleType};

/// Georeferencing carried from a source raster to a derived one
#[derive(Debug, Clone, PartialEq)]
pub struct GeoReference {
    pub geotransform: [f64; 6],
    /// WKT or `EPSG:xxxx`; empty leaves the output unreferenced
    pub projection: String,
    pub nodata: Option<f64>,
}

/// DEFLATE-compressed tiled GeoTIFF options; horizontal predictor for integer data
pub fn compressed_options(sample: SampleType) -> Result<RasterCreationOptions, GdalError> {
    let mut options = RasterCreationOptions::new();
    options.set_name_value("COMPRESS", "DEFLATE")?;
    options.set_name_value("TILED", "YES")?;
    if sample.is_integer() {
        options.set_name_value("PREDICTOR", "2")?;
    }
    Ok(options)
}

fn write_band<T: GdalType + Copy>(
    output: &Path,
    cols: usize,
    rows: usize,
    data: Vec<T>,
    sample: SampleType,
    georef: &GeoReference,
) -> Result<Dataset, GdalError> {
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let options = compressed_options(sample)?;
    let mut ds =
        driver.create_with_band_type_with_options::<T, _>(output, cols, rows, 1, &options)?;
    ds.set_geo_transform(&georef.geotransform)?;
    if !georef.projection.is_empty() {
        let srs = SpatialRef::from_definition(&georef.projection)?;
        ds.set_spatial_ref(&srs)?;
    }
    {
        let mut band = ds.rasterband(1)?;
        if let Some(nodata) = georef.nodata {
            band.set_no_data_value(Some(nodata))?;
        }
        let mut buf = Buffer::new((cols, rows), data);
        band.write((0, 0), (cols, rows), &mut buf)?;
    }
    Ok(ds)
}

/// Write a single-band georeferenced GeoTIFF, casting `data` to `sample`.
/// NaN cells are written as the nodata value when one is set.
pub fn write_geotiff_as(
    output: &Path,
    data: &Array2<f64>,
    sample: SampleType,
    georef: &GeoReference,
) -> Result<Dataset, GdalError> {
    let (rows, cols) = data.dim();
    let fill = georef.nodata.unwrap_or(0.0);
    let values = data.iter().map(|v| if v.is_nan() { fill } else { *v });
    match sample {
        SampleType::U8 => write_band(output, cols, rows, values.map(|v| v as u8).collect(), sample, georef),
        SampleType::U16 => write_band(output, cols, rows, values.map(|v| v as u16).collect(), sample, georef),
        SampleType::I16 => write_band(output, cols, rows, values.map(|v| v as i16).collect(), sample, georef),
        SampleType::U32 => write_band(output, cols, rows, values.map(|v| v as u32).collect(), sample, georef),
        SampleType::I32 => write_band(output, cols, rows, values.map(|v| v as i32).collect(), sample, georef),
        SampleType::F32 => write_band(output, cols, rows, values.map(|v| v as f32).collect(), sample, georef),
        SampleType::F64 => write_band(output, cols, rows, values.collect(), sample, georef),
    }
}

/// Tag a written dataset with key/value provenance in the default domain
pub fn embed_metadata(ds: &mut Dataset, items: &[(&str, String)]) -> Result<(), GdalError> {
    for (key, value) in items {
        ds.set_metadata_item(key, value, "")?;
    }
    Ok(())
}
