use gdal::errors::GdalError as GdalCrateError;
use gdal::raster::GdalDataType;
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::{Dataset, Metadata};
use geo::{Coord, LineString, MultiPolygon, Polygon, Rect};
use ndarray::Array2;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::core::model::{AreaOfInterest, Crs};

/// Errors encountered when using GDAL readers and writers
#[derive(Debug, Error)]
pub enum GdalError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Dimension mismatch: expected {0}x{1}, got {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),
    #[error("External tool {tool} failed: {reason}")]
    ExternalTool { tool: String, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pixel type of a raster band, preserved from mosaic to clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl SampleType {
    pub fn from_gdal(t: GdalDataType) -> Self {
        match t {
            GdalDataType::UInt8 => SampleType::U8,
            GdalDataType::UInt16 => SampleType::U16,
            GdalDataType::Int16 => SampleType::I16,
            GdalDataType::UInt32 => SampleType::U32,
            GdalDataType::Int32 => SampleType::I32,
            GdalDataType::Float32 => SampleType::F32,
            _ => SampleType::F64,
        }
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, SampleType::F32 | SampleType::F64)
    }

    /// Whether `value` survives a round trip through this sample type
    pub fn can_hold(&self, value: f64) -> bool {
        let range = match self {
            SampleType::U8 => (u8::MIN as f64, u8::MAX as f64),
            SampleType::U16 => (u16::MIN as f64, u16::MAX as f64),
            SampleType::I16 => (i16::MIN as f64, i16::MAX as f64),
            SampleType::U32 => (u32::MIN as f64, u32::MAX as f64),
            SampleType::I32 => (i32::MIN as f64, i32::MAX as f64),
            SampleType::F32 => return value.is_nan() || (value as f32) as f64 == value,
            SampleType::F64 => return true,
        };
        value.fract() == 0.0 && value >= range.0 && value <= range.1
    }

    /// Smallest type holding both this type's values and `value`
    pub fn widened_for(self, value: f64) -> SampleType {
        if self.can_hold(value) {
            return self;
        }
        match self {
            SampleType::U8 | SampleType::U16 | SampleType::I16 if SampleType::I32.can_hold(value) => SampleType::I32,
            _ => SampleType::F64,
        }
    }
}

/// Metadata extracted from a GDAL-supported raster
#[derive(Debug, Clone)]
pub struct RasterInfo {
    /// Width (pixels) of the raster
    pub size_x: usize,
    /// Height (lines) of the raster
    pub size_y: usize,
    /// Number of raster bands
    pub bands: usize,
    /// Affine geotransform coefficients ([origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height])
    pub geotransform: [f64; 6],
    /// Projection in WKT format, empty when unknown
    pub projection: String,
    /// Nodata value of band 1
    pub nodata: Option<f64>,
    /// Pixel type of band 1
    pub sample_type: SampleType,
    /// Additional metadata key-value pairs
    pub metadata: HashMap<String, String>,
}

/// Reader for single-band GeoTIFF-like rasters
pub struct RasterReader {
    pub dataset: Dataset,
    pub info: RasterInfo,
}

// Helper to extract EPSG code from WKT authority tag
fn parse_epsg(wkt: &str) -> Option<String> {
    const KEY: &str = "AUTHORITY[\"EPSG\",\"";
    let idx = wkt.rfind(KEY)?;
    let start = idx + KEY.len();
    let end = wkt[start..].find('"')?;
    Some(format!("EPSG:{}", &wkt[start..start + end]))
}

impl RasterReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GdalError> {
        let dataset = Dataset::open(path.as_ref())?;
        let (size_x, size_y) = dataset.raster_size();
        let bands = dataset.raster_count() as usize;
        if bands == 0 {
            return Err(GdalError::UnsupportedFormat("No raster bands found".into()));
        }
        let geotransform = dataset
            .geo_transform()
            .unwrap_or([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        let projection = dataset.projection();
        let band = dataset.rasterband(1)?;
        let nodata = band.no_data_value();
        let sample_type = SampleType::from_gdal(band.band_type());
        let mut metadata = HashMap::new();
        if let Some(entries) = dataset.metadata_domain("") {
            for entry in entries {
                if let Some((key, val)) = entry.split_once('=') {
                    metadata.insert(key.to_string(), val.to_string());
                }
            }
        }
        Ok(RasterReader {
            dataset,
            info: RasterInfo {
                size_x: size_x as usize,
                size_y: size_y as usize,
                bands,
                geotransform,
                projection,
                nodata,
                sample_type,
                metadata,
            },
        })
    }

    /// CRS of the raster; EPSG codes are preferred over raw WKT
    pub fn crs(&self) -> Crs {
        if let Ok(srs) = self.dataset.spatial_ref() {
            return crs_from_spatial_ref(&srs);
        }
        match parse_epsg(&self.info.projection) {
            Some(code) => Crs::new(code),
            None => Crs::new(self.info.projection.clone()),
        }
    }

    /// Extent in raster CRS units
    pub fn bounds(&self) -> Rect<f64> {
        let gt = self.info.geotransform;
        let x1 = gt[0] + self.info.size_x as f64 * gt[1];
        let y1 = gt[3] + self.info.size_y as f64 * gt[5];
        Rect::new((gt[0], gt[3]), (x1, y1))
    }

    /// Read a single band (1-based index) as an f64 ndarray of shape (height, width)
    pub fn read_band(&self, index: usize) -> Result<Array2<f64>, GdalError> {
        self.read_window(index, (0, 0), (self.info.size_x, self.info.size_y))
    }

    /// Read `size = (cols, rows)` pixels starting at `offset = (col, row)`
    pub fn read_window(
        &self,
        index: usize,
        offset: (usize, usize),
        size: (usize, usize),
    ) -> Result<Array2<f64>, GdalError> {
        if index == 0 || index > self.info.bands {
            return Err(GdalError::UnsupportedFormat(format!(
                "Band index {} out of range",
                index
            )));
        }
        if offset.0 + size.0 > self.info.size_x || offset.1 + size.1 > self.info.size_y {
            return Err(GdalError::DimensionMismatch(
                self.info.size_x,
                self.info.size_y,
                offset.0 + size.0,
                offset.1 + size.1,
            ));
        }
        let band = self.dataset.rasterband(index)?;
        let buf = band.read_as::<f64>(
            (offset.0 as isize, offset.1 as isize),
            size,
            size,
            None,
        )?;
        let data_vec = buf.data().to_vec();
        Array2::from_shape_vec((size.1, size.0), data_vec)
            .map_err(|_| GdalError::DimensionMismatch(size.0, size.1, size.0, size.1))
    }
}

pub fn crs_from_spatial_ref(srs: &SpatialRef) -> Crs {
    match (srs.auth_name(), srs.auth_code()) {
        (Some(name), Ok(code)) => Crs::new(format!("{}:{}", name, code)),
        _ => match srs.to_wkt() {
            Ok(wkt) => parse_epsg(&wkt).map(Crs::new).unwrap_or_else(|| Crs::new(wkt)),
            Err(_) => Crs::new(String::new()),
        },
    }
}

/// Spatial reference with x = easting/longitude axis order
pub fn spatial_ref(crs: &Crs) -> Result<SpatialRef, GdalError> {
    let mut srs = SpatialRef::from_definition(crs.definition())?;
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(srs)
}

pub fn same_crs(a: &Crs, b: &Crs) -> Result<bool, GdalError> {
    if a == b {
        return Ok(true);
    }
    Ok(spatial_ref(a)? == spatial_ref(b)?)
}

fn transform_ring(ring: &LineString<f64>, t: &CoordTransform) -> Result<LineString<f64>, GdalError> {
    let mut xs: Vec<f64> = ring.coords().map(|c| c.x).collect();
    let mut ys: Vec<f64> = ring.coords().map(|c| c.y).collect();
    let mut zs = vec![0.0; xs.len()];
    t.transform_coords(&mut xs, &mut ys, &mut zs)?;
    Ok(LineString::from(
        xs.into_iter()
            .zip(ys)
            .map(|(x, y)| Coord { x, y })
            .collect::<Vec<_>>(),
    ))
}

/// Transforms every vertex of `geometry` from `from` to `to`
pub fn reproject_geometry(
    geometry: &MultiPolygon<f64>,
    from: &Crs,
    to: &Crs,
) -> Result<MultiPolygon<f64>, GdalError> {
    if same_crs(from, to)? {
        return Ok(geometry.clone());
    }
    let transform = CoordTransform::new(&spatial_ref(from)?, &spatial_ref(to)?)?;
    let polygons = geometry
        .iter()
        .map(|p| {
            let exterior = transform_ring(p.exterior(), &transform)?;
            let interiors = p
                .interiors()
                .iter()
                .map(|r| transform_ring(r, &transform))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Polygon::new(exterior, interiors))
        })
        .collect::<Result<Vec<_>, GdalError>>()?;
    Ok(MultiPolygon::new(polygons))
}

pub fn reproject_aoi(aoi: &AreaOfInterest, to: &Crs) -> Result<AreaOfInterest, GdalError> {
    Ok(AreaOfInterest::new(
        reproject_geometry(&aoi.geometry, &aoi.crs, to)?,
        to.clone(),
    ))
}
