//! Decoding of produced raster files into per-pixel records.
//!
//! Output names look like `MOD11A1.061_LST_Day_1km_doy2023001_aid0001.tif`:
//! product, layer, acquisition year + day of year, area id. Pixel values
//! themselves come from a [`RasterSource`], so any GeoTIFF reader can be
//! plugged in.

use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex_lite::Regex;

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<product>[^_]+)_(?P<layer>.+)_doy(?P<year>\d{4})(?P<doy>\d{3})(?:_aid(?P<aid>\d+))?")
        .expect("raster name pattern is valid")
});

static BAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|_)B(\d+)(?:_|$)").expect("band pattern is valid"));

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RasterError {
    #[error("cannot decode layer and date from file name `{0}`")]
    UndecodableName(String),

    #[error("raster holds {actual} value(s), expected {width}x{height}")]
    ShapeMismatch {
        width: usize,
        height: usize,
        actual: usize,
    },
}

/// What a raster file name says about its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterName {
    pub product: String,
    pub layer: String,
    /// Numeric band, for layers named like `B04`.
    pub band: Option<u32>,
    pub date: NaiveDate,
    pub area_id: Option<u32>,
}

impl RasterName {
    /// Decodes the final path component of `file_name`.
    pub fn parse(file_name: &str) -> Option<Self> {
        let base = Path::new(file_name).file_name()?.to_str()?;
        let caps = NAME_RE.captures(base)?;

        let year: i32 = caps.name("year")?.as_str().parse().ok()?;
        let doy: u32 = caps.name("doy")?.as_str().parse().ok()?;
        let date = NaiveDate::from_yo_opt(year, doy)?;

        let layer = caps.name("layer")?.as_str().to_string();
        let band = BAND_RE
            .captures(&layer)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());

        Some(Self {
            product: caps.name("product")?.as_str().to_string(),
            layer,
            band,
            date,
            area_id: caps.name("aid").and_then(|m| m.as_str().parse().ok()),
        })
    }
}

/// GDAL-style affine transform:
/// `x = c[0] + col*c[1] + row*c[2]`, `y = c[3] + col*c[4] + row*c[5]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// North-up grid with square-ish pixels anchored at the upper-left corner.
    pub fn north_up(origin_lon: f64, origin_lat: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self([origin_lon, pixel_width, 0.0, origin_lat, 0.0, -pixel_height.abs()])
    }

    /// Longitude/latitude of the centre of pixel (`row`, `col`).
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let c = &self.0;
        let x = col as f64 + 0.5;
        let y = row as f64 + 0.5;
        (c[0] + x * c[1] + y * c[2], c[3] + x * c[4] + y * c[5])
    }
}

pub trait RasterSource {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn transform(&self) -> GeoTransform;
    /// Value of the first band at (`row`, `col`).
    fn value(&self, row: usize, col: usize) -> f64;
}

/// Row-major in-memory raster.
#[derive(Debug, Clone, PartialEq)]
pub struct GridRaster {
    width: usize,
    height: usize,
    transform: GeoTransform,
    values: Vec<f64>,
}

impl GridRaster {
    pub fn new(
        width: usize,
        height: usize,
        transform: GeoTransform,
        values: Vec<f64>,
    ) -> Result<Self, RasterError> {
        if width.checked_mul(height) != Some(values.len()) {
            return Err(RasterError::ShapeMismatch {
                width,
                height,
                actual: values.len(),
            });
        }
        Ok(Self {
            width,
            height,
            transform,
            values,
        })
    }
}

impl RasterSource for GridRaster {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn transform(&self) -> GeoTransform {
        self.transform
    }

    fn value(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.width + col]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PixelRecord {
    pub layer: String,
    pub band: Option<u32>,
    pub date: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    pub value: f64,
}

/// One record per pixel, row by row.
pub fn extract_pixels(
    file_name: &str,
    source: &dyn RasterSource,
) -> Result<Vec<PixelRecord>, RasterError> {
    let name = RasterName::parse(file_name)
        .ok_or_else(|| RasterError::UndecodableName(file_name.to_string()))?;
    log::debug!(
        "extracting {} ({} on {}), {}x{} pixels",
        file_name,
        name.layer,
        name.date,
        source.width(),
        source.height()
    );

    let transform = source.transform();
    let mut records = Vec::with_capacity(source.width() * source.height());
    for row in 0..source.height() {
        for col in 0..source.width() {
            let (longitude, latitude) = transform.pixel_center(row, col);
            records.push(PixelRecord {
                layer: name.layer.clone(),
                band: name.band,
                date: name.date,
                latitude,
                longitude,
                value: source.value(row, col),
            });
        }
    }
    Ok(records)
}
