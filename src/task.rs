//! What a task asks for, and what the service says about it.

use std::fmt;

use chrono::Local;
use serde::Serialize;
use serde_json::{Value, json};

use crate::catalog::Catalog;
use crate::dates::{DateRange, WireDates};
use crate::error::ValidationError;

/// A (product, band) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct Layer {
    pub product: String,
    pub layer: String,
}

impl Layer {
    pub fn new(product: impl Into<String>, layer: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            layer: layer.into(),
        }
    }
}

/// Resolves `band_names` of `product_id` into layers, keeping only the
/// bands the product declares.
pub fn resolve_layers<S: AsRef<str>>(
    catalog: &Catalog,
    product_id: &str,
    band_names: &[S],
) -> Result<Vec<Layer>, ValidationError> {
    if band_names.is_empty() {
        return Err(ValidationError::EmptyLayers);
    }
    let product = catalog.resolve(product_id)?;
    let bands = Catalog::validate_bands(product, band_names)?;
    Ok(bands
        .into_iter()
        .map(|b| Layer::new(&product.id, &b.name))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    GeoTiff,
    NetCdf4,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::GeoTiff => "geotiff",
            OutputFormat::NetCdf4 => "netcdf4",
        }
    }

    /// Extension of the raster files the format produces.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::GeoTiff => "tif",
            OutputFormat::NetCdf4 => "nc",
        }
    }
}

pub const DEFAULT_PROJECTION: &str = "geographic";

/// Area of interest as a GeoJSON `FeatureCollection`.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaGeometry(Value);

impl AreaGeometry {
    /// Accepts a `FeatureCollection`, a `Feature`, or a bare `Polygon` /
    /// `MultiPolygon`; the latter two are wrapped into a collection.
    pub fn from_geojson(value: Value) -> Result<Self, ValidationError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::InvalidGeometry("missing `type`".into()))?;

        match kind {
            "FeatureCollection" => {
                let features = value
                    .get("features")
                    .and_then(Value::as_array)
                    .ok_or_else(|| ValidationError::InvalidGeometry("missing `features`".into()))?;
                if features.is_empty() {
                    return Err(ValidationError::InvalidGeometry(
                        "feature collection is empty".into(),
                    ));
                }
                for feature in features {
                    check_feature(feature)?;
                }
                Ok(Self(value))
            }
            "Feature" => {
                check_feature(&value)?;
                Ok(Self(json!({"type": "FeatureCollection", "features": [value]})))
            }
            "Polygon" | "MultiPolygon" => {
                check_polygon(&value)?;
                Ok(Self(json!({
                    "type": "FeatureCollection",
                    "features": [{"type": "Feature", "properties": {}, "geometry": value}],
                })))
            }
            other => Err(ValidationError::InvalidGeometry(format!(
                "unsupported GeoJSON type `{other}`"
            ))),
        }
    }

    pub fn as_geojson(&self) -> &Value {
        &self.0
    }
}

fn check_feature(feature: &Value) -> Result<(), ValidationError> {
    let geometry = feature
        .get("geometry")
        .ok_or_else(|| ValidationError::InvalidGeometry("feature without geometry".into()))?;
    check_polygon(geometry)
}

fn check_polygon(geometry: &Value) -> Result<(), ValidationError> {
    match geometry.get("type").and_then(Value::as_str) {
        Some("Polygon") | Some("MultiPolygon") => {}
        Some(other) => {
            return Err(ValidationError::InvalidGeometry(format!(
                "only polygons are supported, got `{other}`"
            )));
        }
        None => return Err(ValidationError::InvalidGeometry("geometry without `type`".into())),
    }
    match geometry.get("coordinates").and_then(Value::as_array) {
        Some(rings) if !rings.is_empty() => Ok(()),
        _ => Err(ValidationError::InvalidGeometry("polygon without coordinates".into())),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointTask {
    pub latitude: f64,
    pub longitude: f64,
    pub dates: DateRange,
    pub layers: Vec<Layer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AreaTask {
    pub geometry: AreaGeometry,
    pub dates: DateRange,
    pub layers: Vec<Layer>,
    pub projection: String,
    pub format: OutputFormat,
}

/// A validated extraction request.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskSpec {
    Point(PointTask),
    Area(AreaTask),
}

impl TaskSpec {
    pub fn point(
        latitude: f64,
        longitude: f64,
        dates: DateRange,
        layers: Vec<Layer>,
    ) -> Result<Self, ValidationError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::LongitudeOutOfRange(longitude));
        }
        if layers.is_empty() {
            return Err(ValidationError::EmptyLayers);
        }
        Ok(TaskSpec::Point(PointTask {
            latitude,
            longitude,
            dates,
            layers,
        }))
    }

    pub fn area(
        geometry: AreaGeometry,
        dates: DateRange,
        layers: Vec<Layer>,
        projection: impl Into<String>,
        format: OutputFormat,
    ) -> Result<Self, ValidationError> {
        if layers.is_empty() {
            return Err(ValidationError::EmptyLayers);
        }
        Ok(TaskSpec::Area(AreaTask {
            geometry,
            dates,
            layers,
            projection: projection.into(),
            format,
        }))
    }

    pub fn layers(&self) -> &[Layer] {
        match self {
            TaskSpec::Point(p) => &p.layers,
            TaskSpec::Area(a) => &a.layers,
        }
    }

    pub fn dates(&self) -> DateRange {
        match self {
            TaskSpec::Point(p) => p.dates,
            TaskSpec::Area(a) => a.dates,
        }
    }

    pub fn task_type(&self) -> &'static str {
        match self {
            TaskSpec::Point(_) => "point",
            TaskSpec::Area(_) => "area",
        }
    }

    pub fn format(&self) -> OutputFormat {
        match self {
            TaskSpec::Point(_) => OutputFormat::GeoTiff,
            TaskSpec::Area(a) => a.format,
        }
    }

    /// Checks that every layer names a band of its product.
    pub fn validate(&self, catalog: &Catalog) -> Result<(), ValidationError> {
        let layers = self.layers();
        if layers.is_empty() {
            return Err(ValidationError::EmptyLayers);
        }
        for layer in layers {
            let product = catalog.resolve(&layer.product)?;
            if product.band(&layer.layer).is_none() {
                return Err(ValidationError::NoValidBands {
                    product: product.id.clone(),
                    requested: vec![layer.layer.clone()],
                });
            }
        }
        Ok(())
    }

    /// Default name, stamped with the local time.
    pub fn default_name(&self) -> String {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        match self {
            TaskSpec::Point(p) => {
                let product = p.layers.first().map(|l| l.product.as_str()).unwrap_or("point");
                format!("{product} {stamp}")
            }
            TaskSpec::Area(_) => format!("Area_Task {stamp}"),
        }
    }

    /// JSON body for the submission endpoint.
    pub fn request_body(&self, task_name: &str) -> Value {
        let params = match self {
            TaskSpec::Point(p) => TaskParams {
                coordinates: Some(vec![Coordinate {
                    latitude: p.latitude,
                    longitude: p.longitude,
                }]),
                geo: None,
                dates: vec![p.dates.to_wire()],
                layers: &p.layers,
                output: Output {
                    format: Format {
                        kind: OutputFormat::GeoTiff.as_str(),
                    },
                    projection: DEFAULT_PROJECTION,
                },
            },
            TaskSpec::Area(a) => TaskParams {
                coordinates: None,
                geo: Some(a.geometry.as_geojson()),
                dates: vec![a.dates.to_wire()],
                layers: &a.layers,
                output: Output {
                    format: Format {
                        kind: a.format.as_str(),
                    },
                    projection: &a.projection,
                },
            },
        };

        json!({
            "task_type": self.task_type(),
            "task_name": task_name,
            "params": params,
        })
    }
}

#[derive(Serialize)]
struct TaskParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    coordinates: Option<Vec<Coordinate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    geo: Option<&'a Value>,
    dates: Vec<WireDates>,
    layers: &'a [Layer],
    output: Output<'a>,
}

#[derive(Serialize)]
struct Coordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Serialize)]
struct Output<'a> {
    format: Format<'a>,
    projection: &'a str,
}

#[derive(Serialize)]
struct Format<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

/// Identifier the service assigned to a submitted task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle(String);

impl TaskHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Queued,
    Processing { progress: Option<u8> },
    Done,
    Error { status: String },
    /// Anything else the service reports; treated as still running.
    Other(String),
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error { .. })
    }

    pub fn progress(&self) -> Option<u8> {
        match self {
            TaskStatus::Processing { progress } => *progress,
            TaskStatus::Done => Some(100),
            _ => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing { .. } => "processing",
            TaskStatus::Done => "done",
            TaskStatus::Error { status } => status,
            TaskStatus::Other(s) => s,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.progress() {
            Some(p) if matches!(self, TaskStatus::Processing { .. }) => {
                write!(f, "processing ({p}%)")
            }
            _ => f.write_str(self.label()),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct StatusReply {
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) progress: Option<ProgressReply>,
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct ProgressReply {
    #[serde(default)]
    pub(crate) summary: Option<f64>,
}

impl From<StatusReply> for TaskStatus {
    fn from(reply: StatusReply) -> Self {
        match reply.status.as_str() {
            "done" => TaskStatus::Done,
            "error" | "failed" => TaskStatus::Error {
                status: reply.status,
            },
            "queued" | "pending" => TaskStatus::Queued,
            "processing" => TaskStatus::Processing {
                progress: reply
                    .progress
                    .and_then(|p| p.summary)
                    .filter(|v| v.is_finite())
                    .map(|v| v.clamp(0.0, 100.0).round() as u8),
            },
            _ => TaskStatus::Other(reply.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn january() -> DateRange {
        DateRange::parse("01-01-2023", "01-31-2023").unwrap()
    }

    fn polygon() -> Value {
        json!({
            "type": "Polygon",
            "coordinates": [[[-74.1, 40.6], [-73.9, 40.6], [-73.9, 40.8], [-74.1, 40.6]]]
        })
    }

    #[test]
    fn resolve_layers_validates_against_catalog() {
        let catalog = Catalog::builtin();
        let layers = resolve_layers(catalog, "MOD11A1.061", &["LST_Day_1km", "nope"]).unwrap();
        assert_eq!(layers, vec![Layer::new("MOD11A1.061", "LST_Day_1km")]);

        let empty: [&str; 0] = [];
        assert_eq!(
            resolve_layers(catalog, "MOD11A1.061", &empty),
            Err(ValidationError::EmptyLayers)
        );
        assert_eq!(
            resolve_layers(catalog, "NOPE.001", &["x"]),
            Err(ValidationError::UnknownProduct("NOPE.001".into()))
        );
    }

    #[test]
    fn point_rejects_out_of_range_coordinates() {
        let layers = vec![Layer::new("MOD11A1.061", "LST_Day_1km")];
        assert_eq!(
            TaskSpec::point(90.5, 0.0, january(), layers.clone()),
            Err(ValidationError::LatitudeOutOfRange(90.5))
        );
        assert_eq!(
            TaskSpec::point(0.0, -180.01, january(), layers.clone()),
            Err(ValidationError::LongitudeOutOfRange(-180.01))
        );
        assert!(TaskSpec::point(f64::NAN, 0.0, january(), layers).is_err());
        assert_eq!(
            TaskSpec::point(0.0, 0.0, january(), Vec::new()),
            Err(ValidationError::EmptyLayers)
        );
    }

    #[test]
    fn point_body_matches_wire_contract() {
        let spec = TaskSpec::point(
            40.7128,
            -74.0060,
            january(),
            vec![Layer::new("MOD11A1.061", "LST_Day_1km")],
        )
        .unwrap();
        let body = spec.request_body("nyc");
        assert_eq!(
            body,
            json!({
                "task_type": "point",
                "task_name": "nyc",
                "params": {
                    "coordinates": [{"latitude": 40.7128, "longitude": -74.0060}],
                    "dates": [{"startDate": "01-01-2023", "endDate": "01-31-2023", "recurring": false}],
                    "layers": [{"product": "MOD11A1.061", "layer": "LST_Day_1km"}],
                    "output": {"format": {"type": "geotiff"}, "projection": "geographic"}
                }
            })
        );
    }

    #[test]
    fn area_body_wraps_bare_polygon() {
        let geometry = AreaGeometry::from_geojson(polygon()).unwrap();
        let spec = TaskSpec::area(
            geometry,
            january(),
            vec![Layer::new("MOD13Q1.061", "_250m_16_days_NDVI")],
            "sinu_modis",
            OutputFormat::NetCdf4,
        )
        .unwrap();
        let body = spec.request_body("area");
        assert_eq!(body["task_type"], "area");
        assert!(body["params"].get("coordinates").is_none());
        assert_eq!(body["params"]["geo"]["type"], "FeatureCollection");
        assert_eq!(body["params"]["geo"]["features"][0]["geometry"], polygon());
        assert_eq!(body["params"]["output"]["format"]["type"], "netcdf4");
        assert_eq!(body["params"]["output"]["projection"], "sinu_modis");
    }

    #[test]
    fn geometry_rejects_non_polygons() {
        let point = json!({"type": "Point", "coordinates": [0.0, 0.0]});
        assert!(AreaGeometry::from_geojson(point).is_err());
        assert!(AreaGeometry::from_geojson(json!({"type": "FeatureCollection", "features": []})).is_err());
        assert!(AreaGeometry::from_geojson(json!({"coordinates": []})).is_err());
        let feature = json!({"type": "Feature", "properties": {}, "geometry": polygon()});
        let wrapped = AreaGeometry::from_geojson(feature.clone()).unwrap();
        assert_eq!(wrapped.as_geojson()["features"][0], feature);
    }

    #[test]
    fn validate_checks_every_layer() {
        let catalog = Catalog::builtin();
        let spec = TaskSpec::point(
            1.0,
            1.0,
            january(),
            vec![
                Layer::new("MOD11A1.061", "LST_Day_1km"),
                Layer::new("MOD11A1.061", "sur_refl_b01"),
            ],
        )
        .unwrap();
        assert!(matches!(
            spec.validate(catalog),
            Err(ValidationError::NoValidBands { .. })
        ));
    }

    #[test]
    fn status_reply_mapping() {
        let parse = |v: Value| TaskStatus::from(serde_json::from_value::<StatusReply>(v).unwrap());
        assert_eq!(parse(json!({"status": "done"})), TaskStatus::Done);
        assert_eq!(parse(json!({"status": "pending"})), TaskStatus::Queued);
        assert_eq!(
            parse(json!({"status": "failed"})),
            TaskStatus::Error { status: "failed".into() }
        );
        assert_eq!(
            parse(json!({"status": "processing", "progress": {"summary": 42.4}})),
            TaskStatus::Processing { progress: Some(42) }
        );
        assert_eq!(
            parse(json!({"status": "processing", "progress": {"summary": 250}})),
            TaskStatus::Processing { progress: Some(100) }
        );
        assert_eq!(
            parse(json!({"status": "processing"})),
            TaskStatus::Processing { progress: None }
        );
        assert_eq!(parse(json!({"status": "paused"})), TaskStatus::Other("paused".into()));
        assert!(!TaskStatus::Other("paused".into()).is_terminal());
    }

    #[test]
    fn status_display() {
        assert_eq!(
            TaskStatus::Processing { progress: Some(7) }.to_string(),
            "processing (7%)"
        );
        assert_eq!(TaskStatus::Done.to_string(), "done");
    }
}
