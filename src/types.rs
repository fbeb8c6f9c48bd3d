use chrono::{DateTime, NaiveDate, Utc};
use ndarray::Array2;
use num_traits::AsPrimitive;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Error types for ESPA raster-set reading
#[derive(Debug, thiserror::Error)]
pub enum EspaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value '{value}' for field '{field}'")]
    InvalidField { field: String, value: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Duplicate band name: {0}")]
    DuplicateBand(String),
}

/// Result type for ESPA operations
pub type EspaResult<T> = Result<T, EspaError>;

/// A node of the nested metadata tree produced from the XML document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// Empty element
    Null,
    Text(String),
    Map(MetaMap),
    /// Repeated sibling elements
    List(Vec<MetaValue>),
}

impl MetaValue {
    /// Text content of a scalar, or the `#text` of a raw element that also
    /// carried attributes or children.
    pub fn text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s.as_str()),
            MetaValue::Map(m) => match m.get("#text") {
                Some(MetaValue::Text(s)) => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MetaMap> {
        match self {
            MetaValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MetaValue]> {
        match self {
            MetaValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetaValue::Null)
    }

    /// Treat a single value as a one-element sequence; `Null` yields no items.
    pub fn into_list(self) -> Vec<MetaValue> {
        match self {
            MetaValue::List(items) => items,
            MetaValue::Null => Vec::new(),
            other => vec![other],
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Text(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Text(s)
    }
}

impl From<MetaMap> for MetaValue {
    fn from(m: MetaMap) -> Self {
        MetaValue::Map(m)
    }
}

/// Insertion-ordered mapping of metadata keys to values.
///
/// Inserting a key that already exists replaces its value in place, so the
/// document order of the first occurrence is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaMap {
    entries: Vec<(String, MetaValue)>,
}

impl MetaMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut MetaValue> {
        self.entries.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert a value, returning the previous one if the key was present.
    pub fn insert<K: Into<String>, V: Into<MetaValue>>(&mut self, key: K, value: V) -> Option<MetaValue> {
        let key = key.into();
        let value = value.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl FromIterator<(String, MetaValue)> for MetaMap {
    fn from_iter<I: IntoIterator<Item = (String, MetaValue)>>(iter: I) -> Self {
        let mut map = MetaMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl Serialize for MetaMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct MetaMapVisitor;

impl<'de> Visitor<'de> for MetaMapVisitor {
    type Value = MetaMap;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of metadata fields")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<MetaMap, A::Error> {
        let mut map = MetaMap::new();
        while let Some((key, value)) = access.next_entry::<String, MetaValue>()? {
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<'de> Deserialize<'de> for MetaMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(MetaMapVisitor)
    }
}

impl IntoIterator for MetaMap {
    type Item = (String, MetaValue);
    type IntoIter = std::vec::IntoIter<(String, MetaValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Decoded pixel grid of one band, shaped (rows, cols).
///
/// The variant follows the pixel type stored in the image file.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterData {
    U8(Array2<u8>),
    U16(Array2<u16>),
    I16(Array2<i16>),
    U32(Array2<u32>),
    I32(Array2<i32>),
    F32(Array2<f32>),
    F64(Array2<f64>),
}

macro_rules! with_array {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            RasterData::U8($arr) => $body,
            RasterData::U16($arr) => $body,
            RasterData::I16($arr) => $body,
            RasterData::U32($arr) => $body,
            RasterData::I32($arr) => $body,
            RasterData::F32($arr) => $body,
            RasterData::F64($arr) => $body,
        }
    };
}

/// An empty 0 x 0 grid, used for records deserialized without pixels
impl Default for RasterData {
    fn default() -> Self {
        RasterData::U8(Array2::zeros((0, 0)))
    }
}

impl RasterData {
    /// (rows, cols)
    pub fn dim(&self) -> (usize, usize) {
        with_array!(self, arr => arr.dim())
    }

    /// Pixel type name in the ESPA `data_type` vocabulary
    pub fn data_type(&self) -> &'static str {
        match self {
            RasterData::U8(_) => "UINT8",
            RasterData::U16(_) => "UINT16",
            RasterData::I16(_) => "INT16",
            RasterData::U32(_) => "UINT32",
            RasterData::I32(_) => "INT32",
            RasterData::F32(_) => "FLOAT32",
            RasterData::F64(_) => "FLOAT64",
        }
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        with_array!(self, arr => arr.get((row, col)).map(|v| AsPrimitive::<f64>::as_(*v)))
    }

    pub fn to_f64(&self) -> Array2<f64> {
        with_array!(self, arr => arr.mapv(|v| AsPrimitive::<f64>::as_(v)))
    }
}

/// Pixel footprint of a band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelSize {
    pub x: f64,
    pub y: f64,
    pub units: Option<String>,
}

/// Range of valid (non-fill, non-saturated) pixel values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidRange {
    pub min: f64,
    pub max: f64,
}

/// One spectral or derived raster layer
///
/// Serializes its metadata only; `data` is skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Band {
    pub product: Option<String>,
    pub source: Option<String>,
    pub name: String,
    pub category: Option<String>,
    pub data_type: Option<String>,
    pub nlines: Option<usize>,
    pub nsamps: Option<usize>,
    pub fill_value: Option<f64>,
    pub saturate_value: Option<f64>,
    pub scale_factor: Option<f64>,
    pub add_offset: Option<f64>,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub file_name: String,
    pub pixel_size: Option<PixelSize>,
    pub resample_method: Option<String>,
    pub data_units: Option<String>,
    pub valid_range: Option<ValidRange>,
    /// Bit number -> meaning, for QA bands
    pub bitmap_description: Option<BTreeMap<u32, String>>,
    pub app_version: Option<String>,
    pub production_date: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub data: RasterData,
    /// Metadata fields with no typed counterpart
    pub extra: MetaMap,
}

impl Band {
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Pixel values with `scale_factor` and `add_offset` applied.
    /// Pixels equal to `fill_value` become NaN.
    pub fn scaled(&self) -> Array2<f64> {
        let scale = self.scale_factor.unwrap_or(1.0);
        let offset = self.add_offset.unwrap_or(0.0);
        let fill = self.fill_value;
        self.data.to_f64().mapv(|v| {
            if fill == Some(v) {
                f64::NAN
            } else {
                v * scale + offset
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarAngles {
    pub zenith: f64,
    pub azimuth: f64,
    pub units: Option<String>,
}

/// Worldwide Reference System path/row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wrs {
    pub system: Option<String>,
    pub path: u32,
    pub row: u32,
}

/// Geographic scene corner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingCoordinates {
    pub west: f64,
    pub east: f64,
    pub north: f64,
    pub south: f64,
}

/// Projected scene corner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerPoint {
    pub location: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionInformation {
    pub projection: Option<String>,
    pub datum: Option<String>,
    pub units: Option<String>,
    pub corner_points: Vec<CornerPoint>,
    pub grid_origin: Option<String>,
    pub utm_zone: Option<i32>,
    pub extra: MetaMap,
}

/// Scene-wide acquisition and georeferencing metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetadata {
    pub data_provider: Option<String>,
    pub satellite: Option<String>,
    pub instrument: Option<String>,
    pub acquisition_date: Option<NaiveDate>,
    pub scene_center_time: Option<String>,
    pub level1_production_date: Option<DateTime<Utc>>,
    pub solar_angles: Option<SolarAngles>,
    pub earth_sun_distance: Option<f64>,
    pub wrs: Option<Wrs>,
    pub product_id: Option<String>,
    pub lpgs_metadata_file: Option<String>,
    pub corners: Vec<Corner>,
    pub bounding_coordinates: Option<BoundingCoordinates>,
    pub projection_information: Option<ProjectionInformation>,
    pub orientation_angle: Option<f64>,
    pub extra: MetaMap,
}

/// One scene: its metadata and every band keyed by name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RasterSet {
    pub version: Option<String>,
    pub global_metadata: Option<GlobalMetadata>,
    pub bands: BTreeMap<String, Band>,
    pub extra: MetaMap,
}

impl RasterSet {
    pub fn band(&self, name: &str) -> Option<&Band> {
        self.bands.get(name)
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.keys().map(String::as_str).collect()
    }

    /// Common (rows, cols) of all bands, or `None` if they differ or there are none.
    pub fn shape(&self) -> Option<(usize, usize)> {
        let mut dims = self.bands.values().map(Band::dim);
        let first = dims.next()?;
        dims.all(|d| d == first).then_some(first)
    }
}
