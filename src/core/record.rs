//! Typed record construction from cleaned metadata mappings

use crate::types::{
    Band, BoundingCoordinates, Corner, CornerPoint, EspaError, EspaResult, GlobalMetadata, MetaMap,
    MetaValue, PixelSize, ProjectionInformation, RasterData, RasterSet, SolarAngles, ValidRange,
    Wrs,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Build a typed record from a cleaned metadata mapping.
///
/// Known fields are parsed into typed members; anything else is kept in the
/// record's `extra` map where it has one.
pub trait FromMetadata: Sized {
    fn from_metadata(map: MetaMap) -> EspaResult<Self>;
}

/// Consumes known fields from a mapping, leaving the rest as extras.
pub struct Fields {
    map: MetaMap,
    context: &'static str,
}

impl Fields {
    pub fn new(map: MetaMap, context: &'static str) -> Self {
        Self { map, context }
    }

    fn path(&self, key: &str) -> String {
        format!("{}.{}", self.context, key)
    }

    fn invalid(&self, key: &str, value: &MetaValue) -> EspaError {
        EspaError::InvalidField {
            field: self.path(key),
            value: value.text().map(str::to_string).unwrap_or_else(|| format!("{:?}", value)),
        }
    }

    /// Text content of a field; empty elements count as absent.
    ///
    /// Attributes carried next to the text stay behind as an extra under `key`.
    pub fn text(&mut self, key: &str) -> EspaResult<Option<String>> {
        match self.map.remove(key) {
            None | Some(MetaValue::Null) => Ok(None),
            Some(value) => match split_element_text(value) {
                Ok((text, attributes)) => {
                    if !attributes.is_empty() {
                        self.map.insert(key, attributes);
                    }
                    Ok(Some(text.trim().to_string()))
                }
                Err(value) => Err(self.invalid(key, &value)),
            },
        }
    }

    pub fn parsed<T: FromStr>(&mut self, key: &str) -> EspaResult<Option<T>> {
        let Some(text) = self.text(key)? else {
            return Ok(None);
        };
        match text.parse::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(_) => Err(EspaError::InvalidField {
                field: self.path(key),
                value: text,
            }),
        }
    }

    /// Put back a value that could not be typed, next to any attributes kept by [`Fields::text`].
    fn keep_extra(&mut self, key: &str, text: String) {
        match self.map.get_mut(key) {
            Some(MetaValue::Map(attributes)) => {
                attributes.insert("text", text);
            }
            _ => {
                self.map.insert(key, text);
            }
        }
    }

    pub fn required<T: FromStr>(&mut self, key: &str) -> EspaResult<T> {
        self.parsed(key)?
            .ok_or_else(|| EspaError::MissingField(self.path(key)))
    }

    pub fn map(&mut self, key: &str) -> EspaResult<Option<MetaMap>> {
        match self.map.remove(key) {
            None | Some(MetaValue::Null) => Ok(None),
            Some(MetaValue::Map(map)) => Ok(Some(map)),
            Some(other) => Err(self.invalid(key, &other)),
        }
    }

    /// Repeated child mappings; a single mapping is a one-element list.
    pub fn list(&mut self, key: &str) -> EspaResult<Vec<MetaMap>> {
        let items = match self.map.remove(key) {
            Some(value) => value.into_list(),
            None => return Ok(Vec::new()),
        };
        items
            .into_iter()
            .map(|item| match item {
                MetaValue::Map(map) => Ok(map),
                other => Err(self.invalid(key, &other)),
            })
            .collect()
    }

    pub fn record<T: FromMetadata>(&mut self, key: &str) -> EspaResult<Option<T>> {
        self.map(key)?.map(T::from_metadata).transpose()
    }

    pub fn records<T: FromMetadata>(&mut self, key: &str) -> EspaResult<Vec<T>> {
        self.list(key)?.into_iter().map(T::from_metadata).collect()
    }

    /// Calendar date; an unparseable value is kept as an extra.
    pub fn date(&mut self, key: &str) -> EspaResult<Option<NaiveDate>> {
        let Some(text) = self.text(key)? else {
            return Ok(None);
        };
        match NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
            Ok(date) => Ok(Some(date)),
            Err(e) => {
                log::warn!("Could not parse date {}='{}': {}", self.path(key), text, e);
                self.keep_extra(key, text);
                Ok(None)
            }
        }
    }

    /// UTC timestamp; an unparseable value is kept as an extra.
    pub fn datetime(&mut self, key: &str) -> EspaResult<Option<DateTime<Utc>>> {
        let Some(text) = self.text(key)? else {
            return Ok(None);
        };
        match parse_time_flexible(&text) {
            Some(time) => Ok(Some(time)),
            None => {
                log::warn!("Could not parse timestamp {}='{}'", self.path(key), text);
                self.keep_extra(key, text);
                Ok(None)
            }
        }
    }

    /// Remaining, unrecognised fields
    pub fn finish(self) -> MetaMap {
        self.map
    }
}

/// Own text of a cleaned (or raw) element.
///
/// Cleaning turns an element's `#text` into `text`; only a scalar entry counts,
/// so a `<text>` child element with attributes or children of its own is not
/// taken for the parent's text.
pub fn element_text(value: &MetaValue) -> Option<&str> {
    match value {
        MetaValue::Text(text) => Some(text.as_str()),
        MetaValue::Map(map) => ["#text", "text"].iter().find_map(|key| match map.get(key) {
            Some(MetaValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }),
        _ => None,
    }
}

/// Split an element into its own text and the attributes that came with it.
/// Values without text of their own are handed back unchanged.
pub fn split_element_text(value: MetaValue) -> Result<(String, MetaMap), MetaValue> {
    match value {
        MetaValue::Text(text) => Ok((text, MetaMap::new())),
        MetaValue::Map(mut map) => {
            for key in ["#text", "text"] {
                if matches!(map.get(key), Some(MetaValue::Text(_))) {
                    if let Some(MetaValue::Text(text)) = map.remove(key) {
                        return Ok((text, map));
                    }
                }
            }
            Err(MetaValue::Map(map))
        }
        other => Err(other),
    }
}

/// Timestamp parsing that accepts the variants found in ESPA documents
pub fn parse_time_flexible(time_str: &str) -> Option<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(time_str) {
        return Some(time.with_timezone(&Utc));
    }

    // No timezone designator: assume UTC
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(time_str.trim_end_matches('Z'), format) {
            return Some(naive.and_utc());
        }
    }

    None
}

impl FromMetadata for PixelSize {
    fn from_metadata(map: MetaMap) -> EspaResult<Self> {
        let mut f = Fields::new(map, "pixel_size");
        Ok(Self {
            x: f.required("x")?,
            y: f.required("y")?,
            units: f.text("units")?,
        })
    }
}

impl FromMetadata for ValidRange {
    fn from_metadata(map: MetaMap) -> EspaResult<Self> {
        let mut f = Fields::new(map, "valid_range");
        Ok(Self {
            min: f.required("min")?,
            max: f.required("max")?,
        })
    }
}

impl FromMetadata for SolarAngles {
    fn from_metadata(map: MetaMap) -> EspaResult<Self> {
        let mut f = Fields::new(map, "solar_angles");
        Ok(Self {
            zenith: f.required("zenith")?,
            azimuth: f.required("azimuth")?,
            units: f.text("units")?,
        })
    }
}

impl FromMetadata for Wrs {
    fn from_metadata(map: MetaMap) -> EspaResult<Self> {
        let mut f = Fields::new(map, "wrs");
        Ok(Self {
            system: f.text("system")?,
            path: f.required("path")?,
            row: f.required("row")?,
        })
    }
}

impl FromMetadata for Corner {
    fn from_metadata(map: MetaMap) -> EspaResult<Self> {
        let mut f = Fields::new(map, "corner");
        Ok(Self {
            location: f.required("location")?,
            latitude: f.required("latitude")?,
            longitude: f.required("longitude")?,
        })
    }
}

impl FromMetadata for BoundingCoordinates {
    fn from_metadata(map: MetaMap) -> EspaResult<Self> {
        let mut f = Fields::new(map, "bounding_coordinates");
        Ok(Self {
            west: f.required("west")?,
            east: f.required("east")?,
            north: f.required("north")?,
            south: f.required("south")?,
        })
    }
}

impl FromMetadata for CornerPoint {
    fn from_metadata(map: MetaMap) -> EspaResult<Self> {
        let mut f = Fields::new(map, "corner_point");
        Ok(Self {
            location: f.required("location")?,
            x: f.required("x")?,
            y: f.required("y")?,
        })
    }
}

impl FromMetadata for ProjectionInformation {
    fn from_metadata(map: MetaMap) -> EspaResult<Self> {
        let mut f = Fields::new(map, "projection_information");
        let projection = f.text("projection")?;
        let datum = f.text("datum")?;
        let units = f.text("units")?;
        let corner_points = f.records("corner_point")?;
        let grid_origin = f.text("grid_origin")?;

        let utm_zone = match f.map("utm_proj_params")? {
            Some(params) => Fields::new(params, "utm_proj_params").parsed("zone_code")?,
            None => None,
        };

        Ok(Self {
            projection,
            datum,
            units,
            corner_points,
            grid_origin,
            utm_zone,
            extra: f.finish(),
        })
    }
}

impl FromMetadata for GlobalMetadata {
    fn from_metadata(map: MetaMap) -> EspaResult<Self> {
        let mut f = Fields::new(map, "global_metadata");
        let data_provider = f.text("data_provider")?;
        let satellite = f.text("satellite")?;
        let instrument = f.text("instrument")?;
        let acquisition_date = f.date("acquisition_date")?;
        let scene_center_time = f.text("scene_center_time")?;
        let level1_production_date = f.datetime("level1_production_date")?;
        let solar_angles = f.record("solar_angles")?;
        let earth_sun_distance = f.parsed("earth_sun_distance")?;
        let wrs = f.record("wrs")?;
        let product_id = f.text("product_id")?;
        let lpgs_metadata_file = f.text("lpgs_metadata_file")?;
        let corners = f.records("corner")?;
        let bounding_coordinates = f.record("bounding_coordinates")?;
        let projection_information = f.record("projection_information")?;
        let orientation_angle = f.parsed("orientation_angle")?;

        Ok(Self {
            data_provider,
            satellite,
            instrument,
            acquisition_date,
            scene_center_time,
            level1_production_date,
            solar_angles,
            earth_sun_distance,
            wrs,
            product_id,
            lpgs_metadata_file,
            corners,
            bounding_coordinates,
            projection_information,
            orientation_angle,
            extra: f.finish(),
        })
    }
}

/// Bands are attached by the reader after construction.
impl FromMetadata for RasterSet {
    fn from_metadata(map: MetaMap) -> EspaResult<Self> {
        let mut f = Fields::new(map, "espa_metadata");
        let version = f.text("version")?;
        let global_metadata = f.record("global_metadata")?;

        Ok(Self {
            version,
            global_metadata,
            bands: BTreeMap::new(),
            extra: f.finish(),
        })
    }
}

impl Band {
    /// Construct a band from its cleaned, bitmap-normalized metadata and pixel data.
    ///
    /// A missing `name` or `file_name` yields an empty string, which validation rejects.
    pub fn from_metadata(map: MetaMap, data: RasterData) -> EspaResult<Self> {
        let mut f = Fields::new(map, "band");

        let bitmap_description = match f.map("bitmap_description")? {
            Some(bits) => Some(
                bits.into_iter()
                    .map(|(num, text)| {
                        let field = format!("band.bitmap_description.{}", num);
                        let bit = num.trim().parse::<u32>().map_err(|_| EspaError::InvalidField {
                            field: field.clone(),
                            value: num.clone(),
                        })?;
                        let text = element_text(&text).map(str::to_string).ok_or_else(|| {
                            EspaError::InvalidField {
                                field,
                                value: format!("{:?}", text),
                            }
                        })?;
                        Ok((bit, text))
                    })
                    .collect::<EspaResult<BTreeMap<u32, String>>>()?,
            ),
            None => None,
        };

        Ok(Self {
            product: f.text("product")?,
            source: f.text("source")?,
            name: f.text("name")?.unwrap_or_default(),
            category: f.text("category")?,
            data_type: f.text("data_type")?,
            nlines: f.parsed("nlines")?,
            nsamps: f.parsed("nsamps")?,
            fill_value: f.parsed("fill_value")?,
            saturate_value: f.parsed("saturate_value")?,
            scale_factor: f.parsed("scale_factor")?,
            add_offset: f.parsed("add_offset")?,
            short_name: f.text("short_name")?,
            long_name: f.text("long_name")?,
            file_name: f.text("file_name")?.unwrap_or_default(),
            pixel_size: f.record("pixel_size")?,
            resample_method: f.text("resample_method")?,
            data_units: f.text("data_units")?,
            valid_range: f.record("valid_range")?,
            bitmap_description,
            app_version: f.text("app_version")?,
            production_date: f.datetime("production_date")?,
            data,
            extra: f.finish(),
        })
    }
}
