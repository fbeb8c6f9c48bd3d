use crate::core::clean::{clean_mapping, normalize_bitmap};
use crate::core::record::{element_text, FromMetadata};
use crate::core::validate::Validate;
use crate::io::raster::read_image;
use crate::io::xml::parse_document;
use crate::types::{Band, EspaError, EspaResult, MetaMap, MetaValue, RasterSet};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What to do when two band entries share a name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateBandPolicy {
    /// Keep the band loaded last
    #[default]
    Overwrite,
    /// Fail the whole read
    Reject,
}

/// Reader options
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    pub duplicate_bands: DuplicateBandPolicy,
    /// Name of the document's root element
    pub root_element: String,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            duplicate_bands: DuplicateBandPolicy::Overwrite,
            root_element: "espa_metadata".to_string(),
        }
    }
}

/// Reads a raster set through its ESPA XML metadata file
pub struct MetadataReader {
    filename: PathBuf,
    options: ReaderOptions,
}

impl MetadataReader {
    /// Create a reader for the metadata file at `filename`
    pub fn new<P: AsRef<Path>>(filename: P) -> Self {
        Self::with_options(filename, ReaderOptions::default())
    }

    pub fn with_options<P: AsRef<Path>>(filename: P, options: ReaderOptions) -> Self {
        Self {
            filename: filename.as_ref().to_path_buf(),
            options,
        }
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Directory that band file names are relative to
    pub fn base_dir(&self) -> PathBuf {
        self.filename
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Read the metadata file and every band it references.
    pub fn read(&self) -> EspaResult<RasterSet> {
        log::info!("Reading ESPA metadata: {}", self.filename.display());

        let xml = std::fs::read_to_string(&self.filename)?;
        let mut document = parse_document(&xml)?;

        let root = &self.options.root_element;
        let mut meta = match document.remove(root) {
            Some(MetaValue::Map(map)) => map,
            _ => {
                return Err(EspaError::InvalidFormat(format!(
                    "{} has no <{}> root element",
                    self.filename.display(),
                    root
                )))
            }
        };

        let entries = Self::take_band_entries(&mut meta)?;
        log::debug!("Found {} band entries", entries.len());

        let base_dir = self.base_dir();
        let mut bands = BTreeMap::new();
        for entry in entries {
            let band = Self::build_band(entry, &base_dir)?;
            match bands.entry(band.name.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(band);
                }
                Entry::Occupied(mut slot) => match self.options.duplicate_bands {
                    DuplicateBandPolicy::Overwrite => {
                        log::warn!("Band '{}' appears more than once; keeping the last one", band.name);
                        slot.insert(band);
                    }
                    DuplicateBandPolicy::Reject => {
                        return Err(EspaError::DuplicateBand(band.name));
                    }
                },
            }
        }

        let mut raster_set = RasterSet::from_metadata(clean_mapping(meta))?;
        raster_set.bands = bands;
        raster_set.validate()?;

        log::info!(
            "Loaded {} bands from {}",
            raster_set.bands.len(),
            self.filename.display()
        );
        Ok(raster_set)
    }

    /// Remove `bands.band` from the document, accepting a single band in place of a list.
    fn take_band_entries(meta: &mut MetaMap) -> EspaResult<Vec<MetaMap>> {
        let band_list = match meta.remove("bands") {
            Some(MetaValue::Map(mut bands)) => bands.remove("band"),
            _ => None,
        }
        .ok_or_else(|| EspaError::MissingField("bands.band".to_string()))?;

        band_list
            .into_list()
            .into_iter()
            .map(|entry| match entry {
                MetaValue::Map(map) => Ok(map),
                other => Err(EspaError::InvalidFormat(format!(
                    "Band entry is not an element: {:?}",
                    other
                ))),
            })
            .collect()
    }

    /// Load one band entry's image from `base_dir` and construct the validated band.
    ///
    /// `file_name` may be a child element or an attribute of the band, and must
    /// be relative to `base_dir`.
    pub fn build_band(entry: MetaMap, base_dir: &Path) -> EspaResult<Band> {
        let mut entry = clean_mapping(entry);

        let file_name = entry
            .get("file_name")
            .and_then(element_text)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| EspaError::MissingField("file_name".to_string()))?
            .to_string();

        if Path::new(&file_name).has_root() {
            return Err(EspaError::InvalidField {
                field: "file_name".to_string(),
                value: file_name,
            });
        }

        let data = read_image(base_dir.join(&file_name))?;

        normalize_bitmap(&mut entry)?;

        let band = Band::from_metadata(entry, data)?;
        band.validate()?;

        let (rows, cols) = band.dim();
        log::debug!(
            "Band '{}' from {}: {} x {} {}",
            band.name,
            file_name,
            rows,
            cols,
            band.data.data_type()
        );
        Ok(band)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_dir() {
        let reader = MetadataReader::new("/data/LC08/scene.xml");
        assert_eq!(reader.base_dir(), PathBuf::from("/data/LC08"));

        let bare = MetadataReader::new("scene.xml");
        assert_eq!(bare.base_dir().join("band1.tif"), PathBuf::from("band1.tif"));
    }

    #[test]
    fn test_single_band_is_one_element_list() {
        let mut band = MetaMap::new();
        band.insert("@name", "band1");
        let mut bands = MetaMap::new();
        bands.insert("band", band.clone());
        let mut meta = MetaMap::new();
        meta.insert("bands", bands);
        meta.insert("global_metadata", MetaValue::Null);

        let entries = MetadataReader::take_band_entries(&mut meta).unwrap();
        assert_eq!(entries, vec![band]);
        assert!(!meta.contains_key("bands"));
        assert!(meta.contains_key("global_metadata"));
    }

    #[test]
    fn test_missing_band_list() {
        let mut meta = MetaMap::new();
        meta.insert("bands", MetaValue::Null);
        assert!(matches!(
            MetadataReader::take_band_entries(&mut meta),
            Err(EspaError::MissingField(_))
        ));
    }

    #[test]
    fn test_build_band_without_file_name() {
        let mut entry = MetaMap::new();
        entry.insert("@name", "band1");
        let result = MetadataReader::build_band(entry, Path::new("/tmp"));
        assert!(matches!(result, Err(EspaError::MissingField(field)) if field == "file_name"));
    }

    #[test]
    fn test_build_band_file_name_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let mut entry = MetaMap::new();
        entry.insert("@name", "band1");
        entry.insert("@file_name", "b1.tif");

        // Found under its attribute key, so the failure is the absent image
        match MetadataReader::build_band(entry, dir.path()) {
            Err(EspaError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected missing image, got {:?}", other),
        }
    }

    #[test]
    fn test_build_band_rejects_absolute_file_name() {
        let mut entry = MetaMap::new();
        entry.insert("@name", "band1");
        entry.insert("file_name", "/etc/band1.tif");

        let result = MetadataReader::build_band(entry, Path::new("/data/LC08"));
        assert!(matches!(
            result,
            Err(EspaError::InvalidField { field, value }) if field == "file_name" && value == "/etc/band1.tif"
        ));
    }

    #[test]
    fn test_missing_root_element() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.xml");
        std::fs::write(&path, "<scene><bands/></scene>").unwrap();

        let result = MetadataReader::new(&path).read();
        assert!(matches!(result, Err(EspaError::InvalidFormat(_))));
    }

    #[test]
    fn test_custom_root_element() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.xml");
        std::fs::write(
            &path,
            r#"<scene><bands><band name="band1"><file_name>absent.tif</file_name></band></bands></scene>"#,
        )
        .unwrap();

        let options = ReaderOptions {
            root_element: "scene".to_string(),
            ..ReaderOptions::default()
        };
        // The root is accepted and reading goes on to the band image
        let result = MetadataReader::with_options(&path, options).read();
        assert!(matches!(result, Err(EspaError::Io(_))));
    }

    #[test]
    fn test_default_options() {
        let options = ReaderOptions::default();
        assert_eq!(options.duplicate_bands, DuplicateBandPolicy::Overwrite);
        assert_eq!(options.root_element, "espa_metadata");
    }
}
