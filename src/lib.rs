//! espa: read ESPA-schema raster sets into memory
//!
//! An ESPA metadata document describes a scene and lists its bands, each
//! pointing at an image file next to the document. [`MetadataReader`] parses
//! the document, loads every band image into an `ndarray` array and returns a
//! validated [`RasterSet`].
//!
//! ```no_run
//! use espa::MetadataReader;
//!
//! let scene = MetadataReader::new("LC08_L1TP_031039_20130414.xml").read()?;
//! for name in scene.band_names() {
//!     println!("{name}: {:?}", scene.bands[name].dim());
//! }
//! # Ok::<(), espa::EspaError>(())
//! ```

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    Band, EspaError, EspaResult, GlobalMetadata, MetaMap, MetaValue, RasterData, RasterSet,
};

pub use io::{read_image, parse_document, DuplicateBandPolicy, MetadataReader, ReaderOptions};
pub use crate::core::{clean_mapping, FromMetadata, Validate};
