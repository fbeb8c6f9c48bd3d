//! I/O modules for reading ESPA metadata documents and band images

pub mod xml;
pub mod raster;
pub mod reader;

pub use xml::parse_document;
pub use raster::read_image;
pub use reader::{DuplicateBandPolicy, MetadataReader, ReaderOptions};
