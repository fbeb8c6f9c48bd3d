//! Metadata transformation: key cleaning, record construction and validation

pub mod clean;
pub mod record;
pub mod validate;

// Re-export main types
pub use clean::{clean_mapping, clean_value, normalize_bitmap, strip_markers};
pub use record::{element_text, parse_time_flexible, split_element_text, Fields, FromMetadata};
pub use validate::Validate;
