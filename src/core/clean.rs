//! Key cleaning and bitmap normalization for parsed metadata trees

use crate::types::{EspaError, EspaResult, MetaMap, MetaValue};

/// Remove attribute (`@`) and text (`#`) markers from a key.
pub fn strip_markers(key: &str) -> String {
    key.chars().filter(|c| *c != '@' && *c != '#').collect()
}

/// Strip markers from every key of a mapping, recursing into nested mappings
/// and into mappings held directly by sequences.
///
/// Lists nested inside lists are left as they are.
pub fn clean_mapping(map: MetaMap) -> MetaMap {
    map.into_iter()
        .map(|(key, value)| (strip_markers(&key), clean_value(value)))
        .collect()
}

/// Apply [`clean_mapping`] to whatever mappings `value` holds.
pub fn clean_value(value: MetaValue) -> MetaValue {
    match value {
        MetaValue::Map(map) => MetaValue::Map(clean_mapping(map)),
        MetaValue::List(items) => MetaValue::List(
            items
                .into_iter()
                .map(|item| match item {
                    MetaValue::Map(map) => MetaValue::Map(clean_mapping(map)),
                    other => other,
                })
                .collect(),
        ),
        scalar => scalar,
    }
}

/// Replace a cleaned `bitmap_description` holding `bit` entries of
/// `{num, text}` with a direct `num -> text` mapping.
///
/// Entries without a `bitmap_description`, or with an empty one, are left untouched.
pub fn normalize_bitmap(entry: &mut MetaMap) -> EspaResult<()> {
    let description = match entry.get("bitmap_description") {
        Some(MetaValue::Map(map)) if !map.is_empty() => map,
        _ => return Ok(()),
    };

    // Already flat
    if !description.contains_key("bit") && description.iter().all(|(_, v)| v.text().is_some()) {
        return Ok(());
    }

    let bits = description
        .get("bit")
        .cloned()
        .ok_or_else(|| EspaError::MissingField("bitmap_description.bit".to_string()))?;

    let mut flat = MetaMap::new();
    for bit in bits.into_list() {
        let bit = bit.as_map().ok_or_else(|| EspaError::InvalidField {
            field: "bitmap_description.bit".to_string(),
            value: format!("{:?}", bit),
        })?;
        let num = bit
            .get("num")
            .and_then(MetaValue::text)
            .ok_or_else(|| EspaError::MissingField("bitmap_description.bit.num".to_string()))?;
        let text = bit
            .get("text")
            .and_then(MetaValue::text)
            .ok_or_else(|| EspaError::MissingField("bitmap_description.bit.text".to_string()))?;
        flat.insert(num.trim(), text);
    }

    entry.insert("bitmap_description", flat);
    Ok(())
}
