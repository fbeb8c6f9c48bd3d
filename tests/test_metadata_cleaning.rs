use espa::core::{clean_mapping, normalize_bitmap};
use espa::{parse_document, MetaMap, MetaValue};

const SCENE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<espa_metadata version="2.0" xmlns="http://espa.cr.usgs.gov/v2">
    <global_metadata>
        <solar_angles zenith="32.152" azimuth="130.438" units="degrees"/>
        <corner location="UL" latitude="31.697" longitude="-106.893"/>
        <corner location="LR" latitude="29.600" longitude="-104.448"/>
        <projection_information projection="UTM" datum="WGS84" units="meters">
            <corner_point location="UL" x="320685.0" y="3508215.0"/>
            <corner_point location="LR" x="553815.0" y="3274785.0"/>
            <grid_origin>CENTER</grid_origin>
        </projection_information>
    </global_metadata>
    <bands>
        <band name="pixel_qa" data_type="UINT16">
            <file_name>pixel_qa.tif</file_name>
            <bitmap_description>
                <bit num="0">Fill</bit>
                <bit num="1">Clear</bit>
                <bit num="5">Cloud</bit>
            </bitmap_description>
        </band>
    </bands>
</espa_metadata>"#;

fn has_marker(value: &MetaValue) -> bool {
    match value {
        MetaValue::Map(map) => map
            .iter()
            .any(|(k, v)| k.contains('@') || k.contains('#') || has_marker(v)),
        MetaValue::List(items) => items.iter().any(has_marker),
        _ => false,
    }
}

fn root() -> MetaMap {
    let mut doc = parse_document(SCENE).expect("scene parses");
    match doc.remove("espa_metadata") {
        Some(MetaValue::Map(map)) => map,
        other => panic!("unexpected root: {:?}", other),
    }
}

#[test]
fn test_markers_stripped_at_every_depth() {
    let raw = root();
    assert!(has_marker(&MetaValue::Map(raw.clone())));

    let cleaned = clean_mapping(raw);
    assert!(!has_marker(&MetaValue::Map(cleaned.clone())));

    let corners = cleaned
        .get("global_metadata")
        .and_then(MetaValue::as_map)
        .and_then(|m| m.get("corner"))
        .and_then(MetaValue::as_list)
        .expect("corner list");
    assert_eq!(corners.len(), 2);
    assert_eq!(
        corners[0].as_map().and_then(|c| c.get("location")).and_then(MetaValue::text),
        Some("UL")
    );
}

#[test]
fn test_cleaning_is_idempotent() {
    let once = clean_mapping(root());
    let twice = clean_mapping(once.clone());
    assert_eq!(once, twice);
}

#[test]
fn test_bitmap_from_parsed_document() {
    let cleaned = clean_mapping(root());
    let mut band = cleaned
        .get("bands")
        .and_then(MetaValue::as_map)
        .and_then(|b| b.get("band"))
        .and_then(MetaValue::as_map)
        .cloned()
        .expect("single band entry");

    normalize_bitmap(&mut band).unwrap();

    let bitmap = band
        .get("bitmap_description")
        .and_then(MetaValue::as_map)
        .expect("flat bitmap");
    let pairs: Vec<(&str, Option<&str>)> = bitmap.iter().map(|(k, v)| (k, v.text())).collect();
    assert_eq!(
        pairs,
        vec![("0", Some("Fill")), ("1", Some("Clear")), ("5", Some("Cloud"))]
    );
}
