use crate::types::{EspaError, EspaResult, MetaMap, MetaValue};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Prefix marking a key that came from an XML attribute
pub const ATTRIBUTE_MARKER: char = '@';
/// Key holding the text of an element that also has attributes or children
pub const TEXT_KEY: &str = "#text";

/// Element being assembled while its children are read
struct Frame {
    name: String,
    children: MetaMap,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> EspaResult<Self> {
        let name = element_name(start)?;
        let mut children = MetaMap::new();

        for attr in start.attributes() {
            let attr = attr.map_err(|e| {
                EspaError::XmlParsing(format!("Bad attribute on <{}>: {}", name, e))
            })?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| EspaError::XmlParsing(format!("Non UTF-8 attribute name: {}", e)))?;
            let value = attr.unescape_value().map_err(|e| {
                EspaError::XmlParsing(format!("Bad value for attribute '{}': {}", key, e))
            })?;
            children.insert(format!("{}{}", ATTRIBUTE_MARKER, key), value.into_owned());
        }

        Ok(Self {
            name,
            children,
            text: String::new(),
        })
    }

    /// Collapse the finished element into its mapping value.
    fn close(self) -> (String, MetaValue) {
        let text = self.text.trim();
        let value = if self.children.is_empty() {
            if text.is_empty() {
                MetaValue::Null
            } else {
                MetaValue::Text(text.to_string())
            }
        } else {
            let mut children = self.children;
            if !text.is_empty() {
                children.insert(TEXT_KEY, text.to_string());
            }
            MetaValue::Map(children)
        };
        (self.name, value)
    }

    /// Add a child element; repeated names turn into a list in document order.
    fn push_child(&mut self, name: String, value: MetaValue) {
        match self.children.get_mut(&name) {
            Some(MetaValue::List(items)) => items.push(value),
            Some(existing) => {
                let first = std::mem::replace(existing, MetaValue::Null);
                *existing = MetaValue::List(vec![first, value]);
            }
            None => {
                self.children.insert(name, value);
            }
        }
    }
}

fn element_name(start: &BytesStart<'_>) -> EspaResult<String> {
    std::str::from_utf8(start.name().as_ref())
        .map(str::to_string)
        .map_err(|e| EspaError::XmlParsing(format!("Non UTF-8 element name: {}", e)))
}

/// Parse an XML document into a nested mapping keyed by the root element name.
///
/// Attributes become `@name` keys, text next to attributes or children becomes
/// `#text`, repeated siblings become a list and empty elements become `Null`.
pub fn parse_document(xml: &str) -> EspaResult<MetaMap> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack = vec![Frame {
        name: String::new(),
        children: MetaMap::new(),
        text: String::new(),
    }];

    loop {
        let event = reader.read_event().map_err(|e| {
            EspaError::XmlParsing(format!("Error at position {}: {}", reader.buffer_position(), e))
        })?;

        match event {
            Event::Start(e) => stack.push(Frame::open(&e)?),
            Event::Empty(e) => {
                let (name, value) = Frame::open(&e)?.close();
                if let Some(parent) = stack.last_mut() {
                    parent.push_child(name, value);
                }
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err(EspaError::XmlParsing("Unbalanced closing tag".to_string()));
                }
                if let Some(frame) = stack.pop() {
                    let (name, value) = frame.close();
                    if let Some(parent) = stack.last_mut() {
                        parent.push_child(name, value);
                    }
                }
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| EspaError::XmlParsing(e.to_string()))?;
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                let bytes = c.into_inner();
                let text = std::str::from_utf8(&bytes)
                    .map_err(|e| EspaError::XmlParsing(format!("Non UTF-8 CDATA: {}", e)))?;
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(text);
                }
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions and doctypes carry no metadata
            _ => {}
        }
    }

    if stack.len() != 1 {
        let open = stack.last().map(|f| f.name.clone()).unwrap_or_default();
        return Err(EspaError::XmlParsing(format!(
            "Unexpected end of document inside <{}>",
            open
        )));
    }

    let root = stack.pop().map(|f| f.children).unwrap_or_default();
    if root.is_empty() {
        return Err(EspaError::XmlParsing("Document has no root element".to_string()));
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_and_text() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <espa_metadata version="2.0" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
            <global_metadata>
                <satellite>LANDSAT_8</satellite>
                <wrs system="2" path="31" row="39"/>
            </global_metadata>
        </espa_metadata>"#;

        let doc = parse_document(xml).unwrap();
        let root = doc.get("espa_metadata").and_then(MetaValue::as_map).unwrap();
        assert_eq!(root.get("@version").and_then(MetaValue::text), Some("2.0"));
        assert!(root.contains_key("@xmlns:xsi"));

        let global = root.get("global_metadata").and_then(MetaValue::as_map).unwrap();
        assert_eq!(global.get("satellite"), Some(&MetaValue::from("LANDSAT_8")));
        let wrs = global.get("wrs").and_then(MetaValue::as_map).unwrap();
        assert_eq!(wrs.keys().collect::<Vec<_>>(), vec!["@system", "@path", "@row"]);
    }

    #[test]
    fn test_repeated_elements_become_list() {
        let xml = r#"<bitmap_description>
            <bit num="0">Fill</bit>
            <bit num="1">Clear &amp; dry</bit>
        </bitmap_description>"#;

        let doc = parse_document(xml).unwrap();
        let bits = doc
            .get("bitmap_description")
            .and_then(MetaValue::as_map)
            .and_then(|m| m.get("bit"))
            .and_then(MetaValue::as_list)
            .unwrap();
        assert_eq!(bits.len(), 2);

        let second = bits[1].as_map().unwrap();
        assert_eq!(second.get("@num").and_then(MetaValue::text), Some("1"));
        assert_eq!(second.get("#text").and_then(MetaValue::text), Some("Clear & dry"));
    }

    #[test]
    fn test_empty_element_is_null() {
        let doc = parse_document("<a><b/><c></c></a>").unwrap();
        let a = doc.get("a").and_then(MetaValue::as_map).unwrap();
        assert!(a.get("b").unwrap().is_null());
        assert!(a.get("c").unwrap().is_null());
    }

    #[test]
    fn test_malformed_xml_is_rejected() {
        assert!(matches!(
            parse_document("<a><b></a>"),
            Err(EspaError::XmlParsing(_))
        ));
        assert!(matches!(parse_document("<a><b>"), Err(EspaError::XmlParsing(_))));
        assert!(matches!(parse_document("   "), Err(EspaError::XmlParsing(_))));
    }
}
