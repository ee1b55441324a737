//! Series discovery for bioformats2raw containers.
//!
//! The converter writes a per-series OME manifest next to the image groups.
//! This parser handles only what series discovery needs: `Image` elements
//! and their `ID` attributes of the form `Image:<path>`, in document order.
//! Not a general OME-XML parser.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{Error, Result};
use crate::store::ZarrGroup;

const MANIFEST_KEY: &str = "OME/METADATA.ome.xml";

/// Image paths listed by the group's series manifest.
///
/// `None` when the store carries no manifest (simplified layouts name
/// their series `0`, `1`, ... and are probed instead). A manifest that
/// exists but does not parse is a loud failure.
pub(crate) fn series_paths(group: &ZarrGroup) -> Result<Option<Vec<String>>> {
    let Some(bytes) = group.raw_bytes(MANIFEST_KEY)? else {
        return Ok(None);
    };
    let text = String::from_utf8(bytes).map_err(Error::wrap)?;
    parse_manifest(&text).map(Some)
}

fn parse_manifest(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut paths = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                if e.local_name().as_ref() != b"Image" {
                    continue;
                }
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() != b"ID" {
                        continue;
                    }
                    let id = attr.unescape_value()?;
                    if let Some(path) = id.strip_prefix("Image:") {
                        paths.push(path.to_string());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest_image_ids() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2016-06">
                <Image ID="Image:0" Name="first"><Pixels ID="Pixels:0"/></Image>
                <Image ID="Image:1" Name="second"/>
                <Instrument ID="Instrument:0"/>
            </OME>"#;
        assert_eq!(parse_manifest(xml).unwrap(), vec!["0", "1"]);
    }

    #[test]
    fn test_parse_manifest_ignores_non_image_ids() {
        let xml = r#"<OME><Image Name="unlabelled"/><Image ID="Mask:0"/></OME>"#;
        assert!(parse_manifest(xml).unwrap().is_empty());
    }

    #[test]
    fn test_parse_manifest_invalid_xml_is_loud() {
        assert!(parse_manifest("<OME><Image").is_err());
    }
}
