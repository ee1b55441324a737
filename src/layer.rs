use std::collections::BTreeMap;

use ndarray::Array2;
use serde_json::Value;

use crate::lazy::LazyArray;

/// How the viewer should interpret a layer's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Image,
    Labels,
    Points,
    Tracks,
}

impl LayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Labels => "labels",
            Self::Points => "points",
            Self::Tracks => "tracks",
        }
    }
}

/// Layer payload: a resolution-decreasing pyramid of lazy arrays, or a
/// single 2-d table for point/track layers.
#[derive(Debug, Clone)]
pub enum LayerData {
    Pyramid(Vec<LazyArray>),
    Table(Array2<f64>),
}

/// A linear colormap: evenly spaced RGB stops, components in `0..=1`.
///
/// Treated as an opaque value by this crate; omero channels produce the
/// two-stop black-to-colour ramp.
#[derive(Debug, Clone, PartialEq)]
pub struct Colormap {
    pub stops: Vec<[f32; 3]>,
    /// Well-known name, when the colour is listed in the injected
    /// [`ColormapTable`].
    pub name: Option<String>,
}

impl Colormap {
    /// Ramp from black to `end`.
    pub fn two_stop(end: [f32; 3]) -> Self {
        Self {
            stops: vec![[0.0; 3], end],
            name: None,
        }
    }

    /// Ramp from black to `end`, labelled with a well-known name.
    pub fn named(name: impl Into<String>, end: [f32; 3]) -> Self {
        Self {
            stops: vec![[0.0; 3], end],
            name: Some(name.into()),
        }
    }

    /// Grayscale ramp, used when a channel declares no colour.
    pub fn gray() -> Self {
        Self::named("gray", [1.0; 3])
    }
}

/// Read-only table mapping well-known colours to their names.
///
/// Injected into metadata inference so channels using a familiar colour
/// get a named colormap the viewer can share, instead of an anonymous
/// ramp.
#[derive(Debug, Clone)]
pub struct ColormapTable {
    entries: Vec<(String, [f32; 3])>,
}

impl ColormapTable {
    pub fn new(entries: Vec<(String, [f32; 3])>) -> Self {
        Self { entries }
    }

    /// The primary and secondary colours plus gray.
    pub fn with_defaults() -> Self {
        let entries = [
            ("red", [1.0, 0.0, 0.0]),
            ("green", [0.0, 1.0, 0.0]),
            ("blue", [0.0, 0.0, 1.0]),
            ("cyan", [0.0, 1.0, 1.0]),
            ("magenta", [1.0, 0.0, 1.0]),
            ("yellow", [1.0, 1.0, 0.0]),
            ("gray", [1.0, 1.0, 1.0]),
        ];
        Self::new(
            entries
                .into_iter()
                .map(|(name, rgb)| (name.to_string(), rgb))
                .collect(),
        )
    }

    pub fn name_for(&self, rgb: [f32; 3]) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, entry)| *entry == rgb)
            .map(|(name, _)| name.as_str())
    }
}

/// Parse a 6-hex-digit RGB string into unit-range components.
pub fn parse_hex_color(hex: &str) -> Option<[f32; 3]> {
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let mut rgb = [0.0f32; 3];
    for (i, component) in rgb.iter_mut().enumerate() {
        let byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16).ok()?;
        *component = f32::from(byte) / 255.0;
    }
    Some(rgb)
}

/// A display-metadata value that is per-channel for multi-channel images
/// and a bare scalar otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelValue<T> {
    Single(T),
    PerChannel(Vec<T>),
}

impl<T> ChannelValue<T> {
    /// Wrap `values`, collapsing to the first element when no channel axis
    /// is in play. Empty input produces nothing at all.
    pub fn from_values(values: Vec<T>, per_channel: bool) -> Option<Self> {
        if per_channel {
            (!values.is_empty()).then_some(Self::PerChannel(values))
        } else {
            values.into_iter().next().map(Self::Single)
        }
    }
}

/// Per-object property columns plus the synthesized `index` column; every
/// column has the same length.
pub type PropertyTable = BTreeMap<String, Vec<Value>>;

/// Viewer-facing display metadata. Every field is optional; an empty value
/// means the viewer picks its own defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerMetadata {
    pub channel_axis: Option<usize>,
    pub name: Option<ChannelValue<String>>,
    pub colormap: Option<ChannelValue<Colormap>>,
    pub visible: Option<ChannelValue<bool>>,
    pub contrast_limits: Option<ChannelValue<[f64; 2]>>,
    pub scale: Option<Vec<f64>>,
    pub translate: Option<Vec<f64>>,
    pub properties: Option<PropertyTable>,
    /// Track lineage: track id to the ids of the tracks it branched or
    /// merged from.
    pub graph: Option<BTreeMap<u64, Vec<u64>>>,
}

impl LayerMetadata {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// One viewer layer, ready for display.
#[derive(Debug, Clone)]
pub struct Layer {
    pub data: LayerData,
    pub metadata: LayerMetadata,
    pub kind: LayerKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("FF0000"), Some([1.0, 0.0, 0.0]));
        assert_eq!(parse_hex_color("00FF00"), Some([0.0, 1.0, 0.0]));
        assert_eq!(parse_hex_color("bad"), None);
        assert_eq!(parse_hex_color("GGGGGG"), None);
    }

    #[test]
    fn test_channel_value_collapse() {
        assert_eq!(
            ChannelValue::from_values(vec![1, 2, 3], true),
            Some(ChannelValue::PerChannel(vec![1, 2, 3]))
        );
        assert_eq!(
            ChannelValue::from_values(vec![1, 2, 3], false),
            Some(ChannelValue::Single(1))
        );
        assert_eq!(ChannelValue::<i32>::from_values(vec![], false), None);
        assert_eq!(ChannelValue::<i32>::from_values(vec![], true), None);
    }
}
