use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// One entry of the `multiscales` attribute list.
///
/// Datasets are ordered largest (highest resolution) to smallest; output
/// pyramids preserve this order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Multiscale {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Absent before 0.3, bare names in 0.3, name/type records from 0.4.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axes: Option<Vec<AxisEntry>>,
    pub datasets: Vec<Dataset>,
    /// Applied after the per-dataset transformations.
    #[serde(
        rename = "coordinateTransformations",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub coordinate_transformations: Option<Vec<CoordinateTransformation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// An axis as serialized: a full record, or (0.3) just its name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisEntry {
    Record(Axis),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    /// `space`, `time`, or `channel`; other values are allowed and carry
    /// no display semantics.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub axis_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Axis {
    pub fn is_channel(&self) -> bool {
        self.axis_type.as_deref() == Some("channel")
    }
}

/// One pyramid level: a relative array path plus its transformations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub path: String,
    #[serde(
        rename = "coordinateTransformations",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub coordinate_transformations: Option<Vec<CoordinateTransformation>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CoordinateTransformation {
    Identity,
    Scale { scale: Vec<f64> },
    Translation { translation: Vec<f64> },
}

/// Legacy per-channel rendering block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Omero {
    #[serde(default)]
    pub channels: Vec<OmeroChannel>,
    /// Unstructured remainder (rdefs, id, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OmeroChannel {
    /// 6 hex digits, RGB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<ChannelWindow>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChannelWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// The `plate` attribute block of an HCS plate group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub rows: Vec<PlateIndexName>,
    pub columns: Vec<PlateIndexName>,
    pub wells: Vec<PlateWell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_count: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateIndexName {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateWell {
    /// `<row name>/<column name>` relative to the plate group.
    pub path: String,
    #[serde(rename = "rowIndex", default, skip_serializing_if = "Option::is_none")]
    pub row_index: Option<u64>,
    #[serde(
        rename = "columnIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub column_index: Option<u64>,
}

/// The `well` attribute block of a well group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellMeta {
    pub images: Vec<WellImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellImage {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquisition: Option<i64>,
}

/// Marker block distinguishing a label image from a plain multiscale image.
/// Its colour/property payload is not used for display metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageLabelMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// How a multiscale image encodes axis semantics, resolved once per node.
///
/// The three variants cover the format's history: explicit name/type
/// records, bare axis names, and the oldest layout with no axis metadata at
/// all where a 5-d `[t, c, z, y, x]` order is implied.
#[derive(Debug, Clone, PartialEq)]
pub enum AxisModel {
    Typed(Vec<Axis>),
    Named(Vec<String>),
    LegacyPositional,
}

/// Implied channel position of the legacy 5-d layout.
const LEGACY_CHANNEL_AXIS: usize = 1;
const LEGACY_RANK: usize = 5;

impl AxisModel {
    /// Resolve the serialized axis entries into one model.
    ///
    /// Mixed bare-name and record entries, or more than one channel axis,
    /// are rejected: a group claiming the multiscale layout must encode its
    /// axes consistently.
    pub fn from_entries(entries: Option<&[AxisEntry]>, path: &str) -> Result<Self> {
        let Some(entries) = entries else {
            return Ok(Self::LegacyPositional);
        };
        let mut names = Vec::new();
        let mut records = Vec::new();
        for entry in entries {
            match entry {
                AxisEntry::Name(name) => names.push(name.clone()),
                AxisEntry::Record(axis) => records.push(axis.clone()),
            }
        }
        let model = match (names.is_empty(), records.is_empty()) {
            (false, true) => Self::Named(names),
            (true, false) => Self::Typed(records),
            (true, true) => {
                return Err(Error::malformed(path, "empty `axes` list"));
            }
            (false, false) => {
                return Err(Error::malformed(
                    path,
                    "`axes` mixes bare names and records",
                ));
            }
        };
        if model.channel_axis_count() > 1 {
            return Err(Error::malformed(path, "more than one channel axis"));
        }
        Ok(model)
    }

    fn channel_axis_count(&self) -> usize {
        match self {
            Self::Typed(axes) => axes.iter().filter(|a| a.is_channel()).count(),
            Self::Named(names) => names.iter().filter(|n| n.as_str() == "c").count(),
            Self::LegacyPositional => 1,
        }
    }

    /// Number of axes the model describes, if it describes any.
    pub fn rank(&self) -> Option<usize> {
        match self {
            Self::Typed(axes) => Some(axes.len()),
            Self::Named(names) => Some(names.len()),
            Self::LegacyPositional => None,
        }
    }

    /// The axes list must describe every array dimension.
    pub fn validate_rank(&self, rank: usize, path: &str) -> Result<()> {
        match self.rank() {
            Some(len) if len != rank => Err(Error::malformed(
                path,
                format!("axes list has {len} entries but arrays have {rank} dimensions"),
            )),
            _ => Ok(()),
        }
    }

    /// Index of the channel axis as the axis metadata declares it,
    /// regardless of its length.
    ///
    /// The legacy layout only implies a channel position for rank-5 arrays;
    /// any other rank gets no channel axis rather than a guessed one.
    pub fn channel_axis(&self, rank: usize) -> Option<usize> {
        match self {
            Self::Typed(axes) => axes.iter().position(Axis::is_channel),
            Self::Named(names) => names.iter().position(|n| n == "c"),
            Self::LegacyPositional => (rank == LEGACY_RANK).then_some(LEGACY_CHANNEL_AXIS),
        }
    }
}
