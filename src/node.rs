use log::warn;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::inference::infer_image_metadata;
use crate::layer::{ColormapTable, LayerKind, LayerMetadata};
use crate::lazy::LazyArray;
use crate::metadata::{AxisModel, ImageLabelMeta, Multiscale, Omero, PlateMeta};
use crate::plate::plate_pyramid;
use crate::series::series_paths;
use crate::store::ZarrGroup;

const MARKER_MULTI_SERIES: &str = "bioformats2raw.layout";
const MARKER_PLATE: &str = "plate";
const MARKER_MULTISCALES: &str = "multiscales";
const MARKER_IMAGE_LABEL: &str = "image-label";
const MARKER_LABELS: &str = "labels";

/// Real hierarchies are at most a few levels deep; anything deeper means
/// the attributes describe a structure that cannot exist on disk.
const MAX_DEPTH: usize = 16;

/// The closed set of recognized group layouts.
///
/// Produced once per group by [`classify`]; each variant carries the
/// parsed attribute blocks its layout guarantees, so downstream code never
/// re-checks key presence.
#[derive(Debug, Clone)]
pub enum Layout {
    /// bioformats2raw layout: a data-less container of image series.
    MultiSeries,
    /// HCS plate of wells and fields, read as one stitched image.
    Plate(PlateMeta),
    /// Multiscale image additionally marked as a categorical label map.
    Label(MultiscaleImage),
    /// Plain multiscale image.
    Image(MultiscaleImage),
    /// A `labels` container group: data-less, children are label images.
    LabelsGroup(Vec<String>),
}

/// Parsed multiscale attributes with the axis model resolved up front.
#[derive(Debug, Clone)]
pub struct MultiscaleImage {
    /// First entry of the `multiscales` list; additional entries describe
    /// alternative downscalings and are not read.
    pub multiscale: Multiscale,
    pub axes: AxisModel,
    pub omero: Option<Omero>,
    pub channel_names: Option<Vec<String>>,
}

impl MultiscaleImage {
    pub fn from_attrs(attrs: &Map<String, Value>, path: &str) -> Result<Self> {
        let multiscales: Vec<Multiscale> = parse_attr(attrs, MARKER_MULTISCALES, path)?;
        let Some(multiscale) = multiscales.into_iter().next() else {
            return Err(Error::malformed(path, "empty `multiscales` list"));
        };
        if multiscale.datasets.is_empty() {
            return Err(Error::malformed(path, "multiscale has no datasets"));
        }
        let axes = AxisModel::from_entries(multiscale.axes.as_deref(), path)?;
        let omero = attrs
            .contains_key("omero")
            .then(|| parse_attr(attrs, "omero", path))
            .transpose()?;
        let channel_names = attrs
            .contains_key("channel_names")
            .then(|| parse_attr(attrs, "channel_names", path))
            .transpose()?;
        Ok(Self {
            multiscale,
            axes,
            omero,
            channel_names,
        })
    }
}

fn parse_attr<T: DeserializeOwned>(attrs: &Map<String, Value>, key: &str, path: &str) -> Result<T> {
    let Some(value) = attrs.get(key) else {
        return Err(Error::malformed(path, format!("missing `{key}`")));
    };
    serde_json::from_value(value.clone())
        .map_err(|e| Error::malformed(path, format!("invalid `{key}`: {e}")))
}

/// Marker-level check: does any recognized layout claim this group?
///
/// Used to decide whether a reader exists at all; the strict parse happens
/// in [`classify`] and fails loudly on a claimed-but-malformed layout.
pub fn is_recognized(attrs: &Map<String, Value>) -> bool {
    [
        MARKER_MULTI_SERIES,
        MARKER_PLATE,
        MARKER_MULTISCALES,
        MARKER_LABELS,
    ]
    .iter()
    .any(|key| attrs.contains_key(*key))
}

/// Match `group` against the recognized layouts, in precedence order.
///
/// `Ok(None)` means "not a layout I understand" and is not an error; a
/// matched layout whose attribute block does not parse is.
pub fn classify(group: &ZarrGroup) -> Result<Option<Layout>> {
    let attrs = group.ome_attrs();
    let path = group.path();

    let multi_series = attrs.contains_key(MARKER_MULTI_SERIES);
    let plate = attrs.contains_key(MARKER_PLATE);
    // The two markers should never coexist; if hand-edited attributes make
    // them do, the plate layout wins.
    if multi_series && plate {
        warn!("{path}: carries both {MARKER_MULTI_SERIES} and {MARKER_PLATE}; reading as plate");
    }
    if multi_series && !plate {
        return Ok(Some(Layout::MultiSeries));
    }
    if plate {
        return Ok(Some(Layout::Plate(parse_attr(attrs, MARKER_PLATE, path)?)));
    }
    if attrs.contains_key(MARKER_MULTISCALES) {
        let image = MultiscaleImage::from_attrs(attrs, path)?;
        if attrs.contains_key(MARKER_IMAGE_LABEL) {
            let _marker: ImageLabelMeta = parse_attr(attrs, MARKER_IMAGE_LABEL, path)?;
            return Ok(Some(Layout::Label(image)));
        }
        return Ok(Some(Layout::Image(image)));
    }
    if attrs.contains_key(MARKER_LABELS) {
        return Ok(Some(Layout::LabelsGroup(parse_attr(
            attrs,
            MARKER_LABELS,
            path,
        )?)));
    }
    Ok(None)
}

/// One matched group in the node tree. Owns no state beyond its group
/// handle and parsed layout; lives for a single traversal.
#[derive(Debug, Clone)]
pub struct Node {
    pub group: ZarrGroup,
    pub layout: Layout,
}

impl Node {
    pub fn open(group: ZarrGroup) -> Result<Option<Self>> {
        Ok(classify(&group)?.map(|layout| Self { group, layout }))
    }

    /// Container nodes only structure the tree; they contribute no data
    /// row of their own.
    fn is_container(&self) -> bool {
        matches!(self.layout, Layout::MultiSeries | Layout::LabelsGroup(_))
    }

    pub fn layer_kind(&self) -> LayerKind {
        match self.layout {
            Layout::Label(_) => LayerKind::Labels,
            _ => LayerKind::Image,
        }
    }

    /// Child nodes, discovered from this node's layout.
    pub fn children(&self) -> Result<Vec<Self>> {
        match &self.layout {
            Layout::Image(_) => self.labels_children(),
            Layout::MultiSeries => self.series_children(),
            Layout::LabelsGroup(names) => self.named_label_children(names),
            Layout::Plate(_) | Layout::Label(_) => Ok(Vec::new()),
        }
    }

    /// A multiscale image may carry a child group literally named `labels`
    /// listing its label images. Its absence is normal.
    fn labels_children(&self) -> Result<Vec<Self>> {
        let Ok(labels_group) = self.group.child(MARKER_LABELS) else {
            return Ok(Vec::new());
        };
        match classify(&labels_group)? {
            Some(Layout::LabelsGroup(names)) => {
                let container = Self {
                    group: labels_group,
                    layout: Layout::LabelsGroup(names.clone()),
                };
                container.named_label_children(&names)
            }
            _ => Ok(Vec::new()),
        }
    }

    fn named_label_children(&self, names: &[String]) -> Result<Vec<Self>> {
        let mut children = Vec::with_capacity(names.len());
        for name in names {
            let group = self.group.child(name)?;
            if let Some(layout @ Layout::Label(_)) = classify(&group)? {
                children.push(Self { group, layout });
            }
        }
        Ok(children)
    }

    /// Series of a bioformats2raw container: paths from the embedded OME
    /// manifest, or consecutive numeric children when no manifest exists.
    fn series_children(&self) -> Result<Vec<Self>> {
        let Some(paths) = series_paths(&self.group)? else {
            return self.probed_series_children();
        };
        let mut children = Vec::with_capacity(paths.len());
        for path in &paths {
            let group = self.group.child(path)?;
            if let Some(layout @ Layout::Image(_)) = classify(&group)? {
                children.push(Self { group, layout });
            }
        }
        Ok(children)
    }

    fn probed_series_children(&self) -> Result<Vec<Self>> {
        let mut children = Vec::new();
        for index in 0usize.. {
            let Ok(group) = self.group.child(&index.to_string()) else {
                break;
            };
            match classify(&group)? {
                Some(layout @ Layout::Image(_)) => children.push(Self { group, layout }),
                _ => break,
            }
        }
        Ok(children)
    }

    /// Depth-first pre-order over this node and its descendants, skipping
    /// data-less container nodes.
    pub fn iter_nodes(&self) -> Result<Vec<Self>> {
        let mut nodes = Vec::new();
        self.collect_nodes(&mut nodes, 0)?;
        Ok(nodes)
    }

    fn collect_nodes(&self, nodes: &mut Vec<Self>, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(Error::structure(format!(
                "node tree deeper than {MAX_DEPTH} at {}",
                self.group.path()
            )));
        }
        if !self.is_container() {
            nodes.push(self.clone());
        }
        for child in self.children()? {
            child.collect_nodes(nodes, depth + 1)?;
        }
        Ok(())
    }

    /// The node's pyramid, resolution-decreasing, without reading chunks.
    pub fn data(&self) -> Result<Vec<LazyArray>> {
        match &self.layout {
            Layout::Image(image) => self.image_pyramid(image),
            Layout::Label(image) => self.label_pyramid(image),
            Layout::Plate(plate) => plate_pyramid(&self.group, plate, None),
            Layout::MultiSeries | Layout::LabelsGroup(_) => Ok(Vec::new()),
        }
    }

    fn image_pyramid(&self, image: &MultiscaleImage) -> Result<Vec<LazyArray>> {
        image
            .multiscale
            .datasets
            .iter()
            .map(|dataset| Ok(LazyArray::from(self.group.array(&dataset.path)?)))
            .collect()
    }

    /// Label pyramids drop a declared channel axis: a categorical label
    /// map has no channel dimension to display. Only a degenerate
    /// (length-1) axis can be dropped without losing data.
    fn label_pyramid(&self, image: &MultiscaleImage) -> Result<Vec<LazyArray>> {
        let pyramid = self.image_pyramid(image)?;
        let Some(first) = pyramid.first() else {
            return Ok(pyramid);
        };
        let Some(c) = image.axes.channel_axis(first.ndim()) else {
            return Ok(pyramid);
        };
        if first.shape()[c] > 1 {
            warn!(
                "{}: label image has a channel axis of length {}; keeping it",
                self.group.path(),
                first.shape()[c]
            );
            return Ok(pyramid);
        }
        pyramid
            .into_iter()
            .map(|level| level.select(c, 0))
            .collect()
    }

    /// Display metadata for this node, given its already-resolved data and
    /// the colour table to resolve well-known colormap names against.
    pub fn layer_metadata(
        &self,
        data: &[LazyArray],
        palette: &ColormapTable,
    ) -> Result<LayerMetadata> {
        match (&self.layout, data.first()) {
            (Layout::Image(image), Some(level0)) => {
                infer_image_metadata(image, &level0.shape(), palette, self.group.path())
            }
            // Labels carry categorical ids, not contrast or colormaps;
            // plates borrow the viewer's defaults.
            _ => Ok(LayerMetadata::default()),
        }
    }
}
