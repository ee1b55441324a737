use std::collections::{BTreeMap, BTreeSet};

use log::warn;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::layer::{
    ChannelValue, Colormap, ColormapTable, LayerMetadata, PropertyTable, parse_hex_color,
};
use crate::metadata::CoordinateTransformation;
use crate::node::MultiscaleImage;

/// Map a multiscale image's attributes onto viewer display metadata.
///
/// The channel axis declared by the axis model only takes effect when its
/// length exceeds one; a length-1 channel axis collapses every per-channel
/// value to a bare scalar, and an absent value omits the key entirely.
pub fn infer_image_metadata(
    image: &MultiscaleImage,
    level0_shape: &[u64],
    palette: &ColormapTable,
    path: &str,
) -> Result<LayerMetadata> {
    let rank = level0_shape.len();
    image.axes.validate_rank(rank, path)?;
    let structural = image.axes.channel_axis(rank);
    let effective = structural.filter(|&c| level0_shape[c] > 1);

    let mut metadata = LayerMetadata {
        channel_axis: effective,
        ..Default::default()
    };

    // Only the highest-resolution dataset's transformations reach the
    // output; coarser levels describe the same scene.
    if let Some(transforms) = &image.multiscale.datasets[0].coordinate_transformations {
        for transform in transforms {
            match transform {
                CoordinateTransformation::Scale { scale } => {
                    metadata.scale = Some(strip_channel(scale, effective, rank, path)?);
                }
                CoordinateTransformation::Translation { translation } => {
                    metadata.translate = Some(strip_channel(translation, effective, rank, path)?);
                }
                CoordinateTransformation::Identity => {}
            }
        }
    }

    let Some(omero) = &image.omero else {
        return Ok(metadata);
    };

    let mut names = Vec::with_capacity(omero.channels.len());
    let mut colormaps = Vec::with_capacity(omero.channels.len());
    let mut visibles = Vec::with_capacity(omero.channels.len());
    // All-or-nothing: one incomplete window suppresses contrast limits for
    // the whole node.
    let mut windows = Some(Vec::with_capacity(omero.channels.len()));

    for (index, channel) in omero.channels.iter().enumerate() {
        names.push(
            channel
                .label
                .clone()
                .unwrap_or_else(|| index.to_string()),
        );
        let colormap = match &channel.color {
            Some(color) => {
                let rgb = parse_hex_color(color).ok_or_else(|| {
                    Error::malformed(path, format!("invalid omero channel color {color:?}"))
                })?;
                match palette.name_for(rgb) {
                    Some(name) => Colormap::named(name, rgb),
                    None => Colormap::two_stop(rgb),
                }
            }
            None => Colormap::gray(),
        };
        colormaps.push(colormap);
        visibles.push(channel.active.unwrap_or(true));
        let window = channel.window.as_ref().and_then(|w| w.start.zip(w.end));
        match window {
            Some((start, end)) => {
                if let Some(limits) = windows.as_mut() {
                    limits.push([start, end]);
                }
            }
            None => windows = None,
        }
    }

    if let Some(overrides) = &image.channel_names {
        for (name, replacement) in names.iter_mut().zip(overrides) {
            *name = replacement.clone();
        }
    }

    if let Some(c) = effective
        && omero.channels.len() != level0_shape[c] as usize
    {
        warn!(
            "{path}: {} omero channels but channel axis has length {}",
            omero.channels.len(),
            level0_shape[c]
        );
    }

    let per_channel = effective.is_some();
    metadata.name = ChannelValue::from_values(names, per_channel);
    metadata.colormap = ChannelValue::from_values(colormaps, per_channel);
    metadata.visible = ChannelValue::from_values(visibles, per_channel);
    metadata.contrast_limits =
        windows.and_then(|limits| ChannelValue::from_values(limits, per_channel));

    Ok(metadata)
}

/// Validate a per-axis transform vector and drop its channel entry when a
/// channel axis is emitted: the viewer splits channels off into separate
/// layers, so transforms describe the remaining axes only.
fn strip_channel(
    vector: &[f64],
    channel_axis: Option<usize>,
    rank: usize,
    path: &str,
) -> Result<Vec<f64>> {
    if vector.len() != rank {
        return Err(Error::malformed(
            path,
            format!(
                "transformation has {} entries but arrays have {rank} dimensions",
                vector.len()
            ),
        ));
    }
    let mut out = vector.to_vec();
    if let Some(c) = channel_axis {
        out.remove(c);
    }
    Ok(out)
}

/// Transpose per-object properties from `{object id -> {field -> value}}`
/// into columns of equal length, plus a synthesized `index` column of the
/// object ids in iteration order. A field missing for some object is filled
/// with an explicit null, never dropped.
pub fn transpose_properties(objects: &BTreeMap<i64, Map<String, Value>>) -> PropertyTable {
    let fields: BTreeSet<&str> = objects
        .values()
        .flat_map(|fields| fields.keys().map(String::as_str))
        .collect();

    let mut table: PropertyTable = BTreeMap::new();
    for field in &fields {
        let column = objects
            .values()
            .map(|fields| fields.get(*field).cloned().unwrap_or(Value::Null))
            .collect();
        table.insert((*field).to_string(), column);
    }
    table.insert(
        "index".to_string(),
        objects.keys().map(|&id| Value::from(id)).collect(),
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::MultiscaleImage;

    fn multiscale_image(attrs: serde_json::Value) -> MultiscaleImage {
        let attrs: Map<String, Value> = serde_json::from_value(attrs).unwrap();
        MultiscaleImage::from_attrs(&attrs, "/test").unwrap()
    }

    fn typed_image(omero: serde_json::Value) -> MultiscaleImage {
        multiscale_image(serde_json::json!({
            "multiscales": [{
                "axes": [
                    {"name": "c", "type": "channel"},
                    {"name": "y", "type": "space"},
                    {"name": "x", "type": "space"},
                ],
                "datasets": [
                    {"path": "0", "coordinateTransformations": [
                        {"type": "scale", "scale": [1.0, 0.5, 0.5]},
                    ]},
                    {"path": "1"},
                ],
            }],
            "omero": omero,
        }))
    }

    fn rgb_omero() -> serde_json::Value {
        serde_json::json!({"channels": [
            {"color": "FF0000", "label": "Red", "window": {"start": 0.0, "end": 255.0}},
            {"color": "00FF00", "label": "Green", "window": {"start": 0.0, "end": 255.0}},
            {"color": "0000FF", "label": "Blue", "window": {"start": 0.0, "end": 255.0}},
        ]})
    }

    #[test]
    fn test_multi_channel_metadata_is_per_channel() {
        let image = typed_image(rgb_omero());
        let md = infer_image_metadata(&image, &[3, 16, 16], &ColormapTable::with_defaults(), "/test").unwrap();
        assert_eq!(md.channel_axis, Some(0));
        assert_eq!(
            md.name,
            Some(ChannelValue::PerChannel(vec![
                "Red".into(),
                "Green".into(),
                "Blue".into(),
            ]))
        );
        assert_eq!(
            md.contrast_limits,
            Some(ChannelValue::PerChannel(vec![[0.0, 255.0]; 3]))
        );
        assert_eq!(
            md.visible,
            Some(ChannelValue::PerChannel(vec![true; 3]))
        );
        // channel entry stripped from the scale vector
        assert_eq!(md.scale, Some(vec![0.5, 0.5]));
    }

    #[test]
    fn test_length_one_channel_axis_collapses() {
        let image = typed_image(serde_json::json!({"channels": [
            {"label": "only", "window": {"start": 0.0, "end": 10.0}},
        ]}));
        let md = infer_image_metadata(&image, &[1, 16, 16], &ColormapTable::with_defaults(), "/test").unwrap();
        assert_eq!(md.channel_axis, None);
        assert_eq!(md.name, Some(ChannelValue::Single("only".into())));
        assert_eq!(
            md.contrast_limits,
            Some(ChannelValue::Single([0.0, 10.0]))
        );
        // no channel axis emitted, so the full-rank scale is kept
        assert_eq!(md.scale, Some(vec![1.0, 0.5, 0.5]));
    }

    #[test]
    fn test_contrast_limits_all_or_nothing() {
        let image = typed_image(serde_json::json!({"channels": [
            {"label": "a", "window": {"start": 0.0, "end": 255.0}},
            {"label": "b", "window": {"start": 0.0}},
        ]}));
        let md = infer_image_metadata(&image, &[2, 16, 16], &ColormapTable::with_defaults(), "/test").unwrap();
        assert_eq!(md.contrast_limits, None);
        // the other per-channel values are unaffected
        assert_eq!(
            md.name,
            Some(ChannelValue::PerChannel(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn test_unnamed_channels_fall_back_to_indices() {
        let image = typed_image(serde_json::json!({"channels": [{}, {}]}));
        let md = infer_image_metadata(&image, &[2, 16, 16], &ColormapTable::with_defaults(), "/test").unwrap();
        assert_eq!(
            md.name,
            Some(ChannelValue::PerChannel(vec!["0".into(), "1".into()]))
        );
        assert_eq!(md.contrast_limits, None);
    }

    #[test]
    fn test_channel_names_override() {
        let mut image = typed_image(rgb_omero());
        image.channel_names = Some(vec!["r".into(), "g".into(), "b".into()]);
        let md = infer_image_metadata(&image, &[3, 16, 16], &ColormapTable::with_defaults(), "/test").unwrap();
        assert_eq!(
            md.name,
            Some(ChannelValue::PerChannel(vec![
                "r".into(),
                "g".into(),
                "b".into(),
            ]))
        );
    }

    #[test]
    fn test_well_known_colors_get_named_colormaps() {
        let image = typed_image(serde_json::json!({"channels": [
            {"color": "FF0000"},
            {"color": "123456"},
            {},
        ]}));
        let md = infer_image_metadata(
            &image,
            &[3, 16, 16],
            &ColormapTable::with_defaults(),
            "/test",
        )
        .unwrap();
        let Some(ChannelValue::PerChannel(colormaps)) = md.colormap else {
            panic!("expected per-channel colormaps");
        };
        assert_eq!(colormaps[0], Colormap::named("red", [1.0, 0.0, 0.0]));
        assert_eq!(colormaps[1].name, None);
        assert_eq!(colormaps[2], Colormap::gray());
    }

    #[test]
    fn test_no_omero_no_channel_values() {
        let image = multiscale_image(serde_json::json!({
            "multiscales": [{
                "axes": [
                    {"name": "c", "type": "channel"},
                    {"name": "y", "type": "space"},
                    {"name": "x", "type": "space"},
                ],
                "datasets": [{"path": "0"}],
            }],
        }));
        let md = infer_image_metadata(&image, &[4, 8, 8], &ColormapTable::with_defaults(), "/test").unwrap();
        assert_eq!(md.channel_axis, Some(0));
        assert_eq!(md.name, None);
        assert_eq!(md.colormap, None);
    }

    #[test]
    fn test_axes_rank_mismatch_is_loud() {
        let image = typed_image(rgb_omero());
        assert!(infer_image_metadata(&image, &[3, 16], &ColormapTable::with_defaults(), "/test").is_err());
    }

    #[test]
    fn test_invalid_color_is_loud() {
        let image = typed_image(serde_json::json!({"channels": [{"color": "nothex"}]}));
        assert!(infer_image_metadata(&image, &[2, 16, 16], &ColormapTable::with_defaults(), "/test").is_err());
    }

    #[test]
    fn test_transpose_properties_fills_missing() {
        let mut objects: BTreeMap<i64, Map<String, Value>> = BTreeMap::new();
        objects.insert(1, serde_json::from_value(serde_json::json!({"a": 10})).unwrap());
        objects.insert(
            2,
            serde_json::from_value(serde_json::json!({"a": 20, "b": 1})).unwrap(),
        );
        let table = transpose_properties(&objects);
        assert_eq!(table["index"], vec![Value::from(1), Value::from(2)]);
        assert_eq!(table["a"], vec![Value::from(10), Value::from(20)]);
        assert_eq!(table["b"], vec![Value::Null, Value::from(1)]);
        assert!(table.values().all(|column| column.len() == 2));
    }
}
