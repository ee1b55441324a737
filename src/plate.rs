use std::collections::HashSet;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::lazy::LazyArray;
use crate::metadata::{PlateMeta, WellMeta};
use crate::node::{Layout, classify};
use crate::store::ZarrGroup;

/// Stitch a plate's wells into one lazy pyramid, highest resolution first.
///
/// Every level is tiled independently from that level's own per-well
/// arrays (tile shapes differ between levels), with a zero-filled
/// placeholder wherever a well or field is absent: sparse plates render
/// with gaps rather than failing. Pass `labels_path` to stitch each well's
/// named label image instead of its intensity image.
///
/// All fields are assumed to share the shape and data type of the first
/// field of the first well.
pub fn plate_pyramid(
    group: &ZarrGroup,
    plate: &PlateMeta,
    labels_path: Option<&str>,
) -> Result<Vec<LazyArray>> {
    let path = group.path();
    let row_names: Vec<&str> = plate.rows.iter().map(|row| row.name.as_str()).collect();
    let column_names: Vec<&str> = plate.columns.iter().map(|col| col.name.as_str()).collect();
    if row_names.is_empty() || column_names.is_empty() {
        return Err(Error::malformed(path, "plate has no rows or no columns"));
    }

    let mut well_paths: Vec<String> = plate
        .wells
        .iter()
        .map(|well| well.path.trim_matches('/').to_string())
        .collect();
    well_paths.sort();
    let Some(first_well) = well_paths.first() else {
        return Err(Error::malformed(path, "plate has no wells"));
    };

    let well_group = group.child(first_well)?;
    let well: WellMeta = match well_group.ome_attrs().get("well") {
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| Error::malformed(well_group.path(), format!("invalid `well`: {e}")))?,
        None => return Err(Error::malformed(well_group.path(), "missing `well`")),
    };
    let Some(first_image) = well.images.first() else {
        return Err(Error::malformed(well_group.path(), "well has no images"));
    };
    let mut field_path = first_image.path.clone();
    if let Some(labels_path) = labels_path {
        field_path = format!("{field_path}/labels/{labels_path}");
    }

    let field_group = well_group.child(&field_path)?;
    let image = match classify(&field_group)? {
        Some(Layout::Image(image) | Layout::Label(image)) => image,
        _ => {
            return Err(Error::malformed(
                field_group.path(),
                "well field is not a multiscale image",
            ));
        }
    };

    let present: HashSet<&str> = well_paths.iter().map(String::as_str).collect();
    let mut pyramid = Vec::with_capacity(image.multiscale.datasets.len());
    for dataset in &image.multiscale.datasets {
        let level_path = dataset.path.as_str();
        // Reference tile for this level: shape and dtype for placeholders.
        let reference = field_group.array(level_path)?;
        let tile_shape = reference.shape().to_vec();
        let data_type = reference.data_type().clone();
        let rank = tile_shape.len();
        if rank < 2 {
            return Err(Error::malformed(
                field_group.path(),
                "plate tiles must be at least 2-dimensional",
            ));
        }

        let mut strips = Vec::with_capacity(row_names.len());
        for row in &row_names {
            let mut tiles = Vec::with_capacity(column_names.len());
            for column in &column_names {
                let well_path = format!("{row}/{column}");
                let tile = if present.contains(well_path.as_str()) {
                    let tile_path = format!("{well_path}/{field_path}/{level_path}");
                    match group.array(&tile_path) {
                        Ok(array) => LazyArray::from(array),
                        Err(e) => {
                            warn!("{path}: cannot open {tile_path}, using empty tile: {e}");
                            LazyArray::zeros(tile_shape.clone(), data_type.clone())
                        }
                    }
                } else {
                    debug!("{path}: no well at {well_path}, using empty tile");
                    LazyArray::zeros(tile_shape.clone(), data_type.clone())
                };
                tiles.push(tile);
            }
            strips.push(LazyArray::concat(tiles, rank - 1)?);
        }
        pyramid.push(LazyArray::concat(strips, rank - 2)?);
    }
    Ok(pyramid)
}
