use log::{debug, warn};

use crate::error::{Error, Result};
use crate::layer::{ColormapTable, Layer, LayerData};
use crate::node::{Node, is_recognized};
use crate::store::{ZarrGroup, open_store};

/// A reader for one recognized OME-NGFF location.
///
/// [`OmeZarrReader::find`] absorbs every way a location can fail to be an
/// OME-NGFF hierarchy and returns `None`, so callers can try another
/// reader. [`OmeZarrReader::read`] fails loudly instead: by then the
/// location has claimed a layout it must conform to.
#[derive(Debug, Clone)]
pub struct OmeZarrReader {
    root: ZarrGroup,
}

impl OmeZarrReader {
    /// Probe `paths` for a recognized hierarchy.
    ///
    /// Only a single location is supported; extra entries are ignored with
    /// a warning.
    pub fn find<S: AsRef<str>>(paths: &[S]) -> Option<Self> {
        if paths.len() > 1 {
            warn!("more than one path is not supported; using the first");
        }
        let location = paths.first()?.as_ref();
        let storage = match open_store(location) {
            Ok(storage) => storage,
            Err(e) => {
                debug!("cannot open store at {location}: {e}");
                return None;
            }
        };
        let root = match ZarrGroup::open(storage, "/") {
            Ok(root) => root,
            Err(e) => {
                debug!("cannot open root group at {location}: {e}");
                return None;
            }
        };
        if !is_recognized(root.ome_attrs()) {
            debug!("{location}: no recognized layout");
            return None;
        }
        Some(Self { root })
    }

    pub fn root_path(&self) -> &str {
        self.root.path()
    }

    /// Walk the hierarchy and assemble its layers in traversal order.
    pub fn read(&self) -> Result<Vec<Layer>> {
        self.read_with_palette(&ColormapTable::with_defaults())
    }

    /// As [`OmeZarrReader::read`], resolving colormap names against a
    /// caller-supplied colour table.
    pub fn read_with_palette(&self, palette: &ColormapTable) -> Result<Vec<Layer>> {
        let Some(root) = Node::open(self.root.clone())? else {
            // find() saw a marker, so classification cannot miss.
            return Err(Error::structure(format!(
                "{}: layout marker disappeared between find and read",
                self.root.path()
            )));
        };
        let mut layers = Vec::new();
        for node in root.iter_nodes()? {
            let data = node.data()?;
            if data.is_empty() {
                debug!("skipping non-data node {}", node.group.path());
                continue;
            }
            let metadata = node.layer_metadata(&data, palette)?;
            layers.push(Layer {
                data: LayerData::Pyramid(data),
                metadata,
                kind: node.layer_kind(),
            });
        }
        Ok(layers)
    }
}
