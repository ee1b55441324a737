mod error;
pub mod inference;
pub mod layer;
pub mod lazy;
pub mod metadata;
pub mod node;
pub mod plate;
pub mod reader;
mod series;
pub mod store;
pub mod tracks;

pub use zarrs;

pub use error::{Error, Result};
pub use inference::transpose_properties;
pub use layer::{
    ChannelValue, Colormap, ColormapTable, Layer, LayerData, LayerKind, LayerMetadata,
    PropertyTable,
};
pub use lazy::LazyArray;
pub use node::{Layout, MultiscaleImage, Node, classify};
pub use plate::plate_pyramid;
pub use reader::OmeZarrReader;
pub use tracks::{SparseAdjacency, Tracks, points_layer, reconstruct_tracks, tracks_layer};
