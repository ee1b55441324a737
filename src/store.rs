use std::sync::Arc;

use serde_json::{Map, Value};
use zarrs::array::Array;
use zarrs::group::Group;
use zarrs::storage::{ReadableStorage, ReadableStorageTraits, StoreKey};

use crate::error::{Error, Result};

/// An opened array handle. Opening reads metadata only; chunk contents stay
/// on the store until a consumer materializes them.
pub type SourceArray = Arc<Array<dyn ReadableStorageTraits>>;

/// Open the storage backing `location`.
///
/// A filesystem path by default; with the `http` feature, `http(s)://`
/// locations are opened read-only over HTTP.
pub fn open_store(location: &str) -> Result<ReadableStorage> {
    #[cfg(feature = "http")]
    if location.starts_with("http://") || location.starts_with("https://") {
        let store = zarrs_http::HTTPStore::new(location).map_err(Error::wrap)?;
        return Ok(Arc::new(store));
    }
    let store = zarrs::filesystem::FilesystemStore::new(location).map_err(Error::wrap)?;
    Ok(Arc::new(store))
}

/// A named, attributed node in the backing hierarchy.
///
/// Read-only: this crate never mutates the store. The attribute bag is read
/// once at open time.
#[derive(Clone)]
pub struct ZarrGroup {
    storage: ReadableStorage,
    path: String,
    attributes: Map<String, Value>,
}

impl std::fmt::Debug for ZarrGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZarrGroup")
            .field("path", &self.path)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

impl ZarrGroup {
    /// Build a handle from an already-known attribute bag. Test scaffolding
    /// for layouts that never touch array data.
    #[cfg(test)]
    pub(crate) fn with_attributes(
        storage: ReadableStorage,
        path: String,
        attributes: Map<String, Value>,
    ) -> Self {
        Self {
            storage,
            path,
            attributes,
        }
    }

    pub fn open(storage: ReadableStorage, path: &str) -> Result<Self> {
        let group = Group::open(storage.clone(), path)?;
        let attributes = group.attributes().clone();
        Ok(Self {
            storage,
            path: path.to_string(),
            attributes,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn storage(&self) -> &ReadableStorage {
        &self.storage
    }

    /// The raw attribute bag, as stored.
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// The OME attribute block.
    ///
    /// NGFF >= 0.5 nests it under the reserved `"ome"` key; earlier versions
    /// store it flat. The nested location wins when present; the two are
    /// never merged.
    pub fn ome_attrs(&self) -> &Map<String, Value> {
        match self.attributes.get("ome") {
            Some(Value::Object(nested)) => nested,
            _ => &self.attributes,
        }
    }

    /// Node path of a child, handling the root's leading slash.
    pub fn child_path(&self, name: &str) -> String {
        if self.path == "/" {
            format!("/{name}")
        } else {
            format!("{}/{name}", self.path)
        }
    }

    /// Open a child group. `name` may be a nested relative path such as
    /// `"A/1"`.
    pub fn child(&self, name: &str) -> Result<ZarrGroup> {
        Self::open(self.storage.clone(), &self.child_path(name))
    }

    /// Open a child array without reading any chunk data.
    pub fn array(&self, name: &str) -> Result<SourceArray> {
        let array = Array::open(self.storage.clone(), &self.child_path(name))?;
        Ok(Arc::new(array))
    }

    /// Fetch a raw object stored under this group, e.g. an embedded
    /// metadata document that is not itself a zarr node.
    pub fn raw_bytes(&self, relative_key: &str) -> Result<Option<Vec<u8>>> {
        let prefix = self.path.trim_start_matches('/');
        let key_str = if prefix.is_empty() {
            relative_key.to_string()
        } else {
            format!("{prefix}/{relative_key}")
        };
        let key = StoreKey::new(key_str).map_err(Error::wrap)?;
        Ok(self.storage.get(&key)?.map(|bytes| bytes.to_vec()))
    }
}
