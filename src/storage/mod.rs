use std::sync::Arc;

use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;

use crate::error::Result;

/// Thin wrapper over `object_store`, giving the rest of the crate a narrow
/// put/get/delete surface instead of the full `ObjectStore` trait.
#[derive(Clone)]
pub struct BlobStore {
    store: Arc<dyn ObjectStore>,
}

impl BlobStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub async fn put(&self, path: &str, data: Vec<u8>) -> Result<()> {
        self.store.put(&ObjectPath::from(path), Bytes::from(data).into()).await?;
        Ok(())
    }

    pub async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let result = self.store.get(&ObjectPath::from(path)).await?;
        let bytes = result.bytes().await?;
        Ok(bytes.to_vec())
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.store.delete(&ObjectPath::from(path)).await?;
        Ok(())
    }

    pub async fn size(&self, path: &str) -> Result<u64> {
        let meta = self.store.head(&ObjectPath::from(path)).await?;
        Ok(meta.size as u64)
    }
}

/// Builds a `BlobStore` from a URL like `s3://bucket/prefix`, `az://container`,
/// `gs://bucket`, or `file:///var/lib/dbbackup`.
pub fn build_blob_store(url: &str) -> Result<BlobStore> {
    let (store, _path) = object_store::parse_url(&url::Url::parse(url).map_err(|e| {
        crate::error::Error::InvalidConfig(format!("invalid OBJECT_STORE_URL '{url}': {e}"))
    })?)?;
    Ok(BlobStore::new(Arc::from(store)))
}
