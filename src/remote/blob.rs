use super::store::StoreError;

/// The external file/blob storage service (profile photos)
pub trait BlobStore {
    /// Upload bytes to `path` and return a public download URL.
    fn upload(&self, path: &str, bytes: &[u8]) -> Result<String, StoreError>;
}
