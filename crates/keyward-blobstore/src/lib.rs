//! Raw byte-addressable blob storage for vault backups, keyed by filename
//! (`<public_key_ecdsa>.bak`). Writes land via a temp file and an atomic
//! rename so a reader never observes a partially-written backup.

mod error;
pub use error::BlobStoreError;

use std::path::{Path, PathBuf};

/// A filesystem-backed blob store rooted at a single directory.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Open a blob store rooted at `root`, creating the directory if it
    /// does not already exist.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, BlobStoreError> {
        let root = root.as_ref().to_owned();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    /// Read the full contents of `filename`.
    pub fn get_file(&self, filename: &str) -> Result<Vec<u8>, BlobStoreError> {
        let path = self.path_for(filename);
        std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BlobStoreError::NotFound(filename.to_string()),
            _ => BlobStoreError::Io(e),
        })
    }

    /// Write `contents` to `filename`, replacing any existing blob.
    ///
    /// Writes to `<filename>.tmp` in the same directory first, then
    /// renames into place, so a crash mid-write never leaves a partial
    /// blob at the real path.
    pub fn upload_file(&self, filename: &str, contents: &[u8]) -> Result<(), BlobStoreError> {
        let path = self.path_for(filename);
        let tmp = self.path_for(&format!("{filename}.tmp"));
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Remove `filename`. Not wired into any admission or worker path
    /// today (backups are never user-deletable) but kept for operator
    /// tooling and tests that need to reset fixture state.
    pub fn delete_file(&self, filename: &str) -> Result<(), BlobStoreError> {
        let path = self.path_for(filename);
        std::fs::remove_file(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BlobStoreError::NotFound(filename.to_string()),
            _ => BlobStoreError::Io(e),
        })
    }

    pub fn file_exists(&self, filename: &str) -> bool {
        self.path_for(filename).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn upload_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();

        store.upload_file("a".repeat(66).as_str(), b"backup-bytes").unwrap();
        let key = "a".repeat(66);
        assert!(store.file_exists(&key));
        assert_eq!(store.get_file(&key).unwrap(), b"backup-bytes");
    }

    #[test]
    fn missing_blob_is_not_found() {
        let dir = tempdir().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        let err = store.get_file("missing.bak").unwrap_err();
        assert!(matches!(err, BlobStoreError::NotFound(_)));
    }

    #[test]
    fn upload_overwrites_existing_blob() {
        let dir = tempdir().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        store.upload_file("k.bak", b"first").unwrap();
        store.upload_file("k.bak", b"second").unwrap();
        assert_eq!(store.get_file("k.bak").unwrap(), b"second");
    }

    #[test]
    fn no_stray_tmp_file_after_successful_upload() {
        let dir = tempdir().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        store.upload_file("k.bak", b"data").unwrap();
        assert!(!dir.path().join("k.bak.tmp").exists());
    }

    #[test]
    fn delete_removes_blob() {
        let dir = tempdir().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        store.upload_file("k.bak", b"data").unwrap();
        store.delete_file("k.bak").unwrap();
        assert!(!store.file_exists("k.bak"));
    }

    #[test]
    fn open_creates_missing_root_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("vaults");
        let store = BlobStore::open(&nested).unwrap();
        store.upload_file("k.bak", b"x").unwrap();
        assert!(nested.is_dir());
    }
}
