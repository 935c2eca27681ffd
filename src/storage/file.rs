//! File-backed persistence store: one file per key in a cache directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::CachePersistenceStore;
use crate::error::{GraphError, Result};

#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.bin"))
    }
}

impl CachePersistenceStore for FileCacheStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GraphError::storage(e)),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(GraphError::storage)?;
        // Write beside the target then rename over it.
        let tmp = self.dir.join(format!("{key}.bin.tmp"));
        fs::write(&tmp, value).map_err(GraphError::storage)?;
        fs::rename(&tmp, self.path_for(key)).map_err(GraphError::storage)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(GraphError::storage(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path().join("cache"));

        assert!(store.get("schema").unwrap().is_none());
        store.put("schema", b"v1").unwrap();
        store.put("schema", b"v2").unwrap();
        assert_eq!(store.get("schema").unwrap().as_deref(), Some(&b"v2"[..]));
        assert!(!store.dir().join("schema.bin.tmp").exists());

        assert!(store.delete("schema").unwrap());
        assert!(!store.delete("schema").unwrap());
    }

    #[test]
    fn test_survives_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        FileCacheStore::new(dir.path()).put("data", b"payload").unwrap();
        let reopened = FileCacheStore::new(dir.path());
        assert_eq!(reopened.get("data").unwrap().as_deref(), Some(&b"payload"[..]));
    }
}
