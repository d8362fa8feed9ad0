// src/storage.rs

use crate::error::{Error, Result};
use rand::{distributions::Alphanumeric, Rng};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// External artifact store boundary. The core hands over encoded bytes and
/// gets back a retrievable reference; it never retries and never inspects
/// the reference.
pub trait ArtifactStore {
    fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String>;
}

/// Filesystem-backed store for local runs. Artifacts get a random tag so
/// repeated runs over the same input never collide.
pub struct LocalArtifactStore {
    dir: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ArtifactStore for LocalArtifactStore {
    fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::Storage(e.to_string()))?;

        let path = self
            .dir
            .join(format!("{}_{}", random_tag(12), suggested_name));
        fs::write(&path, bytes).map_err(|e| Error::Storage(e.to_string()))?;

        info!("Stored artifact: {}", path.display());
        Ok(path.to_string_lossy().into_owned())
    }
}

fn random_tag(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_writes_bytes_at_returned_reference() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());

        let reference = store.store(b"artifact-bytes", "annotated.mp4").unwrap();
        assert_eq!(fs::read(&reference).unwrap(), b"artifact-bytes");
        assert!(reference.ends_with("annotated.mp4"));
    }

    #[test]
    fn test_store_generates_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());

        let a = store.store(b"a", "out.mp4").unwrap();
        let b = store.store(b"b", "out.mp4").unwrap();
        assert_ne!(a, b);
    }
}
