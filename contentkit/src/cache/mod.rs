use crate::resolver::CollectionResult;
use crate::util::lock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct IncrementalCache {
    results: Mutex<HashMap<String, CollectionResult>>,
    emitted: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl IncrementalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self, collection: &str) -> Option<CollectionResult> {
        lock(&self.results).get(collection).cloned()
    }

    pub fn store(&self, result: CollectionResult) {
        lock(&self.results).insert(result.name.clone(), result);
    }

    pub fn forget(&self, collection: &str) {
        lock(&self.results).remove(collection);
    }

    /// Whether `bytes` differ from what was last emitted to `path`.
    /// A path never emitted by this process is compared against the file on disk.
    pub async fn should_write(&self, path: &Path, bytes: &[u8]) -> bool {
        if let Some(last) = lock(&self.emitted).get(path) {
            return last.as_slice() != bytes;
        }
        match tokio::fs::read(path).await {
            Ok(existing) if existing == bytes => {
                lock(&self.emitted).insert(path.to_path_buf(), existing);
                false
            }
            _ => true,
        }
    }

    pub fn record_emitted(&self, path: &Path, bytes: Vec<u8>) {
        lock(&self.emitted).insert(path.to_path_buf(), bytes);
    }

    /// Forget emitted bytes, e.g. after the output directory was cleaned
    pub fn clear_emitted(&self) {
        lock(&self.emitted).clear();
    }

    pub fn clear(&self) {
        lock(&self.results).clear();
        self.clear_emitted();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::CollectionData;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_should_write_tracks_last_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("posts.json");
        let cache = IncrementalCache::new();

        assert!(cache.should_write(&path, b"[]").await);
        cache.record_emitted(&path, b"[]".to_vec());
        assert!(!cache.should_write(&path, b"[]").await);
        assert!(cache.should_write(&path, b"[1]").await);
    }

    #[tokio::test]
    async fn test_existing_identical_file_is_not_rewritten() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("posts.json");
        std::fs::write(&path, b"[]").unwrap();

        let cache = IncrementalCache::new();
        assert!(!cache.should_write(&path, b"[]").await);
        assert!(cache.should_write(&path, b"[2]").await);
    }

    #[test]
    fn test_results_store_and_forget() {
        let cache = IncrementalCache::new();
        cache.store(CollectionResult {
            name: "posts".into(),
            data: CollectionData::Many(vec![]),
            issues: vec![],
            files: vec![],
        });
        assert!(cache.previous("posts").is_some());
        cache.forget("posts");
        assert!(cache.previous("posts").is_none());
    }
}
