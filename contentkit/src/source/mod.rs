// Source cache - loaded files per path, reused across passes

use crate::error::LoadError;
use crate::loader::{LoaderRegistry, RawRecord};
use crate::util::lock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    Unloaded,
    /// Bytes read, not parsed yet
    Loaded,
    Parsed,
    Failed(LoadError),
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
    pub len: u64,
    pub bytes: Vec<u8>,
    pub records: Vec<RawRecord>,
    /// The file holds several entries (array or multi-document)
    pub multi: bool,
    pub status: FileStatus,
}

impl SourceFile {
    pub fn unloaded(path: &Path) -> Self {
        SourceFile {
            path: path.to_path_buf(),
            modified: None,
            len: 0,
            bytes: Vec::new(),
            records: Vec::new(),
            multi: false,
            status: FileStatus::Unloaded,
        }
    }

    pub fn error(&self) -> Option<&LoadError> {
        match &self.status {
            FileStatus::Failed(e) => Some(e),
            _ => None,
        }
    }

    fn is_settled(&self) -> bool {
        matches!(self.status, FileStatus::Parsed | FileStatus::Failed(_))
    }

    fn parse(mut self, loaders: &LoaderRegistry) -> Self {
        match loaders.load(&self.bytes, &self.path) {
            Ok(loaded) => {
                let (records, multi) = loaded.into_records();
                self.records = records;
                self.multi = multi;
                self.status = FileStatus::Parsed;
            }
            Err(e) => {
                self.records.clear();
                self.status = FileStatus::Failed(e);
            }
        }
        self
    }
}

#[derive(Debug, Default)]
pub struct SourceCache {
    files: Mutex<HashMap<PathBuf, Arc<SourceFile>>>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the parsed file, reading it again only when its size or
    /// modification time changed since the cached snapshot.
    pub async fn load(&self, path: &Path, loaders: &LoaderRegistry) -> Arc<SourceFile> {
        let metadata = tokio::fs::metadata(path).await.ok();
        let modified = metadata.as_ref().and_then(|m| m.modified().ok());
        let len = metadata.as_ref().map(|m| m.len()).unwrap_or(0);

        if let Some(cached) = self.get(path) {
            if cached.is_settled() && cached.modified == modified && cached.len == len && modified.is_some() {
                log::trace!("Source cache hit: {}", path.display());
                return cached;
            }
        }

        let mut file = SourceFile::unloaded(path);
        file.modified = modified;
        file.len = len;
        let file = match tokio::fs::read(path).await {
            Ok(bytes) => {
                file.bytes = bytes;
                file.status = FileStatus::Loaded;
                file.parse(loaders)
            }
            Err(e) => {
                file.status = FileStatus::Failed(LoadError::Read {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
                file
            }
        };

        if let Some(e) = file.error() {
            log::warn!("{e}");
        }

        let file = Arc::new(file);
        lock(&self.files).insert(path.to_path_buf(), Arc::clone(&file));
        file
    }

    pub fn get(&self, path: &Path) -> Option<Arc<SourceFile>> {
        lock(&self.files).get(path).cloned()
    }

    /// Drop the cached snapshot so the next load re-reads the file
    pub fn invalidate(&self, path: &Path) -> bool {
        lock(&self.files).remove(path).is_some()
    }

    pub fn clear(&self) {
        lock(&self.files).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.files).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
