// Loader registry - user loaders first, then built-ins; first match wins

mod builtin;

pub use builtin::{JsonLoader, MarkdownLoader, TextLoader, YamlLoader};

use crate::error::LoadError;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// One logical entry produced by a loader, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub data: serde_json::Value,
    /// Document body for formats that carry one (Markdown, plain text)
    pub body: Option<String>,
}

impl RawRecord {
    pub fn data(data: serde_json::Value) -> Self {
        RawRecord { data, body: None }
    }
}

/// Result of loading one file: a single record or an ordered list
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    Single(RawRecord),
    Many(Vec<RawRecord>),
}

impl Loaded {
    /// Records in file order, plus whether the file is multi-entry
    pub fn into_records(self) -> (Vec<RawRecord>, bool) {
        match self {
            Loaded::Single(record) => (vec![record], false),
            Loaded::Many(records) => (records, true),
        }
    }

    /// JSON arrays and YAML sequences become one record per element
    pub fn from_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Array(items) => {
                Loaded::Many(items.into_iter().map(RawRecord::data).collect())
            }
            other => Loaded::Single(RawRecord::data(other)),
        }
    }
}

pub trait Loader: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this loader handles the given file
    fn test(&self, path: &Path) -> bool;

    fn load(&self, bytes: &[u8], path: &Path) -> Result<Loaded, LoadError>;
}

type LoadFn = dyn Fn(&[u8], &Path) -> Result<serde_json::Value, String> + Send + Sync;

/// A loader defined by a glob `test` pattern and a parse function.
///
/// Patterns without a `/` are matched against the file name, others against
/// every trailing run of path components (so `data/*.csv` matches
/// `/site/content/data/a.csv`).
pub struct PatternLoader {
    name: String,
    pattern: glob::Pattern,
    load: Box<LoadFn>,
}

impl PatternLoader {
    pub fn new<F>(name: &str, pattern: &str, load: F) -> crate::Result<Self>
    where
        F: Fn(&[u8], &Path) -> Result<serde_json::Value, String> + Send + Sync + 'static,
    {
        let pattern = glob::Pattern::new(pattern).map_err(|e| crate::ContentError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(PatternLoader {
            name: name.to_string(),
            pattern,
            load: Box::new(load),
        })
    }
}

impl Loader for PatternLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn test(&self, path: &Path) -> bool {
        if self.pattern.as_str().contains('/') {
            let components: Vec<_> = path.components().collect();
            (0..components.len()).any(|start| {
                let tail: std::path::PathBuf = components[start..].iter().collect();
                self.pattern.matches_path(&tail)
            })
        } else {
            path.file_name()
                .map(|name| self.pattern.matches(&name.to_string_lossy()))
                .unwrap_or(false)
        }
    }

    fn load(&self, bytes: &[u8], path: &Path) -> Result<Loaded, LoadError> {
        (self.load)(bytes, path)
            .map(Loaded::from_value)
            .map_err(|message| LoadError::Parse {
                path: path.to_path_buf(),
                message,
            })
    }
}

/// Ordered set of loaders
pub struct LoaderRegistry {
    user: Vec<Arc<dyn Loader>>,
    builtin: Vec<Arc<dyn Loader>>,
}

impl LoaderRegistry {
    /// Registry with the built-in Markdown, YAML, JSON and text loaders
    pub fn new() -> Self {
        LoaderRegistry {
            user: Vec::new(),
            builtin: vec![
                Arc::new(MarkdownLoader),
                Arc::new(YamlLoader),
                Arc::new(JsonLoader),
                Arc::new(TextLoader),
            ],
        }
    }

    /// Registry without built-ins
    pub fn empty() -> Self {
        LoaderRegistry {
            user: Vec::new(),
            builtin: Vec::new(),
        }
    }

    /// Register a user loader. It takes priority over every loader registered before it.
    pub fn register(&mut self, loader: Arc<dyn Loader>) {
        self.user.insert(0, loader);
    }

    pub fn resolve(&self, path: &Path) -> Option<Arc<dyn Loader>> {
        self.user
            .iter()
            .chain(self.builtin.iter())
            .find(|loader| loader.test(path))
            .cloned()
    }

    pub fn load(&self, bytes: &[u8], path: &Path) -> Result<Loaded, LoadError> {
        let loader = self
            .resolve(path)
            .ok_or_else(|| LoadError::NoLoader(path.to_path_buf()))?;
        log::trace!("Loading {} with '{}' loader", path.display(), loader.name());
        loader.load(bytes, path)
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .user
            .iter()
            .chain(self.builtin.iter())
            .map(|l| l.name())
            .collect();
        f.debug_struct("LoaderRegistry").field("loaders", &names).finish()
    }
}
