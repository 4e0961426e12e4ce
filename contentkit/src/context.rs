use crate::asset::AssetPipeline;
use crate::cache::IncrementalCache;
use crate::error::Result;
use crate::loader::LoaderRegistry;
use crate::resolver::CollectionData;
use crate::schema::BuildConfig;
use crate::source::SourceCache;
use crate::uniqueness::UniquenessRegistry;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of the prepare hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prepared {
    Emit,
    /// Suppress output for this pass
    Skip,
}

/// User hooks around emission. Errors abort the pass with `ContentError::Hook`.
#[async_trait]
pub trait BuildHooks: Send + Sync {
    /// Runs after aggregation; may mutate the collections in place
    async fn prepare(
        &self,
        _collections: &mut BTreeMap<String, CollectionData>,
    ) -> std::result::Result<Prepared, String> {
        Ok(Prepared::Emit)
    }

    /// Runs after emission, also when `prepare` skipped it
    async fn complete(
        &self,
        _collections: &BTreeMap<String, CollectionData>,
    ) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Everything one build invocation shares: configuration and the
/// process-wide registries. Constructed per build, never global.
pub struct BuildContext {
    /// Directory holding the config file; relative config paths resolve here
    pub root: PathBuf,
    pub content_root: PathBuf,
    pub output_dir: PathBuf,
    pub config: BuildConfig,
    pub loaders: LoaderRegistry,
    pub sources: SourceCache,
    pub assets: AssetPipeline,
    pub uniqueness: UniquenessRegistry,
    pub cache: IncrementalCache,
    pub hooks: Option<Arc<dyn BuildHooks>>,
}

impl BuildContext {
    pub fn new(root: &Path, config: BuildConfig) -> Result<Self> {
        Ok(BuildContext {
            root: root.to_path_buf(),
            content_root: root.join(&config.content),
            output_dir: root.join(&config.output),
            assets: AssetPipeline::new(&config.assets, root)?,
            config,
            loaders: LoaderRegistry::new(),
            sources: SourceCache::new(),
            uniqueness: UniquenessRegistry::new(),
            cache: IncrementalCache::new(),
            hooks: None,
        })
    }

    pub fn with_loaders(mut self, loaders: LoaderRegistry) -> Self {
        self.loaders = loaders;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn BuildHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Whether a path lies in a directory the build writes to
    pub fn is_generated(&self, path: &Path) -> bool {
        path.starts_with(&self.output_dir) || path.starts_with(self.assets.dir())
    }
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("root", &self.root)
            .field("content_root", &self.content_root)
            .field("output_dir", &self.output_dir)
            .field("collections", &self.config.collections.keys().collect::<Vec<_>>())
            .field("loaders", &self.loaders)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}
