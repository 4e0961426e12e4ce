// Builder - resolve, report, strict check, hooks, emit

use crate::asset::AssetStats;
use crate::context::{BuildContext, BuildHooks, Prepared};
use crate::emit::{self, EmitSummary};
use crate::error::{ContentError, Result};
use crate::loader::Loader;
use crate::report;
use crate::resolver;
use crate::schema::parse_config;
use crate::validation::ValidationIssue;
use crate::watcher::{ChangeKind, ContentWatcher, WatchEvent, WatchFilter};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    /// Record count per collection
    pub records: BTreeMap<String, usize>,
    pub issues: Vec<ValidationIssue>,
    pub written: Vec<PathBuf>,
    pub unchanged: usize,
    /// The prepare hook suppressed output
    pub suppressed: bool,
    pub assets: AssetStats,
    pub recomputed: Vec<String>,
    pub skipped: Vec<String>,
    pub duration: Duration,
}

/// What a batch of file changes led to
#[derive(Debug)]
pub enum ChangeOutcome {
    Rebuilt(BuildSummary),
    /// Only generated or unrelated paths changed
    Ignored,
    /// The config file changed; the caller must reopen the builder
    ConfigChanged,
}

pub struct Builder {
    ctx: BuildContext,
    config_path: PathBuf,
}

impl Builder {
    /// Parse the config file and set up a fresh build context.
    /// Relative paths in the config resolve against its directory.
    pub fn open(config_path: &Path) -> Result<Self> {
        let config_path = config_path.canonicalize().map_err(|e| {
            ContentError::Config(format!("Cannot open {}: {e}", config_path.display()))
        })?;
        let config = parse_config(&config_path)?;
        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        log::debug!(
            "Loaded {} with {} collection(s)",
            config_path.display(),
            config.collections.len()
        );
        Ok(Builder {
            ctx: BuildContext::new(&root, config)?,
            config_path,
        })
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn BuildHooks>) -> Self {
        self.ctx.hooks = Some(hooks);
        self
    }

    /// Register a user loader; it takes priority over the built-ins
    pub fn register_loader(&mut self, loader: Arc<dyn Loader>) {
        self.ctx.loaders.register(loader);
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub async fn clean(&self) -> Result<()> {
        emit::clean(&self.ctx).await
    }

    /// Full pass over every collection
    pub async fn build(&self) -> Result<BuildSummary> {
        self.run(None).await
    }

    /// Incremental pass: collections the changed path cannot affect are reused
    pub async fn rebuild(&self, changed: &Path) -> Result<BuildSummary> {
        self.run(Some(changed)).await
    }

    pub async fn handle_change(&self, path: &Path, kind: ChangeKind) -> Result<ChangeOutcome> {
        self.handle_changes(&[WatchEvent {
            path: path.to_path_buf(),
            kind,
        }])
        .await
    }

    /// Invalidate every changed path, then run one pass: incremental for a
    /// single change, full for several.
    pub async fn handle_changes(&self, events: &[WatchEvent]) -> Result<ChangeOutcome> {
        if events.iter().any(|e| e.path == self.config_path) {
            return Ok(ChangeOutcome::ConfigChanged);
        }

        let relevant: Vec<&WatchEvent> = events
            .iter()
            .filter(|e| !self.ctx.is_generated(&e.path))
            .collect();
        for event in &relevant {
            log::debug!("{:?}: {}", event.kind, event.path.display());
            self.ctx.sources.invalidate(&event.path);
            self.ctx.assets.invalidate(&event.path);
        }

        let summary = match relevant.as_slice() {
            [] => return Ok(ChangeOutcome::Ignored),
            [single] => self.rebuild(&single.path).await?,
            _ => self.build().await?,
        };
        Ok(ChangeOutcome::Rebuilt(summary))
    }

    /// Watch the content tree and config file of this builder
    pub fn watch(&self) -> Result<ContentWatcher> {
        let filter = WatchFilter {
            content_root: self.ctx.content_root.clone(),
            config_path: self.config_path.clone(),
            generated: vec![self.ctx.output_dir.clone(), self.ctx.assets.dir().to_path_buf()],
        };
        Ok(ContentWatcher::start(filter)?)
    }

    async fn run(&self, changed: Option<&Path>) -> Result<BuildSummary> {
        let started = Instant::now();
        self.ctx.assets.reset_stats();

        let resolution = resolver::resolve(&self.ctx, changed).await?;
        report::log_collection_reports(resolution.collections.values());

        let issues: Vec<ValidationIssue> = resolution.issues().cloned().collect();
        if self.ctx.config.strict && !issues.is_empty() {
            return Err(ContentError::StrictIssues(issues.len()));
        }

        let mut data = resolution.data();
        let prepared = match &self.ctx.hooks {
            Some(hooks) => hooks
                .prepare(&mut data)
                .await
                .map_err(|message| ContentError::Hook {
                    hook: "prepare",
                    message,
                })?,
            None => Prepared::Emit,
        };

        let emitted = match prepared {
            Prepared::Emit => emit::emit(&self.ctx, &data).await?,
            Prepared::Skip => {
                log::info!("Output suppressed by prepare hook");
                EmitSummary::default()
            }
        };

        if let Some(hooks) = &self.ctx.hooks {
            hooks
                .complete(&data)
                .await
                .map_err(|message| ContentError::Hook {
                    hook: "complete",
                    message,
                })?;
        }

        Ok(BuildSummary {
            records: data.iter().map(|(name, d)| (name.clone(), d.len())).collect(),
            issues,
            written: emitted.written,
            unchanged: emitted.unchanged,
            suppressed: prepared == Prepared::Skip,
            assets: self.ctx.assets.stats(),
            recomputed: resolution.recomputed,
            skipped: resolution.skipped,
            duration: started.elapsed(),
        })
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("config_path", &self.config_path)
            .field("ctx", &self.ctx)
            .finish()
    }
}
