use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

const DEBOUNCE: Duration = Duration::from_millis(100);

/// A debounced change, ready for the builder to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// The kind of file change detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// Which paths are worth a rebuild: anything under the content root plus
/// the config file, minus the directories the build itself writes to.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    pub content_root: PathBuf,
    pub config_path: PathBuf,
    pub generated: Vec<PathBuf>,
}

impl WatchFilter {
    pub fn accepts(&self, path: &Path) -> bool {
        if path == self.config_path {
            return true;
        }
        if self.generated.iter().any(|dir| path.starts_with(dir)) {
            return false;
        }
        // editor swap and backup files
        let hidden = path
            .file_name()
            .map(|n| {
                let n = n.to_string_lossy();
                n.starts_with('.') || n.ends_with('~')
            })
            .unwrap_or(true);
        path.starts_with(&self.content_root) && !hidden
    }
}

/// Watches the content tree and the config file. Debounced events arrive on
/// `events`; dropping the watcher stops the background thread.
pub struct ContentWatcher {
    _watcher: RecommendedWatcher,
    _thread: std::thread::JoinHandle<()>,
    pub events: UnboundedReceiver<WatchEvent>,
}

impl ContentWatcher {
    pub fn start(filter: WatchFilter) -> Result<Self, notify::Error> {
        let (notify_tx, notify_rx) = mpsc::channel::<notify::Result<Event>>();
        let (event_tx, events) = unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = notify_tx.send(res);
            },
            Config::default(),
        )?;

        if filter.content_root.exists() {
            watcher.watch(&filter.content_root, RecursiveMode::Recursive)?;
        } else {
            log::warn!(
                "Content directory {} does not exist, not watching it",
                filter.content_root.display()
            );
        }
        // the parent directory survives editors that replace the file on save
        if let Some(dir) = filter.config_path.parent() {
            let covered = filter.content_root.exists() && dir.starts_with(&filter.content_root);
            if !covered {
                watcher.watch(dir, RecursiveMode::NonRecursive)?;
            }
        }

        let thread = std::thread::spawn(move || debounce_loop(notify_rx, event_tx, filter));

        Ok(ContentWatcher {
            _watcher: watcher,
            _thread: thread,
            events,
        })
    }
}

fn debounce_loop(
    notify_rx: mpsc::Receiver<notify::Result<Event>>,
    event_tx: UnboundedSender<WatchEvent>,
    filter: WatchFilter,
) {
    let mut pending: Vec<(PathBuf, ChangeKind)> = Vec::new();
    let mut last_event = Instant::now();

    loop {
        match notify_rx.recv_timeout(DEBOUNCE) {
            Ok(Ok(event)) => {
                if let Some(kind) = change_kind(&event.kind) {
                    pending.extend(
                        event
                            .paths
                            .into_iter()
                            .filter(|p| filter.accepts(p))
                            .map(|p| (p, kind)),
                    );
                }
                last_event = Instant::now();
            }
            Ok(Err(e)) => log::warn!("File watcher error: {e}"),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if pending.is_empty() || last_event.elapsed() < DEBOUNCE {
                    continue;
                }
                // last change kind per path wins
                let mut seen = HashMap::new();
                for (path, kind) in pending.drain(..) {
                    seen.insert(path, kind);
                }
                for (path, kind) in seen {
                    log::trace!("Change {kind:?}: {}", path.display());
                    if event_tx.send(WatchEvent { path, kind }).is_err() {
                        return;
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> WatchFilter {
        WatchFilter {
            content_root: PathBuf::from("/site/content"),
            config_path: PathBuf::from("/site/contentkit.yaml"),
            generated: vec![
                PathBuf::from("/site/.contentkit"),
                PathBuf::from("/site/content/generated"),
            ],
        }
    }

    #[test]
    fn test_filter_accepts_content_and_config() {
        let filter = filter();
        assert!(filter.accepts(Path::new("/site/content/posts/a.md")));
        assert!(filter.accepts(Path::new("/site/contentkit.yaml")));
    }

    #[test]
    fn test_filter_rejects_generated_and_hidden() {
        let filter = filter();
        assert!(!filter.accepts(Path::new("/site/.contentkit/posts.json")));
        assert!(!filter.accepts(Path::new("/site/content/generated/a.png")));
        assert!(!filter.accepts(Path::new("/site/content/posts/.a.md.swp")));
        assert!(!filter.accepts(Path::new("/site/content/posts/a.md~")));
        assert!(!filter.accepts(Path::new("/site/README.md")));
    }

    #[test]
    fn test_change_kind_mapping() {
        use notify::event::{CreateKind, RemoveKind};
        assert_eq!(change_kind(&EventKind::Create(CreateKind::File)), Some(ChangeKind::Created));
        assert_eq!(change_kind(&EventKind::Remove(RemoveKind::File)), Some(ChangeKind::Deleted));
        assert_eq!(change_kind(&EventKind::Access(notify::event::AccessKind::Any)), None);
    }
}
