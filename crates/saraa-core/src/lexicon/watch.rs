//! Hot-reloadable lexicon handle and file watcher

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Lexicon;
use crate::error::ConfigError;

/// Shared pointer to the current lexicon.
///
/// Turns take a `snapshot()` at the start and keep it for the whole turn,
/// so a reload swaps the pointer without touching in-flight requests.
#[derive(Clone)]
pub struct LexiconHandle {
    current: Arc<RwLock<Arc<Lexicon>>>,
}

impl LexiconHandle {
    pub fn new(lexicon: Lexicon) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(lexicon))),
        }
    }

    pub fn snapshot(&self) -> Arc<Lexicon> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Swap in a new lexicon if it validates
    pub fn replace(&self, lexicon: Lexicon) -> Result<(), ConfigError> {
        lexicon.validate()?;
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(lexicon);
        Ok(())
    }

    /// Reload from a file, keeping the current lexicon on failure
    pub fn reload_from(&self, path: &Path) -> Result<()> {
        let lexicon = Lexicon::load(path)?;
        self.replace(lexicon)?;
        info!("Lexicon reloaded from {}", path.display());
        Ok(())
    }
}

/// Watch a lexicon file and reload the handle whenever it changes.
///
/// The parent directory is watched so editors that replace the file on save
/// are picked up too. The task ends when `cancel` fires.
pub fn spawn_watcher(
    handle: LexiconHandle,
    path: PathBuf,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .with_context(|| format!("Lexicon path has no file name: {}", path.display()))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                if tx.send(event).is_err() {
                    debug!("Lexicon watcher channel closed");
                }
            }
            Err(e) => error!("Lexicon watch error: {:?}", e),
        })
        .context("Failed to create lexicon watcher")?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", dir.display()))?;

    info!("Watching lexicon file {}", path.display());

    Ok(tokio::spawn(async move {
        // keep the watcher alive for the life of the task
        let _watcher = watcher;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Lexicon watcher stopped");
                    break;
                }
                maybe_event = rx.recv() => {
                    let Some(event) = maybe_event else { break };
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        continue;
                    }
                    let touches_lexicon = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()));
                    if !touches_lexicon {
                        continue;
                    }
                    if let Err(e) = handle.reload_from(&path) {
                        warn!("Keeping previous lexicon, reload failed: {:#}", e);
                    }
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SlotKind;

    #[test]
    fn test_snapshot_survives_replace() {
        let handle = LexiconHandle::new(Lexicon::builtin());
        let before = handle.snapshot();

        let mut smaller = Lexicon::builtin();
        smaller.slots.retain(|t| t.slot == SlotKind::Subject);
        handle.replace(smaller).unwrap();

        assert_eq!(before.slots.len(), SlotKind::ALL.len());
        assert_eq!(handle.snapshot().slots.len(), 1);
    }

    #[test]
    fn test_replace_rejects_invalid() {
        let handle = LexiconHandle::new(Lexicon::builtin());
        let mut broken = Lexicon::builtin();
        broken.slots.clear();
        assert!(handle.replace(broken).is_err());
        assert_eq!(handle.snapshot().slots.len(), SlotKind::ALL.len());
    }

    #[test]
    fn test_reload_from_bad_file_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexicon.yaml");
        std::fs::write(&path, "slots: [not valid").unwrap();

        let handle = LexiconHandle::new(Lexicon::builtin());
        assert!(handle.reload_from(&path).is_err());
        assert_eq!(*handle.snapshot(), Lexicon::builtin());
    }

    #[test]
    fn test_reload_from_good_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexicon.yaml");
        let mut lexicon = Lexicon::builtin();
        lexicon.negation_markers = vec!["never".into()];
        std::fs::write(&path, lexicon.to_yaml_string().unwrap()).unwrap();

        let handle = LexiconHandle::new(Lexicon::builtin());
        handle.reload_from(&path).unwrap();
        assert!(handle.snapshot().is_negation_marker("never"));
        assert!(!handle.snapshot().is_negation_marker("not"));
    }

    #[tokio::test]
    async fn test_watcher_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexicon.yaml");
        std::fs::write(&path, Lexicon::builtin().to_yaml_string().unwrap()).unwrap();

        let cancel = CancellationToken::new();
        let task = spawn_watcher(LexiconHandle::new(Lexicon::builtin()), path, cancel.clone()).unwrap();
        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .expect("watcher did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_watcher_reloads_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexicon.yaml");
        std::fs::write(&path, Lexicon::builtin().to_yaml_string().unwrap()).unwrap();

        let handle = LexiconHandle::new(Lexicon::builtin());
        let cancel = CancellationToken::new();
        let task = spawn_watcher(handle.clone(), path.clone(), cancel.clone()).unwrap();

        let mut edited = Lexicon::builtin();
        edited.negation_markers = vec!["never".into()];
        std::fs::write(&path, edited.to_yaml_string().unwrap()).unwrap();

        let reloaded = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !handle.snapshot().is_negation_marker("never") {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(reloaded.is_ok(), "lexicon was not reloaded after the file changed");
        assert!(!handle.snapshot().is_negation_marker("not"));

        cancel.cancel();
        task.await.unwrap();
    }
}
