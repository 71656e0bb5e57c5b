//! Cross-process "data changed" signal.
//!
//! Any process that mutates tasks rewrites a small signal file; every
//! running process watches that file and turns each change into a
//! payload-free notification.

use crate::infrastructure::error::InfraError;
use chrono::Utc;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub const SIGNAL_FILE_NAME: &str = "data-changed.signal";

pub trait ChangeNotifier: Send + Sync {
    fn notify_changed(&self) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct FileChangeSignal {
    path: PathBuf,
}

impl FileChangeSignal {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn in_state_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(SIGNAL_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChangeNotifier for FileChangeSignal {
    fn notify_changed(&self) -> Result<(), InfraError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let stamp = format!("{} {}\n", Utc::now().to_rfc3339(), std::process::id());
        fs::write(&self.path, stamp)?;
        debug!(path = %self.path.display(), "posted data-changed signal");
        Ok(())
    }
}

/// Keeps the underlying watcher alive; dropping it stops delivery.
pub struct ChangeSignalWatcher {
    _watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<()>,
}

impl ChangeSignalWatcher {
    /// Watches the directory holding `signal_path`, so the file may be
    /// created after the watch starts.
    pub fn start(signal_path: &Path) -> Result<Self, InfraError> {
        let directory = signal_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .ok_or_else(|| {
                InfraError::InvalidConfig(format!(
                    "signal file {} has no parent directory",
                    signal_path.display()
                ))
            })?
            .to_path_buf();
        fs::create_dir_all(&directory)?;
        let file_name = signal_path.file_name().map(ToOwned::to_owned);

        let (sender, receiver) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
            match result {
                Ok(event) => {
                    let relevant = matches!(
                        event.kind,
                        EventKind::Modify(_) | EventKind::Create(_)
                    ) && event
                        .paths
                        .iter()
                        .any(|path| path.file_name() == file_name.as_deref());
                    if relevant && sender.send(()).is_err() {
                        warn!("data-changed receiver dropped");
                    }
                }
                Err(error) => error!(%error, "signal file watcher error"),
            }
        })?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        info!(path = %signal_path.display(), "watching data-changed signal");

        Ok(Self {
            _watcher: watcher,
            receiver,
        })
    }

    /// Waits for the next change, folding any burst already queued into it.
    pub async fn changed(&mut self) -> Option<()> {
        self.receiver.recv().await?;
        while self.receiver.try_recv().is_ok() {}
        Some(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopChangeNotifier;

impl ChangeNotifier for NoopChangeNotifier {
    fn notify_changed(&self) -> Result<(), InfraError> {
        Ok(())
    }
}
