//! Filesystem event source backed by the `notify` crate

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    watch::{FileEvent, FileEventReceiver, FileEventSource},
};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Directory watcher using the platform's recommended backend (inotify on Linux)
///
/// Each subscribed directory owns its own `RecommendedWatcher`; dropping the
/// watcher closes the event channel handed to the subscriber.
pub struct NotifyWatcher {
    watchers: Mutex<HashMap<PathBuf, RecommendedWatcher>>,
}

impl NotifyWatcher {
    pub fn new() -> Self {
        Self {
            watchers: Mutex::new(HashMap::new()),
        }
    }

    fn map_notify_error(e: notify::Error) -> BridgeError {
        BridgeError::OperationFailed(format!("Filesystem watch error: {}", e))
    }
}

impl Default for NotifyWatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Translate a raw `notify` event into zero or more bridge events.
///
/// Only creations and renames into the directory are reported.
pub(crate) fn translate(event: &Event) -> Vec<FileEvent> {
    match event.kind {
        EventKind::Create(kind) => event
            .paths
            .iter()
            .map(|path| {
                let is_directory = match kind {
                    CreateKind::Folder => true,
                    CreateKind::File => false,
                    _ => path.is_dir(),
                };
                FileEvent {
                    is_directory,
                    ..FileEvent::created(path.clone())
                }
            })
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .first()
            .map(|path| moved_to(path))
            .into_iter()
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event
            .paths
            .get(1)
            .map(|path| moved_to(path))
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}

fn moved_to(path: &Path) -> FileEvent {
    FileEvent {
        is_directory: path.is_dir(),
        ..FileEvent::moved_to(path)
    }
}

#[async_trait]
impl FileEventSource for NotifyWatcher {
    async fn subscribe(&self, directory: &Path) -> Result<FileEventReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for file_event in translate(&event) {
                    if tx.send(file_event).is_err() {
                        // Receiver dropped; the subscription is going away.
                        return;
                    }
                }
            }
            Err(e) => warn!(error = %e, "Filesystem watch backend error"),
        })
        .map_err(Self::map_notify_error)?;

        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .map_err(Self::map_notify_error)?;

        let previous = self
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(directory.to_path_buf(), watcher);
        if previous.is_some() {
            debug!(path = ?directory, "Replaced existing watch");
        }

        info!(path = ?directory, "Watching directory");
        Ok(rx)
    }

    async fn unsubscribe(&self, directory: &Path) -> Result<()> {
        let removed = self
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(directory);

        match removed {
            Some(mut watcher) => {
                if let Err(e) = watcher.unwatch(directory) {
                    warn!(path = ?directory, error = %e, "Failed to remove watch cleanly");
                }
                info!(path = ?directory, "Stopped watching directory");
                Ok(())
            }
            None => Err(BridgeError::OperationFailed(format!(
                "Directory is not being watched: {}",
                directory.display()
            ))),
        }
    }
}
