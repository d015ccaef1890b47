//! Filesystem Event Source
//!
//! Delivers create and rename-into events for a single watched directory.
//! Platform adapters translate native notifications (inotify, FSEvents) into
//! [`FileEvent`] values pushed onto an unbounded channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::Result;

/// Kind of filesystem change observed in the watched directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    /// A new entry was created
    Created,
    /// An entry was renamed or moved into the directory
    MovedTo,
}

impl FileEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileEventKind::Created => "created",
            FileEventKind::MovedTo => "moved_to",
        }
    }
}

impl std::fmt::Display for FileEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single filesystem notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
    pub is_directory: bool,
}

impl FileEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: FileEventKind::Created,
            path: path.into(),
            is_directory: false,
        }
    }

    pub fn moved_to(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: FileEventKind::MovedTo,
            path: path.into(),
            is_directory: false,
        }
    }

    pub fn directory(mut self) -> Self {
        self.is_directory = true;
        self
    }
}

/// Receiving half of a directory subscription
pub type FileEventReceiver = UnboundedReceiver<FileEvent>;

/// Filesystem event source trait
///
/// # Example
///
/// ```ignore
/// let mut events = watcher.subscribe(Path::new("/backup")).await?;
/// while let Some(event) = events.recv().await {
///     println!("{} {}", event.kind, event.path.display());
/// }
/// ```
#[async_trait]
pub trait FileEventSource: Send + Sync {
    /// Start watching `directory` (non-recursive)
    ///
    /// The channel closes when the subscription is cancelled with
    /// [`unsubscribe`](Self::unsubscribe) or the source is dropped.
    async fn subscribe(&self, directory: &Path) -> Result<FileEventReceiver>;

    /// Stop watching `directory`
    async fn unsubscribe(&self, directory: &Path) -> Result<()>;
}
