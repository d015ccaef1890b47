//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::{
    error::{BridgeError, Result},
    notification::{Notification, NotificationSink},
    platform::{DynAsyncRead, DynAsyncWrite},
    storage::{FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use filetime::FileTime;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Misbehaviour injected into `copy_file`
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Write half the bytes, then fail
    Interrupt,
    /// Copy fully, then flip the first byte
    Corrupt,
    /// Copy fully, then drop the last byte
    Truncate,
    /// Sleep before copying
    Stall(Duration),
    /// Write half the bytes, sleep, then fail
    SlowInterrupt(Duration),
}

/// `TokioFileSystem` whose first `failing_copies` copies misbehave
pub struct FaultyFs {
    inner: TokioFileSystem,
    fault: Fault,
    failing_copies: u32,
    copies: AtomicU32,
    target: Option<String>,
    undeletable: Option<String>,
    unstatable: Option<String>,
    failing_reads: u32,
    reads: AtomicU32,
}

impl FaultyFs {
    pub fn new(fault: Fault, failing_copies: u32) -> Self {
        Self {
            inner: TokioFileSystem::new(),
            fault,
            failing_copies,
            copies: AtomicU32::new(0),
            target: None,
            undeletable: None,
            unstatable: None,
            failing_reads: 0,
            reads: AtomicU32::new(0),
        }
    }

    /// Plain filesystem except that deleting `name` is refused
    pub fn refusing_delete(name: &str) -> Self {
        Self::new(Fault::Interrupt, 0).with_undeletable(name)
    }

    /// Only copies of a source named `name` misbehave
    pub fn targeting(mut self, name: &str) -> Self {
        self.target = Some(name.to_string());
        self
    }

    pub fn with_undeletable(mut self, name: &str) -> Self {
        self.undeletable = Some(name.to_string());
        self
    }

    /// `exists` fails for any path named `name`
    pub fn with_unstatable(mut self, name: &str) -> Self {
        self.unstatable = Some(name.to_string());
        self
    }

    /// The first `count` read streams fail to open
    pub fn with_failing_reads(mut self, count: u32) -> Self {
        self.failing_reads = count;
        self
    }

    /// Copies counted against the fault budget
    pub fn copies(&self) -> u32 {
        self.copies.load(Ordering::SeqCst)
    }

    fn is_named(path: &Path, name: &Option<String>) -> bool {
        match name {
            Some(name) => path.file_name().map_or(false, |n| n == name.as_str()),
            None => true,
        }
    }
}

#[async_trait]
impl FileSystemAccess for FaultyFs {
    async fn exists(&self, path: &Path) -> Result<bool> {
        if self.unstatable.is_some() && Self::is_named(path, &self.unstatable) {
            return Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated stat failure",
            )));
        }
        self.inner.exists(path).await
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        self.inner.metadata(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.inner.create_dir_all(path).await
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        self.inner.write_file(path, data).await
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        if self.undeletable.is_some() && Self::is_named(path, &self.undeletable) {
            return Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "simulated permission denied",
            )));
        }
        self.inner.delete_file(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.inner.rename(from, to).await
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.inner.list_directory(path).await
    }

    async fn open_read_stream(&self, path: &Path) -> Result<Box<DynAsyncRead>> {
        if self.reads.fetch_add(1, Ordering::SeqCst) < self.failing_reads {
            return Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated read error",
            )));
        }
        self.inner.open_read_stream(path).await
    }

    async fn open_write_stream(&self, path: &Path) -> Result<Box<DynAsyncWrite>> {
        self.inner.open_write_stream(path).await
    }

    async fn copy_file(&self, source: &Path, destination: &Path) -> Result<u64> {
        if !Self::is_named(source, &self.target) {
            return self.inner.copy_file(source, destination).await;
        }
        let copy = self.copies.fetch_add(1, Ordering::SeqCst) + 1;
        if copy > self.failing_copies {
            return self.inner.copy_file(source, destination).await;
        }

        match self.fault {
            Fault::Interrupt => {
                let data = tokio::fs::read(source).await?;
                tokio::fs::write(destination, &data[..data.len() / 2]).await?;
                Err(BridgeError::Io(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "simulated interruption",
                )))
            }
            Fault::Corrupt => {
                let copied = self.inner.copy_file(source, destination).await?;
                let mut data = tokio::fs::read(destination).await?;
                data[0] ^= 0xFF;
                tokio::fs::write(destination, &data).await?;
                Ok(copied)
            }
            Fault::Truncate => {
                let copied = self.inner.copy_file(source, destination).await?;
                let file = std::fs::OpenOptions::new().write(true).open(destination)?;
                file.set_len(copied.saturating_sub(1))?;
                Ok(copied)
            }
            Fault::Stall(delay) => {
                tokio::time::sleep(delay).await;
                self.inner.copy_file(source, destination).await
            }
            Fault::SlowInterrupt(delay) => {
                let data = tokio::fs::read(source).await?;
                tokio::fs::write(destination, &data[..data.len() / 2]).await?;
                tokio::time::sleep(delay).await;
                Err(BridgeError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "simulated device error",
                )))
            }
        }
    }

    async fn is_mount_point(&self, path: &Path) -> Result<bool> {
        self.inner.is_mount_point(path).await
    }
}

/// Sink that records every notification
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn titles(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.title.clone())
            .collect()
    }

    pub fn find(&self, title: &str) -> Option<Notification> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.title == title)
            .cloned()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, notification: Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }

    async fn test_connection(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Write `size` bytes of patterned data with a fixed modification time
pub fn write_artifact(dir: &Path, name: &str, size: usize, mtime_offset_secs: i64) -> PathBuf {
    let path = dir.join(name);
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, data).unwrap();
    filetime::set_file_mtime(
        &path,
        FileTime::from_unix_time(1_700_000_000 + mtime_offset_secs, 0),
    )
    .unwrap();
    path
}
