//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    platform::{DynAsyncRead, DynAsyncWrite},
    storage::{FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use filetime::FileTime;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::debug;

/// Buffer used when streaming a copy
const COPY_BUFFER_SIZE: usize = 1024 * 1024;

/// Tokio-based file system implementation
///
/// Provides async file I/O operations using:
/// - `tokio::fs` for async operations
/// - `filetime` to carry modification times across copies
pub struct TokioFileSystem;

impl TokioFileSystem {
    pub fn new() -> Self {
        Self
    }

    /// Convert std::io::Error to BridgeError
    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }
}

impl Default for TokioFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(Self::map_io_error)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path).await.map_err(Self::map_io_error)?;

        Ok(FileMetadata {
            size: metadata.len(),
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent).await?;
        }

        fs::write(path, data.as_ref())
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).await.map_err(Self::map_io_error)?;
        debug!(from = ?from, to = ?to, "Renamed file");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path).await.map_err(Self::map_io_error)?;

        while let Some(entry) = read_dir.next_entry().await.map_err(Self::map_io_error)? {
            entries.push(entry.path());
        }

        debug!(path = ?path, count = entries.len(), "Listed directory");
        Ok(entries)
    }

    async fn open_read_stream(&self, path: &Path) -> Result<Box<DynAsyncRead>> {
        let file = fs::File::open(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Opened file for reading");
        Ok(Box::new(file))
    }

    async fn open_write_stream(&self, path: &Path) -> Result<Box<DynAsyncWrite>> {
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent).await?;
        }

        let file = fs::File::create(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Opened file for writing");
        Ok(Box::new(file))
    }

    async fn copy_file(&self, source: &Path, destination: &Path) -> Result<u64> {
        let source_file = fs::File::open(source).await.map_err(Self::map_io_error)?;
        let source_meta = source_file.metadata().await.map_err(Self::map_io_error)?;

        let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, source_file);
        let mut target = fs::File::create(destination)
            .await
            .map_err(Self::map_io_error)?;

        let copied = tokio::io::copy_buf(&mut reader, &mut target)
            .await
            .map_err(Self::map_io_error)?;
        target.flush().await.map_err(Self::map_io_error)?;
        target.sync_all().await.map_err(Self::map_io_error)?;
        drop(target);

        let mtime = FileTime::from_last_modification_time(&source_meta);
        let atime = FileTime::from_last_access_time(&source_meta);
        let dest = destination.to_path_buf();
        tokio::task::spawn_blocking(move || filetime::set_file_times(&dest, atime, mtime))
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Timestamp task failed: {}", e)))?
            .map_err(Self::map_io_error)?;

        debug!(
            source = ?source,
            destination = ?destination,
            bytes = copied,
            "Copied file"
        );
        Ok(copied)
    }

    #[cfg(unix)]
    async fn is_mount_point(&self, path: &Path) -> Result<bool> {
        use std::os::unix::fs::MetadataExt;

        let metadata = fs::metadata(path).await.map_err(Self::map_io_error)?;
        if !metadata.is_dir() {
            return Ok(false);
        }

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => return Ok(true),
        };
        let parent_meta = fs::metadata(&parent).await.map_err(Self::map_io_error)?;

        // Different device, or same inode as the parent (filesystem root)
        Ok(metadata.dev() != parent_meta.dev() || metadata.ino() == parent_meta.ino())
    }

    #[cfg(not(unix))]
    async fn is_mount_point(&self, _path: &Path) -> Result<bool> {
        Err(BridgeError::NotAvailable(
            "Mount point detection requires a Unix host".to_string(),
        ))
    }
}
