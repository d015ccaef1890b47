//! Storage and File System Abstractions
//!
//! Provides the platform-agnostic file I/O surface used by the transfer and
//! retention engine: stat, listing, streaming reads, metadata-preserving copies
//! and deletion.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::platform::{DynAsyncRead, DynAsyncWrite};

/// File metadata information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub is_directory: bool,
}

impl FileMetadata {
    /// Whether the entry is a regular file (not a directory)
    pub fn is_file(&self) -> bool {
        !self.is_directory
    }
}

/// File system access trait
///
/// Abstracts the file operations the engine performs so that transfers can be
/// exercised against fault-injecting implementations in tests.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn mirror(fs: &dyn FileSystemAccess, src: &Path, dst: &Path) -> Result<u64> {
///     fs.create_dir_all(dst.parent().unwrap()).await?;
///     fs.copy_file(src, dst).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    ///
    /// For large files, use `open_read_stream` instead.
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating it if it doesn't exist
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Atomically move `from` to `to`, replacing any existing file at `to`.
    ///
    /// Both paths must be on the same filesystem.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// List all entries in a directory (non-recursive)
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Open a file for streaming reads
    async fn open_read_stream(&self, path: &Path) -> Result<Box<DynAsyncRead>>;

    /// Open a file for streaming writes, truncating any existing content
    async fn open_write_stream(&self, path: &Path) -> Result<Box<DynAsyncWrite>>;

    /// Copy `source` to `destination`, preserving the modification time.
    ///
    /// Returns the number of bytes written. Implementations must flush the
    /// destination to stable storage before returning, and must stop writing
    /// if the returned future is dropped.
    async fn copy_file(&self, source: &Path, destination: &Path) -> Result<u64>;

    /// Whether `path` is the root of a mounted filesystem
    async fn is_mount_point(&self, path: &Path) -> Result<bool>;

    /// Calculate total size of a directory recursively
    async fn directory_size(&self, path: &Path) -> Result<u64> {
        let mut total = 0u64;
        let entries = self.list_directory(path).await?;

        for entry in entries {
            let metadata = self.metadata(&entry).await?;
            if metadata.is_directory {
                total += self.directory_size(&entry).await?;
            } else {
                total += metadata.size;
            }
        }

        Ok(total)
    }
}
