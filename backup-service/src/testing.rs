//! Scripted host doubles shared by unit tests

use async_trait::async_trait;
use bytes::Bytes;
use bridge_traits::{
    error::Result,
    platform::{DynAsyncRead, DynAsyncWrite},
    storage::{FileMetadata, FileSystemAccess},
    volume::{BlockDevice, StorageInfo, VolumeManager},
    watch::{FileEvent, FileEventReceiver, FileEventSource},
    BridgeError,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

pub fn usb_partition(name: &str) -> BlockDevice {
    BlockDevice {
        name: name.to_string(),
        path: PathBuf::from("/dev").join(name),
        size: 32 * 1024 * 1024 * 1024,
        device_type: "part".to_string(),
        mount_point: None,
        label: Some("BACKUPS".to_string()),
        uuid: None,
        fstype: Some("ext4".to_string()),
        is_usb: true,
    }
}

pub fn failure(command: &str) -> BridgeError {
    BridgeError::CommandFailed {
        command: command.to_string(),
        message: "simulated failure".to_string(),
    }
}

/// In-memory volume manager tracking a single mount
pub struct FakeVolumes {
    devices: Vec<BlockDevice>,
    mounted: Mutex<Option<PathBuf>>,
    mount_calls: Mutex<Vec<Option<String>>>,
    unmount_calls: AtomicU32,
    reject_typed: bool,
    busy: bool,
    phantom: bool,
    storage: StorageInfo,
}

impl FakeVolumes {
    pub fn new(devices: Vec<BlockDevice>) -> Self {
        Self {
            devices,
            mounted: Mutex::new(None),
            mount_calls: Mutex::new(Vec::new()),
            unmount_calls: AtomicU32::new(0),
            reject_typed: false,
            busy: false,
            phantom: false,
            storage: StorageInfo {
                total_bytes: 100 * 1024 * 1024 * 1024,
                used_bytes: 40 * 1024 * 1024 * 1024,
                free_bytes: 60 * 1024 * 1024 * 1024,
            },
        }
    }

    pub fn mounted_at_start(self, at: impl Into<PathBuf>) -> Self {
        *self.mounted.lock().unwrap() = Some(at.into());
        self
    }

    /// Mounts with an explicit filesystem type fail
    pub fn reject_typed_mounts(mut self) -> Self {
        self.reject_typed = true;
        self
    }

    /// Every unmount fails
    pub fn busy(mut self) -> Self {
        self.busy = true;
        self
    }

    /// Mount reports success without the device showing up
    pub fn phantom_mounts(mut self) -> Self {
        self.phantom = true;
        self
    }

    pub fn with_storage(mut self, storage: StorageInfo) -> Self {
        self.storage = storage;
        self
    }

    pub fn mount_calls(&self) -> Vec<Option<String>> {
        self.mount_calls.lock().unwrap().clone()
    }

    pub fn unmount_calls(&self) -> u32 {
        self.unmount_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VolumeManager for FakeVolumes {
    async fn list_devices(&self) -> Result<Vec<BlockDevice>> {
        Ok(self.devices.clone())
    }

    async fn mounted_at(&self, _device: &Path) -> Result<Option<PathBuf>> {
        Ok(self.mounted.lock().unwrap().clone())
    }

    async fn mount(
        &self,
        _device: &Path,
        mount_point: &Path,
        fstype: Option<&str>,
        _options: &str,
    ) -> Result<()> {
        self.mount_calls
            .lock()
            .unwrap()
            .push(fstype.map(str::to_string));
        if self.reject_typed && fstype.is_some() {
            return Err(failure("mount"));
        }
        if !self.phantom {
            *self.mounted.lock().unwrap() = Some(mount_point.to_path_buf());
        }
        Ok(())
    }

    async fn unmount(&self, _target: &Path) -> Result<()> {
        self.unmount_calls.fetch_add(1, Ordering::SeqCst);
        if self.busy {
            return Err(failure("umount"));
        }
        *self.mounted.lock().unwrap() = None;
        Ok(())
    }

    async fn storage_info(&self, _path: &Path) -> Result<StorageInfo> {
        Ok(self.storage)
    }
}

/// Event source replaying a fixed list of events, then closing
pub struct FakeWatcher {
    events: Mutex<Option<FileEventReceiver>>,
    subscriptions: Mutex<Vec<PathBuf>>,
}

impl FakeWatcher {
    pub fn new(events: Vec<FileEvent>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        for event in events {
            let _ = sender.send(event);
        }
        Self {
            events: Mutex::new(Some(receiver)),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn subscriptions(&self) -> Vec<PathBuf> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileEventSource for FakeWatcher {
    async fn subscribe(&self, directory: &Path) -> Result<FileEventReceiver> {
        self.subscriptions
            .lock()
            .unwrap()
            .push(directory.to_path_buf());
        self.events
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BridgeError::NotAvailable("already subscribed".to_string()))
    }

    async fn unsubscribe(&self, _directory: &Path) -> Result<()> {
        Ok(())
    }
}

/// `TokioFileSystem` that counts files written under a given name
pub struct CountingFs {
    inner: bridge_desktop::TokioFileSystem,
    name: String,
    writes: AtomicU32,
}

impl CountingFs {
    pub fn new(name: &str) -> Self {
        Self {
            inner: bridge_desktop::TokioFileSystem::new(),
            name: name.to_string(),
            writes: AtomicU32::new(0),
        }
    }

    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileSystemAccess for CountingFs {
    async fn exists(&self, path: &Path) -> Result<bool> {
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
        if path.file_name().map_or(false, |n| n == self.name.as_str()) {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.write_file(path, data).await
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        self.inner.delete_file(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.inner.rename(from, to).await
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.inner.list_directory(path).await
    }

    async fn open_read_stream(&self, path: &Path) -> Result<Box<DynAsyncRead>> {
        self.inner.open_read_stream(path).await
    }

    async fn open_write_stream(&self, path: &Path) -> Result<Box<DynAsyncWrite>> {
        self.inner.open_write_stream(path).await
    }

    async fn copy_file(&self, source: &Path, destination: &Path) -> Result<u64> {
        self.inner.copy_file(source, destination).await
    }

    async fn is_mount_point(&self, path: &Path) -> Result<bool> {
        self.inner.is_mount_point(path).await
    }
}
