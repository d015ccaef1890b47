//! # Desktop Bridge Implementations
//!
//! Linux implementations of the bridge traits for running the backup engine
//! as a Home Assistant add-on or a plain systemd service.
//!
//! ## Overview
//!
//! This crate provides production-ready implementations using:
//! - `FileSystemAccess` using `tokio::fs` and `filetime`
//! - `FileEventSource` using the `notify` crate (inotify)
//! - `HttpClient` using `reqwest`
//! - `NotificationSink` posting to the supervisor notify API, or logging
//! - `VolumeManager` using `lsblk`, `mount`, `umount` and `df`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{NotifyWatcher, TokioFileSystem};
//! use bridge_traits::FileEventSource;
//!
//! #[tokio::main]
//! async fn main() {
//!     let fs = TokioFileSystem::new();
//!     let watcher = NotifyWatcher::new();
//!     let mut events = watcher.subscribe("/backup".as_ref()).await.unwrap();
//! }
//! ```

mod filesystem;
mod http;
mod notifier;
mod volume;
mod watcher;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use notifier::{LogNotifier, SupervisorNotifier, DEFAULT_SUPERVISOR_URL, SUPERVISOR_TOKEN_ENV};
pub use volume::LsblkVolumeManager;
pub use watcher::NotifyWatcher;
