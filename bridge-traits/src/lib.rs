//! # Host Bridge Traits
//!
//! Capability traits the backup engine requires from its host.
//!
//! ## Overview
//!
//! This crate defines the contract between the engine and platform-specific
//! implementations. The engine only ever talks to these traits, so tests can
//! inject fault-injecting filesystems, scripted event sources and recording
//! notification sinks.
//!
//! ## Traits
//!
//! ### Files & Events
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Stat, list, stream, copy-with-mtime, delete
//! - [`FileEventSource`](watch::FileEventSource) - Created / moved-to events for one directory
//!
//! ### Host Integration
//! - [`NotificationSink`](notification::NotificationSink) - Fire-and-forget user notifications
//! - [`VolumeManager`](volume::VolumeManager) - Block device discovery, mount, capacity
//! - [`HttpClient`](http::HttpClient) - REST calls to host-managed APIs
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and keep the offending path or
//! command in the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single adapter can be shared
//! by the watch loop and every transfer worker.

pub mod error;
pub mod http;
pub mod notification;
pub mod platform;
pub mod storage;
pub mod time;
pub mod volume;
pub mod watch;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use notification::{Notification, NotificationLevel, NotificationSink};
pub use storage::{FileMetadata, FileSystemAccess};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
pub use volume::{BlockDevice, MountResult, StorageInfo, VolumeManager};
pub use watch::{FileEvent, FileEventKind, FileEventReceiver, FileEventSource};
