//! Trait-object aliases shared by the bridge traits.
//!
//! All adapters run on native targets under a multi-threaded Tokio runtime,
//! so every boxed reader/writer handed across the bridge must be `Send`.

/// Marker trait for bridge implementations shared across async tasks.
pub trait PlatformSendSync: Send + Sync {}

impl<T> PlatformSendSync for T where T: Send + Sync {}

/// Dynamic async reader handed out by [`FileSystemAccess`](crate::storage::FileSystemAccess).
pub type DynAsyncRead = dyn tokio::io::AsyncRead + Send + Unpin;

/// Dynamic async writer handed out by [`FileSystemAccess`](crate::storage::FileSystemAccess).
pub type DynAsyncWrite = dyn tokio::io::AsyncWrite + Send + Unpin;
