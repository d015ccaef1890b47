//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the backup engine:
//! - Add-on options (`BackupConfig`) with defaults and validation
//! - Logging and tracing infrastructure
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the engine, the service layer
//! and the binary share. It establishes the logging conventions and the event
//! broadcasting mechanism used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{BackupConfig, BackupConfigBuilder, DEFAULT_OPTIONS_PATH};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventSeverity, EventStream};
