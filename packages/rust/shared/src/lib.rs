//! Shared types, error model, and configuration for sheetsync.
//!
//! This crate is the foundation depended on by all other sheetsync crates.
//! It provides:
//! - [`SheetSyncError`], the unified error type
//! - Domain types ([`SheetConfig`], [`SheetMode`], [`PostStatus`], [`RecordWrite`])
//! - Configuration ([`AppConfig`], [`SyncSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, SCHEDULE_BUFFER_SECS, SyncSettings, config_dir, config_file_path,
    expand_home, init_config, load_config, load_config_from, save_config, save_config_to,
};
pub use error::{Result, SheetSyncError};
pub use types::{
    DEFAULT_TARGET_TYPE, DEFAULT_TEMPLATE, PostStatus, RecordId, RecordSummary, RecordWrite,
    SheetConfig, SheetId, SheetMode, TermId,
};
