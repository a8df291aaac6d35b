//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! AJP_CONFIG env var → config file (TOML)
//!     → loader.rs (parse & merge over defaults)
//!     → per-key env overrides (AJP_PORT, AJP_MOD_JK, ...)
//!     → normalization (pool-size floors)
//!     → AjpConfig (started, immutable)
//!     → shared via Arc to server, handlers and watcher
//! ```
//!
//! # Design Decisions
//! - Config is a value with a start/stop/reset lifecycle, not global state
//! - Read-mostly after start(); no locking needed for reads
//! - Every key has a documented default so an empty config is runnable

pub mod loader;
pub mod schema;

pub use loader::{ConfigError, CONFIG_PATH_ENV};
pub use schema::AjpConfig;
