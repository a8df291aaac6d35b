//! Configuration schema and lifecycle.
//!
//! All protocol tunables live in one flat value with documented defaults.
//! `start()` loads the TOML file named by the `AJP_CONFIG` environment
//! variable (or an explicit path), applies per-key environment overrides
//! and normalization, and flips the `initialized` flag. `stop()`/`reset()`
//! restore factory defaults so the component can be cleanly re-started in
//! the same process.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::loader::{self, ConfigError};

/// Process-wide AJP tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AjpConfig {
    /// Listening port (`AJP_PORT`, default 8009).
    pub port: u16,

    /// Bind address (`AJP_BIND_ADDR`, default `localhost`; `*` binds all
    /// interfaces).
    pub bind_addr: String,

    /// Worker task budget for the server (`AJP_SERVER_THREAD_SIZE`,
    /// default 20, floor 1).
    pub server_thread_size: usize,

    /// Socket budget feeding the END_RESPONSE reuse decision
    /// (`AJP_MAX_NUM_OF_SOCKETS`, default 50).
    pub max_num_of_sockets: usize,

    /// mod_jk compatibility toggle (`AJP_MOD_JK`, default false). Forces
    /// connection reuse regardless of the socket budget.
    pub mod_jk: bool,

    /// Cap on concurrent listener tasks (`AJP_LISTENER_POOL_SIZE`,
    /// default 20, floor 0; 0 means unbounded).
    pub listener_pool_size: usize,

    /// Read timeout for the first bytes of a brand-new connection
    /// (`AJP_LISTENER_READ_TIMEOUT`, default 60000 ms, floor 0; 0 means
    /// unbounded).
    pub listener_read_timeout_ms: u64,

    /// Reuse per-connection scratch buffers (`AJP_CONNECTION_POOL`,
    /// default true).
    pub connection_pool: bool,

    /// Scratch buffers kept for reuse (`AJP_CONNECTION_POOL_SIZE`,
    /// default 5).
    pub connection_pool_size: usize,

    /// Recycle request handlers between connections
    /// (`AJP_REQUEST_HANDLER_POOL`, default true).
    pub request_handler_pool: bool,

    /// Handlers kept for reuse (`AJP_REQUEST_HANDLER_POOL_SIZE`,
    /// default 5).
    pub request_handler_pool_size: usize,

    /// Run the deadlock watcher (`AJP_WATCHER_ENABLED`, default false).
    pub watcher_enabled: bool,

    /// Allow the watcher to restart the server (`AJP_WATCHER_PERMISSION`,
    /// default false).
    pub watcher_permission: bool,

    /// Running time after which a listener counts as wedged
    /// (`AJP_WATCHER_MAX_RUNNING_TIME`, default 300000 ms).
    pub watcher_max_running_time_ms: u64,

    /// Scan period (`AJP_WATCHER_FREQUENCY`, default 300000 ms).
    pub watcher_frequency_ms: u64,

    /// Concurrent servlet checkouts (`SERVLET_POOL_SIZE`, default 50,
    /// floor 1).
    pub servlet_pool_size: usize,

    /// Route name announced to the balancer (`AJP_JVM_ROUTE`, no default;
    /// a warning is logged when absent).
    pub jvm_route: Option<String>,

    /// Magic-byte policy (`AJP_CHECK_MAGIC_BYTES_STRICT`, default true).
    pub check_magic_bytes_strict: bool,

    /// Servlet mapping directory (`AJP_SERVLET_CONFIG_DIR`; derived from
    /// the config file location when not set).
    pub servlet_config_dir: PathBuf,

    initialized: bool,
}

impl Default for AjpConfig {
    fn default() -> Self {
        Self {
            port: 8009,
            bind_addr: "localhost".to_string(),
            server_thread_size: 20,
            max_num_of_sockets: 50,
            mod_jk: false,
            listener_pool_size: 20,
            listener_read_timeout_ms: 60_000,
            connection_pool: true,
            connection_pool_size: 5,
            request_handler_pool: true,
            request_handler_pool_size: 5,
            watcher_enabled: false,
            watcher_permission: false,
            watcher_max_running_time_ms: 300_000,
            watcher_frequency_ms: 300_000,
            servlet_pool_size: 50,
            jvm_route: None,
            check_magic_bytes_strict: true,
            servlet_config_dir: PathBuf::from("servlets"),
            initialized: false,
        }
    }
}

impl AjpConfig {
    /// A configuration at factory defaults, not yet started.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the file named by the `AJP_CONFIG` environment variable (when
    /// set), apply environment overrides, normalize, and mark the
    /// configuration started. A second call while started is a no-op.
    pub fn start(&mut self) -> Result<(), ConfigError> {
        let path = std::env::var(loader::CONFIG_PATH_ENV).ok().map(PathBuf::from);
        self.start_with_file(path.as_deref())
    }

    /// `start()` with an explicit config file path instead of the
    /// environment indirection.
    pub fn start_with_file(&mut self, path: Option<&Path>) -> Result<(), ConfigError> {
        if self.initialized {
            tracing::debug!("configuration already started, ignoring");
            return Ok(());
        }
        *self = Self::default();
        if let Some(path) = path {
            let raw = loader::load_file(path)?;
            loader::apply_file(self, raw, path);
        }
        loader::apply_env(self);
        loader::normalize(self);
        if self.jvm_route.is_none() {
            tracing::warn!("no jvm route configured; balancer stickiness unavailable");
        }
        self.initialized = true;
        tracing::info!(
            port = self.port,
            bind_addr = %self.bind_addr,
            strict_magic = self.check_magic_bytes_strict,
            watcher = self.watcher_enabled,
            "configuration started"
        );
        Ok(())
    }

    /// Stop the configuration, restoring factory defaults.
    pub fn stop(&mut self) {
        self.reset();
    }

    /// Restore every field to its documented default and clear the
    /// initialized flag.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Read timeout for the opening bytes of a connection; `None` when
    /// configured as unbounded.
    pub fn listener_read_timeout(&self) -> Option<Duration> {
        match self.listener_read_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn watcher_frequency(&self) -> Duration {
        Duration::from_millis(self.watcher_frequency_ms)
    }

    pub fn watcher_max_running_time(&self) -> Duration {
        Duration::from_millis(self.watcher_max_running_time_ms)
    }

    /// `host:port` string for the TCP bind call; `*` maps to all
    /// interfaces.
    pub fn bind_address(&self) -> String {
        let host = match self.bind_addr.as_str() {
            "*" => "0.0.0.0",
            host => host,
        };
        format!("{host}:{}", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_defaults() {
        let config = AjpConfig::default();
        assert_eq!(config.port, 8009);
        assert_eq!(config.bind_addr, "localhost");
        assert_eq!(config.server_thread_size, 20);
        assert_eq!(config.max_num_of_sockets, 50);
        assert!(!config.mod_jk);
        assert_eq!(config.listener_pool_size, 20);
        assert_eq!(config.listener_read_timeout_ms, 60_000);
        assert!(config.connection_pool);
        assert_eq!(config.connection_pool_size, 5);
        assert!(config.request_handler_pool);
        assert_eq!(config.request_handler_pool_size, 5);
        assert!(!config.watcher_enabled);
        assert!(!config.watcher_permission);
        assert_eq!(config.watcher_max_running_time_ms, 300_000);
        assert_eq!(config.watcher_frequency_ms, 300_000);
        assert_eq!(config.servlet_pool_size, 50);
        assert_eq!(config.jvm_route, None);
        assert!(config.check_magic_bytes_strict);
        assert!(!config.is_initialized());
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let mut config = AjpConfig::default();
        config.listener_read_timeout_ms = 0;
        assert_eq!(config.listener_read_timeout(), None);
        config.listener_read_timeout_ms = 250;
        assert_eq!(
            config.listener_read_timeout(),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn wildcard_bind_addr_maps_to_all_interfaces() {
        let mut config = AjpConfig::default();
        config.bind_addr = "*".to_string();
        config.port = 8010;
        assert_eq!(config.bind_address(), "0.0.0.0:8010");
    }
}
