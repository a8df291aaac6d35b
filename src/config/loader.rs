//! Configuration loading, overrides and normalization.
//!
//! # Responsibilities
//! - Resolve the config file through the `AJP_CONFIG` env indirection
//! - Parse the TOML file and merge it over the defaults
//! - Apply per-key environment overrides (`AJP_PORT`, ...)
//! - Normalize values: clamp pool sizes to their floors
//!
//! # Design Decisions
//! - A missing file key keeps the default; a bad file is an error
//! - Env override values are strings: booleans accept any value whose
//!   first four characters case-insensitively spell "true"
//! - Unparseable env numbers are logged and ignored, never fatal

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::config::schema::AjpConfig;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "AJP_CONFIG";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Raw file schema. Numeric fields parse as signed so out-of-range values
/// can be clamped instead of rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawAjpConfig {
    pub ajp_port: Option<u16>,
    pub ajp_bind_addr: Option<String>,
    pub ajp_server_thread_size: Option<i64>,
    pub ajp_max_num_of_sockets: Option<i64>,
    pub ajp_mod_jk: Option<bool>,
    pub ajp_listener_pool_size: Option<i64>,
    pub ajp_listener_read_timeout: Option<i64>,
    pub ajp_connection_pool: Option<bool>,
    pub ajp_connection_pool_size: Option<i64>,
    pub ajp_request_handler_pool: Option<bool>,
    pub ajp_request_handler_pool_size: Option<i64>,
    pub ajp_watcher_enabled: Option<bool>,
    pub ajp_watcher_permission: Option<bool>,
    pub ajp_watcher_max_running_time: Option<i64>,
    pub ajp_watcher_frequency: Option<i64>,
    pub servlet_pool_size: Option<i64>,
    pub ajp_jvm_route: Option<String>,
    pub ajp_check_magic_bytes_strict: Option<bool>,
    pub ajp_servlet_config_dir: Option<String>,
}

/// Read and parse a config file.
pub fn load_file(path: &Path) -> Result<RawAjpConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge file values over the defaults already in `config`.
pub fn apply_file(config: &mut AjpConfig, raw: RawAjpConfig, path: &Path) {
    if let Some(v) = raw.ajp_port {
        config.port = v;
    }
    if let Some(v) = raw.ajp_bind_addr {
        config.bind_addr = v;
    }
    if let Some(v) = raw.ajp_server_thread_size {
        config.server_thread_size = clamp_size(v, 1);
    }
    if let Some(v) = raw.ajp_max_num_of_sockets {
        config.max_num_of_sockets = clamp_size(v, 0);
    }
    if let Some(v) = raw.ajp_mod_jk {
        config.mod_jk = v;
    }
    if let Some(v) = raw.ajp_listener_pool_size {
        config.listener_pool_size = clamp_size(v, 0);
    }
    if let Some(v) = raw.ajp_listener_read_timeout {
        config.listener_read_timeout_ms = v.max(0) as u64;
    }
    if let Some(v) = raw.ajp_connection_pool {
        config.connection_pool = v;
    }
    if let Some(v) = raw.ajp_connection_pool_size {
        config.connection_pool_size = clamp_size(v, 0);
    }
    if let Some(v) = raw.ajp_request_handler_pool {
        config.request_handler_pool = v;
    }
    if let Some(v) = raw.ajp_request_handler_pool_size {
        config.request_handler_pool_size = clamp_size(v, 0);
    }
    if let Some(v) = raw.ajp_watcher_enabled {
        config.watcher_enabled = v;
    }
    if let Some(v) = raw.ajp_watcher_permission {
        config.watcher_permission = v;
    }
    if let Some(v) = raw.ajp_watcher_max_running_time {
        config.watcher_max_running_time_ms = v.max(0) as u64;
    }
    if let Some(v) = raw.ajp_watcher_frequency {
        config.watcher_frequency_ms = v.max(0) as u64;
    }
    if let Some(v) = raw.servlet_pool_size {
        config.servlet_pool_size = clamp_size(v, 1);
    }
    if let Some(v) = raw.ajp_jvm_route {
        config.jvm_route = Some(v);
    }
    if let Some(v) = raw.ajp_check_magic_bytes_strict {
        config.check_magic_bytes_strict = v;
    }
    match raw.ajp_servlet_config_dir {
        Some(dir) => config.servlet_config_dir = dir.into(),
        // derived: sibling "servlets" directory next to the config file
        None => {
            if let Some(parent) = path.parent() {
                config.servlet_config_dir = parent.join("servlets");
            }
        }
    }
}

/// Apply per-key environment overrides using the upper-case property names.
pub fn apply_env(config: &mut AjpConfig) {
    if let Some(v) = env_number("AJP_PORT") {
        config.port = v.clamp(0, u16::MAX as i64) as u16;
    }
    if let Ok(v) = std::env::var("AJP_BIND_ADDR") {
        config.bind_addr = v;
    }
    if let Some(v) = env_number("AJP_SERVER_THREAD_SIZE") {
        config.server_thread_size = clamp_size(v, 1);
    }
    if let Some(v) = env_number("AJP_MAX_NUM_OF_SOCKETS") {
        config.max_num_of_sockets = clamp_size(v, 0);
    }
    if let Some(v) = env_bool("AJP_MOD_JK") {
        config.mod_jk = v;
    }
    if let Some(v) = env_number("AJP_LISTENER_POOL_SIZE") {
        config.listener_pool_size = clamp_size(v, 0);
    }
    if let Some(v) = env_number("AJP_LISTENER_READ_TIMEOUT") {
        config.listener_read_timeout_ms = v.max(0) as u64;
    }
    if let Some(v) = env_bool("AJP_CONNECTION_POOL") {
        config.connection_pool = v;
    }
    if let Some(v) = env_number("AJP_CONNECTION_POOL_SIZE") {
        config.connection_pool_size = clamp_size(v, 0);
    }
    if let Some(v) = env_bool("AJP_REQUEST_HANDLER_POOL") {
        config.request_handler_pool = v;
    }
    if let Some(v) = env_number("AJP_REQUEST_HANDLER_POOL_SIZE") {
        config.request_handler_pool_size = clamp_size(v, 0);
    }
    if let Some(v) = env_bool("AJP_WATCHER_ENABLED") {
        config.watcher_enabled = v;
    }
    if let Some(v) = env_bool("AJP_WATCHER_PERMISSION") {
        config.watcher_permission = v;
    }
    if let Some(v) = env_number("AJP_WATCHER_MAX_RUNNING_TIME") {
        config.watcher_max_running_time_ms = v.max(0) as u64;
    }
    if let Some(v) = env_number("AJP_WATCHER_FREQUENCY") {
        config.watcher_frequency_ms = v.max(0) as u64;
    }
    if let Some(v) = env_number("SERVLET_POOL_SIZE") {
        config.servlet_pool_size = clamp_size(v, 1);
    }
    if let Ok(v) = std::env::var("AJP_JVM_ROUTE") {
        if !v.is_empty() {
            config.jvm_route = Some(v);
        }
    }
    if let Some(v) = env_bool("AJP_CHECK_MAGIC_BYTES_STRICT") {
        config.check_magic_bytes_strict = v;
    }
    if let Ok(v) = std::env::var("AJP_SERVLET_CONFIG_DIR") {
        config.servlet_config_dir = v.into();
    }
}

/// Final clamps, applied after file and env merging.
pub fn normalize(config: &mut AjpConfig) {
    // a zero worker or servlet budget would stall the server outright
    config.server_thread_size = config.server_thread_size.max(1);
    config.servlet_pool_size = config.servlet_pool_size.max(1);
}

/// Parse a boolean the way the property dialect does: a case-insensitive
/// 4-character prefix match against `"true"`.
pub fn parse_bool_lenient(value: &str) -> bool {
    value
        .get(..4)
        .map(|prefix| prefix.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn clamp_size(value: i64, floor: i64) -> usize {
    value.max(floor) as usize
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| parse_bool_lenient(&v))
}

fn env_number(key: &str) -> Option<i64> {
    let value = std::env::var(key).ok()?;
    match value.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(key, value, "ignoring unparseable numeric override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn lenient_bool_matches_four_char_prefix() {
        assert!(parse_bool_lenient("true"));
        assert!(parse_bool_lenient("TRUE"));
        assert!(parse_bool_lenient("TrUeX"));
        assert!(!parse_bool_lenient("tru"));
        assert!(!parse_bool_lenient("false"));
        assert!(!parse_bool_lenient("yes"));
        assert!(!parse_bool_lenient(""));
    }

    #[test]
    fn negative_pool_sizes_clamp_to_floor() {
        let mut config = AjpConfig::default();
        let raw = RawAjpConfig {
            ajp_server_thread_size: Some(-3),
            ajp_listener_pool_size: Some(-1),
            servlet_pool_size: Some(0),
            ..Default::default()
        };
        apply_file(&mut config, raw, Path::new("ajp.toml"));
        normalize(&mut config);
        assert_eq!(config.server_thread_size, 1);
        assert_eq!(config.listener_pool_size, 0);
        assert_eq!(config.servlet_pool_size, 1);
    }

    #[test]
    fn servlet_config_dir_derives_from_file_location() {
        let mut config = AjpConfig::default();
        apply_file(
            &mut config,
            RawAjpConfig::default(),
            Path::new("/etc/ajp/ajp.toml"),
        );
        assert_eq!(config.servlet_config_dir, PathBuf::from("/etc/ajp/servlets"));
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let raw: RawAjpConfig = toml::from_str(
            r#"
            ajp_port = 9009
            ajp_mod_jk = true
            ajp_check_magic_bytes_strict = false
            ajp_jvm_route = "node1"
            "#,
        )
        .unwrap();
        let mut config = AjpConfig::default();
        apply_file(&mut config, raw, Path::new("ajp.toml"));
        assert_eq!(config.port, 9009);
        assert!(config.mod_jk);
        assert!(!config.check_magic_bytes_strict);
        assert_eq!(config.jvm_route.as_deref(), Some("node1"));
        // untouched keys keep their defaults
        assert_eq!(config.max_num_of_sockets, 50);
    }
}
