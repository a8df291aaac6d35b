//! Servlet abstraction and path-keyed registry.
//!
//! # Responsibilities
//! - Define the servlet contract invoked once a forward request is decoded
//! - Resolve a servlet path to a bound servlet instance
//! - Fall back to the error servlet for unresolved paths
//!
//! # Design Decisions
//! - Servlets are shared immutable instances; per-request state lives in
//!   the request/response wrappers
//! - Registry paths are stored with leading/trailing slashes stripped
//! - An optional alias table in the servlet config dir remaps paths

pub mod pool;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

pub use pool::{PooledServlet, ServletPool};

/// Errors surfaced by a servlet's service method.
#[derive(Debug, Error)]
pub enum ServletError {
    #[error("servlet failure: {0}")]
    Failed(String),
}

/// The server-side contract invoked for each decoded forward request.
pub trait Servlet: Send + Sync {
    /// Name used in logs and accounting.
    fn name(&self) -> &str;

    /// Handle one request, writing status, headers and body into the
    /// response wrapper.
    fn service(&self, request: &ServletRequest, response: &mut ServletResponse)
        -> Result<(), ServletError>;
}

/// Protocol-level view of one forwarded request.
#[derive(Debug, Default)]
pub struct ServletRequest {
    pub method: String,
    pub request_uri: String,
    pub protocol: String,
    pub servlet_path: String,
    pub query_string: Option<String>,
    pub headers: Vec<(String, String)>,
    pub attributes: Vec<(String, String)>,
    /// `None` when the request declared an explicitly empty body.
    pub body: Option<Vec<u8>>,
    pub session_id: Option<String>,
    /// True when the session id arrived in a cookie rather than the URI.
    pub session_joined: bool,
    pub remote_addr: Option<String>,
    pub remote_host: Option<String>,
    pub server_name: Option<String>,
    pub server_port: u16,
    pub is_ssl: bool,
}

impl ServletRequest {
    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response under construction for one request cycle.
#[derive(Debug)]
pub struct ServletResponse {
    pub status: u16,
    pub status_message: String,
    /// Headers in insertion order; the encoder preserves this order.
    pub headers: Vec<(String, String)>,
    /// Each entry becomes its own Set-Cookie header on the wire.
    pub cookies: Vec<String>,
    pub body: Vec<u8>,
    /// Ask the encoder to drop the connection after END_RESPONSE.
    pub close_connection: bool,
}

impl Default for ServletResponse {
    fn default() -> Self {
        Self {
            status: 200,
            status_message: "OK".to_string(),
            headers: Vec::new(),
            cookies: Vec::new(),
            body: Vec::new(),
            close_connection: false,
        }
    }
}

impl ServletResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&mut self, status: u16, message: impl Into<String>) {
        self.status = status;
        self.status_message = message.into();
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn add_cookie(&mut self, cookie: impl Into<String>) {
        self.cookies.push(cookie.into());
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }
}

/// Outcome of a registry lookup.
pub struct ResolvedServlet {
    pub servlet: Arc<dyn Servlet>,
    /// False when the error servlet stood in for an unknown path.
    pub resolved: bool,
}

/// Path-keyed servlet registry with an error-servlet fallback.
pub struct ServletRegistry {
    by_path: HashMap<String, Arc<dyn Servlet>>,
    aliases: HashMap<String, String>,
    error_servlet: Arc<dyn Servlet>,
}

impl ServletRegistry {
    pub fn new() -> Self {
        Self {
            by_path: HashMap::new(),
            aliases: HashMap::new(),
            error_servlet: Arc::new(ErrorServlet),
        }
    }

    /// Bind a servlet at `path` (slashes stripped).
    pub fn register(&mut self, path: &str, servlet: Arc<dyn Servlet>) {
        self.by_path.insert(normalize_path(path), servlet);
    }

    /// Load the optional alias table `servlets.toml` from the servlet
    /// config dir. Unknown or unreadable files are logged and skipped.
    pub fn load_aliases(&mut self, dir: &Path) {
        let file = dir.join("servlets.toml");
        let content = match std::fs::read_to_string(&file) {
            Ok(content) => content,
            Err(_) => return,
        };
        match toml::from_str::<AliasFile>(&content) {
            Ok(parsed) => {
                for (alias, target) in parsed.aliases {
                    self.aliases
                        .insert(normalize_path(&alias), normalize_path(&target));
                }
                tracing::info!(file = %file.display(), count = self.aliases.len(), "servlet aliases loaded");
            }
            Err(error) => {
                tracing::warn!(file = %file.display(), %error, "ignoring malformed servlet alias file");
            }
        }
    }

    /// Resolve `path` to a servlet, falling back to the error servlet.
    pub fn resolve(&self, path: &str) -> ResolvedServlet {
        let key = normalize_path(path);
        let key = self.aliases.get(&key).unwrap_or(&key);
        match self.by_path.get(key) {
            Some(servlet) => ResolvedServlet {
                servlet: Arc::clone(servlet),
                resolved: true,
            },
            None => ResolvedServlet {
                servlet: Arc::clone(&self.error_servlet),
                resolved: false,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

impl Default for ServletRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip one leading and one trailing slash from a servlet path.
pub fn normalize_path(path: &str) -> String {
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    path.to_string()
}

#[derive(Debug, Default, serde::Deserialize)]
struct AliasFile {
    #[serde(default)]
    aliases: HashMap<String, String>,
}

/// Fallback servlet bound whenever a path does not resolve.
pub struct ErrorServlet;

impl Servlet for ErrorServlet {
    fn name(&self) -> &str {
        "error"
    }

    fn service(
        &self,
        request: &ServletRequest,
        response: &mut ServletResponse,
    ) -> Result<(), ServletError> {
        response.set_status(404, "Not Found");
        response.add_header("Content-Type", "text/html");
        response.write(
            format!(
                "<html><body><h1>404 Not Found</h1><p>No servlet bound at {}</p></body></html>",
                request.request_uri
            )
            .as_bytes(),
        );
        Ok(())
    }
}

/// Minimal landing servlet registered by the binary at the root path.
pub struct DefaultServlet;

impl Servlet for DefaultServlet {
    fn name(&self) -> &str {
        "default"
    }

    fn service(
        &self,
        _request: &ServletRequest,
        response: &mut ServletResponse,
    ) -> Result<(), ServletError> {
        response.add_header("Content-Type", "text/plain");
        response.write(b"ajp-connector ready\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_leading_and_trailing_slash() {
        assert_eq!(normalize_path("/mail/"), "mail");
        assert_eq!(normalize_path("mail"), "mail");
        assert_eq!(normalize_path("/a/b"), "a/b");
        assert_eq!(normalize_path("/"), "");
    }

    #[test]
    fn unresolved_path_falls_back_to_error_servlet() {
        let registry = ServletRegistry::new();
        let resolved = registry.resolve("/nowhere");
        assert!(!resolved.resolved);
        assert_eq!(resolved.servlet.name(), "error");
    }

    #[test]
    fn registered_servlet_resolves_with_slash_variants() {
        let mut registry = ServletRegistry::new();
        registry.register("mail", Arc::new(DefaultServlet));
        assert!(registry.resolve("/mail/").resolved);
        assert!(registry.resolve("mail").resolved);
        assert!(!registry.resolve("calendar").resolved);
    }

    #[test]
    fn error_servlet_reports_missing_path() {
        let request = ServletRequest {
            request_uri: "/ghost".to_string(),
            ..Default::default()
        };
        let mut response = ServletResponse::new();
        ErrorServlet.service(&request, &mut response).unwrap();
        assert_eq!(response.status, 404);
        assert!(String::from_utf8_lossy(&response.body).contains("/ghost"));
    }
}
