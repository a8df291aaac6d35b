//! Cross-cutting observability.
//!
//! Structured logging is initialized by the binary via `tracing`; this
//! module holds the connection-type accounting consulted when a servlet
//! path is bound to a handler.

pub mod monitor;

pub use monitor::ConnectionMonitor;
