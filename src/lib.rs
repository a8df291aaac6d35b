//! AJP13 servlet-container connector.
//!
//! A front-end web server (Apache httpd + mod_jk, nginx) forwards HTTP
//! requests over persistent sockets using the binary, length-framed AJP13
//! protocol; this crate is the container side of that conversation.
//!
//! # Architecture Overview
//!
//! ```text
//!   web server sockets
//!        │
//!        ▼
//!   ┌─────────┐   ┌───────────┐   ┌──────────────┐   ┌─────────┐
//!   │ server  │──▶│ net       │──▶│ protocol     │──▶│ servlet │
//!   │ accept  │   │ listener/ │   │ handler +    │   │ registry│
//!   │ loop    │   │ connection│   │ encoder      │   │ + pool  │
//!   └─────────┘   └───────────┘   └──────────────┘   └─────────┘
//!        ▲              │
//!        │         ┌────┴────┐     cross-cutting: config,
//!   restart ◀──────│ watcher │     lifecycle, observability
//!                  └─────────┘
//! ```

// Core subsystems
pub mod config;
pub mod net;
pub mod protocol;
pub mod server;
pub mod servlet;
pub mod watcher;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::AjpConfig;
pub use lifecycle::Shutdown;
pub use server::{AjpContext, AjpServer};
