//! Network plumbing: connection wrapper, socket accounting, listener
//! workers.

pub mod connection;
pub mod listener;

pub use connection::{AjpConnection, BufferPool, SocketGuard, SocketTracker};
pub use listener::{Listener, ListenerActivity};
