//! Process lifecycle: shutdown fan-out and interrupt handling.

pub mod shutdown;

pub use shutdown::{wait_for_signal, Shutdown};
