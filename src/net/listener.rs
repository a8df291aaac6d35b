//! Listener workers.
//!
//! # Responsibilities
//! - Run one request/response cycle loop per accepted connection
//! - Publish waiting/processing state for the deadlock watcher
//! - Self-remove from the watcher registry on exit
//!
//! # Design Decisions
//! - One task owns one connection; packets are strictly sequential
//! - A listener that hits a framing error discards the whole connection
//! - Processing starts at the first magic byte pair, not at dispatch

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::sync::OwnedSemaphorePermit;

use crate::protocol::handler::HandlerPool;
use crate::protocol::{ProtocolError, RequestHandler};
use crate::watcher::ListenerRegistry;

/// Shared view of what one listener is doing, read by the watcher.
#[derive(Debug)]
pub struct ListenerActivity {
    number: u32,
    processing_since: Mutex<Option<Instant>>,
    description: Mutex<Option<String>>,
}

impl ListenerActivity {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            processing_since: Mutex::new(None),
            description: Mutex::new(None),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Mark the listener as blocked on its socket between cycles.
    pub fn begin_waiting(&self) {
        *lock(&self.processing_since) = None;
        *lock(&self.description) = None;
    }

    /// Mark the listener as processing. Keeps the earliest start time if
    /// already processing.
    pub fn begin_processing(&self) {
        let mut since = lock(&self.processing_since);
        if since.is_none() {
            *since = Some(Instant::now());
        }
    }

    /// Attach a short description of the work in flight.
    pub fn describe(&self, description: impl Into<String>) {
        *lock(&self.description) = Some(description.into());
    }

    /// How long the listener has been processing, `None` when waiting.
    pub fn processing_elapsed(&self) -> Option<Duration> {
        lock(&self.processing_since).map(|since| since.elapsed())
    }

    /// Test hook: shift the processing start into the past.
    #[cfg(test)]
    pub fn backdate_processing(&self, by: Duration) {
        *lock(&self.processing_since) = Some(Instant::now() - by);
    }

    pub fn description(&self) -> Option<String> {
        lock(&self.description).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The per-connection worker: one handler, one connection, one loop.
pub struct Listener {
    number: u32,
    handler: RequestHandler,
    activity: Arc<ListenerActivity>,
    registry: Arc<ListenerRegistry>,
    handler_pool: Option<Arc<HandlerPool>>,
    /// Slot in the listener pool, released when the worker ends.
    _permit: Option<OwnedSemaphorePermit>,
}

impl Listener {
    pub fn new(
        number: u32,
        handler: RequestHandler,
        activity: Arc<ListenerActivity>,
        registry: Arc<ListenerRegistry>,
        handler_pool: Option<Arc<HandlerPool>>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            number,
            handler,
            activity,
            registry,
            handler_pool,
            _permit: permit,
        }
    }

    /// Drive request/response cycles until the connection ends, a framing
    /// error occurs, or shutdown is signalled.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::debug!(listener = self.number, "listener started");
        loop {
            self.activity.begin_waiting();
            let outcome = tokio::select! {
                outcome = self.handler.run_cycle() => outcome,
                _ = shutdown.recv() => {
                    tracing::debug!(listener = self.number, "listener shutting down");
                    break;
                }
            };
            match outcome {
                Ok(()) => {}
                Err(ProtocolError::SocketClosedByWebServer) => {
                    tracing::debug!(listener = self.number, "web server closed the connection");
                    break;
                }
                Err(error) => {
                    tracing::warn!(listener = self.number, %error, "discarding connection");
                    break;
                }
            }
        }

        let Self {
            number,
            mut handler,
            registry,
            handler_pool,
            ..
        } = self;
        handler.reset(true).await;
        registry.remove(number);
        if let Some(pool) = handler_pool {
            pool.release(handler);
        }
        tracing::debug!(listener = number, "listener finished");
    }
}
