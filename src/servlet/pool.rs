//! Bounded servlet checkout pool.
//!
//! Caps how many requests may hold a servlet at once. A checkout couples
//! the shared servlet instance with a semaphore permit; dropping the
//! checkout returns the slot.

use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::servlet::Servlet;

/// Permit-based pool sized by `SERVLET_POOL_SIZE`.
pub struct ServletPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl ServletPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Check a servlet out of the pool, waiting for a free slot.
    pub async fn checkout(&self, servlet: Arc<dyn Servlet>) -> PooledServlet {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("servlet pool semaphore closed");
        PooledServlet {
            servlet,
            _permit: permit,
        }
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// A servlet held for the duration of one request cycle.
///
/// Releases its pool slot on drop.
pub struct PooledServlet {
    servlet: Arc<dyn Servlet>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledServlet {
    type Target = dyn Servlet;

    fn deref(&self) -> &Self::Target {
        self.servlet.as_ref()
    }
}
