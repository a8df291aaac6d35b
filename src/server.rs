//! The protocol server: accept loop, listener spawning, restart.
//!
//! # Responsibilities
//! - Bind the configured address and accept web-server sockets
//! - Spawn one listener task per connection, registered with the watcher
//! - Tear everything down and rebind on a watcher-triggered restart
//!
//! # Design Decisions
//! - The listener pool slot is acquired before the accept (backpressure)
//! - Restart keeps the server loop alive; shutdown ends it
//! - All shared dependencies travel in one context value

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::AjpConfig;
use crate::lifecycle::Shutdown;
use crate::net::connection::{AjpConnection, BufferPool, SocketTracker};
use crate::net::listener::{Listener, ListenerActivity};
use crate::observability::ConnectionMonitor;
use crate::protocol::handler::{HandlerPool, RequestHandler};
use crate::servlet::{ServletPool, ServletRegistry};
use crate::watcher::{ListenerRegistry, RestartHandle, Watcher};

/// Error type for server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}

/// Why a `serve` call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// The watcher asked for a full restart; rebind and serve again.
    Restart,
    /// Graceful shutdown was signalled.
    Shutdown,
}

/// Shared dependencies handed to every request handler.
pub struct AjpContext {
    pub config: Arc<AjpConfig>,
    pub servlets: Arc<ServletRegistry>,
    pub servlet_pool: ServletPool,
    pub monitor: ConnectionMonitor,
    pub sockets: Arc<SocketTracker>,
}

impl AjpContext {
    pub fn new(config: Arc<AjpConfig>, servlets: Arc<ServletRegistry>) -> Self {
        let servlet_pool = ServletPool::new(config.servlet_pool_size);
        Self {
            config,
            servlets,
            servlet_pool,
            monitor: ConnectionMonitor::new(),
            sockets: Arc::new(SocketTracker::new()),
        }
    }
}

/// The AJP protocol server.
pub struct AjpServer {
    ctx: Arc<AjpContext>,
    registry: Arc<ListenerRegistry>,
    shutdown: Shutdown,
    restart: RestartHandle,
    restart_rx: tokio::sync::mpsc::Receiver<&'static str>,
    handler_pool: Option<Arc<HandlerPool>>,
    buffer_pool: Option<Arc<BufferPool>>,
    listener_slots: Option<Arc<Semaphore>>,
    next_listener: u32,
}

impl AjpServer {
    pub fn new(config: AjpConfig, servlets: ServletRegistry) -> Self {
        let config = Arc::new(config);
        let ctx = Arc::new(AjpContext::new(Arc::clone(&config), Arc::new(servlets)));
        let (restart, restart_rx) = RestartHandle::new();
        let handler_pool = config
            .request_handler_pool
            .then(|| Arc::new(HandlerPool::new(config.request_handler_pool_size)));
        let buffer_pool = config
            .connection_pool
            .then(|| Arc::new(BufferPool::new(config.connection_pool_size)));
        let listener_slots = (config.listener_pool_size > 0)
            .then(|| Arc::new(Semaphore::new(config.listener_pool_size)));
        Self {
            ctx,
            registry: Arc::new(ListenerRegistry::new()),
            shutdown: Shutdown::new(),
            restart,
            restart_rx,
            handler_pool,
            buffer_pool,
            listener_slots,
            next_listener: 0,
        }
    }

    /// Handle for triggering graceful shutdown.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Handle the watcher uses to request a full restart.
    pub fn restart_handle(&self) -> RestartHandle {
        self.restart.clone()
    }

    pub fn context(&self) -> Arc<AjpContext> {
        Arc::clone(&self.ctx)
    }

    pub fn listener_registry(&self) -> Arc<ListenerRegistry> {
        Arc::clone(&self.registry)
    }

    /// Serve until shutdown. A restart request tears down every listener
    /// and socket, rebinds, and resumes accepting.
    pub async fn run(mut self) -> Result<(), ServerError> {
        let watcher = Watcher::new(
            Arc::clone(&self.ctx.config),
            Arc::clone(&self.registry),
            self.restart.clone(),
        );
        tokio::spawn(watcher.run(self.shutdown.subscribe()));

        loop {
            let addr = self.ctx.config.bind_address();
            let tcp = TcpListener::bind(&addr).await.map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
            match self.serve(tcp).await {
                ServeOutcome::Restart => continue,
                ServeOutcome::Shutdown => break,
            }
        }
        Ok(())
    }

    /// Accept connections on an already-bound listener until a restart or
    /// shutdown is signalled. The listener (and every spawned worker) is
    /// torn down before returning.
    pub async fn serve(&mut self, tcp: TcpListener) -> ServeOutcome {
        if let Ok(addr) = tcp.local_addr() {
            tracing::info!(
                address = %addr,
                max_sockets = self.ctx.config.max_num_of_sockets,
                "protocol server listening"
            );
        }
        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                accepted = accept_next(&tcp, self.listener_slots.clone()) => {
                    match accepted {
                        Ok((permit, stream, peer)) => self.spawn_listener(stream, peer, permit),
                        Err(error) => tracing::warn!(%error, "accept failed"),
                    }
                }
                reason = self.restart_rx.recv() => {
                    let reason = reason.unwrap_or("restart channel closed");
                    tracing::warn!(reason, "restarting protocol server");
                    self.registry.stop_all();
                    return ServeOutcome::Restart;
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("protocol server shutting down");
                    self.registry.stop_all();
                    return ServeOutcome::Shutdown;
                }
            }
        }
    }

    fn spawn_listener(
        &mut self,
        stream: TcpStream,
        peer: SocketAddr,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        self.next_listener += 1;
        let number = self.next_listener;
        let activity = Arc::new(ListenerActivity::new(number));
        let conn = AjpConnection::new(
            stream,
            peer,
            self.ctx.config.listener_read_timeout(),
            self.buffer_pool.clone(),
            Arc::clone(&activity),
            self.ctx.sockets.track(),
        );
        let mut handler = match &self.handler_pool {
            Some(pool) => pool.acquire(&self.ctx),
            None => RequestHandler::new(Arc::clone(&self.ctx)),
        };
        handler.assign(conn);
        let listener = Listener::new(
            number,
            handler,
            Arc::clone(&activity),
            Arc::clone(&self.registry),
            self.handler_pool.clone(),
            permit,
        );
        tracing::debug!(
            listener = number,
            peer = %peer,
            open_sockets = self.ctx.sockets.open_count(),
            "connection accepted"
        );
        let shutdown_rx = self.shutdown.subscribe();
        // the worker must not outrun its own registration
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = ready_rx.await;
            listener.run(shutdown_rx).await;
        });
        self.registry.add(activity, handle.abort_handle());
        let _ = ready_tx.send(());
    }
}

/// Acquire a listener pool slot, then accept the next connection.
async fn accept_next(
    tcp: &TcpListener,
    slots: Option<Arc<Semaphore>>,
) -> std::io::Result<(Option<OwnedSemaphorePermit>, TcpStream, SocketAddr)> {
    let permit = match slots {
        Some(slots) => Some(
            slots
                .acquire_owned()
                .await
                .expect("listener pool semaphore closed"),
        ),
        None => None,
    };
    let (stream, peer) = tcp.accept().await?;
    Ok((permit, stream, peer))
}
