//! The per-connection protocol state machine.
//!
//! # Responsibilities
//! - Read framed packets and dispatch on the prefix code
//! - Track content-length bookkeeping across packet boundaries
//! - Bind the servlet for the cycle and drive response emission
//! - Re-arm between cycles via `reset`
//!
//! # State Machine
//! ```text
//! Idle --first packet--> Assigned --reset--> Idle
//! ```
//!
//! # Design Decisions
//! - The handler owns its connection for the cycle; `reset(true)` drops
//!   it so the handler can be reassigned
//! - An unknown prefix code abandons the cycle, never the connection
//! - A forward request with a declared nonzero body synchronously
//!   consumes the next packet before control returns

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use crate::net::connection::AjpConnection;
use crate::protocol::encoder;
use crate::protocol::error::{ProtocolError, ProtocolResult};
use crate::protocol::request::{AjpRequest, CPing, ForwardRequest, RequestBody};
use crate::protocol::{
    magic_matches, MAX_READ_BODY_CHUNK_SIZE, MAX_SEND_BODY_CHUNK_SIZE, PREFIX_CPING,
    PREFIX_FORWARD_REQUEST, PREFIX_PING, PREFIX_SHUTDOWN,
};
use crate::server::AjpContext;
use crate::servlet::{self, ErrorServlet, PooledServlet, Servlet, ServletRequest, ServletResponse};

/// Sentinel for "no content-length header present".
const CONTENT_LENGTH_NOT_SET: i64 = -1;

/// Cycle state of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// Between cycles; the next packet starts a new one.
    Idle,
    /// Inside a cycle; later packets are body continuations.
    Assigned,
}

/// The protocol state machine bound to one connection at a time.
pub struct RequestHandler {
    ctx: Arc<AjpContext>,
    conn: Option<AjpConnection>,
    state: HandlerState,
    content_length: i64,
    total_requested_content_length: i64,
    headers_sent: bool,
    service_method_called: bool,
    end_response_sent: bool,
    is_form_data: bool,
    empty_data_package_received: bool,
    http_session_id: Option<String>,
    http_session_joined: bool,
    servlet_path: Option<String>,
    servlet: Option<PooledServlet>,
    request: Option<AjpRequest>,
    body: Option<Vec<u8>>,
}

impl RequestHandler {
    pub fn new(ctx: Arc<AjpContext>) -> Self {
        Self {
            ctx,
            conn: None,
            state: HandlerState::Idle,
            content_length: CONTENT_LENGTH_NOT_SET,
            total_requested_content_length: 0,
            headers_sent: false,
            service_method_called: false,
            end_response_sent: false,
            is_form_data: false,
            empty_data_package_received: false,
            http_session_id: None,
            http_session_joined: false,
            servlet_path: None,
            servlet: None,
            request: None,
            body: None,
        }
    }

    /// Bind a connection to this handler.
    pub fn assign(&mut self, conn: AjpConnection) {
        self.conn = Some(conn);
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    /// One full request/response cycle: read packets, emit the response,
    /// re-arm.
    pub async fn run_cycle(&mut self) -> ProtocolResult<()> {
        self.process_package().await?;
        self.create_response().await?;
        self.reset(false).await;
        Ok(())
    }

    /// Read exactly one AJP packet from the connection and process it.
    pub async fn process_package(&mut self) -> ProtocolResult<()> {
        let mut conn = self.take_connection()?;
        let result = match self.state {
            HandlerState::Idle => self.process_first_package(&mut conn).await,
            HandlerState::Assigned => self.process_body_package(&mut conn).await,
        };
        self.conn = Some(conn);
        result
    }

    /// Resolve the declared content length for the current cycle. See the
    /// three cases on `handle_content_length_on`.
    pub async fn handle_content_length(&mut self) -> ProtocolResult<()> {
        let mut conn = self.take_connection()?;
        let result = self.handle_content_length_on(&mut conn).await;
        self.conn = Some(conn);
        result
    }

    /// Emit the response for the current cycle.
    pub async fn create_response(&mut self) -> ProtocolResult<()> {
        let mut conn = self.take_connection()?;
        let result = self.create_response_on(&mut conn).await;
        self.conn = Some(conn);
        result
    }

    fn take_connection(&mut self) -> ProtocolResult<AjpConnection> {
        self.conn.take().ok_or_else(|| {
            ProtocolError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "handler has no connection assigned",
            ))
        })
    }

    async fn process_first_package(&mut self, conn: &mut AjpConnection) -> ProtocolResult<()> {
        let magic = conn.read_magic().await?;
        self.check_magic(magic, conn)?;
        let length = conn.read_int().await? as usize;
        let prefix = conn.read_byte().await?;
        self.state = HandlerState::Assigned;

        let request = match prefix {
            PREFIX_FORWARD_REQUEST => {
                let payload = conn.read_payload(length.saturating_sub(1)).await?;
                Some(AjpRequest::Forward(ForwardRequest::parse(payload)?))
            }
            PREFIX_CPING => {
                conn.read_payload(length.saturating_sub(1)).await?;
                Some(AjpRequest::CPing(CPing))
            }
            PREFIX_SHUTDOWN | PREFIX_PING => {
                tracing::warn!(prefix, "unsupported message kind, abandoning cycle");
                conn.read_payload(length.saturating_sub(1)).await?;
                None
            }
            code => {
                tracing::warn!(
                    error = %ProtocolError::UnknownPrefixCode(code),
                    "abandoning cycle"
                );
                conn.read_payload(length.saturating_sub(1)).await?;
                None
            }
        };

        match request {
            Some(request) => {
                self.process_request(request, conn).await?;
                if matches!(self.request, Some(AjpRequest::Forward(_))) {
                    self.handle_content_length_on(conn).await?;
                }
            }
            None => self.request = None,
        }
        Ok(())
    }

    async fn process_body_package(&mut self, conn: &mut AjpConnection) -> ProtocolResult<()> {
        let magic = conn.read_magic().await?;
        self.check_magic(magic, conn)?;
        let length = conn.read_int().await? as usize;
        let payload = conn.read_payload(length).await?;
        let body = RequestBody::parse(payload)?;
        self.process_request(AjpRequest::Body(body), conn).await
    }

    /// Extract protocol-level fields from a decoded payload into the
    /// handler's state.
    async fn process_request(
        &mut self,
        request: AjpRequest,
        conn: &mut AjpConnection,
    ) -> ProtocolResult<()> {
        match request {
            AjpRequest::Forward(forward) => {
                self.apply_forward_request(&forward, conn).await;
                self.request = Some(AjpRequest::Forward(forward));
            }
            AjpRequest::CPing(probe) => {
                self.request = Some(AjpRequest::CPing(probe));
            }
            AjpRequest::Body(body) => self.apply_request_body(body),
        }
        Ok(())
    }

    async fn apply_forward_request(&mut self, forward: &ForwardRequest, conn: &mut AjpConnection) {
        self.content_length = forward.content_length();
        self.is_form_data = forward
            .header("Content-Type")
            .map(|v| v.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);

        let (session_id, joined) = extract_session(forward);
        self.http_session_id = session_id;
        self.http_session_joined = joined;

        let path = servlet_path_of(&forward.request_uri);
        self.set_servlet_instance(&path, conn).await;
    }

    fn apply_request_body(&mut self, body: RequestBody) {
        if body.is_empty() {
            self.empty_data_package_received = true;
            self.make_equal();
        } else {
            self.total_requested_content_length += body.data.len() as i64;
            self.body.get_or_insert_with(Vec::new).extend_from_slice(&body.data);
        }
    }

    /// Resolve the three content-length cases:
    /// - not set: chunked/unknown body, treated as empty (non-null)
    /// - zero: body explicitly empty (null)
    /// - positive: the very next packet is consumed as body before
    ///   control returns
    async fn handle_content_length_on(&mut self, conn: &mut AjpConnection) -> ProtocolResult<()> {
        if self.is_not_set() {
            self.body = Some(Vec::new());
        } else if self.content_length == 0 {
            self.body = None;
        } else {
            self.process_body_package(conn).await?;
        }
        Ok(())
    }

    /// Ask the web server for the rest of the declared body, one
    /// GET_BODY_CHUNK round-trip at a time.
    async fn read_remaining_body(&mut self, conn: &mut AjpConnection) -> ProtocolResult<()> {
        while self.is_more_data_expected() {
            let remaining =
                (self.content_length - self.total_requested_content_length).max(0) as usize;
            let request_size = remaining.min(MAX_READ_BODY_CHUNK_SIZE);
            let frame = encoder::get_body_chunk(request_size)?;
            conn.write_frame(&frame).await?;
            self.process_body_package(conn).await?;
        }
        Ok(())
    }

    async fn create_response_on(&mut self, conn: &mut AjpConnection) -> ProtocolResult<()> {
        let Some(request) = self.request.take() else {
            // the cycle was abandoned; the web server still gets its
            // END_RESPONSE so the request/response cycle terminates
            let frame = encoder::end_response(self.reuse_connection(false));
            conn.write_frame(&frame).await?;
            self.end_response_sent = true;
            return Ok(());
        };
        match request {
            AjpRequest::CPing(_) => {
                conn.write_frame(&encoder::cpong_reply()).await?;
            }
            AjpRequest::Forward(forward) => self.respond_forward(forward, conn).await?,
            // body packets are consumed inside the forward cycle
            AjpRequest::Body(_) => {}
        }
        Ok(())
    }

    async fn respond_forward(
        &mut self,
        forward: ForwardRequest,
        conn: &mut AjpConnection,
    ) -> ProtocolResult<()> {
        self.read_remaining_body(conn).await?;

        let query_string = forward.attribute("query_string").map(str::to_string);
        let request = ServletRequest {
            method: forward.method,
            request_uri: forward.request_uri,
            protocol: forward.protocol,
            servlet_path: self.servlet_path.clone().unwrap_or_default(),
            query_string,
            headers: forward.headers,
            attributes: forward.attributes,
            body: self.body.take(),
            session_id: self.http_session_id.clone(),
            session_joined: self.http_session_joined,
            remote_addr: forward.remote_addr,
            remote_host: forward.remote_host,
            server_name: forward.server_name,
            server_port: forward.server_port,
            is_ssl: forward.is_ssl,
        };

        let mut response = ServletResponse::new();
        self.service_method_called = true;
        let outcome = match &self.servlet {
            Some(servlet) => servlet.service(&request, &mut response),
            None => ErrorServlet.service(&request, &mut response),
        };
        if let Err(error) = outcome {
            tracing::error!(%error, path = %request.servlet_path, "servlet failed");
            response = ServletResponse::new();
            response.set_status(500, "Internal Server Error");
            response.add_header("Content-Type", "text/html");
            response.write(b"<html><body><h1>500 Internal Server Error</h1></body></html>");
        }

        let frame = encoder::send_headers(
            response.status,
            &response.status_message,
            &response.headers,
            &response.cookies,
        )?;
        conn.write_frame(&frame).await?;
        self.headers_sent = true;

        for chunk in response.body.chunks(MAX_SEND_BODY_CHUNK_SIZE) {
            conn.write_frame(&encoder::send_body_chunk(chunk)?).await?;
        }

        let frame = encoder::end_response(self.reuse_connection(response.close_connection));
        conn.write_frame(&frame).await?;
        self.end_response_sent = true;
        Ok(())
    }

    /// Resolve a servlet path to a bound servlet, falling back to the
    /// error servlet, and record connection-type accounting.
    pub async fn set_servlet_instance(&mut self, path: &str, conn: &mut AjpConnection) {
        let normalized = servlet::normalize_path(path);
        let resolved = self.ctx.servlets.resolve(&normalized);
        if !resolved.resolved {
            tracing::debug!(path = %normalized, "no servlet bound, using error servlet");
        }
        let kind = self.ctx.monitor.record(&normalized);
        conn.activity().describe(kind);
        self.servlet_path = Some(normalized);
        self.servlet = Some(self.ctx.servlet_pool.checkout(resolved.servlet).await);
    }

    fn check_magic(&self, magic: [u8; 2], conn: &AjpConnection) -> ProtocolResult<()> {
        if magic_matches(magic, self.ctx.config.check_magic_bytes_strict) {
            return Ok(());
        }
        let mut bytes = magic.to_vec();
        bytes.extend_from_slice(conn.buffered());
        Err(ProtocolError::InvalidByteSequence { bytes })
    }

    fn reuse_connection(&self, close_requested: bool) -> bool {
        encoder::connection_reuse(
            close_requested,
            self.ctx.config.mod_jk,
            self.ctx.sockets.open_count(),
            self.ctx.config.max_num_of_sockets,
        )
    }

    // Read-length accounting. These predicates gate how many
    // GET_BODY_CHUNK round-trips the handler issues.

    /// No content-length header was present.
    pub fn is_not_set(&self) -> bool {
        self.content_length == CONTENT_LENGTH_NOT_SET
    }

    /// Every declared body byte has arrived.
    pub fn is_all_data_read(&self) -> bool {
        self.total_requested_content_length == self.content_length
    }

    /// More declared body bytes are outstanding.
    pub fn is_more_data_expected(&self) -> bool {
        !self.is_not_set()
            && !self.empty_data_package_received
            && self.total_requested_content_length < self.content_length
    }

    /// The web server sent more than it declared.
    pub fn is_more_data_read_than_expected(&self) -> bool {
        !self.is_not_set() && self.total_requested_content_length > self.content_length
    }

    /// Force-mark the body as fully read, short-circuiting further body
    /// requests.
    pub fn make_equal(&mut self) {
        self.total_requested_content_length = self.content_length;
    }

    /// Roll every per-cycle field back to its default. Idempotent on an
    /// already-idle handler. Stream flushing is best-effort: failures are
    /// logged, never propagated. With `discard_connection` the owning
    /// connection is dropped so the handler can be reassigned.
    pub async fn reset(&mut self, discard_connection: bool) {
        if self.state == HandlerState::Idle && !discard_connection {
            return;
        }
        // returning the servlet releases its pool slot
        self.servlet = None;
        if let Some(conn) = self.conn.as_mut() {
            if let Err(error) = conn.flush().await {
                tracing::debug!(%error, "ignoring flush failure during reset");
            }
        }
        self.state = HandlerState::Idle;
        self.content_length = CONTENT_LENGTH_NOT_SET;
        self.total_requested_content_length = 0;
        self.headers_sent = false;
        self.service_method_called = false;
        self.end_response_sent = false;
        self.is_form_data = false;
        self.empty_data_package_received = false;
        self.http_session_id = None;
        self.http_session_joined = false;
        self.servlet_path = None;
        self.request = None;
        self.body = None;
        if discard_connection {
            self.conn = None;
        }
    }
}

/// Session id extraction: a `JSESSIONID` cookie wins and counts as a
/// joined session; a `;jsessionid=` URI suffix is a new session carrier.
fn extract_session(forward: &ForwardRequest) -> (Option<String>, bool) {
    for (name, value) in &forward.headers {
        if !name.eq_ignore_ascii_case("Cookie") {
            continue;
        }
        for pair in value.split(';') {
            let pair = pair.trim();
            if let Some(id) = pair.strip_prefix("JSESSIONID=") {
                return (Some(id.to_string()), true);
            }
        }
    }
    if let Some(start) = forward.request_uri.find(";jsessionid=") {
        let id = &forward.request_uri[start + ";jsessionid=".len()..];
        let id = id.split([';', '?']).next().unwrap_or(id);
        return (Some(id.to_string()), false);
    }
    (None, false)
}

/// The servlet path is the request URI without any `;jsessionid` suffix.
fn servlet_path_of(request_uri: &str) -> String {
    request_uri
        .split(';')
        .next()
        .unwrap_or(request_uri)
        .to_string()
}

/// Freelist of request handlers recycled between connections.
///
/// Sized by `AJP_REQUEST_HANDLER_POOL_SIZE`; disabled handlers are simply
/// dropped.
pub struct HandlerPool {
    handlers: Mutex<Vec<RequestHandler>>,
    max: usize,
}

impl HandlerPool {
    pub fn new(max: usize) -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            max,
        }
    }

    /// Take a re-armed handler, or build a fresh one.
    pub fn acquire(&self, ctx: &Arc<AjpContext>) -> RequestHandler {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| RequestHandler::new(Arc::clone(ctx)))
    }

    /// Return a handler for reuse. The handler must already be reset with
    /// its connection discarded.
    pub fn release(&self, handler: RequestHandler) {
        debug_assert!(handler.conn.is_none());
        let mut handlers = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if handlers.len() < self.max {
            handlers.push(handler);
        }
    }

    pub fn pooled(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AjpConfig;
    use crate::net::connection::{AjpConnection, SocketTracker};
    use crate::net::listener::ListenerActivity;
    use crate::protocol::{MAGIC_RESPONSE, PREFIX_END_RESPONSE};
    use crate::servlet::ServletRegistry;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    fn test_ctx(config: AjpConfig) -> Arc<AjpContext> {
        Arc::new(AjpContext::new(
            Arc::new(config),
            Arc::new(ServletRegistry::new()),
        ))
    }

    async fn connected_pair(ctx: &Arc<AjpContext>) -> (AjpConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (stream, peer) = listener.accept().await.unwrap();
        let activity = Arc::new(ListenerActivity::new(1));
        let conn = AjpConnection::new(
            stream,
            peer,
            ctx.config.listener_read_timeout(),
            None,
            activity,
            ctx.sockets.track(),
        );
        (conn, client)
    }

    fn body_packet(data: &[u8]) -> Vec<u8> {
        let mut frame = vec![0x12, 0x34];
        frame.extend_from_slice(&((data.len() + 2) as u16).to_be_bytes());
        frame.extend_from_slice(&(data.len() as u16).to_be_bytes());
        frame.extend_from_slice(data);
        frame
    }

    #[tokio::test]
    async fn content_length_not_set_yields_empty_body_without_reading() {
        let ctx = test_ctx(AjpConfig::default());
        let (conn, _client) = connected_pair(&ctx).await;
        let mut handler = RequestHandler::new(Arc::clone(&ctx));
        handler.assign(conn);
        handler.state = HandlerState::Assigned;
        handler.content_length = CONTENT_LENGTH_NOT_SET;

        handler.handle_content_length().await.unwrap();
        assert_eq!(handler.body, Some(Vec::new()));
        assert!(handler.is_not_set());
    }

    #[tokio::test]
    async fn content_length_zero_yields_null_body() {
        let ctx = test_ctx(AjpConfig::default());
        let (conn, _client) = connected_pair(&ctx).await;
        let mut handler = RequestHandler::new(Arc::clone(&ctx));
        handler.assign(conn);
        handler.state = HandlerState::Assigned;
        handler.content_length = 0;

        handler.handle_content_length().await.unwrap();
        assert_eq!(handler.body, None);
        assert!(handler.is_all_data_read());
    }

    #[tokio::test]
    async fn positive_content_length_reads_exactly_one_more_packet() {
        let ctx = test_ctx(AjpConfig::default());
        let (conn, mut client) = connected_pair(&ctx).await;
        client.write_all(&body_packet(b"form=1")).await.unwrap();

        let mut handler = RequestHandler::new(Arc::clone(&ctx));
        handler.assign(conn);
        handler.state = HandlerState::Assigned;
        handler.content_length = 6;

        handler.handle_content_length().await.unwrap();
        assert_eq!(handler.body.as_deref(), Some(b"form=1".as_slice()));
        assert_eq!(handler.total_requested_content_length, 6);
        assert!(handler.is_all_data_read());
        assert!(!handler.is_more_data_expected());
    }

    #[tokio::test]
    async fn empty_body_packet_short_circuits_further_requests() {
        let ctx = test_ctx(AjpConfig::default());
        let (conn, mut client) = connected_pair(&ctx).await;
        client.write_all(&body_packet(&[])).await.unwrap();

        let mut handler = RequestHandler::new(Arc::clone(&ctx));
        handler.assign(conn);
        handler.state = HandlerState::Assigned;
        handler.content_length = 100;

        handler.handle_content_length().await.unwrap();
        assert!(handler.empty_data_package_received);
        assert!(handler.is_all_data_read());
        assert!(!handler.is_more_data_expected());
    }

    #[tokio::test]
    async fn abandoned_cycle_still_terminates_with_end_response() {
        let ctx = test_ctx(AjpConfig::default());
        let (conn, mut client) = connected_pair(&ctx).await;
        // prefix 42 is not a known message kind
        client.write_all(&[0x12, 0x34, 0x00, 0x01, 42]).await.unwrap();

        let mut handler = RequestHandler::new(Arc::clone(&ctx));
        handler.assign(conn);
        handler.process_package().await.unwrap();
        assert!(handler.request.is_none());

        handler.create_response().await.unwrap();
        assert!(handler.end_response_sent);

        let mut reply = [0u8; 6];
        use tokio::io::AsyncReadExt;
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply[..2], &MAGIC_RESPONSE);
        assert_eq!(reply[4], PREFIX_END_RESPONSE);
    }

    #[tokio::test]
    async fn strict_magic_rejects_half_matching_pair() {
        let ctx = test_ctx(AjpConfig::default());
        let (conn, mut client) = connected_pair(&ctx).await;
        client.write_all(&[0x12, 0x00, 0x00, 0x01, 2]).await.unwrap();

        let mut handler = RequestHandler::new(Arc::clone(&ctx));
        handler.assign(conn);
        let error = handler.process_package().await.unwrap_err();
        assert!(matches!(error, ProtocolError::InvalidByteSequence { .. }));
    }

    #[tokio::test]
    async fn lenient_magic_accepts_half_matching_pair() {
        let mut config = AjpConfig::default();
        config.check_magic_bytes_strict = false;
        let ctx = test_ctx(config);
        let (conn, mut client) = connected_pair(&ctx).await;
        // half-matching magic, then a CPING
        client.write_all(&[0x12, 0x00, 0x00, 0x01, PREFIX_CPING]).await.unwrap();

        let mut handler = RequestHandler::new(Arc::clone(&ctx));
        handler.assign(conn);
        handler.process_package().await.unwrap();
        assert!(matches!(handler.request, Some(AjpRequest::CPing(_))));
    }

    #[tokio::test]
    async fn eof_on_first_byte_is_socket_closed() {
        let ctx = test_ctx(AjpConfig::default());
        let (conn, client) = connected_pair(&ctx).await;
        drop(client);

        let mut handler = RequestHandler::new(Arc::clone(&ctx));
        handler.assign(conn);
        let error = handler.process_package().await.unwrap_err();
        assert!(matches!(error, ProtocolError::SocketClosedByWebServer));
    }

    #[tokio::test]
    async fn reset_is_idempotent_on_idle_and_rolls_back_state() {
        let ctx = test_ctx(AjpConfig::default());
        let mut handler = RequestHandler::new(Arc::clone(&ctx));
        // no-op on an idle handler
        handler.reset(false).await;
        assert_eq!(handler.state(), HandlerState::Idle);

        handler.state = HandlerState::Assigned;
        handler.content_length = 10;
        handler.total_requested_content_length = 10;
        handler.headers_sent = true;
        handler.http_session_id = Some("abc".to_string());
        handler.reset(false).await;

        assert_eq!(handler.state(), HandlerState::Idle);
        assert!(handler.is_not_set());
        assert_eq!(handler.total_requested_content_length, 0);
        assert!(!handler.headers_sent);
        assert_eq!(handler.http_session_id, None);
    }

    #[tokio::test]
    async fn reset_can_discard_the_connection() {
        let ctx = test_ctx(AjpConfig::default());
        let (conn, _client) = connected_pair(&ctx).await;
        let mut handler = RequestHandler::new(Arc::clone(&ctx));
        handler.assign(conn);
        handler.state = HandlerState::Assigned;
        handler.reset(true).await;
        assert!(handler.conn.is_none());
    }

    #[test]
    fn accounting_predicates() {
        let ctx = test_ctx(AjpConfig::default());
        let mut handler = RequestHandler::new(ctx);
        assert!(handler.is_not_set());
        assert!(!handler.is_more_data_expected());

        handler.content_length = 10;
        handler.total_requested_content_length = 4;
        assert!(handler.is_more_data_expected());
        assert!(!handler.is_all_data_read());
        assert!(!handler.is_more_data_read_than_expected());

        handler.make_equal();
        assert!(handler.is_all_data_read());
        assert!(!handler.is_more_data_expected());

        handler.total_requested_content_length = 12;
        assert!(handler.is_more_data_read_than_expected());
    }

    #[test]
    fn session_extraction_prefers_cookie() {
        let mut forward = ForwardRequest::default();
        forward.request_uri = "/mail;jsessionid=FROMURI".to_string();
        forward
            .headers
            .push(("Cookie".to_string(), "theme=a; JSESSIONID=FROMCOOKIE".to_string()));
        let (id, joined) = extract_session(&forward);
        assert_eq!(id.as_deref(), Some("FROMCOOKIE"));
        assert!(joined);

        forward.headers.clear();
        let (id, joined) = extract_session(&forward);
        assert_eq!(id.as_deref(), Some("FROMURI"));
        assert!(!joined);

        forward.request_uri = "/mail".to_string();
        assert_eq!(extract_session(&forward), (None, false));
    }

    #[test]
    fn servlet_path_drops_session_suffix() {
        assert_eq!(servlet_path_of("/mail;jsessionid=X"), "/mail");
        assert_eq!(servlet_path_of("/mail"), "/mail");
    }

    #[tokio::test]
    async fn handler_pool_recycles_up_to_max() {
        let ctx = test_ctx(AjpConfig::default());
        let pool = HandlerPool::new(1);
        let first = pool.acquire(&ctx);
        let second = pool.acquire(&ctx);
        pool.release(first);
        pool.release(second);
        assert_eq!(pool.pooled(), 1);
    }
}
