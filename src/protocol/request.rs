//! Request payload parsing.
//!
//! # Responsibilities
//! - Decode the three inbound payload kinds the container accepts
//! - Map coded method bytes and coded request-header names to strings
//! - Surface protocol-level fields (content length, session id, path)
//!
//! # Design Decisions
//! - One tagged enum over the payload kinds, dispatched by prefix code
//! - Parsers work on the already-read payload slice, never on the socket
//! - A string of length 0xFFFF decodes as absent, matching the wire dialect

use super::error::{ProtocolError, ProtocolResult};

/// One inbound payload, tagged by the prefix code that introduced it.
#[derive(Debug)]
pub enum AjpRequest {
    /// A full HTTP request forwarded by the web server.
    Forward(ForwardRequest),
    /// A keep-alive probe; answered with CPONG_REPLY.
    CPing(CPing),
    /// A request-body continuation packet.
    Body(RequestBody),
}

impl AjpRequest {
    /// Short tag for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            AjpRequest::Forward(_) => "forward-request",
            AjpRequest::CPing(_) => "cping",
            AjpRequest::Body(_) => "request-body",
        }
    }
}

/// Coded HTTP method table. The wire carries the 1-based index.
const METHOD_NAMES: [&str; 27] = [
    "OPTIONS",
    "GET",
    "HEAD",
    "POST",
    "PUT",
    "DELETE",
    "TRACE",
    "PROPFIND",
    "PROPPATCH",
    "MKCOL",
    "COPY",
    "MOVE",
    "LOCK",
    "UNLOCK",
    "ACL",
    "REPORT",
    "VERSION-CONTROL",
    "CHECKIN",
    "CHECKOUT",
    "UNCHECKOUT",
    "SEARCH",
    "MKWORKSPACE",
    "UPDATE",
    "LABEL",
    "MERGE",
    "BASELINE-CONTROL",
    "MKACTIVITY",
];

/// Coded request header names, `0xA001` upward.
const REQUEST_HEADER_NAMES: [&str; 14] = [
    "Accept",
    "Accept-Charset",
    "Accept-Encoding",
    "Accept-Language",
    "Authorization",
    "Connection",
    "Content-Type",
    "Content-Length",
    "Cookie",
    "Cookie2",
    "Host",
    "Pragma",
    "Referer",
    "User-Agent",
];

/// Coded attribute names, `0x01` upward. `req_attribute` (0x0A) carries its
/// own name; `ssl_key_size` (0x0B) carries a 2-byte integer value.
const ATTRIBUTE_NAMES: [&str; 11] = [
    "context",
    "servlet_path",
    "remote_user",
    "auth_type",
    "query_string",
    "route",
    "ssl_cert",
    "ssl_cipher",
    "ssl_session",
    "req_attribute",
    "ssl_key_size",
];

const ATTRIBUTE_REQ_ATTRIBUTE: u8 = 0x0A;
const ATTRIBUTE_SSL_KEY_SIZE: u8 = 0x0B;
const ATTRIBUTE_LIST_END: u8 = 0xFF;

/// The forward-request message: method, URI, headers and attributes.
#[derive(Debug, Default)]
pub struct ForwardRequest {
    pub method: String,
    pub protocol: String,
    pub request_uri: String,
    pub remote_addr: Option<String>,
    pub remote_host: Option<String>,
    pub server_name: Option<String>,
    pub server_port: u16,
    pub is_ssl: bool,
    /// Headers in wire order.
    pub headers: Vec<(String, String)>,
    /// Attributes in wire order.
    pub attributes: Vec<(String, String)>,
}

impl ForwardRequest {
    /// Parse the payload following a FORWARD_REQUEST prefix byte.
    pub fn parse(payload: &[u8]) -> ProtocolResult<Self> {
        let mut r = PayloadReader::new(payload, "forward-request");

        let method_code = r.byte()?;
        let method = METHOD_NAMES
            .get(method_code.wrapping_sub(1) as usize)
            .ok_or_else(|| malformed("forward-request", format!("method code {method_code}")))?
            .to_string();

        let protocol = r.string()?.unwrap_or_default();
        let request_uri = r.string()?.unwrap_or_default();
        let remote_addr = r.string()?;
        let remote_host = r.string()?;
        let server_name = r.string()?;
        let server_port = r.int()?;
        let is_ssl = r.byte()? != 0;

        let num_headers = r.int()? as usize;
        let mut headers = Vec::with_capacity(num_headers);
        for _ in 0..num_headers {
            let name = r.header_name()?;
            let value = r.string()?.unwrap_or_default();
            headers.push((name, value));
        }

        let mut attributes = Vec::new();
        loop {
            let code = match r.try_byte() {
                Some(code) => code,
                None => break,
            };
            match code {
                ATTRIBUTE_LIST_END => break,
                ATTRIBUTE_REQ_ATTRIBUTE => {
                    let name = r.string()?.unwrap_or_default();
                    let value = r.string()?.unwrap_or_default();
                    attributes.push((name, value));
                }
                ATTRIBUTE_SSL_KEY_SIZE => {
                    let bits = r.int()?;
                    attributes.push(("ssl_key_size".to_string(), bits.to_string()));
                }
                code => {
                    let name = ATTRIBUTE_NAMES
                        .get(code.wrapping_sub(1) as usize)
                        .ok_or_else(|| {
                            malformed("forward-request", format!("attribute code 0x{code:02x}"))
                        })?;
                    let value = r.string()?.unwrap_or_default();
                    attributes.push((name.to_string(), value));
                }
            }
        }

        Ok(Self {
            method,
            protocol,
            request_uri,
            remote_addr,
            remote_host,
            server_name,
            server_port,
            is_ssl,
            headers,
            attributes,
        })
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value by its decoded name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Declared content length; -1 when the header is absent or unreadable.
    pub fn content_length(&self) -> i64 {
        self.header("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(-1)
    }
}

/// The CPING probe carries no payload.
#[derive(Debug, Default)]
pub struct CPing;

/// A request-body continuation packet.
#[derive(Debug, Default)]
pub struct RequestBody {
    pub data: Vec<u8>,
}

impl RequestBody {
    /// Parse a body packet payload: `u16 length ++ bytes`.
    ///
    /// An empty payload is the web server's end-of-body marker and decodes
    /// as an empty body.
    pub fn parse(payload: &[u8]) -> ProtocolResult<Self> {
        if payload.is_empty() {
            return Ok(Self { data: Vec::new() });
        }
        let mut r = PayloadReader::new(payload, "request-body");
        let declared = r.int()? as usize;
        let data = r.bytes(declared)?.to_vec();
        Ok(Self { data })
    }

    /// True for the web server's "no more data" marker.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn malformed(kind: &'static str, reason: String) -> ProtocolError {
    ProtocolError::MalformedPayload { kind, reason }
}

/// Cursor over a payload slice with bounds-checked primitive reads.
struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
    kind: &'static str,
}

impl<'a> PayloadReader<'a> {
    fn new(buf: &'a [u8], kind: &'static str) -> Self {
        Self { buf, pos: 0, kind }
    }

    fn byte(&mut self) -> ProtocolResult<u8> {
        self.try_byte()
            .ok_or_else(|| malformed(self.kind, "unexpected end of payload".to_string()))
    }

    fn try_byte(&mut self) -> Option<u8> {
        let b = self.buf.get(self.pos).copied()?;
        self.pos += 1;
        Some(b)
    }

    fn int(&mut self) -> ProtocolResult<u16> {
        let hi = self.byte()?;
        let lo = self.byte()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn bytes(&mut self, n: usize) -> ProtocolResult<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len());
        match end {
            Some(end) => {
                let out = &self.buf[self.pos..end];
                self.pos = end;
                Ok(out)
            }
            None => Err(malformed(
                self.kind,
                format!("payload short of {n} declared bytes"),
            )),
        }
    }

    /// Read a length-prefixed, NUL-terminated string; 0xFFFF means absent.
    fn string(&mut self) -> ProtocolResult<Option<String>> {
        let len = self.int()?;
        if len == 0xFFFF {
            return Ok(None);
        }
        let raw = self.bytes(len as usize)?;
        let value = raw.iter().map(|&b| b as char).collect();
        // trailing NUL
        self.byte()?;
        Ok(Some(value))
    }

    /// Read a header name: either a coded `0xA0xx` pair or a string whose
    /// length the same two bytes already spelled out.
    fn header_name(&mut self) -> ProtocolResult<String> {
        let first = self.int()?;
        if first & 0xFF00 == 0xA000 {
            let idx = (first & 0x00FF) as usize;
            return REQUEST_HEADER_NAMES
                .get(idx.wrapping_sub(1))
                .map(|n| n.to_string())
                .ok_or_else(|| malformed(self.kind, format!("header code 0x{first:04x}")));
        }
        let raw = self.bytes(first as usize)?;
        let name = raw.iter().map(|&b| b as char).collect();
        self.byte()?;
        Ok(name)
    }
}
