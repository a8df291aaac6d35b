//! Response frame encoders.
//!
//! # Responsibilities
//! - Serialize the five container → web-server message kinds
//! - Enforce the 8192-byte frame ceiling and 2-byte integer bounds
//! - Encode well-known response header names as `0xA0xx` codes
//!
//! # Design Decisions
//! - Every entry point is a pure function returning a complete frame
//! - Size violations are errors, never silent truncation
//! - Header iteration order follows the caller-supplied order

use super::error::{ProtocolError, ProtocolResult};
use super::{
    MAGIC_RESPONSE, MAX_INT_VALUE, MAX_PACKAGE_SIZE, PREFIX_CPONG_REPLY, PREFIX_END_RESPONSE,
    PREFIX_GET_BODY_CHUNK, PREFIX_SEND_BODY_CHUNK, PREFIX_SEND_HEADERS,
};

/// The closed set of response header names with a 2-byte wire code.
/// Everything else is written as a length-prefixed string.
const RESPONSE_HEADER_CODES: [(&str, u16); 11] = [
    ("Content-Type", 0xA001),
    ("Content-Language", 0xA002),
    ("Content-Length", 0xA003),
    ("Date", 0xA004),
    ("Last-Modified", 0xA005),
    ("Location", 0xA006),
    ("Set-Cookie", 0xA007),
    ("Set-Cookie2", 0xA008),
    ("Servlet-Engine", 0xA009),
    ("Status", 0xA00A),
    ("WWW-Authenticate", 0xA00B),
];

/// Append a 2-byte big-endian integer.
fn put_int(buf: &mut Vec<u8>, value: usize) -> ProtocolResult<()> {
    if value > MAX_INT_VALUE {
        return Err(ProtocolError::IntegerValueTooBig(value));
    }
    buf.extend_from_slice(&(value as u16).to_be_bytes());
    Ok(())
}

/// Append a length-prefixed, NUL-terminated string.
///
/// The prefix is the character count; each character is truncated to one
/// byte. The protocol is not Unicode-transparent.
fn put_string(buf: &mut Vec<u8>, value: &str) -> ProtocolResult<()> {
    put_int(buf, value.chars().count())?;
    for ch in value.chars() {
        buf.push(ch as u32 as u8);
    }
    buf.push(0);
    Ok(())
}

/// Append a header name, coded when it is one of the well-known eleven.
fn put_header_name(buf: &mut Vec<u8>, name: &str) -> ProtocolResult<()> {
    let coded = RESPONSE_HEADER_CODES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name));
    match coded {
        Some((_, code)) => put_int(buf, *code as usize),
        None => put_string(buf, name),
    }
}

/// Wrap a payload in the response wire prefix: `'A' 'B' ++ LEN(2, BE)`.
fn frame(payload: Vec<u8>) -> ProtocolResult<Vec<u8>> {
    let total = payload.len() + 4;
    if total > MAX_PACKAGE_SIZE {
        return Err(ProtocolError::MaxPackageSizeExceeded(total));
    }
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&MAGIC_RESPONSE);
    put_int(&mut out, payload.len())?;
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Encode a SEND_BODY_CHUNK frame carrying `chunk`.
///
/// A chunk must carry at least one byte, and the framed result must stay
/// under the package ceiling; 8184 bytes is the largest usable chunk.
pub fn send_body_chunk(chunk: &[u8]) -> ProtocolResult<Vec<u8>> {
    if chunk.is_empty() {
        return Err(ProtocolError::NoEmptySendBodyChunk);
    }
    let mut payload = Vec::with_capacity(chunk.len() + 4);
    payload.push(PREFIX_SEND_BODY_CHUNK);
    put_int(&mut payload, chunk.len())?;
    payload.extend_from_slice(chunk);
    payload.push(0);
    frame(payload)
}

/// Encode a SEND_HEADERS frame.
///
/// Headers and cookies are interleaved into one header list: every cookie
/// value becomes its own `Set-Cookie` entry and is counted individually in
/// the header-count field. Iteration order is the caller's order.
pub fn send_headers(
    status: u16,
    status_message: &str,
    headers: &[(String, String)],
    cookies: &[String],
) -> ProtocolResult<Vec<u8>> {
    let mut payload = Vec::new();
    payload.push(PREFIX_SEND_HEADERS);
    put_int(&mut payload, status as usize)?;
    put_string(&mut payload, status_message)?;
    put_int(&mut payload, headers.len() + cookies.len())?;
    for (name, value) in headers {
        put_header_name(&mut payload, name)?;
        put_string(&mut payload, value)?;
    }
    for cookie in cookies {
        put_header_name(&mut payload, "Set-Cookie")?;
        put_string(&mut payload, cookie)?;
    }
    frame(payload)
}

/// Encode an END_RESPONSE frame with the given reuse flag.
pub fn end_response(reuse: bool) -> Vec<u8> {
    vec![
        MAGIC_RESPONSE[0],
        MAGIC_RESPONSE[1],
        0,
        2,
        PREFIX_END_RESPONSE,
        reuse as u8,
    ]
}

/// Compute the END_RESPONSE reuse flag.
///
/// A forced close always wins. Under mod_jk tunneling the connection is
/// always kept. Otherwise the connection is kept only while the server is
/// at or below its socket budget, shedding connections once saturated.
pub fn connection_reuse(
    close_requested: bool,
    mod_jk: bool,
    open_sockets: usize,
    max_sockets: usize,
) -> bool {
    if close_requested {
        false
    } else if mod_jk {
        true
    } else {
        open_sockets <= max_sockets
    }
}

/// Encode a GET_BODY_CHUNK frame requesting `requested` more body bytes.
pub fn get_body_chunk(requested: usize) -> ProtocolResult<Vec<u8>> {
    let mut payload = Vec::with_capacity(3);
    payload.push(PREFIX_GET_BODY_CHUNK);
    put_int(&mut payload, requested)?;
    frame(payload)
}

/// Encode the fixed 5-byte CPONG_REPLY frame acknowledging a CPING probe.
pub fn cpong_reply() -> Vec<u8> {
    vec![MAGIC_RESPONSE[0], MAGIC_RESPONSE[1], 0, 1, PREFIX_CPONG_REPLY]
}
