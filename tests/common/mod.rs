//! Shared utilities: a mock web-server-side AJP client for integration
//! tests.
#![allow(dead_code)]

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const PREFIX_FORWARD_REQUEST: u8 = 2;
pub const PREFIX_SEND_BODY_CHUNK: u8 = 3;
pub const PREFIX_SEND_HEADERS: u8 = 4;
pub const PREFIX_END_RESPONSE: u8 = 5;
pub const PREFIX_GET_BODY_CHUNK: u8 = 6;
pub const PREFIX_CPONG_REPLY: u8 = 9;
pub const PREFIX_CPING: u8 = 10;

/// One response frame as seen by the web server.
#[derive(Debug)]
pub struct ResponseFrame {
    pub prefix: u8,
    pub payload: Vec<u8>,
}

/// Everything the container sent for one request cycle.
#[derive(Debug, Default)]
pub struct CycleReply {
    pub status: u16,
    pub status_message: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub reuse: bool,
    pub saw_headers: bool,
}

/// Plays the web-server side of the protocol.
pub struct AjpClient {
    stream: TcpStream,
}

impl AjpClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self { stream }
    }

    pub async fn send(&mut self, frame: &[u8]) {
        self.stream.write_all(frame).await.unwrap();
    }

    /// Read one `'A' 'B'`-framed response.
    pub async fn read_frame(&mut self) -> ResponseFrame {
        let mut head = [0u8; 4];
        self.stream.read_exact(&mut head).await.unwrap();
        assert_eq!(&head[..2], b"AB", "response frame magic");
        let len = u16::from_be_bytes([head[2], head[3]]) as usize;
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await.unwrap();
        ResponseFrame {
            prefix: payload[0],
            payload,
        }
    }

    /// True when the container has closed the connection.
    pub async fn at_eof(&mut self) -> bool {
        let mut byte = [0u8; 1];
        matches!(self.stream.read(&mut byte).await, Ok(0))
    }

    /// Drive one cycle to completion, answering GET_BODY_CHUNK requests
    /// from `remaining_body` until END_RESPONSE arrives.
    pub async fn read_cycle(&mut self, mut remaining_body: &[u8]) -> CycleReply {
        let mut reply = CycleReply::default();
        loop {
            let frame = self.read_frame().await;
            match frame.prefix {
                PREFIX_SEND_HEADERS => {
                    let (status, message, headers) = parse_send_headers(&frame.payload);
                    reply.status = status;
                    reply.status_message = message;
                    reply.headers = headers;
                    reply.saw_headers = true;
                }
                PREFIX_SEND_BODY_CHUNK => {
                    let len = u16::from_be_bytes([frame.payload[1], frame.payload[2]]) as usize;
                    reply.body.extend_from_slice(&frame.payload[3..3 + len]);
                }
                PREFIX_GET_BODY_CHUNK => {
                    let requested =
                        u16::from_be_bytes([frame.payload[1], frame.payload[2]]) as usize;
                    let take = requested.min(remaining_body.len());
                    let (chunk, rest) = remaining_body.split_at(take);
                    self.send(&body_packet(chunk)).await;
                    remaining_body = rest;
                }
                PREFIX_END_RESPONSE => {
                    reply.reuse = frame.payload[1] != 0;
                    return reply;
                }
                other => panic!("unexpected response prefix {other}"),
            }
        }
    }
}

fn put_string(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
    buf.extend_from_slice(value.as_bytes());
    buf.push(0);
}

fn frame(payload: Vec<u8>) -> Vec<u8> {
    let mut out = vec![0x12, 0x34];
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out
}

/// Build a framed forward request. Method code 2 is GET, 4 is POST.
pub fn forward_request(method_code: u8, uri: &str, headers: &[(&str, &str)]) -> Vec<u8> {
    let mut payload = vec![PREFIX_FORWARD_REQUEST, method_code];
    put_string(&mut payload, "HTTP/1.1");
    put_string(&mut payload, uri);
    put_string(&mut payload, "127.0.0.1");
    payload.extend_from_slice(&0xFFFFu16.to_be_bytes()); // remote_host absent
    put_string(&mut payload, "localhost");
    payload.extend_from_slice(&8009u16.to_be_bytes());
    payload.push(0); // not ssl
    payload.extend_from_slice(&(headers.len() as u16).to_be_bytes());
    for (name, value) in headers {
        put_string(&mut payload, name);
        put_string(&mut payload, value);
    }
    payload.push(0xFF); // attribute list end
    frame(payload)
}

/// Build a framed body-continuation packet.
pub fn body_packet(data: &[u8]) -> Vec<u8> {
    if data.is_empty() {
        // end-of-body marker: zero-length payload
        return frame(Vec::new());
    }
    let mut payload = (data.len() as u16).to_be_bytes().to_vec();
    payload.extend_from_slice(data);
    frame(payload)
}

/// Build a framed CPING probe.
pub fn cping() -> Vec<u8> {
    vec![0x12, 0x34, 0x00, 0x01, PREFIX_CPING]
}

/// Build a framed packet with an arbitrary prefix code and no payload.
pub fn bare_packet(prefix: u8) -> Vec<u8> {
    vec![0x12, 0x34, 0x00, 0x01, prefix]
}

fn parse_send_headers(payload: &[u8]) -> (u16, String, Vec<(String, String)>) {
    let mut pos = 1usize;
    let status = u16::from_be_bytes([payload[pos], payload[pos + 1]]);
    pos += 2;
    let (message, next) = parse_string(payload, pos);
    pos = next;
    let count = u16::from_be_bytes([payload[pos], payload[pos + 1]]) as usize;
    pos += 2;
    let mut headers = Vec::with_capacity(count);
    for _ in 0..count {
        let first = u16::from_be_bytes([payload[pos], payload[pos + 1]]);
        let name = if first & 0xFF00 == 0xA000 {
            pos += 2;
            coded_header_name(first).to_string()
        } else {
            let (name, next) = parse_string(payload, pos);
            pos = next;
            name
        };
        let (value, next) = parse_string(payload, pos);
        pos = next;
        headers.push((name, value));
    }
    (status, message, headers)
}

fn parse_string(payload: &[u8], pos: usize) -> (String, usize) {
    let len = u16::from_be_bytes([payload[pos], payload[pos + 1]]) as usize;
    let start = pos + 2;
    let value = String::from_utf8_lossy(&payload[start..start + len]).into_owned();
    // skip the trailing NUL
    (value, start + len + 1)
}

fn coded_header_name(code: u16) -> &'static str {
    match code {
        0xA001 => "Content-Type",
        0xA002 => "Content-Language",
        0xA003 => "Content-Length",
        0xA004 => "Date",
        0xA005 => "Last-Modified",
        0xA006 => "Location",
        0xA007 => "Set-Cookie",
        0xA008 => "Set-Cookie2",
        0xA009 => "Servlet-Engine",
        0xA00A => "Status",
        0xA00B => "WWW-Authenticate",
        _ => "unknown",
    }
}
