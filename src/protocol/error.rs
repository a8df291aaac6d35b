//! Protocol error definitions.

use thiserror::Error;

/// Errors raised while framing, parsing or encoding AJP13 packets.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Any underlying stream failure, read timeouts included.
    #[error("I/O error on AJP connection: {0}")]
    Io(#[from] std::io::Error),

    /// EOF before the first magic byte of a packet was seen.
    #[error("socket closed by web server")]
    SocketClosedByWebServer,

    /// EOF between the first and second magic byte.
    #[error("input stream ended inside the initial magic bytes")]
    EmptyInputStream,

    /// Magic bytes present but rejected by the configured policy. Carries
    /// the offending bytes plus whatever was already buffered, for the log.
    #[error("invalid byte sequence at packet start: [{}]", hex_dump(.bytes))]
    InvalidByteSequence { bytes: Vec<u8> },

    /// First-packet prefix byte outside the known set. Non-fatal: the
    /// current cycle is abandoned, the connection survives.
    #[error("unknown prefix code 0x{0:02x}")]
    UnknownPrefixCode(u8),

    /// A response frame would exceed the wire ceiling.
    #[error("response package of {0} bytes exceeds the 8192 byte limit")]
    MaxPackageSizeExceeded(usize),

    /// An integer does not fit the protocol's 2-byte encoding.
    #[error("integer value {0} exceeds the protocol maximum of 65535")]
    IntegerValueTooBig(usize),

    /// A body chunk must carry at least one byte.
    #[error("refusing to encode an empty body chunk")]
    NoEmptySendBodyChunk,

    /// A payload did not decode as its prefix code promised.
    #[error("malformed {kind} payload: {reason}")]
    MalformedPayload {
        kind: &'static str,
        reason: String,
    },
}

/// Result alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Render bytes as a spaced hex string for diagnostics.
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
