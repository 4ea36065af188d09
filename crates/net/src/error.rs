use thiserror::Error;

/// Errors that cause a single inbound datagram to be dropped without
/// touching connection state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("header too short: got {got} bytes, need at least {need}")]
    HeaderTooShort { got: usize, need: usize },

    #[error("mismatched protocol id: expected {expected:#010x}, got {got:#010x}")]
    ProtocolMismatch { expected: u32, got: u32 },
}

/// Errors that change a connection's observable state rather than just
/// dropping a packet.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("handshake timed out after 5s with no response")]
    HandshakeTimeout,

    #[error("connection idle timeout: no datagram received within the timeout window")]
    IdleTimeout,
}

/// Errors decoding the tagged payload wire format.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PayloadError {
    #[error("unexpected end of payload buffer")]
    UnexpectedEof,

    #[error("unknown value tag byte {tag:#04x}")]
    UnknownTag { tag: u8 },

    #[error("unknown dict key tag byte {tag:#04x}")]
    UnknownKeyTag { tag: u8 },

    #[error("codebook id {id} has no entry")]
    UnknownCodebookId { id: u8 },

    #[error("utf8 bytes were not valid utf8")]
    InvalidUtf8,
}
