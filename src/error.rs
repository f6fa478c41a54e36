//! Error taxonomy.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
//
// Four error taxa: Handshake, Protocol, Application, and Stream. The first
// three are modeled here as top-level error enums; `Reason` is the one
// wire-visible code shared by Protocol (connection-scope) and Stream
// (stream-scope) errors.

use thiserror::Error;

/// A wire-visible HTTP/2 error code (RFC 7540 §7), extended with the
/// private codes this muxer raises internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Reason {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl Reason {
    /// Decode a reason code from the wire, falling back to `InternalError`
    /// for unrecognized values (peers may use codes we don't know about).
    #[must_use]
    pub fn from_wire(code: u32) -> Self {
        match code {
            0x0 => Self::NoError,
            0x1 => Self::ProtocolError,
            0x3 => Self::FlowControlError,
            0x4 => Self::SettingsTimeout,
            0x5 => Self::StreamClosed,
            0x6 => Self::FrameSizeError,
            0x7 => Self::RefusedStream,
            0x8 => Self::Cancel,
            0x9 => Self::CompressionError,
            0xa => Self::ConnectError,
            0xb => Self::EnhanceYourCalm,
            0xc => Self::InadequateSecurity,
            0xd => Self::Http11Required,
            _ => Self::InternalError,
        }
    }

    #[must_use]
    pub fn into_wire(self) -> u32 {
        self as u32
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Errors that can abort the handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("peer sent a non-SETTINGS frame during handshake")]
    NotSettings,
    #[error("peer sent an unexpected SETTINGS ACK during handshake")]
    UnexpectedAck,
    #[error("peer's SETTINGS frame did not contain the muxer magic setting")]
    NoMagic,
    #[error("peer's muxer magic value {0:#x} does not match the expected role")]
    WrongMagic(u32),
    #[error("peer did not ACK our SETTINGS frame")]
    NoAck,
    #[error("handshake timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("I/O error during handshake: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection-scoped protocol errors. Fatal to the whole connection; the
/// writer emits GOAWAY with the carried `Reason` before the connection is
/// torn down.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown frame type {0:#x}")]
    UnknownFrameType(u8),
    #[error("frame with stream id 0 is not valid for this frame type")]
    ZeroStreamId,
    #[error("malformed {0} frame")]
    Malformed(&'static str),
    #[error("variable-length integer overflowed")]
    VarIntOverflow,
    #[error("local write into stream failed: {0}")]
    Internal(String),
    #[error("HPACK coding error: {0}")]
    Hpack(String),
}

impl ProtocolError {
    /// The `Reason` this error should be reported to the peer as.
    #[must_use]
    pub fn reason(&self) -> Reason {
        match self {
            Self::Internal(_) => Reason::InternalError,
            Self::Hpack(_) => Reason::CompressionError,
            _ => Reason::ProtocolError,
        }
    }
}

/// Application-level errors visible through the `Muxer` facade.
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("headers have already been sent on this stream")]
    HeadersAlreadySent,
    #[error("stream request lost the race with connection shutdown")]
    LostShutdownRace,
    #[error("timed out waiting for response headers")]
    ResponseHeadersTimeout,
    #[error("connection closed while waiting")]
    ConnectionClosed,
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("the connection was dropped: {0}")]
    ConnectionDropped(&'static str),
}

/// One-stream failures. Never abort the muxer; reported to the writer via
/// the stream-error map and surfaced to the peer as RST_STREAM.
#[derive(Debug, Clone, Copy, Error)]
pub enum StreamError {
    #[error("traffic on a half-closed or reset stream")]
    StreamClosed,
    #[error("receive window underflowed")]
    FlowControl,
    #[error("incoming HEADERS for an existing stream")]
    Internal,
}

impl StreamError {
    #[must_use]
    pub fn reason(self) -> Reason {
        match self {
            Self::StreamClosed => Reason::StreamClosed,
            Self::FlowControl => Reason::FlowControlError,
            Self::Internal => Reason::InternalError,
        }
    }
}

pub type Result<T, E = MuxError> = std::result::Result<T, E>;
