//! Error types for the HTTP/2 engine
//!
//! One crate-level error enum plus the error-code registry from
//! RFC 7540 Section 7, used by RST_STREAM and GOAWAY frames.

use crate::state::{StreamInput, StreamState};
use std::fmt;

/// Errors raised by the HTTP/2 engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error on the underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS error from the OpenSSL layer
    #[error("TLS error: {0}")]
    Tls(#[from] openssl::error::ErrorStack),

    /// Protocol violation that is not a stream-state transition
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Illegal stream-state transition; the stream has been forced to Closed
    #[error("protocol error: {input} is not valid in stream state {state}")]
    InvalidTransition {
        /// State the stream was in when the input arrived
        state: StreamState,
        /// The attempted input
        input: StreamInput,
    },

    /// Malformed HPACK block or invalid table reference
    ///
    /// The shared compression context is out of sync once this fires; the
    /// connection cannot be recovered.
    #[error("HPACK decoding error: {0}")]
    HpackDecoding(String),

    /// Payload length inconsistent with the frame type's layout
    #[error("frame size error: {0}")]
    FrameSize(String),

    /// Frame type byte not in the RFC 7540 registry
    ///
    /// Skippable per the forward-compatibility rule: the caller may discard
    /// `length` payload bytes and continue.
    #[error("unknown frame type 0x{frame_type:x} ({length} byte payload)")]
    UnknownFrameType {
        /// The unrecognized type byte
        frame_type: u8,
        /// Declared payload length, for skipping
        length: usize,
    },

    /// Peer sent more bytes than the flow-control window permitted
    #[error("flow control violation on stream {stream_id}: {frame_size} bytes received with only {window} available")]
    WindowOverflow {
        /// Stream the violation occurred on (0 = connection window)
        stream_id: u32,
        /// Window size at the time of the violation
        window: i64,
        /// Size of the offending frame
        frame_size: u32,
    },

    /// Flow control bookkeeping error (zero increment, 2^31-1 overflow, ...)
    #[error("flow control error: {0}")]
    FlowControl(String),

    /// Peer sent GOAWAY with a non-zero error code
    #[error("{}", format_goaway(*code, debug))]
    GoAway {
        /// Raw error code from the frame
        code: u32,
        /// Trailing debug data, lossily decoded
        debug: String,
    },

    /// Stream was reset by the peer (RST_STREAM)
    #[error("stream {stream_id} reset by peer: {}", ErrorCode::describe(*code))]
    StreamReset {
        /// The reset stream
        stream_id: u32,
        /// Error code carried by the RST_STREAM frame
        code: u32,
    },

    /// Operation referenced a stream this connection does not know about
    #[error("stream not found: {0}")]
    StreamNotFound(u32),

    /// Operation attempted on a closed stream
    #[error("stream closed: {0}")]
    StreamClosed(u32),

    /// SETTINGS_MAX_CONCURRENT_STREAMS would be exceeded
    #[error("too many concurrent streams")]
    TooManyStreams,

    /// Setting value outside its legal range
    #[error("invalid settings value: {0}")]
    InvalidSettings(String),

    /// Connection has been shut down (locally or by a graceful GOAWAY)
    #[error("connection closed")]
    ConnectionClosed,

    /// ALPN negotiated something other than h2
    #[error("ALPN negotiation failed: expected h2, got {0:?}")]
    AlpnFailed(Option<Vec<u8>>),

    /// Transport timeout elapsed
    #[error("timeout")]
    Timeout,

    /// Malformed header (bad pseudo-header placement, uppercase name, ...)
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Request issued before the preface/SETTINGS exchange
    #[error("connection not established")]
    NotConnected,
}

fn format_goaway(code: u32, debug: &str) -> String {
    if debug.is_empty() {
        format!("connection terminated by peer: GOAWAY {}", ErrorCode::describe(code))
    } else {
        format!(
            "connection terminated by peer: GOAWAY {} ({debug})",
            ErrorCode::describe(code)
        )
    }
}

/// HTTP/2 error codes as defined in RFC 7540 Section 7
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    /// Graceful shutdown
    NoError = 0x0,
    /// Protocol error detected
    ProtocolError = 0x1,
    /// Implementation fault
    InternalError = 0x2,
    /// Flow-control limits exceeded
    FlowControlError = 0x3,
    /// Settings not acknowledged
    SettingsTimeout = 0x4,
    /// Frame received for closed stream
    StreamClosed = 0x5,
    /// Frame size incorrect
    FrameSizeError = 0x6,
    /// Stream not processed
    RefusedStream = 0x7,
    /// Stream cancelled
    Cancel = 0x8,
    /// Compression state not updated
    CompressionError = 0x9,
    /// TCP connection error for CONNECT method
    ConnectError = 0xa,
    /// Processing capacity exceeded
    EnhanceYourCalm = 0xb,
    /// Negotiated TLS parameters not acceptable
    InadequateSecurity = 0xc,
    /// Use HTTP/1.1 for the request
    Http11Required = 0xd,
}

impl ErrorCode {
    /// Convert error code to u32
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Create error code from u32
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0x0 => Some(ErrorCode::NoError),
            0x1 => Some(ErrorCode::ProtocolError),
            0x2 => Some(ErrorCode::InternalError),
            0x3 => Some(ErrorCode::FlowControlError),
            0x4 => Some(ErrorCode::SettingsTimeout),
            0x5 => Some(ErrorCode::StreamClosed),
            0x6 => Some(ErrorCode::FrameSizeError),
            0x7 => Some(ErrorCode::RefusedStream),
            0x8 => Some(ErrorCode::Cancel),
            0x9 => Some(ErrorCode::CompressionError),
            0xa => Some(ErrorCode::ConnectError),
            0xb => Some(ErrorCode::EnhanceYourCalm),
            0xc => Some(ErrorCode::InadequateSecurity),
            0xd => Some(ErrorCode::Http11Required),
            _ => None,
        }
    }

    /// Get error name
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "NO_ERROR",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::FlowControlError => "FLOW_CONTROL_ERROR",
            ErrorCode::SettingsTimeout => "SETTINGS_TIMEOUT",
            ErrorCode::StreamClosed => "STREAM_CLOSED",
            ErrorCode::FrameSizeError => "FRAME_SIZE_ERROR",
            ErrorCode::RefusedStream => "REFUSED_STREAM",
            ErrorCode::Cancel => "CANCEL",
            ErrorCode::CompressionError => "COMPRESSION_ERROR",
            ErrorCode::ConnectError => "CONNECT_ERROR",
            ErrorCode::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            ErrorCode::InadequateSecurity => "INADEQUATE_SECURITY",
            ErrorCode::Http11Required => "HTTP_1_1_REQUIRED",
        }
    }

    /// Get a short human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "graceful shutdown",
            ErrorCode::ProtocolError => "protocol error detected",
            ErrorCode::InternalError => "implementation fault",
            ErrorCode::FlowControlError => "flow-control limits exceeded",
            ErrorCode::SettingsTimeout => "settings not acknowledged",
            ErrorCode::StreamClosed => "frame received for closed stream",
            ErrorCode::FrameSizeError => "frame size incorrect",
            ErrorCode::RefusedStream => "stream not processed",
            ErrorCode::Cancel => "stream cancelled",
            ErrorCode::CompressionError => "compression state not updated",
            ErrorCode::ConnectError => "TCP connection error for CONNECT method",
            ErrorCode::EnhanceYourCalm => "processing capacity exceeded",
            ErrorCode::InadequateSecurity => "negotiated TLS parameters not acceptable",
            ErrorCode::Http11Required => "use HTTP/1.1 for the request",
        }
    }

    /// Describe a raw code, falling back to the numeric value for codes
    /// outside the registry.
    pub fn describe(code: u32) -> String {
        match ErrorCode::from_u32(code) {
            Some(known) => format!("{} (0x{:x}): {}", known.name(), code, known.description()),
            None => format!("unknown error code 0x{code:x}"),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u32())
    }
}

/// Result type for HTTP/2 operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(ErrorCode::NoError.as_u32(), 0x0);
        assert_eq!(ErrorCode::ProtocolError.as_u32(), 0x1);
        assert_eq!(ErrorCode::Http11Required.as_u32(), 0xd);

        assert_eq!(ErrorCode::from_u32(0x0), Some(ErrorCode::NoError));
        assert_eq!(ErrorCode::from_u32(0x1), Some(ErrorCode::ProtocolError));
        assert_eq!(ErrorCode::from_u32(0xff), None);
    }

    #[test]
    fn test_error_code_name() {
        assert_eq!(ErrorCode::NoError.name(), "NO_ERROR");
        assert_eq!(ErrorCode::ProtocolError.name(), "PROTOCOL_ERROR");
        assert_eq!(ErrorCode::FlowControlError.name(), "FLOW_CONTROL_ERROR");
    }

    #[test]
    fn test_goaway_display_known_code() {
        let err = Error::GoAway {
            code: 0x1,
            debug: String::new(),
        };
        let msg = err.to_string();
        assert!(msg.contains("PROTOCOL_ERROR"), "{msg}");
        assert!(msg.contains("0x1"), "{msg}");
    }

    #[test]
    fn test_goaway_display_unknown_code() {
        let err = Error::GoAway {
            code: 0x42,
            debug: "drain".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("0x42"), "{msg}");
        assert!(msg.contains("drain"), "{msg}");
    }

    #[test]
    fn test_stream_reset_display() {
        let err = Error::StreamReset {
            stream_id: 5,
            code: 0x8,
        };
        assert!(err.to_string().contains("CANCEL"));
    }
}
