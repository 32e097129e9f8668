//! h2mux - a synchronous HTTP/2 client engine
//!
//! This crate manages a single TCP/TLS connection to a server and multiplexes
//! many concurrent request/response exchanges ("streams") over it, per
//! RFC 7540. Header blocks are compressed with an in-crate HPACK
//! implementation (RFC 7541), and flow control is enforced at both connection
//! and stream granularity.
//!
//! # Architecture
//!
//! - [`codec`] parses and serializes HTTP/2 frames (pure functions).
//! - [`huffman`] and [`hpack`] implement RFC 7541 header compression; one
//!   encoder/decoder pair is shared per connection and lives as long as the
//!   connection does.
//! - [`state`] is the RFC 7540 Section 5.1 stream automaton, a pure
//!   transition table.
//! - [`flow_control`] tracks windows and decides, via a pluggable policy,
//!   when to emit WINDOW_UPDATE.
//! - [`stream`] couples the automaton, header/body buffering, and the
//!   per-stream windows; [`connection`] drives the read/dispatch loop and
//!   owns everything shared.
//! - [`transport`] and [`tls`] supply the byte transport; the engine itself
//!   is transport-agnostic.
//!
//! # Example
//!
//! ```no_run
//! use h2mux::connection::{ConnectionBuilder, Request};
//! use h2mux::transport::TcpTransport;
//! use std::time::Duration;
//!
//! # fn example() -> h2mux::error::Result<()> {
//! let transport = TcpTransport::connect("example.com:80", Some(Duration::from_secs(5)))?;
//! let mut conn = ConnectionBuilder::new().build(transport)?;
//! conn.connect()?;
//!
//! let stream_id = conn.request(Request::get("/").authority("example.com"))?;
//! let response = conn.response(stream_id)?;
//! println!("status: {}", response.status());
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod connection;
pub mod error;
pub mod flow_control;
pub mod frame;
pub mod headers;
pub mod hpack;
pub mod huffman;
pub mod settings;
pub mod state;
pub mod stream;
pub mod tls;
pub mod transport;

pub use connection::{Connection, ConnectionBuilder, PushedResponse, Request, Response};
pub use error::{Error, ErrorCode, Result};
pub use frame::{Frame, FrameFlags, FrameType};
pub use headers::Headers;
pub use settings::{Settings, SettingsBuilder};
pub use state::{StreamId, StreamState};

/// HTTP/2 connection preface that must be sent by clients
///
/// From RFC 7540 Section 3.5:
/// "PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n"
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Default initial window size (65535 bytes)
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65535;

/// Default maximum frame size (16384 bytes)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// Default header table size (4096 bytes)
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;

/// Maximum stream ID value (2^31 - 1)
pub const MAX_STREAM_ID: u32 = 0x7FFF_FFFF;

/// Stream ID 0 (connection-level)
pub const CONNECTION_STREAM_ID: u32 = 0;
