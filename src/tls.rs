//! TLS configuration and transport
//!
//! A caller-owned TLS client configuration, built explicitly and handed to
//! the connection; its lifetime is tied to whatever the caller does with
//! it, never to process-wide state. ALPN defaults to advertising `h2`, and
//! the negotiated protocol is surfaced so the connection can refuse to
//! start HTTP/2 framing when the peer picked something else.

use crate::error::{Error, Result};
use crate::transport::Transport;
use openssl::ssl::{SslConnector, SslMethod, SslStream, SslVerifyMode, SslVersion};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::time::Duration;

/// Minimum TLS protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    fn to_openssl_version(self) -> SslVersion {
        match self {
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }
}

/// TLS client configuration
///
/// Build with [`TlsConfig::client`]; connect with [`TlsConfig::connect`].
pub struct TlsConfig {
    connector: SslConnector,
    servername: String,
}

impl TlsConfig {
    /// Start building a client configuration for `servername` (used for
    /// both SNI and certificate verification)
    pub fn client(servername: impl Into<String>) -> TlsConfigBuilder {
        TlsConfigBuilder {
            servername: servername.into(),
            min_version: TlsVersion::Tls12,
            alpn: vec![b"h2".to_vec()],
            verify_peer: true,
            ca_file: None,
        }
    }

    /// Run the TLS handshake over an established TCP stream
    pub fn connect(&self, stream: TcpStream, timeout: Option<Duration>) -> Result<TlsTransport> {
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;

        let ssl_stream = self
            .connector
            .connect(&self.servername, stream)
            .map_err(|e| Error::Protocol(format!("TLS handshake failed: {e}")))?;

        Ok(TlsTransport { stream: ssl_stream })
    }
}

/// Builder for [`TlsConfig`]
pub struct TlsConfigBuilder {
    servername: String,
    min_version: TlsVersion,
    alpn: Vec<Vec<u8>>,
    verify_peer: bool,
    ca_file: Option<PathBuf>,
}

impl TlsConfigBuilder {
    /// Set the minimum TLS version (default: TLS 1.2)
    pub fn min_version(mut self, version: TlsVersion) -> Self {
        self.min_version = version;
        self
    }

    /// Replace the ALPN protocol list (default: `["h2"]`)
    pub fn alpn(mut self, protocols: &[&str]) -> Self {
        self.alpn = protocols.iter().map(|p| p.as_bytes().to_vec()).collect();
        self
    }

    /// Enable or disable peer certificate verification (default: enabled)
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    /// Trust an additional CA bundle file
    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<TlsConfig> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())?;

        builder.set_min_proto_version(Some(self.min_version.to_openssl_version()))?;

        // ALPN wire format: each protocol is length-prefixed
        let mut alpn_wire = Vec::new();
        for protocol in &self.alpn {
            alpn_wire.push(protocol.len() as u8);
            alpn_wire.extend_from_slice(protocol);
        }
        builder.set_alpn_protos(&alpn_wire)?;

        if !self.verify_peer {
            builder.set_verify(SslVerifyMode::NONE);
        }
        if let Some(ca) = &self.ca_file {
            builder.set_ca_file(ca)?;
        }

        Ok(TlsConfig {
            connector: builder.build(),
            servername: self.servername,
        })
    }
}

/// TLS transport over TCP
pub struct TlsTransport {
    stream: SslStream<TcpStream>,
}

impl TlsTransport {
    /// The ALPN protocol the peer selected, if any
    pub fn negotiated_protocol(&self) -> Option<&[u8]> {
        self.stream.ssl().selected_alpn_protocol()
    }

    /// Whether the peer agreed to speak HTTP/2
    pub fn is_h2(&self) -> bool {
        self.negotiated_protocol() == Some(b"h2")
    }
}

impl Transport for TlsTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read(buf).map_err(map_io_timeout)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(map_io_timeout)
    }

    fn close(&mut self) -> Result<()> {
        // A close_notify refused by the peer is fine during teardown
        let _ = self.stream.shutdown();
        Ok(())
    }
}

fn map_io_timeout(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Error::Timeout,
        _ => Error::Io(e),
    }
}
