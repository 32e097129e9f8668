//! HTTP/2 connection
//!
//! Owns the transport, the shared HPACK encoder/decoder pair, the
//! connection-level flow-control windows, and the stream table, and drives
//! the single-threaded read/dispatch loop. All multiplexing here is
//! logical: one thread interleaves application calls with frame processing,
//! and embedders driving one connection from several threads must serialize
//! access externally.
//!
//! Two ordering rules the dispatch loop enforces:
//! - header blocks are HPACK-decoded in wire arrival order, never response
//!   order, because the dynamic table is one shared automaton;
//! - HEADERS/PUSH_PROMISE followed by CONTINUATION is one atomic block, and
//!   any other frame interleaved into it is a connection error.

use crate::codec::{FrameCodec, FRAME_HEADER_SIZE};
use crate::error::{Error, ErrorCode, Result};
use crate::flow_control::{FlowControlManager, FlowControlWindow};
use crate::frame::*;
use crate::headers::Headers;
use crate::hpack;
use crate::hpack::HeaderEntry;
use crate::settings::{Settings, SettingsBuilder};
use crate::state::StreamId;
use crate::stream::Stream;
use crate::tls::TlsTransport;
use crate::transport::Transport;
use crate::{CONNECTION_PREFACE, CONNECTION_STREAM_ID, MAX_STREAM_ID};
use bytes::{Bytes, BytesMut};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::io::Read;

/// An HTTP/2 request to be sent on a new stream
///
/// Pseudo-headers are built from the method/scheme/authority/path fields
/// and always precede the user-supplied headers on the wire; nothing is
/// transmitted until the request is handed to [`Connection::request`].
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    scheme: String,
    authority: String,
    path: String,
    headers: Vec<HeaderEntry>,
    body: Option<Bytes>,
    streaming: bool,
}

impl Request {
    /// Create a request with an explicit method
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Request {
            method: method.into(),
            scheme: "https".to_string(),
            authority: String::new(),
            path: path.into(),
            headers: Vec::new(),
            body: None,
            streaming: false,
        }
    }

    /// GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    /// POST request with a body
    pub fn post(path: impl Into<String>, body: Bytes) -> Self {
        let mut request = Self::new("POST", path);
        request.body = Some(body);
        request
    }

    /// Set the `:scheme` pseudo-header (default "https")
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Set the `:authority` pseudo-header
    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    /// Append a user header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(HeaderEntry::new(name, value));
        self
    }

    /// Attach a body
    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    /// Leave the stream open after the headers so the body can be streamed
    /// afterwards with [`Connection::send_body`] or
    /// [`Connection::send_data`]
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// The full header list: pseudo-headers first, then user headers
    fn entries(&self) -> Result<Vec<HeaderEntry>> {
        for header in &self.headers {
            if header.name.starts_with(':') {
                return Err(Error::InvalidHeader(format!(
                    "user headers may not use the pseudo-header prefix: {}",
                    header.name
                )));
            }
        }

        let mut entries = Vec::with_capacity(4 + self.headers.len());
        entries.push(HeaderEntry::new(":method", self.method.clone()));
        entries.push(HeaderEntry::new(":scheme", self.scheme.clone()));
        entries.push(HeaderEntry::new(":authority", self.authority.clone()));
        entries.push(HeaderEntry::new(":path", self.path.clone()));
        entries.extend(self.headers.iter().cloned());
        Ok(entries)
    }
}

/// A fully received HTTP/2 response
#[derive(Debug)]
pub struct Response {
    stream_id: StreamId,
    status: u16,
    headers: Headers,
    trailers: Option<Headers>,
    body: Bytes,
}

impl Response {
    /// The stream this response arrived on
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Status code from `:status`
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Response headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// First value of one header
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Trailers, if the peer sent a trailing header block
    pub fn trailers(&self) -> Option<&Headers> {
        self.trailers.as_ref()
    }

    /// Response body
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Response body as UTF-8
    pub fn body_string(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| Error::Protocol(format!("response body is not UTF-8: {e}")))
    }
}

/// A server push announced by PUSH_PROMISE
///
/// Carries the synthetic request the server claims to be answering. The
/// header map holds only regular headers; pseudo-headers are lifted into
/// the dedicated fields and everything else with the reserved `:` prefix
/// is dropped.
#[derive(Debug, Clone)]
pub struct PushedResponse {
    /// The promised (server-initiated, even) stream carrying the response
    pub stream_id: StreamId,
    /// The client stream the promise was attached to
    pub parent_stream_id: StreamId,
    /// `:method` of the synthetic request
    pub method: Option<String>,
    /// `:scheme` of the synthetic request
    pub scheme: Option<String>,
    /// `:authority` of the synthetic request
    pub authority: Option<String>,
    /// `:path` of the synthetic request
    pub path: Option<String>,
    /// Regular headers of the synthetic request
    pub headers: Headers,
}

/// In-flight header block split across HEADERS/PUSH_PROMISE + CONTINUATION
struct ContinuationState {
    stream_id: StreamId,
    /// Set when the block came from PUSH_PROMISE
    promised_stream_id: Option<StreamId>,
    end_stream: bool,
    block: BytesMut,
}

/// One HTTP/2 client connection
pub struct Connection<T: Transport> {
    transport: T,
    /// Shared compression context; lives as long as the connection
    encoder: hpack::Encoder,
    decoder: hpack::Decoder,
    /// Connection-level outbound budget
    send_window: FlowControlWindow,
    /// Connection-level inbound accounting and WINDOW_UPDATE policy
    recv_flow: FlowControlManager,
    streams: HashMap<StreamId, Stream>,
    /// Next client-initiated stream id; odd, monotonic, never reused
    next_stream_id: StreamId,
    local_settings: Settings,
    remote_settings: Settings,
    continuation: Option<ContinuationState>,
    pushes: HashMap<StreamId, Vec<PushedResponse>>,
    huffman: bool,
    connected: bool,
    saw_remote_settings: bool,
    closed: bool,
    /// Last stream id from a graceful GOAWAY, if one arrived
    draining_after: Option<StreamId>,
}

impl Connection<TlsTransport> {
    /// Build over a TLS transport, refusing to proceed unless ALPN
    /// negotiated `h2`
    pub fn from_tls(transport: TlsTransport) -> Result<Self> {
        ConnectionBuilder::new().build_tls(transport)
    }
}

impl<T: Transport> Connection<T> {
    /// Perform the HTTP/2 connection preface and settings exchange.
    ///
    /// Sends the 24-byte client preface immediately followed by our
    /// SETTINGS, then processes frames until the peer's SETTINGS arrived
    /// and was acknowledged. Must complete before the first request.
    pub fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        self.transport.write_all(CONNECTION_PREFACE)?;
        let settings = SettingsFrame::new(self.local_settings.clone());
        self.write_frame(&Frame::Settings(settings))?;

        while !self.saw_remote_settings {
            self.process_frame()?;
        }

        self.connected = true;
        Ok(())
    }

    /// Local settings
    pub fn local_settings(&self) -> &Settings {
        &self.local_settings
    }

    /// Peer settings as last received
    pub fn remote_settings(&self) -> &Settings {
        &self.remote_settings
    }

    /// Number of streams not yet fully closed
    pub fn active_stream_count(&self) -> usize {
        self.streams
            .values()
            .filter(|s| !s.state().is_closed())
            .count()
    }

    /// Remaining connection-level send window
    pub fn send_window_size(&self) -> i64 {
        self.send_window.size()
    }

    /// Send a request, returning the stream id the response will arrive on.
    ///
    /// Allocates the next odd stream id (ids are monotonic and never
    /// reused), frames the headers through the shared encoder in wire
    /// order, and transmits headers plus any body before returning.
    pub fn request(&mut self, request: Request) -> Result<StreamId> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        if self.closed || self.draining_after.is_some() {
            return Err(Error::ConnectionClosed);
        }
        if let Some(max) = self.remote_settings.get_max_concurrent_streams() {
            if self.active_stream_count() >= max as usize {
                return Err(Error::TooManyStreams);
            }
        }
        if self.next_stream_id > MAX_STREAM_ID {
            return Err(Error::ConnectionClosed);
        }

        let entries = request.entries()?;
        let stream_id = self.next_stream_id;
        self.next_stream_id += 2;

        let mut stream = self.new_stream(stream_id);
        let end_stream = request.body.is_none() && !request.streaming;
        let frames = stream.send_headers(
            &entries,
            &mut self.encoder,
            self.huffman,
            end_stream,
            self.remote_settings.get_max_frame_size() as usize,
        )?;
        for frame in &frames {
            self.write_frame(frame)?;
        }
        self.streams.insert(stream_id, stream);

        if let Some(body) = request.body {
            self.send_data(stream_id, body, true)?;
        }

        Ok(stream_id)
    }

    /// Send body data on an open stream.
    ///
    /// Charges both the stream and the connection send windows; either
    /// being too small is an error rather than a partial send.
    pub fn send_data(&mut self, stream_id: StreamId, data: Bytes, end_stream: bool) -> Result<()> {
        if !self.send_window.can_send(data.len()) {
            return Err(Error::FlowControl(format!(
                "connection window exhausted ({} bytes available, {} requested)",
                self.send_window.size(),
                data.len()
            )));
        }

        let stream = self
            .streams
            .get_mut(&stream_id)
            .ok_or(Error::StreamNotFound(stream_id))?;
        let frame = stream.send_data(data, end_stream)?;
        self.send_window.consume(match &frame {
            Frame::Data(f) => f.data.len(),
            _ => 0,
        });
        self.write_frame(&frame)
    }

    /// Stream a request body from a reader in bounded chunks, ending the
    /// stream on the final chunk
    pub fn send_body(&mut self, stream_id: StreamId, reader: &mut dyn Read) -> Result<()> {
        let frames = {
            let stream = self
                .streams
                .get_mut(&stream_id)
                .ok_or(Error::StreamNotFound(stream_id))?;
            stream.send_body(reader)?
        };
        for frame in &frames {
            if let Frame::Data(f) = frame {
                if !self.send_window.can_send(f.data.len()) {
                    return Err(Error::FlowControl(
                        "connection window exhausted mid-body".to_string(),
                    ));
                }
                self.send_window.consume(f.data.len());
            }
            self.write_frame(frame)?;
        }
        Ok(())
    }

    /// Drive the read loop until the response on `stream_id` is complete,
    /// then hand it over and drop the stream from the table.
    ///
    /// Server pushes attached to this stream remain retrievable through
    /// [`take_pushes`](Self::take_pushes) afterwards.
    pub fn response(&mut self, stream_id: StreamId) -> Result<Response> {
        loop {
            let stream = self
                .streams
                .get(&stream_id)
                .ok_or(Error::StreamNotFound(stream_id))?;

            if stream.reset_error().is_some()
                || stream.failure().is_some()
                || (stream.stream_complete() && stream.headers_complete())
            {
                let mut stream = self
                    .streams
                    .remove(&stream_id)
                    .ok_or(Error::StreamNotFound(stream_id))?;
                if let Some(code) = stream.reset_error() {
                    return Err(Error::StreamReset { stream_id, code });
                }
                if let Some(reason) = stream.failure() {
                    return Err(Error::Protocol(reason.to_string()));
                }
                let status = stream
                    .status()
                    .ok_or_else(|| Error::Protocol("response missing :status".to_string()))?;
                return Ok(Response {
                    stream_id,
                    status,
                    headers: stream.headers().cloned().unwrap_or_default(),
                    trailers: stream.trailers().cloned(),
                    body: stream.take_body(),
                });
            }

            self.process_frame()?;
        }
    }

    /// Server pushes recorded for a parent stream, draining them
    pub fn take_pushes(&mut self, parent_stream_id: StreamId) -> Vec<PushedResponse> {
        self.pushes.remove(&parent_stream_id).unwrap_or_default()
    }

    /// Send a PING with caller-chosen opaque data
    pub fn ping(&mut self, data: [u8; 8]) -> Result<()> {
        self.write_frame(&Frame::Ping(PingFrame::new(data)))
    }

    /// Reset one stream with the given error code
    pub fn reset_stream(&mut self, stream_id: StreamId, error_code: ErrorCode) -> Result<()> {
        let stream = self
            .streams
            .get_mut(&stream_id)
            .ok_or(Error::StreamNotFound(stream_id))?;
        if let Some(frame) = stream.close(error_code)? {
            self.write_frame(&frame)?;
        }
        Ok(())
    }

    /// Shut the connection down.
    ///
    /// Sends a graceful GOAWAY, resets every live stream, and closes the
    /// transport. Safe to call twice; the second call is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let goaway = GoawayFrame::new(0, ErrorCode::NoError, Bytes::new());
        // Teardown writes are best effort; the peer may already be gone
        if let Err(e) = self.write_frame(&Frame::Goaway(goaway)) {
            debug!("GOAWAY write failed during close: {e}");
        }

        let ids: Vec<StreamId> = self.streams.keys().copied().collect();
        for id in ids {
            if let Some(stream) = self.streams.get_mut(&id) {
                stream.fail("connection closed");
                if let Ok(Some(frame)) = stream.close(ErrorCode::Cancel) {
                    if let Err(e) = self.write_frame(&frame) {
                        debug!("RST_STREAM write failed during close: {e}");
                        break;
                    }
                }
            }
        }

        self.transport.close()
    }

    /// Read and dispatch exactly one frame.
    ///
    /// Connection-level frames (SETTINGS, PING, GOAWAY, WINDOW_UPDATE on
    /// stream 0) are handled inline; everything else is routed to its
    /// stream. Frames for unknown streams are dropped without failing the
    /// loop, and unknown frame types are skipped by their declared length.
    pub fn process_frame(&mut self) -> Result<()> {
        let mut header_bytes = [0u8; FRAME_HEADER_SIZE];
        self.read_exact(&mut header_bytes)?;

        let header = match FrameCodec::parse_frame_header(&header_bytes) {
            Ok(header) => header,
            Err(Error::UnknownFrameType { frame_type, length }) => {
                trace!("skipping unknown frame type 0x{frame_type:x} ({length} bytes)");
                let mut remaining = length;
                let mut scratch = [0u8; 512];
                while remaining > 0 {
                    let chunk = remaining.min(scratch.len());
                    self.read_exact(&mut scratch[..chunk])?;
                    remaining -= chunk;
                }
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let max = self.local_settings.get_max_frame_size() as usize;
        if header.length > max {
            return Err(Error::FrameSize(format!(
                "{} frame of {} bytes exceeds advertised maximum {max}",
                header.frame_type.name(),
                header.length
            )));
        }

        let mut payload = vec![0u8; header.length];
        self.read_exact(&mut payload)?;
        let frame = FrameCodec::parse_body(header, Bytes::from(payload))?;

        // An open header block admits nothing but its own CONTINUATION
        if let Some(pending) = &self.continuation {
            match &frame {
                Frame::Continuation(f) if f.stream_id == pending.stream_id => {}
                other => {
                    return Err(Error::Protocol(format!(
                        "{} frame interleaved into a header block on stream {}",
                        other.frame_type().name(),
                        pending.stream_id
                    )));
                }
            }
        }

        self.dispatch(frame)
    }

    // --- internals ---

    fn new_stream(&self, stream_id: StreamId) -> Stream {
        Stream::with_windows(
            stream_id,
            FlowControlWindow::with_initial_size(self.remote_settings.get_initial_window_size()),
            FlowControlManager::with_initial_size(self.local_settings.get_initial_window_size()),
        )
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut read = 0;
        while read < buf.len() {
            let n = self.transport.read(&mut buf[read..])?;
            if n == 0 {
                self.fail_all_streams("connection closed by peer");
                self.closed = true;
                return Err(Error::ConnectionClosed);
            }
            read += n;
        }
        Ok(())
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let wire = FrameCodec::serialize(frame);
        self.transport.write_all(&wire)
    }

    fn fail_all_streams(&mut self, reason: &str) {
        for stream in self.streams.values_mut() {
            if !stream.state().is_closed() {
                stream.fail(reason);
            }
        }
    }

    fn dispatch(&mut self, frame: Frame) -> Result<()> {
        match frame {
            Frame::Data(f) => self.on_data(f),
            Frame::Headers(f) => self.on_headers(f),
            Frame::Priority(f) => {
                if let Some(stream) = self.streams.get_mut(&f.stream_id) {
                    stream.set_priority(f.priority);
                }
                Ok(())
            }
            Frame::RstStream(f) => self.on_rst_stream(f),
            Frame::Settings(f) => self.on_settings(f),
            Frame::PushPromise(f) => self.on_push_promise(f),
            Frame::Ping(f) => {
                if f.ack {
                    trace!("PING ack received");
                    Ok(())
                } else {
                    self.write_frame(&Frame::Ping(PingFrame::ack(f.data)))
                }
            }
            Frame::Goaway(f) => self.on_goaway(f),
            Frame::WindowUpdate(f) => self.on_window_update(f),
            Frame::Continuation(f) => self.on_continuation(f),
        }
    }

    fn on_data(&mut self, frame: DataFrame) -> Result<()> {
        let flow_size = frame.flow_controlled_len() as u32;

        // The connection window is charged for every DATA frame, known
        // stream or not; overflow here is a connection-level violation.
        let conn_increment = self.recv_flow.handle_frame(CONNECTION_STREAM_ID, flow_size)?;

        match self.streams.get_mut(&frame.stream_id) {
            Some(stream) => {
                match stream.receive_data(&frame.data, flow_size, frame.end_stream) {
                    Ok(stream_increment) => {
                        if stream_increment > 0 && !stream.state().is_closed() {
                            let update = stream.increase_flow_control_window(stream_increment)?;
                            self.write_frame(&update)?;
                        }
                    }
                    Err(e) => self.reset_on_stream_error(frame.stream_id, e)?,
                }
            }
            None => {
                // Late frame for a stream we already tore down; common
                // after a reset, must not kill the read loop.
                debug!("DATA for unknown stream {}", frame.stream_id);
            }
        }

        if conn_increment > 0 {
            self.recv_flow.apply_increment(conn_increment)?;
            self.write_frame(&Frame::WindowUpdate(WindowUpdateFrame::new(
                CONNECTION_STREAM_ID,
                conn_increment,
            )))?;
        }
        Ok(())
    }

    fn on_headers(&mut self, frame: HeadersFrame) -> Result<()> {
        if let Some(priority) = frame.priority {
            if let Some(stream) = self.streams.get_mut(&frame.stream_id) {
                stream.set_priority(priority);
            }
        }

        if frame.end_headers {
            self.finish_header_block(frame.stream_id, None, frame.header_block, frame.end_stream)
        } else {
            self.continuation = Some(ContinuationState {
                stream_id: frame.stream_id,
                promised_stream_id: None,
                end_stream: frame.end_stream,
                block: BytesMut::from(&frame.header_block[..]),
            });
            Ok(())
        }
    }

    fn on_continuation(&mut self, frame: ContinuationFrame) -> Result<()> {
        let mut pending = self.continuation.take().ok_or_else(|| {
            Error::Protocol(format!(
                "CONTINUATION on stream {} without an open header block",
                frame.stream_id
            ))
        })?;

        pending.block.extend_from_slice(&frame.header_block);
        if frame.end_headers {
            let block = pending.block.freeze();
            self.finish_header_block(
                pending.stream_id,
                pending.promised_stream_id,
                block,
                pending.end_stream,
            )
        } else {
            self.continuation = Some(pending);
            Ok(())
        }
    }

    /// Decode one complete header block, then apply it.
    ///
    /// Decoding happens unconditionally and immediately: the block mutates
    /// the shared dynamic table even when its stream is already gone, so
    /// skipping or deferring it would desynchronize the compression
    /// context for every later block.
    fn finish_header_block(
        &mut self,
        stream_id: StreamId,
        promised_stream_id: Option<StreamId>,
        block: Bytes,
        end_stream: bool,
    ) -> Result<()> {
        let entries = self.decoder.decode(&block)?;

        if let Some(promised_id) = promised_stream_id {
            return self.register_push(stream_id, promised_id, entries);
        }

        match self.streams.get_mut(&stream_id) {
            Some(stream) => {
                let applied = stream
                    .receive_headers(end_stream)
                    .and_then(|()| stream.store_header_list(entries));
                if let Err(e) = applied {
                    self.reset_on_stream_error(stream_id, e)?;
                }
                Ok(())
            }
            None => {
                debug!("HEADERS for unknown stream {stream_id}");
                Ok(())
            }
        }
    }

    fn register_push(
        &mut self,
        parent_stream_id: StreamId,
        promised_id: StreamId,
        entries: Vec<HeaderEntry>,
    ) -> Result<()> {
        if promised_id % 2 != 0 || promised_id == 0 {
            return Err(Error::Protocol(format!(
                "promised stream id {promised_id} is not server-initiated"
            )));
        }
        if !self.streams.contains_key(&parent_stream_id) {
            debug!("PUSH_PROMISE on unknown parent stream {parent_stream_id}");
            return Ok(());
        }
        if self.streams.contains_key(&promised_id) {
            return Err(Error::Protocol(format!(
                "promised stream id {promised_id} already in use"
            )));
        }

        let mut push = PushedResponse {
            stream_id: promised_id,
            parent_stream_id,
            method: None,
            scheme: None,
            authority: None,
            path: None,
            headers: Headers::new(),
        };
        for entry in entries {
            if let Some(pseudo) = entry.name.strip_prefix(':') {
                match pseudo {
                    "method" => push.method = Some(entry.value),
                    "scheme" => push.scheme = Some(entry.value),
                    "authority" => push.authority = Some(entry.value),
                    "path" => push.path = Some(entry.value),
                    // Reserved-prefix names outside the request set are
                    // excluded from the synthetic request entirely.
                    other => debug!("dropping pseudo-header :{other} from push promise"),
                }
            } else {
                push.headers.insert(entry.name, entry.value);
            }
        }

        let stream = Stream::promised(
            promised_id,
            FlowControlWindow::with_initial_size(self.remote_settings.get_initial_window_size()),
            FlowControlManager::with_initial_size(self.local_settings.get_initial_window_size()),
        );
        self.streams.insert(promised_id, stream);
        self.pushes.entry(parent_stream_id).or_default().push(push);
        Ok(())
    }

    fn on_push_promise(&mut self, frame: PushPromiseFrame) -> Result<()> {
        if !self.local_settings.get_enable_push() {
            return Err(Error::Protocol(
                "PUSH_PROMISE received with push disabled".to_string(),
            ));
        }

        if frame.end_headers {
            self.finish_header_block(
                frame.stream_id,
                Some(frame.promised_stream_id),
                frame.header_block,
                false,
            )
        } else {
            self.continuation = Some(ContinuationState {
                stream_id: frame.stream_id,
                promised_stream_id: Some(frame.promised_stream_id),
                end_stream: false,
                block: BytesMut::from(&frame.header_block[..]),
            });
            Ok(())
        }
    }

    fn on_rst_stream(&mut self, frame: RstStreamFrame) -> Result<()> {
        match self.streams.get_mut(&frame.stream_id) {
            Some(stream) => {
                if let Err(e) = stream.receive_rst(frame.error_code) {
                    debug!("RST_STREAM on stream {}: {e}", frame.stream_id);
                }
            }
            None => debug!("RST_STREAM for unknown stream {}", frame.stream_id),
        }
        Ok(())
    }

    fn on_settings(&mut self, frame: SettingsFrame) -> Result<()> {
        if frame.ack {
            trace!("SETTINGS ack received");
            return Ok(());
        }

        frame.settings.validate()?;

        // HEADER_TABLE_SIZE: the peer's decoder budget governs our encoder
        if let Some(size) = frame.settings.header_table_size {
            self.encoder.set_max_table_size(size as usize);
        }

        // INITIAL_WINDOW_SIZE: re-base every stream's send window by the
        // delta (RFC 7540 Section 6.9.2)
        if let Some(new_size) = frame.settings.initial_window_size {
            for stream in self.streams.values_mut() {
                stream.send_window_mut().update_initial_size(new_size)?;
            }
        }

        self.remote_settings.merge(&frame.settings);
        self.saw_remote_settings = true;

        self.write_frame(&Frame::Settings(SettingsFrame::ack()))
    }

    fn on_goaway(&mut self, frame: GoawayFrame) -> Result<()> {
        let debug_data = String::from_utf8_lossy(&frame.debug_data).to_string();

        if frame.error_code == ErrorCode::NoError.as_u32() {
            // Graceful shutdown: streams at or below last_stream_id still
            // complete; anything newer was refused and nothing new starts.
            debug!(
                "graceful GOAWAY, last stream {} {}",
                frame.last_stream_id, debug_data
            );
            self.draining_after = Some(frame.last_stream_id);
            for (id, stream) in self.streams.iter_mut() {
                if *id > frame.last_stream_id && !stream.state().is_closed() {
                    stream.fail("refused by graceful shutdown");
                }
            }
            return Ok(());
        }

        warn!(
            "GOAWAY {}: {}",
            ErrorCode::describe(frame.error_code),
            debug_data
        );
        self.fail_all_streams("connection terminated by GOAWAY");
        self.closed = true;
        Err(Error::GoAway {
            code: frame.error_code,
            debug: debug_data,
        })
    }

    fn on_window_update(&mut self, frame: WindowUpdateFrame) -> Result<()> {
        if frame.stream_id == CONNECTION_STREAM_ID {
            // A bad connection-level update is fatal
            self.send_window.increase(frame.size_increment)?;
            return Ok(());
        }

        match self.streams.get_mut(&frame.stream_id) {
            Some(stream) => {
                if let Err(e) = stream.receive_window_update(frame.size_increment) {
                    self.reset_on_stream_error(frame.stream_id, e)?;
                }
            }
            None => debug!("WINDOW_UPDATE for unknown stream {}", frame.stream_id),
        }
        Ok(())
    }

    /// Handle a stream-scoped violation by the peer: reset that one stream
    /// and record the reason for whoever awaits it. The connection and the
    /// other streams keep going (RFC 7540 Section 5.4.2).
    fn reset_on_stream_error(&mut self, stream_id: StreamId, error: Error) -> Result<()> {
        let code = match &error {
            Error::WindowOverflow { .. } => ErrorCode::FlowControlError,
            Error::FlowControl(_) => ErrorCode::FlowControlError,
            _ => ErrorCode::ProtocolError,
        };
        warn!("resetting stream {stream_id}: {error}");

        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.fail(error.to_string());
            if let Ok(Some(frame)) = stream.close(code) {
                self.write_frame(&frame)?;
            }
        }
        Ok(())
    }
}

/// Builder for [`Connection`]
pub struct ConnectionBuilder {
    settings: SettingsBuilder,
    huffman: bool,
}

impl ConnectionBuilder {
    /// Builder with client defaults
    pub fn new() -> Self {
        ConnectionBuilder {
            settings: SettingsBuilder::new()
                .header_table_size(4096)
                .enable_push(true)
                .initial_window_size(65535)
                .max_frame_size(16384),
            huffman: true,
        }
    }

    /// Set our header table size (peer encoder budget)
    pub fn header_table_size(mut self, size: u32) -> Self {
        self.settings = self.settings.header_table_size(size);
        self
    }

    /// Allow or forbid server push
    pub fn enable_push(mut self, enable: bool) -> Self {
        self.settings = self.settings.enable_push(enable);
        self
    }

    /// Set our initial stream receive window
    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.settings = self.settings.initial_window_size(size);
        self
    }

    /// Set the largest frame we accept
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.settings = self.settings.max_frame_size(size);
        self
    }

    /// Advertise a decoded-header-list budget
    pub fn max_header_list_size(mut self, size: u32) -> Self {
        self.settings = self.settings.max_header_list_size(size);
        self
    }

    /// Toggle Huffman coding of outbound header literals (default on)
    pub fn huffman(mut self, huffman: bool) -> Self {
        self.huffman = huffman;
        self
    }

    /// Build over any transport
    pub fn build<T: Transport>(self, transport: T) -> Result<Connection<T>> {
        let local_settings = self.settings.build()?;

        let mut decoder =
            hpack::Decoder::with_table_size(local_settings.get_header_table_size() as usize);
        decoder.set_max_header_list_size(
            local_settings.get_max_header_list_size().map(|s| s as usize),
        );

        Ok(Connection {
            transport,
            encoder: hpack::Encoder::new(),
            decoder,
            send_window: FlowControlWindow::new(),
            recv_flow: FlowControlManager::with_initial_size(
                local_settings.get_initial_window_size(),
            ),
            streams: HashMap::new(),
            next_stream_id: 1,
            local_settings,
            remote_settings: Settings::new(),
            continuation: None,
            pushes: HashMap::new(),
            huffman: self.huffman,
            connected: false,
            saw_remote_settings: false,
            closed: false,
            draining_after: None,
        })
    }

    /// Build over TLS, verifying that ALPN selected `h2` first
    pub fn build_tls(self, transport: TlsTransport) -> Result<Connection<TlsTransport>> {
        if !transport.is_h2() {
            let negotiated = transport.negotiated_protocol().map(<[u8]>::to_vec);
            return Err(Error::AlpnFailed(negotiated));
        }
        self.build(transport)
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
