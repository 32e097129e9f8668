//! HTTP/2 stream
//!
//! Couples the Section 5.1 automaton with response buffering, the stream's
//! share of HPACK encoding, and its flow-control windows. Operations either
//! produce frames for the connection to transmit or consume frames the
//! connection dispatched here.
//!
//! Ordering invariant: state transitions happen *before* HPACK encoding.
//! The compression context mutates irreversibly on encode, so the stream
//! must already be committed to the send even if framing fails afterwards.

use crate::error::{Error, Result};
use crate::flow_control::{FlowControlManager, FlowControlWindow};
use crate::frame::{
    ContinuationFrame, DataFrame, Frame, HeadersFrame, PrioritySpec, RstStreamFrame,
    WindowUpdateFrame,
};
use crate::headers::Headers;
use crate::hpack::{Encoder, HeaderEntry};
use crate::state::{StreamId, StreamInput, StreamState, StreamStateMachine};
use bytes::{Bytes, BytesMut};
use std::io::Read;

/// Chunk size for streamed request bodies
pub const BODY_CHUNK_SIZE: usize = 1024;

/// One logical HTTP/2 stream
#[derive(Debug)]
pub struct Stream {
    id: StreamId,
    machine: StreamStateMachine,
    /// Outbound budget, grown by the peer's WINDOW_UPDATE
    send_window: FlowControlWindow,
    /// Inbound accounting plus the WINDOW_UPDATE policy for this stream
    recv_flow: FlowControlManager,
    priority: Option<PrioritySpec>,
    status: Option<u16>,
    headers: Option<Headers>,
    trailers: Option<Headers>,
    body: BytesMut,
    headers_complete: bool,
    stream_complete: bool,
    reset_error: Option<u32>,
    failure: Option<String>,
}

impl Stream {
    /// Create a stream in the Idle state with default window sizes
    pub fn new(id: StreamId) -> Self {
        Self::with_windows(id, FlowControlWindow::new(), FlowControlManager::new())
    }

    /// Create a stream with explicit windows
    pub fn with_windows(
        id: StreamId,
        send_window: FlowControlWindow,
        recv_flow: FlowControlManager,
    ) -> Self {
        Stream {
            id,
            machine: StreamStateMachine::new(),
            send_window,
            recv_flow,
            priority: None,
            status: None,
            headers: None,
            trailers: None,
            body: BytesMut::new(),
            headers_complete: false,
            stream_complete: false,
            reset_error: None,
            failure: None,
        }
    }

    /// Create a server-pushed stream (enters reserved-remote on the
    /// PUSH_PROMISE that announced it)
    pub fn promised(
        id: StreamId,
        send_window: FlowControlWindow,
        recv_flow: FlowControlManager,
    ) -> Self {
        let mut stream = Self::with_windows(id, send_window, recv_flow);
        stream.machine = StreamStateMachine::in_state(StreamState::ReservedRemote);
        stream
    }

    /// Stream ID
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Current automaton state
    pub fn state(&self) -> StreamState {
        self.machine.state()
    }

    /// Priority advertised by the peer, if any
    pub fn priority(&self) -> Option<&PrioritySpec> {
        self.priority.as_ref()
    }

    /// Record peer-advertised priority
    pub fn set_priority(&mut self, priority: PrioritySpec) {
        self.priority = Some(priority);
    }

    /// Outbound window
    pub fn send_window(&self) -> &FlowControlWindow {
        &self.send_window
    }

    /// Outbound window, mutable (SETTINGS re-basing, WINDOW_UPDATE receipt)
    pub fn send_window_mut(&mut self) -> &mut FlowControlWindow {
        &mut self.send_window
    }

    /// Remaining inbound window
    pub fn recv_window_size(&self) -> i64 {
        self.recv_flow.window().size()
    }

    /// Whether END_HEADERS has been seen for the response headers
    pub fn headers_complete(&self) -> bool {
        self.headers_complete
    }

    /// Whether END_STREAM has been seen
    pub fn stream_complete(&self) -> bool {
        self.stream_complete
    }

    /// Response status code, once headers are decoded
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Decoded response headers
    pub fn headers(&self) -> Option<&Headers> {
        self.headers.as_ref()
    }

    /// Decoded trailers, if a trailing header block arrived
    pub fn trailers(&self) -> Option<&Headers> {
        self.trailers.as_ref()
    }

    /// Error code from a peer RST_STREAM, if the stream was reset
    pub fn reset_error(&self) -> Option<u32> {
        self.reset_error
    }

    /// Record a local failure (protocol violation by the peer on this
    /// stream, connection teardown); surfaced to whoever awaits the response
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.failure.is_none() {
            self.failure = Some(reason.into());
        }
    }

    /// The recorded failure, if any
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Take the accumulated body
    pub fn take_body(&mut self) -> Bytes {
        std::mem::take(&mut self.body).freeze()
    }

    // --- frame-producing operations ---

    /// Encode and frame a header list for this stream.
    ///
    /// Transitions the automaton first, then encodes: the encoder's table
    /// mutation must be considered done even if framing fails afterwards.
    /// The block is split into `max_frame_size` chunks: HEADERS first, then
    /// CONTINUATION. END_HEADERS goes only on the last frame; END_STREAM
    /// (when requested) only on the HEADERS frame.
    pub fn send_headers(
        &mut self,
        headers: &[HeaderEntry],
        encoder: &mut Encoder,
        huffman: bool,
        end_stream: bool,
        max_frame_size: usize,
    ) -> Result<Vec<Frame>> {
        self.machine.process_input(StreamInput::SendHeaders)?;
        if end_stream {
            self.machine.process_input(StreamInput::SendEndStream)?;
        }

        let block = encoder.encode(headers, huffman);

        let mut frames = Vec::new();
        if block.len() <= max_frame_size {
            frames.push(Frame::Headers(HeadersFrame::new(
                self.id, block, end_stream, true,
            )));
            return Ok(frames);
        }

        let chunk_count = block.len().div_ceil(max_frame_size);
        for (i, chunk) in block.chunks(max_frame_size).enumerate() {
            let last = i == chunk_count - 1;
            let fragment = block.slice_ref(chunk);
            if i == 0 {
                frames.push(Frame::Headers(HeadersFrame::new(
                    self.id, fragment, end_stream, false,
                )));
            } else {
                frames.push(Frame::Continuation(ContinuationFrame {
                    stream_id: self.id,
                    header_block: fragment,
                    end_headers: last,
                }));
            }
        }
        Ok(frames)
    }

    /// Build a DATA frame for this stream.
    ///
    /// The stream window must cover the payload; the state transition
    /// (including END_STREAM) happens before the frame is constructed.
    pub fn send_data(&mut self, data: Bytes, end_stream: bool) -> Result<Frame> {
        if !self.send_window.can_send(data.len()) {
            return Err(Error::FlowControl(format!(
                "stream {} window exhausted ({} bytes available, {} requested)",
                self.id,
                self.send_window.size(),
                data.len()
            )));
        }

        self.machine.process_input(StreamInput::SendData)?;
        if end_stream {
            self.machine.process_input(StreamInput::SendEndStream)?;
        }

        self.send_window.consume(data.len());
        Ok(Frame::Data(DataFrame::new(self.id, data, end_stream)))
    }

    /// Frame a streamed body in bounded chunks.
    ///
    /// Reads `BODY_CHUNK_SIZE` bytes at a time until EOF and emits one DATA
    /// frame per chunk. Exactly one frame carries END_STREAM: the final one
    /// (an empty body yields a single empty END_STREAM frame).
    pub fn send_body(&mut self, reader: &mut dyn Read) -> Result<Vec<Frame>> {
        let mut chunks: Vec<Bytes> = Vec::new();
        loop {
            let mut buf = vec![0u8; BODY_CHUNK_SIZE];
            let mut filled = 0;
            // Fill the chunk fully so short transport reads don't fragment
            while filled < BODY_CHUNK_SIZE {
                let n = reader.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }
            buf.truncate(filled);
            chunks.push(Bytes::from(buf));
            if filled < BODY_CHUNK_SIZE {
                break;
            }
        }

        if chunks.is_empty() {
            return Ok(vec![self.send_data(Bytes::new(), true)?]);
        }

        let last = chunks.len() - 1;
        let mut frames = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.into_iter().enumerate() {
            frames.push(self.send_data(chunk, i == last)?);
        }
        Ok(frames)
    }

    /// Reset this stream.
    ///
    /// Returns the RST_STREAM frame to transmit, or None when the stream is
    /// already closed: teardown paths reset many streams whose exact state
    /// is uncertain, and a second reset must be a no-op.
    pub fn close(&mut self, error_code: crate::error::ErrorCode) -> Result<Option<Frame>> {
        if self.machine.state().is_closed() {
            return Ok(None);
        }
        self.machine.process_input(StreamInput::SendRstStream)?;
        Ok(Some(Frame::RstStream(RstStreamFrame::new(
            self.id, error_code,
        ))))
    }

    /// Grow this stream's receive window and produce the WINDOW_UPDATE
    /// frame announcing it
    pub fn increase_flow_control_window(&mut self, increment: u32) -> Result<Frame> {
        self.machine.process_input(StreamInput::SendWindowUpdate)?;
        self.recv_flow.apply_increment(increment)?;
        Ok(Frame::WindowUpdate(WindowUpdateFrame::new(
            self.id, increment,
        )))
    }

    // --- frame-consuming operations ---

    /// Apply the receive-side HEADERS transition
    pub fn receive_headers(&mut self, end_stream: bool) -> Result<()> {
        self.machine.process_input(StreamInput::RecvHeaders)?;
        if end_stream {
            self.machine.process_input(StreamInput::RecvEndStream)?;
            self.stream_complete = true;
        }
        Ok(())
    }

    /// Store a decoded header block: the first block is the response
    /// headers (with `:status`), a second block is the trailers.
    pub fn store_header_list(&mut self, entries: Vec<HeaderEntry>) -> Result<()> {
        if self.headers.is_none() {
            let mut headers = Headers::new();
            for entry in &entries {
                if let Some(pseudo) = entry.name.strip_prefix(':') {
                    match pseudo {
                        "status" => {
                            let code = entry.value.parse::<u16>().map_err(|_| {
                                Error::InvalidHeader(format!(
                                    "bad :status value {:?}",
                                    entry.value
                                ))
                            })?;
                            self.status = Some(code);
                        }
                        other => {
                            return Err(Error::InvalidHeader(format!(
                                "unexpected response pseudo-header :{other}"
                            )));
                        }
                    }
                } else {
                    headers.insert(entry.name.clone(), entry.value.clone());
                }
            }
            if self.status.is_none() {
                return Err(Error::InvalidHeader(
                    "response headers missing :status".to_string(),
                ));
            }
            self.headers = Some(headers);
        } else {
            let mut trailers = Headers::new();
            for entry in &entries {
                if entry.name.starts_with(':') {
                    return Err(Error::InvalidHeader(format!(
                        "pseudo-header {} in trailers",
                        entry.name
                    )));
                }
                trailers.insert(entry.name.clone(), entry.value.clone());
            }
            self.trailers = Some(trailers);
        }
        self.headers_complete = true;
        Ok(())
    }

    /// Consume a DATA frame.
    ///
    /// Accounts the flow-controlled size against the stream receive window
    /// (detecting peer overflow) and returns the policy's suggested
    /// WINDOW_UPDATE increment, 0 for none.
    pub fn receive_data(&mut self, data: &Bytes, flow_size: u32, end_stream: bool) -> Result<u32> {
        self.machine.process_input(StreamInput::RecvData)?;
        if end_stream {
            self.machine.process_input(StreamInput::RecvEndStream)?;
        }

        let increment = self.recv_flow.handle_frame(self.id, flow_size)?;

        self.body.extend_from_slice(data);
        if end_stream {
            self.stream_complete = true;
        }
        Ok(increment)
    }

    /// Consume a peer RST_STREAM: the stream closes and subsequent reads
    /// surface the reset
    pub fn receive_rst(&mut self, error_code: u32) -> Result<()> {
        self.machine.process_input(StreamInput::RecvRstStream)?;
        self.reset_error = Some(error_code);
        self.stream_complete = true;
        Ok(())
    }

    /// Consume a peer WINDOW_UPDATE: grows the send window
    pub fn receive_window_update(&mut self, increment: u32) -> Result<()> {
        self.machine.process_input(StreamInput::RecvWindowUpdate)?;
        self.send_window.increase(increment)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::hpack::Decoder;

    fn request_headers() -> Vec<HeaderEntry> {
        vec![
            HeaderEntry::new(":method", "GET"),
            HeaderEntry::new(":scheme", "https"),
            HeaderEntry::new(":path", "/"),
            HeaderEntry::new(":authority", "example.com"),
        ]
    }

    #[test]
    fn test_send_headers_single_frame() {
        let mut stream = Stream::new(1);
        let mut encoder = Encoder::new();

        let frames = stream
            .send_headers(&request_headers(), &mut encoder, false, true, 16384)
            .unwrap();

        assert_eq!(frames.len(), 1);
        match &frames[0] {
            Frame::Headers(f) => {
                assert_eq!(f.stream_id, 1);
                assert!(f.end_stream);
                assert!(f.end_headers);
            }
            other => panic!("expected HEADERS, got {other:?}"),
        }
        assert_eq!(stream.state(), StreamState::HalfClosedLocal);
    }

    #[test]
    fn test_send_headers_splits_into_continuations() {
        let mut stream = Stream::new(1);
        let mut encoder = Encoder::new();

        // A value too large for one 64-byte frame
        let mut headers = request_headers();
        headers.push(HeaderEntry::new("x-large", "v".repeat(300)));

        let frames = stream
            .send_headers(&headers, &mut encoder, false, true, 64)
            .unwrap();
        assert!(frames.len() > 1);

        match &frames[0] {
            Frame::Headers(f) => {
                assert!(f.end_stream);
                assert!(!f.end_headers);
            }
            other => panic!("expected HEADERS first, got {other:?}"),
        }
        for frame in &frames[1..frames.len() - 1] {
            match frame {
                Frame::Continuation(f) => assert!(!f.end_headers),
                other => panic!("expected CONTINUATION, got {other:?}"),
            }
        }
        match frames.last().unwrap() {
            Frame::Continuation(f) => assert!(f.end_headers),
            other => panic!("expected CONTINUATION last, got {other:?}"),
        }

        // Reassembled fragments must decode to the original list
        let mut block = Vec::new();
        for frame in &frames {
            match frame {
                Frame::Headers(f) => block.extend_from_slice(&f.header_block),
                Frame::Continuation(f) => block.extend_from_slice(&f.header_block),
                other => panic!("unexpected {other:?}"),
            }
        }
        let mut decoder = Decoder::new();
        let decoded = decoder.decode(&block).unwrap();
        assert_eq!(decoded.len(), headers.len());
    }

    #[test]
    fn test_state_moves_even_when_framing_would_fail() {
        // The transition precedes encoding, so a second send on a stream
        // that ended locally errors without touching the encoder.
        let mut stream = Stream::new(1);
        let mut encoder = Encoder::new();

        stream
            .send_headers(&request_headers(), &mut encoder, false, true, 16384)
            .unwrap();
        let table_size = encoder.table_size();

        let err = stream
            .send_headers(&request_headers(), &mut encoder, false, false, 16384)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(stream.state(), StreamState::Closed);
        assert_eq!(encoder.table_size(), table_size);
    }

    #[test]
    fn test_send_data_consumes_window() {
        let mut stream = Stream::new(1);
        let mut encoder = Encoder::new();
        stream
            .send_headers(&request_headers(), &mut encoder, false, false, 16384)
            .unwrap();

        let frame = stream.send_data(Bytes::from(vec![0u8; 1000]), false).unwrap();
        assert!(matches!(frame, Frame::Data(_)));
        assert_eq!(stream.send_window().size(), 65535 - 1000);
    }

    #[test]
    fn test_send_data_rejects_exhausted_window() {
        let mut stream = Stream::with_windows(
            1,
            FlowControlWindow::with_initial_size(10),
            FlowControlManager::new(),
        );
        let mut encoder = Encoder::new();
        stream
            .send_headers(&request_headers(), &mut encoder, false, false, 16384)
            .unwrap();

        let err = stream.send_data(Bytes::from(vec![0u8; 11]), false).unwrap_err();
        assert!(matches!(err, Error::FlowControl(_)));
        // The rejection happened before any transition
        assert_eq!(stream.state(), StreamState::Open);
    }

    #[test]
    fn test_send_body_marks_exactly_one_end_stream() {
        let mut stream = Stream::new(1);
        let mut encoder = Encoder::new();
        stream
            .send_headers(&request_headers(), &mut encoder, false, false, 16384)
            .unwrap();

        // 2.5 chunks worth of body
        let body = vec![7u8; BODY_CHUNK_SIZE * 2 + 512];
        let frames = stream.send_body(&mut &body[..]).unwrap();
        assert_eq!(frames.len(), 3);

        let end_flags: Vec<bool> = frames
            .iter()
            .map(|f| match f {
                Frame::Data(d) => d.end_stream,
                other => panic!("expected DATA, got {other:?}"),
            })
            .collect();
        assert_eq!(end_flags, vec![false, false, true]);
        assert_eq!(stream.state(), StreamState::HalfClosedLocal);

        let total: usize = frames
            .iter()
            .map(|f| match f {
                Frame::Data(d) => d.data.len(),
                _ => 0,
            })
            .sum();
        assert_eq!(total, body.len());
    }

    #[test]
    fn test_send_body_empty_reader() {
        let mut stream = Stream::new(1);
        let mut encoder = Encoder::new();
        stream
            .send_headers(&request_headers(), &mut encoder, false, false, 16384)
            .unwrap();

        let frames = stream.send_body(&mut &[][..]).unwrap();
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            Frame::Data(d) => {
                assert!(d.data.is_empty());
                assert!(d.end_stream);
            }
            other => panic!("expected DATA, got {other:?}"),
        }
    }

    #[test]
    fn test_receive_side_buffering() {
        let mut stream = Stream::new(1);
        let mut encoder = Encoder::new();
        stream
            .send_headers(&request_headers(), &mut encoder, false, true, 16384)
            .unwrap();

        stream.receive_headers(false).unwrap();
        stream
            .store_header_list(vec![
                HeaderEntry::new(":status", "200"),
                HeaderEntry::new("content-type", "text/html"),
            ])
            .unwrap();
        assert_eq!(stream.status(), Some(200));
        assert!(stream.headers_complete());

        let data = Bytes::from_static(b"hello");
        stream.receive_data(&data, 5, true).unwrap();
        assert!(stream.stream_complete());
        assert_eq!(stream.state(), StreamState::Closed);
        assert_eq!(&stream.take_body()[..], b"hello");
    }

    #[test]
    fn test_trailers_after_headers() {
        let mut stream = Stream::new(1);
        stream.receive_headers(false).unwrap();
        stream
            .store_header_list(vec![HeaderEntry::new(":status", "200")])
            .unwrap();

        stream.receive_headers(true).unwrap();
        stream
            .store_header_list(vec![HeaderEntry::new("grpc-status", "0")])
            .unwrap();

        assert_eq!(stream.trailers().unwrap().get("grpc-status"), Some("0"));
    }

    #[test]
    fn test_trailers_reject_pseudo_headers() {
        let mut stream = Stream::new(1);
        stream.receive_headers(false).unwrap();
        stream
            .store_header_list(vec![HeaderEntry::new(":status", "200")])
            .unwrap();

        let err = stream
            .store_header_list(vec![HeaderEntry::new(":status", "500")])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHeader(_)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut stream = Stream::new(1);
        let mut encoder = Encoder::new();
        stream
            .send_headers(&request_headers(), &mut encoder, false, false, 16384)
            .unwrap();

        let first = stream.close(ErrorCode::Cancel).unwrap();
        assert!(first.is_some());
        assert_eq!(stream.state(), StreamState::Closed);

        let second = stream.close(ErrorCode::Cancel).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_receive_rst_records_error() {
        let mut stream = Stream::new(1);
        let mut encoder = Encoder::new();
        stream
            .send_headers(&request_headers(), &mut encoder, false, false, 16384)
            .unwrap();

        stream.receive_rst(ErrorCode::RefusedStream.as_u32()).unwrap();
        assert_eq!(stream.reset_error(), Some(0x7));
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[test]
    fn test_window_update_roundtrip() {
        let mut stream = Stream::new(1);
        let mut encoder = Encoder::new();
        stream
            .send_headers(&request_headers(), &mut encoder, false, false, 16384)
            .unwrap();

        // Outbound update grows our receive window
        let before = stream.recv_window_size();
        let frame = stream.increase_flow_control_window(1000).unwrap();
        assert!(matches!(frame, Frame::WindowUpdate(_)));
        assert_eq!(stream.recv_window_size(), before + 1000);

        // Peer update grows the send window
        stream.receive_window_update(500).unwrap();
        assert_eq!(stream.send_window().size(), 65535 + 500);
    }

    #[test]
    fn test_receive_data_detects_overflow() {
        let mut stream = Stream::with_windows(
            1,
            FlowControlWindow::new(),
            FlowControlManager::with_initial_size(10),
        );
        stream.receive_headers(false).unwrap();
        stream
            .store_header_list(vec![HeaderEntry::new(":status", "200")])
            .unwrap();

        let data = Bytes::from(vec![0u8; 11]);
        let err = stream.receive_data(&data, 11, false).unwrap_err();
        assert!(matches!(err, Error::WindowOverflow { .. }));
    }
}
