//! HTTP/2 frame encoding and decoding
//!
//! Pure transforms between wire bytes and [`Frame`] values: the 9-byte frame
//! header plus every type-specific body layout from RFC 7540 Section 6.
//! Nothing here holds state; reading from a transport and deciding what to
//! do with a frame are the connection's job.

use crate::error::{Error, Result};
use crate::frame::*;
use crate::settings::Settings;
use bytes::{BufMut, Bytes, BytesMut};

/// HTTP/2 frame header size (9 bytes)
pub const FRAME_HEADER_SIZE: usize = 9;

/// Largest payload the length field can express (2^24 - 1)
pub const MAX_FRAME_SIZE: usize = 0x00FF_FFFF;

/// Frame codec for encoding/decoding HTTP/2 frames
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a frame header into a 9-byte buffer
    pub fn encode_header(
        frame_type: FrameType,
        flags: FrameFlags,
        stream_id: u32,
        length: usize,
    ) -> [u8; FRAME_HEADER_SIZE] {
        let mut header = [0u8; FRAME_HEADER_SIZE];

        // Length (24 bits, big-endian)
        header[0] = ((length >> 16) & 0xFF) as u8;
        header[1] = ((length >> 8) & 0xFF) as u8;
        header[2] = (length & 0xFF) as u8;

        // Type (8 bits)
        header[3] = frame_type.as_u8();

        // Flags (8 bits)
        header[4] = flags.as_u8();

        // Stream ID (31 bits, big-endian, reserved bit is 0)
        let stream_id = stream_id & 0x7FFF_FFFF;
        header[5] = ((stream_id >> 24) & 0xFF) as u8;
        header[6] = ((stream_id >> 16) & 0xFF) as u8;
        header[7] = ((stream_id >> 8) & 0xFF) as u8;
        header[8] = (stream_id & 0xFF) as u8;

        header
    }

    /// Parse a 9-byte frame header into its shell.
    ///
    /// An unrecognized type byte yields [`Error::UnknownFrameType`] carrying
    /// the declared length, so the caller can skip the payload and continue
    /// (RFC 7540 Section 4.1 forward compatibility).
    pub fn parse_frame_header(bytes: &[u8; FRAME_HEADER_SIZE]) -> Result<FrameHeader> {
        let length =
            ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | (bytes[2] as usize);

        let frame_type = FrameType::from_u8(bytes[3]).ok_or(Error::UnknownFrameType {
            frame_type: bytes[3],
            length,
        })?;

        let flags = FrameFlags::from_u8(bytes[4]);

        // Stream ID (31 bits, reserved bit ignored)
        let stream_id = ((bytes[5] as u32 & 0x7F) << 24)
            | ((bytes[6] as u32) << 16)
            | ((bytes[7] as u32) << 8)
            | (bytes[8] as u32);

        Ok(FrameHeader {
            frame_type,
            flags,
            stream_id,
            length,
        })
    }

    /// Parse a type-specific frame body.
    ///
    /// The payload must be exactly the `length` the header declared; layout
    /// violations (wrong fixed sizes, bad padding) are [`Error::FrameSize`].
    pub fn parse_body(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if payload.len() != header.length {
            return Err(Error::FrameSize(format!(
                "{} payload is {} bytes, header declared {}",
                header.frame_type.name(),
                payload.len(),
                header.length
            )));
        }

        match header.frame_type {
            FrameType::Data => Self::parse_data(header, payload),
            FrameType::Headers => Self::parse_headers(header, payload),
            FrameType::Priority => Self::parse_priority(header, payload),
            FrameType::RstStream => Self::parse_rst_stream(header, payload),
            FrameType::Settings => Self::parse_settings(header, payload),
            FrameType::PushPromise => Self::parse_push_promise(header, payload),
            FrameType::Ping => Self::parse_ping(header, payload),
            FrameType::Goaway => Self::parse_goaway(header, payload),
            FrameType::WindowUpdate => Self::parse_window_update(header, payload),
            FrameType::Continuation => Ok(Frame::Continuation(ContinuationFrame {
                stream_id: header.stream_id,
                header_block: payload,
                end_headers: header.flags.is_end_headers(),
            })),
        }
    }

    /// Serialize a frame: 9-byte header followed by the body, with the
    /// length field recomputed from the actual body size.
    pub fn serialize(frame: &Frame) -> Bytes {
        match frame {
            Frame::Data(f) => Self::encode_data_frame(f),
            Frame::Headers(f) => Self::encode_headers_frame(f),
            Frame::Priority(f) => Self::encode_priority_frame(f),
            Frame::RstStream(f) => Self::encode_rst_stream_frame(f),
            Frame::Settings(f) => Self::encode_settings_frame(f),
            Frame::PushPromise(f) => Self::encode_push_promise_frame(f),
            Frame::Ping(f) => Self::encode_ping_frame(f),
            Frame::Goaway(f) => Self::encode_goaway_frame(f),
            Frame::WindowUpdate(f) => Self::encode_window_update_frame(f),
            Frame::Continuation(f) => Self::encode_continuation_frame(f),
        }
    }

    // --- body parsers ---

    /// Strip the padding fields from a PADDED payload, returning the inner
    /// bytes. The pad length byte plus the padding itself must fit.
    fn strip_padding(frame_type: FrameType, payload: Bytes) -> Result<(Bytes, u8)> {
        if payload.is_empty() {
            return Err(Error::FrameSize(format!(
                "padded {} frame with no pad length byte",
                frame_type.name()
            )));
        }
        let pad_len = payload[0];
        let inner_len = payload.len() - 1;
        if pad_len as usize > inner_len {
            return Err(Error::FrameSize(format!(
                "{} padding ({pad_len} bytes) exceeds payload ({inner_len} bytes)",
                frame_type.name()
            )));
        }
        Ok((payload.slice(1..payload.len() - pad_len as usize), pad_len))
    }

    fn parse_data(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if header.stream_id == 0 {
            return Err(Error::Protocol("DATA frame on stream 0".to_string()));
        }

        let (data, padding) = if header.flags.is_padded() {
            let (inner, pad) = Self::strip_padding(FrameType::Data, payload)?;
            (inner, Some(pad))
        } else {
            (payload, None)
        };

        Ok(Frame::Data(DataFrame {
            stream_id: header.stream_id,
            data,
            end_stream: header.flags.is_end_stream(),
            padding,
        }))
    }

    fn parse_headers(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if header.stream_id == 0 {
            return Err(Error::Protocol("HEADERS frame on stream 0".to_string()));
        }

        let (mut block, padding) = if header.flags.is_padded() {
            let (inner, pad) = Self::strip_padding(FrameType::Headers, payload)?;
            (inner, Some(pad))
        } else {
            (payload, None)
        };

        let priority = if header.flags.is_priority() {
            if block.len() < 5 {
                return Err(Error::FrameSize(
                    "HEADERS priority fields require 5 bytes".to_string(),
                ));
            }
            let dep = u32::from_be_bytes([block[0], block[1], block[2], block[3]]);
            let weight = block[4];
            let spec = PrioritySpec {
                stream_dependency: dep & 0x7FFF_FFFF,
                exclusive: dep & 0x8000_0000 != 0,
                weight,
            };
            block = block.slice(5..);
            Some(spec)
        } else {
            None
        };

        Ok(Frame::Headers(HeadersFrame {
            stream_id: header.stream_id,
            header_block: block,
            end_stream: header.flags.is_end_stream(),
            end_headers: header.flags.is_end_headers(),
            priority,
            padding,
        }))
    }

    fn parse_priority(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if payload.len() != 5 {
            return Err(Error::FrameSize(format!(
                "PRIORITY requires exactly 5 bytes, got {}",
                payload.len()
            )));
        }
        let dep = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        Ok(Frame::Priority(PriorityFrame {
            stream_id: header.stream_id,
            priority: PrioritySpec {
                stream_dependency: dep & 0x7FFF_FFFF,
                exclusive: dep & 0x8000_0000 != 0,
                weight: payload[4],
            },
        }))
    }

    fn parse_rst_stream(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if payload.len() != 4 {
            return Err(Error::FrameSize(format!(
                "RST_STREAM requires exactly 4 bytes, got {}",
                payload.len()
            )));
        }
        if header.stream_id == 0 {
            return Err(Error::Protocol("RST_STREAM frame on stream 0".to_string()));
        }
        Ok(Frame::RstStream(RstStreamFrame {
            stream_id: header.stream_id,
            error_code: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
        }))
    }

    fn parse_settings(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if header.stream_id != 0 {
            return Err(Error::Protocol(
                "SETTINGS frame must have stream ID 0".to_string(),
            ));
        }
        let ack = header.flags.is_ack();
        if ack && !payload.is_empty() {
            return Err(Error::FrameSize(
                "SETTINGS ACK must have an empty payload".to_string(),
            ));
        }
        if payload.len() % 6 != 0 {
            return Err(Error::FrameSize(format!(
                "SETTINGS payload length {} is not a multiple of 6",
                payload.len()
            )));
        }

        let mut settings = Settings::new();
        for entry in payload.chunks(6) {
            let id = u16::from_be_bytes([entry[0], entry[1]]);
            let value = u32::from_be_bytes([entry[2], entry[3], entry[4], entry[5]]);
            settings.apply(id, value);
        }

        Ok(Frame::Settings(SettingsFrame { ack, settings }))
    }

    fn parse_push_promise(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if header.stream_id == 0 {
            return Err(Error::Protocol("PUSH_PROMISE frame on stream 0".to_string()));
        }

        let (inner, padding) = if header.flags.is_padded() {
            let (inner, pad) = Self::strip_padding(FrameType::PushPromise, payload)?;
            (inner, Some(pad))
        } else {
            (payload, None)
        };

        if inner.len() < 4 {
            return Err(Error::FrameSize(
                "PUSH_PROMISE requires a 4-byte promised stream ID".to_string(),
            ));
        }
        let promised = u32::from_be_bytes([inner[0], inner[1], inner[2], inner[3]]) & 0x7FFF_FFFF;

        Ok(Frame::PushPromise(PushPromiseFrame {
            stream_id: header.stream_id,
            promised_stream_id: promised,
            header_block: inner.slice(4..),
            end_headers: header.flags.is_end_headers(),
            padding,
        }))
    }

    fn parse_ping(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if payload.len() != 8 {
            return Err(Error::FrameSize(format!(
                "PING requires exactly 8 bytes, got {}",
                payload.len()
            )));
        }
        let mut data = [0u8; 8];
        data.copy_from_slice(&payload);
        Ok(Frame::Ping(PingFrame {
            ack: header.flags.is_ack(),
            data,
        }))
    }

    fn parse_goaway(_header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if payload.len() < 8 {
            return Err(Error::FrameSize(format!(
                "GOAWAY requires at least 8 bytes, got {}",
                payload.len()
            )));
        }
        let last_stream_id =
            u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
        let error_code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
        Ok(Frame::Goaway(GoawayFrame {
            last_stream_id,
            error_code,
            debug_data: payload.slice(8..),
        }))
    }

    fn parse_window_update(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if payload.len() != 4 {
            return Err(Error::FrameSize(format!(
                "WINDOW_UPDATE requires exactly 4 bytes, got {}",
                payload.len()
            )));
        }
        let increment =
            u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
        Ok(Frame::WindowUpdate(WindowUpdateFrame {
            stream_id: header.stream_id,
            size_increment: increment,
        }))
    }

    // --- body encoders ---

    /// Encode a DATA frame
    pub fn encode_data_frame(frame: &DataFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let mut payload_len = frame.data.len();
        let mut flags = FrameFlags::empty();

        if frame.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }

        let padding_len = if let Some(pad_len) = frame.padding {
            flags.set(FrameFlags::PADDED);
            payload_len += 1 + pad_len as usize;
            pad_len
        } else {
            0
        };

        let header = Self::encode_header(FrameType::Data, flags, frame.stream_id, payload_len);
        buf.put_slice(&header);

        if frame.padding.is_some() {
            buf.put_u8(padding_len);
        }
        buf.put_slice(&frame.data);
        if padding_len > 0 {
            buf.put_bytes(0, padding_len as usize);
        }

        buf.freeze()
    }

    /// Encode a HEADERS frame
    pub fn encode_headers_frame(frame: &HeadersFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let mut payload_len = frame.header_block.len();
        let mut flags = FrameFlags::empty();

        if frame.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }
        if frame.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }
        if frame.priority.is_some() {
            flags.set(FrameFlags::PRIORITY);
            payload_len += 5;
        }

        let padding_len = if let Some(pad_len) = frame.padding {
            flags.set(FrameFlags::PADDED);
            payload_len += 1 + pad_len as usize;
            pad_len
        } else {
            0
        };

        let header = Self::encode_header(FrameType::Headers, flags, frame.stream_id, payload_len);
        buf.put_slice(&header);

        if frame.padding.is_some() {
            buf.put_u8(padding_len);
        }

        if let Some(priority) = &frame.priority {
            let mut dep = priority.stream_dependency;
            if priority.exclusive {
                dep |= 0x8000_0000;
            }
            buf.put_u32(dep);
            buf.put_u8(priority.weight);
        }

        buf.put_slice(&frame.header_block);
        if padding_len > 0 {
            buf.put_bytes(0, padding_len as usize);
        }

        buf.freeze()
    }

    /// Encode a PRIORITY frame
    pub fn encode_priority_frame(frame: &PriorityFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let header =
            Self::encode_header(FrameType::Priority, FrameFlags::empty(), frame.stream_id, 5);
        buf.put_slice(&header);

        let mut dep = frame.priority.stream_dependency;
        if frame.priority.exclusive {
            dep |= 0x8000_0000;
        }
        buf.put_u32(dep);
        buf.put_u8(frame.priority.weight);

        buf.freeze()
    }

    /// Encode a RST_STREAM frame
    pub fn encode_rst_stream_frame(frame: &RstStreamFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let header =
            Self::encode_header(FrameType::RstStream, FrameFlags::empty(), frame.stream_id, 4);
        buf.put_slice(&header);
        buf.put_u32(frame.error_code);

        buf.freeze()
    }

    /// Encode a SETTINGS frame
    pub fn encode_settings_frame(frame: &SettingsFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let flags = if frame.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };

        let mut settings_data = BytesMut::new();
        if !frame.ack {
            for (id, value) in frame.settings.entries() {
                settings_data.put_u16(id);
                settings_data.put_u32(value);
            }
        }

        // SETTINGS always goes on stream 0
        let header = Self::encode_header(FrameType::Settings, flags, 0, settings_data.len());
        buf.put_slice(&header);
        buf.put_slice(&settings_data);

        buf.freeze()
    }

    /// Encode a PUSH_PROMISE frame
    pub fn encode_push_promise_frame(frame: &PushPromiseFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let mut flags = FrameFlags::empty();
        if frame.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }

        let mut payload_len = 4 + frame.header_block.len();
        let padding_len = if let Some(pad_len) = frame.padding {
            flags.set(FrameFlags::PADDED);
            payload_len += 1 + pad_len as usize;
            pad_len
        } else {
            0
        };

        let header =
            Self::encode_header(FrameType::PushPromise, flags, frame.stream_id, payload_len);
        buf.put_slice(&header);

        if frame.padding.is_some() {
            buf.put_u8(padding_len);
        }
        buf.put_u32(frame.promised_stream_id & 0x7FFF_FFFF);
        buf.put_slice(&frame.header_block);
        if padding_len > 0 {
            buf.put_bytes(0, padding_len as usize);
        }

        buf.freeze()
    }

    /// Encode a PING frame
    pub fn encode_ping_frame(frame: &PingFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let flags = if frame.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };

        let header = Self::encode_header(FrameType::Ping, flags, 0, 8);
        buf.put_slice(&header);
        buf.put_slice(&frame.data);

        buf.freeze()
    }

    /// Encode a GOAWAY frame
    pub fn encode_goaway_frame(frame: &GoawayFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let payload_len = 8 + frame.debug_data.len();
        let header = Self::encode_header(FrameType::Goaway, FrameFlags::empty(), 0, payload_len);
        buf.put_slice(&header);

        buf.put_u32(frame.last_stream_id & 0x7FFF_FFFF);
        buf.put_u32(frame.error_code);
        buf.put_slice(&frame.debug_data);

        buf.freeze()
    }

    /// Encode a WINDOW_UPDATE frame
    pub fn encode_window_update_frame(frame: &WindowUpdateFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let header = Self::encode_header(
            FrameType::WindowUpdate,
            FrameFlags::empty(),
            frame.stream_id,
            4,
        );
        buf.put_slice(&header);
        buf.put_u32(frame.size_increment & 0x7FFF_FFFF);

        buf.freeze()
    }

    /// Encode a CONTINUATION frame
    pub fn encode_continuation_frame(frame: &ContinuationFrame) -> Bytes {
        let mut buf = BytesMut::new();

        let mut flags = FrameFlags::empty();
        if frame.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }

        let header = Self::encode_header(
            FrameType::Continuation,
            flags,
            frame.stream_id,
            frame.header_block.len(),
        );
        buf.put_slice(&header);
        buf.put_slice(&frame.header_block);

        buf.freeze()
    }
}
