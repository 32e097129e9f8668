//! HTTP/2 stream state machine
//!
//! The RFC 7540 Section 5.1 automaton, implemented as a pure transition
//! table over (state, input). The table is the single source of truth for
//! what a stream may legally do; any pair it does not contain is a protocol
//! violation that forces the stream to Closed.

use crate::error::{Error, Result};
use std::fmt;

/// Stream ID type
pub type StreamId = u32;

/// Stream state as defined in RFC 7540 Section 5.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Idle: no frames have been sent or received
    Idle,
    /// Reserved (local): PUSH_PROMISE sent
    ReservedLocal,
    /// Reserved (remote): PUSH_PROMISE received
    ReservedRemote,
    /// Open: both sides can send frames
    Open,
    /// Half-closed (local): we can't send, they can
    HalfClosedLocal,
    /// Half-closed (remote): they can't send, we can
    HalfClosedRemote,
    /// Closed: terminal
    Closed,
}

impl StreamState {
    /// Check if the stream can send DATA
    pub fn can_send(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// Check if the stream can receive DATA
    pub fn can_receive(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }

    /// Check if the stream is closed
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Idle => "idle",
            StreamState::ReservedLocal => "reserved (local)",
            StreamState::ReservedRemote => "reserved (remote)",
            StreamState::Open => "open",
            StreamState::HalfClosedLocal => "half-closed (local)",
            StreamState::HalfClosedRemote => "half-closed (remote)",
            StreamState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Inputs to the stream automaton
///
/// Each frame-bearing operation has a send and a receive variant. EndStream
/// is applied as a separate input immediately after the Headers/Data input
/// when the frame carries the END_STREAM flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamInput {
    SendHeaders,
    RecvHeaders,
    SendPushPromise,
    RecvPushPromise,
    SendRstStream,
    RecvRstStream,
    SendData,
    RecvData,
    SendWindowUpdate,
    RecvWindowUpdate,
    SendEndStream,
    RecvEndStream,
}

impl fmt::Display for StreamInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamInput::SendHeaders => "send HEADERS",
            StreamInput::RecvHeaders => "receive HEADERS",
            StreamInput::SendPushPromise => "send PUSH_PROMISE",
            StreamInput::RecvPushPromise => "receive PUSH_PROMISE",
            StreamInput::SendRstStream => "send RST_STREAM",
            StreamInput::RecvRstStream => "receive RST_STREAM",
            StreamInput::SendData => "send DATA",
            StreamInput::RecvData => "receive DATA",
            StreamInput::SendWindowUpdate => "send WINDOW_UPDATE",
            StreamInput::RecvWindowUpdate => "receive WINDOW_UPDATE",
            StreamInput::SendEndStream => "send END_STREAM",
            StreamInput::RecvEndStream => "receive END_STREAM",
        };
        f.write_str(name)
    }
}

/// The valid-transition table.
///
/// Returns the successor state, or None when (state, input) is not a legal
/// pair. RST_STREAM in either direction closes from every non-idle state;
/// RST_STREAM and WINDOW_UPDATE stay acceptable on a closed stream so that
/// connection teardown and late frames from the peer do not escalate.
fn transition(state: StreamState, input: StreamInput) -> Option<StreamState> {
    use StreamInput::*;
    use StreamState::*;

    match (state, input) {
        (Idle, SendHeaders) => Some(Open),
        (Idle, RecvHeaders) => Some(Open),
        (Idle, SendPushPromise) => Some(ReservedLocal),
        (Idle, RecvPushPromise) => Some(ReservedRemote),

        (ReservedLocal, SendHeaders) => Some(HalfClosedRemote),
        (ReservedLocal, SendRstStream) => Some(Closed),
        (ReservedLocal, RecvRstStream) => Some(Closed),
        (ReservedLocal, RecvWindowUpdate) => Some(ReservedLocal),

        (ReservedRemote, RecvHeaders) => Some(HalfClosedLocal),
        (ReservedRemote, SendRstStream) => Some(Closed),
        (ReservedRemote, RecvRstStream) => Some(Closed),
        (ReservedRemote, SendWindowUpdate) => Some(ReservedRemote),

        (Open, SendHeaders) => Some(Open),
        (Open, RecvHeaders) => Some(Open),
        (Open, SendData) => Some(Open),
        (Open, RecvData) => Some(Open),
        (Open, SendWindowUpdate) => Some(Open),
        (Open, RecvWindowUpdate) => Some(Open),
        (Open, SendEndStream) => Some(HalfClosedLocal),
        (Open, RecvEndStream) => Some(HalfClosedRemote),
        (Open, SendRstStream) => Some(Closed),
        (Open, RecvRstStream) => Some(Closed),

        (HalfClosedLocal, RecvHeaders) => Some(HalfClosedLocal),
        (HalfClosedLocal, RecvData) => Some(HalfClosedLocal),
        (HalfClosedLocal, RecvEndStream) => Some(Closed),
        (HalfClosedLocal, SendWindowUpdate) => Some(HalfClosedLocal),
        (HalfClosedLocal, RecvWindowUpdate) => Some(HalfClosedLocal),
        (HalfClosedLocal, SendRstStream) => Some(Closed),
        (HalfClosedLocal, RecvRstStream) => Some(Closed),

        (HalfClosedRemote, SendHeaders) => Some(HalfClosedRemote),
        (HalfClosedRemote, SendData) => Some(HalfClosedRemote),
        (HalfClosedRemote, SendEndStream) => Some(Closed),
        (HalfClosedRemote, SendWindowUpdate) => Some(HalfClosedRemote),
        (HalfClosedRemote, RecvWindowUpdate) => Some(HalfClosedRemote),
        (HalfClosedRemote, SendRstStream) => Some(Closed),
        (HalfClosedRemote, RecvRstStream) => Some(Closed),

        (Closed, SendRstStream) => Some(Closed),
        (Closed, RecvRstStream) => Some(Closed),
        (Closed, RecvWindowUpdate) => Some(Closed),

        _ => None,
    }
}

/// Deterministic stream automaton for one HTTP/2 stream
#[derive(Debug, Clone)]
pub struct StreamStateMachine {
    state: StreamState,
}

impl StreamStateMachine {
    /// Create a machine in the Idle state
    pub fn new() -> Self {
        StreamStateMachine {
            state: StreamState::Idle,
        }
    }

    /// Create a machine in an explicit state (pushed streams start reserved)
    pub fn in_state(state: StreamState) -> Self {
        StreamStateMachine { state }
    }

    /// Current state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Apply one input.
    ///
    /// A legal input moves to the successor state and returns it. An illegal
    /// input forces the stream to Closed and returns the violation, carrying
    /// the prior state and the attempted input.
    pub fn process_input(&mut self, input: StreamInput) -> Result<StreamState> {
        match transition(self.state, input) {
            Some(next) => {
                self.state = next;
                Ok(next)
            }
            None => {
                let prior = self.state;
                self.state = StreamState::Closed;
                Err(Error::InvalidTransition {
                    state: prior,
                    input,
                })
            }
        }
    }
}

impl Default for StreamStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
