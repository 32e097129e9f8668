//! HTTP/2 flow control
//!
//! Window bookkeeping per RFC 7540 Section 5.2, applied at both the
//! connection and stream level, plus the pluggable policy that decides when
//! received data should trigger an outbound WINDOW_UPDATE.

use crate::error::{Error, Result};
use crate::DEFAULT_INITIAL_WINDOW_SIZE;

/// Largest legal window size (2^31 - 1)
const MAX_WINDOW_SIZE: i64 = 0x7FFF_FFFF;

/// Flow control window
///
/// Tracks remaining permitted bytes in one direction at one scope. The
/// current size is signed: a SETTINGS_INITIAL_WINDOW_SIZE reduction can
/// legally push an in-flight window below zero.
#[derive(Debug, Clone)]
pub struct FlowControlWindow {
    /// Initial window size
    initial_size: u32,
    /// Current window size
    current_size: i64,
}

impl FlowControlWindow {
    /// Create a window with the protocol default size
    pub fn new() -> Self {
        Self::with_initial_size(DEFAULT_INITIAL_WINDOW_SIZE)
    }

    /// Create a window with a specific initial size
    pub fn with_initial_size(initial_size: u32) -> Self {
        FlowControlWindow {
            initial_size,
            current_size: i64::from(initial_size),
        }
    }

    /// Current window size
    pub fn size(&self) -> i64 {
        self.current_size
    }

    /// Initial window size
    pub fn initial_size(&self) -> u32 {
        self.initial_size
    }

    /// Check if the window can cover `amount` bytes
    pub fn can_send(&self, amount: usize) -> bool {
        self.current_size >= amount as i64
    }

    /// Consume capacity for sending data.
    ///
    /// Returns the amount actually available, which may be less than
    /// requested (zero when the window is exhausted).
    pub fn consume(&mut self, amount: usize) -> usize {
        if amount == 0 || self.current_size <= 0 {
            return 0;
        }
        let to_send = std::cmp::min(amount as i64, self.current_size) as usize;
        self.current_size -= to_send as i64;
        to_send
    }

    /// Unconditional decrement for received data bookkeeping
    pub fn decrease(&mut self, amount: usize) {
        self.current_size -= amount as i64;
    }

    /// Apply a WINDOW_UPDATE increment.
    ///
    /// Zero increments and growth past 2^31-1 are protocol errors
    /// (RFC 7540 Section 6.9).
    pub fn increase(&mut self, increment: u32) -> Result<i64> {
        if increment == 0 {
            return Err(Error::FlowControl(
                "window update increment must be non-zero".to_string(),
            ));
        }

        let new_size = self.current_size + i64::from(increment);
        if new_size > MAX_WINDOW_SIZE {
            return Err(Error::FlowControl(format!(
                "window size {new_size} exceeds maximum (2^31-1)"
            )));
        }

        self.current_size = new_size;
        Ok(self.current_size)
    }

    /// Re-base after a SETTINGS_INITIAL_WINDOW_SIZE change: the delta is
    /// applied to the current size (RFC 7540 Section 6.9.2).
    pub fn update_initial_size(&mut self, new_initial_size: u32) -> Result<()> {
        let diff = i64::from(new_initial_size) - i64::from(self.initial_size);
        let new_current = self.current_size + diff;

        if new_current > MAX_WINDOW_SIZE {
            return Err(Error::FlowControl(format!(
                "re-based window size {new_current} exceeds maximum (2^31-1)"
            )));
        }

        self.initial_size = new_initial_size;
        self.current_size = new_current;
        Ok(())
    }
}

impl Default for FlowControlWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Policy hook deciding when received data triggers WINDOW_UPDATE
///
/// Called once per received flow-controlled frame, *before* the window is
/// decremented. The return value is the increment to put in an outbound
/// WINDOW_UPDATE, or 0 for no update now. Policies only observe the window;
/// the decrement itself is fixed bookkeeping they cannot override.
pub trait WindowUpdatePolicy: Send {
    /// Compute the WINDOW_UPDATE increment to emit for a frame of
    /// `frame_size` bytes about to be charged against `window`.
    fn increase_window_size(&mut self, window: &FlowControlWindow, frame_size: u32) -> u32;
}

/// Default policy: restore the window to its initial size once it would
/// drain below `initial / divisor`.
///
/// The divisor is a tunable, not a protocol constant; 2 ("below half")
/// is the default.
#[derive(Debug, Clone)]
pub struct ReplenishingPolicy {
    divisor: u32,
}

impl ReplenishingPolicy {
    /// Policy with the default threshold (half the initial window)
    pub fn new() -> Self {
        ReplenishingPolicy { divisor: 2 }
    }

    /// Policy replenishing below `initial / divisor` (divisor must be >= 1)
    pub fn with_divisor(divisor: u32) -> Self {
        ReplenishingPolicy {
            divisor: divisor.max(1),
        }
    }
}

impl Default for ReplenishingPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowUpdatePolicy for ReplenishingPolicy {
    fn increase_window_size(&mut self, window: &FlowControlWindow, frame_size: u32) -> u32 {
        let initial = i64::from(window.initial_size());
        let after = window.size() - i64::from(frame_size);

        if after < initial / i64::from(self.divisor) {
            (initial - after) as u32
        } else {
            0
        }
    }
}

/// A policy that never volunteers WINDOW_UPDATE; useful when the caller
/// wants to manage windows manually.
#[derive(Debug, Clone, Default)]
pub struct ManualPolicy;

impl WindowUpdatePolicy for ManualPolicy {
    fn increase_window_size(&mut self, _window: &FlowControlWindow, _frame_size: u32) -> u32 {
        0
    }
}

/// Receive-side window manager: one per scope (connection or stream).
///
/// Couples a window with a policy. `handle_frame` is the single entry point
/// for received data: overflow detection, then the policy hook, then the
/// unconditional decrement, in that order. Returned increments take effect
/// on this window only when the caller actually emits the WINDOW_UPDATE and
/// applies them via [`apply_increment`](Self::apply_increment).
pub struct FlowControlManager {
    window: FlowControlWindow,
    policy: Box<dyn WindowUpdatePolicy>,
}

impl FlowControlManager {
    /// Manager with the default window size and replenishing policy
    pub fn new() -> Self {
        Self::with_initial_size(DEFAULT_INITIAL_WINDOW_SIZE)
    }

    /// Manager with an explicit window size and the default policy
    pub fn with_initial_size(initial_size: u32) -> Self {
        FlowControlManager {
            window: FlowControlWindow::with_initial_size(initial_size),
            policy: Box::new(ReplenishingPolicy::new()),
        }
    }

    /// Manager with an explicit policy
    pub fn with_policy(initial_size: u32, policy: Box<dyn WindowUpdatePolicy>) -> Self {
        FlowControlManager {
            window: FlowControlWindow::with_initial_size(initial_size),
            policy,
        }
    }

    /// The managed window
    pub fn window(&self) -> &FlowControlWindow {
        &self.window
    }

    /// Account for one received flow-controlled frame.
    ///
    /// A frame larger than the remaining window is a peer violation and
    /// yields [`Error::WindowOverflow`] before any bookkeeping. Otherwise
    /// the policy computes a suggested increment against the pre-decrement
    /// window, and the window is then decremented unconditionally.
    pub fn handle_frame(&mut self, stream_id: u32, frame_size: u32) -> Result<u32> {
        if i64::from(frame_size) > self.window.size() {
            return Err(Error::WindowOverflow {
                stream_id,
                window: self.window.size(),
                frame_size,
            });
        }

        let increment = self.policy.increase_window_size(&self.window, frame_size);
        self.window.decrease(frame_size as usize);
        Ok(increment)
    }

    /// Apply an increment that was actually sent in a WINDOW_UPDATE
    pub fn apply_increment(&mut self, increment: u32) -> Result<i64> {
        self.window.increase(increment)
    }

    /// Re-base after a SETTINGS_INITIAL_WINDOW_SIZE change
    pub fn update_initial_size(&mut self, new_initial_size: u32) -> Result<()> {
        self.window.update_initial_size(new_initial_size)
    }
}

impl Default for FlowControlManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FlowControlManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowControlManager")
            .field("window", &self.window)
            .finish()
    }
}
